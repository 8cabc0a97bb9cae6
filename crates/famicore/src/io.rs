//! Host-side sink contracts.
//!
//! The core emits audio and video through these traits and never blocks
//! on them; pacing, device handling and file formats are host concerns.

use std::io;
use std::path::Path;

/// Audio backend contract.
///
/// The core owns the write cursor into its circular sample buffer and
/// submits the buffer once per frame; the sink drains it at its own pace.
/// Samples are mono 16-bit signed, big-endian byte order.
pub trait AudioSink {
    /// Hand the sink the current circular buffer contents.
    fn submit_buffer(&mut self, buffer: &[u8]);

    /// The device's playback cursor, in bytes into the circular buffer.
    /// The core only reads this to (re)align its write cursor.
    fn current_write_position(&self) -> usize {
        0
    }

    fn play(&mut self) {}

    fn pause(&mut self) {}

    fn is_playing(&self) -> bool {
        false
    }

    /// Whether the sink is capturing the raw sample stream.
    fn is_recording(&self) -> bool {
        false
    }

    /// One mixed sample, delivered only while recording.
    fn record_sample(&mut self, _sample: i32) {}

    fn shutdown(&mut self) {}
}

/// Discards all audio. Used headless and in tests.
pub struct NullAudio;

impl AudioSink for NullAudio {
    fn submit_buffer(&mut self, _buffer: &[u8]) {}
}

/// Video backend contract. One completed 256×240 ARGB frame per call.
pub trait VideoSink {
    fn submit_frame(&mut self, frame: &[u32]);

    /// Write the last frame as an image file. `format` is an extension
    /// hint (".png"); `overwrite` replaces an existing file instead of
    /// numbering a new one.
    fn take_snapshot(
        &mut self,
        _folder: &Path,
        _name: &str,
        _format: &str,
        _overwrite: bool,
    ) -> io::Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) {}
}

/// Discards all video. Used headless and in tests.
pub struct NullVideo;

impl VideoSink for NullVideo {
    fn submit_frame(&mut self, _frame: &[u32]) {}
}
