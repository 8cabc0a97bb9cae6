//! Headless capture: PNG screenshots and WAV audio dumps.

#![allow(clippy::cast_possible_truncation)]

use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;

use crate::io::{AudioSink, VideoSink};
use crate::ppu::{FB_HEIGHT, FB_WIDTH};

/// Save a framebuffer as a PNG file.
///
/// The framebuffer is ARGB32; this converts to RGBA bytes for the
/// encoder.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn save_screenshot(frame: &[u32], path: &Path) -> Result<(), Box<dyn Error>> {
    let file = fs::File::create(path)?;
    let writer = io::BufWriter::new(file);
    let mut encoder = png::Encoder::new(writer, FB_WIDTH as u32, FB_HEIGHT as u32);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;

    let mut rgba = Vec::with_capacity(FB_WIDTH * FB_HEIGHT * 4);
    for &pixel in frame {
        rgba.push(((pixel >> 16) & 0xFF) as u8);
        rgba.push(((pixel >> 8) & 0xFF) as u8);
        rgba.push((pixel & 0xFF) as u8);
        rgba.push(0xFF);
    }
    writer.write_image_data(&rgba)?;
    Ok(())
}

/// Video sink that keeps the most recent frame and can write it out as a
/// screenshot on request.
pub struct CaptureSink {
    last_frame: Vec<u32>,
}

impl CaptureSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_frame: vec![0; FB_WIDTH * FB_HEIGHT],
        }
    }

    /// The most recently submitted frame.
    #[must_use]
    pub fn last_frame(&self) -> &[u32] {
        &self.last_frame
    }

    /// Pick a non-clobbering file name unless overwriting is requested.
    fn snapshot_path(folder: &Path, name: &str, format: &str, overwrite: bool) -> PathBuf {
        let candidate = folder.join(format!("{name}{format}"));
        if overwrite || !candidate.exists() {
            return candidate;
        }
        let mut counter = 1u32;
        loop {
            let numbered = folder.join(format!("{name}_{counter}{format}"));
            if !numbered.exists() {
                return numbered;
            }
            counter += 1;
        }
    }
}

impl VideoSink for CaptureSink {
    fn submit_frame(&mut self, frame: &[u32]) {
        self.last_frame.copy_from_slice(frame);
    }

    fn take_snapshot(
        &mut self,
        folder: &Path,
        name: &str,
        format: &str,
        overwrite: bool,
    ) -> io::Result<()> {
        fs::create_dir_all(folder)?;
        let path = Self::snapshot_path(folder, name, format, overwrite);
        save_screenshot(&self.last_frame, &path)
            .map_err(|e| io::Error::other(e.to_string()))?;
        info!("screenshot saved to {}", path.display());
        Ok(())
    }
}

impl Default for CaptureSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Audio sink that records the mixed sample stream to a WAV file on
/// shutdown. The circular playback buffer is ignored — recording taps
/// the per-sample hook instead, so no samples are dropped or repeated.
pub struct WavRecorder {
    path: PathBuf,
    sample_rate: u32,
    samples: Vec<i16>,
}

impl WavRecorder {
    #[must_use]
    pub fn new(path: PathBuf, sample_rate: u32) -> Self {
        Self {
            path,
            sample_rate,
            samples: Vec::new(),
        }
    }
}

impl AudioSink for WavRecorder {
    fn submit_buffer(&mut self, _buffer: &[u8]) {}

    fn is_recording(&self) -> bool {
        true
    }

    fn record_sample(&mut self, sample: i32) {
        self.samples.push(sample as i16);
    }

    fn shutdown(&mut self) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let result = (|| -> Result<(), hound::Error> {
            let mut writer = hound::WavWriter::create(&self.path, spec)?;
            for &sample in &self.samples {
                // Mixer output is ±160; scale up to use the 16-bit range
                writer.write_sample(sample.saturating_mul(128))?;
            }
            writer.finalize()
        })();
        match result {
            Ok(()) => info!(
                "audio recording saved to {} ({} samples)",
                self.path.display(),
                self.samples.len()
            ),
            Err(e) => log::error!("WAV write failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshot_writes_png_signature() {
        let dir = std::env::temp_dir().join("famicore-capture-test");
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("shot.png");

        let frame = vec![0xFF12_3456u32; FB_WIDTH * FB_HEIGHT];
        save_screenshot(&frame, &path).expect("save");

        let data = fs::read(&path).expect("read back");
        assert_eq!(&data[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn snapshot_numbering_avoids_clobber() {
        let dir = std::env::temp_dir().join("famicore-capture-numbering");
        fs::create_dir_all(&dir).expect("temp dir");
        let first = dir.join("frame.png");
        fs::write(&first, b"existing").expect("seed file");

        let chosen = CaptureSink::snapshot_path(&dir, "frame", ".png", false);
        assert_eq!(chosen, dir.join("frame_1.png"));

        let overwritten = CaptureSink::snapshot_path(&dir, "frame", ".png", true);
        assert_eq!(overwritten, first);
        fs::remove_file(&first).ok();
    }
}
