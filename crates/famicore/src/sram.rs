//! Battery-backed save RAM persistence.
//!
//! The board's save-RAM buffer is written out zlib-compressed, and only
//! when the board reports unsaved changes — carts without a battery (or
//! with untouched RAM) never produce a file.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{info, warn};

use crate::nes::Nes;

/// Persist save RAM if the board has unsaved changes. Returns whether a
/// file was written.
pub fn save_sram(nes: &mut Nes, path: &Path) -> io::Result<bool> {
    if !nes.bus.board.sram_save_required() {
        return Ok(false);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(nes.bus.board.sram_buffer())?;
    let compressed = encoder.finish()?;
    fs::write(path, &compressed)?;

    nes.bus.board.base_mut().mark_sram_clean();
    info!("save RAM written to {} ({} bytes)", path.display(), compressed.len());
    Ok(true)
}

/// Load save RAM from disk if a file exists. Returns whether anything
/// was loaded.
pub fn load_sram(nes: &mut Nes, path: &Path) -> io::Result<bool> {
    if !path.exists() {
        return Ok(false);
    }

    let compressed = fs::read(path)?;
    let mut data = Vec::new();
    if ZlibDecoder::new(&compressed[..]).read_to_end(&mut data).is_err() {
        warn!("save RAM file {} is corrupt; ignoring", path.display());
        return Ok(false);
    }

    nes.bus.board.load_sram(&data);
    info!("save RAM loaded from {}", path.display());
    Ok(true)
}
