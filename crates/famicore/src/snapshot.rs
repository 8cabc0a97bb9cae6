//! Machine state snapshots.
//!
//! A snapshot is a versioned binary capture of every emulation-visible
//! field, component by component in a fixed order, zlib-compressed for
//! persistence. The payload starts with a 3-byte magic, a version byte,
//! and the CRC-32 of the loaded cartridge image (big-endian), so a
//! snapshot from a different build or a different game is rejected before
//! any live state is touched.
//!
//! Loading is all-or-nothing: validation failures abort untouched, and a
//! failure during field restoration rolls the machine back to the state
//! it had before the attempt.

use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use famicore_core::{StateReader, StateTruncated, StateWriter};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{info, warn};

use crate::nes::Nes;

/// Snapshot magic: FamiCore State.
const MAGIC: [u8; 3] = *b"FCS";

/// Current snapshot format version.
const VERSION: u8 = 1;

/// Snapshot failure. Live emulation state is unchanged for every variant.
#[derive(Debug)]
pub enum SnapshotError {
    /// Payload did not decompress.
    Corrupt,
    /// Magic bytes wrong — not a snapshot file.
    BadMagic,
    /// Snapshot was written by an incompatible format version.
    UnsupportedVersion(u8),
    /// Snapshot belongs to a different cartridge image.
    WrongGame { expected: u32, found: u32 },
    /// Payload ended before all fields were restored.
    Truncated,
    /// A save or load is already in progress.
    Busy,
    /// Host file I/O failed.
    Io(std::io::Error),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt => write!(f, "snapshot data did not decompress"),
            Self::BadMagic => write!(f, "not a snapshot file (bad magic)"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported snapshot version {v}"),
            Self::WrongGame { expected, found } => write!(
                f,
                "snapshot is for a different game (cartridge {expected:08X}, snapshot {found:08X})"
            ),
            Self::Truncated => write!(f, "snapshot payload truncated"),
            Self::Busy => write!(f, "a snapshot operation is already in progress"),
            Self::Io(e) => write!(f, "snapshot file I/O failed: {e}"),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StateTruncated> for SnapshotError {
    fn from(_: StateTruncated) -> Self {
        Self::Truncated
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Serialize the complete machine state in the fixed component order.
fn write_machine_state(nes: &Nes, w: &mut StateWriter) {
    // General
    w.write_u8(nes.bus.pal_cycle);
    w.write_u64(nes.bus.cycles);
    w.write_u64(nes.frame_count);
    // APU frame sequencer
    nes.bus.apu.save_state(w);
    // CPU
    nes.cpu.save_state(w);
    // DMA
    nes.bus.dma.save_state(w);
    // DMC
    nes.bus.apu.dmc.save_state(w);
    // Input ports
    nes.bus.input.save_state(w);
    // Interrupts
    nes.bus.interrupts.save_state(w);
    // Memory: board, then the bus-owned memories and bus state
    nes.bus.board.save_state(w);
    w.write_bytes(&nes.bus.wram);
    w.write_bytes(&nes.bus.palettes_bank);
    w.write_bytes(&nes.bus.oam_ram);
    w.write_bytes(&nes.bus.oam_secondary);
    w.write_u16(nes.bus.bus_address);
    w.write_bool(nes.bus.bus_rw);
    w.write_bool(nes.bus.bus_rw_p);
    // Noise
    nes.bus.apu.noise.save_state(w);
    // PPU
    nes.bus.ppu.save_state(w);
    // Pulse 1, pulse 2
    nes.bus.apu.pulse1.save_state(w);
    nes.bus.apu.pulse2.save_state(w);
    // Triangle
    nes.bus.apu.triangle.save_state(w);
}

/// Restore the machine state. Field order must match
/// `write_machine_state` exactly.
fn read_machine_state(nes: &mut Nes, r: &mut StateReader<'_>) -> Result<(), StateTruncated> {
    nes.bus.pal_cycle = r.read_u8()?;
    nes.bus.cycles = r.read_u64()?;
    nes.frame_count = r.read_u64()?;
    nes.bus.apu.load_state(r)?;
    nes.cpu.load_state(r)?;
    nes.bus.dma.load_state(r)?;
    nes.bus.apu.dmc.load_state(r)?;
    nes.bus.input.load_state(r)?;
    nes.bus.interrupts.load_state(r)?;
    nes.bus.board.load_state(r)?;
    r.read_exact(&mut nes.bus.wram)?;
    r.read_exact(&mut nes.bus.palettes_bank)?;
    r.read_exact(&mut nes.bus.oam_ram)?;
    r.read_exact(&mut nes.bus.oam_secondary)?;
    nes.bus.bus_address = r.read_u16()?;
    nes.bus.bus_rw = r.read_bool()?;
    nes.bus.bus_rw_p = r.read_bool()?;
    nes.bus.apu.noise.load_state(r)?;
    nes.bus.ppu.load_state(r)?;
    nes.bus.apu.pulse1.load_state(r)?;
    nes.bus.apu.pulse2.load_state(r)?;
    nes.bus.apu.triangle.load_state(r)?;
    Ok(())
}

/// Capture a snapshot of the running machine.
#[must_use]
pub fn save_snapshot(nes: &Nes) -> Vec<u8> {
    let mut w = StateWriter::new();
    w.write_bytes(&MAGIC);
    w.write_u8(VERSION);
    w.write_bytes(&nes.cartridge_crc().to_be_bytes());
    write_machine_state(nes, &mut w);

    let payload = w.into_bytes();
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing to a Vec cannot fail
    #[allow(clippy::unwrap_used)]
    {
        encoder.write_all(&payload).unwrap();
        encoder.finish().unwrap()
    }
}

/// Restore a snapshot. Validates magic, version, then content hash, in
/// that order, before mutating anything; restoration failures roll the
/// machine back.
pub fn load_snapshot(nes: &mut Nes, data: &[u8]) -> Result<(), SnapshotError> {
    let mut payload = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut payload)
        .map_err(|_| SnapshotError::Corrupt)?;

    let mut r = StateReader::new(&payload);
    let mut magic = [0u8; 3];
    r.read_exact(&mut magic).map_err(|_| SnapshotError::BadMagic)?;
    if magic != MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    let version = r.read_u8().map_err(|_| SnapshotError::BadMagic)?;
    if version != VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    let mut crc = [0u8; 4];
    r.read_exact(&mut crc).map_err(|_| SnapshotError::Truncated)?;
    let found = u32::from_be_bytes(crc);
    let expected = nes.cartridge_crc();
    if found != expected {
        return Err(SnapshotError::WrongGame { expected, found });
    }

    // Header checks passed. Keep a rollback image so a truncated payload
    // cannot leave the machine half-restored.
    let mut backup = StateWriter::new();
    write_machine_state(nes, &mut backup);
    let backup = backup.into_bytes();

    if let Err(truncated) = read_machine_state(nes, &mut r) {
        let mut rollback = StateReader::new(&backup);
        read_machine_state(nes, &mut rollback)
            .expect("rollback image restores the state it was taken from");
        return Err(truncated.into());
    }
    Ok(())
}

/// Save a snapshot to a file.
pub fn save_to_file(nes: &Nes, path: &Path) -> Result<(), SnapshotError> {
    let data = save_snapshot(nes);
    fs::write(path, &data)?;
    info!("state saved to {} ({} bytes)", path.display(), data.len());
    Ok(())
}

/// Load a snapshot from a file.
pub fn load_from_file(nes: &mut Nes, path: &Path) -> Result<(), SnapshotError> {
    let data = fs::read(path)?;
    match load_snapshot(nes, &data) {
        Ok(()) => {
            info!("state loaded from {}", path.display());
            Ok(())
        }
        Err(e) => {
            warn!("state load from {} rejected: {e}", path.display());
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TvSystem;

    fn nop_nes() -> Nes {
        let mut rom = crate::cartridge::tests::make_ines(2, 1, 0, 0);
        for byte in &mut rom[16..16 + 32 * 1024] {
            *byte = 0xEA;
        }
        rom[16 + 0x7FFC] = 0x00;
        rom[16 + 0x7FFD] = 0x80;
        Nes::new(&rom, TvSystem::Ntsc).expect("load")
    }

    #[test]
    fn round_trip_restores_cycles_and_registers() {
        let mut nes = nop_nes();
        nes.run_frame();
        let data = save_snapshot(&nes);
        let cycles = nes.cycles();
        let pc = nes.cpu().regs.pc;

        nes.run_frame();
        assert_ne!(nes.cycles(), cycles);

        load_snapshot(&mut nes, &data).expect("load");
        assert_eq!(nes.cycles(), cycles);
        assert_eq!(nes.cpu().regs.pc, pc);
    }

    #[test]
    fn rejects_garbage() {
        let mut nes = nop_nes();
        assert!(matches!(
            load_snapshot(&mut nes, b"not a snapshot"),
            Err(SnapshotError::Corrupt)
        ));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut nes = nop_nes();
        let mut data = save_snapshot(&nes);
        // Re-compress a tampered payload
        let mut payload = Vec::new();
        ZlibDecoder::new(&data[..])
            .read_to_end(&mut payload)
            .expect("decompress");
        payload[0] = b'X';
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&payload).expect("compress");
        data = enc.finish().expect("compress");

        assert!(matches!(
            load_snapshot(&mut nes, &data),
            Err(SnapshotError::BadMagic)
        ));
    }

    #[test]
    fn rejects_version_mismatch() {
        let mut nes = nop_nes();
        let data = save_snapshot(&nes);
        let mut payload = Vec::new();
        ZlibDecoder::new(&data[..])
            .read_to_end(&mut payload)
            .expect("decompress");
        payload[3] = VERSION + 1;
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&payload).expect("compress");
        let data = enc.finish().expect("compress");

        assert!(matches!(
            load_snapshot(&mut nes, &data),
            Err(SnapshotError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn rejects_wrong_game_and_leaves_state_untouched() {
        let mut nes = nop_nes();
        nes.run_frame();
        let data = save_snapshot(&nes);

        // A different cartridge: flip a PRG byte so the CRC differs
        let mut other_rom = crate::cartridge::tests::make_ines(2, 1, 0, 0);
        for byte in &mut other_rom[16..16 + 32 * 1024] {
            *byte = 0xEA;
        }
        other_rom[16] = 0x00;
        other_rom[16 + 0x7FFC] = 0x01;
        other_rom[16 + 0x7FFD] = 0x80;
        let mut other = Nes::new(&other_rom, TvSystem::Ntsc).expect("load");
        other.run_frame();

        let before = save_snapshot(&other);
        assert!(matches!(
            load_snapshot(&mut other, &data),
            Err(SnapshotError::WrongGame { .. })
        ));
        let after = save_snapshot(&other);
        assert_eq!(before, after, "rejected load must not disturb state");
    }

    #[test]
    fn truncated_payload_rolls_back() {
        let mut nes = nop_nes();
        nes.run_frame();
        let data = save_snapshot(&nes);

        // Rebuild a snapshot whose payload stops right after the header
        let mut payload = Vec::new();
        ZlibDecoder::new(&data[..])
            .read_to_end(&mut payload)
            .expect("decompress");
        payload.truncate(16);
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&payload).expect("compress");
        let truncated = enc.finish().expect("compress");

        nes.run_frame();
        let before = save_snapshot(&nes);
        assert!(matches!(
            load_snapshot(&mut nes, &truncated),
            Err(SnapshotError::Truncated)
        ));
        let after = save_snapshot(&nes);
        assert_eq!(before, after, "failed load must roll back completely");
    }
}
