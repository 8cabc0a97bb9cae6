//! Boot-level tests against a minimal NROM cartridge.

use famicore::{Nes, TvSystem};

/// 32K NOP-filled PRG, vectors at $8000, 8K empty CHR.
fn build_nop_rom() -> Vec<u8> {
    let prg_size = 32 * 1024;
    let chr_size = 8 * 1024;
    let mut rom = vec![0u8; 16 + prg_size + chr_size];
    rom[0..4].copy_from_slice(b"NES\x1a");
    rom[4] = 2; // 2 × 16K PRG
    rom[5] = 1; // 1 × 8K CHR
    for byte in &mut rom[16..16 + prg_size] {
        *byte = 0xEA; // NOP
    }
    // NMI/reset/IRQ vectors → $8000
    for vector in [0x7FFA, 0x7FFC, 0x7FFE] {
        rom[16 + vector] = 0x00;
        rom[16 + vector + 1] = 0x80;
    }
    rom
}

/// Minimal boot ROM: init, two VBlank polls on $2002, then an idle loop.
fn build_vblank_poll_rom() -> Vec<u8> {
    let prg_size = 32 * 1024;
    let chr_size = 8 * 1024;
    let mut rom = vec![0u8; 16 + prg_size + chr_size];
    rom[0..4].copy_from_slice(b"NES\x1a");
    rom[4] = 2;
    rom[5] = 1;

    // $8000: SEI / CLD / LDX #$FF / TXS
    // $8005: LDA $2002 / BPL $8005   (first VBlank wait)
    // $800A: LDA $2002 / BPL $800A   (second VBlank wait)
    // $800F: JMP $800F               (idle)
    let code: &[u8] = &[
        0x78, // SEI
        0xD8, // CLD
        0xA2, 0xFF, // LDX #$FF
        0x9A, // TXS
        0xAD, 0x02, 0x20, // LDA $2002
        0x10, 0xFB, // BPL $8005
        0xAD, 0x02, 0x20, // LDA $2002
        0x10, 0xFB, // BPL $800A
        0x4C, 0x0F, 0x80, // JMP $800F
    ];
    rom[16..16 + code.len()].copy_from_slice(code);

    for vector in [0x7FFA, 0x7FFC, 0x7FFE] {
        rom[16 + vector] = 0x0F;
        rom[16 + vector + 1] = 0x80;
    }
    rom[16 + 0x7FFC] = 0x00; // reset → $8000
    rom
}

#[test]
fn nop_cartridge_shows_still_backdrop_without_sprite_zero_hit() {
    let mut nes = Nes::new(&build_nop_rom(), TvSystem::Ntsc).expect("load");

    // Run well past the first vblank
    nes.run_frame();
    nes.run_frame();

    // Rendering never got enabled, so no sprite-zero hit ($2002 bit 6)
    let status = nes.bus_mut().read(0x2002);
    assert_eq!(status & 0x40, 0, "sprite zero hit must be clear");

    // The visible frame is the uniform backdrop colour (the PPU leaves
    // the final column untouched when rendering is off)
    let screen = nes.screen().to_vec();
    let backdrop = screen[0];
    assert_ne!(backdrop & 0xFF00_0000, 0, "pixels are opaque ARGB");
    for y in 0..240 {
        for x in 0..255 {
            assert_eq!(screen[y * 256 + x], backdrop, "pixel ({x},{y})");
        }
    }

    // And it stays still
    nes.run_frame();
    assert_eq!(nes.screen()[100 * 256 + 100], backdrop);
}

#[test]
fn vblank_polling_boot_reaches_idle_loop() {
    let mut nes = Nes::new(&build_vblank_poll_rom(), TvSystem::Ntsc).expect("load");
    assert_eq!(nes.cpu().regs.pc, 0x8000);

    // Two VBlank waits need a little over two frames; the idle JMP is at
    // $800F-$8011 (PC may be sampled mid-instruction)
    let idle = 0x800Fu16..=0x8011u16;
    for _ in 0..5 {
        nes.run_frame();
        if idle.contains(&nes.cpu().regs.pc) {
            return;
        }
    }
    panic!(
        "CPU did not reach the idle loop, stuck at ${:04X}",
        nes.cpu().regs.pc
    );
}

#[test]
fn unsupported_mapper_fails_to_load() {
    let mut rom = build_nop_rom();
    rom[6] = 0xF0; // mapper nibble
    rom[7] = 0xF0;
    let err = Nes::new(&rom, TvSystem::Ntsc).expect_err("mapper 255 must fail");
    assert!(err.to_string().contains("not supported"), "{err}");
}

#[test]
fn invalid_header_fails_to_load() {
    let mut rom = build_nop_rom();
    rom[0] = b'X';
    assert!(Nes::new(&rom, TvSystem::Ntsc).is_err());
}
