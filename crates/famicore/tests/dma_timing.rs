//! DMA cycle-stealing timing at machine level.

use famicore::{Nes, TvSystem};

/// Build a 32K NROM image with the given code at $8000 and vectors at
/// $8000. The rest of PRG is NOPs.
fn build_rom(code: &[u8]) -> Vec<u8> {
    let prg_size = 32 * 1024;
    let chr_size = 8 * 1024;
    let mut rom = vec![0u8; 16 + prg_size + chr_size];
    rom[0..4].copy_from_slice(b"NES\x1a");
    rom[4] = 2;
    rom[5] = 1;
    for byte in &mut rom[16..16 + prg_size] {
        *byte = 0xEA;
    }
    rom[16..16 + code.len()].copy_from_slice(code);
    // Fill the DMC sample area ($C000 up to the vectors) with delta bits
    for i in 0x4000..0x7FFA {
        rom[16 + i] = 0x55;
    }
    for vector in [0x7FFA, 0x7FFC, 0x7FFE] {
        rom[16 + vector] = 0x00;
        rom[16 + vector + 1] = 0x80;
    }
    rom
}

/// Cycles consumed by the next instruction.
fn instruction_cycles(nes: &mut Nes) -> u64 {
    let before = nes.cycles().get();
    nes.clock_instruction();
    nes.cycles().get() - before
}

#[test]
fn oam_dma_steals_513_or_514_cycles() {
    // SEI, then STA $4014 with A=2, then NOPs. The DMA engages on the
    // read cycle after the $4014 write — the next opcode fetch — so the
    // following NOP carries the stolen cycles.
    let code: &[u8] = &[
        0x78, // SEI
        0xA9, 0x02, // LDA #$02
        0x8D, 0x14, 0x40, // STA $4014
        0xEA, 0xEA, 0xEA, // NOPs
    ];
    let mut nes = Nes::new(&build_rom(code), TvSystem::Ntsc).expect("load");

    assert_eq!(instruction_cycles(&mut nes), 2); // SEI
    assert_eq!(instruction_cycles(&mut nes), 2); // LDA
    assert_eq!(instruction_cycles(&mut nes), 4); // STA $4014

    // NOP (2 cycles) + transfer: 512 read/write pairs plus 1 or 2
    // alignment cycles depending on CPU cycle parity at assert time
    let with_dma = instruction_cycles(&mut nes);
    let stolen = with_dma - 2;
    assert!(
        stolen == 513 || stolen == 514,
        "OAM DMA stole {stolen} cycles"
    );

    // Following instructions run clean again
    assert_eq!(instruction_cycles(&mut nes), 2);
}

#[test]
fn oam_dma_parity_changes_the_wait() {
    // Same program with a 3-cycle instruction inserted: the $4014 write
    // lands on the opposite cycle parity, flipping between 513 and 514.
    let base: &[u8] = &[
        0x78, 0xA9, 0x02, 0x8D, 0x14, 0x40, 0xEA, 0xEA,
    ];
    let shifted: &[u8] = &[
        0x78, 0xA5, 0x00, 0xA9, 0x02, 0x8D, 0x14, 0x40, 0xEA, 0xEA,
    ];

    let steal = |code: &[u8], setup_instructions: usize| -> u64 {
        let mut nes = Nes::new(&build_rom(code), TvSystem::Ntsc).expect("load");
        for _ in 0..setup_instructions {
            nes.clock_instruction();
        }
        instruction_cycles(&mut nes) - 2
    };

    let a = steal(base, 3);
    let b = steal(shifted, 4);
    assert!(a == 513 || a == 514, "base steal was {a}");
    assert_ne!(a, b, "shifting parity by one cycle must change the wait");
}

#[test]
fn dmc_fetch_steals_cycles_and_loads_sample() {
    // Configure the DMC for a 1-byte sample at $C000, enable it, and
    // let it fetch. $C000 holds 0x55 (alternating delta bits).
    let code: &[u8] = &[
        0x78, // SEI
        0xA9, 0x00, // LDA #$00
        0x8D, 0x12, 0x40, // STA $4012 (address = $C000)
        0x8D, 0x13, 0x40, // STA $4013 (length = 1 byte)
        0xA9, 0x10, // LDA #$10
        0x8D, 0x15, 0x40, // STA $4015 (enable DMC → asserts DMA)
        0xEA, 0xEA, 0xEA, 0xEA, // NOPs
    ];
    let mut nes = Nes::new(&build_rom(code), TvSystem::Ntsc).expect("load");

    for _ in 0..5 {
        nes.clock_instruction();
    }

    // The fetch engages on an upcoming read cycle; it costs the one
    // fetch read plus 2-4 wait cycles, so the next NOPs take more than
    // their base 2 cycles in total
    let mut extra = 0;
    for _ in 0..4 {
        extra += instruction_cycles(&mut nes) - 2;
    }
    assert!(
        (3..=5).contains(&extra),
        "DMC fetch stole {extra} cycles (want fetch + 2-4 waits)"
    );

    // The channel received its byte: $4015 bit 4 drops once the 1-byte
    // sample has been consumed into the buffer (no bytes remaining)
    let status = nes.bus_mut().read(0x4015);
    assert_eq!(status & 0x10, 0, "sample bytes should be exhausted");
}
