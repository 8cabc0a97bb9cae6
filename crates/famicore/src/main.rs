//! Headless CLI runner.
//!
//! Runs a ROM for a number of frames with no window, then optionally
//! writes a screenshot and a WAV dump of the mixed audio. Useful for
//! regression runs and for capturing deterministic output.

use std::path::PathBuf;
use std::process;

use famicore::capture::{save_screenshot, WavRecorder};
use famicore::{Emulator, Nes, TvSystem};

struct CliArgs {
    rom_path: PathBuf,
    frames: u32,
    system: TvSystem,
    screenshot: Option<PathBuf>,
    wav: Option<PathBuf>,
    sram: Option<PathBuf>,
}

fn print_usage() {
    eprintln!(
        "usage: famicore <rom.nes> [--frames N] [--system ntsc|pal|dendy] \
         [--screenshot FILE] [--wav FILE] [--sram FILE]"
    );
}

fn parse_args() -> Option<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut rom_path = None;
    let mut frames = 60u32;
    let mut system = TvSystem::Ntsc;
    let mut screenshot = None;
    let mut wav = None;
    let mut sram = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--frames" => {
                frames = args.next()?.parse().ok()?;
            }
            "--system" => {
                system = match args.next()?.as_str() {
                    "ntsc" => TvSystem::Ntsc,
                    "pal" => TvSystem::PalB,
                    "dendy" => TvSystem::Dendy,
                    other => {
                        eprintln!("unknown TV system: {other}");
                        return None;
                    }
                };
            }
            "--screenshot" => screenshot = Some(PathBuf::from(args.next()?)),
            "--wav" => wav = Some(PathBuf::from(args.next()?)),
            "--sram" => sram = Some(PathBuf::from(args.next()?)),
            "--help" | "-h" => return None,
            other if rom_path.is_none() => rom_path = Some(PathBuf::from(other)),
            other => {
                eprintln!("unexpected argument: {other}");
                return None;
            }
        }
    }

    Some(CliArgs {
        rom_path: rom_path?,
        frames,
        system,
        screenshot,
        wav,
        sram,
    })
}

fn main() {
    env_logger::init();

    let Some(args) = parse_args() else {
        print_usage();
        process::exit(2);
    };

    let rom_data = match std::fs::read(&args.rom_path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("cannot read {}: {e}", args.rom_path.display());
            process::exit(1);
        }
    };

    let mut nes = match Nes::new(&rom_data, args.system) {
        Ok(nes) => nes,
        Err(e) => {
            eprintln!("cannot load {}: {e}", args.rom_path.display());
            process::exit(1);
        }
    };

    if let Some(wav_path) = &args.wav {
        let rate = famicore::apu::Mixer::DEFAULT_SAMPLE_RATE;
        nes.setup_audio(
            Box::new(WavRecorder::new(wav_path.clone(), rate)),
            true,
            rate,
            rate as usize,
            0,
        );
    }

    let mut emulator = Emulator::new(nes);
    emulator.set_speed_limit(false);
    if let Some(sram_path) = &args.sram {
        emulator.apply_settings(
            sram_path.clone(),
            PathBuf::from("state.fcs"),
            PathBuf::from("."),
            String::from(".png"),
            true,
            true,
        );
        emulator.load_sram();
    }

    for _ in 0..args.frames {
        emulator.step_frame();
    }

    let frames = emulator.nes().frame_count();
    let cycles = emulator.nes().cycles().get();
    println!("ran {frames} frames ({cycles} CPU cycles)");

    if let Some(path) = &args.screenshot {
        if let Err(e) = save_screenshot(emulator.nes().screen(), path) {
            eprintln!("screenshot failed: {e}");
            process::exit(1);
        }
        println!("screenshot written to {}", path.display());
    }

    if let Some(sram_path) = &args.sram {
        if let Err(e) = famicore::sram::save_sram(emulator.nes_mut(), sram_path) {
            eprintln!("save RAM write failed: {e}");
        }
    }

    emulator.nes_mut().shutdown();
}
