//! The controlling loop around the core.
//!
//! The core itself is single-threaded; this loop may run on a dedicated
//! thread. The host communicates through [`Requests`] — a block of
//! boolean flags with single-writer/single-reader semantics — which the
//! core drains only at frame boundaries. A request never pre-empts
//! mid-instruction state: the current frame finishes, the machine goes
//! idle, and the request is serviced from the idle loop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info};

use crate::nes::Nes;
use crate::snapshot::{self, SnapshotError};
use crate::sram;

/// Host-settable request flags. Set from any thread; drained by the
/// emulation loop at frame boundaries.
#[derive(Default)]
pub struct Requests {
    pause: AtomicBool,
    resume: AtomicBool,
    hard_reset: AtomicBool,
    soft_reset: AtomicBool,
    state_save: AtomicBool,
    state_load: AtomicBool,
    screenshot: AtomicBool,
    save_sram: AtomicBool,
    shutdown: AtomicBool,
}

impl Requests {
    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::Release);
    }

    pub fn request_resume(&self) {
        self.resume.store(true, Ordering::Release);
    }

    pub fn request_hard_reset(&self) {
        self.save_sram.store(true, Ordering::Release);
        self.hard_reset.store(true, Ordering::Release);
    }

    pub fn request_soft_reset(&self) {
        self.soft_reset.store(true, Ordering::Release);
    }

    pub fn request_state_save(&self) {
        self.state_save.store(true, Ordering::Release);
    }

    pub fn request_state_load(&self) {
        self.state_load.store(true, Ordering::Release);
    }

    pub fn request_screenshot(&self) {
        self.screenshot.store(true, Ordering::Release);
    }

    pub fn request_save_sram(&self) {
        self.save_sram.store(true, Ordering::Release);
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn take(flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::AcqRel)
    }

    fn any_pending(&self) -> bool {
        self.pause.load(Ordering::Acquire)
            || self.hard_reset.load(Ordering::Acquire)
            || self.soft_reset.load(Ordering::Acquire)
            || self.state_save.load(Ordering::Acquire)
            || self.state_load.load(Ordering::Acquire)
            || self.screenshot.load(Ordering::Acquire)
            || self.save_sram.load(Ordering::Acquire)
            || self.shutdown.load(Ordering::Acquire)
    }
}

/// Emulation controller: owns the console, paces frames, and services
/// host requests between them.
pub struct Emulator {
    nes: Nes,
    requests: Arc<Requests>,
    running: bool,
    paused: bool,
    speed_limit: bool,
    frame_period: Duration,
    last_frame: Instant,

    state_file: PathBuf,
    sram_file: PathBuf,
    snapshot_folder: PathBuf,
    snapshot_name: String,
    snapshot_format: String,
    snapshot_overwrite: bool,
    save_sram_at_shutdown: bool,

    is_saving_state: bool,
    is_loading_state: bool,
}

impl Emulator {
    #[must_use]
    pub fn new(nes: Nes) -> Self {
        let frame_period = Duration::from_secs_f64(1.0 / nes.system().frames_per_second());
        Self {
            nes,
            requests: Arc::new(Requests::default()),
            running: true,
            paused: false,
            speed_limit: true,
            frame_period,
            last_frame: Instant::now(),
            state_file: PathBuf::from("state.fcs"),
            sram_file: PathBuf::from("save.srm"),
            snapshot_folder: PathBuf::from("."),
            snapshot_name: String::from("snapshot"),
            snapshot_format: String::from(".png"),
            snapshot_overwrite: false,
            save_sram_at_shutdown: true,
            is_saving_state: false,
            is_loading_state: false,
        }
    }

    /// Host persistence settings.
    pub fn apply_settings(
        &mut self,
        sram_file: PathBuf,
        state_file: PathBuf,
        snapshot_folder: PathBuf,
        snapshot_format: String,
        snapshot_overwrite: bool,
        save_sram_at_shutdown: bool,
    ) {
        self.sram_file = sram_file;
        self.state_file = state_file;
        self.snapshot_folder = snapshot_folder;
        self.snapshot_format = snapshot_format;
        self.snapshot_overwrite = snapshot_overwrite;
        self.save_sram_at_shutdown = save_sram_at_shutdown;
    }

    pub fn set_snapshot_name(&mut self, name: String) {
        self.snapshot_name = name;
    }

    pub fn set_speed_limit(&mut self, enabled: bool) {
        self.speed_limit = enabled;
    }

    /// The request block, to hand to UI/host threads.
    #[must_use]
    pub fn requests(&self) -> Arc<Requests> {
        Arc::clone(&self.requests)
    }

    #[must_use]
    pub fn nes(&self) -> &Nes {
        &self.nes
    }

    pub fn nes_mut(&mut self) -> &mut Nes {
        &mut self.nes
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Load save RAM from disk (called once after power-on).
    pub fn load_sram(&mut self) {
        if let Err(e) = sram::load_sram(&mut self.nes, &self.sram_file) {
            error!("save RAM load failed: {e}");
        }
    }

    /// Run until a shutdown request. Suitable for a dedicated thread.
    pub fn run(&mut self) {
        self.last_frame = Instant::now();
        while self.running {
            if self.paused {
                // Cooperative pause: idle at a coarse poll interval
                thread::sleep(Duration::from_millis(100));
                self.service_requests();
            } else {
                self.step_frame();
            }
        }
        self.shutdown();
    }

    /// Advance exactly one frame, then handle pacing and requests.
    /// Host-driven alternative to [`Emulator::run`].
    pub fn step_frame(&mut self) {
        self.nes.run_frame();

        if self.speed_limit {
            let elapsed = self.last_frame.elapsed();
            if elapsed < self.frame_period {
                thread::sleep(self.frame_period - elapsed);
            } else {
                // Fell behind: resynchronize the audio write cursor
                self.nes.bus_mut().apu.realign_playback();
            }
        }
        self.last_frame = Instant::now();

        // Requests are only ever looked at between frames
        if self.requests.any_pending() {
            self.paused = true;
            self.nes.bus_mut().apu.pause_playback();
            self.service_requests();
        }
    }

    fn service_requests(&mut self) {
        if Requests::take(&self.requests.shutdown) {
            self.running = false;
            return;
        }
        if Requests::take(&self.requests.save_sram) {
            if let Err(e) = sram::save_sram(&mut self.nes, &self.sram_file) {
                error!("save RAM write failed: {e}");
            }
            self.paused = false;
        }
        if Requests::take(&self.requests.hard_reset) {
            info!("hard reset");
            self.nes.hard_reset();
            self.load_sram();
            self.paused = false;
        }
        if Requests::take(&self.requests.soft_reset) {
            info!("soft reset");
            self.nes.soft_reset();
            self.paused = false;
        }
        if Requests::take(&self.requests.state_save) {
            if let Err(e) = self.save_state_file() {
                error!("state save failed: {e}");
            }
            self.paused = false;
        }
        if Requests::take(&self.requests.state_load) {
            if let Err(e) = self.load_state_file() {
                error!("state load failed: {e}");
            }
            self.paused = false;
        }
        if Requests::take(&self.requests.screenshot) {
            let result = self.nes.video_sink_mut().take_snapshot(
                &self.snapshot_folder,
                &self.snapshot_name,
                &self.snapshot_format,
                self.snapshot_overwrite,
            );
            if let Err(e) = result {
                error!("screenshot failed: {e}");
            }
            self.paused = false;
        }
        if Requests::take(&self.requests.pause) {
            self.paused = true;
        }
        if Requests::take(&self.requests.resume) {
            self.paused = false;
            self.last_frame = Instant::now();
        }
    }

    /// Save the machine state to the configured file. Rejected (not
    /// queued) while another snapshot operation is in flight.
    pub fn save_state_file(&mut self) -> Result<(), SnapshotError> {
        if self.is_saving_state || self.is_loading_state {
            return Err(SnapshotError::Busy);
        }
        self.is_saving_state = true;
        let result = snapshot::save_to_file(&self.nes, &self.state_file);
        self.is_saving_state = false;
        result
    }

    /// Load the machine state from the configured file. Rejected while
    /// another snapshot operation is in flight; a failed load leaves the
    /// running state untouched.
    pub fn load_state_file(&mut self) -> Result<(), SnapshotError> {
        if self.is_saving_state || self.is_loading_state {
            return Err(SnapshotError::Busy);
        }
        self.is_loading_state = true;
        let result = snapshot::load_from_file(&mut self.nes, &self.state_file);
        self.is_loading_state = false;
        result
    }

    fn shutdown(&mut self) {
        if self.save_sram_at_shutdown {
            if let Err(e) = sram::save_sram(&mut self.nes, &self.sram_file) {
                error!("save RAM write failed at shutdown: {e}");
            }
        }
        self.nes.shutdown();
        info!("emulation stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TvSystem;

    fn nop_emulator() -> Emulator {
        let mut rom = crate::cartridge::tests::make_ines(2, 1, 0, 0);
        for byte in &mut rom[16..16 + 32 * 1024] {
            *byte = 0xEA;
        }
        rom[16 + 0x7FFC] = 0x00;
        rom[16 + 0x7FFD] = 0x80;
        let nes = Nes::new(&rom, TvSystem::Ntsc).expect("load");
        let mut emu = Emulator::new(nes);
        emu.set_speed_limit(false);
        emu
    }

    #[test]
    fn requests_drain_at_frame_boundary() {
        let mut emu = nop_emulator();
        let requests = emu.requests();

        requests.request_pause();
        emu.step_frame();
        assert!(emu.is_paused(), "pause lands after the frame finishes");

        requests.request_resume();
        emu.service_requests();
        assert!(!emu.is_paused());
    }

    #[test]
    fn hard_reset_request_restarts_machine() {
        let mut emu = nop_emulator();
        let requests = emu.requests();
        emu.step_frame();
        assert_eq!(emu.nes().frame_count(), 1);

        requests.request_soft_reset();
        emu.step_frame();
        // Soft reset serviced; machine resumes
        assert!(!emu.is_paused());
    }

    #[test]
    fn reentrant_state_save_is_rejected() {
        let mut emu = nop_emulator();
        emu.is_saving_state = true;
        assert!(matches!(emu.save_state_file(), Err(SnapshotError::Busy)));
        assert!(matches!(emu.load_state_file(), Err(SnapshotError::Busy)));
    }
}
