//! Worker topology, shutdown, and cleanup.
//!
//! The supervisor owns one capture+compute worker and one display worker
//! joined by the bounded queue. Shutdown is cooperative: the stop flag is
//! observed by both workers within one iteration, the display side drains
//! what was already published, tracked children are reaped, and the scratch
//! directory is cleared on every exit path through a drop guard.

use crate::capture::FrameGrabber;
use crate::display::{DisplaySink, KeyCommand, KeySource};
use crate::process::PidRegistry;
use crate::queue::BoundedLatestQueue;
use crate::stereo::StereoEngine;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stereo_core::{CaptureError, PipelineError, PipelineMessage, SupervisorConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    Draining,
    Stopped,
}

impl SupervisorState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::Draining,
            3 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

pub struct PipelineSupervisor {
    config: SupervisorConfig,
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    registry: Arc<PidRegistry>,
}

/// Runs the supervisor's cleanup on every exit path, including panics and
/// early error returns.
struct CleanupGuard<'a> {
    supervisor: &'a PipelineSupervisor,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.supervisor.cleanup();
    }
}

impl PipelineSupervisor {
    pub fn new(config: SupervisorConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        std::fs::create_dir_all(&config.scratch_dir)?;
        let registry = Arc::new(PidRegistry::open(&config.scratch_dir.join("pids"))?);
        Ok(Self {
            config,
            stop: Arc::new(AtomicBool::new(false)),
            state: Arc::new(AtomicU8::new(0)),
            registry,
        })
    }

    /// Registry shared with grabbers so their children are tracked.
    pub fn registry(&self) -> Arc<PidRegistry> {
        self.registry.clone()
    }

    /// Shared stop flag; setting it is equivalent to an interrupt.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn state(&self) -> SupervisorState {
        SupervisorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SupervisorState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Route SIGINT to the stop flag. Install once per process.
    pub fn install_interrupt_handler(&self) -> Result<(), PipelineError> {
        let stop = self.stop.clone();
        ctrlc::set_handler(move || {
            log::info!("interrupt received, stopping pipeline");
            stop.store(true, Ordering::Release);
        })
        .map_err(|e| PipelineError::Io(std::io::Error::other(e)))
    }

    /// Reclaim capture processes a prior aborted run left behind. Fatal
    /// (`DeviceLocked`) only when a live tracked holder cannot be killed.
    pub fn reap_orphans(&self) -> Result<usize, CaptureError> {
        self.registry.reap_orphans()
    }

    /// Run the live loop until quit/interrupt: Idle → Running → Draining →
    /// Stopped.
    pub fn process_and_display<G, S, K>(
        &self,
        engine: StereoEngine<G>,
        sink: S,
        keys: K,
    ) -> Result<(), PipelineError>
    where
        G: FrameGrabber + 'static,
        S: DisplaySink + 'static,
        K: KeySource + 'static,
    {
        self.set_state(SupervisorState::Running);
        let queue: BoundedLatestQueue<PipelineMessage> =
            BoundedLatestQueue::new(self.config.queue_capacity);
        let _cleanup = CleanupGuard { supervisor: self };

        let capture_worker = {
            let stop = self.stop.clone();
            let queue = queue.clone();
            std::thread::Builder::new()
                .name("capture-compute".into())
                .spawn(move || {
                    let mut engine = engine;
                    while !stop.load(Ordering::Acquire) {
                        match engine.capture_and_compute() {
                            Ok(msg) => {
                                let evicted = queue.push_evicting(msg);
                                if evicted > 0 {
                                    log::debug!("display lagging, evicted {evicted} message(s)");
                                }
                            }
                            // Per-frame failures are not fatal; skip and go on.
                            Err(e) => log::warn!("frame skipped: {e}"),
                        }
                    }
                    log::info!("capture worker stopped");
                })?
        };

        let display_worker = {
            let stop = self.stop.clone();
            let state = self.state.clone();
            let queue = queue.clone();
            std::thread::Builder::new().name("display".into()).spawn(move || {
                let mut sink = sink;
                let mut keys = keys;
                let mut latest: Option<PipelineMessage> = None;

                while !stop.load(Ordering::Acquire) {
                    while let Some(cmd) = keys.poll() {
                        match cmd {
                            KeyCommand::Quit => {
                                log::info!("quit requested");
                                stop.store(true, Ordering::Release);
                            }
                            KeyCommand::Save => {
                                if let Some(msg) = &latest {
                                    if let Err(e) = sink.save_snapshot(msg) {
                                        log::warn!("snapshot failed: {e}");
                                    }
                                }
                            }
                            KeyCommand::Analyze => match &latest {
                                Some(msg) if !msg.regions.is_empty() => {
                                    for region in &msg.regions {
                                        log::info!(
                                            "frame {}: band {} object at {:.2} m",
                                            msg.seq,
                                            region.band,
                                            region.mean_distance
                                        );
                                    }
                                }
                                Some(msg) => log::info!("frame {}: no objects", msg.seq),
                                None => log::info!("no frame yet"),
                            },
                        }
                    }

                    if let Some(msg) = queue.recv_latest(Duration::from_millis(50)) {
                        if let Err(e) = sink.present(&msg) {
                            log::warn!("display error: {e}");
                        }
                        latest = Some(msg);
                    }
                }

                // Stop observed: drain what the producer already published.
                state.store(SupervisorState::Draining as u8, Ordering::Release);
                while let Some(msg) = queue.try_recv() {
                    if let Err(e) = sink.present(&msg) {
                        log::warn!("display error while draining: {e}");
                    }
                }
                log::info!("display worker drained and stopped");
            })?
        };

        let capture_result = capture_worker.join();
        let display_result = display_worker.join();
        self.terminate_processes();
        self.set_state(SupervisorState::Stopped);

        for (name, result) in [("capture", capture_result), ("display", display_result)] {
            if result.is_err() {
                return Err(PipelineError::Io(std::io::Error::other(format!(
                    "{name} worker panicked"
                ))));
            }
        }
        Ok(())
    }

    /// Force-stop tracked children that outlive the grace period.
    pub fn terminate_processes(&self) {
        let has_entries = std::fs::read_dir(self.registry.dir())
            .map(|mut dir| dir.next().is_some())
            .unwrap_or(false);
        if !has_entries {
            return;
        }
        std::thread::sleep(self.config.grace_period);
        match self.registry.reap_orphans() {
            Ok(0) => {}
            Ok(n) => log::warn!("force-stopped {n} capture process(es)"),
            Err(e) => log::error!("could not reap tracked children: {e}"),
        }
    }

    /// Remove transient capture files from the scratch directory, keeping
    /// the PID registry.
    pub fn clean_temp_dirs(&self) {
        let Ok(entries) = std::fs::read_dir(&self.config.scratch_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path == self.registry.dir() {
                continue;
            }
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(e) = result {
                log::warn!("could not remove {}: {e}", path.display());
            }
        }
    }

    /// Unconditional cleanup: reap children, clear scratch files. Runs on
    /// every exit path via the internal drop guard; safe to call repeatedly.
    pub fn cleanup(&self) {
        self.terminate_processes();
        self.clean_temp_dirs();
        log::info!("supervisor cleanup complete");
    }
}
