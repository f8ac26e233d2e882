//! Frame acquisition behind the [`FrameGrabber`] trait.
//!
//! The grabber owns the camera device; the rest of the pipeline only sees
//! frames. On the target board the capture tool runs as a short-lived child
//! process per frame ([`CommandGrabber`]), so a wedged camera stack can be
//! killed without taking the pipeline down, and an interrupted run leaves a
//! PID registry entry the next run can reap.

use crate::process::PidRegistry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use stereo_core::image::io::{load_gray, save_gray, save_rgb};
use stereo_core::synthetic::noise_texture;
use stereo_core::{CaptureConfig, CaptureError, ConfigError, FramePair, ImageU8};

/// Camera collaborator: acquire one frame or fail within a bounded wait.
pub trait FrameGrabber: Send {
    fn acquire(&mut self, camera_id: u32, timeout: Duration) -> Result<ImageU8, CaptureError>;
}

/// Deterministic in-memory frames for tests and dry runs.
///
/// Scripted frames cycle per camera; cameras without a script fall back to
/// seeded noise that changes every call.
#[derive(Debug)]
pub struct SyntheticGrabber {
    size: (usize, usize),
    scripted: HashMap<u32, Vec<ImageU8>>,
    cursors: HashMap<u32, usize>,
    calls: u32,
}

impl SyntheticGrabber {
    pub fn uniform(size: (usize, usize)) -> Self {
        Self {
            size,
            scripted: HashMap::new(),
            cursors: HashMap::new(),
            calls: 0,
        }
    }

    /// Serve the given frames per camera, cycling when exhausted.
    pub fn scripted(size: (usize, usize), frames: HashMap<u32, Vec<ImageU8>>) -> Self {
        Self {
            size,
            scripted: frames,
            cursors: HashMap::new(),
            calls: 0,
        }
    }
}

impl FrameGrabber for SyntheticGrabber {
    fn acquire(&mut self, camera_id: u32, _timeout: Duration) -> Result<ImageU8, CaptureError> {
        self.calls += 1;
        if let Some(frames) = self.scripted.get(&camera_id) {
            let cursor = self.cursors.entry(camera_id).or_insert(0);
            let img = frames[*cursor % frames.len()].clone();
            *cursor += 1;
            return Ok(img);
        }
        Ok(noise_texture(
            self.size.0,
            self.size.1,
            camera_id.wrapping_mul(7919) ^ self.calls,
        ))
    }
}

/// Shells out to a still-capture command per frame.
///
/// The command template substitutes `{camera}` and `{output}`; the child is
/// recorded in the PID registry for its whole lifetime and killed on
/// timeout.
pub struct CommandGrabber {
    program: String,
    args: Vec<String>,
    registry: Arc<PidRegistry>,
    scratch: PathBuf,
    counter: u64,
}

impl CommandGrabber {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        registry: Arc<PidRegistry>,
        scratch: impl Into<PathBuf>,
    ) -> Self {
        let scratch = scratch.into();
        if let Err(e) = std::fs::create_dir_all(&scratch) {
            log::warn!("cannot create scratch dir {}: {e}", scratch.display());
        }
        Self {
            program: program.into(),
            args,
            registry,
            scratch,
            counter: 0,
        }
    }
}

impl FrameGrabber for CommandGrabber {
    fn acquire(&mut self, camera_id: u32, timeout: Duration) -> Result<ImageU8, CaptureError> {
        let output = self
            .scratch
            .join(format!("cam{camera_id}_{:06}.png", self.counter));
        self.counter += 1;

        let mut cmd = Command::new(&self.program);
        for arg in &self.args {
            cmd.arg(
                arg.replace("{camera}", &camera_id.to_string())
                    .replace("{output}", &output.to_string_lossy()),
            );
        }

        let mut child = self.registry.spawn_tracked(&mut cmd, &self.program)?;
        match child.wait_timeout(timeout)? {
            Some(status) if status.success() => {
                let img = load_gray(&output)?;
                std::fs::remove_file(&output).ok();
                Ok(img)
            }
            Some(status) => {
                std::fs::remove_file(&output).ok();
                Err(CaptureError::Io(std::io::Error::other(format!(
                    "capture command for camera {camera_id} exited with {status}"
                ))))
            }
            None => {
                child.kill_and_wait();
                Err(CaptureError::Timeout {
                    camera_id,
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

/// Synchronized acquisition from the two cameras, with validation and
/// bounded retry.
#[derive(Debug)]
pub struct DualCapture<G: FrameGrabber> {
    grabber: G,
    config: CaptureConfig,
    seq: u64,
}

impl<G: FrameGrabber> DualCapture<G> {
    pub fn new(grabber: G, config: CaptureConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            grabber,
            config,
            seq: 0,
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Trigger one camera and write the frame to `path`.
    pub fn capture_and_save_image(
        &mut self,
        camera_id: u32,
        path: &Path,
    ) -> Result<(), CaptureError> {
        let img = self.grabber.acquire(camera_id, self.config.capture_timeout)?;
        save_gray(&img, path)
    }

    /// Basic sanity for a captured pair: expected resolution, not flat,
    /// neither black nor saturated.
    pub fn validate_images(&self, left: &ImageU8, right: &ImageU8) -> Result<(), CaptureError> {
        for (name, img) in [("left", left), ("right", right)] {
            if img.size() != self.config.image_size {
                return Err(CaptureError::InvalidPair(format!(
                    "{name} frame is {}x{}, expected {}x{}",
                    img.width(),
                    img.height(),
                    self.config.image_size.0,
                    self.config.image_size.1
                )));
            }
            let mean = img.mean();
            if mean < 5.0 {
                return Err(CaptureError::InvalidPair(format!(
                    "{name} frame is black (mean {mean:.1})"
                )));
            }
            if mean > 250.0 {
                return Err(CaptureError::InvalidPair(format!(
                    "{name} frame is saturated (mean {mean:.1})"
                )));
            }
            let (lo, hi) = img
                .as_slice()
                .iter()
                .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            if hi - lo < 3 {
                return Err(CaptureError::InvalidPair(format!(
                    "{name} frame has no contrast (range {lo}..{hi})"
                )));
            }
        }
        Ok(())
    }

    /// One validated [`FramePair`], retrying rejected pairs up to the
    /// configured attempt count.
    pub fn capture_pair(&mut self) -> Result<FramePair, CaptureError> {
        for attempt in 1..=self.config.max_attempts {
            let left = self
                .grabber
                .acquire(self.config.left_camera, self.config.capture_timeout)?;
            let right = self
                .grabber
                .acquire(self.config.right_camera, self.config.capture_timeout)?;
            match self.validate_images(&left, &right) {
                Ok(()) => {
                    let pair = FramePair::new(left, right, self.seq)?;
                    self.seq += 1;
                    return Ok(pair);
                }
                Err(e) => {
                    log::warn!("capture attempt {attempt}: {e}; retrying");
                }
            }
        }
        Err(CaptureError::Exhausted {
            attempts: self.config.max_attempts,
        })
    }

    /// Capture and persist `n` validated pairs as `left_NN.png` /
    /// `right_NN.png` under `folder` (the calibration input layout).
    pub fn capture_images(&mut self, n: usize, folder: &Path) -> Result<(), CaptureError> {
        std::fs::create_dir_all(folder)?;
        for idx in 1..=n {
            let pair = self.capture_pair()?;
            save_gray(&pair.left, &folder.join(format!("left_{idx:02}.png")))?;
            save_gray(&pair.right, &folder.join(format!("right_{idx:02}.png")))?;
            log::info!("captured pair {idx:02}/{n}");
        }
        Ok(())
    }

    /// Debug aid: write the two frames side by side. Out of the live path.
    pub fn display_images(
        &self,
        left: &ImageU8,
        right: &ImageU8,
        path: &Path,
    ) -> Result<(), CaptureError> {
        let (w, h) = left.size();
        let mut rgb = vec![0u8; 2 * w * h * 3];
        for y in 0..h {
            for x in 0..w {
                for (offset, img) in [(0usize, left), (w, right)] {
                    let v = img.get(x, y);
                    let at = (y * 2 * w + x + offset) * 3;
                    rgb[at] = v;
                    rgb[at + 1] = v;
                    rgb[at + 2] = v;
                }
            }
        }
        save_rgb(2 * w, h, rgb, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CaptureConfig {
        CaptureConfig {
            image_size: (32, 24),
            capture_timeout: Duration::from_millis(500),
            max_attempts: 2,
            ..Default::default()
        }
    }

    #[test]
    fn synthetic_pair_passes_validation() {
        let mut capture =
            DualCapture::new(SyntheticGrabber::uniform((32, 24)), small_config()).unwrap();
        let pair = capture.capture_pair().unwrap();
        assert!(pair.accepted);
        assert_eq!(pair.size(), (32, 24));
        assert_eq!(pair.seq, 0);
        assert_eq!(capture.capture_pair().unwrap().seq, 1);
    }

    #[test]
    fn flat_frames_exhaust_retries() {
        let flat = ImageU8::new(32, 24, 128);
        let frames = HashMap::from([(0, vec![flat.clone()]), (1, vec![flat])]);
        let mut capture = DualCapture::new(
            SyntheticGrabber::scripted((32, 24), frames),
            small_config(),
        )
        .unwrap();
        let err = capture.capture_pair().unwrap_err();
        assert!(matches!(err, CaptureError::Exhausted { attempts: 2 }));
    }

    #[test]
    fn wrong_resolution_is_rejected() {
        let mut capture =
            DualCapture::new(SyntheticGrabber::uniform((16, 16)), small_config()).unwrap();
        let err = capture.capture_pair().unwrap_err();
        assert!(matches!(err, CaptureError::Exhausted { .. }));
    }

    #[test]
    fn capture_images_writes_pair_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut capture =
            DualCapture::new(SyntheticGrabber::uniform((32, 24)), small_config()).unwrap();
        capture.capture_images(3, dir.path()).unwrap();
        for idx in 1..=3 {
            assert!(dir.path().join(format!("left_{idx:02}.png")).exists());
            assert!(dir.path().join(format!("right_{idx:02}.png")).exists());
        }
    }

    #[test]
    fn command_grabber_loads_what_the_command_writes() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(PidRegistry::open(&dir.path().join("pids")).unwrap());
        let fixture = dir.path().join("fixture.png");
        save_gray(&noise_texture(32, 24, 3), &fixture).unwrap();

        let mut grabber = CommandGrabber::new(
            "/bin/sh",
            vec![
                "-c".into(),
                format!("cp {} {{output}}", fixture.display()),
            ],
            registry,
            dir.path(),
        );
        let img = grabber.acquire(0, Duration::from_secs(5)).unwrap();
        assert_eq!(img.size(), (32, 24));
    }

    #[test]
    fn command_grabber_times_out_and_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(PidRegistry::open(&dir.path().join("pids")).unwrap());
        let mut grabber = CommandGrabber::new(
            "/bin/sh",
            vec!["-c".into(), "sleep 30".into()],
            registry.clone(),
            dir.path(),
        );
        let err = grabber.acquire(1, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, CaptureError::Timeout { camera_id: 1, .. }));
        // The timed-out child was killed and unregistered: nothing to reap.
        assert_eq!(registry.reap_orphans().unwrap(), 0);
    }

    #[test]
    fn failing_command_surfaces_the_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(PidRegistry::open(&dir.path().join("pids")).unwrap());
        let mut grabber = CommandGrabber::new(
            "/bin/sh",
            vec!["-c".into(), "exit 3".into()],
            registry,
            dir.path(),
        );
        assert!(grabber.acquire(0, Duration::from_secs(5)).is_err());
    }
}
