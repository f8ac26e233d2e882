//! Rendering sinks and interactive key sources.
//!
//! The display worker is headless-friendly: the default sink renders the
//! colormapped disparity with contour overlays into a PNG that is atomically
//! swapped in place, and distances are reported through the log. Key input
//! comes through a trait so tests can script it.

use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use stereo_core::image::io::save_gray;
use stereo_core::{PipelineError, PipelineMessage};

/// Recognized interactive actions during the live loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyCommand {
    /// Tear the pipeline down.
    Quit,
    /// Persist the current disparity/depth images.
    Save,
    /// Report the current frame's object distances.
    Analyze,
}

/// Non-blocking source of interactive commands.
pub trait KeySource: Send {
    fn poll(&mut self) -> Option<KeyCommand>;
}

/// Reads `q`/`s`/`a` from the terminal via crossterm events.
pub struct TerminalKeys;

impl KeySource for TerminalKeys {
    fn poll(&mut self) -> Option<KeyCommand> {
        if !crossterm::event::poll(Duration::from_millis(0)).ok()? {
            return None;
        }
        match crossterm::event::read().ok()? {
            crossterm::event::Event::Key(key) => match key.code {
                crossterm::event::KeyCode::Char('q') => Some(KeyCommand::Quit),
                crossterm::event::KeyCode::Char('s') => Some(KeyCommand::Save),
                crossterm::event::KeyCode::Char('a') => Some(KeyCommand::Analyze),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Scripted command sequence for tests.
pub struct ScriptedKeys {
    commands: VecDeque<KeyCommand>,
}

impl ScriptedKeys {
    pub fn new(commands: impl IntoIterator<Item = KeyCommand>) -> Self {
        Self {
            commands: commands.into_iter().collect(),
        }
    }
}

impl KeySource for ScriptedKeys {
    fn poll(&mut self) -> Option<KeyCommand> {
        self.commands.pop_front()
    }
}

/// Consumer of pipeline messages on the display side.
pub trait DisplaySink: Send {
    /// Render the freshest frame.
    fn present(&mut self, msg: &PipelineMessage) -> Result<(), PipelineError>;

    /// Persist the frame's images (the `save` key).
    fn save_snapshot(&mut self, msg: &PipelineMessage) -> Result<(), PipelineError>;
}

/// Piecewise-linear jet-style colormap over one byte.
fn jet(v: u8) -> [u8; 3] {
    let t = v as f32 / 255.0;
    let r = ((1.5 - (4.0 * t - 3.0).abs()).clamp(0.0, 1.0) * 255.0) as u8;
    let g = ((1.5 - (4.0 * t - 2.0).abs()).clamp(0.0, 1.0) * 255.0) as u8;
    let b = ((1.5 - (4.0 * t - 1.0).abs()).clamp(0.0, 1.0) * 255.0) as u8;
    [r, g, b]
}

/// Writes the live view into `out_dir/live.png` (atomic rename) and numbered
/// snapshots on demand.
pub struct PngSink {
    out_dir: PathBuf,
}

impl PngSink {
    pub fn new(out_dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let out_dir = out_dir.into();
        std::fs::create_dir_all(&out_dir)?;
        Ok(Self { out_dir })
    }

    fn render(&self, msg: &PipelineMessage) -> (usize, usize, Vec<u8>) {
        let normalized = msg.disparity.normalized();
        let (w, h) = normalized.size();
        let mut rgb = vec![0u8; w * h * 3];
        for y in 0..h {
            for x in 0..w {
                let px = jet(normalized.get(x, y));
                let at = (y * w + x) * 3;
                rgb[at..at + 3].copy_from_slice(&px);
            }
        }
        for region in &msg.regions {
            for &(x, y) in &region.contour {
                let at = (y as usize * w + x as usize) * 3;
                rgb[at..at + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        (w, h, rgb)
    }
}

impl DisplaySink for PngSink {
    fn present(&mut self, msg: &PipelineMessage) -> Result<(), PipelineError> {
        let (w, h, rgb) = self.render(msg);
        // Write-then-rename so readers of live.png never see a torn frame.
        let tmp = self.out_dir.join("live.tmp.png");
        stereo_core::image::io::save_rgb(w, h, rgb, &tmp)?;
        std::fs::rename(&tmp, self.out_dir.join("live.png"))?;
        for region in &msg.regions {
            log::info!(
                "frame {}: object in band {} at {:.2} m ({} px)",
                msg.seq,
                region.band,
                region.mean_distance,
                region.area
            );
        }
        Ok(())
    }

    fn save_snapshot(&mut self, msg: &PipelineMessage) -> Result<(), PipelineError> {
        let seq = msg.seq;
        save_gray(
            &msg.disparity.normalized(),
            &self.out_dir.join(format!("disparity_{seq:06}.png")),
        )?;
        let (w, h, rgb) = self.render(msg);
        stereo_core::image::io::save_rgb(
            w,
            h,
            rgb,
            &self.out_dir.join(format!("depthmap_{seq:06}.png")),
        )?;
        let report = self.out_dir.join(format!("objects_{seq:06}.txt"));
        let mut file = std::fs::File::create(report)?;
        for region in &msg.regions {
            writeln!(
                file,
                "band {} range {}..{} area {} mean {:.4}",
                region.band,
                region.band_range.0,
                region.band_range.1,
                region.area,
                region.mean_distance
            )?;
        }
        log::info!("saved snapshot for frame {seq}");
        Ok(())
    }
}

/// Counting sink for tests.
#[derive(Default)]
pub struct NullSink {
    pub presented: Vec<u64>,
    pub saved: Vec<u64>,
}

impl DisplaySink for NullSink {
    fn present(&mut self, msg: &PipelineMessage) -> Result<(), PipelineError> {
        self.presented.push(msg.seq);
        Ok(())
    }

    fn save_snapshot(&mut self, msg: &PipelineMessage) -> Result<(), PipelineError> {
        self.saved.push(msg.seq);
        Ok(())
    }
}
