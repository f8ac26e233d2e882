//! Live stereo depth pipeline.
//!
//! One capture+compute worker turns synchronized frame pairs into disparity
//! and depth maps and segments them into objects; one display worker drains
//! a bounded queue and renders the freshest result. The supervisor owns both
//! workers, the queue, every tracked child process, and all cleanup paths.

/// Frame acquisition behind the [`capture::FrameGrabber`] trait.
pub mod capture;
/// Rendering sinks and interactive key sources.
pub mod display;
/// Binary mask morphology, connected components, and contour tracing.
pub mod mask;
/// Tracked child processes and the on-disk PID registry.
pub mod process;
/// The bounded evict-oldest message queue.
pub mod queue;
/// Depth-map segmentation into distinct objects.
pub mod segment;
/// Disparity and depth computation.
pub mod stereo;
/// Worker topology, shutdown, and cleanup.
pub mod supervisor;
/// Time-of-flight collaborator boundary.
pub mod tof;

pub use capture::{CommandGrabber, DualCapture, FrameGrabber, SyntheticGrabber};
pub use display::{DisplaySink, KeyCommand, KeySource, NullSink, PngSink, ScriptedKeys, TerminalKeys};
pub use queue::BoundedLatestQueue;
pub use segment::DepthSegmenter;
pub use stereo::StereoEngine;
pub use supervisor::{PipelineSupervisor, SupervisorState};
pub use tof::{segment_tof_frame, SyntheticTofSource, TofFrame, TofSource};
