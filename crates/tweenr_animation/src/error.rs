//! Animation error types

use thiserror::Error;

/// Errors raised by the scheduler, timelines and frame animations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimationError {
    /// The scheduler behind a handle has been dropped
    #[error("Animation scheduler is not available")]
    SchedulerUnavailable,

    /// Tick rate must be a positive, finite number of ticks per second
    #[error("Invalid tick rate: {0} Hz")]
    InvalidTickRate(f32),

    /// Step durations must be finite and non-negative
    #[error("Invalid step duration: {0} ms")]
    InvalidDuration(f32),

    /// The target has no property with this name
    #[error("Unknown property on target: {0}")]
    UnknownProperty(String),

    /// Name lookup in the easing registry failed
    #[error("Unknown easing function: {0}")]
    UnknownEasing(String),

    /// Frame segment is empty or out of bounds
    #[error("Invalid frame range {start}..{end} (frame count {frame_count})")]
    InvalidFrameRange {
        start: u32,
        end: u32,
        frame_count: u32,
    },

    /// The target object was already borrowed when a timeline tried to write to it
    #[error("Animation target is borrowed elsewhere")]
    TargetBusy,

    /// A listener was re-entered while its own update was still running
    #[error("Listener is already being updated")]
    ListenerBusy,

    /// Free-form failure reported by a user listener
    #[error("Listener failed: {0}")]
    Listener(String),
}

/// Result type for animation operations
pub type Result<T> = std::result::Result<T, AnimationError>;
