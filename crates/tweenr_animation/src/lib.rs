//! Tweenr Animation System
//!
//! A heartbeat scheduler and a tween engine on top of it.
//!
//! # Features
//!
//! - **Scheduler**: fixed-rate heartbeat handing a millisecond delta to every listener
//! - **Timelines**: queued property tweens with waits, callbacks and infinite loops
//! - **Easing**: registry of pure easing curves (quad, power, bounce, sine)
//! - **Frame Animations**: sprite frame counters with bounded or endless looping
//! - **Deterministic Time**: swap the wall clock for a manual one in tests and tools

pub mod clock;
pub mod config;
pub mod easing;
pub mod error;
pub mod frames;
pub mod scheduler;
pub mod target;
pub mod timeline;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use easing::{pow_in, pow_in_out, pow_out, Easing};
pub use error::{AnimationError, Result};
pub use frames::FrameAnimation;
pub use scheduler::{
    default_handle, with_default_scheduler, ListenerId, Scheduler, SchedulerHandle, Tickable,
};
pub use target::{Animatable, PropertyBag, PropertyMap};
pub use timeline::{Callback, Goal, StepKind, Timeline, TimelineState};
