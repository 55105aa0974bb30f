//! Frame-based (sprite sheet) animation
//!
//! Advances a frame counter by one on every tick until the end of the
//! current segment, optionally looping a segment a bounded or unbounded
//! number of times. Mapping frames to sheet geometry is left to the renderer.

use crate::error::{AnimationError, Result};
use crate::scheduler::{ListenerId, SchedulerHandle, Tickable};
use crate::timeline::Callback;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FrameLoop {
    start: u32,
    end: u32,
    /// Extra passes left, `None` loops forever
    remaining: Option<u32>,
}

struct FrameInner {
    scheduler: SchedulerHandle,
    frame_count: u32,
    frame: u32,
    /// Exclusive end of the playing segment
    stop_at: Option<u32>,
    looping: Option<FrameLoop>,
    registration: Option<ListenerId>,
    on_complete: Option<Callback>,
}

impl FrameInner {
    fn segment_end(&self) -> u32 {
        self.stop_at
            .unwrap_or(self.frame_count)
            .min(self.frame_count)
    }

    fn check_range(&self, start: u32, end: u32) -> Result<()> {
        if start < end && end <= self.frame_count {
            Ok(())
        } else {
            Err(AnimationError::InvalidFrameRange {
                start,
                end,
                frame_count: self.frame_count,
            })
        }
    }

    /// Returns true when playback finished on this tick
    fn advance(&mut self) -> bool {
        if self.frame + 1 < self.segment_end() {
            self.frame += 1;
            return false;
        }

        if let Some(pass) = self
            .looping
            .as_mut()
            .filter(|pass| pass.remaining != Some(0))
        {
            self.frame = pass.start;
            self.stop_at = Some(pass.end);
            if let Some(remaining) = pass.remaining.as_mut() {
                *remaining -= 1;
            }
            return false;
        }

        self.unregister();
        true
    }

    fn unregister(&mut self) {
        if let Some(id) = self.registration.take() {
            self.scheduler.unregister(id);
        }
    }
}

/// Sprite frame counter driven by the scheduler
///
/// Starts playing as soon as it is created. Cloning yields another handle to
/// the same animation.
#[derive(Clone)]
pub struct FrameAnimation {
    inner: Rc<RefCell<FrameInner>>,
}

impl FrameAnimation {
    pub fn new(scheduler: &SchedulerHandle, frame_count: u32) -> Result<Self> {
        if frame_count == 0 {
            return Err(AnimationError::InvalidFrameRange {
                start: 0,
                end: 0,
                frame_count,
            });
        }
        if !scheduler.is_alive() {
            return Err(AnimationError::SchedulerUnavailable);
        }

        let animation = Self {
            inner: Rc::new(RefCell::new(FrameInner {
                scheduler: scheduler.clone(),
                frame_count,
                frame: 0,
                stop_at: None,
                looping: None,
                registration: None,
                on_complete: None,
            })),
        };
        animation.ensure_registered()?;
        Ok(animation)
    }

    /// Stop playing once `frame` is reached
    pub fn stop_at(&self, frame: u32) -> &Self {
        self.inner.borrow_mut().stop_at = Some(frame);
        self
    }

    /// Loop frames `start..end`; `times` extra passes, `None` for forever
    pub fn loop_segment(&self, times: Option<u32>, start: u32, end: u32) -> Result<&Self> {
        let mut inner = self.inner.borrow_mut();
        inner.check_range(start, end)?;
        inner.looping = Some(FrameLoop {
            start,
            end,
            remaining: times,
        });
        inner.stop_at = Some(end);
        Ok(self)
    }

    /// Jump to `start` and play until `end`, resuming playback if stopped
    pub fn play_segment(&self, start: u32, end: u32) -> Result<&Self> {
        {
            let mut inner = self.inner.borrow_mut();
            inner.check_range(start, end)?;
            inner.frame = start;
            inner.stop_at = Some(end);
        }
        self.ensure_registered()?;
        Ok(self)
    }

    /// Callback fired every time playback ends
    pub fn on_complete<F: FnMut() + 'static>(&self, callback: F) -> &Self {
        self.inner.borrow_mut().on_complete = Some(Rc::new(RefCell::new(callback)));
        self
    }

    /// Stop playing and fire the completion callback
    pub fn stop(&self) {
        let callback = {
            let mut inner = self.inner.borrow_mut();
            if inner.registration.is_none() {
                return;
            }
            inner.unregister();
            inner.on_complete.clone()
        };
        if let Some(callback) = callback {
            (&mut *callback.borrow_mut())();
        }
    }

    /// Stop playing silently
    pub fn cancel(&self) {
        self.inner.borrow_mut().unregister();
    }

    pub fn frame(&self) -> u32 {
        self.inner.borrow().frame
    }

    pub fn frame_count(&self) -> u32 {
        self.inner.borrow().frame_count
    }

    pub fn is_playing(&self) -> bool {
        let inner = self.inner.borrow();
        inner
            .registration
            .is_some_and(|id| inner.scheduler.is_registered(id))
    }

    /// Loop passes left, `None` when not looping or looping forever
    pub fn loops_remaining(&self) -> Option<u32> {
        self.inner.borrow().looping.and_then(|l| l.remaining)
    }

    fn ensure_registered(&self) -> Result<()> {
        let scheduler = {
            let inner = self.inner.borrow();
            if inner.registration.is_some() {
                return Ok(());
            }
            inner.scheduler.clone()
        };
        let id = scheduler.register(Rc::new(self.clone()))?;
        self.inner.borrow_mut().registration = Some(id);
        Ok(())
    }
}

impl Tickable for FrameAnimation {
    fn update(&self, _dt_ms: f32) -> Result<()> {
        let callback = {
            let mut inner = self
                .inner
                .try_borrow_mut()
                .map_err(|_| AnimationError::ListenerBusy)?;
            if !inner.advance() {
                return Ok(());
            }
            inner.on_complete.clone()
        };

        if let Some(callback) = callback {
            let mut callback = callback
                .try_borrow_mut()
                .map_err(|_| AnimationError::ListenerBusy)?;
            (&mut *callback)();
        }
        Ok(())
    }
}
