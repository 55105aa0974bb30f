//! Heartbeat scheduler
//!
//! Owns the tick rate, the listener registry and the delta-time bookkeeping.
//! Listeners are ticked in registration order. Anything that implements
//! [`Tickable`] can register, and so can a plain `FnMut(f32)` callback.
//!
//! The scheduler is single threaded. Listener updates run synchronously and
//! may register or unregister listeners (including themselves) while a tick
//! is in progress:
//! - unregistering suppresses the entry immediately, so it is never invoked
//!   again, and the structural removal is deferred to the end of the tick
//! - listeners registered during a tick are first invoked on the next tick
//!
//! The heartbeat starts lazily on the first registration and stops itself on
//! the first tick that finds no listeners, resetting the elapsed accumulator.

use crate::clock::{Clock, SystemClock};
use crate::config::{frame_duration_ms, validate_tick_rate, SchedulerConfig};
use crate::error::{AnimationError, Result};
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::thread;
use std::time::Duration;

new_key_type! {
    /// Handle to a registered listener
    pub struct ListenerId;
}

/// Something that wants to be told how much time passed on every tick
pub trait Tickable {
    /// Advance by `dt_ms` milliseconds
    ///
    /// Errors are logged by the scheduler and never stop other listeners
    /// from being ticked.
    fn update(&self, dt_ms: f32) -> Result<()>;
}

#[derive(Clone)]
enum Listener {
    Tickable(Rc<dyn Tickable>),
    Callback(Rc<RefCell<dyn FnMut(f32)>>),
}

impl Listener {
    fn invoke(&self, dt_ms: f32) -> Result<()> {
        match self {
            Listener::Tickable(tickable) => tickable.update(dt_ms),
            Listener::Callback(callback) => {
                let mut callback = callback
                    .try_borrow_mut()
                    .map_err(|_| AnimationError::ListenerBusy)?;
                (&mut *callback)(dt_ms);
                Ok(())
            }
        }
    }
}

/// Registration record kept by the scheduler, never on the listener itself
struct ListenerEntry {
    listener: Listener,
    suppressed: bool,
}

struct SchedulerInner {
    listeners: SlotMap<ListenerId, ListenerEntry>,
    /// Registration order
    order: Vec<ListenerId>,
    /// Removals requested mid-tick, applied when the tick ends
    pending_removals: SmallVec<[ListenerId; 4]>,
    in_tick: bool,
    running: bool,
    tick_rate_hz: f32,
    frame_duration_ms: f64,
    elapsed_ms: f64,
    last_tick: f64,
    next_deadline: f64,
    clock: Rc<dyn Clock>,
}

impl SchedulerInner {
    fn register(&mut self, listener: Listener) -> ListenerId {
        let id = self.listeners.insert(ListenerEntry {
            listener,
            suppressed: false,
        });
        self.order.push(id);

        if !self.running {
            self.start();
        }
        id
    }

    fn unregister(&mut self, id: ListenerId) -> bool {
        let Some(entry) = self.listeners.get_mut(id) else {
            return false;
        };
        if entry.suppressed {
            return false;
        }
        entry.suppressed = true;

        if self.in_tick {
            self.pending_removals.push(id);
        } else {
            self.listeners.remove(id);
            self.order.retain(|other| *other != id);
        }
        true
    }

    fn unregister_all(&mut self) {
        if self.in_tick {
            for (id, entry) in self.listeners.iter_mut() {
                if !entry.suppressed {
                    entry.suppressed = true;
                    self.pending_removals.push(id);
                }
            }
        } else {
            self.listeners.clear();
            self.order.clear();
        }
    }

    fn flush_removals(&mut self) {
        if self.pending_removals.is_empty() {
            return;
        }
        for id in self.pending_removals.drain(..) {
            self.listeners.remove(id);
        }
        let listeners = &self.listeners;
        self.order.retain(|id| listeners.contains_key(*id));
    }

    fn live_count(&self) -> usize {
        self.listeners.values().filter(|e| !e.suppressed).count()
    }

    fn start(&mut self) {
        if self.running {
            return;
        }
        let now = self.clock.now_ms();
        self.running = true;
        self.last_tick = now;
        self.next_deadline = now + self.frame_duration_ms;
        tracing::debug!(
            "Scheduler: started at {} Hz ({} ms frames)",
            self.tick_rate_hz,
            self.frame_duration_ms
        );
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            tracing::debug!("Scheduler: stopped after {} ms", self.elapsed_ms);
        }
    }
}

/// The heartbeat that ticks every registered listener
///
/// Hand [`SchedulerHandle`]s to anything that needs to register itself.
///
/// ```ignore
/// let scheduler = Scheduler::new();
/// let handle = scheduler.handle();
/// handle.register_fn(|dt| println!("{dt} ms"))?;
/// scheduler.run();
/// ```
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

impl Scheduler {
    /// Scheduler on the wall clock at the default 30 Hz
    pub fn new() -> Self {
        Self::build(SchedulerConfig::default(), Rc::new(SystemClock::new()))
    }

    /// Scheduler on the wall clock with the given configuration
    pub fn with_config(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, Rc::new(SystemClock::new())))
    }

    /// Scheduler on a custom time source
    pub fn with_clock<C: Clock + 'static>(config: SchedulerConfig, clock: C) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, Rc::new(clock)))
    }

    fn build(config: SchedulerConfig, clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                listeners: SlotMap::with_key(),
                order: Vec::new(),
                pending_removals: SmallVec::new(),
                in_tick: false,
                running: false,
                tick_rate_hz: config.tick_rate_hz,
                frame_duration_ms: config.frame_duration_ms(),
                elapsed_ms: 0.0,
                last_tick: 0.0,
                next_deadline: 0.0,
                clock,
            })),
        }
    }

    /// Get a weak handle for passing to animations
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Register an updatable listener; starts the heartbeat if idle
    ///
    /// Registering the same listener twice ticks it twice per frame.
    pub fn register_tickable(&self, listener: Rc<dyn Tickable>) -> ListenerId {
        self.inner
            .borrow_mut()
            .register(Listener::Tickable(listener))
    }

    /// Register a plain callback receiving the delta time in milliseconds
    pub fn register_fn<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(f32) + 'static,
    {
        let callback: Rc<RefCell<dyn FnMut(f32)>> = Rc::new(RefCell::new(callback));
        self.inner
            .borrow_mut()
            .register(Listener::Callback(callback))
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unregister(&self, id: ListenerId) -> bool {
        self.inner.borrow_mut().unregister(id)
    }

    /// Remove every listener without stopping the heartbeat
    ///
    /// The next tick notices the empty registry and stops.
    pub fn unregister_all(&self) {
        self.inner.borrow_mut().unregister_all();
    }

    pub fn is_registered(&self, id: ListenerId) -> bool {
        self.inner
            .borrow()
            .listeners
            .get(id)
            .is_some_and(|e| !e.suppressed)
    }

    /// Number of live (not suppressed) registrations
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().live_count()
    }

    /// Change the tick rate, restarting the timer if it is running
    pub fn set_tick_rate(&self, hz: f32) -> Result<()> {
        validate_tick_rate(hz)?;
        let mut inner = self.inner.borrow_mut();
        inner.tick_rate_hz = hz;
        inner.frame_duration_ms = frame_duration_ms(hz);
        tracing::debug!("Scheduler: tick rate set to {} Hz", hz);

        if inner.running {
            inner.running = false;
            inner.start();
        }
        Ok(())
    }

    pub fn tick_rate_hz(&self) -> f32 {
        self.inner.borrow().tick_rate_hz
    }

    pub fn frame_duration_ms(&self) -> f64 {
        self.inner.borrow().frame_duration_ms
    }

    /// Start the heartbeat (no-op if already running)
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        validate_tick_rate(inner.tick_rate_hz)?;
        inner.start();
        Ok(())
    }

    /// Stop the heartbeat, keeping listeners and the elapsed accumulator
    pub fn stop(&self) {
        self.inner.borrow_mut().stop();
    }

    /// Remove every listener, stop, and zero the elapsed accumulator
    pub fn reset(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.unregister_all();
        inner.stop();
        inner.elapsed_ms = 0.0;
    }

    pub fn is_running(&self) -> bool {
        self.inner.borrow().running
    }

    /// Total of all deltas since the heartbeat last started from empty
    pub fn elapsed_ms(&self) -> f64 {
        self.inner.borrow().elapsed_ms
    }

    /// Milliseconds until the next tick is due, zero if overdue
    pub fn time_until_next_tick(&self) -> f64 {
        let inner = self.inner.borrow();
        (inner.next_deadline - inner.clock.now_ms()).max(0.0)
    }

    /// Run one heartbeat tick
    ///
    /// Computes the delta since the previous tick and hands it to every live
    /// listener. Returns whether the heartbeat is still running afterwards.
    pub fn tick(&self) -> bool {
        let (dt_ms, snapshot) = {
            let mut inner = self.inner.borrow_mut();
            if !inner.running {
                return false;
            }
            if inner.in_tick {
                tracing::warn!("Scheduler: tick() called from inside a listener, ignored");
                return true;
            }

            let now = inner.clock.now_ms();
            let dt = (now - inner.last_tick).max(0.0);
            inner.last_tick = now;
            inner.elapsed_ms += dt;

            // All listeners removed themselves: stop the heartbeat
            if inner.live_count() == 0 {
                inner.stop();
                inner.elapsed_ms = 0.0;
                inner.listeners.clear();
                inner.order.clear();
                return false;
            }

            inner.in_tick = true;
            let snapshot: SmallVec<[ListenerId; 16]> = inner.order.iter().copied().collect();
            (dt as f32, snapshot)
        };

        for id in snapshot {
            let listener = {
                let inner = self.inner.borrow();
                match inner.listeners.get(id) {
                    Some(entry) if !entry.suppressed => entry.listener.clone(),
                    _ => continue,
                }
            };

            if let Err(err) = listener.invoke(dt_ms) {
                tracing::warn!("Scheduler: listener {:?} failed: {}", id, err);
            }
        }

        let mut inner = self.inner.borrow_mut();
        inner.in_tick = false;
        inner.flush_removals();
        inner.running
    }

    /// Tick if the heartbeat deadline has passed; returns whether it ticked
    pub fn poll(&self) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.running {
                return false;
            }
            let now = inner.clock.now_ms();
            if now < inner.next_deadline {
                return false;
            }
            inner.next_deadline += inner.frame_duration_ms;
            // Fell behind by more than a frame: don't burst to catch up
            if inner.next_deadline <= now {
                inner.next_deadline = now + inner.frame_duration_ms;
            }
        }
        self.tick();
        true
    }

    /// Block the current thread, ticking on schedule until the heartbeat stops
    ///
    /// Only meaningful with a clock that advances on its own. Returns the
    /// number of ticks performed.
    pub fn run(&self) -> u64 {
        let mut ticks = 0;
        while self.is_running() {
            let wait = self.time_until_next_tick();
            if wait > 0.0 {
                thread::sleep(Duration::from_secs_f64(wait / 1000.0));
            }
            if self.poll() {
                ticks += 1;
            }
        }
        ticks
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// A weak handle to the scheduler
///
/// Passed to timelines and frame animations so they can register and
/// unregister themselves. It won't keep the scheduler alive.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Weak<RefCell<SchedulerInner>>,
}

impl SchedulerHandle {
    fn upgrade(&self) -> Result<Rc<RefCell<SchedulerInner>>> {
        self.inner
            .upgrade()
            .ok_or(AnimationError::SchedulerUnavailable)
    }

    /// Register an updatable listener
    pub fn register(&self, listener: Rc<dyn Tickable>) -> Result<ListenerId> {
        let inner = self.upgrade()?;
        let id = inner.borrow_mut().register(Listener::Tickable(listener));
        Ok(id)
    }

    /// Register a plain callback
    pub fn register_fn<F>(&self, callback: F) -> Result<ListenerId>
    where
        F: FnMut(f32) + 'static,
    {
        let inner = self.upgrade()?;
        let callback: Rc<RefCell<dyn FnMut(f32)>> = Rc::new(RefCell::new(callback));
        let id = inner.borrow_mut().register(Listener::Callback(callback));
        Ok(id)
    }

    /// Remove a listener; no-op if it is gone or the scheduler is dropped
    pub fn unregister(&self, id: ListenerId) -> bool {
        match self.inner.upgrade() {
            Some(inner) => inner.borrow_mut().unregister(id),
            None => false,
        }
    }

    pub fn is_registered(&self, id: ListenerId) -> bool {
        self.inner.upgrade().is_some_and(|inner| {
            inner
                .borrow()
                .listeners
                .get(id)
                .is_some_and(|e| !e.suppressed)
        })
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.borrow().running)
    }

    /// Check if the scheduler is still alive
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

thread_local! {
    static DEFAULT_SCHEDULER: Scheduler = Scheduler::new();
}

/// Handle to this thread's default scheduler
///
/// Convenience for applications with a single clock. Anything that needs
/// deterministic time should build its own [`Scheduler`].
pub fn default_handle() -> SchedulerHandle {
    DEFAULT_SCHEDULER.with(|scheduler| scheduler.handle())
}

/// Run a closure against this thread's default scheduler
pub fn with_default_scheduler<R>(f: impl FnOnce(&Scheduler) -> R) -> R {
    DEFAULT_SCHEDULER.with(f)
}
