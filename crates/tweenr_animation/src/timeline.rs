//! Timeline (tween) engine
//!
//! A timeline is a queue of steps played back against one target object:
//!
//! ```ignore
//! let ball = Rc::new(RefCell::new(PropertyBag::new().with("x", 0.0)));
//! Timeline::new(&scheduler.handle(), ball.clone())?
//!     .to([("x", 100.0)], 500.0, Some(Easing::BounceOut))?
//!     .wait(250.0)?
//!     .to([("x", 0.0)], 500.0, None)?
//!     .then(|| tracing::info!("done"));
//! ```
//!
//! Every step starts where all previous steps end, so the step active at a
//! given elapsed time is found by searching the queue rather than by
//! assuming one step per tick. Start values are captured when a step is
//! queued and never re-sampled.

use crate::easing::Easing;
use crate::error::{AnimationError, Result};
use crate::scheduler::{ListenerId, SchedulerHandle, Tickable};
use crate::target::{Animatable, PropertyMap};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

/// Shared, re-invocable callback
pub type Callback = Rc<RefCell<dyn FnMut()>>;

/// What a `to` step moves towards
pub enum Goal {
    /// Interpolate these properties to their end values
    Properties(PropertyMap),
    /// Invoke a callback once when the step's window runs out
    Call(Callback),
}

impl Goal {
    pub fn call<F: FnMut() + 'static>(callback: F) -> Self {
        Goal::Call(Rc::new(RefCell::new(callback)))
    }
}

impl From<PropertyMap> for Goal {
    fn from(props: PropertyMap) -> Self {
        Goal::Properties(props)
    }
}

impl<K: Into<String>, const N: usize> From<[(K, f32); N]> for Goal {
    fn from(props: [(K, f32); N]) -> Self {
        Goal::Properties(props.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl<K: Into<String>> From<Vec<(K, f32)>> for Goal {
    fn from(props: Vec<(K, f32)>) -> Self {
        Goal::Properties(props.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Step payload
enum StepGoal {
    Properties(PropertyMap),
    /// Holds the queued end values without writing them
    Wait(PropertyMap),
    Call(Callback),
    /// Zero-length marker: restart from the first step when reached
    Loop,
}

impl StepGoal {
    fn end_values(&self) -> Option<&PropertyMap> {
        match self {
            StepGoal::Properties(values) | StepGoal::Wait(values) => Some(values),
            StepGoal::Call(_) | StepGoal::Loop => None,
        }
    }

    fn kind(&self) -> StepKind {
        match self {
            StepGoal::Properties(_) => StepKind::Tween,
            StepGoal::Wait(_) => StepKind::Wait,
            StepGoal::Call(_) => StepKind::Call,
            StepGoal::Loop => StepKind::Loop,
        }
    }
}

/// Public view of a step's type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    Tween,
    Wait,
    Call,
    Loop,
}

struct Step {
    /// Sum of the durations of every earlier step
    start_ms: f32,
    duration_ms: f32,
    start_values: PropertyMap,
    goal: StepGoal,
    easing: Option<Easing>,
}

impl Step {
    fn end_ms(&self) -> f32 {
        self.start_ms + self.duration_ms
    }
}

/// Lifecycle of a timeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimelineState {
    /// No steps queued yet
    Idle,
    /// Registered with the scheduler and advancing
    Running,
    /// Finished naturally or via `stop()`; the completion callback has fired
    Completed,
    /// Aborted via `cancel()`; the completion callback was dropped
    Cancelled,
}

impl TimelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TimelineState::Completed | TimelineState::Cancelled)
    }
}

/// Side effects collected during an update and run once borrows are released
#[derive(Default)]
struct Deferred {
    step_callbacks: SmallVec<[Callback; 2]>,
    completion: Option<Box<dyn FnOnce()>>,
}

impl Deferred {
    fn run(self) -> Result<()> {
        for callback in self.step_callbacks {
            let mut callback = callback
                .try_borrow_mut()
                .map_err(|_| AnimationError::ListenerBusy)?;
            (&mut *callback)();
        }
        if let Some(completion) = self.completion {
            completion();
        }
        Ok(())
    }
}

struct TimelineInner<T: ?Sized> {
    target: Rc<RefCell<T>>,
    scheduler: SchedulerHandle,
    steps: Vec<Step>,
    total_ms: f32,
    elapsed_ms: f32,
    current: usize,
    /// End values of the most recent property step, the start point for the next
    queued: PropertyMap,
    state: TimelineState,
    registration: Option<ListenerId>,
    on_complete: Option<Box<dyn FnOnce()>>,
}

impl<T: Animatable + ?Sized> TimelineInner<T> {
    fn advance(&mut self, dt_ms: f32, deferred: &mut Deferred) -> Result<()> {
        if self.state.is_terminal() {
            return Ok(());
        }

        if self.steps.is_empty() {
            self.terminate(TimelineState::Completed, deferred);
            return Ok(());
        }

        if self.elapsed_ms > self.total_ms {
            let last = self.steps.len() - 1;
            let mut target = self
                .target
                .try_borrow_mut()
                .map_err(|_| AnimationError::TargetBusy)?;
            if let StepGoal::Properties(end_values) = &self.steps[self.current].goal {
                write_values(&mut *target, end_values);
            }
            self.pass_over(&mut *target, self.current + 1..self.steps.len(), deferred);

            if matches!(self.steps[last].goal, StepGoal::Loop) {
                self.elapsed_ms = 0.0;
                self.current = 0;
            } else {
                // Land exactly on the final values regardless of float drift
                if let Some(end_values) = self.steps[last].goal.end_values() {
                    write_values(&mut *target, end_values);
                }
                drop(target);
                self.terminate(TimelineState::Completed, deferred);
                return Ok(());
            }
        }

        let elapsed = self.elapsed_ms;
        if elapsed > self.steps[self.current].end_ms() {
            let previous = self.current;
            if let Some(index) = self.steps.iter().rposition(|s| s.start_ms < elapsed) {
                if index > previous + 1 {
                    tracing::debug!(
                        "Timeline: passed over steps {}..{} at {} ms",
                        previous + 1,
                        index,
                        elapsed
                    );
                }

                let mut target = self
                    .target
                    .try_borrow_mut()
                    .map_err(|_| AnimationError::TargetBusy)?;
                self.pass_over(&mut *target, previous + 1..index, deferred);
                write_values(&mut *target, &self.steps[index].start_values);
                self.current = index;
            }
        }

        let step = &self.steps[self.current];
        match &step.goal {
            StepGoal::Wait(_) | StepGoal::Loop => {}
            StepGoal::Call(callback) => {
                // Fire on the last tick inside the window, once per pass
                if elapsed + dt_ms > step.end_ms() {
                    deferred.step_callbacks.push(callback.clone());
                }
            }
            StepGoal::Properties(end_values) => {
                let ratio = if step.duration_ms > 0.0 {
                    (elapsed - step.start_ms) / step.duration_ms
                } else {
                    1.0
                };
                let eased = step.easing.map_or(ratio, |easing| easing.apply(ratio));

                let mut target = self
                    .target
                    .try_borrow_mut()
                    .map_err(|_| AnimationError::TargetBusy)?;
                for (name, end) in end_values {
                    let start = step.start_values.get(name).copied().unwrap_or(*end);
                    target.set_property(name, start + (end - start) * eased);
                }
            }
        }

        self.elapsed_ms += dt_ms;
        Ok(())
    }

    /// Settle steps that were never current: apply their end values and
    /// queue their callbacks, in step order
    fn pass_over(&self, target: &mut T, passed: Range<usize>, deferred: &mut Deferred) {
        for step in &self.steps[passed] {
            match &step.goal {
                StepGoal::Properties(end_values) => write_values(target, end_values),
                StepGoal::Call(callback) => deferred.step_callbacks.push(callback.clone()),
                StepGoal::Wait(_) | StepGoal::Loop => {}
            }
        }
    }

    fn terminate(&mut self, state: TimelineState, deferred: &mut Deferred) {
        self.state = state;
        if let Some(id) = self.registration.take() {
            self.scheduler.unregister(id);
        }
        let completion = self.on_complete.take();
        if state == TimelineState::Completed {
            deferred.completion = completion;
        }
    }

    /// Appending to a finished timeline plays the new steps from the start
    fn reopen(&mut self) {
        self.elapsed_ms = self.total_ms;
        self.current = self.steps.len();
        self.state = TimelineState::Idle;
    }
}

fn write_values<T: Animatable + ?Sized>(target: &mut T, values: &PropertyMap) {
    for (name, value) in values {
        target.set_property(name, *value);
    }
}

fn validate_duration(duration_ms: f32) -> Result<()> {
    if duration_ms.is_finite() && duration_ms >= 0.0 {
        Ok(())
    } else {
        Err(AnimationError::InvalidDuration(duration_ms))
    }
}

/// A queued sequence of property interpolations driven by the scheduler
///
/// Cloning yields another handle to the same timeline.
pub struct Timeline<T: ?Sized> {
    inner: Rc<RefCell<TimelineInner<T>>>,
}

impl<T: ?Sized> Clone for Timeline<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Animatable + ?Sized + 'static> Timeline<T> {
    /// Create an empty timeline writing to `target`
    ///
    /// The timeline registers itself with the scheduler when its first step
    /// is queued and unregisters once it terminates.
    pub fn new(scheduler: &SchedulerHandle, target: Rc<RefCell<T>>) -> Result<Self> {
        if !scheduler.is_alive() {
            return Err(AnimationError::SchedulerUnavailable);
        }
        Ok(Self {
            inner: Rc::new(RefCell::new(TimelineInner {
                target,
                scheduler: scheduler.clone(),
                steps: Vec::new(),
                total_ms: 0.0,
                elapsed_ms: 0.0,
                current: 0,
                queued: PropertyMap::new(),
                state: TimelineState::Idle,
                registration: None,
                on_complete: None,
            })),
        })
    }

    /// Queue an interpolation (or a callback) lasting `duration_ms`
    ///
    /// Start values come from the previous property step if it named the
    /// property, otherwise from the live target right now.
    pub fn to(
        &self,
        goal: impl Into<Goal>,
        duration_ms: f32,
        easing: Option<Easing>,
    ) -> Result<&Self> {
        validate_duration(duration_ms)?;

        let (goal, start_values) = match goal.into() {
            Goal::Properties(props) => {
                let mut inner = self
                    .inner
                    .try_borrow_mut()
                    .map_err(|_| AnimationError::ListenerBusy)?;
                let start_values = {
                    let target = inner
                        .target
                        .try_borrow()
                        .map_err(|_| AnimationError::TargetBusy)?;
                    let mut start_values = PropertyMap::with_capacity(props.len());
                    for name in props.keys() {
                        let value = match inner.queued.get(name) {
                            Some(value) => *value,
                            None => target
                                .property(name)
                                .ok_or_else(|| AnimationError::UnknownProperty(name.clone()))?,
                        };
                        start_values.insert(name.clone(), value);
                    }
                    start_values
                };
                inner.queued = props.clone();
                (StepGoal::Properties(props), start_values)
            }
            Goal::Call(callback) => {
                let queued = self.inner.borrow().queued.clone();
                (StepGoal::Call(callback), queued)
            }
        };

        self.push_step(goal, start_values, duration_ms, easing)
    }

    /// Hold every queued end value for `duration_ms` without writing
    pub fn wait(&self, duration_ms: f32) -> Result<&Self> {
        validate_duration(duration_ms)?;
        let queued = self.inner.borrow().queued.clone();
        self.push_step(StepGoal::Wait(queued), PropertyMap::new(), duration_ms, None)
    }

    /// Restart from the first step forever once the queue is exhausted
    pub fn loop_forever(&self) -> Result<&Self> {
        self.push_step(StepGoal::Loop, PropertyMap::new(), 0.0, None)
    }

    /// Set the callback fired once when the timeline terminates
    ///
    /// Replaces any callback set earlier. Never fires on loop restarts.
    pub fn then<F: FnOnce() + 'static>(&self, callback: F) -> &Self {
        self.inner.borrow_mut().on_complete = Some(Box::new(callback));
        self
    }

    /// Terminate now and fire the completion callback
    ///
    /// Properties keep whatever values they currently have.
    pub fn stop(&self) {
        self.finish_early(TimelineState::Completed);
    }

    /// Terminate now without firing the completion callback
    pub fn cancel(&self) {
        self.finish_early(TimelineState::Cancelled);
    }

    fn finish_early(&self, state: TimelineState) {
        let mut deferred = Deferred::default();
        {
            let Ok(mut inner) = self.inner.try_borrow_mut() else {
                tracing::warn!("Timeline: cannot terminate while it is updating");
                return;
            };
            if inner.state.is_terminal() {
                return;
            }
            inner.terminate(state, &mut deferred);
        }
        if let Err(err) = deferred.run() {
            tracing::warn!("Timeline: completion failed: {}", err);
        }
    }

    fn push_step(
        &self,
        goal: StepGoal,
        start_values: PropertyMap,
        duration_ms: f32,
        easing: Option<Easing>,
    ) -> Result<&Self> {
        {
            let mut inner = self
                .inner
                .try_borrow_mut()
                .map_err(|_| AnimationError::ListenerBusy)?;
            if inner.state.is_terminal() {
                inner.reopen();
            }
            let start_ms = inner.total_ms;
            inner.steps.push(Step {
                start_ms,
                duration_ms,
                start_values,
                goal,
                easing,
            });
            inner.total_ms += duration_ms;
        }
        self.ensure_registered()?;
        Ok(self)
    }

    fn ensure_registered(&self) -> Result<()> {
        let scheduler = {
            let inner = self.inner.borrow();
            if inner.registration.is_some()
                || inner.state.is_terminal()
                || inner.steps.is_empty()
            {
                return Ok(());
            }
            inner.scheduler.clone()
        };

        let id = scheduler.register(Rc::new(self.clone()))?;
        let mut inner = self.inner.borrow_mut();
        inner.registration = Some(id);
        inner.state = TimelineState::Running;
        Ok(())
    }

    pub fn state(&self) -> TimelineState {
        self.inner.borrow().state
    }

    /// Time played so far in milliseconds
    pub fn elapsed_ms(&self) -> f32 {
        self.inner.borrow().elapsed_ms
    }

    /// Sum of all step durations
    pub fn total_duration_ms(&self) -> f32 {
        self.inner.borrow().total_ms
    }

    pub fn step_count(&self) -> usize {
        self.inner.borrow().steps.len()
    }

    /// Index of the step being applied
    pub fn current_step(&self) -> Option<usize> {
        let inner = self.inner.borrow();
        (!inner.steps.is_empty()).then_some(inner.current)
    }

    pub fn step_kind(&self, index: usize) -> Option<StepKind> {
        self.inner.borrow().steps.get(index).map(|s| s.goal.kind())
    }

    pub fn is_registered(&self) -> bool {
        let inner = self.inner.borrow();
        inner
            .registration
            .is_some_and(|id| inner.scheduler.is_registered(id))
    }

    pub fn target(&self) -> Rc<RefCell<T>> {
        Rc::clone(&self.inner.borrow().target)
    }
}

impl<T: Animatable + ?Sized + 'static> Tickable for Timeline<T> {
    fn update(&self, dt_ms: f32) -> Result<()> {
        let mut deferred = Deferred::default();
        {
            let mut inner = self
                .inner
                .try_borrow_mut()
                .map_err(|_| AnimationError::ListenerBusy)?;
            inner.advance(dt_ms, &mut deferred)?;
        }
        deferred.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SchedulerConfig;
    use crate::scheduler::Scheduler;
    use crate::target::PropertyBag;
    use std::cell::Cell;

    fn setup(bag: PropertyBag) -> (Scheduler, Rc<RefCell<PropertyBag>>) {
        let scheduler =
            Scheduler::with_clock(SchedulerConfig::default(), ManualClock::new()).unwrap();
        (scheduler, Rc::new(RefCell::new(bag)))
    }

    fn x(target: &Rc<RefCell<PropertyBag>>) -> f32 {
        target.borrow().get("x").unwrap()
    }

    fn counter() -> (Rc<Cell<u32>>, impl FnMut() + 'static) {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        (count, move || count_clone.set(count_clone.get() + 1))
    }

    #[test]
    fn test_linear_midpoint_is_exact() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 10.0));
        let timeline = Timeline::new(&scheduler.handle(), target.clone()).unwrap();
        timeline.to([("x", 30.0)], 1000.0, None).unwrap();

        // The delta applies after evaluation, so the second update samples t = 500
        timeline.update(500.0).unwrap();
        assert_eq!(x(&target), 10.0);
        timeline.update(0.0).unwrap();
        assert_eq!(x(&target), 10.0 + (30.0 - 10.0) * 0.5);
    }

    #[test]
    fn test_registers_on_first_step() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0));
        let timeline = Timeline::new(&scheduler.handle(), target).unwrap();
        assert_eq!(timeline.state(), TimelineState::Idle);
        assert!(!timeline.is_registered());
        assert!(!scheduler.is_running());

        timeline.to([("x", 1.0)], 100.0, None).unwrap();
        assert_eq!(timeline.state(), TimelineState::Running);
        assert!(timeline.is_registered());
        assert_eq!(scheduler.listener_count(), 1);

        // More steps don't register twice
        timeline.to([("x", 2.0)], 100.0, None).unwrap();
        assert_eq!(scheduler.listener_count(), 1);
    }

    #[test]
    fn test_final_values_are_exact() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0).with("y", 3.0));
        let timeline = Timeline::new(&scheduler.handle(), target.clone()).unwrap();
        timeline
            .to([("x", 1.0 / 3.0), ("y", -7.1)], 100.0, Some(Easing::SineInOut))
            .unwrap();

        let mut ticks = 0;
        while timeline.state() == TimelineState::Running {
            timeline.update(33.0).unwrap();
            ticks += 1;
            assert!(ticks < 100);
        }

        assert_eq!(x(&target), 1.0 / 3.0);
        assert_eq!(target.borrow().get("y"), Some(-7.1));
        assert!(!timeline.is_registered());
        assert_eq!(scheduler.listener_count(), 0);
    }

    #[test]
    fn test_completion_fires_once() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0));
        let timeline = Timeline::new(&scheduler.handle(), target).unwrap();
        let (count, callback) = counter();
        timeline.to([("x", 5.0)], 50.0, None).unwrap().then(callback);

        for _ in 0..10 {
            timeline.update(20.0).unwrap();
        }
        assert_eq!(count.get(), 1);
        assert_eq!(timeline.state(), TimelineState::Completed);

        timeline.update(20.0).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_empty_timeline_completes_immediately() {
        let (scheduler, target) = setup(PropertyBag::new());
        let timeline = Timeline::new(&scheduler.handle(), target).unwrap();
        let (count, callback) = counter();
        timeline.then(callback);

        timeline.update(16.0).unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(timeline.state(), TimelineState::Completed);
    }

    #[test]
    fn test_chained_start_values_ignore_external_writes() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0));
        let timeline = Timeline::new(&scheduler.handle(), target.clone()).unwrap();
        timeline
            .to([("x", 10.0)], 100.0, None)
            .unwrap()
            .to([("x", 20.0)], 100.0, None)
            .unwrap();

        // Evaluate at 0 and 100
        timeline.update(100.0).unwrap();
        timeline.update(50.0).unwrap();
        assert_eq!(x(&target), 10.0);

        target.borrow_mut().set("x", 500.0);
        // Transition into the second step snaps back to its captured start
        timeline.update(0.0).unwrap();
        assert_eq!(timeline.current_step(), Some(1));
        assert_eq!(x(&target), 15.0);
    }

    #[test]
    fn test_wait_performs_no_writes() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0));
        let timeline = Timeline::new(&scheduler.handle(), target.clone()).unwrap();
        timeline
            .to([("x", 10.0)], 100.0, None)
            .unwrap()
            .wait(100.0)
            .unwrap()
            .to([("x", 20.0)], 100.0, None)
            .unwrap();
        assert_eq!(timeline.total_duration_ms(), 300.0);
        assert_eq!(timeline.step_kind(1), Some(StepKind::Wait));

        for _ in 0..3 {
            timeline.update(50.0).unwrap();
        }
        assert_eq!(x(&target), 10.0);

        target.borrow_mut().set("x", 99.0);
        timeline.update(50.0).unwrap();
        assert_eq!(timeline.current_step(), Some(1));
        assert_eq!(x(&target), 99.0);
        timeline.update(50.0).unwrap();
        assert_eq!(x(&target), 99.0);

        // Third step starts from the queued value, not the external write
        timeline.update(50.0).unwrap();
        assert_eq!(timeline.current_step(), Some(2));
        assert_eq!(x(&target), 15.0);
    }

    #[test]
    fn test_call_step_fires_once_per_pass() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0));
        let timeline = Timeline::new(&scheduler.handle(), target.clone()).unwrap();
        let (calls, callback) = counter();
        timeline
            .to([("x", 10.0)], 100.0, None)
            .unwrap()
            .to(Goal::call(callback), 100.0, None)
            .unwrap();
        assert_eq!(timeline.step_kind(1), Some(StepKind::Call));

        for _ in 0..20 {
            timeline.update(30.0).unwrap();
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(timeline.state(), TimelineState::Completed);
        assert_eq!(x(&target), 10.0);
    }

    #[test]
    fn test_large_delta_skips_steps() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0));
        let timeline = Timeline::new(&scheduler.handle(), target.clone()).unwrap();
        timeline
            .to([("x", 10.0)], 100.0, None)
            .unwrap()
            .to([("x", 20.0)], 100.0, None)
            .unwrap()
            .to([("x", 30.0)], 100.0, None)
            .unwrap();

        timeline.update(250.0).unwrap();
        assert_eq!(x(&target), 0.0);
        timeline.update(0.0).unwrap();
        assert_eq!(timeline.current_step(), Some(2));
        assert_eq!(x(&target), 25.0);
    }

    #[test]
    fn test_zero_duration_step_sets_instantly() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 4.0));
        let timeline = Timeline::new(&scheduler.handle(), target.clone()).unwrap();
        timeline.to([("x", 9.0)], 0.0, None).unwrap();

        timeline.update(0.0).unwrap();
        assert_eq!(x(&target), 9.0);
        timeline.update(1.0).unwrap();
        timeline.update(1.0).unwrap();
        assert_eq!(timeline.state(), TimelineState::Completed);
    }

    #[test]
    fn test_loop_restarts_without_completing() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0));
        let timeline = Timeline::new(&scheduler.handle(), target.clone()).unwrap();
        let (count, callback) = counter();
        timeline
            .to([("x", 10.0)], 100.0, None)
            .unwrap()
            .to([("x", 0.0)], 100.0, None)
            .unwrap()
            .loop_forever()
            .unwrap()
            .then(callback);

        let mut trajectory = Vec::new();
        for _ in 0..27 {
            timeline.update(25.0).unwrap();
            trajectory.push(x(&target));
        }

        // Samples at 0, 25, ..., 200 then back to 0
        assert_eq!(&trajectory[..9], &trajectory[9..18]);
        assert_eq!(&trajectory[..9], &trajectory[18..27]);
        assert_eq!(trajectory[4], 10.0);
        assert_eq!(trajectory[8], 0.0);
        assert_eq!(count.get(), 0);
        assert_eq!(timeline.state(), TimelineState::Running);
        assert!(timeline.is_registered());
    }

    #[test]
    fn test_stop_fires_completion_and_cancel_does_not() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0));
        let handle = scheduler.handle();

        let stopped = Timeline::new(&handle, target.clone()).unwrap();
        let (stop_count, callback) = counter();
        stopped.to([("x", 10.0)], 100.0, None).unwrap().then(callback);
        stopped.update(50.0).unwrap();
        stopped.update(0.0).unwrap();
        stopped.stop();
        stopped.stop();
        assert_eq!(stop_count.get(), 1);
        assert_eq!(stopped.state(), TimelineState::Completed);
        assert!(!stopped.is_registered());
        // Stopping leaves properties where they were
        assert_eq!(x(&target), 5.0);

        let cancelled = Timeline::new(&handle, target).unwrap();
        let (cancel_count, callback) = counter();
        cancelled.to([("x", 10.0)], 100.0, None).unwrap().then(callback);
        cancelled.cancel();
        assert_eq!(cancel_count.get(), 0);
        assert_eq!(cancelled.state(), TimelineState::Cancelled);
        assert!(!cancelled.is_registered());

        cancelled.update(500.0).unwrap();
        assert_eq!(cancel_count.get(), 0);
    }

    #[test]
    fn test_appending_after_completion_reopens() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0));
        let timeline = Timeline::new(&scheduler.handle(), target.clone()).unwrap();
        timeline.to([("x", 10.0)], 100.0, None).unwrap();
        for _ in 0..3 {
            timeline.update(60.0).unwrap();
        }
        assert_eq!(timeline.state(), TimelineState::Completed);

        timeline.to([("x", 20.0)], 100.0, None).unwrap();
        assert_eq!(timeline.state(), TimelineState::Running);
        assert!(timeline.is_registered());

        timeline.update(50.0).unwrap();
        assert_eq!(x(&target), 10.0);
        timeline.update(0.0).unwrap();
        assert_eq!(x(&target), 15.0);
    }

    #[test]
    fn test_zero_duration_step_mid_sequence_applies() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0).with("y", 0.0));
        let timeline = Timeline::new(&scheduler.handle(), target.clone()).unwrap();
        timeline
            .to([("x", 10.0)], 100.0, None)
            .unwrap()
            .to([("y", 50.0)], 0.0, None)
            .unwrap()
            .to([("x", 20.0)], 100.0, None)
            .unwrap();

        // Samples at 0, 25, ..., 100 stay on the first step
        for _ in 0..5 {
            timeline.update(25.0).unwrap();
        }
        assert_eq!(target.borrow().get("y"), Some(0.0));

        timeline.update(25.0).unwrap();
        assert_eq!(timeline.current_step(), Some(2));
        assert_eq!(target.borrow().get("y"), Some(50.0));
        assert_eq!(x(&target), 12.5);

        for _ in 0..20 {
            timeline.update(25.0).unwrap();
        }
        assert_eq!(timeline.state(), TimelineState::Completed);
        assert_eq!(target.borrow().get("y"), Some(50.0));
        assert_eq!(x(&target), 20.0);
    }

    #[test]
    fn test_zero_duration_call_steps_fire_once() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0));
        let timeline = Timeline::new(&scheduler.handle(), target.clone()).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (log_a, log_b, log_done) = (log.clone(), log.clone(), log.clone());

        timeline
            .to([("x", 10.0)], 100.0, None)
            .unwrap()
            .to(Goal::call(move || log_a.borrow_mut().push("a")), 0.0, None)
            .unwrap()
            .to([("x", 20.0)], 100.0, None)
            .unwrap()
            .to(Goal::call(move || log_b.borrow_mut().push("b")), 0.0, None)
            .unwrap()
            .then(move || log_done.borrow_mut().push("done"));

        for _ in 0..5 {
            timeline.update(25.0).unwrap();
        }
        assert!(log.borrow().is_empty());

        // Leaving the first step passes over the marker
        timeline.update(25.0).unwrap();
        assert_eq!(*log.borrow(), vec!["a"]);

        for _ in 0..20 {
            timeline.update(25.0).unwrap();
        }
        assert_eq!(*log.borrow(), vec!["a", "b", "done"]);
        assert_eq!(x(&target), 20.0);
    }

    #[test]
    fn test_zero_duration_call_before_loop_fires_every_pass() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0));
        let timeline = Timeline::new(&scheduler.handle(), target).unwrap();
        let (calls, callback) = counter();
        timeline
            .to([("x", 10.0)], 100.0, None)
            .unwrap()
            .to(Goal::call(callback), 0.0, None)
            .unwrap()
            .loop_forever()
            .unwrap();

        // Five samples per pass (0..=100), restart on the sixth tick
        for _ in 0..16 {
            timeline.update(25.0).unwrap();
        }
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_appending_after_early_stop_starts_fresh() {
        for cancel in [false, true] {
            let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0));
            let timeline = Timeline::new(&scheduler.handle(), target.clone()).unwrap();
            timeline.to([("x", 10.0)], 100.0, None).unwrap();
            timeline.update(50.0).unwrap();
            timeline.update(0.0).unwrap();
            assert_eq!(x(&target), 5.0);

            if cancel {
                timeline.cancel();
            } else {
                timeline.stop();
            }
            timeline.to([("x", 20.0)], 100.0, Some(Easing::QuadIn)).unwrap();
            assert_eq!(timeline.elapsed_ms(), 100.0);

            // The new step starts at ratio zero from the queued end value
            let xs: Vec<f32> = (0..3)
                .map(|_| {
                    timeline.update(25.0).unwrap();
                    x(&target)
                })
                .collect();
            assert_eq!(xs, vec![10.0, 10.625, 12.5]);
        }
    }

    #[test]
    fn test_busy_target_keeps_step_transition_pending() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0).with("y", 0.0));
        let timeline = Timeline::new(&scheduler.handle(), target.clone()).unwrap();
        timeline
            .to([("x", 10.0)], 100.0, None)
            .unwrap()
            .to([("y", 5.0)], 0.0, None)
            .unwrap()
            .to([("x", 20.0)], 100.0, None)
            .unwrap();

        for _ in 0..3 {
            timeline.update(50.0).unwrap();
        }
        target.borrow_mut().set("x", 500.0);

        let guard = target.borrow();
        assert_eq!(timeline.update(0.0), Err(AnimationError::TargetBusy));
        assert_eq!(timeline.current_step(), Some(0));
        drop(guard);

        timeline.update(0.0).unwrap();
        assert_eq!(timeline.current_step(), Some(2));
        assert_eq!(target.borrow().get("y"), Some(5.0));
        assert_eq!(x(&target), 15.0);
    }

    #[test]
    fn test_configuration_errors() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0));
        let timeline = Timeline::new(&scheduler.handle(), target.clone()).unwrap();

        assert_eq!(
            timeline.to([("nope", 1.0)], 100.0, None).err(),
            Some(AnimationError::UnknownProperty("nope".to_string()))
        );
        assert_eq!(
            timeline.to([("x", 1.0)], -1.0, None).err(),
            Some(AnimationError::InvalidDuration(-1.0))
        );
        assert_eq!(timeline.step_count(), 0);

        let orphan = {
            let scheduler =
                Scheduler::with_clock(SchedulerConfig::default(), ManualClock::new()).unwrap();
            scheduler.handle()
        };
        assert_eq!(
            Timeline::new(&orphan, target).err().map(|e| e.to_string()),
            Some(AnimationError::SchedulerUnavailable.to_string())
        );
    }

    #[test]
    fn test_busy_target_is_reported() {
        let (scheduler, target) = setup(PropertyBag::new().with("x", 0.0));
        let timeline = Timeline::new(&scheduler.handle(), target.clone()).unwrap();
        timeline.to([("x", 1.0)], 100.0, None).unwrap();

        let _guard = target.borrow();
        assert_eq!(timeline.update(10.0), Err(AnimationError::TargetBusy));
    }
}
