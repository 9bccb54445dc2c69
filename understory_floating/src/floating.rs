// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The update pipeline and the lifecycle effects that drive it.
//!
//! [`Floating`] owns one floating instance. Inputs (open flag, element handles,
//! placement options, mount tracker) are written through setters, which only
//! record what changed. [`Floating::flush`] then runs the lifecycle effects for
//! that tick in dependency order:
//!
//! 1. bind the supplied reference handle,
//! 2. bind the supplied floating handle,
//! 3. reset `is_positioned` when closed,
//! 4. (re)mount: run the previous mount episode's cleanup, then either spawn a
//!    single update or hand the element pair and an [`Updater`] to the mount
//!    tracker.
//!
//! Positioning itself is delegated to the [`Platform`]. Engine calls are
//! asynchronous, so several updates may be in flight. Every call takes a
//! generation number when it starts; a result is discarded if a newer
//! generation has already committed or if the element pair changed while it
//! was pending.
//!
//! ## Minimal example
//!
//! ```
//! use core::future::{Future, ready};
//! use core::pin::pin;
//! use core::task::{Context, Poll, Waker};
//! use understory_floating::{
//!     ComputePositionConfig, ComputePositionReturn, Floating, FloatingOptions, LocalTask,
//!     MiddlewareData, Platform, UpdateOutcome,
//! };
//!
//! struct Fixed;
//!
//! impl Platform for Fixed {
//!     type Reference = u32;
//!     type Floating = u32;
//!     type Middleware = ();
//!     type MiddlewarePayload = ();
//!     type Event = ();
//!     type Error = ();
//!
//!     fn compute_position(
//!         &self,
//!         _reference: &u32,
//!         _floating: &u32,
//!         config: ComputePositionConfig<'_, ()>,
//!     ) -> impl Future<Output = Result<ComputePositionReturn<()>, ()>> {
//!         ready(Ok(ComputePositionReturn {
//!             x: 12.0,
//!             y: 40.0,
//!             placement: config.placement,
//!             strategy: config.strategy,
//!             middleware_data: MiddlewareData::new(),
//!         }))
//!     }
//!
//!     fn spawn_local(&self, _task: LocalTask) {}
//! }
//!
//! let floating = Floating::new(
//!     Fixed,
//!     FloatingOptions {
//!         reference: Some(1),
//!         floating: Some(2),
//!         ..FloatingOptions::default()
//!     },
//! );
//!
//! // Futures are driven by the host; this one is ready on first poll.
//! let mut update = pin!(floating.update());
//! let outcome = update.as_mut().poll(&mut Context::from_waker(Waker::noop()));
//! assert_eq!(outcome, Poll::Ready(Ok(UpdateOutcome::Committed)));
//! assert!(floating.is_positioned());
//! assert_eq!((floating.x(), floating.y()), (12.0, 40.0));
//! ```

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::future::Future;
use core::mem;
use core::pin::Pin;

use crate::context::{ContextData, FloatingContext, FloatingElements};
use crate::events::{EventBus, OpenChangeReason};
use crate::id::use_id;
use crate::position::{
    ComputePositionConfig, ComputePositionReturn, FloatingStyles, MiddlewareData, Placement,
    PositionState, Strategy, floating_styles,
};

/// Detached future handed to [`Platform::spawn_local`].
pub type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

/// Teardown returned by a mount tracker.
pub type Cleanup = Box<dyn FnOnce()>;

/// Called with the bound pair whenever both elements are present.
///
/// The returned [`Cleanup`], if any, runs exactly once: before the next mount
/// episode, when the pair becomes incomplete, or when the instance is disposed.
pub type MountTracker<P> = Rc<
    dyn Fn(&<P as Platform>::Reference, &<P as Platform>::Floating, Updater<P>) -> Option<Cleanup>,
>;

/// Owner callback for open-state requests.
pub type OpenChangeCallback<E> = Rc<dyn Fn(bool, Option<&E>, Option<OpenChangeReason>)>;

/// Host services: the positioning engine and a local executor.
pub trait Platform: 'static {
    /// Handle to a reference element.
    type Reference: Clone + PartialEq + 'static;
    /// Handle to a floating element.
    type Floating: Clone + PartialEq + 'static;
    /// One step of the engine's middleware pipeline.
    type Middleware: Clone + 'static;
    /// Per-middleware side-channel payload.
    type MiddlewarePayload: Clone + 'static;
    /// Raw UI event type recorded on open transitions.
    type Event: Clone + 'static;
    /// Engine failure.
    type Error: fmt::Debug + 'static;

    /// Compute the floating element's coordinates.
    ///
    /// Treated as a pure function of its inputs.
    fn compute_position(
        &self,
        reference: &Self::Reference,
        floating: &Self::Floating,
        config: ComputePositionConfig<'_, Self::Middleware>,
    ) -> impl Future<Output = Result<ComputePositionReturn<Self::MiddlewarePayload>, Self::Error>>;

    /// Device pixel ratio of the display showing `floating`.
    fn device_pixel_ratio(&self, floating: &Self::Floating) -> f64 {
        let _ = floating;
        1.0
    }

    /// Run `task` to completion on the host's single-threaded executor.
    fn spawn_local(&self, task: LocalTask);
}

/// Initial inputs of a floating instance.
pub struct FloatingOptions<P: Platform> {
    /// Whether the floating element is open. Defaults to `true`.
    pub open: bool,
    /// Requested placement. Defaults to [`Placement::Bottom`].
    pub placement: Placement,
    /// Requested strategy. Defaults to [`Strategy::Absolute`].
    pub strategy: Strategy,
    /// Middleware pipeline; `None` entries are skipped.
    pub middleware: Vec<Option<P::Middleware>>,
    /// Position with `transform` rather than `left`/`top`. Defaults to `true`.
    pub transform: bool,
    /// Reference element handle.
    pub reference: Option<P::Reference>,
    /// Floating element handle.
    pub floating: Option<P::Floating>,
    /// Mount tracker for continuous repositioning.
    pub while_elements_mounted: Option<MountTracker<P>>,
    /// Owner callback for open-state requests.
    pub on_open_change: Option<OpenChangeCallback<P::Event>>,
    /// Node id within a floating tree.
    pub node_id: Option<String>,
}

impl<P: Platform> Default for FloatingOptions<P> {
    fn default() -> Self {
        Self {
            open: true,
            placement: Placement::default(),
            strategy: Strategy::default(),
            middleware: Vec::new(),
            transform: true,
            reference: None,
            floating: None,
            while_elements_mounted: None,
            on_open_change: None,
            node_id: None,
        }
    }
}

impl<P: Platform> fmt::Debug for FloatingOptions<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FloatingOptions")
            .field("open", &self.open)
            .field("placement", &self.placement)
            .field("strategy", &self.strategy)
            .field("middleware", &self.middleware.len())
            .field("transform", &self.transform)
            .field("reference", &self.reference.is_some())
            .field("floating", &self.floating.is_some())
            .field("while_elements_mounted", &self.while_elements_mounted.is_some())
            .field("on_open_change", &self.on_open_change.is_some())
            .field("node_id", &self.node_id)
            .finish()
    }
}

/// How an update call ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// An element was missing (or the instance was disposed); the engine was not called.
    Skipped,
    /// The result was written to the position state.
    Committed,
    /// The result was discarded: a newer update already committed or the
    /// element pair changed while it was pending.
    Stale,
}

bitflags::bitflags! {
    /// Inputs written since the last flush.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    struct Dirty: u8 {
        const REFERENCE   = 0b0000_0001;
        const FLOATING    = 0b0000_0010;
        const OPEN        = 0b0000_0100;
        /// Placement, strategy, or middleware.
        const POSITIONING = 0b0000_1000;
        const TRACKER     = 0b0001_0000;
    }
}

bitflags::bitflags! {
    /// Effects that ran during a [`Floating::flush`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Flushed: u8 {
        /// A new reference handle was bound.
        const REFERENCE_BOUND = 0b0000_0001;
        /// A new floating handle was bound.
        const FLOATING_BOUND  = 0b0000_0010;
        /// `is_positioned` was cleared because the element is closed.
        const RESET_ON_CLOSE  = 0b0000_0100;
        /// The previous mount episode's cleanup ran.
        const UNMOUNTED       = 0b0000_1000;
        /// The mount tracker was called.
        const MOUNTED         = 0b0001_0000;
        /// A detached update was spawned.
        const UPDATE_SPAWNED  = 0b0010_0000;
    }
}

pub(crate) struct State<P: Platform> {
    pub(crate) options: FloatingOptions<P>,
    pub(crate) position: PositionState<P::MiddlewarePayload>,
    pub(crate) elements: FloatingElements<P::Reference, P::Floating>,
    dirty: Dirty,
    cleanup: Option<Cleanup>,
    /// Generation handed to the most recent update call.
    started: u64,
    /// Generation of the most recently committed result.
    committed: u64,
    disposed: bool,
}

impl<P: Platform> State<P> {
    /// Clear `is_positioned` while closed. Returns whether anything changed.
    fn reset_on_close(&mut self) -> bool {
        if self.options.open || !self.position.is_positioned {
            return false;
        }
        self.position.is_positioned = false;
        true
    }
}

pub(crate) struct Shared<P: Platform> {
    pub(crate) platform: P,
    pub(crate) floating_id: String,
    pub(crate) events: EventBus,
    pub(crate) data: RefCell<ContextData<P::Event>>,
    pub(crate) state: RefCell<State<P>>,
}

/// Snapshot taken when an update starts.
struct UpdateRequest<P: Platform> {
    generation: u64,
    reference: P::Reference,
    floating: P::Floating,
    placement: Placement,
    strategy: Strategy,
    middleware: Vec<P::Middleware>,
}

impl<P: Platform> Shared<P> {
    fn begin_update(&self) -> Option<UpdateRequest<P>> {
        let mut state = self.state.borrow_mut();
        if state.disposed {
            return None;
        }
        let reference = state.elements.reference.clone()?;
        let floating = state.elements.floating.clone()?;
        state.started += 1;
        Some(UpdateRequest {
            generation: state.started,
            reference,
            floating,
            placement: state.options.placement,
            strategy: state.options.strategy,
            middleware: state.options.middleware.iter().flatten().cloned().collect(),
        })
    }

    fn commit(
        &self,
        request: &UpdateRequest<P>,
        result: ComputePositionReturn<P::MiddlewarePayload>,
    ) -> UpdateOutcome {
        let mut state = self.state.borrow_mut();
        let same_pair = state.elements.reference.as_ref() == Some(&request.reference)
            && state.elements.floating.as_ref() == Some(&request.floating);
        if state.disposed || !same_pair || request.generation < state.committed {
            tracing::debug!(
                generation = request.generation,
                committed = state.committed,
                same_pair,
                "dropping stale position"
            );
            return UpdateOutcome::Stale;
        }
        state.committed = request.generation;
        state.position.apply(result);
        state.reset_on_close();
        tracing::debug!(
            generation = request.generation,
            x = state.position.x,
            y = state.position.y,
            placement = state.position.placement.as_str(),
            "committed position"
        );
        UpdateOutcome::Committed
    }
}

fn run_update<P: Platform>(
    shared: Option<Rc<Shared<P>>>,
) -> impl Future<Output = Result<UpdateOutcome, P::Error>> + 'static {
    // Element check and generation happen now, not on first poll. Until then
    // only a weak handle is held, so an unpolled future never keeps the
    // instance alive.
    let started = shared.and_then(|shared| {
        let request = shared.begin_update()?;
        Some((Rc::downgrade(&shared), request))
    });
    async move {
        let Some((shared, request)) = started else {
            return Ok(UpdateOutcome::Skipped);
        };
        let Some(shared) = shared.upgrade() else {
            return Ok(UpdateOutcome::Skipped);
        };
        let config = ComputePositionConfig {
            placement: request.placement,
            strategy: request.strategy,
            middleware: &request.middleware,
        };
        let result = shared
            .platform
            .compute_position(&request.reference, &request.floating, config)
            .await?;
        Ok(shared.commit(&request, result))
    }
}

/// Weak handle that can trigger updates, handed to mount trackers.
///
/// Holding an `Updater` does not keep the instance alive; once the owning
/// [`Floating`] is gone, updates resolve to [`UpdateOutcome::Skipped`].
pub struct Updater<P: Platform> {
    shared: Weak<Shared<P>>,
}

impl<P: Platform> Clone for Updater<P> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<P: Platform> fmt::Debug for Updater<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Updater")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

impl<P: Platform> Updater<P> {
    /// Recompute the position. See [`Floating::update`].
    pub fn update(&self) -> impl Future<Output = Result<UpdateOutcome, P::Error>> + 'static {
        run_update(self.shared.upgrade())
    }
}

/// One floating element instance: position state, context, and lifecycle.
pub struct Floating<P: Platform> {
    shared: Rc<Shared<P>>,
}

impl<P: Platform> fmt::Debug for Floating<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("Floating")
            .field("floating_id", &self.shared.floating_id)
            .field("options", &state.options)
            .field("x", &state.position.x)
            .field("y", &state.position.y)
            .field("placement", &state.position.placement)
            .field("strategy", &state.position.strategy)
            .field("is_positioned", &state.position.is_positioned)
            .finish_non_exhaustive()
    }
}

impl<P: Platform> Floating<P> {
    /// Create an instance and run the first flush.
    pub fn new(platform: P, options: FloatingOptions<P>) -> Self {
        let position = PositionState::new(options.placement, options.strategy);
        let shared = Rc::new(Shared {
            platform,
            floating_id: use_id(),
            events: EventBus::new(),
            data: RefCell::new(ContextData::new()),
            state: RefCell::new(State {
                options,
                position,
                elements: FloatingElements::default(),
                dirty: Dirty::all(),
                cleanup: None,
                started: 0,
                committed: 0,
                disposed: false,
            }),
        });
        let floating = Self { shared };
        floating.flush();
        floating
    }

    /// Context handle for dependent modules.
    pub fn context(&self) -> FloatingContext<P> {
        FloatingContext {
            shared: self.shared.clone(),
        }
    }

    /// Weak update handle.
    pub fn updater(&self) -> Updater<P> {
        Updater {
            shared: Rc::downgrade(&self.shared),
        }
    }

    /// The platform this instance positions with.
    pub fn platform(&self) -> &P {
        &self.shared.platform
    }

    /// Recompute the position.
    ///
    /// The element pair, placement, strategy, and middleware are captured when
    /// this is called. Without both elements the returned future resolves to
    /// [`UpdateOutcome::Skipped`] without calling the engine. Engine errors are
    /// returned unchanged and leave the position state untouched.
    ///
    /// The future only holds a weak handle until its first poll. If the
    /// instance is dropped before then, it resolves to [`UpdateOutcome::Skipped`].
    pub fn update(&self) -> impl Future<Output = Result<UpdateOutcome, P::Error>> + 'static {
        run_update(Some(self.shared.clone()))
    }

    fn write(&self, dirty: Dirty, f: impl FnOnce(&mut FloatingOptions<P>) -> bool) {
        let mut state = self.shared.state.borrow_mut();
        if f(&mut state.options) {
            state.dirty |= dirty;
        }
    }

    /// Set the open flag.
    pub fn set_open(&self, open: bool) {
        self.write(Dirty::OPEN, |o| mem::replace(&mut o.open, open) != open);
    }

    /// Supply the reference element handle.
    pub fn set_reference(&self, reference: Option<P::Reference>) {
        self.write(Dirty::REFERENCE, |o| {
            let changed = o.reference != reference;
            o.reference = reference;
            changed
        });
    }

    /// Supply the floating element handle.
    pub fn set_floating(&self, floating: Option<P::Floating>) {
        self.write(Dirty::FLOATING, |o| {
            let changed = o.floating != floating;
            o.floating = floating;
            changed
        });
    }

    /// Set the requested placement.
    pub fn set_placement(&self, placement: Placement) {
        self.write(Dirty::POSITIONING, |o| mem::replace(&mut o.placement, placement) != placement);
    }

    /// Set the requested strategy.
    pub fn set_strategy(&self, strategy: Strategy) {
        self.write(Dirty::POSITIONING, |o| mem::replace(&mut o.strategy, strategy) != strategy);
    }

    /// Replace the middleware pipeline.
    pub fn set_middleware(&self, middleware: Vec<Option<P::Middleware>>) {
        self.write(Dirty::POSITIONING, |o| {
            o.middleware = middleware;
            true
        });
    }

    /// Choose between `transform` and `left`/`top` positioning.
    pub fn set_transform(&self, transform: bool) {
        self.shared.state.borrow_mut().options.transform = transform;
    }

    /// Replace the mount tracker.
    pub fn set_while_elements_mounted(&self, tracker: Option<MountTracker<P>>) {
        self.write(Dirty::TRACKER, |o| {
            o.while_elements_mounted = tracker;
            true
        });
    }

    /// Replace the owner's open-change callback.
    pub fn set_on_open_change(&self, callback: Option<OpenChangeCallback<P::Event>>) {
        self.shared.state.borrow_mut().options.on_open_change = callback;
    }

    /// Set the node id within a floating tree.
    pub fn set_node_id(&self, node_id: Option<String>) {
        self.shared.state.borrow_mut().options.node_id = node_id;
    }

    /// Run the lifecycle effects for everything written since the last flush.
    pub fn flush(&self) -> Flushed {
        let mut ran = Flushed::empty();
        let (cleanup, mount) = {
            let mut guard = self.shared.state.borrow_mut();
            let state = &mut *guard;
            if state.disposed {
                return ran;
            }
            let dirty = mem::take(&mut state.dirty);

            if dirty.contains(Dirty::REFERENCE) && state.elements.reference != state.options.reference
            {
                state.elements.reference.clone_from(&state.options.reference);
                ran |= Flushed::REFERENCE_BOUND;
            }
            if dirty.contains(Dirty::FLOATING) && state.elements.floating != state.options.floating {
                state.elements.floating.clone_from(&state.options.floating);
                ran |= Flushed::FLOATING_BOUND;
            }
            let pair_changed = ran.intersects(Flushed::REFERENCE_BOUND | Flushed::FLOATING_BOUND);
            if pair_changed {
                // The stored position describes the previous pair.
                state.position.is_positioned = false;
            }

            if state.reset_on_close() {
                ran |= Flushed::RESET_ON_CLOSE;
            }

            if !pair_changed && !dirty.intersects(Dirty::POSITIONING | Dirty::TRACKER) {
                return ran;
            }
            let cleanup = state.cleanup.take();
            let mount = match (&state.elements.reference, &state.elements.floating) {
                (Some(reference), Some(floating)) => Some((
                    reference.clone(),
                    floating.clone(),
                    state.options.while_elements_mounted.clone(),
                )),
                _ => None,
            };
            (cleanup, mount)
        };

        if let Some(cleanup) = cleanup {
            cleanup();
            ran |= Flushed::UNMOUNTED;
        }
        let Some((reference, floating, tracker)) = mount else {
            return ran;
        };
        match tracker {
            None => {
                let task = self.update();
                let floating_id = self.shared.floating_id.clone();
                self.shared.platform.spawn_local(Box::pin(async move {
                    if let Err(err) = task.await {
                        tracing::warn!(floating_id = %floating_id, ?err, "position update failed");
                    }
                }));
                ran |= Flushed::UPDATE_SPAWNED;
            }
            Some(tracker) => {
                tracing::debug!(floating_id = %self.shared.floating_id, "mounting");
                let cleanup = tracker(&reference, &floating, self.updater());
                let mut state = self.shared.state.borrow_mut();
                if state.disposed {
                    drop(state);
                    if let Some(cleanup) = cleanup {
                        cleanup();
                    }
                } else {
                    state.cleanup = cleanup;
                }
                ran |= Flushed::MOUNTED;
            }
        }
        ran
    }

    /// Run any outstanding mount cleanup and stop reacting to inputs.
    ///
    /// Pending updates resolve without committing. Calling this again is a no-op.
    pub fn dispose(&self) {
        let cleanup = {
            let mut state = self.shared.state.borrow_mut();
            if mem::replace(&mut state.disposed, true) {
                return;
            }
            state.cleanup.take()
        };
        tracing::debug!(floating_id = %self.shared.floating_id, "disposed");
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }

    /// Horizontal coordinate.
    pub fn x(&self) -> f64 {
        self.shared.state.borrow().position.x
    }

    /// Vertical coordinate.
    pub fn y(&self) -> f64 {
        self.shared.state.borrow().position.y
    }

    /// Resolved placement.
    pub fn placement(&self) -> Placement {
        self.shared.state.borrow().position.placement
    }

    /// Resolved strategy.
    pub fn strategy(&self) -> Strategy {
        self.shared.state.borrow().position.strategy
    }

    /// Middleware data from the last committed computation.
    pub fn middleware_data(&self) -> MiddlewareData<P::MiddlewarePayload> {
        self.shared.state.borrow().position.middleware_data.clone()
    }

    /// Whether the floating element has been positioned since it was last shown.
    pub fn is_positioned(&self) -> bool {
        self.shared.state.borrow().position.is_positioned
    }

    /// Snapshot of the whole position state.
    pub fn position(&self) -> PositionState<P::MiddlewarePayload> {
        self.shared.state.borrow().position.clone()
    }

    /// Open flag.
    pub fn open(&self) -> bool {
        self.shared.state.borrow().options.open
    }

    /// Bound element handles.
    pub fn elements(&self) -> FloatingElements<P::Reference, P::Floating> {
        self.shared.state.borrow().elements.clone()
    }

    /// Styles to apply to the floating element.
    ///
    /// Uses the requested strategy and the bound floating element's device
    /// pixel ratio.
    pub fn floating_styles(&self) -> FloatingStyles {
        let state = self.shared.state.borrow();
        let dpr = state
            .elements
            .floating
            .as_ref()
            .map(|floating| self.shared.platform.device_pixel_ratio(floating));
        floating_styles(
            state.options.strategy,
            state.options.transform,
            dpr,
            state.position.x,
            state.position.y,
        )
    }
}

impl<P: Platform> Drop for Floating<P> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{OPEN_CHANGE, OpenChange};
    use alloc::vec;
    use core::cell::Cell;
    use core::future::poll_fn;
    use core::pin::pin;
    use core::task::{Context, Poll, Waker};

    type Payload = usize;

    #[derive(Default)]
    struct Gate {
        open: Cell<bool>,
    }

    #[derive(Default)]
    struct Probe {
        calls: Cell<usize>,
        gated: Cell<bool>,
        fail: Cell<bool>,
        gates: RefCell<Vec<Rc<Gate>>>,
        tasks: RefCell<Vec<LocalTask>>,
        dpr: Cell<f64>,
    }

    #[derive(Clone, Default)]
    struct TestPlatform {
        probe: Rc<Probe>,
    }

    impl Platform for TestPlatform {
        type Reference = u32;
        type Floating = u32;
        type Middleware = &'static str;
        type MiddlewarePayload = Payload;
        type Event = &'static str;
        type Error = &'static str;

        fn compute_position(
            &self,
            reference: &u32,
            floating: &u32,
            config: ComputePositionConfig<'_, &'static str>,
        ) -> impl Future<Output = Result<ComputePositionReturn<Payload>, &'static str>> {
            let probe = &self.probe;
            probe.calls.set(probe.calls.get() + 1);
            let gate = probe.gated.get().then(|| {
                let gate = Rc::new(Gate::default());
                probe.gates.borrow_mut().push(gate.clone());
                gate
            });
            let mut middleware_data = MiddlewareData::new();
            for (i, name) in config.middleware.iter().enumerate() {
                middleware_data.insert(*name, i);
            }
            let result = if probe.fail.get() {
                Err("engine failed")
            } else {
                Ok(ComputePositionReturn {
                    x: f64::from(*reference) + 0.25,
                    y: f64::from(*floating) * 2.0,
                    placement: config.placement,
                    strategy: config.strategy,
                    middleware_data,
                })
            };
            async move {
                if let Some(gate) = gate {
                    poll_fn(|_| {
                        if gate.open.get() {
                            Poll::Ready(())
                        } else {
                            Poll::Pending
                        }
                    })
                    .await;
                }
                result
            }
        }

        fn device_pixel_ratio(&self, _floating: &u32) -> f64 {
            let dpr = self.probe.dpr.get();
            if dpr > 0.0 { dpr } else { 1.0 }
        }

        fn spawn_local(&self, task: LocalTask) {
            self.probe.tasks.borrow_mut().push(task);
        }
    }

    impl TestPlatform {
        fn run_tasks(&self) -> usize {
            let tasks = mem::take(&mut *self.probe.tasks.borrow_mut());
            let n = tasks.len();
            for task in tasks {
                block_on(task);
            }
            n
        }

        fn release(&self, index: usize) {
            self.probe.gates.borrow()[index].open.set(true);
        }
    }

    fn poll_once<F: Future>(fut: Pin<&mut F>) -> Poll<F::Output> {
        fut.poll(&mut Context::from_waker(Waker::noop()))
    }

    fn block_on<F: Future>(fut: F) -> F::Output {
        match poll_once(pin!(fut)) {
            Poll::Ready(out) => out,
            Poll::Pending => panic!("future was expected to complete immediately"),
        }
    }

    fn mounted(platform: &TestPlatform) -> Floating<TestPlatform> {
        let floating = Floating::new(
            platform.clone(),
            FloatingOptions {
                reference: Some(10),
                floating: Some(20),
                ..FloatingOptions::default()
            },
        );
        platform.run_tasks();
        floating
    }

    #[test]
    fn update_without_elements_is_a_noop() {
        let platform = TestPlatform::default();
        let floating = Floating::new(platform.clone(), FloatingOptions::default());
        let before = floating.position();

        assert_eq!(block_on(floating.update()), Ok(UpdateOutcome::Skipped));
        floating.set_reference(Some(1));
        floating.flush();
        assert_eq!(block_on(floating.update()), Ok(UpdateOutcome::Skipped));

        assert_eq!(platform.probe.calls.get(), 0, "engine never consulted");
        assert_eq!(floating.position(), before);
    }

    #[test]
    fn mounting_without_tracker_spawns_one_update() {
        let platform = TestPlatform::default();
        let floating = Floating::new(
            platform.clone(),
            FloatingOptions {
                reference: Some(10),
                floating: Some(20),
                ..FloatingOptions::default()
            },
        );
        assert!(!floating.is_positioned(), "nothing committed before the task runs");
        assert_eq!(platform.run_tasks(), 1);

        assert!(floating.is_positioned());
        assert_eq!((floating.x(), floating.y()), (10.25, 40.0));
        assert_eq!(floating.placement(), Placement::Bottom);
        assert_eq!(platform.probe.calls.get(), 1);
    }

    #[test]
    fn flush_binds_elements_before_mounting() {
        let platform = TestPlatform::default();
        let floating = Floating::new(platform.clone(), FloatingOptions::default());
        floating.set_reference(Some(1));
        floating.set_floating(Some(2));

        let ran = floating.flush();
        assert!(ran.contains(Flushed::REFERENCE_BOUND | Flushed::FLOATING_BOUND));
        assert!(ran.contains(Flushed::UPDATE_SPAWNED));
        assert_eq!(floating.elements().reference, Some(1));

        assert_eq!(floating.flush(), Flushed::empty(), "nothing changed since");
    }

    #[test]
    fn update_is_idempotent() {
        let platform = TestPlatform::default();
        let floating = mounted(&platform);
        floating.set_middleware(vec![Some("offset")]);

        block_on(floating.update()).unwrap();
        let first = floating.position();
        block_on(floating.update()).unwrap();
        assert_eq!(floating.position(), first);
    }

    #[test]
    fn disabled_middleware_is_filtered() {
        let platform = TestPlatform::default();
        let floating = mounted(&platform);
        floating.set_middleware(vec![Some("offset"), None, Some("flip"), None]);

        assert_eq!(block_on(floating.update()), Ok(UpdateOutcome::Committed));
        let data = floating.middleware_data();
        assert_eq!(data.len(), 2);
        assert_eq!(data.get("offset"), Some(&0));
        assert_eq!(data.get("flip"), Some(&1));
    }

    #[test]
    fn closing_resets_only_is_positioned() {
        let platform = TestPlatform::default();
        let floating = mounted(&platform);
        let before = floating.position();
        assert!(before.is_positioned);

        floating.set_open(false);
        let ran = floating.flush();
        assert!(ran.contains(Flushed::RESET_ON_CLOSE));

        let after = floating.position();
        assert!(!after.is_positioned);
        assert_eq!(
            (after.x, after.y, after.placement, after.strategy),
            (before.x, before.y, before.placement, before.strategy)
        );
    }

    #[test]
    fn commit_while_closed_stays_unpositioned() {
        let platform = TestPlatform::default();
        let floating = mounted(&platform);
        floating.set_open(false);
        floating.flush();

        assert_eq!(block_on(floating.update()), Ok(UpdateOutcome::Committed));
        assert!(!floating.is_positioned());

        floating.set_open(true);
        floating.flush();
        assert_eq!(block_on(floating.update()), Ok(UpdateOutcome::Committed));
        assert!(floating.is_positioned());
    }

    #[test]
    fn older_result_is_dropped_once_newer_committed() {
        let platform = TestPlatform::default();
        let floating = mounted(&platform);
        platform.probe.gated.set(true);

        let mut first = pin!(floating.update());
        floating.set_placement(Placement::Top);
        let mut second = pin!(floating.update());
        assert!(poll_once(first.as_mut()).is_pending());
        assert!(poll_once(second.as_mut()).is_pending());

        platform.release(1);
        assert_eq!(poll_once(second.as_mut()), Poll::Ready(Ok(UpdateOutcome::Committed)));
        platform.release(0);
        assert_eq!(poll_once(first.as_mut()), Poll::Ready(Ok(UpdateOutcome::Stale)));

        assert_eq!(floating.placement(), Placement::Top);
    }

    #[test]
    fn in_order_results_both_commit() {
        let platform = TestPlatform::default();
        let floating = mounted(&platform);
        platform.probe.gated.set(true);

        let mut first = pin!(floating.update());
        floating.set_placement(Placement::Left);
        let mut second = pin!(floating.update());
        let _ = poll_once(first.as_mut());
        let _ = poll_once(second.as_mut());

        platform.release(0);
        assert_eq!(poll_once(first.as_mut()), Poll::Ready(Ok(UpdateOutcome::Committed)));
        assert_eq!(floating.placement(), Placement::Bottom);
        platform.release(1);
        assert_eq!(poll_once(second.as_mut()), Poll::Ready(Ok(UpdateOutcome::Committed)));
        assert_eq!(floating.placement(), Placement::Left);
    }

    #[test]
    fn result_for_replaced_element_is_dropped() {
        let platform = TestPlatform::default();
        let floating = mounted(&platform);
        platform.probe.gated.set(true);

        let mut pending = pin!(floating.update());
        assert!(poll_once(pending.as_mut()).is_pending());

        floating.set_reference(Some(11));
        floating.flush();
        assert!(!floating.is_positioned(), "old position no longer describes the pair");

        platform.release(0);
        assert_eq!(poll_once(pending.as_mut()), Poll::Ready(Ok(UpdateOutcome::Stale)));
        assert!(!floating.is_positioned());
    }

    #[test]
    fn engine_failure_leaves_state_untouched() {
        let platform = TestPlatform::default();
        let floating = mounted(&platform);
        let before = floating.position();
        platform.probe.fail.set(true);
        floating.set_placement(Placement::Right);

        assert_eq!(block_on(floating.update()), Err("engine failed"));
        assert_eq!(floating.position(), before);
        assert!(floating.is_positioned());
    }

    #[test]
    fn failure_before_first_commit_keeps_unpositioned() {
        let platform = TestPlatform::default();
        platform.probe.fail.set(true);
        let floating = mounted(&platform);
        assert!(!floating.is_positioned());
        assert_eq!(platform.probe.calls.get(), 1);
    }

    #[test]
    fn positioning_changes_rerun_the_driver() {
        let platform = TestPlatform::default();
        let floating = mounted(&platform);

        floating.set_placement(Placement::Bottom);
        assert_eq!(floating.flush(), Flushed::empty(), "same placement is not a change");

        floating.set_placement(Placement::TopEnd);
        assert!(floating.flush().contains(Flushed::UPDATE_SPAWNED));
        platform.run_tasks();
        assert_eq!(floating.placement(), Placement::TopEnd);
    }

    #[derive(Default)]
    struct TrackerLog {
        mounts: RefCell<Vec<(u32, u32)>>,
        cleanups: Cell<usize>,
        updater: RefCell<Option<Updater<TestPlatform>>>,
    }

    fn tracker(log: &Rc<TrackerLog>) -> MountTracker<TestPlatform> {
        let log = log.clone();
        Rc::new(move |reference: &u32, floating: &u32, updater: Updater<TestPlatform>| {
            log.mounts.borrow_mut().push((*reference, *floating));
            *log.updater.borrow_mut() = Some(updater);
            let log = log.clone();
            Some(Box::new(move || log.cleanups.set(log.cleanups.get() + 1)) as Cleanup)
        })
    }

    #[test]
    fn tracker_cleanup_runs_once_per_episode() {
        let platform = TestPlatform::default();
        let log = Rc::new(TrackerLog::default());
        let floating = Floating::new(
            platform.clone(),
            FloatingOptions {
                reference: Some(1),
                floating: Some(2),
                while_elements_mounted: Some(tracker(&log)),
                ..FloatingOptions::default()
            },
        );
        assert_eq!(*log.mounts.borrow(), vec![(1, 2)]);
        assert_eq!(platform.run_tasks(), 0, "tracker owns updates");

        floating.set_reference(Some(3));
        let ran = floating.flush();
        assert!(ran.contains(Flushed::UNMOUNTED | Flushed::MOUNTED));
        assert_eq!(log.cleanups.get(), 1);
        assert_eq!(*log.mounts.borrow(), vec![(1, 2), (3, 2)]);

        floating.set_floating(None);
        let ran = floating.flush();
        assert!(ran.contains(Flushed::UNMOUNTED));
        assert!(!ran.contains(Flushed::MOUNTED));
        assert_eq!(log.cleanups.get(), 2);

        floating.set_floating(Some(4));
        floating.flush();
        floating.dispose();
        floating.dispose();
        assert_eq!(log.cleanups.get(), 3, "one cleanup per mount episode");
        assert_eq!(log.mounts.borrow().len(), 3);
    }

    #[test]
    fn dropping_runs_outstanding_cleanup() {
        let platform = TestPlatform::default();
        let log = Rc::new(TrackerLog::default());
        let floating = Floating::new(
            platform.clone(),
            FloatingOptions {
                reference: Some(1),
                floating: Some(2),
                while_elements_mounted: Some(tracker(&log)),
                ..FloatingOptions::default()
            },
        );
        drop(floating);
        assert_eq!(log.cleanups.get(), 1);
    }

    #[test]
    fn queued_update_does_not_keep_instance_alive() {
        let platform = TestPlatform::default();
        let floating = Floating::new(
            platform.clone(),
            FloatingOptions {
                reference: Some(1),
                floating: Some(2),
                ..FloatingOptions::default()
            },
        );
        let shared = Rc::downgrade(&floating.shared);
        assert_eq!(platform.probe.tasks.borrow().len(), 1, "update queued, not run");

        drop(floating);
        assert!(shared.upgrade().is_none(), "queued task must not own the instance");
        assert_eq!(platform.run_tasks(), 1);
        assert_eq!(platform.probe.calls.get(), 0, "engine skipped for a dropped instance");
    }

    #[test]
    fn tracker_updater_drives_updates() {
        let platform = TestPlatform::default();
        let log = Rc::new(TrackerLog::default());
        let floating = Floating::new(
            platform.clone(),
            FloatingOptions {
                reference: Some(5),
                floating: Some(6),
                while_elements_mounted: Some(tracker(&log)),
                ..FloatingOptions::default()
            },
        );
        let updater = log.updater.borrow().clone().expect("tracker received an updater");

        assert_eq!(block_on(updater.update()), Ok(UpdateOutcome::Committed));
        assert_eq!((floating.x(), floating.y()), (5.25, 12.0));

        drop(floating);
        assert_eq!(block_on(updater.update()), Ok(UpdateOutcome::Skipped));
    }

    #[test]
    fn pending_update_after_dispose_does_not_commit() {
        let platform = TestPlatform::default();
        let floating = mounted(&platform);
        let before = floating.position();
        platform.probe.gated.set(true);

        let mut pending = pin!(floating.update());
        assert!(poll_once(pending.as_mut()).is_pending());
        floating.dispose();
        platform.release(0);
        assert_eq!(poll_once(pending.as_mut()), Poll::Ready(Ok(UpdateOutcome::Stale)));
        assert_eq!(floating.position(), before);
    }

    #[test]
    fn open_change_reaches_bus_before_owner() {
        let platform = TestPlatform::default();
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::default();
        let owner_log = order.clone();
        let floating = Floating::new(
            platform,
            FloatingOptions {
                on_open_change: Some(Rc::new(
                    move |open: bool, event: Option<&&'static str>, _: Option<OpenChangeReason>| {
                        assert!(open);
                        assert_eq!(event, Some(&"click"));
                        owner_log.borrow_mut().push("owner");
                    },
                )),
                ..FloatingOptions::default()
            },
        );
        let context = floating.context();

        let a = order.clone();
        context.events().on(OPEN_CHANGE, move |_| a.borrow_mut().push("a"));
        let b = order.clone();
        context
            .events()
            .on_open_change::<&'static str>(move |change| {
                assert_eq!(change.reason, Some(OpenChangeReason::ReferencePress));
                b.borrow_mut().push("b");
            });

        context.on_open_change(true, Some("click"), Some(OpenChangeReason::ReferencePress));
        assert_eq!(*order.borrow(), vec!["a", "b", "owner"]);
    }

    #[test]
    fn open_event_is_recorded_and_cleared() {
        let platform = TestPlatform::default();
        let floating = Floating::new(platform, FloatingOptions::default());
        let context = floating.context();

        context.on_open_change(true, Some("pointerdown"), None);
        assert_eq!(context.data().open_event, Some("pointerdown"));

        let seen: Rc<RefCell<Option<OpenChange<&'static str>>>> = Rc::default();
        let sink = seen.clone();
        context
            .events()
            .on_open_change::<&'static str>(move |change| *sink.borrow_mut() = Some(change.clone()));

        context.on_open_change(false, Some("keydown"), Some(OpenChangeReason::EscapeKey));
        assert_eq!(context.data().open_event, None);
        assert_eq!(
            *seen.borrow(),
            Some(OpenChange {
                open: false,
                event: Some("keydown"),
                reason: Some(OpenChangeReason::EscapeKey),
            })
        );
    }

    #[test]
    fn context_projects_live_state() {
        let platform = TestPlatform::default();
        let floating = mounted(&platform);
        let context = floating.context();
        assert_eq!(context.x(), floating.x());
        assert!(context.is_positioned());
        assert!(context.open());
        assert_eq!(context.elements(), floating.elements());

        floating.set_open(false);
        floating.set_node_id(Some("node-1".into()));
        floating.flush();
        assert!(!context.open());
        assert!(!context.is_positioned());
        assert_eq!(context.node_id().as_deref(), Some("node-1"));
    }

    #[test]
    fn floating_ids_are_distinct_and_stable() {
        let platform = TestPlatform::default();
        let a = Floating::new(platform.clone(), FloatingOptions::default());
        let b = Floating::new(platform, FloatingOptions::default());
        let id = String::from(a.context().floating_id());
        assert_ne!(id, b.context().floating_id());
        a.set_open(false);
        a.flush();
        assert_eq!(a.context().floating_id(), id);
    }

    #[test]
    fn styles_follow_position_and_dpr() {
        let platform = TestPlatform::default();
        let floating = Floating::new(platform.clone(), FloatingOptions::default());
        assert_eq!(floating.floating_styles().translate, None);

        platform.probe.dpr.set(2.0);
        floating.set_reference(Some(10));
        floating.set_floating(Some(3));
        floating.flush();
        platform.run_tasks();

        let styles = floating.floating_styles();
        assert_eq!(styles.translate, Some(kurbo::Vec2::new(10.5, 6.0)));
        assert!(styles.will_change_transform);

        floating.set_transform(false);
        let styles = floating.floating_styles();
        assert_eq!((styles.left, styles.top, styles.translate), (10.5, 6.0, None));
    }
}
