// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The shared handle that behavior modules receive.
//!
//! A [`FloatingContext`] is a cheap, cloneable view of one floating instance.
//! It exposes the live position state, the open flag, the element handles,
//! the instance's [`EventBus`], and a shared [`ContextData`] scratch space.
//! Modules such as role derivation read from it; modules that need to request
//! an open/close transition go through [`FloatingContext::on_open_change`].
//!
//! ## Scratch data
//!
//! [`ContextData`] stores values under typed, namespaced [`DataKey`]s so that
//! independent modules can share state without agreeing on a single record
//! type:
//!
//! ```
//! use understory_floating::{ContextData, DataKey};
//!
//! const ACTIVE_INDEX: DataKey<usize> = DataKey::new("list-navigation", "active-index");
//!
//! let mut data: ContextData<()> = ContextData::new();
//! data.insert(ACTIVE_INDEX, 2);
//! assert_eq!(data.get(ACTIVE_INDEX), Some(&2));
//! ```

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use core::any::Any;
use core::cell::{Ref, RefMut};
use core::fmt;
use core::marker::PhantomData;

use hashbrown::HashMap;

use crate::events::{EventBus, OPEN_CHANGE, OpenChange, OpenChangeReason};
use crate::floating::{Platform, Shared};
use crate::position::{MiddlewareData, Placement, PositionState, Strategy};

/// Reference and floating element handles.
///
/// Handles are owned by the host; this crate only observes identity changes.
#[derive(Clone, Debug, PartialEq)]
pub struct FloatingElements<R, F> {
    /// The anchor element.
    pub reference: Option<R>,
    /// The positioned element.
    pub floating: Option<F>,
}

impl<R, F> Default for FloatingElements<R, F> {
    fn default() -> Self {
        Self {
            reference: None,
            floating: None,
        }
    }
}

impl<R, F> FloatingElements<R, F> {
    /// Whether both elements are present.
    pub fn is_complete(&self) -> bool {
        self.reference.is_some() && self.floating.is_some()
    }
}

/// Typed key into [`ContextData`].
///
/// Keys are identified by `(namespace, name)`. Use the owning module's name
/// as the namespace to avoid collisions.
pub struct DataKey<T> {
    namespace: &'static str,
    name: &'static str,
    marker: PhantomData<fn() -> T>,
}

impl<T> DataKey<T> {
    /// Create a key.
    pub const fn new(namespace: &'static str, name: &'static str) -> Self {
        Self {
            namespace,
            name,
            marker: PhantomData,
        }
    }

    /// Namespace part of the key.
    pub const fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// Name part of the key.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    fn slot(&self) -> (&'static str, &'static str) {
        (self.namespace, self.name)
    }
}

impl<T> Clone for DataKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DataKey<T> {}

impl<T> fmt::Debug for DataKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataKey({}::{})", self.namespace, self.name)
    }
}

/// Shared scratch space of a floating instance.
///
/// `open_event` holds the raw event behind the latest open transition. All
/// other entries are typed values stored under [`DataKey`]s. A value can only
/// be read back at the type of the key that stored it; reading a slot at
/// another type yields `None`.
pub struct ContextData<E> {
    /// Event that last opened the floating element, cleared on close.
    pub open_event: Option<E>,
    entries: HashMap<(&'static str, &'static str), Box<dyn Any>>,
}

impl<E> Default for ContextData<E> {
    fn default() -> Self {
        Self {
            open_event: None,
            entries: HashMap::new(),
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for ContextData<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextData")
            .field("open_event", &self.open_event)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<E> ContextData<E> {
    /// Create empty data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, returning the previous value if it had the same type.
    pub fn insert<T: Any>(&mut self, key: DataKey<T>, value: T) -> Option<T> {
        self.entries
            .insert(key.slot(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Borrow the value stored under `key`.
    pub fn get<T: Any>(&self, key: DataKey<T>) -> Option<&T> {
        self.entries.get(&key.slot())?.downcast_ref()
    }

    /// Mutably borrow the value stored under `key`.
    pub fn get_mut<T: Any>(&mut self, key: DataKey<T>) -> Option<&mut T> {
        self.entries.get_mut(&key.slot())?.downcast_mut()
    }

    /// Remove and return the value stored under `key`.
    ///
    /// A slot holding a value of another type is left in place.
    pub fn remove<T: Any>(&mut self, key: DataKey<T>) -> Option<T> {
        if !self.contains(key) {
            return None;
        }
        let boxed = self.entries.remove(&key.slot())?;
        boxed.downcast::<T>().ok().map(|value| *value)
    }

    /// Whether a value of type `T` is stored under `key`.
    pub fn contains<T: Any>(&self, key: DataKey<T>) -> bool {
        self.get(key).is_some()
    }
}

/// Handle to a floating instance, passed to dependent modules.
pub struct FloatingContext<P: Platform> {
    pub(crate) shared: Rc<Shared<P>>,
}

impl<P: Platform> Clone for FloatingContext<P> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<P: Platform> fmt::Debug for FloatingContext<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FloatingContext")
            .field("floating_id", &self.floating_id())
            .field("open", &self.open())
            .field("x", &self.x())
            .field("y", &self.y())
            .field("placement", &self.placement())
            .field("is_positioned", &self.is_positioned())
            .finish_non_exhaustive()
    }
}

impl<P: Platform> FloatingContext<P> {
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

    /// Open state, as supplied by the owner.
    pub fn open(&self) -> bool {
        self.shared.state.borrow().options.open
    }

    /// Node id within a floating tree, if any.
    pub fn node_id(&self) -> Option<String> {
        self.shared.state.borrow().options.node_id.clone()
    }

    /// Stable id of the floating element, for ARIA wiring.
    pub fn floating_id(&self) -> &str {
        &self.shared.floating_id
    }

    /// Bound element handles.
    pub fn elements(&self) -> FloatingElements<P::Reference, P::Floating> {
        self.shared.state.borrow().elements.clone()
    }

    /// The instance's event bus.
    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    /// Borrow the shared scratch data.
    pub fn data(&self) -> Ref<'_, ContextData<P::Event>> {
        self.shared.data.borrow()
    }

    /// Mutably borrow the shared scratch data.
    pub fn data_mut(&self) -> RefMut<'_, ContextData<P::Event>> {
        self.shared.data.borrow_mut()
    }

    /// Request an open-state transition.
    ///
    /// Records `event` as [`ContextData::open_event`] (cleared when closing),
    /// emits [`OPEN_CHANGE`] on the bus, then calls the owner's
    /// `on_open_change` callback. Bus subscribers therefore observe the
    /// request before the owner does. The open flag itself only changes when
    /// the owner applies it with [`Floating::set_open`](crate::Floating::set_open).
    pub fn on_open_change(
        &self,
        open: bool,
        event: Option<P::Event>,
        reason: Option<OpenChangeReason>,
    ) {
        self.shared.data.borrow_mut().open_event = if open { event.clone() } else { None };

        let change = OpenChange {
            open,
            event,
            reason,
        };
        self.shared.events.emit(OPEN_CHANGE, &change);

        let callback = self.shared.state.borrow().options.on_open_change.clone();
        if let Some(callback) = callback {
            callback(open, change.event.as_ref(), reason);
        }
    }
}
