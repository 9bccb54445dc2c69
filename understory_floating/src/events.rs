// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A small synchronous publish/subscribe channel keyed by event name.
//!
//! [`EventBus`] decouples modules that produce floating-element lifecycle events
//! from modules that react to them. It is deliberately minimal:
//!
//! - Handlers are registered per event name with [`EventBus::on`], which returns
//!   a [`HandlerId`] used to deregister with [`EventBus::off`].
//! - [`EventBus::emit`] runs every handler subscribed to that name, in
//!   subscription order, on the caller's stack. Payloads are passed as
//!   `&dyn Any`; handlers downcast to the type they expect.
//! - There are no wildcard subscriptions and no replay: a handler registered
//!   after an emission never observes it.
//!
//! ## Minimal example
//!
//! ```
//! use core::cell::RefCell;
//! use std::rc::Rc;
//! use understory_floating::events::EventBus;
//!
//! let bus = EventBus::new();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let sink = seen.clone();
//! let id = bus.on("select", move |payload| {
//!     if let Some(index) = payload.downcast_ref::<usize>() {
//!         sink.borrow_mut().push(*index);
//!     }
//! });
//!
//! bus.emit("select", &3_usize);
//! bus.off("select", id);
//! bus.emit("select", &4_usize);
//!
//! assert_eq!(*seen.borrow(), vec![3]);
//! ```
//!
//! ## Open-change events
//!
//! [`FloatingContext::on_open_change`](crate::FloatingContext::on_open_change)
//! emits [`OPEN_CHANGE`] with an [`OpenChange`] payload before it forwards to
//! the application's own callback. [`EventBus::on_open_change`] is a typed
//! shorthand for subscribing to it.

use alloc::rc::Rc;
use alloc::string::String;
use core::any::Any;
use core::cell::{Cell, RefCell};
use core::fmt;

use hashbrown::HashMap;
use smallvec::SmallVec;

/// Name of the event emitted whenever the open state is asked to change.
pub const OPEN_CHANGE: &str = "openchange";

/// Handle returned by [`EventBus::on`], used to deregister the handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Cause of an open/close transition.
///
/// Values only; interactions that produce them live in other modules.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OpenChangeReason {
    /// A press landed outside both the reference and floating elements.
    OutsidePress,
    /// The Escape key was pressed.
    EscapeKey,
    /// An ancestor of the reference element scrolled.
    AncestorScroll,
    /// The reference element was pressed.
    ReferencePress,
    /// The reference element was clicked.
    Click,
    /// The pointer hovered or left the reference element.
    Hover,
    /// The reference element received focus.
    Focus,
    /// Focus moved outside the reference and floating elements.
    FocusOut,
    /// List navigation moved the active item.
    ListNavigation,
    /// The pointer left the safe polygon between reference and floating.
    SafePolygon,
}

impl OpenChangeReason {
    /// Kebab-case name, as used on the web (`"outside-press"`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OutsidePress => "outside-press",
            Self::EscapeKey => "escape-key",
            Self::AncestorScroll => "ancestor-scroll",
            Self::ReferencePress => "reference-press",
            Self::Click => "click",
            Self::Hover => "hover",
            Self::Focus => "focus",
            Self::FocusOut => "focus-out",
            Self::ListNavigation => "list-navigation",
            Self::SafePolygon => "safe-polygon",
        }
    }
}

/// Payload of the [`OPEN_CHANGE`] event.
///
/// `E` is the host's raw event type (see [`Platform::Event`](crate::Platform::Event)).
#[derive(Clone, Debug, PartialEq)]
pub struct OpenChange<E> {
    /// Requested open state.
    pub open: bool,
    /// Raw event that triggered the request, if any.
    pub event: Option<E>,
    /// Why the request was made, if known.
    pub reason: Option<OpenChangeReason>,
}

type Handler = Rc<dyn Fn(&dyn Any)>;

/// Synchronous, in-process event bus keyed by event name.
#[derive(Default)]
pub struct EventBus {
    handlers: RefCell<HashMap<String, SmallVec<[(HandlerId, Handler); 2]>>>,
    next_id: Cell<u64>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.borrow();
        let mut map = f.debug_map();
        for (name, list) in handlers.iter() {
            map.entry(name, &list.len());
        }
        map.finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to events named `name`.
    pub fn on(&self, name: &str, handler: impl Fn(&dyn Any) + 'static) -> HandlerId {
        let id = HandlerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let mut handlers = self.handlers.borrow_mut();
        let entry = (id, Rc::new(handler) as Handler);
        if let Some(list) = handlers.get_mut(name) {
            list.push(entry);
        } else {
            let mut list = SmallVec::new();
            list.push(entry);
            handlers.insert(String::from(name), list);
        }
        id
    }

    /// Typed subscription to [`OPEN_CHANGE`].
    ///
    /// Payloads of another type (emitted by hand under the same name) are ignored.
    pub fn on_open_change<E: 'static>(
        &self,
        handler: impl Fn(&OpenChange<E>) + 'static,
    ) -> HandlerId {
        self.on(OPEN_CHANGE, move |payload| {
            if let Some(change) = payload.downcast_ref::<OpenChange<E>>() {
                handler(change);
            }
        })
    }

    /// Remove a handler. Returns `false` if it was not subscribed to `name`.
    pub fn off(&self, name: &str, id: HandlerId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        let Some(list) = handlers.get_mut(name) else {
            return false;
        };
        let Some(pos) = list.iter().position(|(h, _)| *h == id) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            handlers.remove(name);
        }
        true
    }

    /// Invoke every handler subscribed to `name` with `payload`.
    ///
    /// The handler list is snapshotted first: handlers added or removed while
    /// this call runs take effect from the next emission.
    pub fn emit(&self, name: &str, payload: &dyn Any) {
        let snapshot: SmallVec<[Handler; 4]> = match self.handlers.borrow().get(name) {
            Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
            None => return,
        };
        tracing::trace!(event = name, handlers = snapshot.len(), "emit");
        for handler in snapshot {
            handler(payload);
        }
    }

    /// Number of handlers currently subscribed to `name`.
    pub fn handler_count(&self, name: &str) -> usize {
        self.handlers.borrow().get(name).map_or(0, |list| list.len())
    }
}
