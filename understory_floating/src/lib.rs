// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_floating --heading-base-level=0

//! Understory Floating: orchestration for floating UI elements.
//!
//! Tooltips, popovers, menus, and selects all share a shape: a *floating* element is positioned
//! relative to a *reference* element, shown and hidden on request, and annotated with ARIA
//! attributes so assistive technology understands the relationship.
//!
//! This crate owns the state and lifecycle around that shape. It does not do geometry: the actual
//! coordinates come from a positioning engine behind the [`Platform`] trait.
//!
//! - [`Floating`] holds the position state, binds element handles, and runs position updates.
//!   Results from the engine arrive asynchronously; stale results are never committed.
//! - [`FloatingContext`] is the handle that behavior modules receive. It exposes live state, an
//!   [`EventBus`](events::EventBus), and typed scratch data ([`ContextData`]).
//! - [`role::UseRole`] derives ARIA attribute sets for the reference, the floating element, and
//!   list items from a [`role::Role`].
//!
//! ## Update model
//!
//! Setters on [`Floating`] only record what changed. [`Floating::flush`] applies the recorded
//! changes in a fixed order (bind reference, bind floating, reset on close, mount), much like a
//! commit step. When both elements are present, the mount step either spawns a single
//! update through [`Platform::spawn_local`] or hands an [`Updater`] to the owner's
//! [`MountTracker`] so that it can reposition on scroll or resize.
//!
//! Each update is tagged with a generation when it starts. A result is dropped as
//! [`UpdateOutcome::Stale`] when a newer update already committed, when the element pair changed
//! while it was in flight, or when the instance was disposed.
//!
//! ## Not a positioning engine
//!
//! Collision handling, flipping, shifting, arrows, and virtual elements are middleware concerns of
//! the engine. Middleware values are opaque here; this crate only filters out disabled entries and
//! forwards the rest along with the placement and strategy.
//!
//! ## Features
//!
//! - `std` (default): use the standard library's float math.
//! - `libm`: use `libm` for float math in `no_std` builds.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod context;
pub mod events;
mod floating;
mod id;
mod position;
pub mod role;

pub use context::{ContextData, DataKey, FloatingContext, FloatingElements};
pub use floating::{
    Cleanup, Floating, FloatingOptions, Flushed, LocalTask, MountTracker, OpenChangeCallback,
    Platform, UpdateOutcome, Updater,
};
pub use id::use_id;
pub use position::{
    Alignment, ComputePositionConfig, ComputePositionReturn, FloatingStyles, MiddlewareData,
    ParsePlacementError, Placement, PositionState, Side, Strategy, WILL_CHANGE_DPR,
    floating_styles, round_by_dpr,
};
