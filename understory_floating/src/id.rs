// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Process-wide unique identifiers for ARIA wiring.

use alloc::format;
use alloc::string::String;
use core::sync::atomic::{AtomicUsize, Ordering};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Generate a fresh identifier of the form `floating-ui-<n>`.
///
/// Identifiers come from a single process-wide counter, so no two calls within
/// one process return the same value. There is no cross-process guarantee.
pub fn use_id() -> String {
    let n = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("floating-ui-{n}")
}
