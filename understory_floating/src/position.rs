// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Position state of a floating element and its derived CSS representation.
//!
//! [`PositionState`] is the record written by the update pipeline after each
//! successful engine call. [`floating_styles`] turns the current coordinates
//! into the declarations a host applies to the floating element, rounding to
//! the device pixel grid so the element is not rendered on a sub-pixel offset.
//!
//! ```
//! use understory_floating::{Strategy, floating_styles, round_by_dpr};
//!
//! assert_eq!(round_by_dpr(2.0, 10.3), 10.5);
//! assert_eq!(round_by_dpr(1.0, 10.3), 10.0);
//!
//! let styles = floating_styles(Strategy::Absolute, true, Some(2.0), 10.3, 4.0);
//! assert_eq!(
//!     styles.to_string(),
//!     "position: absolute; left: 0px; top: 0px; transform: translate(10.5px, 4px); will-change: transform;",
//! );
//! ```

use alloc::string::String;
use core::fmt;
use core::str::FromStr;

use hashbrown::HashMap;
#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;
use kurbo::{Point, Vec2};

/// Side of the reference element the floating element is placed on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// Above the reference.
    Top,
    /// Right of the reference.
    Right,
    /// Below the reference.
    Bottom,
    /// Left of the reference.
    Left,
}

/// Alignment along the chosen side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Alignment {
    /// Aligned to the start edge.
    Start,
    /// Aligned to the end edge.
    End,
}

/// Where the floating element sits relative to its reference element.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Placement {
    /// Centered above.
    Top,
    /// Above, start-aligned.
    TopStart,
    /// Above, end-aligned.
    TopEnd,
    /// Centered to the right.
    Right,
    /// Right, start-aligned.
    RightStart,
    /// Right, end-aligned.
    RightEnd,
    /// Centered below.
    #[default]
    Bottom,
    /// Below, start-aligned.
    BottomStart,
    /// Below, end-aligned.
    BottomEnd,
    /// Centered to the left.
    Left,
    /// Left, start-aligned.
    LeftStart,
    /// Left, end-aligned.
    LeftEnd,
}

impl Placement {
    /// All placements, in side-major order.
    pub const ALL: [Self; 12] = [
        Self::Top,
        Self::TopStart,
        Self::TopEnd,
        Self::Right,
        Self::RightStart,
        Self::RightEnd,
        Self::Bottom,
        Self::BottomStart,
        Self::BottomEnd,
        Self::Left,
        Self::LeftStart,
        Self::LeftEnd,
    ];

    /// Side component of the placement.
    pub const fn side(self) -> Side {
        match self {
            Self::Top | Self::TopStart | Self::TopEnd => Side::Top,
            Self::Right | Self::RightStart | Self::RightEnd => Side::Right,
            Self::Bottom | Self::BottomStart | Self::BottomEnd => Side::Bottom,
            Self::Left | Self::LeftStart | Self::LeftEnd => Side::Left,
        }
    }

    /// Alignment component, `None` for centered placements.
    pub const fn alignment(self) -> Option<Alignment> {
        match self {
            Self::TopStart | Self::RightStart | Self::BottomStart | Self::LeftStart => {
                Some(Alignment::Start)
            }
            Self::TopEnd | Self::RightEnd | Self::BottomEnd | Self::LeftEnd => Some(Alignment::End),
            Self::Top | Self::Right | Self::Bottom | Self::Left => None,
        }
    }

    /// Kebab-case name (`"bottom-start"`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::TopStart => "top-start",
            Self::TopEnd => "top-end",
            Self::Right => "right",
            Self::RightStart => "right-start",
            Self::RightEnd => "right-end",
            Self::Bottom => "bottom",
            Self::BottomStart => "bottom-start",
            Self::BottomEnd => "bottom-end",
            Self::Left => "left",
            Self::LeftStart => "left-start",
            Self::LeftEnd => "left-end",
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown placement name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsePlacementError;

impl fmt::Display for ParsePlacementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown placement")
    }
}

impl core::error::Error for ParsePlacementError {}

impl FromStr for Placement {
    type Err = ParsePlacementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or(ParsePlacementError)
    }
}

/// CSS positioning scheme of the floating element.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// `position: absolute`.
    #[default]
    Absolute,
    /// `position: fixed`.
    Fixed,
}

impl Strategy {
    /// CSS keyword.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Absolute => "absolute",
            Self::Fixed => "fixed",
        }
    }
}

/// Side-channel data produced by middleware, keyed by middleware name.
///
/// Payloads are opaque to this crate and passed through unmodified.
#[derive(Clone, Debug, PartialEq)]
pub struct MiddlewareData<V> {
    entries: HashMap<String, V>,
}

impl<V> Default for MiddlewareData<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> MiddlewareData<V> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload recorded by the middleware called `name`.
    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries.get(name)
    }

    /// Record `value` for `name`, returning the previous payload.
    pub fn insert(&mut self, name: impl Into<String>, value: V) -> Option<V> {
        self.entries.insert(name.into(), value)
    }

    /// Remove the payload for `name`.
    pub fn remove(&mut self, name: &str) -> Option<V> {
        self.entries.remove(name)
    }

    /// Iterate over `(name, payload)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no middleware reported data.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Options passed to the positioning engine for one computation.
#[derive(Clone, Debug)]
pub struct ComputePositionConfig<'a, M> {
    /// Requested placement.
    pub placement: Placement,
    /// Requested strategy.
    pub strategy: Strategy,
    /// Middleware pipeline, already stripped of disabled entries.
    pub middleware: &'a [M],
}

/// Result of one positioning engine call.
#[derive(Clone, Debug, PartialEq)]
pub struct ComputePositionReturn<V> {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
    /// Placement after middleware adjustments.
    pub placement: Placement,
    /// Strategy the coordinates are expressed in.
    pub strategy: Strategy,
    /// Middleware side-channel data.
    pub middleware_data: MiddlewareData<V>,
}

/// Last known position of a floating element.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionState<V> {
    /// Horizontal coordinate, `0` until the first computation.
    pub x: f64,
    /// Vertical coordinate, `0` until the first computation.
    pub y: f64,
    /// Resolved placement.
    pub placement: Placement,
    /// Resolved strategy.
    pub strategy: Strategy,
    /// Middleware data from the last computation.
    pub middleware_data: MiddlewareData<V>,
    /// Whether a computation has committed since the element was last shown.
    pub is_positioned: bool,
}

impl<V> PositionState<V> {
    /// Initial state for the requested placement and strategy.
    pub fn new(placement: Placement, strategy: Strategy) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            placement,
            strategy,
            middleware_data: MiddlewareData::new(),
            is_positioned: false,
        }
    }

    /// Coordinates as a point.
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Overwrite every field from an engine result and mark as positioned.
    pub(crate) fn apply(&mut self, result: ComputePositionReturn<V>) {
        self.x = result.x;
        self.y = result.y;
        self.placement = result.placement;
        self.strategy = result.strategy;
        self.middleware_data = result.middleware_data;
        self.is_positioned = true;
    }
}

/// Round `value` to the nearest position on the device pixel grid.
pub fn round_by_dpr(dpr: f64, value: f64) -> f64 {
    (value * dpr).round() / dpr
}

/// DPR at or above which the styles hint the compositor with `will-change`.
pub const WILL_CHANGE_DPR: f64 = 1.5;

/// Positioning declarations for the floating element.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FloatingStyles {
    /// `position` keyword.
    pub position: Strategy,
    /// `left`, in pixels.
    pub left: f64,
    /// `top`, in pixels.
    pub top: f64,
    /// `transform: translate(..)` offset, when transforms are used.
    pub translate: Option<Vec2>,
    /// Whether to emit `will-change: transform`.
    pub will_change_transform: bool,
}

/// Derive the floating element's styles.
///
/// `dpr` is the floating element's device pixel ratio, or `None` when no
/// floating element is bound yet (in which case only the origin is emitted).
pub fn floating_styles(
    strategy: Strategy,
    transform: bool,
    dpr: Option<f64>,
    x: f64,
    y: f64,
) -> FloatingStyles {
    let origin = FloatingStyles {
        position: strategy,
        left: 0.0,
        top: 0.0,
        translate: None,
        will_change_transform: false,
    };
    let Some(dpr) = dpr else {
        return origin;
    };

    let x = round_by_dpr(dpr, x);
    let y = round_by_dpr(dpr, y);

    if transform {
        FloatingStyles {
            translate: Some(Vec2::new(x, y)),
            will_change_transform: dpr >= WILL_CHANGE_DPR,
            ..origin
        }
    } else {
        FloatingStyles {
            left: x,
            top: y,
            ..origin
        }
    }
}

/// Pixel length without a negative zero.
struct Px(f64);

impl fmt::Display for Px {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}px", self.0 + 0.0)
    }
}

impl fmt::Display for FloatingStyles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "position: {}; left: {}; top: {};",
            self.position.as_str(),
            Px(self.left),
            Px(self.top)
        )?;
        if let Some(t) = self.translate {
            write!(f, " transform: translate({}, {});", Px(t.x), Px(t.y))?;
        }
        if self.will_change_transform {
            f.write_str(" will-change: transform;")?;
        }
        Ok(())
    }
}
