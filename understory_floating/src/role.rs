// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! ARIA attributes for the reference element, the floating element, and list items.
//!
//! [`UseRole`] derives attribute sets from a [`FloatingContext`] and a [`Role`].
//! Derivation is a pure function of the context's open flag and floating id
//! plus the role options; nothing is cached, so every call reflects the
//! current state.
//!
//! Component roles are first mapped to an ARIA role through a fixed table:
//!
//! | Component role | ARIA role |
//! |----------------|-----------|
//! | `select`       | `listbox` |
//! | `combobox`     | `listbox` |
//! | `label`        | none (labelling only) |
//!
//! Attributes whose value would be "unset" (for example `aria-controls` while
//! closed) are omitted from the [`AttributeSet`] rather than stored empty.
//!
//! ```
//! use understory_floating::role::{AriaRole, AttrValue, ComponentRole, Role};
//!
//! assert_eq!(Role::from(ComponentRole::Select).aria_role(), Some(AriaRole::Listbox));
//! assert_eq!(Role::from(ComponentRole::Label).aria_role(), None);
//! assert_eq!(AttrValue::from(true).to_string(), "true");
//! ```

use alloc::borrow::Cow;
use alloc::format;
use alloc::string::String;
use core::convert::Infallible;
use core::fmt;
use core::str::FromStr;

use smallvec::SmallVec;

use crate::context::FloatingContext;
use crate::floating::Platform;
use crate::id::use_id;

/// ARIA role of a floating element.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AriaRole {
    /// `tooltip`
    Tooltip,
    /// `dialog`
    Dialog,
    /// `alertdialog`
    AlertDialog,
    /// `menu`
    Menu,
    /// `listbox`
    Listbox,
    /// `grid`
    Grid,
    /// `tree`
    Tree,
    /// Any other role name, passed through uninterpreted.
    Other(Cow<'static, str>),
}

impl AriaRole {
    /// Role name as written in the `role` attribute.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Tooltip => "tooltip",
            Self::Dialog => "dialog",
            Self::AlertDialog => "alertdialog",
            Self::Menu => "menu",
            Self::Listbox => "listbox",
            Self::Grid => "grid",
            Self::Tree => "tree",
            Self::Other(name) => name,
        }
    }

    /// Role for `name`, using the named variant when one exists.
    ///
    /// Only names outside the known set become [`AriaRole::Other`].
    pub fn from_name(name: impl Into<Cow<'static, str>>) -> Self {
        let name = name.into();
        match &*name {
            "tooltip" => Self::Tooltip,
            "dialog" => Self::Dialog,
            "alertdialog" => Self::AlertDialog,
            "menu" => Self::Menu,
            "listbox" => Self::Listbox,
            "grid" => Self::Grid,
            "tree" => Self::Tree,
            _ => Self::Other(name),
        }
    }
}

impl FromStr for AriaRole {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(String::from(s)))
    }
}

/// Higher-level widget roles that map onto an [`AriaRole`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ComponentRole {
    /// A select-only listbox.
    Select,
    /// A label; the floating element only labels the reference.
    Label,
    /// An editable combobox with a listbox popup.
    Combobox,
}

impl ComponentRole {
    /// Component role called `name`, if any.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "select" => Some(Self::Select),
            "label" => Some(Self::Label),
            "combobox" => Some(Self::Combobox),
            _ => None,
        }
    }

    /// Underlying ARIA role; `None` for [`ComponentRole::Label`].
    pub const fn aria_role(self) -> Option<AriaRole> {
        match self {
            Self::Select | Self::Combobox => Some(AriaRole::Listbox),
            Self::Label => None,
        }
    }
}

/// Role configured for a floating element.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// A plain ARIA role.
    Aria(AriaRole),
    /// A component role, resolved through the fixed table.
    Component(ComponentRole),
}

impl Default for Role {
    fn default() -> Self {
        Self::Aria(AriaRole::Dialog)
    }
}

impl From<AriaRole> for Role {
    fn from(role: AriaRole) -> Self {
        Self::Aria(role)
    }
}

impl From<ComponentRole> for Role {
    fn from(role: ComponentRole) -> Self {
        Self::Component(role)
    }
}

impl FromStr for Role {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match ComponentRole::from_name(s) {
            Some(component) => Self::Component(component),
            None => Self::Aria(AriaRole::from_name(String::from(s))),
        })
    }
}

impl Role {
    /// The same role with any known name held in [`AriaRole::Other`] resolved
    /// to its variant or component role.
    pub fn resolved(self) -> Self {
        match self {
            Self::Aria(AriaRole::Other(name)) => match ComponentRole::from_name(&name) {
                Some(component) => Self::Component(component),
                None => Self::Aria(AriaRole::from_name(name)),
            },
            other => other,
        }
    }

    /// Resolved ARIA role; `None` means no `role` attribute at all.
    pub fn aria_role(&self) -> Option<AriaRole> {
        match self {
            Self::Aria(role) => Some(role.clone()),
            Self::Component(role) => role.aria_role(),
        }
    }

    fn is(&self, component: ComponentRole) -> bool {
        *self == Self::Component(component)
    }
}

/// Value of a single attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttrValue {
    /// A string value.
    Str(String),
    /// A boolean value, rendered as `"true"`/`"false"`.
    Bool(bool),
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(String::from(value))
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Attributes for one target, in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeSet {
    attrs: SmallVec<[(&'static str, AttrValue); 6]>,
}

impl AttributeSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing any earlier value in place.
    pub fn set(&mut self, name: &'static str, value: impl Into<AttrValue>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.attrs.push((name, value)),
        }
    }

    fn with(mut self, name: &'static str, value: impl Into<AttrValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Value of `name`, if set.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &AttrValue)> {
        self.attrs.iter().map(|(n, v)| (*n, v))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

/// Attribute sets for the reference and floating elements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ElementProps {
    /// Attributes for the reference element.
    pub reference: AttributeSet,
    /// Attributes for the floating element.
    pub floating: AttributeSet,
}

/// State of a list item inside the floating element.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemState {
    /// The item is the active (highlighted) one.
    pub active: bool,
    /// The item is selected.
    pub selected: bool,
}

/// Options for [`UseRole`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleOptions {
    /// When `false`, every derived attribute set is empty. Defaults to `true`.
    pub enabled: bool,
    /// Role of the floating element. Defaults to `dialog`.
    pub role: Role,
}

impl Default for RoleOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            role: Role::default(),
        }
    }
}

/// Role-based ARIA attribute derivation for one floating element.
#[derive(Clone, Debug)]
pub struct UseRole {
    options: RoleOptions,
    reference_id: String,
    parent_id: Option<String>,
}

impl UseRole {
    /// Create a deriver; generates the reference id used by menus.
    ///
    /// Known role names given as [`AriaRole::Other`] are resolved first.
    pub fn new(mut options: RoleOptions) -> Self {
        options.role = options.role.resolved();
        Self {
            options,
            reference_id: use_id(),
            parent_id: None,
        }
    }

    /// Mark this element as nested inside another floating tree node.
    pub fn with_parent_id(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Current options.
    pub fn options(&self) -> &RoleOptions {
        &self.options
    }

    /// Replace the options. The reference id is kept.
    pub fn set_options(&mut self, mut options: RoleOptions) {
        options.role = options.role.resolved();
        self.options = options;
    }

    /// Id given to a menu's reference element.
    pub fn reference_id(&self) -> &str {
        &self.reference_id
    }

    /// Whether a parent node id is present.
    pub fn is_nested(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Attributes for both elements.
    pub fn props<P: Platform>(&self, context: &FloatingContext<P>) -> ElementProps {
        ElementProps {
            reference: self.reference(context),
            floating: self.floating(context),
        }
    }

    /// Attributes for the reference element.
    pub fn reference<P: Platform>(&self, context: &FloatingContext<P>) -> AttributeSet {
        self.reference_attrs(context.open(), context.floating_id())
    }

    /// Attributes for the floating element.
    pub fn floating<P: Platform>(&self, context: &FloatingContext<P>) -> AttributeSet {
        self.floating_attrs(context.floating_id())
    }

    /// Attributes for a list item inside the floating element.
    pub fn item<P: Platform>(&self, context: &FloatingContext<P>, item: ItemState) -> AttributeSet {
        self.item_attrs(context.floating_id(), item)
    }

    fn labels_only(&self, aria_role: Option<&AriaRole>) -> bool {
        aria_role == Some(&AriaRole::Tooltip) || self.options.role.is(ComponentRole::Label)
    }

    fn reference_attrs(&self, open: bool, floating_id: &str) -> AttributeSet {
        let mut attrs = AttributeSet::new();
        if !self.options.enabled {
            return attrs;
        }
        let role = &self.options.role;
        let aria_role = role.aria_role();

        if self.labels_only(aria_role.as_ref()) {
            if open {
                let name = if role.is(ComponentRole::Label) {
                    "aria-labelledby"
                } else {
                    "aria-describedby"
                };
                attrs.set(name, floating_id);
            }
            return attrs;
        }

        attrs.set("aria-expanded", if open { "true" } else { "false" });
        if let Some(aria_role) = &aria_role {
            let haspopup = match aria_role {
                AriaRole::AlertDialog => "dialog",
                other => other.as_str(),
            };
            attrs.set("aria-haspopup", haspopup);
        }
        if open {
            attrs.set("aria-controls", floating_id);
        }
        match aria_role {
            Some(AriaRole::Listbox) => attrs.set("role", "combobox"),
            Some(AriaRole::Menu) => {
                attrs.set("id", self.reference_id.as_str());
                if self.is_nested() {
                    attrs.set("role", "menuitem");
                }
            }
            _ => {}
        }
        if role.is(ComponentRole::Select) {
            attrs.set("aria-autocomplete", "none");
        }
        if role.is(ComponentRole::Combobox) {
            attrs.set("aria-autocomplete", "list");
        }
        attrs
    }

    fn floating_attrs(&self, floating_id: &str) -> AttributeSet {
        if !self.options.enabled {
            return AttributeSet::new();
        }
        let aria_role = self.options.role.aria_role();
        let mut attrs = AttributeSet::new().with("id", floating_id);
        if let Some(aria_role) = &aria_role {
            attrs.set("role", aria_role.as_str());
        }
        if aria_role == Some(AriaRole::Menu) {
            attrs.set("aria-labelledby", self.reference_id.as_str());
        }
        attrs
    }

    fn item_attrs(&self, floating_id: &str, item: ItemState) -> AttributeSet {
        if !self.options.enabled {
            return AttributeSet::new();
        }
        // Keyed by the unmapped role: `menu` items could be radio or checkbox
        // items, so no role is assumed for them.
        let Role::Component(component @ (ComponentRole::Select | ComponentRole::Combobox)) =
            self.options.role
        else {
            return AttributeSet::new();
        };

        let mut attrs = AttributeSet::new().with("role", "option");
        if item.active {
            attrs.set("id", format!("{floating_id}-option"));
        }
        match component {
            ComponentRole::Select => attrs.set("aria-selected", item.active && item.selected),
            _ if item.active => attrs.set("aria-selected", true),
            _ => {}
        }
        attrs
    }
}
