// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A tooltip and a select listbox positioned over a tiny in-memory page.
//!
//! This example shows how to:
//! - implement [`Platform`] with a simple rectangle-based positioning engine,
//! - drive spawned updates from a local task queue,
//! - reposition through a mount tracker when the page scrolls,
//! - derive ARIA attributes with `UseRole`.
//!
//! Run:
//! - `cargo run -p understory_demos --example tooltip`

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::{Future, ready};
use std::rc::Rc;

use hashbrown::HashMap;
use kurbo::{Rect, Vec2};
use understory_floating::events::OpenChangeReason;
use understory_floating::role::{ComponentRole, ItemState, RoleOptions, UseRole};
use understory_floating::{
    Alignment, Cleanup, ComputePositionConfig, ComputePositionReturn, Floating, FloatingOptions,
    LocalTask, MiddlewareData, MountTracker, Placement, Platform, Side, Updater,
};

/// Element handles are indices into the page's rectangle table.
type ElementId = u32;

#[derive(Clone, Copy, Debug)]
enum Middleware {
    /// Gap between reference and floating along the main axis.
    Offset(f64),
    /// Move to the opposite side when the preferred one overflows the viewport.
    Flip,
}

#[derive(Debug)]
enum PageError {
    Missing(ElementId),
}

#[derive(Default)]
struct Page {
    viewport: Rect,
    elements: RefCell<HashMap<ElementId, Rect>>,
    scroll: RefCell<Vec2>,
    tasks: RefCell<VecDeque<LocalTask>>,
}

#[derive(Clone)]
struct PagePlatform(Rc<Page>);

impl PagePlatform {
    fn rect(&self, id: ElementId) -> Result<Rect, PageError> {
        let rect = *self.0.elements.borrow().get(&id).ok_or(PageError::Missing(id))?;
        Ok(rect - *self.0.scroll.borrow())
    }

    fn run_tasks(&self) {
        loop {
            let Some(task) = self.0.tasks.borrow_mut().pop_front() else {
                break;
            };
            pollster::block_on(task);
        }
    }
}

fn place(reference: Rect, floating: Rect, placement: Placement, gap: f64) -> (f64, f64) {
    let (w, h) = (floating.width(), floating.height());
    let (mut x, mut y) = match placement.side() {
        Side::Top => (reference.center().x - w / 2.0, reference.y0 - h - gap),
        Side::Bottom => (reference.center().x - w / 2.0, reference.y1 + gap),
        Side::Left => (reference.x0 - w - gap, reference.center().y - h / 2.0),
        Side::Right => (reference.x1 + gap, reference.center().y - h / 2.0),
    };
    let vertical = matches!(placement.side(), Side::Top | Side::Bottom);
    match (placement.alignment(), vertical) {
        (Some(Alignment::Start), true) => x = reference.x0,
        (Some(Alignment::End), true) => x = reference.x1 - w,
        (Some(Alignment::Start), false) => y = reference.y0,
        (Some(Alignment::End), false) => y = reference.y1 - h,
        (None, _) => {}
    }
    (x, y)
}

fn opposite(placement: Placement) -> Placement {
    let flipped = match placement.side() {
        Side::Top => "bottom",
        Side::Bottom => "top",
        Side::Left => "right",
        Side::Right => "left",
    };
    let name = match placement.alignment() {
        Some(Alignment::Start) => format!("{flipped}-start"),
        Some(Alignment::End) => format!("{flipped}-end"),
        None => flipped.to_string(),
    };
    name.parse().unwrap_or(placement)
}

impl Platform for PagePlatform {
    type Reference = ElementId;
    type Floating = ElementId;
    type Middleware = Middleware;
    type MiddlewarePayload = f64;
    type Event = &'static str;
    type Error = PageError;

    fn compute_position(
        &self,
        reference: &ElementId,
        floating: &ElementId,
        config: ComputePositionConfig<'_, Middleware>,
    ) -> impl Future<Output = Result<ComputePositionReturn<f64>, PageError>> {
        ready(self.rect(*reference).and_then(|reference| {
            let floating = self.rect(*floating)?;
            let mut gap = 0.0;
            let mut flip = false;
            let mut middleware_data = MiddlewareData::new();
            for step in config.middleware {
                match *step {
                    Middleware::Offset(offset) => {
                        gap += offset;
                        middleware_data.insert("offset", offset);
                    }
                    Middleware::Flip => flip = true,
                }
            }

            let mut placement = config.placement;
            let (mut x, mut y) = place(reference, floating, placement, gap);
            let fits = |x: f64, y: f64| {
                let rect = Rect::from_origin_size((x, y), floating.size());
                self.0.viewport.intersect(rect) == rect
            };
            if flip && !fits(x, y) {
                let other = opposite(placement);
                let (fx, fy) = place(reference, floating, other, gap);
                if fits(fx, fy) {
                    middleware_data.insert("flip", 1.0);
                    (placement, x, y) = (other, fx, fy);
                }
            }

            Ok(ComputePositionReturn {
                x,
                y,
                placement,
                strategy: config.strategy,
                middleware_data,
            })
        }))
    }

    fn device_pixel_ratio(&self, _floating: &ElementId) -> f64 {
        2.0
    }

    fn spawn_local(&self, task: LocalTask) {
        self.0.tasks.borrow_mut().push_back(task);
    }
}

fn main() {
    let page = Rc::new(Page {
        viewport: Rect::new(0.0, 0.0, 400.0, 300.0),
        ..Page::default()
    });
    page.elements.borrow_mut().extend([
        (1, Rect::new(40.0, 40.0, 120.0, 64.0)),
        (2, Rect::new(0.0, 0.0, 90.0, 24.5)),
        (3, Rect::new(200.0, 240.0, 320.0, 268.0)),
        (4, Rect::new(0.0, 0.0, 120.0, 120.0)),
    ]);
    let platform = PagePlatform(page.clone());

    // Tooltip: a single spawned update per mount.
    let tooltip = Floating::new(
        platform.clone(),
        FloatingOptions {
            placement: Placement::Top,
            middleware: vec![Some(Middleware::Offset(6.0)), Some(Middleware::Flip)],
            reference: Some(1),
            floating: Some(2),
            ..FloatingOptions::default()
        },
    );
    platform.run_tasks();
    println!(
        "tooltip: placement={} at ({}, {})",
        tooltip.placement(),
        tooltip.x(),
        tooltip.y()
    );
    println!("tooltip styles: {}", tooltip.floating_styles());

    // Select: the mount tracker keeps the updater so it can react to scrolling.
    let listener: Rc<RefCell<Option<Updater<PagePlatform>>>> = Rc::default();
    let tracker: MountTracker<PagePlatform> = {
        let listener = listener.clone();
        Rc::new(move |_: &ElementId, _: &ElementId, updater: Updater<PagePlatform>| {
            match pollster::block_on(updater.update()) {
                Ok(outcome) => println!("mounted: {outcome:?}"),
                Err(PageError::Missing(id)) => println!("mounted: element {id} is gone"),
            }
            *listener.borrow_mut() = Some(updater);
            let listener = listener.clone();
            Some(Box::new(move || {
                listener.borrow_mut().take();
            }) as Cleanup)
        })
    };
    let select = Floating::new(
        platform.clone(),
        FloatingOptions {
            open: false,
            placement: Placement::BottomStart,
            middleware: vec![Some(Middleware::Offset(4.0)), None, Some(Middleware::Flip)],
            reference: Some(3),
            while_elements_mounted: Some(tracker),
            ..FloatingOptions::default()
        },
    );
    let context = select.context();
    context.events().on_open_change::<&'static str>(|change| {
        println!(
            "openchange: open={} event={:?} reason={:?}",
            change.open,
            change.event,
            change.reason.map(OpenChangeReason::as_str)
        );
    });

    let role = UseRole::new(RoleOptions {
        role: ComponentRole::Select.into(),
        ..RoleOptions::default()
    });
    let print_attrs = |label: &str| {
        let props = role.props(&context);
        let render = |attrs: &understory_floating::role::AttributeSet| {
            attrs
                .iter()
                .map(|(name, value)| format!("{name}=\"{value}\""))
                .collect::<Vec<_>>()
                .join(" ")
        };
        println!("{label} reference: {}", render(&props.reference));
        println!("{label} floating:  {}", render(&props.floating));
    };
    print_attrs("closed");

    context.on_open_change(true, Some("click"), Some(OpenChangeReason::Click));
    select.set_open(true);
    select.set_floating(Some(4));
    let flushed = select.flush();
    println!("flush after open: {flushed:?}");
    println!(
        "select: placement={} at ({}, {}) positioned={}",
        select.placement(),
        select.x(),
        select.y(),
        select.is_positioned()
    );
    print_attrs("open");

    let item = role.item(
        &context,
        ItemState {
            active: true,
            selected: true,
        },
    );
    println!("active item: {item:?}");

    // Scroll the page and let the tracked updater reposition.
    *page.scroll.borrow_mut() = Vec2::new(0.0, 180.0);
    let updater = listener.borrow().clone();
    if let Some(updater) = updater {
        match pollster::block_on(updater.update()) {
            Ok(outcome) => println!("after scroll: {outcome:?} -> ({}, {})", select.x(), select.y()),
            Err(PageError::Missing(id)) => println!("after scroll: element {id} is gone"),
        }
    }

    context.on_open_change(false, None, Some(OpenChangeReason::EscapeKey));
    select.set_open(false);
    select.set_floating(None);
    println!("flush after close: {:?}", select.flush());
    println!(
        "select closed: positioned={} tracker live={}",
        select.is_positioned(),
        listener.borrow().is_some()
    );
}
