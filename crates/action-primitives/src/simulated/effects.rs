//! Click behaviours for building simulated pages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sword_core_types::ElementHandle;

use super::dom::{ClickEffect, SimDom};

pub fn effect<F>(f: F) -> ClickEffect
where
    F: Fn(&mut SimDom, &ElementHandle) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn noop() -> ClickEffect {
    effect(|_, _| {})
}

pub fn remove_self() -> ClickEffect {
    effect(|dom, me| {
        dom.remove(me);
    })
}

pub fn remove_closest(selector: &str) -> ClickEffect {
    let selector = selector.to_string();
    effect(move |dom, me| {
        if let Some(target) = dom.closest(me, &selector) {
            dom.remove(&target);
        }
    })
}

pub fn remove(selector: &str) -> ClickEffect {
    let selector = selector.to_string();
    effect(move |dom, _| {
        dom.remove_matching(&selector);
    })
}

pub fn show(selector: &str) -> ClickEffect {
    let selector = selector.to_string();
    effect(move |dom, _| dom.show(&selector))
}

pub fn hide(selector: &str) -> ClickEffect {
    let selector = selector.to_string();
    effect(move |dom, _| dom.hide(&selector))
}

pub fn toggle_class(class: &str) -> ClickEffect {
    let class = class.to_string();
    effect(move |dom, me| dom.toggle_class(me, &class))
}

pub fn add_class(class: &str) -> ClickEffect {
    let class = class.to_string();
    effect(move |dom, me| dom.add_class(me, &class))
}

pub fn navigate(url: &str) -> ClickEffect {
    let url = url.to_string();
    effect(move |dom, _| dom.navigate(&url))
}

/// Run every effect in order.
pub fn chain(effects: Vec<ClickEffect>) -> ClickEffect {
    effect(move |dom, me| {
        for step in &effects {
            step(dom, me);
        }
    })
}

/// Run `inner` on the first click only.
pub fn once(inner: ClickEffect) -> ClickEffect {
    let fired = AtomicBool::new(false);
    effect(move |dom, me| {
        if !fired.swap(true, Ordering::SeqCst) {
            inner(dom, me);
        }
    })
}
