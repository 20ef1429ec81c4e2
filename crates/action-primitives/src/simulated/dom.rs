use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use sword_core_types::ElementHandle;

use super::selector::SelectorList;
use crate::errors::ActionError;
use crate::types::{ElementSnapshot, Overlay, ReadyState, Rect};

/// Behaviour attached to an element, run when the element is clicked.
pub type ClickEffect = Arc<dyn Fn(&mut SimDom, &ElementHandle) + Send + Sync>;

/// Behaviour run when the page reloads.
pub type ReloadEffect = Arc<dyn Fn(&mut SimDom) + Send + Sync>;

const HANDLE_PREFIX: &str = "sim-";

/// Element description used both as a builder and as the stored node.
#[derive(Clone, Default)]
pub struct SimElement {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    /// Own text, children excluded.
    pub text: String,
    pub rect: Rect,
    pub disabled: bool,
    pub hidden: bool,
    pub on_click: Option<ClickEffect>,
    children: Vec<SimElement>,
}

impl fmt::Debug for SimElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimElement")
            .field("tag", &self.tag)
            .field("id", &self.id)
            .field("classes", &self.classes)
            .field("text", &self.text)
            .field("hidden", &self.hidden)
            .finish()
    }
}

impl SimElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_uppercase(),
            rect: Rect::new(0.0, 0.0, 100.0, 30.0),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.classes
            .extend(class.split_whitespace().map(str::to_string));
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = Rect::new(x, y, width, height);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.on_click = Some(effect);
        self
    }

    pub fn child(mut self, child: SimElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = SimElement>) -> Self {
        self.children.extend(children);
        self
    }
}

struct Node {
    element: SimElement,
    parent: Option<usize>,
    children: Vec<usize>,
    attached: bool,
}

/// In-memory document behind [`super::SimulatedPage`].
pub struct SimDom {
    nodes: Vec<Node>,
    roots: Vec<usize>,
    pub url: String,
    pub ready_state: ReadyState,
    pub viewport_width: f64,
    pub scroll_fraction: f64,
    pub(super) on_reload: Option<ReloadEffect>,
    pub(super) query_faults: Vec<(String, ActionError)>,
    overlays: BTreeMap<String, Overlay>,
    clicks: Vec<ElementHandle>,
    reloads: u32,
    focused: Option<ElementHandle>,
    highlighted: Vec<ElementHandle>,
}

impl SimDom {
    pub fn new(url: &str) -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            url: url.to_string(),
            ready_state: ReadyState::Complete,
            viewport_width: 1280.0,
            scroll_fraction: 0.0,
            on_reload: None,
            query_faults: Vec::new(),
            overlays: BTreeMap::new(),
            clicks: Vec::new(),
            reloads: 0,
            focused: None,
            highlighted: Vec::new(),
        }
    }

    pub fn handle_of(index: usize) -> ElementHandle {
        ElementHandle::new(format!("{HANDLE_PREFIX}{index}"))
    }

    pub fn index_of(handle: &ElementHandle) -> Option<usize> {
        handle.as_str().strip_prefix(HANDLE_PREFIX)?.parse().ok()
    }

    /// Append a tree at the document root.
    pub fn append(&mut self, element: SimElement) -> ElementHandle {
        let index = self.insert_tree(element, None);
        self.roots.push(index);
        Self::handle_of(index)
    }

    /// Append a tree under `parent`. `None` if the parent is gone.
    pub fn append_to(&mut self, parent: &ElementHandle, element: SimElement) -> Option<ElementHandle> {
        let parent_index = self.live_index(parent)?;
        let index = self.insert_tree(element, Some(parent_index));
        self.nodes[parent_index].children.push(index);
        Some(Self::handle_of(index))
    }

    fn insert_tree(&mut self, mut element: SimElement, parent: Option<usize>) -> usize {
        let children = std::mem::take(&mut element.children);
        let index = self.nodes.len();
        self.nodes.push(Node {
            element,
            parent,
            children: Vec::new(),
            attached: true,
        });
        for child in children {
            let child_index = self.insert_tree(child, Some(index));
            self.nodes[index].children.push(child_index);
        }
        index
    }

    fn live_index(&self, handle: &ElementHandle) -> Option<usize> {
        let index = Self::index_of(handle)?;
        self.nodes.get(index).filter(|node| node.attached).map(|_| index)
    }

    pub(super) fn node(&self, index: usize) -> Option<&SimElement> {
        self.nodes
            .get(index)
            .filter(|node| node.attached)
            .map(|node| &node.element)
    }

    pub(super) fn parent_of(&self, index: usize) -> Option<usize> {
        self.nodes.get(index).and_then(|node| node.parent)
    }

    pub fn element(&self, handle: &ElementHandle) -> Option<&SimElement> {
        self.live_index(handle).map(|index| &self.nodes[index].element)
    }

    pub fn element_mut(&mut self, handle: &ElementHandle) -> Option<&mut SimElement> {
        let index = self.live_index(handle)?;
        Some(&mut self.nodes[index].element)
    }

    pub fn is_attached(&self, handle: &ElementHandle) -> bool {
        self.live_index(handle).is_some()
    }

    /// Attached nodes in document order.
    pub(super) fn document_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.attached {
                continue;
            }
            order.push(index);
            stack.extend(node.children.iter().rev().copied());
        }
        order
    }

    /// Own text followed by every descendant's, like `textContent`.
    pub fn text_content(&self, index: usize) -> String {
        let mut out = String::new();
        self.collect_text(index, &mut out);
        out
    }

    fn collect_text(&self, index: usize, out: &mut String) {
        let node = &self.nodes[index];
        if !node.attached {
            return;
        }
        out.push_str(&node.element.text);
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }

    fn is_descendant_of(&self, index: usize, ancestor: usize) -> bool {
        let mut current = self.parent_of(index);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent_of(parent);
        }
        false
    }

    fn ancestor_hidden(&self, index: usize) -> bool {
        let mut current = self.parent_of(index);
        while let Some(parent) = current {
            if self.nodes[parent].element.hidden {
                return true;
            }
            current = self.parent_of(parent);
        }
        false
    }

    pub fn query(&self, selector: &str, scope: Option<&ElementHandle>) -> Result<Vec<ElementHandle>, String> {
        let list = SelectorList::parse(selector)?;
        let scope_index = match scope {
            Some(handle) => match self.live_index(handle) {
                Some(index) => Some(index),
                None => return Ok(Vec::new()),
            },
            None => None,
        };
        Ok(self
            .document_order()
            .into_iter()
            .filter(|index| scope_index.map_or(true, |scope| self.is_descendant_of(*index, scope)))
            .filter(|index| list.matches(self, *index))
            .map(Self::handle_of)
            .collect())
    }

    /// Matches for `selector`; an unparsable selector matches nothing.
    pub fn select(&self, selector: &str) -> Vec<ElementHandle> {
        self.query(selector, None).unwrap_or_default()
    }

    pub fn first(&self, selector: &str) -> Option<ElementHandle> {
        self.select(selector).into_iter().next()
    }

    pub fn snapshot(&self, handle: &ElementHandle) -> Option<ElementSnapshot> {
        let index = self.live_index(handle)?;
        let element = &self.nodes[index].element;
        let rect = if self.ancestor_hidden(index) {
            Rect::default()
        } else {
            element.rect
        };
        let mut attributes = element.attributes.clone();
        if let Some(id) = &element.id {
            attributes.insert("id".to_string(), id.clone());
        }
        if !element.classes.is_empty() {
            attributes.insert("class".to_string(), element.classes.join(" "));
        }
        Some(ElementSnapshot {
            tag: element.tag.clone(),
            id: element.id.clone(),
            classes: element.classes.clone(),
            attributes,
            text: self.text_content(index).trim().to_string(),
            rect,
            disabled: element.disabled,
            hidden: element.hidden,
        })
    }

    /// Innermost attached elements whose text contains `text`.
    pub fn find_text(&self, text: &str) -> Vec<ElementHandle> {
        self.document_order()
            .into_iter()
            .filter(|index| self.text_content(*index).contains(text))
            .filter(|index| {
                !self.nodes[*index]
                    .children
                    .iter()
                    .any(|child| self.nodes[*child].attached && self.text_content(*child).contains(text))
            })
            .map(Self::handle_of)
            .collect()
    }

    /// Detach the element and its subtree.
    pub fn remove(&mut self, handle: &ElementHandle) -> bool {
        let Some(index) = self.live_index(handle) else {
            return false;
        };
        let mut stack = vec![index];
        while let Some(current) = stack.pop() {
            self.nodes[current].attached = false;
            stack.extend(self.nodes[current].children.iter().copied());
        }
        true
    }

    pub fn remove_matching(&mut self, selector: &str) -> usize {
        let handles = self.select(selector);
        handles.iter().filter(|handle| self.remove(handle)).count()
    }

    /// Nearest ancestor-or-self matching `selector`.
    pub fn closest(&self, handle: &ElementHandle, selector: &str) -> Option<ElementHandle> {
        let list = SelectorList::parse(selector).ok()?;
        let mut current = self.live_index(handle);
        while let Some(index) = current {
            if list.matches(self, index) {
                return Some(Self::handle_of(index));
            }
            current = self.parent_of(index);
        }
        None
    }

    pub fn set_hidden(&mut self, handle: &ElementHandle, hidden: bool) {
        if let Some(element) = self.element_mut(handle) {
            element.hidden = hidden;
        }
    }

    pub fn show(&mut self, selector: &str) {
        for handle in self.select(selector) {
            self.set_hidden(&handle, false);
        }
    }

    pub fn hide(&mut self, selector: &str) {
        for handle in self.select(selector) {
            self.set_hidden(&handle, true);
        }
    }

    pub fn add_class(&mut self, handle: &ElementHandle, class: &str) {
        if let Some(element) = self.element_mut(handle) {
            if !element.classes.iter().any(|c| c == class) {
                element.classes.push(class.to_string());
            }
        }
    }

    pub fn remove_class(&mut self, handle: &ElementHandle, class: &str) {
        if let Some(element) = self.element_mut(handle) {
            element.classes.retain(|c| c != class);
        }
    }

    pub fn toggle_class(&mut self, handle: &ElementHandle, class: &str) {
        let present = self
            .element(handle)
            .map(|element| element.classes.iter().any(|c| c == class))
            .unwrap_or(false);
        if present {
            self.remove_class(handle, class);
        } else {
            self.add_class(handle, class);
        }
    }

    pub fn has_class(&self, handle: &ElementHandle, class: &str) -> bool {
        self.element(handle)
            .map(|element| element.classes.iter().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn set_attr(&mut self, handle: &ElementHandle, name: &str, value: &str) {
        if let Some(element) = self.element_mut(handle) {
            element.attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn set_disabled(&mut self, handle: &ElementHandle, disabled: bool) {
        if let Some(element) = self.element_mut(handle) {
            element.disabled = disabled;
        }
    }

    pub fn navigate(&mut self, url: &str) {
        self.url = url.to_string();
    }

    pub(super) fn record_click(&mut self, handle: &ElementHandle) {
        self.clicks.push(handle.clone());
    }

    pub(super) fn record_reload(&mut self) {
        self.reloads += 1;
    }

    pub(super) fn set_focus(&mut self, handle: &ElementHandle) {
        self.focused = Some(handle.clone());
    }

    pub(super) fn add_highlight(&mut self, handle: &ElementHandle) {
        self.highlighted.push(handle.clone());
    }

    pub(super) fn put_overlay(&mut self, overlay: Overlay) {
        self.overlays.insert(overlay.id.clone(), overlay);
    }

    pub(super) fn drop_overlay(&mut self, id: &str) {
        self.overlays.remove(id);
    }

    pub fn clicks(&self) -> &[ElementHandle] {
        &self.clicks
    }

    pub fn click_count(&self, handle: &ElementHandle) -> usize {
        self.clicks.iter().filter(|clicked| *clicked == handle).count()
    }

    pub fn reloads(&self) -> u32 {
        self.reloads
    }

    pub fn focused(&self) -> Option<&ElementHandle> {
        self.focused.as_ref()
    }

    pub fn highlighted(&self) -> &[ElementHandle] {
        &self.highlighted
    }

    pub fn overlay(&self, id: &str) -> Option<&Overlay> {
        self.overlays.get(id)
    }

    pub fn overlays(&self) -> impl Iterator<Item = &Overlay> {
        self.overlays.values()
    }
}
