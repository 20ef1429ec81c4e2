//! Core data types for page interactions

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Bounding box in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }
}

/// Point-in-time description of one element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Upper-case tag name.
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Trimmed text content, descendants included.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub rect: Rect,
    #[serde(default)]
    pub disabled: bool,
    /// Inline `display:none` or `visibility:hidden`.
    #[serde(default)]
    pub hidden: bool,
}

impl ElementSnapshot {
    pub fn is_interactable(&self) -> bool {
        !self.disabled && !self.hidden && !self.rect.is_empty()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// `data-*` attribute by its suffix, ignoring empty values.
    pub fn data(&self, name: &str) -> Option<&str> {
        self.attr(&format!("data-{name}")).filter(|value| !value.is_empty())
    }

    pub fn class_name(&self) -> String {
        self.classes.join(" ")
    }

    /// Cheap structural signature used to recognize a repeated dialog.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}_{}_{}x{}",
            self.tag,
            self.class_name(),
            self.rect.width,
            self.rect.height
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "complete" => ReadyState::Complete,
            "interactive" => ReadyState::Interactive,
            _ => ReadyState::Loading,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    /// Blocking, attention-grabbing cue that needs the user.
    Alert,
    Success,
    Failure,
    Diagnostics,
}

/// Visual cue rendered on top of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub id: String,
    pub kind: OverlayKind,
    pub title: String,
    #[serde(default)]
    pub lines: Vec<String>,
}

impl Overlay {
    pub fn new(id: impl Into<String>, kind: OverlayKind, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            lines: Vec::new(),
        }
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interactable_requires_box_and_enabled() {
        let mut snapshot = ElementSnapshot {
            tag: "BUTTON".into(),
            rect: Rect::new(0.0, 0.0, 80.0, 30.0),
            ..ElementSnapshot::default()
        };
        assert!(snapshot.is_interactable());

        snapshot.disabled = true;
        assert!(!snapshot.is_interactable());

        snapshot.disabled = false;
        snapshot.rect.width = 0.0;
        assert!(!snapshot.is_interactable());
    }

    #[test]
    fn fingerprint_uses_tag_class_and_size() {
        let snapshot = ElementSnapshot {
            tag: "DIV".into(),
            classes: vec!["popup".into(), "notice".into()],
            rect: Rect::new(10.0, 10.0, 400.0, 300.5),
            ..ElementSnapshot::default()
        };
        assert_eq!(snapshot.fingerprint(), "DIV_popup notice_400x300.5");
    }

    #[test]
    fn data_attributes_skip_empty_values() {
        let mut snapshot = ElementSnapshot::default();
        snapshot.attributes.insert("data-row".into(), "B".into());
        snapshot.attributes.insert("data-col".into(), String::new());
        assert_eq!(snapshot.data("row"), Some("B"));
        assert_eq!(snapshot.data("col"), None);
    }
}
