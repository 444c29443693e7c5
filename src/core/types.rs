//! Shared types used across webpilot modules
//!
//! Contains the per-cycle element model and the action result record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::core::action::ActionKind;

/// Elements below this confidence are never shown to the oracle
pub const MIN_CONFIDENCE: f64 = 0.3;

/// Attributes captured for every candidate
pub const ATTRIBUTE_ALLOW_LIST: [&str; 5] = ["id", "class", "name", "type", "role"];

/// A message sent to the oracle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: String,
    /// Content of the message
    pub content: String,
    /// Base64-encoded images attached to the message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            images: Vec::new(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            images: Vec::new(),
        }
    }

    /// Attach a base64-encoded image
    pub fn with_image(mut self, image_b64: impl Into<String>) -> Self {
        self.images.push(image_b64.into());
        self
    }
}

/// Viewport rectangle, already shifted by the containing frame's offset
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Entirely inside a viewport of the given size
    pub fn within(&self, viewport_width: f64, viewport_height: f64) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.right() <= viewport_width
            && self.bottom() <= viewport_height
    }

    /// Inside the viewport grown by `margin` on every side
    pub fn within_margin(&self, viewport_width: f64, viewport_height: f64, margin: f64) -> bool {
        self.x >= -margin
            && self.y >= -margin
            && self.right() <= viewport_width + margin
            && self.bottom() <= viewport_height + margin
    }
}

/// A candidate the agent may act on.
///
/// `id` is only meaningful within the extraction cycle that produced it; the
/// next extraction builds a brand new set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveElement {
    /// Sequential 1-based id, rewritten by the annotator
    pub id: usize,
    /// Value of the marker attribute written into the DOM during extraction
    pub marker: usize,
    /// Lowercase tag name
    pub tag: String,
    /// The element's `type` property (e.g. "text", "submit"), or "unknown"
    pub element_kind: String,
    /// Best-effort human-readable label
    pub label: String,
    /// First 100 characters of the text content
    pub text: String,
    pub is_visible: bool,
    pub is_clickable: bool,
    pub is_form_field: bool,
    pub bounding_box: BoundingBox,
    /// Allow-listed attributes (id, class, name, type, role)
    pub attributes: BTreeMap<String, String>,
    pub placeholder: Option<String>,
    pub value: Option<String>,
    /// Whether the element lives in an embedded same-origin frame
    pub in_frame: bool,
    pub confidence_score: f64,
}

impl InteractiveElement {
    /// Eligible to be shown to the oracle
    pub fn is_grounded(&self) -> bool {
        self.is_visible && self.confidence_score >= MIN_CONFIDENCE
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Short label for messages
    pub fn short_label(&self, max_chars: usize) -> String {
        truncate_chars(&self.label, max_chars)
    }
}

/// The outcome of executing one decision. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    pub action_kind: ActionKind,
    pub message: String,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
    pub timestamp: DateTime<Utc>,
}

impl ActionResult {
    /// Create a successful result
    pub fn success(
        action_kind: ActionKind,
        message: impl Into<String>,
        started: DateTime<Utc>,
    ) -> Self {
        Self {
            success: true,
            action_kind,
            message: message.into(),
            duration_seconds: elapsed_since(started),
            element_id: None,
            error_detail: None,
            screenshot_path: None,
            timestamp: started,
        }
    }

    /// Create a failed result; the detail doubles as the message body
    pub fn failure(
        action_kind: ActionKind,
        detail: impl Into<String>,
        started: DateTime<Utc>,
    ) -> Self {
        let detail = detail.into();
        Self {
            success: false,
            action_kind,
            message: format!("{} failed: {}", action_kind, detail),
            duration_seconds: elapsed_since(started),
            element_id: None,
            error_detail: Some(detail),
            screenshot_path: None,
            timestamp: started,
        }
    }

    pub fn with_element(mut self, element_id: usize) -> Self {
        self.element_id = Some(element_id);
        self
    }
}

fn elapsed_since(started: DateTime<Utc>) -> f64 {
    (Utc::now() - started)
        .to_std()
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Truncate to at most `max_chars` characters without splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Collapse runs of whitespace to single spaces and trim the ends
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_viewport_checks() {
        let inside = BoundingBox::new(10.0, 10.0, 100.0, 40.0);
        assert!(inside.within(1920.0, 1080.0));

        let bleeding = BoundingBox::new(-50.0, 10.0, 100.0, 40.0);
        assert!(!bleeding.within(1920.0, 1080.0));
        assert!(bleeding.within_margin(1920.0, 1080.0, 100.0));

        let far = BoundingBox::new(10.0, 1300.0, 100.0, 40.0);
        assert!(!far.within_margin(1920.0, 1080.0, 100.0));
    }

    #[test]
    fn test_failure_message_carries_kind() {
        let result = ActionResult::failure(ActionKind::Click, "no such element", Utc::now());
        assert!(!result.success);
        assert_eq!(result.message, "CLICK failed: no such element");
        assert_eq!(result.error_detail.as_deref(), Some("no such element"));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Sign \n\t in  "), "Sign in");
    }

    #[test]
    fn test_truncate_chars_respects_code_points() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
