//! Element extraction
//!
//! Pulls raw candidate facts out of the page, then filters, labels, scores
//! and orders them. Ids are assigned after sorting and only mean something
//! within the cycle that produced them.

use serde::Deserialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::browser::driver::BrowserDriver;
use crate::browser::scripts;
use crate::core::{
    collapse_whitespace, truncate_chars, BoundingBox, Config, InteractiveElement, PilotError,
    Result, ATTRIBUTE_ALLOW_LIST,
};

/// Candidates may extend this far past the viewport edges
pub const VIEWPORT_MARGIN: f64 = 100.0;

const LABEL_MAX_CHARS: usize = 100;
const TEXT_MAX_CHARS: usize = 100;
const READY_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// What the extraction script returns
#[derive(Debug, Deserialize)]
pub struct RawExtraction {
    pub viewport: Viewport,
    #[serde(default)]
    pub candidates: Vec<Value>,
}

/// One candidate exactly as the page reported it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCandidate {
    pub marker: usize,
    pub tag: String,
    pub kind: String,
    pub text: String,
    pub aria_label: String,
    pub placeholder: String,
    pub title: String,
    pub alt: String,
    pub value: String,
    pub role: String,
    pub has_click_handler: bool,
    pub hidden: bool,
    pub in_frame: bool,
    pub rect: BoundingBox,
    pub attributes: BTreeMap<String, String>,
}

impl RawCandidate {
    /// Survives the geometry and style filters
    fn is_displayable(&self, viewport: Viewport) -> bool {
        !self.hidden
            && self.rect.width > 0.0
            && self.rect.height > 0.0
            && self
                .rect
                .within_margin(viewport.width, viewport.height, VIEWPORT_MARGIN)
    }

    /// First non-empty of text, aria-label, placeholder, title, alt, value, tag
    fn label(&self) -> String {
        [
            &self.text,
            &self.aria_label,
            &self.placeholder,
            &self.title,
            &self.alt,
            &self.value,
        ]
        .into_iter()
        .map(|s| collapse_whitespace(s))
        .find(|s| !s.is_empty())
        .map(|s| truncate_chars(&s, LABEL_MAX_CHARS))
        .unwrap_or_else(|| self.tag.clone())
    }

    fn confidence(&self, fully_visible: bool) -> f64 {
        let mut confidence: f64 = 0.5;
        if fully_visible {
            confidence += 0.2;
        }
        if self.has_click_handler {
            confidence += 0.1;
        }
        if self.tag == "button" || self.tag == "a" {
            confidence += 0.1;
        }
        if !self.role.trim().is_empty() {
            confidence += 0.1;
        }
        confidence.clamp(0.0, 1.0)
    }

    fn into_element(self, viewport: Viewport) -> InteractiveElement {
        let is_visible = self.rect.within(viewport.width, viewport.height);
        let confidence_score = self.confidence(is_visible);
        let label = self.label();
        let is_clickable = self.tag == "button"
            || self.tag == "a"
            || self.has_click_handler
            || self.role == "button";
        let is_form_field = matches!(self.tag.as_str(), "input" | "textarea" | "select");

        let attributes = self
            .attributes
            .into_iter()
            .filter(|(k, _)| ATTRIBUTE_ALLOW_LIST.contains(&k.as_str()))
            .collect();

        let non_empty = |s: String| Some(s).filter(|s| !s.trim().is_empty());

        InteractiveElement {
            id: 0,
            marker: self.marker,
            element_kind: if self.kind.is_empty() {
                "unknown".to_string()
            } else {
                self.kind
            },
            label,
            text: truncate_chars(self.text.trim(), TEXT_MAX_CHARS),
            is_visible,
            is_clickable,
            is_form_field,
            bounding_box: self.rect,
            attributes,
            placeholder: non_empty(self.placeholder),
            value: non_empty(self.value),
            in_frame: self.in_frame,
            confidence_score,
            tag: self.tag,
        }
    }
}

/// Builds the per-cycle element list from the live page
#[derive(Debug, Clone)]
pub struct ElementExtractor {
    max_elements: usize,
    ready_timeout: Duration,
}

impl ElementExtractor {
    pub fn new(max_elements: usize, ready_timeout: Duration) -> Self {
        Self {
            max_elements,
            ready_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.agent.max_elements,
            Duration::from_secs(config.browser.ready_timeout_secs),
        )
    }

    /// Extract candidates from the page. Never fails: any total failure is
    /// logged and yields an empty list.
    pub async fn extract<B: BrowserDriver>(&self, driver: &B) -> Vec<InteractiveElement> {
        match self.try_extract(driver).await {
            Ok(elements) => {
                let in_frames = elements.iter().filter(|e| e.in_frame).count();
                if in_frames > 0 {
                    debug!(count = in_frames, "elements found inside iframes");
                }
                info!(count = elements.len(), "extracted interactive elements");
                elements
            }
            Err(e) => {
                error!("Element extraction failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_extract<B: BrowserDriver>(&self, driver: &B) -> Result<Vec<InteractiveElement>> {
        self.wait_for_document(driver).await?;
        let raw = driver
            .execute_script(scripts::EXTRACT_ELEMENTS, Vec::new())
            .await?;
        let raw: RawExtraction = serde_json::from_value(raw)
            .map_err(|e| PilotError::extraction(format!("Unexpected extraction result: {}", e)))?;
        Ok(self.build(raw))
    }

    /// Poll until the document has at least been parsed
    async fn wait_for_document<B: BrowserDriver>(&self, driver: &B) -> Result<()> {
        let poll = async {
            loop {
                if let Ok(state) = driver.ready_state().await {
                    if state == "interactive" || state == "complete" {
                        return;
                    }
                }
                tokio::time::sleep(READY_POLL).await;
            }
        };
        tokio::time::timeout(self.ready_timeout, poll)
            .await
            .map_err(|_| PilotError::timeout("document", self.ready_timeout.as_secs()))
    }

    /// Filter, score, order, cap and number raw candidates
    pub fn build(&self, raw: RawExtraction) -> Vec<InteractiveElement> {
        let viewport = raw.viewport;
        let mut elements: Vec<InteractiveElement> = raw
            .candidates
            .into_iter()
            .filter_map(|value| serde_json::from_value::<RawCandidate>(value).ok())
            .filter(|c| c.is_displayable(viewport))
            .map(|c| c.into_element(viewport))
            .collect();

        elements.sort_by(|a, b| {
            b.is_visible.cmp(&a.is_visible).then_with(|| {
                b.confidence_score
                    .partial_cmp(&a.confidence_score)
                    .unwrap_or(Ordering::Equal)
            })
        });
        elements.truncate(self.max_elements);

        for (index, element) in elements.iter_mut().enumerate() {
            element.id = index + 1;
        }
        elements
    }
}

/// Mean confidence, 0 for an empty list
pub fn average_confidence(elements: &[InteractiveElement]) -> f64 {
    if elements.is_empty() {
        return 0.0;
    }
    elements.iter().map(|e| e.confidence_score).sum::<f64>() / elements.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extractor() -> ElementExtractor {
        ElementExtractor::new(50, Duration::from_secs(5))
    }

    fn raw(candidates: Vec<Value>) -> RawExtraction {
        RawExtraction {
            viewport: Viewport {
                width: 1280.0,
                height: 800.0,
            },
            candidates,
        }
    }

    fn candidate(marker: usize, tag: &str, y: f64) -> Value {
        json!({
            "marker": marker,
            "tag": tag,
            "kind": "unknown",
            "text": format!("{} {}", tag, marker),
            "rect": {"x": 10.0, "y": y, "width": 80.0, "height": 20.0},
            "attributes": {"id": "", "class": "", "name": "", "type": "", "role": ""}
        })
    }

    #[test]
    fn test_label_fallback_order() {
        let c = RawCandidate {
            tag: "input".to_string(),
            placeholder: "Search the docs".to_string(),
            title: "ignored".to_string(),
            ..Default::default()
        };
        assert_eq!(c.label(), "Search the docs");

        let bare = RawCandidate {
            tag: "select".to_string(),
            ..Default::default()
        };
        assert_eq!(bare.label(), "select");
    }

    #[test]
    fn test_label_is_collapsed_and_truncated() {
        let c = RawCandidate {
            tag: "a".to_string(),
            text: format!("  Read\n\n more {}", "x".repeat(200)),
            ..Default::default()
        };
        let label = c.label();
        assert!(label.starts_with("Read more x"));
        assert_eq!(label.chars().count(), LABEL_MAX_CHARS);
    }

    #[test]
    fn test_confidence_bonuses_are_capped() {
        let c = RawCandidate {
            tag: "button".to_string(),
            role: "button".to_string(),
            has_click_handler: true,
            ..Default::default()
        };
        assert_eq!(c.confidence(true), 1.0);
        assert!((c.confidence(false) - 0.8).abs() < 1e-9);

        let plain = RawCandidate {
            tag: "div".to_string(),
            ..Default::default()
        };
        assert!((plain.confidence(false) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_filters_hidden_empty_and_far_candidates() {
        let mut hidden = candidate(1, "a", 10.0);
        hidden["hidden"] = json!(true);
        let mut empty = candidate(2, "a", 10.0);
        empty["rect"]["width"] = json!(0.0);
        let far = candidate(3, "a", 2000.0);
        let margin = candidate(4, "a", 850.0);
        let kept = candidate(5, "a", 10.0);

        let elements = extractor().build(raw(vec![hidden, empty, far, margin, kept]));
        let markers: Vec<usize> = elements.iter().map(|e| e.marker).collect();
        assert_eq!(markers, vec![5, 4]);
        assert!(elements[0].is_visible);
        assert!(!elements[1].is_visible);
    }

    #[test]
    fn test_sorted_visible_first_then_confidence_with_sequential_ids() {
        let offscreen_button = candidate(1, "button", 820.0);
        let div = candidate(2, "div", 10.0);
        let mut link = candidate(3, "a", 40.0);
        link["role"] = json!("link");

        let elements = extractor().build(raw(vec![offscreen_button, div, link]));
        let markers: Vec<usize> = elements.iter().map(|e| e.marker).collect();
        assert_eq!(markers, vec![3, 2, 1]);
        let ids: Vec<usize> = elements.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(elements
            .iter()
            .all(|e| (0.0..=1.0).contains(&e.confidence_score)));
    }

    #[test]
    fn test_malformed_candidate_is_skipped() {
        let elements = extractor().build(raw(vec![
            json!({"marker": "not-a-number"}),
            candidate(2, "a", 10.0),
        ]));
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].marker, 2);
    }

    #[test]
    fn test_capped_at_max_elements() {
        let candidates = (1..=80).map(|i| candidate(i, "a", 5.0)).collect();
        let elements = extractor().build(raw(candidates));
        assert_eq!(elements.len(), 50);
        assert_eq!(elements.last().map(|e| e.id), Some(50));
    }

    #[test]
    fn test_form_field_and_clickable_flags() {
        let mut input = candidate(1, "input", 10.0);
        input["kind"] = json!("search");
        input["placeholder"] = json!("Search");
        input["attributes"]["name"] = json!("q");
        let elements = extractor().build(raw(vec![input]));
        let el = &elements[0];
        assert!(el.is_form_field);
        assert!(!el.is_clickable);
        assert_eq!(el.element_kind, "search");
        assert_eq!(el.placeholder.as_deref(), Some("Search"));
        assert_eq!(el.attribute("name"), Some("q"));
        assert_eq!(el.attribute("id"), None);
    }

    #[test]
    fn test_average_confidence() {
        assert_eq!(average_confidence(&[]), 0.0);
    }
}
