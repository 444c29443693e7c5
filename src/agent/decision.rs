//! Decision engine
//!
//! Packages the objective, the last feedback, the element list and the
//! annotated screenshot into one oracle request and turns the reply into a
//! [`Decision`]. Any failure becomes a WAIT decision instead of an error.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::core::{truncate_chars, Config, Decision, InteractiveElement, Message, Result};
use crate::llm::{GenerateOptions, LLMProvider, LLMResponse};

/// Pause used when the reply cannot be parsed
pub const PARSE_FALLBACK_SECONDS: f64 = 2.0;
/// Pause used when the oracle call itself fails
pub const TRANSPORT_FALLBACK_SECONDS: f64 = 3.0;

const ELEMENT_TEXT_CHARS: usize = 50;
const ATTRIBUTE_CHARS: usize = 30;
const MAX_RESPONSE_TOKENS: u32 = 1500;

const SYSTEM_PROMPT: &str = "You are a web automation agent. You see a screenshot of the \
current page where interactive elements are outlined and numbered, and a text list of the \
same elements. Pick the single next action that moves the objective forward and reply with \
one JSON object only.";

/// Presentation hook shown while the oracle is thinking
pub trait ThinkingIndicator: Send + Sync {
    fn show(&self, message: &str);
    fn hide(&self);
}

/// Indicator that only logs
#[derive(Debug, Default, Clone)]
pub struct LogIndicator;

impl ThinkingIndicator for LogIndicator {
    fn show(&self, message: &str) {
        debug!("{}", message);
    }

    fn hide(&self) {}
}

/// Hides the indicator when dropped
struct IndicatorGuard<'a>(&'a dyn ThinkingIndicator);

impl Drop for IndicatorGuard<'_> {
    fn drop(&mut self) {
        self.0.hide();
    }
}

pub struct DecisionEngine {
    provider: Arc<dyn LLMProvider>,
    model: String,
    temperature: f32,
    streaming: bool,
    indicator: Arc<dyn ThinkingIndicator>,
}

impl DecisionEngine {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &Config) -> Self {
        Self {
            provider,
            model: config.models.vision.clone(),
            temperature: config.models.temperature,
            streaming: config.streaming.enabled,
            indicator: Arc::new(LogIndicator),
        }
    }

    pub fn with_indicator(mut self, indicator: Arc<dyn ThinkingIndicator>) -> Self {
        self.indicator = indicator;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the oracle for the next action. Never fails.
    pub async fn decide(
        &self,
        objective: &str,
        annotated_png: &[u8],
        elements: &[InteractiveElement],
        last_feedback: &str,
    ) -> Decision {
        let prompt = build_prompt(objective, last_feedback, &describe_elements(elements));
        let messages = [
            Message::system(SYSTEM_PROMPT),
            Message::user(prompt).with_image(B64.encode(annotated_png)),
        ];

        self.indicator.show("Analyzing the page");
        let _guard = IndicatorGuard(self.indicator.as_ref());

        let response = match self.request(&messages).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Oracle request failed: {}", e);
                return Decision::fallback_wait(
                    format!("Oracle request failed: {}", e),
                    "Oracle communication error",
                    TRANSPORT_FALLBACK_SECONDS,
                );
            }
        };

        match Decision::parse(&response.content) {
            Ok(decision) => {
                info!(
                    action = %decision.action.kind(),
                    confidence = decision.confidence,
                    "decision: {}",
                    decision.thought
                );
                debug!(reasoning = %decision.reasoning, "decision reasoning");
                decision
            }
            Err(e) => {
                warn!(
                    "Unusable oracle response ({}): {}",
                    e,
                    truncate_chars(&response.content, 200)
                );
                Decision::fallback_wait(
                    "Failed to parse oracle response",
                    format!("Response parsing error: {}", e),
                    PARSE_FALLBACK_SECONDS,
                )
            }
        }
    }

    /// Streaming request with one non-streaming retry, or a plain request
    async fn request(&self, messages: &[Message]) -> Result<LLMResponse> {
        let options = || {
            Some(GenerateOptions {
                temperature: Some(self.temperature),
                max_tokens: Some(MAX_RESPONSE_TOKENS),
                json_mode: true,
            })
        };

        if self.streaming {
            let streamed = self
                .provider
                .chat_stream(
                    &self.model,
                    messages,
                    options(),
                    Box::new(|token: &str| trace!(token, "oracle token")),
                )
                .await;
            match streamed {
                Ok(response) => return Ok(response),
                Err(e) => warn!("Streaming request failed, retrying without streaming: {}", e),
            }
        }

        self.provider.chat(&self.model, messages, options()).await
    }
}

/// One line per grounded element: id, tag, text and key attributes
pub fn describe_elements(elements: &[InteractiveElement]) -> String {
    elements
        .iter()
        .filter(|e| e.is_grounded())
        .map(|e| {
            let mut attrs = Vec::new();
            let mut push = |name: &str, value: Option<&str>| {
                if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                    attrs.push(format!("{}='{}'", name, truncate_chars(value, ATTRIBUTE_CHARS)));
                }
            };
            push("type", e.attribute("type"));
            push("placeholder", e.placeholder.as_deref());
            push("name", e.attribute("name"));
            push("id", e.attribute("id"));
            push("class", e.attribute("class"));
            push("value", e.value.as_deref());

            let text = if e.text.is_empty() { &e.label } else { &e.text };
            format!(
                "[{}] {} - Text: '{}' Attributes: {}",
                e.id,
                e.tag.to_uppercase(),
                truncate_chars(text, ELEMENT_TEXT_CHARS),
                attrs.join(" ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The user prompt for one cycle
pub fn build_prompt(objective: &str, last_feedback: &str, element_descriptions: &str) -> String {
    let elements = if element_descriptions.is_empty() {
        "(no interactive elements found; consider NAVIGATE, SCROLL or WAIT)"
    } else {
        element_descriptions
    };

    format!(
        r#"CURRENT OBJECTIVE: {objective}
LAST ACTION FEEDBACK: {last_feedback}

VISIBLE ELEMENTS (confidence >= 0.3):
{elements}

AVAILABLE ACTIONS (kind - parameters):
1. NAVIGATE - {{"url": "https://example.com"}}
2. CLICK - {{"id": 1}}
3. TYPE - {{"id": 1, "text": "search query"}} (omit id to use the main input field)
4. HOVER - {{"id": 1}}
5. SCROLL - {{"direction": "down", "pixels": 500}}
6. WAIT - {{"seconds": 2}}
7. PRESS_KEY - {{"key": "Enter"}}
8. CLEAR - {{"id": 1}}
9. SELECT - {{"id": 1, "option": "visible text or value"}}
10. TAKE_SCREENSHOT - {{}}
11. EXECUTE_SCRIPT - {{"script": "return document.title;"}}
12. REFRESH - {{}}
13. GO_BACK - {{}}
14. GO_FORWARD - {{}}
15. ANSWER - {{"text": "final answer"}} (ends the task)
Also available: RIGHT_CLICK, DOUBLE_CLICK, GET_TEXT - {{"id": 1}}

RESPONSE FORMAT (JSON only):
{{
  "thought": "what you see and what to do next",
  "confidence": 0.9,
  "reasoning": "why this action helps",
  "action": {{"kind": "CLICK", "parameters": {{"id": 1}}}}
}}

RULES:
- Use only the numbered ids from the list above; they match the screenshot.
- Ids change every step. Do not reuse ids from earlier steps.
- Use ANSWER as soon as the objective is achieved."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BoundingBox;
    use std::collections::BTreeMap;

    fn element(id: usize, visible: bool) -> InteractiveElement {
        InteractiveElement {
            id,
            marker: id,
            tag: "input".to_string(),
            element_kind: "text".to_string(),
            label: "Search".to_string(),
            text: String::new(),
            is_visible: visible,
            is_clickable: false,
            is_form_field: true,
            bounding_box: BoundingBox::new(0.0, 0.0, 100.0, 20.0),
            attributes: BTreeMap::from([
                ("type".to_string(), "search".to_string()),
                ("name".to_string(), "q".to_string()),
                ("class".to_string(), String::new()),
            ]),
            placeholder: Some("Search docs".to_string()),
            value: None,
            in_frame: false,
            confidence_score: 0.7,
        }
    }

    #[test]
    fn test_describe_only_grounded_elements() {
        let text = describe_elements(&[element(1, true), element(2, false)]);
        assert_eq!(
            text,
            "[1] INPUT - Text: 'Search' Attributes: type='search' placeholder='Search docs' name='q'"
        );
    }

    #[test]
    fn test_prompt_mentions_objective_and_feedback() {
        let prompt = build_prompt("find rust docs", "Clicked element 2", "[1] A - Text: 'Docs'");
        assert!(prompt.contains("CURRENT OBJECTIVE: find rust docs"));
        assert!(prompt.contains("LAST ACTION FEEDBACK: Clicked element 2"));
        assert!(prompt.contains("[1] A - Text: 'Docs'"));
        assert!(prompt.contains("\"action\": {\"kind\": \"CLICK\""));
    }

    #[test]
    fn test_prompt_without_elements() {
        let prompt = build_prompt("go", "none", "");
        assert!(prompt.contains("no interactive elements found"));
    }
}
