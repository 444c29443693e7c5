//! The closed set of browser actions and the oracle's decision record
//!
//! Raw oracle JSON is validated here, before anything touches the browser.
//! A known action kind with missing or malformed parameters becomes
//! [`Action::Invalid`], which the executor reports as an error result.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::core::error::{PilotError, Result};

/// Every action kind the executor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Hover,
    Scroll,
    Wait,
    PressKey,
    Clear,
    Select,
    TakeScreenshot,
    ExecuteScript,
    Refresh,
    GoBack,
    GoForward,
    Answer,
    RightClick,
    DoubleClick,
    GetText,
    /// A kind name outside the closed set
    Unknown,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Navigate => "NAVIGATE",
            ActionKind::Click => "CLICK",
            ActionKind::Type => "TYPE",
            ActionKind::Hover => "HOVER",
            ActionKind::Scroll => "SCROLL",
            ActionKind::Wait => "WAIT",
            ActionKind::PressKey => "PRESS_KEY",
            ActionKind::Clear => "CLEAR",
            ActionKind::Select => "SELECT",
            ActionKind::TakeScreenshot => "TAKE_SCREENSHOT",
            ActionKind::ExecuteScript => "EXECUTE_SCRIPT",
            ActionKind::Refresh => "REFRESH",
            ActionKind::GoBack => "GO_BACK",
            ActionKind::GoForward => "GO_FORWARD",
            ActionKind::Answer => "ANSWER",
            ActionKind::RightClick => "RIGHT_CLICK",
            ActionKind::DoubleClick => "DOUBLE_CLICK",
            ActionKind::GetText => "GET_TEXT",
            ActionKind::Unknown => "UNKNOWN",
        }
    }

    /// Actions that target an element from the current extraction
    pub fn targets_element(&self) -> bool {
        matches!(
            self,
            ActionKind::Click
                | ActionKind::Type
                | ActionKind::Hover
                | ActionKind::Clear
                | ActionKind::Select
                | ActionKind::RightClick
                | ActionKind::DoubleClick
                | ActionKind::GetText
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = PilotError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
        let kind = match normalized.as_str() {
            "NAVIGATE" => ActionKind::Navigate,
            "CLICK" => ActionKind::Click,
            "TYPE" => ActionKind::Type,
            "HOVER" => ActionKind::Hover,
            "SCROLL" => ActionKind::Scroll,
            "WAIT" => ActionKind::Wait,
            "PRESS_KEY" => ActionKind::PressKey,
            "CLEAR" => ActionKind::Clear,
            "SELECT" => ActionKind::Select,
            "TAKE_SCREENSHOT" => ActionKind::TakeScreenshot,
            "EXECUTE_SCRIPT" | "EXECUTE_JS" => ActionKind::ExecuteScript,
            "REFRESH" => ActionKind::Refresh,
            "GO_BACK" => ActionKind::GoBack,
            "GO_FORWARD" => ActionKind::GoForward,
            "ANSWER" => ActionKind::Answer,
            "RIGHT_CLICK" => ActionKind::RightClick,
            "DOUBLE_CLICK" => ActionKind::DoubleClick,
            "GET_TEXT" => ActionKind::GetText,
            _ => return Err(PilotError::oracle(format!("Unknown action: {}", s))),
        };
        Ok(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// A validated action with kind-specific payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Navigate { url: String },
    Click { id: usize },
    /// `id` may be omitted; the executor then auto-detects an input field
    Type { id: Option<usize>, text: String },
    Hover { id: usize },
    Scroll { direction: ScrollDirection, pixels: u32 },
    Wait { seconds: f64 },
    PressKey { key: String },
    Clear { id: usize },
    Select { id: usize, option: String },
    TakeScreenshot,
    ExecuteScript { script: String },
    Refresh,
    GoBack,
    GoForward,
    Answer { text: String },
    RightClick { id: usize },
    DoubleClick { id: usize },
    GetText { id: usize },
    /// Rejected at the boundary; executing it yields an error result
    Invalid { kind: ActionKind, reason: String },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Navigate { .. } => ActionKind::Navigate,
            Action::Click { .. } => ActionKind::Click,
            Action::Type { .. } => ActionKind::Type,
            Action::Hover { .. } => ActionKind::Hover,
            Action::Scroll { .. } => ActionKind::Scroll,
            Action::Wait { .. } => ActionKind::Wait,
            Action::PressKey { .. } => ActionKind::PressKey,
            Action::Clear { .. } => ActionKind::Clear,
            Action::Select { .. } => ActionKind::Select,
            Action::TakeScreenshot => ActionKind::TakeScreenshot,
            Action::ExecuteScript { .. } => ActionKind::ExecuteScript,
            Action::Refresh => ActionKind::Refresh,
            Action::GoBack => ActionKind::GoBack,
            Action::GoForward => ActionKind::GoForward,
            Action::Answer { .. } => ActionKind::Answer,
            Action::RightClick { .. } => ActionKind::RightClick,
            Action::DoubleClick { .. } => ActionKind::DoubleClick,
            Action::GetText { .. } => ActionKind::GetText,
            Action::Invalid { kind, .. } => *kind,
        }
    }

    /// The element id an element-targeted action refers to, if any
    pub fn element_id(&self) -> Option<usize> {
        match self {
            Action::Click { id }
            | Action::Hover { id }
            | Action::Clear { id }
            | Action::Select { id, .. }
            | Action::RightClick { id }
            | Action::DoubleClick { id }
            | Action::GetText { id } => Some(*id),
            Action::Type { id, .. } => *id,
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::Answer { .. })
    }

    /// Validate a kind name and its parameter map
    pub fn from_parts(kind_name: &str, params: &Map<String, Value>) -> Action {
        let kind = match kind_name.parse::<ActionKind>() {
            Ok(kind) => kind,
            Err(_) => {
                return Action::Invalid {
                    kind: ActionKind::Unknown,
                    reason: format!("Unknown action: {}", kind_name),
                }
            }
        };

        let invalid = |reason: &str| Action::Invalid {
            kind,
            reason: reason.to_string(),
        };

        let id = if kind.targets_element() {
            match param_id(params) {
                Ok(id) => id,
                Err(reason) => return invalid(&reason),
            }
        } else {
            None
        };
        let required_id = || id.ok_or_else(|| format!("Element ID not provided for {}", kind));

        match kind {
            ActionKind::Navigate => match param_str(params, "url") {
                Some(url) => Action::Navigate { url },
                None => invalid("URL not provided"),
            },
            ActionKind::Type => match param_text(params, "text") {
                Some(text) => Action::Type { id, text },
                None => invalid("No text provided"),
            },
            ActionKind::Select => {
                let option = param_str(params, "option").or_else(|| param_str(params, "value"));
                match (required_id(), option) {
                    (Err(reason), _) => invalid(&reason),
                    (Ok(_), None) => invalid("No option provided"),
                    (Ok(id), Some(option)) => Action::Select { id, option },
                }
            }
            ActionKind::Click
            | ActionKind::Hover
            | ActionKind::Clear
            | ActionKind::RightClick
            | ActionKind::DoubleClick
            | ActionKind::GetText => match required_id() {
                Ok(id) => match kind {
                    ActionKind::Click => Action::Click { id },
                    ActionKind::Hover => Action::Hover { id },
                    ActionKind::Clear => Action::Clear { id },
                    ActionKind::RightClick => Action::RightClick { id },
                    ActionKind::DoubleClick => Action::DoubleClick { id },
                    _ => Action::GetText { id },
                },
                Err(reason) => invalid(&reason),
            },
            ActionKind::Scroll => {
                let direction = match param_str(params, "direction")
                    .map(|d| d.to_lowercase())
                    .as_deref()
                {
                    Some("up") => ScrollDirection::Up,
                    _ => ScrollDirection::Down,
                };
                let pixels = param_f64(params, "pixels")
                    .map(|p| p.abs().round() as u32)
                    .unwrap_or(500);
                Action::Scroll { direction, pixels }
            }
            ActionKind::Wait => {
                let seconds = param_f64(params, "seconds").unwrap_or(2.0).max(0.0);
                Action::Wait { seconds }
            }
            ActionKind::PressKey => Action::PressKey {
                key: param_str(params, "key").unwrap_or_else(|| "Enter".to_string()),
            },
            ActionKind::TakeScreenshot => Action::TakeScreenshot,
            ActionKind::ExecuteScript => match param_str(params, "script") {
                Some(script) => Action::ExecuteScript { script },
                None => invalid("No script provided"),
            },
            ActionKind::Refresh => Action::Refresh,
            ActionKind::GoBack => Action::GoBack,
            ActionKind::GoForward => Action::GoForward,
            ActionKind::Answer => Action::Answer {
                text: param_str(params, "text").unwrap_or_else(|| "Task completed".to_string()),
            },
            ActionKind::Unknown => invalid("Unknown action"),
        }
    }
}

/// Non-empty string parameter; numbers are stringified
fn param_str(params: &Map<String, Value>, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Text to type; only an empty string counts as missing
fn param_text(params: &Map<String, Value>, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn param_f64(params: &Map<String, Value>, key: &str) -> Option<f64> {
    match params.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `id` as a positive integer; accepts numbers and numeric strings
fn param_id(params: &Map<String, Value>) -> std::result::Result<Option<usize>, String> {
    let Some(raw) = params.get("id") else {
        return Ok(None);
    };
    let parsed = match raw {
        Value::Null => return Ok(None),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().trim_start_matches('#').parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(id) => Ok(Some(id as usize)),
        None => Err(format!("Invalid element id: {}", raw)),
    }
}

/// The oracle's structured output for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub thought: String,
    pub confidence: f64,
    pub reasoning: String,
    pub action: Action,
    /// Stand-in produced when the oracle gave no usable answer
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(default)]
    thought: Option<String>,
    #[serde(default, deserialize_with = "lenient_confidence")]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    action: Option<RawAction>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    #[serde(default, alias = "name")]
    kind: Option<String>,
    #[serde(default)]
    parameters: Option<Map<String, Value>>,
    /// Some models inline the parameters next to `kind`
    #[serde(flatten)]
    inline: Map<String, Value>,
}

impl Decision {
    /// Parse an oracle response, tolerating surrounding code fences
    pub fn parse(response: &str) -> Result<Decision> {
        let cleaned = strip_code_fences(response);
        let raw: RawDecision = serde_json::from_str(cleaned)?;

        let action = raw
            .action
            .ok_or_else(|| PilotError::oracle("Decision has no action"))?;
        let kind = action
            .kind
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PilotError::oracle("Decision action has no kind"))?;
        let params = action.parameters.unwrap_or(action.inline);

        Ok(Decision {
            thought: raw.thought.unwrap_or_default(),
            confidence: raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            reasoning: raw.reasoning.unwrap_or_default(),
            action: Action::from_parts(&kind, &params),
            fallback: false,
        })
    }

    /// A safe decision that only pauses
    pub fn fallback_wait(
        thought: impl Into<String>,
        reasoning: impl Into<String>,
        seconds: f64,
    ) -> Decision {
        Decision {
            thought: thought.into(),
            confidence: 0.1,
            reasoning: reasoning.into(),
            action: Action::Wait { seconds },
            fallback: true,
        }
    }
}

/// Confidence as a number or a numeric string; anything else is absent
fn lenient_confidence<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Remove a leading ```/```json fence line and a trailing ``` fence
pub fn strip_code_fences(response: &str) -> &str {
    let mut text = response.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches("json"),
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}
