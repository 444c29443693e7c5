//! Shared test doubles: an in-memory browser and a scripted oracle

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::path::Path;
use std::sync::Mutex;

use webpilot::browser::scripts;
use webpilot::core::config::PacingConfig;
use webpilot::core::Message;
use webpilot::llm::{GenerateOptions, LLMProvider, LLMResponse, StreamCallback};
use webpilot::{BrowserDriver, Config, PilotError, Result};

pub const VIEWPORT_WIDTH: u32 = 1280;
pub const VIEWPORT_HEIGHT: u32 = 800;

/// Config with no pacing delays and all output under `dir`
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.pacing = PacingConfig::instant();
    config.streaming.enabled = false;
    config.agent.objective_timeout_secs = 60;
    config.browser.ready_timeout_secs = 1;
    config.browser.navigation_timeout_secs = 1;
    config.output.screenshots_dir = dir.join("screenshots");
    config.output.reports_dir = dir.join("reports");
    config.output.action_log = dir.join("actions.jsonl");
    config
}

/// Raw extraction candidate as the page script reports it
pub fn candidate(marker: usize, tag: &str, text: &str) -> Value {
    json!({
        "marker": marker,
        "tag": tag,
        "kind": tag,
        "text": text,
        "hidden": false,
        "inFrame": false,
        "hasClickHandler": false,
        "rect": {"x": 20.0, "y": 10.0 + 50.0 * marker as f64, "width": 160.0, "height": 30.0},
        "attributes": {}
    })
}

pub fn input_candidate(marker: usize, input_type: &str, name: &str, placeholder: &str) -> Value {
    let mut value = candidate(marker, "input", "");
    value["kind"] = json!(input_type);
    value["placeholder"] = json!(placeholder);
    value["attributes"] = json!({"type": input_type, "name": name});
    value
}

/// A handle returned by [`MockBrowser`]
#[derive(Debug, Clone, PartialEq)]
pub enum MockElement {
    Marked(usize),
    Frame(usize),
}

#[derive(Debug, Default)]
struct MockState {
    url: String,
    ready_state: String,
    candidates: Vec<Value>,
    /// marker -> index of the owning iframe
    frames: HashMap<usize, usize>,
    removed: HashSet<usize>,
    frame_context: Option<usize>,
    failing: HashSet<String>,
    typed: HashMap<usize, String>,
    calls: Vec<String>,
    screenshots: usize,
    quit: bool,
}

/// In-memory browser whose page is a list of extraction candidates
pub struct MockBrowser {
    state: Mutex<MockState>,
}

impl MockBrowser {
    pub fn new(url: &str) -> Self {
        Self {
            state: Mutex::new(MockState {
                url: url.to_string(),
                ready_state: "complete".to_string(),
                ..Default::default()
            }),
        }
    }

    pub fn with_candidates(self, candidates: Vec<Value>) -> Self {
        self.state.lock().unwrap().candidates = candidates;
        self
    }

    /// Place `marker` inside iframe number `frame`
    pub fn with_frame(self, marker: usize, frame: usize) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.frames.insert(marker, frame);
            for c in state.candidates.iter_mut() {
                if c["marker"] == json!(marker) {
                    c["inFrame"] = json!(true);
                }
            }
        }
        self
    }

    /// Make a browser operation fail: "click", "script_click", "pointer_click",
    /// "dispatch_click", "hover", "send_keys", "screenshot", "navigate"
    pub fn failing(self, operation: &str) -> Self {
        self.state.lock().unwrap().failing.insert(operation.to_string());
        self
    }

    /// Simulate a DOM mutation removing an element
    pub fn remove_marker(&self, marker: usize) {
        self.state.lock().unwrap().removed.insert(marker);
    }

    pub fn set_ready_state(&self, ready_state: &str) {
        self.state.lock().unwrap().ready_state = ready_state.to_string();
    }

    pub fn url(&self) -> String {
        self.state.lock().unwrap().url.clone()
    }

    pub fn frame_context(&self) -> Option<usize> {
        self.state.lock().unwrap().frame_context
    }

    pub fn typed(&self, marker: usize) -> String {
        self.state
            .lock()
            .unwrap()
            .typed
            .get(&marker)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn screenshots(&self) -> usize {
        self.state.lock().unwrap().screenshots
    }

    pub fn was_quit(&self) -> bool {
        self.state.lock().unwrap().quit
    }

    fn record(&self, call: impl Into<String>) {
        self.state.lock().unwrap().calls.push(call.into());
    }

    /// Record `op` with the frame context it ran in, failing if configured
    fn perform(&self, op: &str, element: &MockElement) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let context = match state.frame_context {
            Some(frame) => format!("frame{}", frame),
            None => "top".to_string(),
        };
        let target = match element {
            MockElement::Marked(marker) => marker.to_string(),
            MockElement::Frame(frame) => format!("iframe{}", frame),
        };
        state.calls.push(format!("{}:{}@{}", op, target, context));
        if state.failing.contains(op) {
            return Err(PilotError::browser(format!("{} intercepted", op)));
        }
        Ok(())
    }

    /// A field of the candidate behind `element`
    fn candidate_field(&self, element: &MockElement, field: &str) -> Option<Value> {
        let MockElement::Marked(marker) = element else {
            return None;
        };
        let state = self.state.lock().unwrap();
        state
            .candidates
            .iter()
            .find(|c| c["marker"] == json!(marker))
            .and_then(|c| c.get(field).cloned())
    }

    fn page_png() -> Vec<u8> {
        let image = RgbaImage::from_pixel(VIEWPORT_WIDTH, VIEWPORT_HEIGHT, Rgba([250, 250, 250, 255]));
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
            .unwrap();
        png
    }
}

fn marker_from_selector(selector: &str) -> Option<usize> {
    let prefix = format!("[{}=\"", scripts::MARKER_ATTRIBUTE);
    selector
        .strip_prefix(&prefix)?
        .strip_suffix("\"]")?
        .parse()
        .ok()
}

#[async_trait]
impl BrowserDriver for MockBrowser {
    type Element = MockElement;

    async fn navigate(&self, url: &str) -> Result<()> {
        self.record(format!("navigate:{}", url));
        let mut state = self.state.lock().unwrap();
        if state.failing.contains("navigate") {
            return Err(PilotError::browser("net::ERR_NAME_NOT_RESOLVED"));
        }
        state.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url())
    }

    async fn title(&self) -> Result<String> {
        Ok("Mock Page".to_string())
    }

    async fn ready_state(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().ready_state.clone())
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        let state = self.state.lock().unwrap();
        if script == scripts::EXTRACT_ELEMENTS {
            let candidates: Vec<Value> = state
                .candidates
                .iter()
                .filter(|c| {
                    c["marker"]
                        .as_u64()
                        .map(|m| !state.removed.contains(&(m as usize)))
                        .unwrap_or(true)
                })
                .cloned()
                .collect();
            return Ok(json!({
                "viewport": {"width": VIEWPORT_WIDTH, "height": VIEWPORT_HEIGHT},
                "candidates": candidates
            }));
        }
        if script == scripts::LOCATE_FRAME {
            let marker = args.first().and_then(Value::as_u64).unwrap_or_default() as usize;
            let exists = state.candidates.iter().any(|c| c["marker"] == json!(marker));
            if !exists || state.removed.contains(&marker) {
                return Ok(json!({"found": false, "frameIndex": null}));
            }
            return Ok(json!({"found": true, "frameIndex": state.frames.get(&marker)}));
        }
        if script == scripts::SCROLL_BY {
            return Ok(Value::Null);
        }
        Ok(json!("script result"))
    }

    async fn execute_on_element(&self, script: &str, element: &Self::Element) -> Result<Value> {
        match script {
            s if s == scripts::SCRIPT_CLICK => self.perform("script_click", element)?,
            s if s == scripts::DISPATCH_CLICK => self.perform("dispatch_click", element)?,
            s if s == scripts::TEXT_CONTENT => {
                return Ok(self.candidate_field(element, "text").unwrap_or(Value::Null))
            }
            _ => {}
        }
        Ok(Value::Null)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains("screenshot") {
            return Err(PilotError::browser("screenshot failed"));
        }
        state.screenshots += 1;
        Ok(Self::page_png())
    }

    async fn find_by_css(&self, selector: &str) -> Result<Option<Self::Element>> {
        let Some(marker) = marker_from_selector(selector) else {
            return Ok(None);
        };
        let state = self.state.lock().unwrap();
        let exists = state.candidates.iter().any(|c| c["marker"] == json!(marker));
        let same_context = state.frames.get(&marker).copied() == state.frame_context;
        if exists && same_context && !state.removed.contains(&marker) {
            Ok(Some(MockElement::Marked(marker)))
        } else {
            Ok(None)
        }
    }

    async fn find_all_by_css(&self, selector: &str) -> Result<Vec<Self::Element>> {
        if selector != "iframe" {
            return Ok(Vec::new());
        }
        let state = self.state.lock().unwrap();
        let count = state.frames.values().max().map(|m| m + 1).unwrap_or(0);
        Ok((0..count).map(MockElement::Frame).collect())
    }

    async fn switch_to_frame(&self, frame: &Self::Element) -> Result<()> {
        let MockElement::Frame(index) = frame else {
            return Err(PilotError::browser("not a frame"));
        };
        self.record(format!("enter_frame:{}", index));
        self.state.lock().unwrap().frame_context = Some(*index);
        Ok(())
    }

    async fn switch_to_default(&self) -> Result<()> {
        self.record("leave_frame");
        self.state.lock().unwrap().frame_context = None;
        Ok(())
    }

    async fn click(&self, element: &Self::Element) -> Result<()> {
        self.perform("click", element)
    }

    async fn pointer_click(&self, element: &Self::Element) -> Result<()> {
        self.perform("pointer_click", element)
    }

    async fn hover(&self, element: &Self::Element) -> Result<()> {
        self.perform("hover", element)
    }

    async fn context_click(&self, element: &Self::Element) -> Result<()> {
        self.perform("context_click", element)
    }

    async fn double_click(&self, element: &Self::Element) -> Result<()> {
        self.perform("double_click", element)
    }

    async fn clear(&self, element: &Self::Element) -> Result<()> {
        self.perform("clear", element)?;
        if let MockElement::Marked(marker) = element {
            self.state.lock().unwrap().typed.remove(marker);
        }
        Ok(())
    }

    async fn send_keys(&self, element: &Self::Element, keys: &str) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            if state.failing.contains("send_keys") {
                return Err(PilotError::browser("element not interactable"));
            }
        }
        if let MockElement::Marked(marker) = element {
            self.state
                .lock()
                .unwrap()
                .typed
                .entry(*marker)
                .or_default()
                .push_str(keys);
        }
        Ok(())
    }

    async fn send_keys_to_active(&self, keys: &str) -> Result<()> {
        self.record(format!("keys:{:?}", keys));
        Ok(())
    }

    async fn select_by_label(&self, element: &Self::Element, label: &str) -> Result<()> {
        self.perform(&format!("select_label={}", label), element)
    }

    async fn select_by_value(&self, element: &Self::Element, value: &str) -> Result<()> {
        self.perform(&format!("select_value={}", value), element)
    }

    async fn select_by_index(&self, element: &Self::Element, index: usize) -> Result<()> {
        self.perform(&format!("select_index={}", index), element)
    }

    async fn text(&self, _element: &Self::Element) -> Result<String> {
        Ok(String::new())
    }

    async fn attribute(&self, element: &Self::Element, name: &str) -> Result<Option<String>> {
        Ok(self
            .candidate_field(element, name)
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    async fn refresh(&self) -> Result<()> {
        self.record("refresh");
        Ok(())
    }

    async fn back(&self) -> Result<()> {
        self.record("back");
        Ok(())
    }

    async fn forward(&self) -> Result<()> {
        self.record("forward");
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        self.state.lock().unwrap().quit = true;
        Ok(())
    }
}

/// Oracle that replays queued replies
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String>>>,
    /// Reply once the queue is empty
    fallback: String,
    stream_fails: bool,
    unreachable: bool,
    prompts: Mutex<Vec<String>>,
    images: Mutex<usize>,
    stream_calls: Mutex<usize>,
    chat_calls: Mutex<usize>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            fallback: answer("done"),
            stream_fails: false,
            unreachable: false,
            prompts: Mutex::new(Vec::new()),
            images: Mutex::new(0),
            stream_calls: Mutex::new(0),
            chat_calls: Mutex::new(0),
        }
    }

    /// Reply with `reply` forever once the queue is drained
    pub fn repeating(mut self, reply: String) -> Self {
        self.fallback = reply;
        self
    }

    pub fn failing_first(self, times: usize) -> Self {
        {
            let mut replies = self.replies.lock().unwrap();
            for _ in 0..times {
                replies.push_front(Err(PilotError::ollama("connection refused")));
            }
        }
        self
    }

    /// Every request fails as if the server were down
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn with_broken_stream(mut self) -> Self {
        self.stream_fails = true;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn images_seen(&self) -> usize {
        *self.images.lock().unwrap()
    }

    pub fn stream_calls(&self) -> usize {
        *self.stream_calls.lock().unwrap()
    }

    pub fn chat_calls(&self) -> usize {
        *self.chat_calls.lock().unwrap()
    }

    fn next(&self, messages: &[Message]) -> Result<LLMResponse> {
        if let Some(user) = messages.iter().rev().find(|m| m.role == "user") {
            self.prompts.lock().unwrap().push(user.content.clone());
            *self.images.lock().unwrap() += user.images.len();
        }
        if self.unreachable {
            return Err(PilotError::ollama("connection refused"));
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))?;
        Ok(LLMResponse::text("scripted", reply))
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat(
        &self,
        _model: &str,
        messages: &[Message],
        _options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        *self.chat_calls.lock().unwrap() += 1;
        self.next(messages)
    }

    async fn chat_stream(
        &self,
        _model: &str,
        messages: &[Message],
        _options: Option<GenerateOptions>,
        on_token: StreamCallback,
    ) -> Result<LLMResponse> {
        *self.stream_calls.lock().unwrap() += 1;
        if self.stream_fails {
            return Err(PilotError::ollama("stream closed"));
        }
        let response = self.next(messages)?;
        on_token(&response.content);
        Ok(response)
    }

    async fn is_model_available(&self, _model: &str) -> Result<bool> {
        Ok(true)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec!["scripted".to_string()])
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Oracle reply for `kind` with `parameters`
pub fn decision(kind: &str, parameters: Value) -> String {
    json!({
        "thought": format!("next: {}", kind),
        "confidence": 0.9,
        "reasoning": "scripted",
        "action": {"kind": kind, "parameters": parameters}
    })
    .to_string()
}

pub fn answer(text: &str) -> String {
    decision("ANSWER", json!({"text": text}))
}
