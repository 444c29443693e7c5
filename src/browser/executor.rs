//! Frame-aware action executor
//!
//! Turns a validated [`Action`] into browser calls. Every path ends in an
//! [`ActionResult`]; no error escapes [`ActionExecutor::execute`].

use chrono::{DateTime, Utc};
use fantoccini::key::Key;
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::annotator::VisualAnnotator;
use crate::browser::driver::BrowserDriver;
use crate::browser::frame::FrameScope;
use crate::browser::scripts;
use crate::core::config::PacingConfig;
use crate::core::{
    truncate_chars, Action, ActionKind, ActionResult, Config, InteractiveElement, PilotError,
    Result, ScrollDirection,
};

/// Terms that suggest a field is the page's main text input
pub const SEARCH_TERMS: [&str; 7] = ["search", "query", "q", "input", "text", "find", "lookup"];

/// How many valid ids an unresolved-id error lists
const AVAILABLE_IDS_SHOWN: usize = 20;
const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_WAIT: Duration = Duration::from_secs(60);
const READY_POLL: Duration = Duration::from_millis(200);
const SCRIPT_RESULT_CHARS: usize = 100;

/// Click strategies, tried in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickStrategy {
    Direct,
    Script,
    Pointer,
    DispatchedEvent,
    MoveThenClick,
}

impl ClickStrategy {
    pub const LADDER: [ClickStrategy; 5] = [
        ClickStrategy::Direct,
        ClickStrategy::Script,
        ClickStrategy::Pointer,
        ClickStrategy::DispatchedEvent,
        ClickStrategy::MoveThenClick,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClickStrategy::Direct => "direct click",
            ClickStrategy::Script => "script click",
            ClickStrategy::Pointer => "pointer click",
            ClickStrategy::DispatchedEvent => "dispatched click event",
            ClickStrategy::MoveThenClick => "move then click",
        }
    }
}

/// What one executed action produced
#[derive(Debug, Clone)]
pub struct Execution {
    pub result: ActionResult,
    /// Destination to record as visited
    pub visited: Option<String>,
    /// The page changed wholesale; cached elements are stale
    pub invalidates_cache: bool,
    /// The objective is finished
    pub terminal: bool,
}

/// Message-level outcome of one dispatch branch
struct Done {
    message: String,
    element_id: Option<usize>,
    screenshot: Option<PathBuf>,
    visited: Option<String>,
}

impl Done {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            element_id: None,
            screenshot: None,
            visited: None,
        }
    }

    fn on(mut self, element_id: usize) -> Self {
        self.element_id = Some(element_id);
        self
    }
}

/// Executes decisions against a browser session
pub struct ActionExecutor<B: BrowserDriver> {
    driver: Arc<B>,
    annotator: VisualAnnotator,
    pacing: PacingConfig,
    navigation_timeout: Duration,
    screenshots_dir: PathBuf,
}

impl<B: BrowserDriver> ActionExecutor<B> {
    pub fn new(driver: Arc<B>, config: &Config) -> Self {
        Self {
            driver,
            annotator: VisualAnnotator::new(),
            pacing: config.pacing.clone(),
            navigation_timeout: Duration::from_secs(config.browser.navigation_timeout_secs),
            screenshots_dir: config.output.screenshots_dir.clone(),
        }
    }

    /// Execute one action against the elements of the current cycle
    pub async fn execute(&self, action: &Action, elements: &[InteractiveElement]) -> Execution {
        let started = Utc::now();
        let kind = action.kind();
        info!(action = %kind, "executing action");

        let result = match self.dispatch(action, elements).await {
            Ok(done) => {
                let mut result = ActionResult::success(kind, done.message, started);
                result.element_id = done.element_id;
                result.screenshot_path = done.screenshot;
                return Execution {
                    result,
                    visited: done.visited,
                    invalidates_cache: matches!(
                        kind,
                        ActionKind::Navigate
                            | ActionKind::Refresh
                            | ActionKind::GoBack
                            | ActionKind::GoForward
                    ),
                    terminal: action.is_terminal(),
                };
            }
            Err(e) => {
                warn!(action = %kind, "action failed: {}", e);
                self.failure(kind, e, action.element_id(), started)
            }
        };

        Execution {
            result,
            visited: None,
            invalidates_cache: false,
            terminal: false,
        }
    }

    fn failure(
        &self,
        kind: ActionKind,
        error: PilotError,
        element_id: Option<usize>,
        started: DateTime<Utc>,
    ) -> ActionResult {
        let result = ActionResult::failure(kind, error.to_string(), started);
        match element_id {
            Some(id) => result.with_element(id),
            None => result,
        }
    }

    async fn dispatch(&self, action: &Action, elements: &[InteractiveElement]) -> Result<Done> {
        match action {
            Action::Invalid { reason, .. } => Err(PilotError::Other(reason.clone())),
            Action::Navigate { url } => self.navigate(url).await,
            Action::Click { id } => {
                let target = resolve(*id, elements)?;
                let strategy = self
                    .on_element(target, |el| async move { self.click_ladder(&el).await })
                    .await?;
                Ok(Done::new(format!(
                    "Clicked {} ({}){}",
                    describe(target),
                    strategy.as_str(),
                    frame_note(target)
                ))
                .on(target.id))
            }
            Action::Type { id, text } => {
                let (target, detected) = match id {
                    Some(id) => (resolve(*id, elements)?, false),
                    None => {
                        let target = auto_detect_input(elements).ok_or_else(|| {
                            PilotError::Other("Could not find a suitable input field".to_string())
                        })?;
                        info!(id = target.id, "auto-detected input field");
                        (target, true)
                    }
                };
                self.on_element(target, |el| async move { self.type_text(&el, text).await })
                    .await?;
                Ok(Done::new(format!(
                    "Typed '{}' into {}{}{}",
                    text,
                    describe(target),
                    if detected { " (auto-detected)" } else { "" },
                    frame_note(target)
                ))
                .on(target.id))
            }
            Action::Hover { id } => {
                let target = resolve(*id, elements)?;
                self.on_element(target, |el| async move {
                    self.scroll_into_view(&el).await?;
                    self.driver.hover(&el).await
                })
                .await?;
                Ok(Done::new(format!("Hovered over {}", describe(target))).on(target.id))
            }
            Action::Clear { id } => {
                let target = resolve(*id, elements)?;
                self.on_element(target, |el| async move { self.driver.clear(&el).await })
                    .await?;
                Ok(Done::new(format!("Cleared {}", describe(target))).on(target.id))
            }
            Action::Select { id, option } => {
                let target = resolve(*id, elements)?;
                let how = self
                    .on_element(target, |el| async move { self.select(&el, option).await })
                    .await?;
                Ok(Done::new(format!(
                    "Selected '{}' from {} (by {})",
                    option,
                    describe(target),
                    how
                ))
                .on(target.id))
            }
            Action::RightClick { id } => {
                let target = resolve(*id, elements)?;
                self.on_element(target, |el| async move {
                    self.scroll_into_view(&el).await?;
                    self.driver.context_click(&el).await
                })
                .await?;
                Ok(Done::new(format!("Right clicked {}", describe(target))).on(target.id))
            }
            Action::DoubleClick { id } => {
                let target = resolve(*id, elements)?;
                self.on_element(target, |el| async move {
                    self.scroll_into_view(&el).await?;
                    self.driver.double_click(&el).await
                })
                .await?;
                Ok(Done::new(format!("Double clicked {}", describe(target))).on(target.id))
            }
            Action::GetText { id } => {
                let target = resolve(*id, elements)?;
                let text = self
                    .on_element(target, |el| async move { self.read_text(&el).await })
                    .await?;
                Ok(Done::new(format!(
                    "Extracted text: '{}'",
                    truncate_chars(&text, SCRIPT_RESULT_CHARS)
                ))
                .on(target.id))
            }
            Action::Scroll { direction, pixels } => {
                let delta = match direction {
                    ScrollDirection::Down => i64::from(*pixels),
                    ScrollDirection::Up => -i64::from(*pixels),
                };
                self.driver
                    .execute_script(scripts::SCROLL_BY, vec![Value::from(delta)])
                    .await?;
                self.settle().await;
                let direction = match direction {
                    ScrollDirection::Down => "down",
                    ScrollDirection::Up => "up",
                };
                Ok(Done::new(format!("Scrolled {} {}px", direction, pixels)))
            }
            Action::Wait { seconds } => {
                let pause = Duration::try_from_secs_f64(*seconds)
                    .unwrap_or(Duration::ZERO)
                    .min(MAX_WAIT);
                tokio::time::sleep(pause).await;
                Ok(Done::new(format!("Waited {} seconds", pause.as_secs_f64())))
            }
            Action::PressKey { key } => {
                self.driver.send_keys_to_active(&key_sequence(key)).await?;
                Ok(Done::new(format!("Pressed {} key", key)))
            }
            Action::TakeScreenshot => {
                let path = self.save_screenshot(elements, "screenshot").await?;
                let mut done = Done::new(format!("Screenshot saved: {}", path.display()));
                done.screenshot = Some(path);
                Ok(done)
            }
            Action::ExecuteScript { script } => {
                let value = self.driver.execute_script(script, Vec::new()).await?;
                let rendered = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Ok(Done::new(format!(
                    "Script executed. Result: {}",
                    truncate_chars(&rendered, SCRIPT_RESULT_CHARS)
                )))
            }
            Action::Refresh => {
                self.driver.refresh().await?;
                self.wait_until_complete(REFRESH_TIMEOUT).await?;
                Ok(Done::new("Page refreshed"))
            }
            Action::GoBack => {
                self.driver.back().await?;
                Ok(Done::new("Navigated back"))
            }
            Action::GoForward => {
                self.driver.forward().await?;
                Ok(Done::new("Navigated forward"))
            }
            Action::Answer { text } => Ok(Done::new(text.clone())),
        }
    }

    async fn navigate(&self, url: &str) -> Result<Done> {
        let url = normalize_url(url);
        self.driver.navigate(&url).await?;
        self.wait_until_complete(self.navigation_timeout).await?;
        let mut done = Done::new(format!("Navigated to {}", url));
        done.visited = Some(url);
        Ok(done)
    }

    /// Bounded wait for `document.readyState == "complete"`
    async fn wait_until_complete(&self, limit: Duration) -> Result<()> {
        let poll = async {
            loop {
                match self.driver.ready_state().await {
                    Ok(state) if state == "complete" => return,
                    Ok(_) => {}
                    Err(e) => debug!("ready state unavailable: {}", e),
                }
                tokio::time::sleep(READY_POLL).await;
            }
        };
        tokio::time::timeout(limit, poll)
            .await
            .map_err(|_| PilotError::timeout("document ready state", limit.as_secs()))
    }

    /// Run `op` on a fresh handle for `target`, inside its frame if needed.
    /// The top-level context is restored before returning, on every path.
    async fn on_element<T, F, Fut>(&self, target: &InteractiveElement, op: F) -> Result<T>
    where
        F: FnOnce(B::Element) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let driver = self.driver.as_ref();
        let scope = FrameScope::enter(driver, target.marker).await?;

        let outcome = match driver
            .find_by_css(&scripts::marker_selector(target.marker))
            .await
        {
            Ok(Some(handle)) => op(handle).await,
            Ok(None) => Err(PilotError::browser(format!(
                "Element {} is no longer in the page",
                target.id
            ))),
            Err(e) => Err(e),
        };

        scope.exit(driver).await;
        outcome
    }

    async fn scroll_into_view(&self, element: &B::Element) -> Result<()> {
        self.driver
            .execute_on_element(scripts::SCROLL_INTO_VIEW, element)
            .await?;
        self.settle().await;
        Ok(())
    }

    async fn settle(&self) {
        if self.pacing.settle_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.pacing.settle_ms)).await;
        }
    }

    async fn click_ladder(&self, element: &B::Element) -> Result<ClickStrategy> {
        let mut last_error = None;
        for strategy in ClickStrategy::LADDER {
            let attempt = async {
                self.scroll_into_view(element).await?;
                self.click_with(strategy, element).await
            };
            match attempt.await {
                Ok(()) => {
                    debug!(strategy = strategy.as_str(), "click succeeded");
                    return Ok(strategy);
                }
                Err(e) => {
                    debug!(strategy = strategy.as_str(), "click strategy failed: {}", e);
                    last_error = Some(e);
                }
            }
        }
        Err(PilotError::browser(format!(
            "All click strategies failed: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn click_with(&self, strategy: ClickStrategy, element: &B::Element) -> Result<()> {
        match strategy {
            ClickStrategy::Direct => self.driver.click(element).await,
            ClickStrategy::Script => self
                .driver
                .execute_on_element(scripts::SCRIPT_CLICK, element)
                .await
                .map(|_| ()),
            ClickStrategy::Pointer => self.driver.pointer_click(element).await,
            ClickStrategy::DispatchedEvent => self
                .driver
                .execute_on_element(scripts::DISPATCH_CLICK, element)
                .await
                .map(|_| ()),
            ClickStrategy::MoveThenClick => {
                self.driver.hover(element).await?;
                self.driver.click(element).await
            }
        }
    }

    async fn type_text(&self, element: &B::Element, text: &str) -> Result<()> {
        self.scroll_into_view(element).await?;
        self.driver.clear(element).await?;
        for ch in text.chars() {
            self.driver.send_keys(element, &ch.to_string()).await?;
            let delay = PacingConfig::pick(self.pacing.keystroke_delay_ms);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }

    /// Visible text, then value, then numeric index. Returns the method used.
    async fn select(&self, element: &B::Element, option: &str) -> Result<&'static str> {
        if self.driver.select_by_label(element, option).await.is_ok() {
            return Ok("visible text");
        }
        let by_value = self.driver.select_by_value(element, option).await;
        if by_value.is_ok() {
            return Ok("value");
        }
        match option.trim().parse::<usize>() {
            Ok(index) => {
                self.driver.select_by_index(element, index).await?;
                Ok("index")
            }
            Err(_) => Err(PilotError::browser(format!("No option matching '{}'", option))),
        }
    }

    /// Rendered text, then `textContent`, then the `value` attribute
    async fn read_text(&self, element: &B::Element) -> Result<String> {
        let text = self.driver.text(element).await?;
        if !text.trim().is_empty() {
            return Ok(text.trim().to_string());
        }
        let content = self
            .driver
            .execute_on_element(scripts::TEXT_CONTENT, element)
            .await?;
        let content = content.as_str().unwrap_or_default().trim();
        if !content.is_empty() {
            return Ok(content.to_string());
        }
        let value = self.driver.attribute(element, "value").await?;
        Ok(value.unwrap_or_default().trim().to_string())
    }

    /// Capture, annotate and save a screenshot; returns the file path
    pub async fn save_screenshot(
        &self,
        elements: &[InteractiveElement],
        prefix: &str,
    ) -> Result<PathBuf> {
        let raw = self.driver.screenshot().await?;
        let url = self.driver.current_url().await.unwrap_or_default();
        let mut elements = elements.to_vec();
        let annotated = self.annotator.annotate(&raw, &mut elements, &url)?;

        tokio::fs::create_dir_all(&self.screenshots_dir).await?;
        let path = self.screenshots_dir.join(format!(
            "{}_{}.png",
            prefix,
            Utc::now().format("%Y%m%d_%H%M%S_%3f")
        ));
        tokio::fs::write(&path, &annotated.png).await?;
        info!(path = %path.display(), "screenshot saved");
        Ok(path)
    }
}

/// Find `id` among the grounded elements of this cycle
pub fn resolve(id: usize, elements: &[InteractiveElement]) -> Result<&InteractiveElement> {
    elements
        .iter()
        .filter(|e| e.is_grounded())
        .find(|e| e.id == id)
        .ok_or_else(|| {
            let available: Vec<usize> = elements
                .iter()
                .filter(|e| e.is_grounded())
                .take(AVAILABLE_IDS_SHOWN)
                .map(|e| e.id)
                .collect();
            PilotError::Other(format!(
                "Element ID {} not found. Available: {:?}",
                id, available
            ))
        })
}

/// Score a form field as the likely target of an untargeted TYPE
pub fn input_score(element: &InteractiveElement) -> f64 {
    let label = element.label.to_lowercase();
    let mut score = 0.0;

    for term in SEARCH_TERMS {
        if label.contains(term) {
            score += 0.3;
        }
    }
    if element.is_visible {
        score += 0.2;
    }
    score += element.confidence_score * 0.3;
    if element.tag == "input" {
        score += 0.1;
    }

    let attributes = [
        element.placeholder.as_deref(),
        element.attribute("name"),
        element.attribute("id"),
        element.attribute("class"),
    ];
    for value in attributes.into_iter().flatten() {
        let value = value.to_lowercase();
        for term in SEARCH_TERMS {
            if value.contains(term) {
                score += 0.2;
            }
        }
    }
    score
}

/// The best-scoring form field, if any
pub fn auto_detect_input(elements: &[InteractiveElement]) -> Option<&InteractiveElement> {
    elements
        .iter()
        .filter(|e| e.is_form_field)
        .map(|e| (e, input_score(e)))
        .filter(|(_, score)| *score > 0.0)
        .fold(None, |best: Option<(&InteractiveElement, f64)>, (e, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((e, score)),
        })
        .map(|(e, _)| e)
}

/// WebDriver key sequence for a key name; unknown names are sent as text
pub fn key_sequence(name: &str) -> String {
    let normalized = name.trim().to_lowercase().replace(['_', ' ', '-'], "");
    let key = match normalized.as_str() {
        "enter" => Key::Enter,
        "return" => Key::Return,
        "tab" => Key::Tab,
        "escape" | "esc" => Key::Escape,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "home" => Key::Home,
        "end" => Key::End,
        "arrowup" | "up" => Key::Up,
        "arrowdown" | "down" => Key::Down,
        "arrowleft" | "left" => Key::Left,
        "arrowright" | "right" => Key::Right,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        _ => return name.to_string(),
    };
    key.to_string()
}

/// Add a scheme to bare hosts such as `example.com`
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") || url.starts_with("about:") || url.starts_with("data:") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

fn describe(element: &InteractiveElement) -> String {
    format!("element {} '{}'", element.id, element.short_label(30))
}

fn frame_note(element: &InteractiveElement) -> &'static str {
    if element.in_frame {
        " (iframe)"
    } else {
        ""
    }
}
