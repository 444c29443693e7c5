//! Agent orchestrator
//!
//! Runs the perception-decision-action loop for one objective at a time:
//! extract → annotate → decide → execute, under step and wall-clock budgets
//! with a consecutive-failure circuit breaker.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::agent::action_log::{ActionLog, JsonlActionLog};
use crate::agent::decision::{DecisionEngine, ThinkingIndicator};
use crate::agent::loop_state::{LoopStatus, ObjectiveOutcome, ObjectiveState};
use crate::agent::session::{SessionReport, SessionState};
use crate::browser::extractor::average_confidence;
use crate::browser::{ActionExecutor, BrowserDriver, ElementExtractor, Execution, VisualAnnotator};
use crate::core::config::PacingConfig;
use crate::core::{Action, ActionResult, Config, InteractiveElement, Result};
use crate::llm::LLMProvider;

/// Top-level domains recognised in bare host names
const BARE_HOST_TLDS: [&str; 9] = [
    ".com", ".org", ".net", ".io", ".dev", ".ai", ".co.uk", ".edu", ".gov",
];

/// Snapshot of the current page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub url: String,
    pub title: String,
    pub total_elements: usize,
    pub visible_elements: usize,
    pub form_fields: usize,
    pub clickable_elements: usize,
    pub average_confidence: f64,
    pub ready_state: String,
}

/// What shutdown produced
#[derive(Debug, Clone)]
pub struct ShutdownSummary {
    pub report: SessionReport,
    pub report_path: Option<PathBuf>,
    pub screenshot_path: Option<PathBuf>,
}

/// The web agent: one browser session, one objective at a time
pub struct Agent<B: BrowserDriver> {
    config: Config,
    driver: Arc<B>,
    extractor: ElementExtractor,
    annotator: VisualAnnotator,
    engine: DecisionEngine,
    executor: ActionExecutor<B>,
    action_log: Arc<dyn ActionLog>,
    session: SessionState,
    /// Elements of the current cycle, ids as shown to the oracle
    elements: Vec<InteractiveElement>,
}

impl<B: BrowserDriver> Agent<B> {
    pub fn new(config: Config, driver: Arc<B>, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            extractor: ElementExtractor::from_config(&config),
            annotator: VisualAnnotator::new(),
            engine: DecisionEngine::new(provider, &config),
            executor: ActionExecutor::new(Arc::clone(&driver), &config),
            action_log: Arc::new(JsonlActionLog::new(config.output.action_log.clone())),
            session: SessionState::new(),
            elements: Vec::new(),
            driver,
            config,
        }
    }

    pub fn with_action_log(mut self, log: Arc<dyn ActionLog>) -> Self {
        self.action_log = log;
        self
    }

    pub fn with_indicator(mut self, indicator: Arc<dyn ThinkingIndicator>) -> Self {
        self.engine = self.engine.with_indicator(indicator);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Elements of the most recent cycle
    pub fn elements(&self) -> &[InteractiveElement] {
        &self.elements
    }

    /// Pursue `objective` until a terminal status. Cancellation is checked
    /// between cycles and during the pacing delay.
    pub async fn run_objective(
        &mut self,
        objective: &str,
        cancel: &CancellationToken,
    ) -> ObjectiveOutcome {
        let mut state = ObjectiveState::new(
            objective,
            self.config.objective_timeout(),
            self.config.agent.max_consecutive_failures,
        );
        state.start();
        info!(
            objective,
            model = self.engine.model(),
            max_steps = state.max_steps,
            timeout_secs = state.timeout.as_secs(),
            "starting objective"
        );

        if !cancel.is_cancelled() {
            self.bootstrap(&mut state).await;
        }

        loop {
            if cancel.is_cancelled() {
                state.halt(LoopStatus::Interrupted);
                break;
            }
            if !state.begin_step() {
                break;
            }

            if let Err(e) = self.step(&mut state).await {
                error!(step = state.step, "cycle failed: {}", e);
                state.record_failure(format!("Cycle failed: {}", e));
            }

            if state.status != LoopStatus::Running {
                break;
            }

            let delay = PacingConfig::pick(self.config.pacing.step_delay_ms);
            tokio::select! {
                _ = cancel.cancelled() => {
                    state.halt(LoopStatus::Interrupted);
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if let Err(e) = self.executor.save_screenshot(&self.elements, "objective").await {
            warn!("Failed to save objective screenshot: {}", e);
        }

        let outcome = state.outcome();
        info!(
            status = %outcome.status,
            steps = outcome.steps,
            elapsed_secs = outcome.elapsed_seconds,
            "objective finished"
        );
        self.session.objectives.push(outcome.clone());
        outcome
    }

    /// Navigate to a URL named in the objective when the page is blank
    async fn bootstrap(&mut self, state: &mut ObjectiveState) {
        let current = self.driver.current_url().await.unwrap_or_default();
        if !is_blank_page(&current) {
            return;
        }
        let Some(url) = extract_url(&state.objective) else {
            return;
        };

        info!(%url, "opening URL from objective");
        let execution = self
            .executor
            .execute(&Action::Navigate { url }, &self.elements)
            .await;
        let result = self.absorb(execution).await;
        state.last_feedback = result.message;
        if !result.success {
            state.halt(LoopStatus::Failed);
        }
    }

    /// One extract → annotate → decide → execute cycle
    async fn step(&mut self, state: &mut ObjectiveState) -> Result<()> {
        let mut elements = self.perceive().await;

        let screenshot = self.driver.screenshot().await?;
        let url = self.driver.current_url().await.unwrap_or_default();
        let annotated = self.annotator.annotate(&screenshot, &mut elements, &url)?;

        info!(
            step = state.step,
            max_steps = state.max_steps,
            elements = annotated.annotated,
            avg_confidence = average_confidence(&elements),
            "cycle"
        );
        self.elements = elements;

        let decision = self
            .engine
            .decide(
                &state.objective,
                &annotated.png,
                &self.elements,
                &state.last_feedback,
            )
            .await;

        let execution = self.executor.execute(&decision.action, &self.elements).await;
        let terminal = execution.terminal;
        let result = self.absorb(execution).await;
        if decision.fallback {
            // the pause ran, but the oracle gave nothing to act on
            state.record_failure(decision.thought);
        } else {
            state.record(&result, terminal);
        }
        Ok(())
    }

    /// Extract elements, retrying once after a short pause when none are found
    async fn perceive(&self) -> Vec<InteractiveElement> {
        let elements = self.extractor.extract(self.driver.as_ref()).await;
        if !elements.is_empty() {
            return elements;
        }

        debug!("no elements found, retrying extraction");
        let retry = std::time::Duration::from_millis(self.config.pacing.extraction_retry_ms);
        tokio::time::sleep(retry).await;
        let elements = self.extractor.extract(self.driver.as_ref()).await;
        if elements.is_empty() {
            warn!("no interactive elements on the page");
        }
        elements
    }

    /// Apply an execution to the session, the cache and the action log
    async fn absorb(&mut self, execution: Execution) -> ActionResult {
        let Execution {
            result,
            visited,
            invalidates_cache,
            ..
        } = execution;

        if result.success {
            info!(action = %result.action_kind, "{}", result.message);
        } else {
            warn!(action = %result.action_kind, "{}", result.message);
        }

        if let Some(destination) = visited {
            self.session.visit(destination);
        }
        if invalidates_cache {
            self.elements.clear();
        }
        if let Err(e) = self.action_log.append(&result).await {
            warn!("Failed to write action log: {}", e);
        }
        self.session.record(result.clone());
        result
    }

    /// URL, title, element counts and ready state of the current page
    pub async fn page_info(&self) -> Result<PageInfo> {
        Ok(PageInfo {
            url: self.driver.current_url().await?,
            title: self.driver.title().await?,
            total_elements: self.elements.len(),
            visible_elements: self.elements.iter().filter(|e| e.is_visible).count(),
            form_fields: self.elements.iter().filter(|e| e.is_form_field).count(),
            clickable_elements: self.elements.iter().filter(|e| e.is_clickable).count(),
            average_confidence: average_confidence(&self.elements),
            ready_state: self.driver.ready_state().await?,
        })
    }

    /// Save a final screenshot, write the session report and end the browser
    /// session. Each step is best effort.
    pub async fn shutdown(&mut self) -> ShutdownSummary {
        self.session.finish();

        let screenshot_path = match self.executor.save_screenshot(&self.elements, "final").await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to save final screenshot: {}", e);
                None
            }
        };

        let report = self.session.report();
        let report_path = match report.write_to(&self.config.output.reports_dir).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to write session report: {}", e);
                None
            }
        };

        if let Err(e) = self.driver.quit().await {
            warn!("Failed to close browser session: {}", e);
        }

        info!(
            total = report.total_actions,
            success_rate = report.success_rate,
            visited = report.visited_count,
            "session closed"
        );

        ShutdownSummary {
            report,
            report_path,
            screenshot_path,
        }
    }
}

/// A page with nothing loaded yet
pub fn is_blank_page(url: &str) -> bool {
    let url = url.trim();
    url.is_empty()
        || url == "about:blank"
        || url == "data:,"
        || url.starts_with("chrome://newtab")
        || url.starts_with("chrome://new-tab-page")
}

/// First URL mentioned in free text: full URLs, then `www.` hosts, then
/// bare hosts with a common TLD. A scheme is added when missing.
pub fn extract_url(text: &str) -> Option<String> {
    let tokens: Vec<&str> = text
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| matches!(c, '"' | '\'' | '(' | ')' | '<' | '>' | ',' | ';')))
        .map(|t| t.trim_end_matches(['.', '!', '?', ':']))
        .filter(|t| !t.is_empty())
        .collect();

    let full = tokens.iter().find(|t| {
        let lower = t.to_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    });
    if let Some(candidate) = full {
        return validated(candidate);
    }

    let www = tokens
        .iter()
        .find(|t| t.to_lowercase().starts_with("www.") && t[4..].contains('.'));
    if let Some(candidate) = www {
        return validated(&format!("https://{}", candidate));
    }

    tokens
        .iter()
        .find(|t| is_bare_host(t))
        .and_then(|candidate| validated(&format!("https://{}", candidate)))
}

fn is_bare_host(token: &str) -> bool {
    let host = token.split('/').next().unwrap_or_default().to_lowercase();
    !host.starts_with('.')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        && BARE_HOST_TLDS.iter().any(|tld| host.ends_with(tld))
}

fn validated(candidate: &str) -> Option<String> {
    Url::parse(candidate)
        .ok()
        .filter(|u| u.host_str().is_some())
        .map(|_| candidate.to_string())
}
