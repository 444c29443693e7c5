//! Objective loop state
//!
//! Budgets, the consecutive-failure circuit breaker and the terminal status
//! of one objective.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::core::ActionResult;

/// Where an objective is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopStatus {
    Idle,
    Running,
    Completed,
    TimedOut,
    StepLimitReached,
    Failed,
    Interrupted,
}

impl LoopStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoopStatus::Idle | LoopStatus::Running)
    }
}

impl fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopStatus::Idle => "IDLE",
            LoopStatus::Running => "RUNNING",
            LoopStatus::Completed => "COMPLETED",
            LoopStatus::TimedOut => "TIMED_OUT",
            LoopStatus::StepLimitReached => "STEP_LIMIT_REACHED",
            LoopStatus::Failed => "FAILED",
            LoopStatus::Interrupted => "INTERRUPTED",
        };
        f.write_str(s)
    }
}

/// Step budget from objective length: a rough proxy for complexity
pub fn max_steps_for(objective: &str) -> usize {
    match objective.split_whitespace().count() {
        0..=5 => 100,
        6..=15 => 200,
        _ => 500,
    }
}

/// Mutable state of one objective run
#[derive(Debug, Clone)]
pub struct ObjectiveState {
    pub objective: String,
    /// Steps started so far
    pub step: usize,
    pub max_steps: usize,
    pub timeout: Duration,
    pub consecutive_failures: usize,
    pub max_consecutive_failures: usize,
    /// Message of the most recent result, fed to the next decision
    pub last_feedback: String,
    pub status: LoopStatus,
    pub final_answer: Option<String>,
    started: Instant,
}

impl ObjectiveState {
    pub fn new(objective: impl Into<String>, timeout: Duration, max_consecutive_failures: usize) -> Self {
        let objective = objective.into();
        Self {
            max_steps: max_steps_for(&objective),
            objective,
            step: 0,
            timeout,
            consecutive_failures: 0,
            max_consecutive_failures,
            last_feedback: "No previous action".to_string(),
            status: LoopStatus::Idle,
            final_answer: None,
            started: Instant::now(),
        }
    }

    /// Enter RUNNING and start the wall clock
    pub fn start(&mut self) {
        self.status = LoopStatus::Running;
        self.started = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop with `status` unless already stopped
    pub fn halt(&mut self, status: LoopStatus) {
        if !self.status.is_terminal() {
            self.status = status;
        }
    }

    /// Check the budgets before starting a step. Returns true when another
    /// step may run; otherwise the status is set.
    pub fn begin_step(&mut self) -> bool {
        if self.status != LoopStatus::Running {
            return false;
        }
        if self.elapsed() >= self.timeout {
            self.halt(LoopStatus::TimedOut);
            return false;
        }
        if self.step >= self.max_steps {
            self.halt(LoopStatus::StepLimitReached);
            return false;
        }
        self.step += 1;
        true
    }

    /// Fold one action result into the counters
    pub fn record(&mut self, result: &ActionResult, terminal: bool) {
        self.last_feedback = result.message.clone();

        if terminal && result.success {
            self.final_answer = Some(result.message.clone());
            self.halt(LoopStatus::Completed);
            return;
        }

        if result.success {
            self.consecutive_failures = 0;
        } else {
            self.record_failure(result.message.clone());
        }
    }

    /// Count a failure that produced no action result
    pub fn record_failure(&mut self, feedback: impl Into<String>) {
        self.last_feedback = feedback.into();
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.max_consecutive_failures {
            self.halt(LoopStatus::Failed);
        }
    }

    pub fn outcome(&self) -> ObjectiveOutcome {
        ObjectiveOutcome {
            objective: self.objective.clone(),
            status: self.status,
            steps: self.step,
            max_steps: self.max_steps,
            elapsed_seconds: self.elapsed().as_secs_f64(),
            final_answer: self.final_answer.clone(),
            last_feedback: self.last_feedback.clone(),
        }
    }
}

/// Summary handed back to the caller of the run loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveOutcome {
    pub objective: String,
    pub status: LoopStatus,
    pub steps: usize,
    pub max_steps: usize,
    pub elapsed_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    pub last_feedback: String,
}
