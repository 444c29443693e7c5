//! Session state and the session report
//!
//! One `SessionState` per agent instance. The run loop is its only writer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::agent::loop_state::ObjectiveOutcome;
use crate::core::{ActionResult, Result};

/// Actions included in the report tail
pub const RECENT_ACTIONS: usize = 20;

#[derive(Debug, Clone)]
pub struct SessionState {
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_actions: usize,
    pub successful_actions: usize,
    pub visited: BTreeSet<String>,
    /// Every action result, in execution order
    pub history: Vec<ActionResult>,
    pub objectives: Vec<ObjectiveOutcome>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            ended_at: None,
            total_actions: 0,
            successful_actions: 0,
            visited: BTreeSet::new(),
            history: Vec::new(),
            objectives: Vec::new(),
        }
    }

    pub fn record(&mut self, result: ActionResult) {
        self.total_actions += 1;
        if result.success {
            self.successful_actions += 1;
        }
        self.history.push(result);
    }

    pub fn visit(&mut self, destination: impl Into<String>) {
        self.visited.insert(destination.into());
    }

    /// Percentage of successful actions, 0 when nothing ran
    pub fn success_rate(&self) -> f64 {
        if self.total_actions == 0 {
            0.0
        } else {
            self.successful_actions as f64 / self.total_actions as f64 * 100.0
        }
    }

    /// Mark the session finished
    pub fn finish(&mut self) {
        if self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn report(&self) -> SessionReport {
        let ended_at = self.ended_at.unwrap_or_else(Utc::now);
        let average_action_seconds = if self.history.is_empty() {
            0.0
        } else {
            self.history.iter().map(|r| r.duration_seconds).sum::<f64>()
                / self.history.len() as f64
        };
        let skip = self.history.len().saturating_sub(RECENT_ACTIONS);

        SessionReport {
            started_at: self.started_at,
            ended_at,
            duration_seconds: (ended_at - self.started_at)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
            total_actions: self.total_actions,
            successful_actions: self.successful_actions,
            failed_actions: self.total_actions - self.successful_actions,
            success_rate: self.success_rate(),
            visited_count: self.visited.len(),
            visited: self.visited.iter().cloned().collect(),
            average_action_seconds,
            objectives: self.objectives.clone(),
            recent_actions: self.history[skip..].to_vec(),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of a session for reporting collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub total_actions: usize,
    pub successful_actions: usize,
    pub failed_actions: usize,
    /// Percentage, 0 to 100
    pub success_rate: f64,
    pub visited_count: usize,
    pub visited: Vec<String>,
    pub average_action_seconds: f64,
    pub objectives: Vec<ObjectiveOutcome>,
    pub recent_actions: Vec<ActionResult>,
}

impl SessionReport {
    /// Write the report as pretty JSON into `dir`, returning the file path
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!(
            "session_{}.json",
            self.ended_at.format("%Y%m%d_%H%M%S")
        ));
        let body = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, body).await?;
        info!(path = %path.display(), "session report written");
        Ok(path)
    }
}
