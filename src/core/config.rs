//! Configuration management for webpilot
//!
//! Supports environment variables, config files, and runtime overrides.
//!
//! Config file location: ~/.config/webpilot/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{PilotError, Result};

/// Main configuration for webpilot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ollama configuration
    pub ollama: OllamaConfig,
    /// Model configuration
    pub models: ModelConfig,
    /// Browser configuration
    pub browser: BrowserConfig,
    /// Agent configuration
    pub agent: AgentConfig,
    /// Human pacing delays
    #[serde(default)]
    pub pacing: PacingConfig,
    /// Streaming configuration
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// Where screenshots, reports and the action log go
    #[serde(default)]
    pub output: OutputConfig,
}

/// Ollama server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Host address (default: localhost)
    pub host: String,
    /// Port number (default: 11434)
    pub port: u16,
    /// Request timeout in seconds; the ceiling for one oracle call
    pub timeout_secs: u64,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Vision model consulted every cycle
    /// Default: qwen3-vl:8b
    pub vision: String,
    /// Sampling temperature for decisions
    pub temperature: f32,
}

/// Browser automation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// WebDriver endpoint (chromedriver, geckodriver, selenium)
    pub webdriver_url: String,
    /// Whether to run the browser without a window
    pub headless: bool,
    /// Window width in pixels
    pub window_width: u32,
    /// Window height in pixels
    pub window_height: u32,
    /// Bounded wait for the document before extraction, in seconds
    pub ready_timeout_secs: u64,
    /// Bounded wait for a navigation to complete, in seconds
    pub navigation_timeout_secs: u64,
}

/// Agent behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Wall-clock budget for one objective
    /// Default: 480 (8 minutes)
    pub objective_timeout_secs: u64,
    /// Consecutive unsuccessful results before the objective is abandoned
    /// Default: 3
    pub max_consecutive_failures: usize,
    /// Maximum elements kept per extraction
    /// Default: 50
    pub max_elements: usize,
    /// Whether to show debug output
    pub debug: bool,
}

/// Human pacing policy. None of these affect correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Randomized delay between cycles, [min, max] in ms
    pub step_delay_ms: (u64, u64),
    /// Randomized delay between typed characters, [min, max] in ms
    pub keystroke_delay_ms: (u64, u64),
    /// Settle delay after scrolling an element into view
    pub settle_ms: u64,
    /// Sleep before retrying an empty extraction
    pub extraction_retry_ms: u64,
}

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Whether to stream oracle responses
    pub enabled: bool,
}

/// Output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for saved screenshots
    pub screenshots_dir: PathBuf,
    /// Directory for session reports
    pub reports_dir: PathBuf,
    /// JSON-lines action log
    pub action_log: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            models: ModelConfig::default(),
            browser: BrowserConfig::default(),
            agent: AgentConfig::default(),
            pacing: PacingConfig::default(),
            streaming: StreamingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("OLLAMA_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(11434),
            timeout_secs: 120,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            vision: env::var("WEBPILOT_VISION_MODEL")
                .unwrap_or_else(|_| "qwen3-vl:8b".to_string()),
            temperature: 0.2,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: env::var("WEBPILOT_WEBDRIVER_URL")
                .unwrap_or_else(|_| "http://localhost:9515".to_string()),
            headless: env::var("WEBPILOT_HEADLESS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            window_width: 1920,
            window_height: 1080,
            ready_timeout_secs: 5,
            navigation_timeout_secs: 15,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            objective_timeout_secs: 480,
            max_consecutive_failures: 3,
            max_elements: 50,
            debug: env::var("WEBPILOT_DEBUG")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: (1500, 2500),
            keystroke_delay_ms: (50, 150),
            settle_ms: 300,
            extraction_retry_ms: 1000,
        }
    }
}

impl PacingConfig {
    /// No delays at all, for tests and batch runs
    pub fn instant() -> Self {
        Self {
            step_delay_ms: (0, 0),
            keystroke_delay_ms: (0, 0),
            settle_ms: 0,
            extraction_retry_ms: 0,
        }
    }

    /// Pick a delay uniformly from an inclusive [min, max] range
    pub fn pick(range: (u64, u64)) -> Duration {
        let (min, max) = range;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::random_range(min..=max))
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: env::var("WEBPILOT_STREAMING")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            screenshots_dir: PathBuf::from("screenshots"),
            reports_dir: PathBuf::from("reports"),
            action_log: PathBuf::from("data").join("actions.jsonl"),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("webpilot")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        if let Ok(config) = Self::load_from_file() {
            return config;
        }

        Self::default()
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        Self::load_from_path(&Self::config_file())
    }

    /// Load configuration from an explicit TOML file
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Err(PilotError::config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = fs::read_to_string(config_path)
            .map_err(|e| PilotError::config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| PilotError::config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to file and return the path
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .map_err(|e| PilotError::config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PilotError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| PilotError::config(format!("Failed to write config: {}", e)))?;

        Ok(config_path)
    }

    /// Get the full Ollama API URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    /// Wall-clock budget for one objective
    pub fn objective_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.objective_timeout_secs)
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ollama.port, 11434);
        assert_eq!(config.agent.objective_timeout_secs, 480);
        assert_eq!(config.agent.max_consecutive_failures, 3);
        assert_eq!(config.agent.max_elements, 50);
        assert_eq!(config.browser.ready_timeout_secs, 5);
        assert_eq!(config.browser.navigation_timeout_secs, 15);
    }

    #[test]
    fn test_ollama_url() {
        let mut config = Config::default();
        config.ollama.host = "localhost".to_string();
        config.ollama.port = 11434;
        assert_eq!(config.ollama_url(), "http://localhost:11434");
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let toml_str = Config::default_config_toml();
        assert!(toml_str.contains("webdriver_url"));
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.pacing.keystroke_delay_ms, (50, 150));
    }

    #[test]
    fn test_instant_pacing_never_sleeps() {
        let pacing = PacingConfig::instant();
        assert_eq!(PacingConfig::pick(pacing.step_delay_ms), Duration::ZERO);
    }

    #[test]
    fn test_pick_stays_in_range() {
        for _ in 0..50 {
            let d = PacingConfig::pick((50, 150));
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_config_dir() {
        let dir = Config::config_dir();
        assert!(dir.to_string_lossy().contains("webpilot"));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webpilot.toml");
        let mut config = Config::default();
        config.agent.max_elements = 12;
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = tokio_test::assert_ok!(Config::load_from_path(&path));
        assert_eq!(loaded.agent.max_elements, 12);
        tokio_test::assert_err!(Config::load_from_path(&dir.path().join("missing.toml")));
    }
}
