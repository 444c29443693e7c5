//! Webpilot - Vision-Guided Web Agent
//!
//! Drives a real browser toward a natural-language objective. Each cycle
//! extracts the interactive elements of the page, draws numbered boxes over a
//! screenshot, asks a local vision model (through Ollama) for the next action
//! and executes it over WebDriver.
//!
//! # Architecture
//!
//! - **Core**: Shared types, actions, configuration, and error handling
//! - **LLM**: LLM provider abstraction with Ollama implementation
//! - **Browser**: WebDriver session, element extraction, annotation, execution
//! - **Agent**: The run loop, decision engine, and session reporting
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use webpilot::{Agent, Config, OllamaClient, WebDriverSession};
//!
//! #[tokio::main]
//! async fn main() -> webpilot::Result<()> {
//!     let config = Config::load();
//!     let driver = Arc::new(WebDriverSession::connect(&config.browser).await?);
//!     let provider = Arc::new(OllamaClient::from_config(&config));
//!
//!     let mut agent = Agent::new(config, driver, provider);
//!     let outcome = agent
//!         .run_objective("open example.com and read the heading", &CancellationToken::new())
//!         .await;
//!     println!("{}: {:?}", outcome.status, outcome.final_answer);
//!     agent.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod browser;
pub mod core;
pub mod llm;

// Re-export commonly used items
pub use agent::{Agent, LoopStatus, ObjectiveOutcome};
pub use browser::{BrowserDriver, WebDriverSession};
pub use core::{Action, Config, Decision, InteractiveElement, PilotError, Result};
pub use llm::{LLMProvider, OllamaClient};
