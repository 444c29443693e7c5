//! Live browser tasks
//!
//! Need a WebDriver server (chromedriver on port 9515 by default) and a
//! running Ollama with the configured vision model.
//! Run with: cargo test --test browser_tasks -- --ignored

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use webpilot::browser::{ElementExtractor, WebDriverSession};
use webpilot::core::config::PacingConfig;
use webpilot::{Agent, BrowserDriver, Config, LLMProvider, LoopStatus, OllamaClient};

fn live_config() -> Config {
    let mut config = Config::load();
    config.browser.headless = true;
    config.pacing = PacingConfig::instant();
    config.agent.objective_timeout_secs = 180;
    config
}

/// Helper to connect a browser, skipping when no WebDriver is listening
async fn connect(config: &Config) -> Option<Arc<WebDriverSession>> {
    match WebDriverSession::connect(&config.browser).await {
        Ok(session) => Some(Arc::new(session)),
        Err(e) => {
            eprintln!("Skipping test: {}", e);
            None
        }
    }
}

#[tokio::test]
#[ignore] // Requires a WebDriver server
async fn test_extract_example_com() {
    let config = live_config();
    let Some(driver) = connect(&config).await else {
        return;
    };

    driver.navigate("https://example.com").await.unwrap();
    let elements = ElementExtractor::from_config(&config)
        .extract(driver.as_ref())
        .await;
    driver.quit().await.unwrap();

    assert!(elements.iter().any(|e| e.tag == "a"));
    assert!(elements.iter().all(|e| e.id >= 1));
}

#[tokio::test]
#[ignore] // Requires a WebDriver server and Ollama
async fn test_read_heading_of_example_com() {
    let config = live_config();
    let provider = Arc::new(OllamaClient::from_config(&config));
    if !provider
        .is_model_available(&config.models.vision)
        .await
        .unwrap_or(false)
    {
        eprintln!("Skipping test: model {} not available", config.models.vision);
        return;
    }
    let Some(driver) = connect(&config).await else {
        return;
    };

    let mut agent = Agent::new(config, driver, provider);
    let outcome = timeout(
        Duration::from_secs(240),
        agent.run_objective(
            "Open https://example.com and answer with the main heading text",
            &CancellationToken::new(),
        ),
    )
    .await;
    agent.shutdown().await;

    let outcome = outcome.expect("Task timed out");
    assert_eq!(outcome.status, LoopStatus::Completed);
    assert!(outcome
        .final_answer
        .unwrap_or_default()
        .to_lowercase()
        .contains("example domain"));
}
