//! Webpilot - Vision-Guided Web Agent
//!
//! Main entry point for the CLI application.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use webpilot::core::config::PacingConfig;
use webpilot::{Agent, Config, LLMProvider, LoopStatus, OllamaClient, PilotError, WebDriverSession};

/// Webpilot - drive a browser toward an objective with a local vision model
#[derive(Parser, Debug)]
#[command(name = "webpilot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Objective to pursue; repeat to run several in order
    #[arg(long = "objective", short = 'o', required_unless_present = "print_config")]
    objectives: Vec<String>,

    /// Vision model served by Ollama
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// WebDriver endpoint
    #[arg(long, short = 'w')]
    webdriver_url: Option<String>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Disable human pacing delays
    #[arg(long)]
    instant: bool,

    /// Disable streaming oracle responses
    #[arg(long)]
    no_stream: bool,

    /// Path to a TOML config file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'd')]
    debug: bool,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", Config::default_config_toml());
        return Ok(());
    }

    // Build configuration
    let mut config = match &args.config {
        Some(path) => {
            let _ = dotenvy::dotenv();
            Config::load_from_path(path)?
        }
        None => Config::load(),
    };

    // Apply CLI overrides
    if let Some(ref model) = args.model {
        config.models.vision = model.clone();
    }
    if let Some(ref url) = args.webdriver_url {
        config.browser.webdriver_url = url.clone();
    }
    if args.headless {
        config.browser.headless = true;
    }
    if args.instant {
        config.pacing = PacingConfig::instant();
    }
    if args.no_stream {
        config.streaming.enabled = false;
    }
    if args.debug {
        config.agent.debug = true;
    }

    let default_filter = if config.agent.debug {
        "webpilot=debug"
    } else {
        "webpilot=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let provider = Arc::new(OllamaClient::from_config(&config));
    match provider.is_model_available(&config.models.vision).await {
        Ok(true) => {}
        Ok(false) => return Err(PilotError::ModelNotFound(config.models.vision.clone()).into()),
        Err(e) => warn!("Could not check model availability: {}", e),
    }

    let driver = Arc::new(WebDriverSession::connect(&config.browser).await?);
    info!(
        webdriver = %config.browser.webdriver_url,
        model = %config.models.vision,
        "browser session ready"
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            interrupt.cancel();
        }
    });

    let mut agent = Agent::new(config, driver, provider);
    let mut all_completed = true;

    for objective in &args.objectives {
        let outcome = agent.run_objective(objective, &cancel).await;
        match outcome.status {
            LoopStatus::Completed => {
                println!(
                    "✓ {} ({} steps)\n{}",
                    outcome.objective,
                    outcome.steps,
                    outcome.final_answer.as_deref().unwrap_or_default()
                );
            }
            status => {
                all_completed = false;
                error!(%status, steps = outcome.steps, "{}", outcome.last_feedback);
                println!("✗ {} [{}]", outcome.objective, status);
            }
        }
        if cancel.is_cancelled() {
            break;
        }
    }

    let summary = agent.shutdown().await;
    println!(
        "Actions: {} ({:.1}% successful), pages visited: {}",
        summary.report.total_actions, summary.report.success_rate, summary.report.visited_count
    );
    if let Some(path) = summary.report_path {
        println!("Report: {}", path.display());
    }

    if !all_completed {
        std::process::exit(1);
    }
    Ok(())
}
