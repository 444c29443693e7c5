//! WebDriver session backed by fantoccini
//!
//! Talks to chromedriver (or any W3C WebDriver endpoint) over HTTP.

use async_trait::async_trait;
use fantoccini::actions::{InputSource, MouseActions, PointerAction, MOUSE_BUTTON_LEFT, MOUSE_BUTTON_RIGHT};
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::browser::driver::BrowserDriver;
use crate::browser::scripts;
use crate::core::config::BrowserConfig;
use crate::core::{PilotError, Result};

const POINTER_MOVE: Duration = Duration::from_millis(150);

/// A live WebDriver session
pub struct WebDriverSession {
    client: Client,
}

impl WebDriverSession {
    /// Start a new browser session against the configured endpoint
    pub async fn connect(config: &BrowserConfig) -> Result<Self> {
        let mut builder = ClientBuilder::native();
        builder.capabilities(Self::capabilities(config));

        let client = builder.connect(&config.webdriver_url).await.map_err(|e| {
            debug!("WebDriver connect failed: {}", e);
            PilotError::WebDriverNotReachable(config.webdriver_url.clone())
        })?;

        if let Err(e) = client
            .set_window_size(config.window_width, config.window_height)
            .await
        {
            debug!("Could not resize window: {}", e);
        }

        info!(
            endpoint = %config.webdriver_url,
            headless = config.headless,
            "WebDriver session started"
        );
        Ok(Self { client })
    }

    /// Chrome capabilities for the configured window
    fn capabilities(config: &BrowserConfig) -> Map<String, Value> {
        let mut args = vec![
            Value::String(format!(
                "--window-size={},{}",
                config.window_width, config.window_height
            )),
            Value::String("--disable-blink-features=AutomationControlled".to_string()),
            Value::String("--no-sandbox".to_string()),
            Value::String("--disable-dev-shm-usage".to_string()),
        ];
        if config.headless {
            args.push(Value::String("--headless=new".to_string()));
            args.push(Value::String("--disable-gpu".to_string()));
        }

        let mut chrome_options = Map::new();
        chrome_options.insert("args".to_string(), Value::Array(args));

        let mut capabilities = Map::new();
        capabilities.insert(
            "goog:chromeOptions".to_string(),
            Value::Object(chrome_options),
        );
        capabilities
    }

    async fn pointer(&self, actions: MouseActions) -> Result<()> {
        self.client.perform_actions(actions).await?;
        let _ = self.client.release_actions().await;
        Ok(())
    }

    fn move_to(element: &Element) -> PointerAction {
        PointerAction::MoveToElement {
            element: element.clone(),
            duration: Some(POINTER_MOVE),
            x: 0,
            y: 0,
        }
    }

    fn element_arg(element: &Element) -> Result<Value> {
        Ok(serde_json::to_value(element)?)
    }
}

fn not_found_is_none(result: std::result::Result<Element, CmdError>) -> Result<Option<Element>> {
    match result {
        Ok(element) => Ok(Some(element)),
        Err(e) if e.is_no_such_element() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl BrowserDriver for WebDriverSession {
    type Element = Element;

    async fn navigate(&self, url: &str) -> Result<()> {
        self.client.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.client.title().await?)
    }

    async fn ready_state(&self) -> Result<String> {
        let state = self.client.execute(scripts::READY_STATE, vec![]).await?;
        Ok(state.as_str().unwrap_or_default().to_string())
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        Ok(self.client.execute(script, args).await?)
    }

    async fn execute_on_element(&self, script: &str, element: &Element) -> Result<Value> {
        let arg = Self::element_arg(element)?;
        Ok(self.client.execute(script, vec![arg]).await?)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.client.screenshot().await?)
    }

    async fn find_by_css(&self, selector: &str) -> Result<Option<Element>> {
        not_found_is_none(self.client.find(Locator::Css(selector)).await)
    }

    async fn find_all_by_css(&self, selector: &str) -> Result<Vec<Element>> {
        Ok(self.client.find_all(Locator::Css(selector)).await?)
    }

    async fn switch_to_frame(&self, frame: &Element) -> Result<()> {
        frame.clone().enter_frame().await?;
        Ok(())
    }

    async fn switch_to_default(&self) -> Result<()> {
        self.client.enter_frame(None).await?;
        Ok(())
    }

    async fn click(&self, element: &Element) -> Result<()> {
        element.click().await?;
        Ok(())
    }

    async fn pointer_click(&self, element: &Element) -> Result<()> {
        let actions = MouseActions::new("mouse".to_string())
            .then(Self::move_to(element))
            .then(PointerAction::Down {
                button: MOUSE_BUTTON_LEFT,
            })
            .then(PointerAction::Up {
                button: MOUSE_BUTTON_LEFT,
            });
        self.pointer(actions).await
    }

    async fn hover(&self, element: &Element) -> Result<()> {
        let actions = MouseActions::new("mouse".to_string()).then(Self::move_to(element));
        self.pointer(actions).await
    }

    async fn context_click(&self, element: &Element) -> Result<()> {
        let actions = MouseActions::new("mouse".to_string())
            .then(Self::move_to(element))
            .then(PointerAction::Down {
                button: MOUSE_BUTTON_RIGHT,
            })
            .then(PointerAction::Up {
                button: MOUSE_BUTTON_RIGHT,
            });
        self.pointer(actions).await
    }

    async fn double_click(&self, element: &Element) -> Result<()> {
        let actions = MouseActions::new("mouse".to_string())
            .then(Self::move_to(element))
            .then(PointerAction::Down {
                button: MOUSE_BUTTON_LEFT,
            })
            .then(PointerAction::Up {
                button: MOUSE_BUTTON_LEFT,
            })
            .then(PointerAction::Down {
                button: MOUSE_BUTTON_LEFT,
            })
            .then(PointerAction::Up {
                button: MOUSE_BUTTON_LEFT,
            });
        self.pointer(actions).await
    }

    async fn clear(&self, element: &Element) -> Result<()> {
        element.clear().await?;
        Ok(())
    }

    async fn send_keys(&self, element: &Element, keys: &str) -> Result<()> {
        element.send_keys(keys).await?;
        Ok(())
    }

    async fn send_keys_to_active(&self, keys: &str) -> Result<()> {
        let element = self.client.active_element().await?;
        element.send_keys(keys).await?;
        Ok(())
    }

    async fn select_by_label(&self, element: &Element, label: &str) -> Result<()> {
        element.select_by_label(label).await?;
        Ok(())
    }

    async fn select_by_value(&self, element: &Element, value: &str) -> Result<()> {
        element.select_by_value(value).await?;
        Ok(())
    }

    async fn select_by_index(&self, element: &Element, index: usize) -> Result<()> {
        element.select_by_index(index).await?;
        Ok(())
    }

    async fn text(&self, element: &Element) -> Result<String> {
        Ok(element.text().await?)
    }

    async fn attribute(&self, element: &Element, name: &str) -> Result<Option<String>> {
        Ok(element.attr(name).await?)
    }

    async fn refresh(&self) -> Result<()> {
        self.client.refresh().await?;
        Ok(())
    }

    async fn back(&self) -> Result<()> {
        self.client.back().await?;
        Ok(())
    }

    async fn forward(&self) -> Result<()> {
        self.client.forward().await?;
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        self.client.clone().close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_capabilities() {
        let config = BrowserConfig {
            headless: true,
            ..BrowserConfig::default()
        };
        let caps = WebDriverSession::capabilities(&config);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--headless=new"));
        assert!(args.iter().any(|a| a == "--window-size=1920,1080"));
    }

    #[test]
    fn test_windowed_capabilities() {
        let config = BrowserConfig {
            headless: false,
            ..BrowserConfig::default()
        };
        let caps = WebDriverSession::capabilities(&config);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(!args.iter().any(|a| a == "--headless=new"));
    }

    #[tokio::test]
    #[ignore] // Requires chromedriver on localhost:9515
    async fn test_connect_and_read_title() {
        let session = WebDriverSession::connect(&BrowserConfig::default())
            .await
            .unwrap();
        session.navigate("https://example.com").await.unwrap();
        assert!(session.title().await.unwrap().contains("Example"));
        session.quit().await.unwrap();
    }
}
