//! Browser automation seam
//!
//! Everything the agent needs from a remote browser session. The WebDriver
//! implementation lives in [`super::webdriver`]; tests use an in-memory one.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::Result;

/// A remote browser session.
///
/// Element handles are only valid in the frame context they were found in
/// and only until the page changes. Callers look elements up again by their
/// per-cycle marker instead of holding on to handles.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Live element reference
    type Element: Clone + Send + Sync;

    async fn navigate(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// `document.readyState` of the current context
    async fn ready_state(&self) -> Result<String>;

    /// Run a script with JSON arguments and return its JSON result
    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value>;

    /// Run a script with the element as `arguments[0]`
    async fn execute_on_element(&self, script: &str, element: &Self::Element) -> Result<Value>;

    /// PNG bytes of the current viewport
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// First match in the current frame context, `None` when nothing matches
    async fn find_by_css(&self, selector: &str) -> Result<Option<Self::Element>>;

    async fn find_all_by_css(&self, selector: &str) -> Result<Vec<Self::Element>>;

    /// Move the automation context into an iframe element
    async fn switch_to_frame(&self, frame: &Self::Element) -> Result<()>;

    /// Move the automation context back to the top-level document
    async fn switch_to_default(&self) -> Result<()>;

    async fn click(&self, element: &Self::Element) -> Result<()>;

    /// Left click through the low-level pointer actions API
    async fn pointer_click(&self, element: &Self::Element) -> Result<()>;

    async fn hover(&self, element: &Self::Element) -> Result<()>;

    async fn context_click(&self, element: &Self::Element) -> Result<()>;

    async fn double_click(&self, element: &Self::Element) -> Result<()>;

    async fn clear(&self, element: &Self::Element) -> Result<()>;

    async fn send_keys(&self, element: &Self::Element, keys: &str) -> Result<()>;

    /// Send keys to whatever currently has focus
    async fn send_keys_to_active(&self, keys: &str) -> Result<()>;

    async fn select_by_label(&self, element: &Self::Element, label: &str) -> Result<()>;

    async fn select_by_value(&self, element: &Self::Element, value: &str) -> Result<()>;

    async fn select_by_index(&self, element: &Self::Element, index: usize) -> Result<()>;

    /// Rendered text of the element
    async fn text(&self, element: &Self::Element) -> Result<String>;

    async fn attribute(&self, element: &Self::Element, name: &str) -> Result<Option<String>>;

    async fn refresh(&self) -> Result<()>;

    async fn back(&self) -> Result<()>;

    async fn forward(&self) -> Result<()>;

    /// End the session
    async fn quit(&self) -> Result<()>;
}
