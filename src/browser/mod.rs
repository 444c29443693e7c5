//! Browser module - perception and action
//!
//! The driver seam, a fantoccini WebDriver session, element extraction,
//! screenshot annotation and the frame-aware executor.

pub mod annotator;
pub mod driver;
pub mod executor;
pub mod extractor;
pub mod frame;
pub mod scripts;
pub mod webdriver;

pub use annotator::{AnnotatedScreenshot, VisualAnnotator};
pub use driver::BrowserDriver;
pub use executor::{ActionExecutor, ClickStrategy, Execution};
pub use extractor::ElementExtractor;
pub use frame::FrameScope;
pub use webdriver::WebDriverSession;
