//! Scoped iframe context
//!
//! Entering a scope moves the automation context into the frame that owns a
//! marked element. The scope must be closed with [`FrameScope::exit`] once
//! the action has finished, whatever its outcome.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::browser::driver::BrowserDriver;
use crate::browser::scripts;
use crate::core::{PilotError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameLocation {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    frame_index: Option<usize>,
}

/// Automation context for one element action
#[derive(Debug)]
#[must_use = "a frame scope must be exited"]
pub struct FrameScope {
    frame_index: Option<usize>,
}

impl FrameScope {
    /// Switch into the frame owning `marker`, or stay at the top level.
    ///
    /// Fails when the marker is no longer in any reachable document or the
    /// switch itself fails. On failure the context is already restored.
    pub async fn enter<B: BrowserDriver>(driver: &B, marker: usize) -> Result<Self> {
        let raw = driver
            .execute_script(scripts::LOCATE_FRAME, vec![marker.into()])
            .await?;
        let location: FrameLocation = serde_json::from_value(raw)?;

        if !location.found {
            return Err(PilotError::browser(format!(
                "Element marker {} is no longer in the page",
                marker
            )));
        }

        let Some(index) = location.frame_index else {
            return Ok(Self { frame_index: None });
        };

        let frames = driver.find_all_by_css("iframe").await?;
        let frame = frames.get(index).ok_or_else(|| {
            PilotError::browser(format!(
                "Frame {} disappeared ({} frames on page)",
                index,
                frames.len()
            ))
        })?;

        if let Err(e) = driver.switch_to_frame(frame).await {
            let _ = driver.switch_to_default().await;
            return Err(e);
        }

        debug!(frame = index, marker, "switched into iframe");
        Ok(Self {
            frame_index: Some(index),
        })
    }

    /// Return to the top-level document. Never fails; a failed restore is logged.
    pub async fn exit<B: BrowserDriver>(self, driver: &B) {
        if let Some(index) = self.frame_index {
            match driver.switch_to_default().await {
                Ok(()) => debug!(frame = index, "switched back to top-level document"),
                Err(e) => warn!(frame = index, "failed to leave iframe: {}", e),
            }
        }
    }
}
