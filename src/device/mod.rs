//! Device module: the capability surface of the controlled machine.
//!
//! The agent never talks to an operating system directly. Screen capture,
//! command parsing and input injection are provided by a [`Device`]
//! implementation owned by a single agent run.

mod annotate;
mod screenshot;

use async_trait::async_trait;
use thiserror::Error;

use crate::actions::{ActionError, ParsedAction};

pub use annotate::{AnnotateError, ImageAnnotator, MarkerAnnotator};
pub use screenshot::{Screenshot, ScreenshotDecodeError};

/// Device errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Failed to capture screenshot: {0}")]
    Capture(String),
    #[error("Failed to execute action: {0}")]
    Execution(String),
    #[error("Failed to parse command: {0}")]
    Parse(#[from] ActionError),
}

/// A controlled device session.
#[async_trait]
pub trait Device: Send + Sync {
    /// Capture the current screen.
    async fn screenshot(&self) -> Result<Screenshot, DeviceError>;

    /// Decode raw model text into actions.
    ///
    /// The default delegates to [`crate::actions::parse_command`].
    async fn parse_command(&self, prediction: &str) -> Result<Vec<ParsedAction>, DeviceError> {
        Ok(crate::actions::parse_command(prediction)?)
    }

    /// Execute one action against a viewport of the given size.
    async fn execute(
        &self,
        action: &ParsedAction,
        viewport_width: u32,
        viewport_height: u32,
    ) -> Result<(), DeviceError>;

    /// Release the session. Must not fail.
    async fn tear_down(&self) {}
}
