//! Model capability traits and the request/response types they exchange.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::client::ModelError;
use crate::agent::TurnOrigin;

/// One conversation entry as seen by the vision-language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlmTurn {
    pub from: TurnOrigin,
    pub value: String,
}

/// Everything the VLM needs for one inference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VlmRequest {
    pub conversations: Vec<VlmTurn>,
    /// Base64 screenshots, in the order their placeholders appear.
    pub images: Vec<String>,
}

/// Raw VLM output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VlmResponse {
    pub prediction: String,
    #[serde(default)]
    pub reflections: Vec<String>,
}

impl VlmResponse {
    /// Build a response from raw text, collecting any `Reflection:` sections.
    pub fn from_prediction(prediction: impl Into<String>) -> Self {
        let prediction = prediction.into();
        let reflections = reflection_sections(&prediction)
            .map(|(start, end)| prediction[start..end].trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        Self {
            prediction,
            reflections,
        }
    }
}

/// Vision-language model used to act on screenshots.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Model name reported in progress snapshots.
    fn model_name(&self) -> String;

    async fn invoke(
        &self,
        request: VlmRequest,
        cancel: &CancellationToken,
    ) -> Result<VlmResponse, ModelError>;
}

/// Role of an oracle message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleRole {
    System,
    User,
    Assistant,
}

/// A plain chat message sent to the reasoning oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleMessage {
    pub role: OracleRole,
    pub content: String,
}

impl OracleMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: OracleRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: OracleRole::User,
            content: content.into(),
        }
    }
}

/// Errors from the reasoning oracle share the model error type.
pub type OracleError = ModelError;

/// Text-only reasoning model used to decompose goals.
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    /// Returns the prediction text.
    async fn invoke(&self, messages: &[OracleMessage]) -> Result<String, OracleError>;
}

/// Byte ranges of the text following each `Reflection:` marker, up to the
/// next `Action_Summary:` / `Action:` marker or the end of the text.
fn reflection_sections(text: &str) -> impl Iterator<Item = (usize, usize)> + '_ {
    const MARKER: &str = "Reflection:";
    let mut offset = 0;
    std::iter::from_fn(move || {
        let start = offset + text[offset..].find(MARKER)? + MARKER.len();
        let rest = &text[start..];
        let end = start
            + ["Action_Summary:", "Action:"]
                .iter()
                .filter_map(|m| rest.find(m))
                .min()
                .unwrap_or(rest.len());
        offset = end;
        Some((start, end))
    })
}

/// Human-readable summary of a prediction with reflection sections removed.
pub fn summarize_prediction(prediction: &str) -> String {
    let mut summary = String::with_capacity(prediction.len());
    let mut cursor = 0;
    for (start, end) in reflection_sections(prediction) {
        summary.push_str(&prediction[cursor..start - "Reflection:".len()]);
        cursor = end;
    }
    summary.push_str(&prediction[cursor..]);
    summary.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_strips_reflection() {
        let prediction =
            "Thought: Try again.\nReflection: The last click missed.\nAction: click(start_box='(1,2)')";
        assert_eq!(
            summarize_prediction(prediction),
            "Thought: Try again.\nAction: click(start_box='(1,2)')"
        );
    }

    #[test]
    fn test_summary_without_reflection_is_trimmed() {
        assert_eq!(summarize_prediction("  Action: wait()\n"), "Action: wait()");
    }

    #[test]
    fn test_reflections_collected() {
        let response = VlmResponse::from_prediction(
            "Reflection: Page still loading.\nAction_Summary: wait\nAction: wait()",
        );
        assert_eq!(response.reflections, vec!["Page still loading.".to_string()]);
    }
}
