//! Agent status and the progress snapshots pushed to observers.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::conversation::Turn;

/// Agent status state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Init,
    Running,
    End,
    MaxLoop,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentStatus::Init => "init",
            AgentStatus::Running => "running",
            AgentStatus::End => "end",
            AgentStatus::MaxLoop => "max_loop",
        };
        f.write_str(name)
    }
}

/// How the model is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    #[default]
    Agent,
}

/// Snapshot format version.
pub const SNAPSHOT_VERSION: &str = "v1";

/// Point-in-time view of a run: metadata, status, and newly appended turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub version: String,
    pub system_prompt: String,
    /// The goal of the run.
    pub instruction: String,
    pub model_name: String,
    pub mode: AgentMode,
    pub status: AgentStatus,
    /// Run start, Unix milliseconds.
    pub log_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    /// Turns not included in any earlier snapshot.
    pub conversations: Vec<Turn>,
}

/// Callback receiving snapshots in emission order.
pub type ProgressCallback = Box<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// A callback that forwards snapshots into an unbounded channel.
///
/// Snapshots sent after the receiver is dropped are discarded.
pub fn progress_channel() -> (ProgressCallback, mpsc::UnboundedReceiver<ProgressSnapshot>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: ProgressCallback = Box::new(move |snapshot| {
        if tx.send(snapshot).is_err() {
            tracing::debug!("Progress receiver dropped");
        }
    });
    (callback, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(AgentStatus::MaxLoop).unwrap(),
            serde_json::json!("max_loop")
        );
        assert_eq!(AgentStatus::default(), AgentStatus::Init);
        assert_eq!(AgentStatus::End.to_string(), "end");
        assert_eq!(
            serde_json::to_value(AgentMode::default()).unwrap(),
            serde_json::json!("agent")
        );
    }

    #[tokio::test]
    async fn test_progress_channel_delivers_in_order() {
        let (callback, mut rx) = progress_channel();
        for status in [AgentStatus::Running, AgentStatus::End] {
            callback(ProgressSnapshot {
                version: SNAPSHOT_VERSION.to_string(),
                system_prompt: String::new(),
                instruction: "goal".to_string(),
                model_name: "m".to_string(),
                mode: AgentMode::Agent,
                status,
                log_time: 0,
                err_msg: None,
                conversations: Vec::new(),
            });
        }
        assert_eq!(rx.recv().await.unwrap().status, AgentStatus::Running);
        assert_eq!(rx.recv().await.unwrap().status, AgentStatus::End);
    }
}
