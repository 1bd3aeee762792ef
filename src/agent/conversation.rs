//! Instruction-scoped conversation log with a delivery cursor.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::actions::ParsedAction;
use crate::device::Screenshot;

/// Text value of a turn that carries a screenshot.
pub const IMAGE_PLACEHOLDER: &str = "<image>";

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnOrigin {
    Human,
    Gpt,
}

/// Wall-clock timing of a turn, in Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub start: i64,
    pub end: i64,
    pub cost: i64,
}

impl Timing {
    /// Timing from `start` until now.
    pub fn since(start: i64) -> Self {
        let end = now_millis();
        Self {
            start,
            end,
            cost: end - start,
        }
    }

    /// Zero-length timing at the current instant.
    pub fn instant() -> Self {
        Self::since(now_millis())
    }
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Viewport size a screenshot was taken at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotContext {
    pub width: u32,
    pub height: u32,
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub from: TurnOrigin,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_context: Option<ScreenshotContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_base64_with_element_marker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_parsed: Option<Vec<ParsedAction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflections: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
}

impl Turn {
    /// A human text turn.
    pub fn human(value: impl Into<String>) -> Self {
        Self {
            from: TurnOrigin::Human,
            value: value.into(),
            screenshot_base64: None,
            screenshot_context: None,
            screenshot_base64_with_element_marker: None,
            prediction_parsed: None,
            reflections: None,
            timing: Some(Timing::instant()),
        }
    }

    /// A human turn carrying a screenshot.
    pub fn screenshot(screenshot: &Screenshot, timing: Timing) -> Self {
        Self {
            screenshot_base64: Some(screenshot.base64.clone()),
            screenshot_context: Some(ScreenshotContext {
                width: screenshot.width,
                height: screenshot.height,
            }),
            timing: Some(timing),
            ..Self::human(IMAGE_PLACEHOLDER)
        }
    }

    /// An agent turn with the model's interpretation of the screen.
    pub fn agent(
        summary: impl Into<String>,
        context: ScreenshotContext,
        annotated: Option<String>,
        actions: Vec<ParsedAction>,
        reflections: Vec<String>,
        timing: Timing,
    ) -> Self {
        Self {
            from: TurnOrigin::Gpt,
            value: summary.into(),
            screenshot_base64: None,
            screenshot_context: Some(context),
            screenshot_base64_with_element_marker: annotated,
            prediction_parsed: Some(actions),
            reflections: Some(reflections),
            timing: Some(timing),
        }
    }

    /// Whether this turn is a screenshot with image data.
    pub fn has_screenshot(&self) -> bool {
        self.value == IMAGE_PLACEHOLDER && self.screenshot_base64.is_some()
    }
}

/// Append-only ordered record of turns for the current instruction.
///
/// Also tracks the last index handed to observers so that every turn is
/// delivered exactly once.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    turns: Vec<Turn>,
    delivered: Option<usize>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn to the end of the log.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Turns with index greater than `since`, and the new cursor.
    ///
    /// The cursor is the index of the last turn, or `since` unchanged if
    /// nothing was appended after it.
    pub fn snapshot(&self, since: Option<usize>) -> (Vec<Turn>, Option<usize>) {
        let start = since.map_or(0, |i| i + 1);
        if start >= self.turns.len() {
            return (Vec::new(), since);
        }
        (self.turns[start..].to_vec(), Some(self.turns.len() - 1))
    }

    /// Turns not yet delivered, advancing the internal cursor past them.
    pub fn take_undelivered(&mut self) -> Vec<Turn> {
        let (turns, cursor) = self.snapshot(self.delivered);
        self.delivered = cursor;
        turns
    }

    /// Clear all turns and forget what was delivered.
    pub fn reset(&mut self) {
        self.turns.clear();
        self.delivered = None;
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Base64 screenshots in log order.
    pub fn screenshots(&self) -> Vec<String> {
        self.turns
            .iter()
            .filter(|t| t.has_screenshot())
            .filter_map(|t| t.screenshot_base64.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(turns: &[Turn]) -> Vec<&str> {
        turns.iter().map(|t| t.value.as_str()).collect()
    }

    #[test]
    fn test_snapshot_partitions_log() {
        let mut log = ConversationLog::new();
        let mut delivered = Vec::new();
        let mut cursor = None;

        log.append(Turn::human("a"));
        let (turns, next) = log.snapshot(cursor);
        delivered.extend(turns);
        cursor = next;

        log.append(Turn::human("b"));
        log.append(Turn::human("c"));
        let (turns, next) = log.snapshot(cursor);
        delivered.extend(turns);
        cursor = next;

        log.append(Turn::human("d"));
        let (turns, next) = log.snapshot(cursor);
        delivered.extend(turns);
        cursor = next;

        assert_eq!(values(&delivered), vec!["a", "b", "c", "d"]);
        assert_eq!(cursor, Some(3));
    }

    #[test]
    fn test_snapshot_idempotent_without_append() {
        let mut log = ConversationLog::new();
        assert_eq!(log.snapshot(None), (Vec::new(), None));

        log.append(Turn::human("a"));
        let (_, cursor) = log.snapshot(None);
        let first = log.snapshot(cursor);
        let second = log.snapshot(cursor);
        assert!(first.0.is_empty());
        assert_eq!(first, second);
        assert_eq!(first.1, Some(0));
    }

    #[test]
    fn test_take_undelivered_and_reset() {
        let mut log = ConversationLog::new();
        log.append(Turn::human("a"));
        log.append(Turn::human("b"));
        assert_eq!(values(&log.take_undelivered()), vec!["a", "b"]);
        assert!(log.take_undelivered().is_empty());

        log.reset();
        assert!(log.is_empty());
        log.append(Turn::human("c"));
        assert_eq!(values(&log.take_undelivered()), vec!["c"]);
    }

    #[test]
    fn test_screenshots_in_order() {
        let mut log = ConversationLog::new();
        log.append(Turn::human("instruction"));
        log.append(Turn::screenshot(&Screenshot::new("one", 10, 10), Timing::instant()));
        log.append(Turn::human(IMAGE_PLACEHOLDER));
        log.append(Turn::screenshot(&Screenshot::new("two", 10, 10), Timing::instant()));
        assert_eq!(log.screenshots(), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_turn_serializes_camel_case() {
        let turn = Turn::screenshot(&Screenshot::new("img", 4, 3), Timing::instant());
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value["from"], "human");
        assert_eq!(value["screenshotBase64"], "img");
        assert_eq!(value["screenshotContext"]["width"], 4);
        assert!(value.get("predictionParsed").is_none());
    }
}
