//! Parsed UI actions and the default command parser for model output.
//!
//! Model predictions follow the UI-TARS layout:
//!
//! ```text
//! Thought: The search box is at the top of the page.
//! Action: click(start_box='(235,512)')
//! ```
//!
//! Box coordinates are emitted on a 0-1000 grid and are stored here as
//! relative points in the `[0, 1]` range.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default grid size used by the model for box coordinates.
pub const DEFAULT_COORDINATE_FACTOR: f64 = 1000.0;

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid number regex"));

/// Action parsing errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Every action discriminant the agent understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Click,
    LeftClick,
    LeftDouble,
    DoubleClick,
    RightSingle,
    RightClick,
    MiddleClick,
    Drag,
    LeftClickDrag,
    Hotkey,
    Key,
    Type,
    Scroll,
    MouseMove,
    Wait,
    Finished,
    CallUser,
    ErrorEnv,
    MaxLoop,
    Screenshot,
}

impl ActionType {
    /// Wire name of the action, as produced by the model.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Click => "click",
            ActionType::LeftClick => "left_click",
            ActionType::LeftDouble => "left_double",
            ActionType::DoubleClick => "double_click",
            ActionType::RightSingle => "right_single",
            ActionType::RightClick => "right_click",
            ActionType::MiddleClick => "middle_click",
            ActionType::Drag => "drag",
            ActionType::LeftClickDrag => "left_click_drag",
            ActionType::Hotkey => "hotkey",
            ActionType::Key => "key",
            ActionType::Type => "type",
            ActionType::Scroll => "scroll",
            ActionType::MouseMove => "mouse_move",
            ActionType::Wait => "wait",
            ActionType::Finished => "finished",
            ActionType::CallUser => "call_user",
            ActionType::ErrorEnv => "error_env",
            ActionType::MaxLoop => "max_loop",
            ActionType::Screenshot => "screenshot",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action_type = match s.trim().to_lowercase().as_str() {
            "click" => ActionType::Click,
            "left_click" => ActionType::LeftClick,
            "left_double" => ActionType::LeftDouble,
            "double_click" => ActionType::DoubleClick,
            "right_single" => ActionType::RightSingle,
            "right_click" => ActionType::RightClick,
            "middle_click" => ActionType::MiddleClick,
            "drag" | "select" => ActionType::Drag,
            "left_click_drag" => ActionType::LeftClickDrag,
            "hotkey" => ActionType::Hotkey,
            "key" | "press" => ActionType::Key,
            "type" => ActionType::Type,
            "scroll" => ActionType::Scroll,
            "mouse_move" | "hover" => ActionType::MouseMove,
            "wait" => ActionType::Wait,
            "finished" => ActionType::Finished,
            "call_user" => ActionType::CallUser,
            "error_env" => ActionType::ErrorEnv,
            "max_loop" => ActionType::MaxLoop,
            "screenshot" => ActionType::Screenshot,
            other => return Err(ActionError::UnknownActionType(other.to_string())),
        };
        Ok(action_type)
    }
}

/// A point relative to the screenshot, both axes in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativePoint {
    pub x: f64,
    pub y: f64,
}

impl RelativePoint {
    /// Map onto a concrete viewport.
    pub fn to_pixels(&self, width: u32, height: u32) -> (i32, i32) {
        (
            (self.x * width as f64).round() as i32,
            (self.y * height as f64).round() as i32,
        )
    }
}

/// Action-specific inputs. Only the fields relevant to the action are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionInputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<RelativePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<RelativePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

/// One decoded action from a model prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedAction {
    pub action_type: ActionType,
    #[serde(default)]
    pub action_inputs: ActionInputs,
    #[serde(default)]
    pub thought: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection: Option<String>,
}

impl ParsedAction {
    /// Create an action with no inputs.
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            action_inputs: ActionInputs::default(),
            thought: String::new(),
            reflection: None,
        }
    }

    /// Set the start point.
    pub fn with_start(mut self, x: f64, y: f64) -> Self {
        self.action_inputs.start = Some(RelativePoint { x, y });
        self
    }

    /// Set the text content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.action_inputs.content = Some(content.into());
        self
    }
}

/// Parse a raw model prediction into actions using the default grid factor.
pub fn parse_command(prediction: &str) -> Result<Vec<ParsedAction>, ActionError> {
    parse_command_with_factor(prediction, DEFAULT_COORDINATE_FACTOR)
}

/// Parse a raw model prediction into actions.
///
/// Every non-empty line after the last `Action:` marker is one call. A
/// prediction without the marker yields no actions, and calls that cannot
/// be decoded are skipped.
pub fn parse_command_with_factor(
    prediction: &str,
    factor: f64,
) -> Result<Vec<ParsedAction>, ActionError> {
    let prediction = prediction.trim();
    let Some(action_start) = prediction.rfind("Action:") else {
        tracing::warn!("No action found in prediction: {}", prediction);
        return Ok(Vec::new());
    };

    let head = &prediction[..action_start];
    let thought = section(head, "Thought:").unwrap_or_default();
    let reflection = section(head, "Reflection:");

    let calls = &prediction[action_start + "Action:".len()..];
    let mut actions = Vec::new();
    for line in calls.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_call(line, factor) {
            Ok(mut action) => {
                action.thought = thought.clone();
                action.reflection = reflection.clone();
                actions.push(action);
            }
            Err(e) => tracing::warn!("Skipping action '{}': {}", line, e),
        }
    }

    Ok(actions)
}

/// Text following `marker` up to the next known section marker.
fn section(text: &str, marker: &str) -> Option<String> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let end = ["Thought:", "Reflection:", "Action_Summary:"]
        .iter()
        .filter_map(|m| rest.find(m))
        .min()
        .unwrap_or(rest.len());
    Some(rest[..end].trim().to_string())
}

/// Parse a single `name(key='value', ...)` call.
fn parse_call(call: &str, factor: f64) -> Result<ParsedAction, ActionError> {
    let open = call
        .find('(')
        .ok_or_else(|| ActionError::ParseError(format!("Invalid call format: {}", call)))?;
    let content = call[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| ActionError::ParseError(format!("Unclosed call: {}", call)))?;

    let action_type: ActionType = call[..open].parse()?;
    let mut action = ParsedAction::new(action_type);

    for (key, value) in parse_kwargs(content) {
        match key.as_str() {
            "start_box" | "point" => action.action_inputs.start = parse_box(&value, factor),
            "end_box" | "end_point" => action.action_inputs.end = parse_box(&value, factor),
            "content" | "text" => {
                action.action_inputs.content = Some(unescape(&value));
            }
            "key" | "hotkey" => action.action_inputs.key = Some(value),
            "direction" => action.action_inputs.direction = Some(value),
            _ => tracing::debug!("Ignoring unknown argument {}={}", key, value),
        }
    }

    Ok(action)
}

/// Split keyword arguments, honouring quotes and parentheses.
fn parse_kwargs(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_string = false;
    let mut string_char = '\'';
    let mut escaped = false;
    let mut depth = 0;
    let mut parsing_key = true;

    for c in content.chars() {
        if in_string {
            if escaped {
                value.push('\\');
                value.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == string_char {
                in_string = false;
            } else {
                value.push(c);
            }
            continue;
        }

        match c {
            '"' | '\'' if !parsing_key => {
                in_string = true;
                string_char = c;
            }
            '(' | '[' if !parsing_key => {
                depth += 1;
                value.push(c);
            }
            ')' | ']' if !parsing_key => {
                depth -= 1;
                value.push(c);
            }
            '=' if parsing_key => parsing_key = false,
            ',' if depth == 0 => {
                push_pair(&mut pairs, &key, &value);
                key.clear();
                value.clear();
                parsing_key = true;
            }
            _ if c.is_whitespace() && parsing_key => {}
            _ => {
                if parsing_key {
                    key.push(c);
                } else {
                    value.push(c);
                }
            }
        }
    }
    push_pair(&mut pairs, &key, &value);

    pairs
}

fn push_pair(pairs: &mut Vec<(String, String)>, key: &str, value: &str) {
    let key = key.trim();
    if !key.is_empty() {
        pairs.push((key.to_string(), value.trim().to_string()));
    }
}

/// Parse `(x,y)` or `(x1,y1,x2,y2)` into the centre point, scaled to `[0, 1]`.
fn parse_box(value: &str, factor: f64) -> Option<RelativePoint> {
    let numbers: Vec<f64> = NUMBER_RE
        .find_iter(value)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();

    let (x, y) = match numbers.as_slice() {
        [x, y] => (*x, *y),
        [x1, y1, x2, y2] => ((x1 + x2) / 2.0, (y1 + y2) / 2.0),
        _ => return None,
    };

    Some(RelativePoint {
        x: x / factor,
        y: y / factor,
    })
}

fn unescape(value: &str) -> String {
    value
        .replace("\\n", "\n")
        .replace("\\'", "'")
        .replace("\\\"", "\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_click() {
        let prediction = "Thought: The button is visible.\nAction: click(start_box='(100,200)')";
        let actions = parse_command(prediction).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Click);
        assert_eq!(actions[0].thought, "The button is visible.");
        let start = actions[0].action_inputs.start.unwrap();
        assert!((start.x - 0.1).abs() < 1e-9);
        assert!((start.y - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_parse_box_centre() {
        let prediction = "Action: left_double(start_box='<|box_start|>(100,100,300,500)<|box_end|>')";
        let actions = parse_command(prediction).unwrap();
        let start = actions[0].action_inputs.start.unwrap();
        assert!((start.x - 0.2).abs() < 1e-9);
        assert!((start.y - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_parse_type_keeps_commas_and_newlines() {
        let prediction = r"Thought: Type the query.
Action: type(content='hello, world\n')";
        let actions = parse_command(prediction).unwrap();
        assert_eq!(actions[0].action_type, ActionType::Type);
        assert_eq!(
            actions[0].action_inputs.content.as_deref(),
            Some("hello, world\n")
        );
    }

    #[test]
    fn test_parse_multiple_actions() {
        let prediction = "Thought: Done after this.\nReflection: It worked.\nAction: left_click(start_box='(10,10)')\n\nfinished()";
        let actions = parse_command(prediction).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action_type, ActionType::LeftClick);
        assert_eq!(actions[1].action_type, ActionType::Finished);
        assert_eq!(actions[1].reflection.as_deref(), Some("It worked."));
    }

    #[test]
    fn test_parse_drag_and_scroll() {
        let actions =
            parse_command("Action: drag(start_box='(0,0)', end_box='(500,500)')").unwrap();
        assert_eq!(actions[0].action_type, ActionType::Drag);
        assert!(actions[0].action_inputs.end.is_some());

        let actions =
            parse_command("Action: scroll(start_box='(10,20)', direction='down')").unwrap();
        assert_eq!(actions[0].action_inputs.direction.as_deref(), Some("down"));
    }

    #[test]
    fn test_unknown_action_skipped() {
        let prediction = "Action: press_home()\nclick(start_box='(1,1)')";
        let actions = parse_command(prediction).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Click);

        assert_eq!(
            "teleport".parse::<ActionType>(),
            Err(ActionError::UnknownActionType("teleport".to_string()))
        );
    }

    #[test]
    fn test_free_text_line_skipped() {
        let prediction = "Action: finished()\nThe task is complete.";
        let actions = parse_command(prediction).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Finished);
    }

    #[test]
    fn test_missing_action_marker_yields_nothing() {
        let prediction = "Thought: the page is still loading, I will look again.";
        let actions = parse_command(prediction).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_action_type_round_trip_names() {
        for name in ["wait", "finished", "call_user", "error_env", "max_loop"] {
            let action_type: ActionType = name.parse().unwrap();
            assert_eq!(action_type.as_str(), name);
        }
    }

    #[test]
    fn test_relative_point_to_pixels() {
        let point = RelativePoint { x: 0.5, y: 0.25 };
        assert_eq!(point.to_pixels(1920, 1080), (960, 270));
    }
}
