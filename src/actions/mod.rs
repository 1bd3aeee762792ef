//! Actions module for decoding AI model outputs.

mod parser;

pub use parser::{
    parse_command, parse_command_with_factor, ActionError, ActionInputs, ActionType,
    ParsedAction, RelativePoint, DEFAULT_COORDINATE_FACTOR,
};
