//! Configuration module: prompts shared by the agent and the decomposer.

mod prompts;

pub use prompts::{get_decompose_prompt, get_system_prompt, SYSTEM_PROMPT_TEMPLATE};
