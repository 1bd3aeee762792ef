//! Model client module for AI inference.

mod client;
mod vlm;

pub use client::{MessageBuilder, ModelClient, ModelConfig, ModelError};
pub use vlm::{
    summarize_prediction, OracleError, OracleMessage, OracleRole, ReasoningOracle, VisionModel,
    VlmRequest, VlmResponse, VlmTurn,
};
