// Copyright 2025 The computer-use-agent Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Computer Use Agent
//!
//! Orchestration engine for agents that operate a computer through a
//! vision-language model.
//!
//! A natural-language goal is decomposed into atomic instructions by a
//! reasoning model, optionally grounded in a knowledge base of instruction
//! templates. Each instruction then drives a loop: capture a screenshot,
//! ask the vision model for the next action, execute it on the device, and
//! stream progress snapshots to an observer.
//!
//! Screen capture and input injection are supplied by the caller through
//! the [`Device`] trait.
//!
//! ## Decomposition Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use computer_use_agent::{
//!     InstructionDecomposer, KnowledgeBase, KnowledgeRetriever, ModelClient, ModelConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let knowledge = KnowledgeBase::load("knowledge.json")?;
//!     let oracle = Arc::new(ModelClient::new(ModelConfig::reasoning()));
//!
//!     let decomposer = InstructionDecomposer::new(oracle)
//!         .with_retriever(KnowledgeRetriever::new(Arc::new(knowledge)));
//!
//!     for instruction in decomposer.decompose("Swap 1 SOL for USDC on raydium").await? {
//!         println!("{}", instruction);
//!     }
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod agent;
pub mod config;
pub mod device;
pub mod knowledge;
pub mod model;
pub mod settings;

pub use actions::{parse_command, ActionType, ParsedAction, RelativePoint};

pub use agent::{
    progress_channel, AgentConfig, AgentError, AgentMode, AgentStatus, ComputerUseAgent,
    ConversationLog, DecomposeError, DecomposerConfig, InstructionDecomposer, LoopWaitPolicy,
    ProgressCallback, ProgressSnapshot, Turn, TurnOrigin,
};

pub use device::{Device, DeviceError, ImageAnnotator, MarkerAnnotator, Screenshot};
pub use knowledge::{
    KnowledgeBase, KnowledgeRecord, KnowledgeRetriever, KnowledgeSource, RetrievalError,
};
pub use model::{ModelClient, ModelConfig, ModelError, ReasoningOracle, VisionModel};
pub use settings::Settings;
