//! Decomposition of a goal into atomic instructions by a reasoning oracle.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;

use crate::config::get_decompose_prompt;
use crate::knowledge::{KnowledgeRetriever, RetrievalError};
use crate::model::{ModelError, OracleMessage, ReasoningOracle};

/// Default number of oracle attempts when the service is overloaded.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry. Doubles on every further attempt.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;

/// Decomposition errors.
#[derive(Error, Debug)]
pub enum DecomposeError {
    #[error("No goal provided")]
    EmptyGoal,
    #[error("Knowledge lookup failed: {0}")]
    Retrieval(#[from] RetrievalError),
    #[error("Reasoning failed: {0}")]
    Reasoning(#[from] ModelError),
}

/// Configuration for the InstructionDecomposer.
#[derive(Debug, Clone)]
pub struct DecomposerConfig {
    /// Total oracle attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
        }
    }
}

impl DecomposerConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }
}

/// Turns a goal into an ordered list of atomic instructions.
pub struct InstructionDecomposer {
    oracle: Arc<dyn ReasoningOracle>,
    retriever: Option<KnowledgeRetriever>,
    config: DecomposerConfig,
}

impl InstructionDecomposer {
    /// Create a decomposer without knowledge grounding.
    pub fn new(oracle: Arc<dyn ReasoningOracle>) -> Self {
        Self {
            oracle,
            retriever: None,
            config: DecomposerConfig::default(),
        }
    }

    /// Ground prompts with the best knowledge-base match.
    pub fn with_retriever(mut self, retriever: KnowledgeRetriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_config(mut self, config: DecomposerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the system prompt for a goal.
    pub async fn build_prompt(&self, goal: &str) -> Result<String, DecomposeError> {
        let reference = match &self.retriever {
            Some(retriever) => retriever.find(goal).await?,
            None => None,
        };

        match &reference {
            Some(record) => tracing::info!("Grounding goal with knowledge record '{}'", record.name),
            None => tracing::debug!("No knowledge match, decomposing from first principles"),
        }

        Ok(get_decompose_prompt(reference.as_ref()))
    }

    /// Decompose a goal into instructions.
    ///
    /// Every line of the oracle's answer becomes one instruction, blank
    /// lines included.
    pub async fn decompose(&self, goal: &str) -> Result<Vec<String>, DecomposeError> {
        if goal.trim().is_empty() {
            return Err(DecomposeError::EmptyGoal);
        }

        let messages = [
            OracleMessage::system(self.build_prompt(goal).await?),
            OracleMessage::user(goal),
        ];

        let prediction = self.invoke_with_backoff(&messages).await?;
        let instructions: Vec<String> = prediction.split('\n').map(str::to_string).collect();

        tracing::debug!("Generated {} instructions: {:?}", instructions.len(), instructions);
        Ok(instructions)
    }

    /// Call the oracle, retrying only while it reports overload.
    async fn invoke_with_backoff(&self, messages: &[OracleMessage]) -> Result<String, ModelError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.initial_backoff;
        let mut attempt = 1;

        loop {
            match self.oracle.invoke(messages).await {
                Ok(prediction) => return Ok(prediction),
                Err(e) if e.is_overloaded() && attempt < max_attempts => {
                    tracing::warn!(
                        "Oracle overloaded (attempt {}/{}), retrying in {:?}: {}",
                        attempt,
                        max_attempts,
                        delay,
                        e
                    );
                    sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!("Oracle request failed on attempt {}: {}", attempt, e);
                    return Err(e);
                }
            }
        }
    }
}
