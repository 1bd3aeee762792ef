//! Agent module: goal decomposition and the per-instruction control loop.

mod computer_agent;
mod conversation;
mod decomposer;
mod progress;

pub use computer_agent::{
    AgentConfig, AgentError, ComputerUseAgent, LoopWaitPolicy, MAX_LOOP_COUNT, MAX_LOOP_MESSAGE,
    MAX_SNAPSHOT_ERRORS, SNAPSHOT_FAILURE_MESSAGE,
};
pub use conversation::{
    now_millis, ConversationLog, ScreenshotContext, Timing, Turn, TurnOrigin, IMAGE_PLACEHOLDER,
};
pub use decomposer::{DecomposeError, DecomposerConfig, InstructionDecomposer};
pub use progress::{
    progress_channel, AgentMode, AgentStatus, ProgressCallback, ProgressSnapshot, SNAPSHOT_VERSION,
};
