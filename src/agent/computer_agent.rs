//! ComputerUseAgent: the capture → infer → act loop.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::conversation::{now_millis, ConversationLog, ScreenshotContext, Timing, Turn, TurnOrigin};
use super::decomposer::{DecomposeError, InstructionDecomposer};
use super::progress::{AgentMode, AgentStatus, ProgressCallback, ProgressSnapshot, SNAPSHOT_VERSION};
use crate::actions::{ActionType, ParsedAction};
use crate::config::get_system_prompt;
use crate::device::{Device, DeviceError, ImageAnnotator, MarkerAnnotator, Screenshot};
use crate::model::{summarize_prediction, ModelError, VisionModel, VlmRequest, VlmTurn};

/// Loop iterations allowed per instruction.
pub const MAX_LOOP_COUNT: u32 = 8;

/// Invalid screenshots tolerated per instruction.
pub const MAX_SNAPSHOT_ERRORS: u32 = 10;

/// Capture attempts before a screenshot failure is surfaced.
pub const SCREENSHOT_ATTEMPTS: u32 = 5;

/// Default pause after each action.
pub const DEFAULT_ACTION_DELAY_MS: u64 = 1500;

pub const MAX_LOOP_MESSAGE: &str = "Exceeds the maximum number of loops";
pub const SNAPSHOT_FAILURE_MESSAGE: &str = "Too many screenshot failures";

/// Agent errors.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Inference error: {0}")]
    Inference(#[from] ModelError),
    #[error("Decomposition error: {0}")]
    Decompose(#[from] DecomposeError),
}

/// Pause to apply after an action of the given type.
pub type LoopWaitPolicy = Box<dyn Fn(ActionType) -> Duration + Send + Sync>;

/// Configuration for the ComputerUseAgent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_loop_count: u32,
    pub max_snapshot_errors: u32,
    pub screenshot_attempts: u32,
    /// Delay between failed capture attempts.
    pub screenshot_retry_delay: Duration,
    /// Pause after each action unless a [`LoopWaitPolicy`] is set.
    pub action_delay: Duration,
    /// Language code ("en" or "zh").
    pub lang: String,
    /// Custom system prompt (if None, uses default based on lang).
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_loop_count: MAX_LOOP_COUNT,
            max_snapshot_errors: MAX_SNAPSHOT_ERRORS,
            screenshot_attempts: SCREENSHOT_ATTEMPTS,
            screenshot_retry_delay: Duration::from_millis(500),
            action_delay: Duration::from_millis(DEFAULT_ACTION_DELAY_MS),
            lang: "en".to_string(),
            system_prompt: None,
        }
    }
}

impl AgentConfig {
    /// Create a new AgentConfig with custom language.
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Use a custom system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the pause applied after every action.
    pub fn with_action_delay(mut self, delay: Duration) -> Self {
        self.action_delay = delay;
        self
    }

    pub fn with_screenshot_retry_delay(mut self, delay: Duration) -> Self {
        self.screenshot_retry_delay = delay;
        self
    }

    /// Get the system prompt (custom or default based on language).
    pub fn get_system_prompt(&self) -> String {
        self.system_prompt
            .clone()
            .unwrap_or_else(|| get_system_prompt(&self.lang))
    }
}

/// Status implied by an action.
fn status_for(action_type: ActionType) -> AgentStatus {
    match action_type {
        ActionType::ErrorEnv | ActionType::CallUser | ActionType::Finished => AgentStatus::End,
        ActionType::MaxLoop => AgentStatus::MaxLoop,
        ActionType::Click
        | ActionType::LeftClick
        | ActionType::LeftDouble
        | ActionType::DoubleClick
        | ActionType::RightSingle
        | ActionType::RightClick
        | ActionType::MiddleClick
        | ActionType::Drag
        | ActionType::LeftClickDrag
        | ActionType::Hotkey
        | ActionType::Key
        | ActionType::Type
        | ActionType::Scroll
        | ActionType::MouseMove
        | ActionType::Wait
        | ActionType::Screenshot => AgentStatus::Running,
    }
}

/// Autonomous agent operating a device through a vision-language model.
///
/// A goal is decomposed into instructions, and each instruction runs its
/// own capture → infer → act loop with a fresh conversation. Progress is
/// pushed to the callback after every state-affecting step.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use computer_use_agent::{
///     progress_channel, AgentConfig, ComputerUseAgent, Device, InstructionDecomposer,
///     ModelClient, ModelConfig,
/// };
///
/// async fn drive(device: Box<dyn Device>) -> anyhow::Result<()> {
///     let vlm = Arc::new(ModelClient::new(ModelConfig::default()));
///     let oracle = Arc::new(ModelClient::new(ModelConfig::reasoning()));
///     let (on_progress, mut progress) = progress_channel();
///
///     let mut agent = ComputerUseAgent::new(
///         AgentConfig::default(),
///         device,
///         vlm,
///         InstructionDecomposer::new(oracle),
///         on_progress,
///     );
///     tokio::spawn(async move {
///         while let Some(snapshot) = progress.recv().await {
///             println!("{}", snapshot.status);
///         }
///     });
///
///     let status = agent.run("Open a browser and go to example.com").await?;
///     println!("Finished with {}", status);
///     Ok(())
/// }
/// ```
pub struct ComputerUseAgent {
    config: AgentConfig,
    system_prompt: String,
    device: Box<dyn Device>,
    vlm: Arc<dyn VisionModel>,
    decomposer: InstructionDecomposer,
    annotator: Box<dyn ImageAnnotator>,
    on_progress: ProgressCallback,
    loop_wait: Option<LoopWaitPolicy>,
    cancel: CancellationToken,
    goal: String,
    conversations: ConversationLog,
    status: AgentStatus,
    start_time: i64,
}

impl ComputerUseAgent {
    /// Create a new ComputerUseAgent.
    ///
    /// # Arguments
    /// * `config` - Loop budgets, delays and prompt settings.
    /// * `device` - The device session this agent owns.
    /// * `vlm` - Model deciding the next action from screenshots.
    /// * `decomposer` - Splits goals into instructions.
    /// * `on_progress` - Receives every progress snapshot.
    pub fn new(
        config: AgentConfig,
        device: Box<dyn Device>,
        vlm: Arc<dyn VisionModel>,
        decomposer: InstructionDecomposer,
        on_progress: ProgressCallback,
    ) -> Self {
        Self {
            system_prompt: config.get_system_prompt(),
            config,
            device,
            vlm,
            decomposer,
            annotator: Box::new(MarkerAnnotator::default()),
            on_progress,
            loop_wait: None,
            cancel: CancellationToken::new(),
            goal: String::new(),
            conversations: ConversationLog::new(),
            status: AgentStatus::Init,
            start_time: now_millis(),
        }
    }

    /// Replace the screenshot annotator.
    pub fn with_annotator(mut self, annotator: Box<dyn ImageAnnotator>) -> Self {
        self.annotator = annotator;
        self
    }

    /// Choose the pause after each action by action type.
    pub fn with_loop_wait(mut self, policy: LoopWaitPolicy) -> Self {
        self.loop_wait = Some(policy);
        self
    }

    /// Share a cancellation token with the caller.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that aborts this agent when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Get the current status.
    pub fn status(&self) -> AgentStatus {
        self.status
    }

    /// Get the conversation of the current instruction.
    pub fn conversations(&self) -> &ConversationLog {
        &self.conversations
    }

    /// Decompose a goal and run every resulting instruction.
    ///
    /// # Returns
    /// The final status, `End` unless an error interrupted the run.
    pub async fn run(&mut self, goal: &str) -> Result<AgentStatus, AgentError> {
        self.begin_run(goal);
        tracing::info!("Decomposing goal: {}", goal);

        let instructions = self.decomposer.decompose(goal).await?;
        tracing::info!("Generated {} instructions", instructions.len());

        self.execute_instructions(&instructions).await
    }

    /// Run already decomposed instructions in order.
    ///
    /// Snapshots report the instructions joined by newlines as the goal.
    pub async fn run_instructions(
        &mut self,
        instructions: &[String],
    ) -> Result<AgentStatus, AgentError> {
        self.begin_run(&instructions.join("\n"));
        self.execute_instructions(instructions).await
    }

    fn begin_run(&mut self, goal: &str) {
        self.goal = goal.to_string();
        self.start_time = now_millis();
    }

    async fn execute_instructions(
        &mut self,
        instructions: &[String],
    ) -> Result<AgentStatus, AgentError> {
        self.status = AgentStatus::Running;

        for instruction in instructions {
            if self.status != AgentStatus::Running {
                tracing::warn!("Agent is not in RUNNING status, stopping");
                break;
            }

            self.run_instruction(instruction).await?;

            if self.cancel.is_cancelled() {
                tracing::warn!("Run aborted, skipping remaining instructions");
                break;
            }
        }

        self.status = AgentStatus::End;
        self.emit(None);
        Ok(self.status)
    }

    /// Run one instruction to completion, then clean up regardless of outcome.
    async fn run_instruction(&mut self, instruction: &str) -> Result<(), AgentError> {
        self.conversations.reset();
        self.conversations.append(Turn::human(instruction));
        tracing::info!("Start processing instruction: {}", instruction);
        self.emit(None);

        let result = self.instruction_loop().await;
        if let Err(e) = &result {
            tracing::error!("Instruction loop failed: {}", e);
        }

        // Ready for the next instruction
        self.status = AgentStatus::Running;
        self.emit(None);
        self.device.tear_down().await;
        tracing::info!("Instruction finished, status reset to {}", self.status);

        result
    }

    async fn instruction_loop(&mut self) -> Result<(), AgentError> {
        let mut loop_count: u32 = 0;
        let mut snapshot_errors: u32 = 0;

        while self.status == AgentStatus::Running {
            if self.cancel.is_cancelled() {
                tracing::info!("Abort signal received, ending loop");
                self.status = AgentStatus::End;
                self.emit(None);
                break;
            }

            loop_count += 1;
            tracing::info!(
                "Loop iteration {}, snapshot error count: {}",
                loop_count,
                snapshot_errors
            );

            if loop_count >= self.config.max_loop_count
                || snapshot_errors >= self.config.max_snapshot_errors
            {
                self.status = AgentStatus::MaxLoop;
                let message = if loop_count >= self.config.max_loop_count {
                    MAX_LOOP_MESSAGE
                } else {
                    SNAPSHOT_FAILURE_MESSAGE
                };
                tracing::warn!("{}", message);
                self.emit(Some(message));
                break;
            }

            let start = now_millis();
            let screenshot = self.capture_screenshot().await?;
            if !screenshot.is_valid() {
                tracing::warn!("Invalid screenshot received");
                loop_count -= 1;
                snapshot_errors += 1;
                continue;
            }
            tracing::info!("Screenshot {}x{}", screenshot.width, screenshot.height);

            self.conversations
                .append(Turn::screenshot(&screenshot, Timing::since(start)));
            self.emit(None);

            let start = now_millis();
            let response = self.vlm.invoke(self.build_vlm_request(), &self.cancel).await?;
            if response.prediction.is_empty() {
                tracing::warn!("No prediction received, continuing to next iteration");
                continue;
            }

            let actions = self.device.parse_command(&response.prediction).await?;
            let annotated = self.annotate(&screenshot, &actions);

            self.conversations.append(Turn::agent(
                summarize_prediction(&response.prediction),
                ScreenshotContext {
                    width: screenshot.width,
                    height: screenshot.height,
                },
                annotated,
                actions.clone(),
                response.reflections,
                Timing::since(start),
            ));
            self.emit(None);

            tracing::info!("Parsed {} actions", actions.len());
            for action in &actions {
                self.apply_action(action, &screenshot).await?;
            }

            tracing::info!("===== End of loop iteration {} =====", loop_count);
        }

        Ok(())
    }

    async fn apply_action(
        &mut self,
        action: &ParsedAction,
        screenshot: &Screenshot,
    ) -> Result<(), AgentError> {
        let action_type = action.action_type;
        tracing::info!("Action: {}", action_type);

        self.status = status_for(action_type);
        self.emit(None);

        if action_type != ActionType::Wait && !self.cancel.is_cancelled() {
            self.device
                .execute(action, screenshot.width, screenshot.height)
                .await?;
        }

        let delay = match &self.loop_wait {
            Some(policy) => policy(action_type),
            None => self.config.action_delay,
        };
        sleep(delay).await;

        Ok(())
    }

    /// Capture a screenshot, retrying failed captures.
    async fn capture_screenshot(&self) -> Result<Screenshot, DeviceError> {
        let attempts = self.config.screenshot_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.device.screenshot().await {
                Ok(screenshot) => return Ok(screenshot),
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        "[snapshot_retry] Failed attempt ({}/{}): {}",
                        attempt,
                        attempts,
                        e
                    );
                    sleep(self.config.screenshot_retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!("Screenshot failed after {} attempts: {}", attempts, e);
                    return Err(e);
                }
            }
        }
    }

    fn annotate(&self, screenshot: &Screenshot, actions: &[ParsedAction]) -> Option<String> {
        if actions.is_empty() {
            return None;
        }
        match self.annotator.annotate(screenshot, actions) {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::error!("Failed to mark click position: {}", e);
                None
            }
        }
    }

    /// Conversation and screenshots for the model; the first instruction
    /// turn is prefixed with the system prompt.
    fn build_vlm_request(&self) -> VlmRequest {
        let conversations = self
            .conversations
            .turns()
            .iter()
            .enumerate()
            .map(|(idx, turn)| {
                let value = if idx == 0 && turn.from == TurnOrigin::Human {
                    format!("{}{}", self.system_prompt, turn.value)
                } else {
                    turn.value.clone()
                };
                VlmTurn {
                    from: turn.from,
                    value,
                }
            })
            .collect();

        VlmRequest {
            conversations,
            images: self.conversations.screenshots(),
        }
    }

    fn emit(&mut self, err_msg: Option<&str>) {
        let snapshot = ProgressSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            system_prompt: self.system_prompt.clone(),
            instruction: self.goal.clone(),
            model_name: self.vlm.model_name(),
            mode: AgentMode::Agent,
            status: self.status,
            log_time: self.start_time,
            err_msg: err_msg.map(str::to_string),
            conversations: self.conversations.take_undelivered(),
        };
        tracing::info!("[emit] status {}", snapshot.status);
        (self.on_progress)(snapshot);
    }
}
