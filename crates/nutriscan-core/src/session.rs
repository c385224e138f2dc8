use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use nutriscan_client::{strip_data_url_prefix, OrchestrateOutcome, OrchestratorBackend};
use nutriscan_schema::{ChatMessage, ScanOutcome, ScanRecord, SessionMode, UserProfile};
use nutriscan_store::DataStore;

/// Upper bound on retained scan-history entries.
pub const SCAN_HISTORY_LIMIT: usize = 10;

/// Fallback objective used when the define-objective agent extracts
/// nothing but the user mentions diabetes. Heuristic safety net, not
/// primary logic.
pub const DIABETES_FALLBACK_OBJECTIVE: &str =
    "Manage type 2 diabetes through diet, exercise, and regular monitoring";

const OBJECTIVE_PROMPT: &str = "Let's define your health objective. What is your goal? \
     For example, do you want to lose weight, manage a medical condition, or follow a specific diet?";

const SCAN_FOOD_MESSAGE: &str = "Can you scan this food item for me?";

const PROCESSING_ERROR_MESSAGE: &str =
    "Sorry, I encountered an error processing your message.";
const CONNECTION_ERROR_MESSAGE: &str =
    "Sorry, there was an error connecting to the server.";

fn metrics_prompt(objective: &str) -> String {
    format!(
        "Now let's collect some health metrics related to your objective: \"{objective}\". \
         What metrics would you like to track? For example, weight, blood pressure, etc."
    )
}

/// Precondition violations on session operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("objective index {index} out of range (have {len})")]
    ObjectiveIndexOutOfRange { index: usize, len: usize },
    #[error("image data is required for a food scan")]
    MissingImageData,
}

/// What one conversational turn produced, for the caller to render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnReport {
    /// The input was empty after trimming; nothing happened.
    pub skipped: bool,
    /// Objective appended this turn (backend-extracted or fallback).
    pub objective_added: Option<String>,
    /// Food-scan verdict delivered this turn.
    pub scan: Option<ScanOutcome>,
}

/// The conversational session: working copies of the four persisted
/// collections plus the active mode, written through to the store after
/// every mutation.
///
/// All mutating operations take `&mut self`, so at most one orchestration
/// call is in flight per session at a time.
pub struct ChatSession {
    store: DataStore,
    backend: Arc<dyn OrchestratorBackend>,
    objectives: Vec<String>,
    profile: UserProfile,
    history: Vec<ScanRecord>,
    conversation: Vec<ChatMessage>,
    mode: SessionMode,
}

impl ChatSession {
    /// Build a session from whatever the store currently holds. The mode
    /// always starts at `General`; only flow starts switch it.
    pub async fn load(store: DataStore, backend: Arc<dyn OrchestratorBackend>) -> Result<Self> {
        let objectives = store.load_objectives().await?;
        let profile = store.load_profile().await?;
        let history = store.load_history().await?;
        let conversation = store.load_conversation().await?;
        Ok(Self {
            store,
            backend,
            objectives,
            profile,
            history,
            conversation,
            mode: SessionMode::default(),
        })
    }

    pub fn objectives(&self) -> &[String] {
        &self.objectives
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn history(&self) -> &[ScanRecord] {
        &self.history
    }

    pub fn conversation(&self) -> &[ChatMessage] {
        &self.conversation
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Most recently added objective, or empty when none exist.
    pub fn active_objective(&self) -> &str {
        self.objectives.last().map(String::as_str).unwrap_or("")
    }

    /// Switch to the define-objective flow: fresh conversation, system
    /// marker, fixed assistant prompt.
    pub async fn start_objective_definition(&mut self) -> Result<()> {
        self.mode = SessionMode::DefineObjective;
        self.conversation.clear();
        self.conversation
            .push(ChatMessage::system("Starting objective definition flow"));
        self.conversation.push(ChatMessage::assistant(OBJECTIVE_PROMPT));
        self.store.save_conversation(&self.conversation).await
    }

    /// Switch to metrics collection for a freshly finalized objective.
    /// The assistant prompt quotes the objective verbatim.
    async fn start_metrics_collection(&mut self, objective: &str) -> Result<()> {
        self.mode = SessionMode::CollectMetrics;
        self.conversation.clear();
        self.conversation
            .push(ChatMessage::system("Starting health metrics collection flow"));
        self.conversation
            .push(ChatMessage::assistant(metrics_prompt(objective)));
        self.store.save_conversation(&self.conversation).await
    }

    async fn start_food_scan(&mut self) -> Result<()> {
        self.mode = SessionMode::ScanFood;
        self.conversation.clear();
        self.conversation
            .push(ChatMessage::system("Starting food scanning flow"));
        self.conversation.push(ChatMessage::user(SCAN_FOOD_MESSAGE));
        self.store.save_conversation(&self.conversation).await
    }

    /// Append a user message and run one orchestration round trip. Empty
    /// input after trimming is a no-op, not an error.
    pub async fn submit_message(&mut self, text: &str) -> Result<TurnReport> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(TurnReport {
                skipped: true,
                ..TurnReport::default()
            });
        }

        self.conversation.push(ChatMessage::user(text));
        self.store.save_conversation(&self.conversation).await?;

        self.run_orchestration(text, None).await
    }

    /// Submit a captured label photo through the food-scan flow. Any
    /// `data:` URL prefix is stripped before transmission.
    pub async fn scan_food(&mut self, image_data: &str) -> Result<TurnReport> {
        let payload = strip_data_url_prefix(image_data.trim());
        if payload.is_empty() {
            return Err(SessionError::MissingImageData.into());
        }

        self.start_food_scan().await?;
        self.run_orchestration(SCAN_FOOD_MESSAGE, Some(payload)).await
    }

    async fn run_orchestration(
        &mut self,
        user_text: &str,
        image_data: Option<&str>,
    ) -> Result<TurnReport> {
        let outcome = self
            .backend
            .orchestrate(
                &self.conversation,
                &self.profile,
                self.active_objective(),
                self.mode.agent_type(),
                image_data,
            )
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(%error, "orchestration call failed");
                self.append_assistant_notice(CONNECTION_ERROR_MESSAGE).await?;
                return Ok(TurnReport::default());
            }
        };

        let (conversation, objective, updated_profile, scan) = match outcome {
            OrchestrateOutcome::Failed { message } => {
                warn!(
                    message = message.as_deref().unwrap_or("<none>"),
                    "backend rejected the turn"
                );
                self.append_assistant_notice(PROCESSING_ERROR_MESSAGE).await?;
                return Ok(TurnReport::default());
            }
            OrchestrateOutcome::Success {
                conversation,
                objective,
                updated_profile,
                scan,
            } => (conversation, objective, updated_profile, scan),
        };

        // The backend owns post-call conversation state; replace, don't merge.
        self.conversation = conversation;
        self.store.save_conversation(&self.conversation).await?;

        let mut report = TurnReport::default();

        // Ordered, independent checks against the live mode: adopting an
        // objective switches to CollectMetrics, so a profile carried in
        // the same response still applies below.
        if self.mode == SessionMode::DefineObjective {
            if let Some(objective) = objective {
                self.adopt_objective(&objective).await?;
                report.objective_added = Some(objective);
            } else if user_text.to_lowercase().contains("diabetes") {
                self.adopt_objective(DIABETES_FALLBACK_OBJECTIVE).await?;
                report.objective_added = Some(DIABETES_FALLBACK_OBJECTIVE.to_string());
            }
        }

        if self.mode == SessionMode::CollectMetrics {
            if let Some(profile) = updated_profile {
                self.profile = profile;
                self.store.save_profile(&self.profile).await?;
            }
        }

        if self.mode == SessionMode::ScanFood {
            if let Some(scan) = scan {
                self.record_scan(scan.clone()).await?;
                report.scan = Some(scan);
            }
        }

        Ok(report)
    }

    /// Append the finalized objective, enrich the profile (best effort),
    /// and move to metrics collection.
    async fn adopt_objective(&mut self, objective: &str) -> Result<()> {
        info!(objective, "objective finalized");
        self.objectives.push(objective.to_string());
        self.store.save_objectives(&self.objectives).await?;

        match self.backend.define_health_profile(objective, &self.profile).await {
            Ok(profile) => {
                self.profile = profile;
                self.store.save_profile(&self.profile).await?;
            }
            // The objective stays even when enrichment fails.
            Err(error) => warn!(%error, "profile update for new objective failed"),
        }

        self.start_metrics_collection(objective).await
    }

    async fn append_assistant_notice(&mut self, message: &str) -> Result<()> {
        self.conversation.push(ChatMessage::assistant(message));
        self.store.save_conversation(&self.conversation).await
    }

    /// Remove an objective and prune metrics left without a justifying
    /// objective. Out-of-range indices are a precondition violation.
    pub async fn delete_objective(&mut self, index: usize) -> Result<String> {
        if index >= self.objectives.len() {
            return Err(SessionError::ObjectiveIndexOutOfRange {
                index,
                len: self.objectives.len(),
            }
            .into());
        }

        let removed = self.objectives.remove(index);
        self.store.save_objectives(&self.objectives).await?;

        self.profile.remove_objective(&removed);
        self.store.save_profile(&self.profile).await?;

        info!(objective = %removed, "objective deleted");
        Ok(removed)
    }

    /// Prepend a scan record, keeping only the most recent entries.
    pub async fn record_scan(&mut self, outcome: ScanOutcome) -> Result<()> {
        self.history
            .insert(0, ScanRecord::from_outcome(outcome, Utc::now()));
        self.history.truncate(SCAN_HISTORY_LIMIT);
        self.store.save_history(&self.history).await
    }

    /// Clear every persisted slot and re-initialize in place. No process
    /// restart needed.
    pub async fn reset(&mut self) -> Result<()> {
        self.store.reset().await?;
        self.objectives.clear();
        self.profile = UserProfile::default();
        self.history.clear();
        self.conversation.clear();
        self.mode = SessionMode::General;
        info!("session data reset");
        Ok(())
    }
}
