pub mod http;
pub mod types;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};
use async_trait::async_trait;

use nutriscan_schema::{AnalysisPreferences, ChatMessage, LabelAnalysis, UserProfile};

pub use http::HttpOrchestratorClient;
pub use types::{strip_data_url_prefix, OrchestrateOutcome, STATUS_SUCCESS};

/// Seam to the backend orchestration service. The HTTP client is the real
/// implementation; [`StubBackend`] stands in for tests and offline runs.
#[async_trait]
pub trait OrchestratorBackend: Send + Sync {
    /// Advance the conversation one turn. `agent_type` selects the backend
    /// agent (`None` lets the server infer intent); `image_data` carries a
    /// bare-base64 photo for food scans.
    async fn orchestrate(
        &self,
        conversation: &[ChatMessage],
        profile: &UserProfile,
        objective: &str,
        agent_type: Option<&str>,
        image_data: Option<&str>,
    ) -> Result<OrchestrateOutcome>;

    /// Enrich the profile with the metrics a new objective needs.
    async fn define_health_profile(
        &self,
        objective: &str,
        profile: &UserProfile,
    ) -> Result<UserProfile>;

    /// Analyze an ingredient-label photo against declared preferences.
    async fn analyze_label(
        &self,
        image: &str,
        preferences: &AnalysisPreferences,
    ) -> Result<LabelAnalysis>;

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct StubState {
    outcomes: VecDeque<OrchestrateOutcome>,
    profiles: VecDeque<UserProfile>,
    last_image: Option<String>,
    fail_transport: bool,
    fail_profile_update: bool,
}

/// Scriptable in-process backend. Scripted outcomes are consumed in FIFO
/// order; with nothing scripted, `orchestrate` echoes the last user
/// message as a stub assistant reply.
#[derive(Default)]
pub struct StubBackend {
    state: Mutex<StubState>,
    orchestrate_calls: AtomicUsize,
    profile_calls: AtomicUsize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_outcome(&self, outcome: OrchestrateOutcome) {
        self.state().outcomes.push_back(outcome);
    }

    pub fn push_profile(&self, profile: UserProfile) {
        self.state().profiles.push_back(profile);
    }

    pub fn set_fail_transport(&self, fail: bool) {
        self.state().fail_transport = fail;
    }

    pub fn set_fail_profile_update(&self, fail: bool) {
        self.state().fail_profile_update = fail;
    }

    pub fn orchestrate_calls(&self) -> usize {
        self.orchestrate_calls.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    /// Image payload seen by the most recent `orchestrate` call.
    pub fn last_image(&self) -> Option<String> {
        self.state().last_image.clone()
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl OrchestratorBackend for StubBackend {
    async fn orchestrate(
        &self,
        conversation: &[ChatMessage],
        _profile: &UserProfile,
        _objective: &str,
        _agent_type: Option<&str>,
        image_data: Option<&str>,
    ) -> Result<OrchestrateOutcome> {
        self.orchestrate_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        state.last_image = image_data.map(ToOwned::to_owned);
        if state.fail_transport {
            bail!("stub transport failure");
        }
        if let Some(outcome) = state.outcomes.pop_front() {
            return Ok(outcome);
        }

        let user_text = conversation
            .iter()
            .rev()
            .find(|m| m.role == nutriscan_schema::ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let mut updated = conversation.to_vec();
        updated.push(ChatMessage::assistant(format!("[stub] {user_text}")));
        Ok(OrchestrateOutcome::Success {
            conversation: updated,
            objective: None,
            updated_profile: None,
            scan: None,
        })
    }

    async fn define_health_profile(
        &self,
        _objective: &str,
        profile: &UserProfile,
    ) -> Result<UserProfile> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        if state.fail_profile_update {
            bail!("stub profile update failure");
        }
        match state.profiles.pop_front() {
            Some(profile) => Ok(profile),
            None => Ok(profile.clone()),
        }
    }

    async fn analyze_label(
        &self,
        _image: &str,
        _preferences: &AnalysisPreferences,
    ) -> Result<LabelAnalysis> {
        bail!("label analysis not scripted on the stub backend")
    }
}
