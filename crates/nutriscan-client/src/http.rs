use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use nutriscan_schema::{AnalysisPreferences, ChatMessage, LabelAnalysis, ScanOutcome, UserProfile};

use crate::{strip_data_url_prefix, OrchestrateOutcome, OrchestratorBackend, STATUS_SUCCESS};

/// Per-request timeout for backend calls. A hung request fails here
/// instead of hanging the flow indefinitely.
pub const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// HTTP client for the orchestration backend.
#[derive(Debug, Clone)]
pub struct HttpOrchestratorClient {
    client: reqwest::Client,
    api_base: String,
}

impl HttpOrchestratorClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.api_base, path);
        tracing::debug!(%url, "calling orchestration backend");
        let resp = match self.client.post(&url).json(body).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                return Err(anyhow!(
                    "backend api error (timeout): request timed out after {}s",
                    REQUEST_TIMEOUT.as_secs()
                ));
            }
            Err(e) if e.is_connect() => {
                return Err(anyhow!("backend api error (connect): {e}"));
            }
            Err(e) => return Err(e.into()),
        };

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await?;
            let parsed = serde_json::from_str::<ApiErrorBody>(&text).ok();
            return Err(format_api_error(status, parsed));
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl OrchestratorBackend for HttpOrchestratorClient {
    async fn orchestrate(
        &self,
        conversation: &[ChatMessage],
        profile: &UserProfile,
        objective: &str,
        agent_type: Option<&str>,
        image_data: Option<&str>,
    ) -> Result<OrchestrateOutcome> {
        let body = OrchestrateRequest {
            conversation,
            user_profile: profile,
            objective,
            agent_type,
            image_data,
        };
        let resp: OrchestrateResponseBody = self.post_json("/api/orchestrate", &body).await?;
        into_outcome(resp)
    }

    async fn define_health_profile(
        &self,
        objective: &str,
        profile: &UserProfile,
    ) -> Result<UserProfile> {
        let body = ProfileRequest {
            objective,
            user_profile: profile,
        };
        let resp: ProfileResponseBody =
            self.post_json("/api/define-health-profile", &body).await?;
        if resp.status != STATUS_SUCCESS {
            bail!(
                "profile update rejected: {}",
                resp.message.as_deref().unwrap_or(&resp.status)
            );
        }
        resp.updated_user_profile
            .ok_or_else(|| anyhow!("profile update response missing updatedUserProfile"))
    }

    async fn analyze_label(
        &self,
        image: &str,
        preferences: &AnalysisPreferences,
    ) -> Result<LabelAnalysis> {
        let body = AnalyzeRequest {
            image: strip_data_url_prefix(image),
            diet_type: &preferences.diet_type,
            allergies: &preferences.allergies,
            health_conditions: &preferences.health_conditions,
        };
        let resp: AnalyzeResponseBody = self.post_json("/analyze", &body).await?;
        if !resp.success {
            bail!(
                "label analysis failed: {}",
                resp.error.as_deref().unwrap_or("unknown error")
            );
        }
        resp.analysis
            .ok_or_else(|| anyhow!("label analysis response missing analysis"))
    }

    async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.api_base);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            bail!("backend health check failed ({status})");
        }
        Ok(())
    }
}

/// Map a success-status body into the validated outcome. A success body
/// without a conversation is a contract violation.
fn into_outcome(body: OrchestrateResponseBody) -> Result<OrchestrateOutcome> {
    if body.status != STATUS_SUCCESS {
        return Ok(OrchestrateOutcome::Failed {
            message: body.message,
        });
    }
    let conversation = body
        .updated_conversation
        .ok_or_else(|| anyhow!("success response missing updatedConversation"))?;
    Ok(OrchestrateOutcome::Success {
        conversation,
        objective: body.objective.filter(|o| !o.trim().is_empty()),
        updated_profile: body.updated_user_profile,
        scan: body.result,
    })
}

fn format_api_error(status: StatusCode, parsed: Option<ApiErrorBody>) -> anyhow::Error {
    match parsed.and_then(|body| body.message.or(body.error)) {
        Some(detail) => anyhow!("backend api error ({status}): {detail}"),
        None => anyhow!("backend api error ({status})"),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrchestrateRequest<'a> {
    pub conversation: &'a [ChatMessage],
    pub user_profile: &'a UserProfile,
    pub objective: &'a str,
    /// Serialized as `null` in general mode so the server infers intent.
    pub agent_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrchestrateResponseBody {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub updated_conversation: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub updated_user_profile: Option<UserProfile>,
    #[serde(default)]
    pub result: Option<ScanOutcome>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfileRequest<'a> {
    pub objective: &'a str,
    pub user_profile: &'a UserProfile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfileResponseBody {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub updated_user_profile: Option<UserProfile>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnalyzeRequest<'a> {
    pub image: &'a str,
    pub diet_type: &'a str,
    pub allergies: &'a [String],
    pub health_conditions: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AnalyzeResponseBody {
    pub success: bool,
    #[serde(default)]
    pub analysis: Option<LabelAnalysis>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
