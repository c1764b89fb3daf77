//! Timeout advisors — model-backed evaluation with an offline rule fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::config::Config;
use crate::prompts;
use crate::types::{
    TimeoutDecisionRequest, TimeoutDecisionResult, INITIAL_TIMEOUT_SECS, TIMEOUT_FLOOR_SECS,
};

/// Attempts per evaluation before the caller keeps the current timeout.
pub const ADVISOR_ATTEMPTS: u32 = 3;

/// Pause between failed attempts.
const RETRY_PAUSE: Duration = Duration::from_millis(500);

/// Clamp a proposed timeout to the floor. Idempotent.
pub fn clamp_timeout(secs: u32) -> u32 {
    secs.max(TIMEOUT_FLOOR_SECS)
}

#[derive(Debug, thiserror::Error)]
pub enum AdvisorError {
    #[error("advisor request failed: {0}")]
    Transport(String),
    #[error("advisor returned unusable output: {0}")]
    Schema(String),
    #[error("advisor evaluation exceeded {}s", .0.as_secs())]
    DeadlineExceeded(Duration),
}

/// Decides the session timeout after each send. Implementations never panic
/// across this boundary; an `Err` means the caller keeps the current timeout.
#[async_trait]
pub trait TimeoutAdvisor: Send + Sync + 'static {
    async fn evaluate(
        &self,
        req: &TimeoutDecisionRequest,
    ) -> Result<TimeoutDecisionResult, AdvisorError>;
}

/// Build the advisor the config asks for. "auto" uses the model when it can
/// actually run and falls back to rules otherwise.
pub fn advisor_from_config(config: &Config) -> Arc<dyn TimeoutAdvisor> {
    let use_model = match config.advisor.as_str() {
        "model" => true,
        "rules" => false,
        _ => config.model_advisor_available(),
    };
    if use_model {
        info!("timeout advisor: model ({})", config.model);
        Arc::new(ModelAdvisor::new(config.clone()))
    } else {
        info!("timeout advisor: rules (offline)");
        Arc::new(RuleAdvisor)
    }
}

// ── Model advisor ──

pub struct ModelAdvisor {
    config: Config,
    client: reqwest::Client,
}

impl ModelAdvisor {
    pub fn new(config: Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.advisor_attempt_timeout_secs))
            .build()
            .expect("Failed to build HTTP client");
        Self { config, client }
    }

    /// One Chat Completions call, parsed into a decision.
    async fn call_once(
        &self,
        req: &TimeoutDecisionRequest,
    ) -> Result<TimeoutDecisionResult, AdvisorError> {
        let api_key = self.config.api_key.as_deref().unwrap_or("ollama");
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1");
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": prompts::ADVISOR_SYSTEM},
                {"role": "user", "content": prompts::evaluation_prompt(req)},
            ],
            "max_tokens": 300,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AdvisorError::Transport(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdvisorError::Transport(format!(
                "HTTP {} — {}",
                status,
                &body[..body.len().min(200)]
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AdvisorError::Schema(format!("response was not JSON: {e}")))?;

        let text = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AdvisorError::Schema("no content in response".into()))?;

        parse_decision(text)
    }

    async fn evaluate_with_retries(
        &self,
        req: &TimeoutDecisionRequest,
    ) -> Result<TimeoutDecisionResult, AdvisorError> {
        let mut last_err = AdvisorError::Transport("no attempts made".into());
        for attempt in 1..=ADVISOR_ATTEMPTS {
            match self.call_once(req).await {
                Ok(decision) => {
                    info!(
                        "advisor decision: {}s -> {}s ({})",
                        req.current_timeout_secs, decision.new_timeout_secs, decision.reason
                    );
                    return Ok(decision);
                }
                Err(e) => {
                    warn!("advisor attempt {}/{} failed: {}", attempt, ADVISOR_ATTEMPTS, e);
                    last_err = e;
                    if attempt < ADVISOR_ATTEMPTS {
                        tokio::time::sleep(RETRY_PAUSE).await;
                    }
                }
            }
        }
        Err(last_err)
    }
}

#[async_trait]
impl TimeoutAdvisor for ModelAdvisor {
    async fn evaluate(
        &self,
        req: &TimeoutDecisionRequest,
    ) -> Result<TimeoutDecisionResult, AdvisorError> {
        let deadline = Duration::from_secs(self.config.advisor_deadline_secs);
        deadline_guard(deadline, self.evaluate_with_retries(req)).await
    }
}

/// Cap a whole evaluation (retries included) at `limit` wall-clock time.
async fn deadline_guard<F>(limit: Duration, fut: F) -> Result<TimeoutDecisionResult, AdvisorError>
where
    F: std::future::Future<Output = Result<TimeoutDecisionResult, AdvisorError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AdvisorError::DeadlineExceeded(limit)),
    }
}

// ── Output parsing ──

#[derive(serde::Deserialize)]
struct RawDecision {
    #[serde(rename = "newTimeout")]
    new_timeout: f64,
    reason: String,
}

/// Parse the model's reply into a decision. Tolerates code fences and prose
/// around the JSON object; rejects non-positive timeouts and empty reasons.
/// The returned value is already clamped to the floor.
fn parse_decision(text: &str) -> Result<TimeoutDecisionResult, AdvisorError> {
    let json_str = extract_json(text)
        .ok_or_else(|| AdvisorError::Schema("no JSON object in output".into()))?;

    let raw: RawDecision = serde_json::from_str(json_str).map_err(|e| {
        let snippet: String = json_str.chars().take(200).collect();
        AdvisorError::Schema(format!("malformed decision ({e}): {snippet}"))
    })?;

    if !raw.new_timeout.is_finite() || raw.new_timeout < 1.0 {
        return Err(AdvisorError::Schema(format!(
            "unusable timeout value: {}",
            raw.new_timeout
        )));
    }
    if raw.reason.trim().is_empty() {
        return Err(AdvisorError::Schema("empty reason".into()));
    }

    Ok(TimeoutDecisionResult {
        new_timeout_secs: clamp_timeout(raw.new_timeout.round() as u32),
        reason: raw.reason,
    })
}

/// First `{` to last `}` — good enough for a single-object reply.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

// ── Rule advisor ──

/// Deterministic advisor applying the same qualitative policy the model is
/// prompted with. Used when no API key is configured.
pub struct RuleAdvisor;

impl RuleAdvisor {
    pub fn decide(req: &TimeoutDecisionRequest) -> TimeoutDecisionResult {
        let lowered = req.message_content.to_lowercase();
        let suspicious = prompts::SUSPICIOUS_KEYWORDS
            .iter()
            .any(|k| lowered.contains(k));

        let (proposed, reason) = if suspicious {
            (
                req.current_timeout_secs / 2,
                "Potentially sensitive content detected; shortening the session.",
            )
        } else if req.user_activity_level >= 4 {
            (
                req.current_timeout_secs.max(INITIAL_TIMEOUT_SECS),
                "High activity; keeping the session open.",
            )
        } else if req.user_activity_level <= 1 {
            (
                req.current_timeout_secs.saturating_sub(60),
                "Low activity; shortening the session.",
            )
        } else {
            (req.current_timeout_secs, "Steady activity; no change.")
        };

        TimeoutDecisionResult {
            new_timeout_secs: clamp_timeout(proposed),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl TimeoutAdvisor for RuleAdvisor {
    async fn evaluate(
        &self,
        req: &TimeoutDecisionRequest,
    ) -> Result<TimeoutDecisionResult, AdvisorError> {
        Ok(Self::decide(req))
    }
}
