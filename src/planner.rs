//! HTTP client for the external planning backend: one request per task,
//! carrying the page snapshot, and one decoded action plan back. The backend
//! owns all decision making; this side only reports what the page looks like
//! and runs what comes back.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::errors::EngineError;
use crate::observe::PageObservation;
use crate::types::ActionDescriptor;

pub const DEFAULT_TASK_ENDPOINT: &str = "http://localhost:8001/api/task";
pub const DEFAULT_MODEL: &str = "qwen2.5:0.5b";
pub const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434/v1";
pub const DEFAULT_PERSONALITY: &str = "a helpful and friendly AI browsing assistant";

/// Hard ceiling on one planning round trip.
pub const PLANNING_TIMEOUT_SECS: u64 = 30;

/// Model settings forwarded verbatim to the backend.
#[derive(Debug, Clone, Serialize)]
pub struct ModelConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub personality: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            personality: DEFAULT_PERSONALITY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlannerResponse {
    #[serde(default)]
    pub understanding: String,
    #[serde(default)]
    pub actions: Vec<Value>,
    #[serde(default)]
    pub result: String,
}

/// One entry of a decoded plan. Entries the closed action enum rejects are
/// kept as explicit unsupported steps so the loop can report them in place
/// instead of silently dropping them.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    Supported(ActionDescriptor),
    Unsupported { action_type: String },
}

pub struct PlannerClient {
    http: reqwest::Client,
    endpoint: String,
    config: ModelConfig,
}

impl PlannerClient {
    pub fn new(endpoint: impl Into<String>, config: ModelConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            config,
        }
    }

    /// Request an action plan for `task` given the current observation.
    /// Fatal for the request on timeout, transport failure, or a non-2xx
    /// response; the caller surfaces these as the terminal outcome.
    pub async fn plan(
        &self,
        task: &str,
        observation: &PageObservation,
        session_id: &str,
    ) -> Result<PlannerResponse, EngineError> {
        let body = json!({
            "task": task,
            "page_data": page_payload(observation),
            "config": self.config,
            "session_id": session_id,
        });

        debug!(endpoint = %self.endpoint, %session_id, "requesting action plan");
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(Duration::from_secs(PLANNING_TIMEOUT_SECS))
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    EngineError::PlanningTimeout { timeout_secs: PLANNING_TIMEOUT_SECS }
                } else {
                    EngineError::PlannerUnreachable(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::PlanningFailed { status: status.as_u16(), body });
        }

        response
            .json::<PlannerResponse>()
            .await
            .map_err(|err| EngineError::PlannerUnreachable(format!("malformed planner response: {err}")))
    }
}

/// Serialize the observation for the planner. Degraded observations carry an
/// `error` marker so the backend can tell it is planning blind.
pub fn page_payload(observation: &PageObservation) -> Value {
    let mut payload = serde_json::to_value(observation.snapshot()).unwrap_or(Value::Null);
    if let (Some(reason), Value::Object(map)) = (observation.degradation(), &mut payload) {
        map.insert("error".to_string(), Value::String(reason.to_string()));
    }
    payload
}

/// Decode the planner's raw action array entry by entry. Unknown or malformed
/// entries become [`PlanStep::Unsupported`] rather than aborting the plan.
pub fn decode_plan(actions: &[Value]) -> Vec<PlanStep> {
    actions
        .iter()
        .map(|raw| match serde_json::from_value::<ActionDescriptor>(raw.clone()) {
            Ok(descriptor) => PlanStep::Supported(descriptor),
            Err(err) => {
                let action_type = raw
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("missing")
                    .to_string();
                warn!(%action_type, error = %err, "planner produced an unsupported action");
                PlanStep::Unsupported { action_type }
            }
        })
        .collect()
}
