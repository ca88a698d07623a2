//! Sequences one task end to end: observe the page, ask the planner for a
//! plan, then run the plan one action at a time. The document is a single
//! shared mutable resource; strict sequential execution, plus the one-task
//! in-flight gate, is the concurrency discipline that protects it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::dom::DocumentPort;
use crate::errors::EngineError;
use crate::executor::execute;
use crate::observe::observe;
use crate::planner::{PlanStep, PlannerClient, decode_plan};
use crate::snapshot::is_restricted_url;
use crate::types::{Action, ActionResult, ExecutionSettings};

/// What a completed task reports back to the caller.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub understanding: String,
    pub summary: String,
    /// Set when the plan was made against a degraded snapshot.
    pub degraded: Option<String>,
    /// One entry per attempted action, in plan order.
    pub results: Vec<ActionResult>,
}

pub struct Agent {
    doc: Arc<dyn DocumentPort>,
    planner: PlannerClient,
    settings: ExecutionSettings,
    in_flight: Mutex<()>,
}

impl Agent {
    pub fn new(
        doc: Arc<dyn DocumentPort>,
        planner: PlannerClient,
        settings: ExecutionSettings,
    ) -> Self {
        Self { doc, planner, settings, in_flight: Mutex::new(()) }
    }

    /// Run one task against the current page. Only one task may be in flight
    /// at a time; overlapping calls fail fast with [`EngineError::Busy`].
    pub async fn run_task(&self, task: &str, session_id: &str) -> Result<TaskOutcome, EngineError> {
        let _guard = self.in_flight.try_lock().map_err(|_| EngineError::Busy)?;

        info!(%task, %session_id, "starting task");
        let observation = observe(self.doc.as_ref(), &self.settings).await;
        let response = self.planner.plan(task, &observation, session_id).await?;
        let plan = decode_plan(&response.actions);
        let results = self.run_plan(plan).await?;

        Ok(TaskOutcome {
            understanding: response.understanding,
            summary: response.result,
            degraded: observation.degradation().map(str::to_owned),
            results,
        })
    }

    /// Execute a decoded plan sequentially. Never runs more than
    /// `max_actions` steps (order-preserving prefix truncation); a failing
    /// step is reported and the rest of the plan still runs; a successful
    /// navigation abandons the remainder, since it targets a document that
    /// no longer exists. On a browser-internal page no step touches the
    /// document; each planned step is refused in place, so the planner's
    /// understanding and summary still reach the caller.
    pub async fn run_plan(&self, plan: Vec<PlanStep>) -> Result<Vec<ActionResult>, EngineError> {
        let meta = self.doc.meta().await?;
        if is_restricted_url(&meta.url) {
            warn!(url = %meta.url, "browser-internal page; refusing every step without executing");
            return Ok(plan
                .into_iter()
                .take(self.settings.max_actions)
                .map(|_| ActionResult::failed(EngineError::RestrictedPage { url: meta.url.clone() }))
                .collect());
        }

        let planned = plan.len();
        if planned > self.settings.max_actions {
            warn!(
                planned,
                max_actions = self.settings.max_actions,
                "plan exceeds the action cap; executing the leading steps only"
            );
        }

        let mut results = Vec::new();
        for (index, step) in plan.into_iter().take(self.settings.max_actions).enumerate() {
            let (result, navigated) = match step {
                PlanStep::Unsupported { action_type } => (
                    ActionResult::failed(EngineError::UnsupportedAction { action_type }),
                    false,
                ),
                PlanStep::Supported(descriptor) => {
                    let navigated = matches!(descriptor.action, Action::Navigate { .. });
                    let result = execute(&self.doc, &descriptor, &self.settings).await;
                    (result, navigated)
                }
            };

            if let Some(error) = &result.error {
                warn!(step = index + 1, %error, "step failed; continuing with the rest of the plan");
            }
            let stop_after_navigation = navigated && result.success;
            results.push(result);

            if stop_after_navigation {
                info!(step = index + 1, "plan abandoned after navigation; the page is changing");
                break;
            }
            sleep(Duration::from_millis(self.settings.action_delay_ms)).await;
        }

        Ok(results)
    }
}
