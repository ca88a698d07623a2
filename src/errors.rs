use thiserror::Error;

use crate::dom::DomError;

/// Failures the engine can report. Per-action variants (`ElementNotFound`,
/// `UnsupportedAction`) are caught by the orchestration loop and folded into
/// a failed `ActionResult`; the rest terminate the current request.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("browser-internal pages cannot be observed or acted on: {url}")]
    RestrictedPage { url: String },

    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("unknown action type: {action_type}")]
    UnsupportedAction { action_type: String },

    #[error(
        "planning request timed out after {timeout_secs}s; check that the planning backend is still running"
    )]
    PlanningTimeout { timeout_secs: u64 },

    #[error("planning request failed ({status}): {body}")]
    PlanningFailed { status: u16, body: String },

    #[error("planning backend unreachable: {0}")]
    PlannerUnreachable(String),

    #[error("another task is already in flight")]
    Busy,

    #[error(transparent)]
    Dom(#[from] DomError),
}
