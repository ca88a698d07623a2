//! Page observation and action execution engine for an LLM browsing agent.
//!
//! The engine observes the current page as a structured snapshot, sends it to
//! an external planning backend along with a natural-language task, and then
//! executes the returned action plan against the live document. All DOM
//! access goes through the [`dom::DocumentPort`] trait; the shipped
//! implementation drives a headless Chrome tab over CDP.

pub mod agent;
pub mod chrome;
pub mod dom;
pub mod errors;
pub mod executor;
pub mod logging;
pub mod observe;
pub mod planner;
pub mod snapshot;
pub mod types;

pub use agent::{Agent, TaskOutcome};
pub use chrome::{BrowserSession, ChromeDocument};
pub use errors::EngineError;
pub use observe::{PageObservation, observe};
pub use planner::{ModelConfig, PlanStep, PlannerClient, decode_plan};
pub use snapshot::extract;
pub use types::{Action, ActionDescriptor, ActionResult, ExecutionSettings, PageSnapshot};
