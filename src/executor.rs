//! Executes one action descriptor against the live document. The target
//! selector is re-resolved here, at the moment of use: elements may have
//! moved or vanished since the snapshot was taken, and a stale handle must
//! fail cleanly rather than act on the wrong node.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::dom::{DocumentPort, NodeId};
use crate::errors::EngineError;
use crate::types::{Action, ActionDescriptor, ActionResult, ExecutionSettings};

/// Settle time after scrolling an element into view, before acting on it.
pub const SETTLE_DELAY_MS: u64 = 300;
/// How long the highlight outline stays on before the style is rolled back.
pub const HIGHLIGHT_DURATION_MS: u64 = 2000;
/// Wait duration when the planner omits one.
pub const DEFAULT_WAIT_MS: u64 = 1000;

/// Run a single action. Failures are folded into a `success: false` result;
/// this function never escalates past the step it was given.
pub async fn execute(
    doc: &Arc<dyn DocumentPort>,
    descriptor: &ActionDescriptor,
    settings: &ExecutionSettings,
) -> ActionResult {
    debug!(action = ?descriptor.action, description = %descriptor.description, "executing action");
    match run_action(doc, &descriptor.action, settings).await {
        Ok(result) => result,
        Err(err) => {
            warn!(error = %err, "action failed");
            ActionResult::failed(err)
        }
    }
}

async fn run_action(
    doc: &Arc<dyn DocumentPort>,
    action: &Action,
    settings: &ExecutionSettings,
) -> Result<ActionResult, EngineError> {
    match action {
        Action::Click { selector } => {
            let node = resolve(doc.as_ref(), selector).await?;
            if settings.highlight_elements {
                highlight(doc, node).await;
            }
            if settings.auto_scroll {
                settle_into_view(doc.as_ref(), node).await?;
            }
            doc.click(node).await?;
            Ok(ActionResult::ok(format!("Clicked {selector}")))
        }
        Action::Type { selector, value } => {
            let node = resolve(doc.as_ref(), selector).await?;
            if settings.highlight_elements {
                highlight(doc, node).await;
            }
            if settings.auto_scroll {
                settle_into_view(doc.as_ref(), node).await?;
            }
            doc.set_value(node, value).await?;
            Ok(ActionResult::ok(format!("Typed \"{value}\" in {selector}")))
        }
        Action::Scroll { direction } => {
            doc.scroll(*direction).await?;
            Ok(ActionResult::ok(format!("Scrolled {direction}")))
        }
        Action::Navigate { url } => {
            doc.navigate(url).await?;
            Ok(ActionResult::ok(format!("Navigating to {url}")))
        }
        Action::Wait { duration_ms } => {
            let ms = duration_ms.unwrap_or(DEFAULT_WAIT_MS);
            sleep(Duration::from_millis(ms)).await;
            Ok(ActionResult::ok(format!("Waited {ms}ms")))
        }
        Action::Extract { selector } => {
            let node = resolve(doc.as_ref(), selector).await?;
            if settings.highlight_elements {
                highlight(doc, node).await;
            }
            let info = doc.info(node).await?;
            let html = doc.inner_html(node).await?;
            Ok(ActionResult::with_data(
                format!("Extracted content from {selector}"),
                json!({
                    "text": info.text,
                    "html": html,
                    "attributes": info.attributes,
                }),
            ))
        }
    }
}

async fn resolve(doc: &dyn DocumentPort, selector: &str) -> Result<NodeId, EngineError> {
    doc.query(selector)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::ElementNotFound { selector: selector.to_string() })
}

async fn settle_into_view(doc: &dyn DocumentPort, node: NodeId) -> Result<(), EngineError> {
    doc.scroll_into_view(node).await?;
    sleep(Duration::from_millis(SETTLE_DELAY_MS)).await;
    Ok(())
}

/// Mark the target and schedule the rollback on a detached timer, so the
/// element's prior style comes back after the fixed duration no matter what
/// happens to the action itself.
async fn highlight(doc: &Arc<dyn DocumentPort>, node: NodeId) {
    if let Err(err) = doc.set_highlight(node, true).await {
        debug!(error = %err, "highlight skipped");
        return;
    }
    let doc = Arc::clone(doc);
    tokio::spawn(async move {
        sleep(Duration::from_millis(HIGHLIGHT_DURATION_MS)).await;
        if let Err(err) = doc.set_highlight(node, false).await {
            debug!(error = %err, "highlight rollback skipped");
        }
    });
}
