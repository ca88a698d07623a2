//! Resilience layer around snapshot extraction. Observation can fail (a
//! restricted origin, an unreachable page); the rest of the pipeline must
//! still receive *some* valid snapshot, so failures degrade instead of
//! propagating.

use tracing::warn;

use crate::dom::DocumentPort;
use crate::snapshot::extract;
use crate::types::{ExecutionSettings, PageSnapshot, Viewport};

/// Placeholder body text carried by a degraded snapshot, so the planner sees
/// an explanation instead of silence.
pub const DEGRADED_TEXT: &str = "Page content could not be retrieved. This may happen on \
     restricted pages (browser settings, extension pages) or if the page cannot be observed.";

/// A snapshot together with its fidelity. Downstream consumers branch on the
/// variant instead of catching errors.
#[derive(Debug, Clone)]
pub enum PageObservation {
    Full(PageSnapshot),
    Degraded { snapshot: PageSnapshot, reason: String },
}

impl PageObservation {
    pub fn snapshot(&self) -> &PageSnapshot {
        match self {
            PageObservation::Full(snapshot) => snapshot,
            PageObservation::Degraded { snapshot, .. } => snapshot,
        }
    }

    pub fn degradation(&self) -> Option<&str> {
        match self {
            PageObservation::Full(_) => None,
            PageObservation::Degraded { reason, .. } => Some(reason),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, PageObservation::Degraded { .. })
    }
}

/// Observe the page, degrading to a minimal snapshot on any failure. The
/// degraded snapshot carries the best-available identifying data and empty
/// collections, so the planner knows it is operating blind.
pub async fn observe(doc: &dyn DocumentPort, settings: &ExecutionSettings) -> PageObservation {
    match extract(doc, settings).await {
        Ok(snapshot) => PageObservation::Full(snapshot),
        Err(err) => {
            warn!(error = %err, "page observation failed; continuing with a degraded snapshot");
            let (url, title, viewport) = match doc.meta().await {
                Ok(meta) => (meta.url, meta.title, meta.viewport),
                Err(_) => ("unknown".to_string(), "Unknown".to_string(), Viewport::default()),
            };
            PageObservation::Degraded {
                snapshot: PageSnapshot {
                    url,
                    title,
                    text: DEGRADED_TEXT.to_string(),
                    interactive_elements: Vec::new(),
                    forms: Vec::new(),
                    links: Vec::new(),
                    images: Vec::new(),
                    viewport,
                },
                reason: err.to_string(),
            }
        }
    }
}
