//! The host-document seam: everything the engine needs from a live, rendered
//! page, expressed as an object-safe async port. The engine only reads the
//! document and dispatches synthetic interaction events through this trait;
//! it never owns the document's lifecycle.

pub mod selector;
#[cfg(test)]
pub(crate) mod testutil;
pub mod visibility;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{BoundingBox, ScrollDirection, Viewport};

/// Opaque handle to one element, valid only for the current document
/// generation. A navigation or re-render invalidates outstanding ids; using
/// one afterwards fails with [`DomError::StaleNode`].
pub type NodeId = u64;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("node {0} is no longer attached to the document")]
    StaleNode(NodeId),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("document evaluation failed: {0}")]
    Eval(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMeta {
    pub url: String,
    pub title: String,
    pub viewport: Viewport,
}

/// The computed-style facts the visibility filter needs, plus whether the
/// element participates in layout (the `offsetParent` probe).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleSummary {
    pub display: String,
    pub visibility: String,
    pub opacity: String,
    pub has_layout_parent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub tag: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub classes: Vec<String>,
    /// Full attribute map, with the live `value`/`href`/`src` properties
    /// folded in by the port implementation.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Rendered text, trimmed.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    pub style: StyleSummary,
    /// 1-based position among the parent's element children.
    pub sibling_position: u32,
}

impl NodeInfo {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attr_or_empty(&self, name: &str) -> String {
        self.attr(name).unwrap_or_default().to_string()
    }
}

/// Read/act surface over one live document. Implementations must resolve
/// selectors against the document as it is *now*; callers are expected to
/// re-query rather than hold node ids across actions.
#[async_trait]
pub trait DocumentPort: Send + Sync {
    async fn meta(&self) -> Result<PageMeta, DomError>;

    /// Rendered body text with script/style/noscript subtrees stripped,
    /// truncated to at most `max_chars` characters.
    async fn readable_text(&self, max_chars: usize) -> Result<String, DomError>;

    /// All elements matching `selector`, in document order.
    async fn query(&self, selector: &str) -> Result<Vec<NodeId>, DomError>;

    /// Matching descendants of `node`, in document order.
    async fn query_within(&self, node: NodeId, selector: &str) -> Result<Vec<NodeId>, DomError>;

    async fn info(&self, node: NodeId) -> Result<NodeInfo, DomError>;

    async fn parent(&self, node: NodeId) -> Result<Option<NodeId>, DomError>;

    async fn inner_html(&self, node: NodeId) -> Result<String, DomError>;

    async fn click(&self, node: NodeId) -> Result<(), DomError>;

    /// Focus the element, replace its value, and dispatch synthetic `input`
    /// and `change` events so page-side listeners react as if a user typed.
    async fn set_value(&self, node: NodeId, value: &str) -> Result<(), DomError>;

    async fn scroll_into_view(&self, node: NodeId) -> Result<(), DomError>;

    /// Move the viewport: up/down step by 80% of the viewport height,
    /// top/bottom jump to the document edges.
    async fn scroll(&self, direction: ScrollDirection) -> Result<(), DomError>;

    /// Assign the new location. Returns as soon as the assignment is made;
    /// completion of the navigation is not awaited.
    async fn navigate(&self, url: &str) -> Result<(), DomError>;

    /// Apply or roll back the highlight outline/tint, preserving the
    /// element's prior inline style across the round trip.
    async fn set_highlight(&self, node: NodeId, on: bool) -> Result<(), DomError>;
}
