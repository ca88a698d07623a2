use std::fmt;

use serde::{Deserialize, Serialize};

/// A structured, bounded, point-in-time description of a page. Produced fresh
/// per request and handed to the planner as-is; the live document may have
/// changed by the time any of its selectors are used again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub text: String,
    pub interactive_elements: Vec<InteractiveElement>,
    pub forms: Vec<FormDescriptor>,
    pub links: Vec<LinkDescriptor>,
    pub images: Vec<ImageDescriptor>,
    pub viewport: Viewport,
}

/// One candidate for interaction at snapshot time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractiveElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub selector: String,
    pub text: String,
    pub attributes: ElementAttributes,
    #[serde(rename = "position")]
    pub bounding_box: BoundingBox,
}

/// The fixed attribute set reported for interactive elements. Keys absent on
/// the element serialize as empty strings, matching the wire format the
/// planner is prompted with.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ElementAttributes {
    pub id: String,
    pub class: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_attr: String,
    pub placeholder: String,
    pub href: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormDescriptor {
    pub action: String,
    pub method: String,
    pub fields: Vec<FieldDescriptor>,
    pub selector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDescriptor {
    #[serde(rename = "type")]
    pub field_type: String,
    pub name: String,
    pub id: String,
    pub placeholder: String,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkDescriptor {
    pub text: String,
    pub href: String,
    pub selector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageDescriptor {
    pub src: String,
    pub alt: String,
    pub selector: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    #[serde(rename = "scrollY")]
    pub scroll_y: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One step of an action plan, as produced by the planner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionDescriptor {
    #[serde(flatten)]
    pub action: Action,
    #[serde(default)]
    pub description: String,
}

/// The closed action vocabulary. Wire entries carry a `type` tag and reuse a
/// single `value` field for the scroll direction, target URL, and wait
/// duration; anything else the planner emits is rejected at decode time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Click {
        selector: String,
    },
    Type {
        selector: String,
        value: String,
    },
    Scroll {
        #[serde(rename = "value")]
        direction: ScrollDirection,
    },
    Navigate {
        #[serde(rename = "value")]
        url: String,
    },
    Wait {
        #[serde(rename = "value", default)]
        duration_ms: Option<u64>,
    },
    Extract {
        selector: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Top,
    Bottom,
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Top => "top",
            ScrollDirection::Bottom => "bottom",
        };
        f.write_str(label)
    }
}

/// Outcome of a single executed action, reported back up the orchestration
/// chain in plan order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            data: None,
        }
    }

    pub fn with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            data: Some(data),
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.to_string()),
            data: None,
        }
    }
}

/// Bounded execution knobs. Defaults mirror the stored settings the engine
/// ships with; every cap is enforced as a deterministic prefix, never a
/// ranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionSettings {
    pub max_actions: usize,
    pub max_elements: usize,
    pub max_text_length: usize,
    pub action_delay_ms: u64,
    pub highlight_elements: bool,
    pub auto_scroll: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_actions: 10,
            max_elements: 50,
            max_text_length: 5000,
            action_delay_ms: 500,
            highlight_elements: true,
            auto_scroll: true,
        }
    }
}

/// Truncate to a character count without splitting a code point.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
