//! Turns a live document into a bounded [`PageSnapshot`]. Every list is a
//! deterministic first-N prefix in document order; nothing is scored or
//! sampled.

use tracing::debug;

use crate::dom::selector::synthesize;
use crate::dom::visibility::is_visible;
use crate::dom::{DocumentPort, DomError, NodeInfo};
use crate::errors::EngineError;
use crate::types::{
    ElementAttributes, ExecutionSettings, FieldDescriptor, FormDescriptor, ImageDescriptor,
    InteractiveElement, LinkDescriptor, PageSnapshot, truncate_chars,
};

/// Candidate set for interaction: native controls plus elements that opt into
/// interactivity via role, click handler, or the editable flag.
pub const INTERACTIVE_CANDIDATES: &str =
    r#"button, a[href], input, textarea, select, [role="button"], [onclick], [contenteditable="true"]"#;

pub const VISIBLE_TEXT_MAX_CHARS: usize = 100;
pub const MAX_LINKS: usize = 30;
pub const MAX_IMAGES: usize = 20;

/// Browser-internal and extension-internal origins are never observed or
/// acted on; they are rejected before any document walk.
pub fn is_restricted_url(url: &str) -> bool {
    if url.starts_with("chrome://") || url.starts_with("chrome-extension://") {
        return true;
    }
    match url.split_once("://") {
        Some((_, rest)) => rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or(rest)
            .eq_ignore_ascii_case("chrome.google.com"),
        None => false,
    }
}

pub async fn extract(
    doc: &dyn DocumentPort,
    settings: &ExecutionSettings,
) -> Result<PageSnapshot, EngineError> {
    let meta = doc.meta().await?;
    if is_restricted_url(&meta.url) {
        return Err(EngineError::RestrictedPage { url: meta.url });
    }

    let text = doc.readable_text(settings.max_text_length).await?;
    let interactive_elements = collect_interactive(doc, settings.max_elements).await?;
    let forms = collect_forms(doc).await?;
    let links = collect_links(doc).await?;
    let images = collect_images(doc).await?;

    debug!(
        url = %meta.url,
        elements = interactive_elements.len(),
        forms = forms.len(),
        links = links.len(),
        images = images.len(),
        "captured page snapshot"
    );

    Ok(PageSnapshot {
        url: meta.url,
        title: meta.title,
        text,
        interactive_elements,
        forms,
        links,
        images,
        viewport: meta.viewport,
    })
}

async fn collect_interactive(
    doc: &dyn DocumentPort,
    max_elements: usize,
) -> Result<Vec<InteractiveElement>, DomError> {
    let mut elements = Vec::new();
    for node in doc.query(INTERACTIVE_CANDIDATES).await? {
        if elements.len() >= max_elements {
            break;
        }
        let info = doc.info(node).await?;
        if !is_visible(&info.style) {
            continue;
        }
        let selector = synthesize(doc, node).await?;
        elements.push(InteractiveElement {
            element_type: info.tag.clone(),
            selector,
            text: truncate_chars(&info.text, VISIBLE_TEXT_MAX_CHARS),
            attributes: element_attributes(&info),
            bounding_box: info.bounding_box,
        });
    }
    Ok(elements)
}

fn element_attributes(info: &NodeInfo) -> ElementAttributes {
    ElementAttributes {
        id: info.id.clone(),
        class: info.classes.join(" "),
        name: info.attr_or_empty("name"),
        type_attr: info.attr_or_empty("type"),
        placeholder: info.attr_or_empty("placeholder"),
        href: info.attr_or_empty("href"),
        value: info.attr_or_empty("value"),
    }
}

async fn collect_forms(doc: &dyn DocumentPort) -> Result<Vec<FormDescriptor>, DomError> {
    let mut forms = Vec::new();
    for form in doc.query("form").await? {
        let mut fields = Vec::new();
        for field in doc.query_within(form, "input, textarea, select").await? {
            let info = doc.info(field).await?;
            fields.push(FieldDescriptor {
                field_type: info
                    .attr("type")
                    .filter(|t| !t.is_empty())
                    .unwrap_or(&info.tag)
                    .to_string(),
                name: info.attr_or_empty("name"),
                id: info.id.clone(),
                placeholder: info.attr_or_empty("placeholder"),
                required: info.attr("required").is_some(),
            });
        }
        let info = doc.info(form).await?;
        forms.push(FormDescriptor {
            action: info.attr_or_empty("action"),
            method: {
                let method = info.attr_or_empty("method");
                if method.is_empty() { "get".into() } else { method }
            },
            fields,
            selector: synthesize(doc, form).await?,
        });
    }
    Ok(forms)
}

async fn collect_links(doc: &dyn DocumentPort) -> Result<Vec<LinkDescriptor>, DomError> {
    let mut links = Vec::new();
    for node in doc.query("a[href]").await? {
        if links.len() >= MAX_LINKS {
            break;
        }
        let info = doc.info(node).await?;
        if !is_visible(&info.style) {
            continue;
        }
        links.push(LinkDescriptor {
            text: truncate_chars(&info.text, VISIBLE_TEXT_MAX_CHARS),
            href: info.attr_or_empty("href"),
            selector: synthesize(doc, node).await?,
        });
    }
    Ok(links)
}

async fn collect_images(doc: &dyn DocumentPort) -> Result<Vec<ImageDescriptor>, DomError> {
    let mut images = Vec::new();
    for node in doc.query("img").await? {
        if images.len() >= MAX_IMAGES {
            break;
        }
        let info = doc.info(node).await?;
        if !is_visible(&info.style) {
            continue;
        }
        images.push(ImageDescriptor {
            src: info.attr_or_empty("src"),
            alt: info.attr_or_empty("alt"),
            selector: synthesize(doc, node).await?,
        });
    }
    Ok(images)
}
