use super::StyleSummary;

/// Whether an element is meaningfully visible: not `display: none`, not
/// `visibility: hidden`, not fully transparent, and participating in layout.
pub fn is_visible(style: &StyleSummary) -> bool {
    style.display != "none"
        && style.visibility != "hidden"
        && style.opacity != "0"
        && style.has_layout_parent
}
