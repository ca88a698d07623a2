use super::{DocumentPort, DomError, NodeId};

/// Longest positional path emitted by the fallback. Deeper ancestry is cut
/// off to keep selectors short, accepting the non-uniqueness risk.
pub const MAX_PATH_SEGMENTS: usize = 5;

/// Derive a selector for `node`. Deterministic and total: some selector is
/// always produced. Semantic anchors are preferred, each checked for
/// document-wide uniqueness before acceptance, with a depth-limited
/// positional path as the last resort.
pub async fn synthesize(doc: &dyn DocumentPort, node: NodeId) -> Result<String, DomError> {
    let info = doc.info(node).await?;

    if !info.id.is_empty() {
        return Ok(format!("#{}", info.id));
    }

    if !info.classes.is_empty() {
        let candidate = format!("{}.{}", info.tag, info.classes.join("."));
        if doc.query(&candidate).await?.len() == 1 {
            return Ok(candidate);
        }
    }

    if let Some(name) = info.attr("name") {
        if !name.is_empty() {
            let candidate = format!("{}[name=\"{}\"]", info.tag, name.replace('"', "\\\""));
            if doc.query(&candidate).await?.len() == 1 {
                return Ok(candidate);
            }
        }
    }

    positional_path(doc, node).await
}

/// `tag:nth-child(i)` segments joined with child combinators, from the
/// highest reachable ancestor down to the element itself.
async fn positional_path(doc: &dyn DocumentPort, node: NodeId) -> Result<String, DomError> {
    let mut path: Vec<String> = Vec::new();
    let mut current = Some(node);

    while let Some(n) = current {
        if path.len() == MAX_PATH_SEGMENTS {
            break;
        }
        let info = doc.info(n).await?;
        let parent = doc.parent(n).await?;
        let segment = if parent.is_some() {
            format!("{}:nth-child({})", info.tag, info.sibling_position)
        } else {
            info.tag
        };
        path.insert(0, segment);
        current = parent;
    }

    Ok(path.join(" > "))
}
