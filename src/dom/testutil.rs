//! In-memory stand-in for a live document, used by the unit tests. Implements
//! [`DocumentPort`] over a small element tree with a matcher for the selector
//! shapes the engine emits and consumes (tag, `#id`, `.class`, `[attr]`,
//! `[attr="value"]`, `:nth-child(n)`, child/descendant combinators, comma
//! lists), and records every interaction so tests can assert on effects.
//!
//! Style facts are orthogonal by construction: `display`/`visibility`/
//! `opacity` and layout participation are set independently per node, so each
//! visibility condition can be tested in isolation.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{DocumentPort, DomError, NodeId, NodeInfo, PageMeta, StyleSummary};
use crate::types::{BoundingBox, ScrollDirection, Viewport};

const HIGHLIGHT_OUTLINE: &str = "3px solid #ff6b6b";
const HIGHLIGHT_BACKGROUND: &str = "rgba(255, 107, 107, 0.1)";

#[derive(Debug, Clone, Default)]
struct FakeNode {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    children: Vec<usize>,
    parent: Option<usize>,
    removed: bool,
    display: Option<String>,
    visibility: Option<String>,
    opacity: Option<String>,
    detached_from_layout: bool,
    outline: String,
    background: String,
    saved_style: Option<(String, String)>,
}

#[derive(Debug, Default)]
struct State {
    url: String,
    title: String,
    viewport: Viewport,
    nodes: Vec<FakeNode>,
    clicks: Vec<NodeId>,
    events: Vec<(NodeId, String)>,
    focused: Option<NodeId>,
    scrolls: Vec<ScrollDirection>,
    scrolled_into_view: Vec<NodeId>,
    navigations: Vec<String>,
}

pub(crate) struct FakeDocument {
    state: Mutex<State>,
}

impl FakeDocument {
    pub fn new(url: &str, title: &str) -> Self {
        let mut state = State {
            url: url.to_string(),
            title: title.to_string(),
            viewport: Viewport { width: 1280, height: 800, scroll_y: 0.0 },
            ..State::default()
        };
        let html = FakeNode { tag: "html".into(), ..FakeNode::default() };
        let body = FakeNode { tag: "body".into(), parent: Some(0), ..FakeNode::default() };
        state.nodes.push(html);
        state.nodes.push(body);
        state.nodes[0].children.push(1);
        Self { state: Mutex::new(state) }
    }

    pub fn body(&self) -> NodeId {
        1
    }

    pub fn append(&self, parent: NodeId, tag: &str) -> NodeId {
        self.append_with(parent, tag, &[])
    }

    pub fn append_with(&self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let mut state = self.state.lock().unwrap();
        let idx = state.nodes.len();
        let mut node = FakeNode {
            tag: tag.to_string(),
            parent: Some(parent as usize),
            ..FakeNode::default()
        };
        for (name, value) in attrs {
            node.attributes.insert((*name).to_string(), (*value).to_string());
        }
        state.nodes.push(node);
        state.nodes[parent as usize].children.push(idx);
        idx as NodeId
    }

    pub fn set_text(&self, node: NodeId, text: &str) {
        self.state.lock().unwrap().nodes[node as usize].text = text.to_string();
    }

    pub fn set_display(&self, node: NodeId, value: &str) {
        self.state.lock().unwrap().nodes[node as usize].display = Some(value.to_string());
    }

    pub fn set_visibility(&self, node: NodeId, value: &str) {
        self.state.lock().unwrap().nodes[node as usize].visibility = Some(value.to_string());
    }

    pub fn set_opacity(&self, node: NodeId, value: &str) {
        self.state.lock().unwrap().nodes[node as usize].opacity = Some(value.to_string());
    }

    pub fn detach_from_layout(&self, node: NodeId) {
        self.state.lock().unwrap().nodes[node as usize].detached_from_layout = true;
    }

    /// Detach a subtree, simulating a re-render that dropped the element.
    pub fn remove(&self, node: NodeId) {
        let mut state = self.state.lock().unwrap();
        let idx = node as usize;
        if let Some(parent) = state.nodes[idx].parent {
            state.nodes[parent].children.retain(|&child| child != idx);
        }
        state.nodes[idx].removed = true;
    }

    pub fn clicks(&self) -> Vec<NodeId> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn events(&self, node: NodeId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|(id, _)| *id == node)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.state.lock().unwrap().focused
    }

    pub fn value(&self, node: NodeId) -> Option<String> {
        self.state.lock().unwrap().nodes[node as usize].attributes.get("value").cloned()
    }

    pub fn scrolls(&self) -> Vec<ScrollDirection> {
        self.state.lock().unwrap().scrolls.clone()
    }

    pub fn scrolled_into_view(&self) -> Vec<NodeId> {
        self.state.lock().unwrap().scrolled_into_view.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn outline(&self, node: NodeId) -> String {
        self.state.lock().unwrap().nodes[node as usize].outline.clone()
    }

    pub fn background(&self, node: NodeId) -> String {
        self.state.lock().unwrap().nodes[node as usize].background.clone()
    }
}

fn live(state: &State, node: NodeId) -> Result<usize, DomError> {
    let idx = node as usize;
    if idx >= state.nodes.len() {
        return Err(DomError::StaleNode(node));
    }
    let mut current = idx;
    loop {
        if state.nodes[current].removed {
            return Err(DomError::StaleNode(node));
        }
        match state.nodes[current].parent {
            Some(parent) => current = parent,
            None => break,
        }
    }
    if current == 0 { Ok(idx) } else { Err(DomError::StaleNode(node)) }
}

fn position_of(state: &State, idx: usize) -> u32 {
    match state.nodes[idx].parent {
        Some(parent) => {
            state.nodes[parent]
                .children
                .iter()
                .position(|&child| child == idx)
                .map(|pos| pos as u32 + 1)
                .unwrap_or(1)
        }
        None => 1,
    }
}

fn gather_text(state: &State, idx: usize, skip_nonreadable: bool, out: &mut Vec<String>) {
    let node = &state.nodes[idx];
    if skip_nonreadable && matches!(node.tag.as_str(), "script" | "style" | "noscript") {
        return;
    }
    if !node.text.is_empty() {
        out.push(node.text.clone());
    }
    for &child in &node.children {
        gather_text(state, child, skip_nonreadable, out);
    }
}

fn serialize_node(state: &State, idx: usize) -> String {
    let node = &state.nodes[idx];
    let mut attrs = String::new();
    for (name, value) in &node.attributes {
        attrs.push_str(&format!(" {name}=\"{value}\""));
    }
    format!("<{0}{1}>{2}</{0}>", node.tag, attrs, serialize_children(state, idx))
}

fn serialize_children(state: &State, idx: usize) -> String {
    let node = &state.nodes[idx];
    let mut out = node.text.clone();
    for &child in &node.children {
        out.push_str(&serialize_node(state, child));
    }
    out
}

fn node_info(state: &State, idx: usize) -> NodeInfo {
    let node = &state.nodes[idx];
    let mut text = Vec::new();
    gather_text(state, idx, false, &mut text);
    let classes = node
        .attributes
        .get("class")
        .map(|raw| raw.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    NodeInfo {
        tag: node.tag.clone(),
        id: node.attributes.get("id").cloned().unwrap_or_default(),
        classes,
        attributes: node.attributes.clone(),
        text: text.join(" ").trim().to_string(),
        bounding_box: BoundingBox::default(),
        style: StyleSummary {
            display: node.display.clone().unwrap_or_else(|| "block".into()),
            visibility: node.visibility.clone().unwrap_or_else(|| "visible".into()),
            opacity: node.opacity.clone().unwrap_or_else(|| "1".into()),
            has_layout_parent: !node.detached_from_layout,
        },
        sibling_position: position_of(state, idx),
    }
}

// ---------------------------------------------------------------------------
// Selector matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct SimpleSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
    nth_child: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Combinator {
    Child,
    Descendant,
}

#[derive(Debug, Clone)]
struct SelectorPath {
    segments: Vec<SimpleSelector>,
    combinators: Vec<Combinator>,
}

fn split_list(selector: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for c in selector.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                current.push(c);
            }
            '[' | '(' => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn parse_path(part: &str) -> Result<SelectorPath, String> {
    let mut segments = Vec::new();
    let mut combinators = Vec::new();
    let mut pending: Option<Combinator> = None;
    let mut token = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    let mut flush = |token: &mut String,
                     segments: &mut Vec<SimpleSelector>,
                     combinators: &mut Vec<Combinator>,
                     pending: &mut Option<Combinator>|
     -> Result<(), String> {
        if token.is_empty() {
            return Ok(());
        }
        let segment = parse_compound(token)?;
        if !segments.is_empty() {
            combinators.push(pending.take().unwrap_or(Combinator::Descendant));
        } else {
            *pending = None;
        }
        segments.push(segment);
        token.clear();
        Ok(())
    };

    for c in part.chars() {
        if let Some(q) = quote {
            token.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                token.push(c);
            }
            '[' | '(' => {
                depth += 1;
                token.push(c);
            }
            ']' | ')' => {
                depth -= 1;
                token.push(c);
            }
            '>' if depth == 0 => {
                flush(&mut token, &mut segments, &mut combinators, &mut pending)?;
                pending = Some(Combinator::Child);
            }
            c if c.is_whitespace() && depth == 0 => {
                flush(&mut token, &mut segments, &mut combinators, &mut pending)?;
                if !segments.is_empty() && pending.is_none() {
                    pending = Some(Combinator::Descendant);
                }
            }
            _ => token.push(c),
        }
    }
    flush(&mut token, &mut segments, &mut combinators, &mut pending)?;

    if segments.is_empty() {
        return Err(format!("empty selector: {part:?}"));
    }
    Ok(SelectorPath { segments, combinators })
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(compound: &str) -> Result<SimpleSelector, String> {
    let mut sel = SimpleSelector::default();
    let chars: Vec<char> = compound.chars().collect();
    let mut i = 0;

    let read_ident = |chars: &[char], mut i: usize| -> (String, usize) {
        let start = i;
        while i < chars.len() && is_ident_char(chars[i]) {
            i += 1;
        }
        (chars[start..i].iter().collect(), i)
    };

    if i < chars.len() && (chars[i] == '*' || is_ident_char(chars[i])) {
        if chars[i] == '*' {
            sel.tag = Some("*".into());
            i += 1;
        } else {
            let (tag, next) = read_ident(&chars, i);
            sel.tag = Some(tag.to_ascii_lowercase());
            i = next;
        }
    }

    while i < chars.len() {
        match chars[i] {
            '#' => {
                let (id, next) = read_ident(&chars, i + 1);
                if id.is_empty() {
                    return Err(format!("bad id selector in {compound:?}"));
                }
                sel.id = Some(id);
                i = next;
            }
            '.' => {
                let (class, next) = read_ident(&chars, i + 1);
                if class.is_empty() {
                    return Err(format!("bad class selector in {compound:?}"));
                }
                sel.classes.push(class);
                i = next;
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&c| c == ']')
                    .ok_or_else(|| format!("unterminated attribute selector in {compound:?}"))?;
                let body: String = chars[i + 1..i + close].iter().collect();
                let (name, value) = match body.split_once('=') {
                    Some((name, raw)) => {
                        let raw = raw.trim();
                        let unquoted = raw
                            .strip_prefix('"')
                            .and_then(|r| r.strip_suffix('"'))
                            .or_else(|| raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))
                            .unwrap_or(raw);
                        (name.trim().to_string(), Some(unquoted.to_string()))
                    }
                    None => (body.trim().to_string(), None),
                };
                if name.is_empty() {
                    return Err(format!("bad attribute selector in {compound:?}"));
                }
                sel.attrs.push((name, value));
                i += close + 1;
            }
            ':' => {
                let (name, next) = read_ident(&chars, i + 1);
                if name != "nth-child" {
                    return Err(format!("unsupported pseudo-class :{name}"));
                }
                if next >= chars.len() || chars[next] != '(' {
                    return Err(format!("bad :nth-child in {compound:?}"));
                }
                let close = chars[next..]
                    .iter()
                    .position(|&c| c == ')')
                    .ok_or_else(|| format!("bad :nth-child in {compound:?}"))?;
                let arg: String = chars[next + 1..next + close].iter().collect();
                let n: u32 = arg
                    .trim()
                    .parse()
                    .map_err(|_| format!("bad :nth-child argument {arg:?}"))?;
                sel.nth_child = Some(n);
                i = next + close + 1;
            }
            other => return Err(format!("unexpected {other:?} in selector {compound:?}")),
        }
    }

    Ok(sel)
}

fn matches_simple(state: &State, idx: usize, sel: &SimpleSelector) -> bool {
    let node = &state.nodes[idx];
    if let Some(tag) = &sel.tag {
        if tag != "*" && *tag != node.tag {
            return false;
        }
    }
    if let Some(id) = &sel.id {
        if node.attributes.get("id") != Some(id) {
            return false;
        }
    }
    for class in &sel.classes {
        let found = node
            .attributes
            .get("class")
            .map(|raw| raw.split_whitespace().any(|c| c == class))
            .unwrap_or(false);
        if !found {
            return false;
        }
    }
    for (name, expected) in &sel.attrs {
        match (node.attributes.get(name), expected) {
            (None, _) => return false,
            (Some(_), None) => {}
            (Some(actual), Some(expected)) => {
                if actual != expected {
                    return false;
                }
            }
        }
    }
    if let Some(nth) = sel.nth_child {
        if position_of(state, idx) != nth {
            return false;
        }
    }
    true
}

fn matches_path(
    state: &State,
    idx: usize,
    segments: &[SimpleSelector],
    combinators: &[Combinator],
) -> bool {
    let (last, init) = match segments.split_last() {
        Some(split) => split,
        None => return false,
    };
    if !matches_simple(state, idx, last) {
        return false;
    }
    if init.is_empty() {
        return true;
    }
    let (comb, init_combs) = match combinators.split_last() {
        Some(split) => split,
        None => return false,
    };
    match comb {
        Combinator::Child => state.nodes[idx]
            .parent
            .is_some_and(|parent| matches_path(state, parent, init, init_combs)),
        Combinator::Descendant => {
            let mut ancestor = state.nodes[idx].parent;
            while let Some(parent) = ancestor {
                if matches_path(state, parent, init, init_combs) {
                    return true;
                }
                ancestor = state.nodes[parent].parent;
            }
            false
        }
    }
}

fn query_from(state: &State, root: usize, selector: &str) -> Result<Vec<NodeId>, DomError> {
    let paths: Vec<SelectorPath> = split_list(selector)
        .iter()
        .map(|part| parse_path(part))
        .collect::<Result<_, _>>()
        .map_err(DomError::InvalidSelector)?;

    let mut matched = Vec::new();
    let mut stack = vec![root];
    let mut ordered = Vec::new();
    while let Some(idx) = stack.pop() {
        ordered.push(idx);
        for &child in state.nodes[idx].children.iter().rev() {
            stack.push(child);
        }
    }
    for idx in ordered {
        if idx == root && root != 0 {
            continue; // scoped queries match descendants only
        }
        if paths
            .iter()
            .any(|path| matches_path(state, idx, &path.segments, &path.combinators))
        {
            matched.push(idx as NodeId);
        }
    }
    Ok(matched)
}

#[async_trait]
impl DocumentPort for FakeDocument {
    async fn meta(&self) -> Result<PageMeta, DomError> {
        let state = self.state.lock().unwrap();
        Ok(PageMeta {
            url: state.url.clone(),
            title: state.title.clone(),
            viewport: state.viewport,
        })
    }

    async fn readable_text(&self, max_chars: usize) -> Result<String, DomError> {
        let state = self.state.lock().unwrap();
        let mut parts = Vec::new();
        gather_text(&state, 1, true, &mut parts);
        Ok(crate::types::truncate_chars(parts.join(" ").trim(), max_chars))
    }

    async fn query(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let state = self.state.lock().unwrap();
        query_from(&state, 0, selector)
    }

    async fn query_within(&self, node: NodeId, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let state = self.state.lock().unwrap();
        let idx = live(&state, node)?;
        query_from(&state, idx, selector)
    }

    async fn info(&self, node: NodeId) -> Result<NodeInfo, DomError> {
        let state = self.state.lock().unwrap();
        let idx = live(&state, node)?;
        Ok(node_info(&state, idx))
    }

    async fn parent(&self, node: NodeId) -> Result<Option<NodeId>, DomError> {
        let state = self.state.lock().unwrap();
        let idx = live(&state, node)?;
        Ok(state.nodes[idx].parent.map(|parent| parent as NodeId))
    }

    async fn inner_html(&self, node: NodeId) -> Result<String, DomError> {
        let state = self.state.lock().unwrap();
        let idx = live(&state, node)?;
        Ok(serialize_children(&state, idx))
    }

    async fn click(&self, node: NodeId) -> Result<(), DomError> {
        let mut state = self.state.lock().unwrap();
        live(&state, node)?;
        state.clicks.push(node);
        Ok(())
    }

    async fn set_value(&self, node: NodeId, value: &str) -> Result<(), DomError> {
        let mut state = self.state.lock().unwrap();
        let idx = live(&state, node)?;
        state.focused = Some(node);
        state.nodes[idx].attributes.insert("value".into(), value.to_string());
        state.events.push((node, "input".into()));
        state.events.push((node, "change".into()));
        Ok(())
    }

    async fn scroll_into_view(&self, node: NodeId) -> Result<(), DomError> {
        let mut state = self.state.lock().unwrap();
        live(&state, node)?;
        state.scrolled_into_view.push(node);
        Ok(())
    }

    async fn scroll(&self, direction: ScrollDirection) -> Result<(), DomError> {
        self.state.lock().unwrap().scrolls.push(direction);
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), DomError> {
        let mut state = self.state.lock().unwrap();
        state.navigations.push(url.to_string());
        state.url = url.to_string();
        Ok(())
    }

    async fn set_highlight(&self, node: NodeId, on: bool) -> Result<(), DomError> {
        let mut state = self.state.lock().unwrap();
        let idx = live(&state, node)?;
        let node_mut = &mut state.nodes[idx];
        if on {
            if node_mut.saved_style.is_none() {
                node_mut.saved_style =
                    Some((node_mut.outline.clone(), node_mut.background.clone()));
            }
            node_mut.outline = HIGHLIGHT_OUTLINE.into();
            node_mut.background = HIGHLIGHT_BACKGROUND.into();
        } else if let Some((outline, background)) = node_mut.saved_style.take() {
            node_mut.outline = outline;
            node_mut.background = background;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queries_match_in_document_order() {
        let doc = FakeDocument::new("https://example.com", "Example");
        let section = doc.append(doc.body(), "section");
        let first = doc.append_with(section, "a", &[("href", "/a")]);
        let second = doc.append_with(doc.body(), "a", &[("href", "/b")]);
        doc.append(doc.body(), "a"); // no href

        assert_eq!(doc.query("a[href]").await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn comma_lists_and_quoted_attributes_work() {
        let doc = FakeDocument::new("https://example.com", "Example");
        let button = doc.append_with(doc.body(), "div", &[("role", "button")]);
        let input = doc.append_with(doc.body(), "input", &[("name", "q")]);

        assert_eq!(
            doc.query("input[name='q'], [role=\"button\"]").await.unwrap(),
            vec![button, input]
        );
    }

    #[tokio::test]
    async fn scoped_queries_exclude_the_scope_root() {
        let doc = FakeDocument::new("https://example.com", "Example");
        let form = doc.append(doc.body(), "form");
        let inside = doc.append(form, "input");
        doc.append(doc.body(), "input");

        assert_eq!(doc.query_within(form, "input").await.unwrap(), vec![inside]);
        assert!(doc.query_within(form, "form").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn removed_nodes_become_stale() {
        let doc = FakeDocument::new("https://example.com", "Example");
        let button = doc.append(doc.body(), "button");
        doc.remove(button);

        assert!(doc.query("button").await.unwrap().is_empty());
        assert!(matches!(doc.info(button).await, Err(DomError::StaleNode(_))));
    }

    #[tokio::test]
    async fn invalid_selectors_are_reported() {
        let doc = FakeDocument::new("https://example.com", "Example");
        assert!(matches!(
            doc.query("div:hover").await,
            Err(DomError::InvalidSelector(_))
        ));
    }
}
