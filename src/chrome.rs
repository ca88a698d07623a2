//! Live [`DocumentPort`] over a headless_chrome tab. Every operation is one
//! small JavaScript evaluation against a window-scoped node registry; the
//! registry (and with it every outstanding `NodeId`) dies with the document
//! on navigation, which is exactly the staleness contract the engine
//! expects. The blocking CDP client is kept off the async runtime with
//! `spawn_blocking`.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use tracing::info;

use crate::dom::{DocumentPort, DomError, NodeId, NodeInfo, PageMeta};
use crate::types::ScrollDirection;

const DEBUG_ENDPOINT: &str = "http://127.0.0.1:9222";

/// Persistent browser. Attaches to an already-running debuggable Chrome when
/// one is listening, otherwise launches its own.
pub struct BrowserSession {
    browser: Browser,
    tab: Arc<Tab>,
}

impl BrowserSession {
    pub fn launch(headless: bool) -> Result<Self> {
        if let Ok(browser) = Browser::connect(DEBUG_ENDPOINT.to_string()) {
            info!("attached to existing Chrome on {DEBUG_ENDPOINT}");
            let existing = {
                let tabs_lock = browser.get_tabs();
                let tabs = tabs_lock.lock().unwrap();
                tabs.first().cloned()
            };
            let tab = match existing {
                Some(tab) => tab,
                None => browser.new_tab()?,
            };
            return Ok(Self { browser, tab });
        }

        info!("no debuggable Chrome found; launching a new instance");
        let options = LaunchOptions {
            headless,
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
            ],
            idle_browser_timeout: Duration::from_secs(60),
            ..Default::default()
        };
        let browser = Browser::new(options).context("browser launch failed")?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;
        Ok(Self { browser, tab })
    }

    /// Navigate the active tab and wait for the new document to render.
    pub fn goto(&self, url: &str) -> Result<()> {
        self.tab.navigate_to(url)?;
        self.tab.wait_for_element("body")?;
        std::thread::sleep(Duration::from_millis(1500));
        Ok(())
    }

    pub fn new_tab(&mut self) -> Result<()> {
        self.tab = self.browser.new_tab()?;
        Ok(())
    }

    pub fn document(&self) -> Arc<dyn DocumentPort> {
        Arc::new(ChromeDocument::new(Arc::clone(&self.tab)))
    }
}

pub struct ChromeDocument {
    tab: Arc<Tab>,
}

impl ChromeDocument {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    async fn eval(&self, expression: String) -> Result<Value, DomError> {
        let tab = Arc::clone(&self.tab);
        let remote = tokio::task::spawn_blocking(move || tab.evaluate(&expression, false))
            .await
            .map_err(|err| DomError::Eval(format!("evaluation task failed: {err}")))?
            .map_err(|err| DomError::Eval(err.to_string()))?;
        let raw = match remote.value {
            Some(Value::String(raw)) => raw,
            Some(other) => return Ok(other),
            None => return Err(DomError::Eval("evaluation produced no value".into())),
        };
        serde_json::from_str(&raw)
            .map_err(|err| DomError::Eval(format!("malformed evaluation payload: {err}")))
    }

    async fn run(&self, body: String, node: Option<NodeId>) -> Result<Value, DomError> {
        let value = self.eval(program(&body)).await?;
        decode(value, node)
    }
}

/// Shared helpers injected ahead of every evaluation. `take` interns an
/// element into the registry, `live` resolves an id back to a connected
/// element, `done` serializes the result for the wire.
const JS_PRELUDE: &str = r#"
const reg = (window.__pagepilotRegistry = window.__pagepilotRegistry || { nodes: [], saved: {} });
const take = (el) => { let i = reg.nodes.indexOf(el); if (i < 0) { i = reg.nodes.push(el) - 1; } return i; };
const live = (i) => { const el = reg.nodes[i]; return el && el.isConnected ? el : null; };
const done = (v) => JSON.stringify(v === undefined ? null : v);
"#;

fn program(body: &str) -> String {
    format!(
        "(() => {{ try {{\n{JS_PRELUDE}\n{body}\n}} catch (err) {{ return JSON.stringify({{ evalError: String((err && err.message) || err) }}); }} }})()"
    )
}

fn js_str(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

fn node_guard(node: NodeId) -> String {
    format!("const el = live({node});\nif (!el) {{ return done({{ stale: true }}); }}")
}

fn decode(value: Value, node: Option<NodeId>) -> Result<Value, DomError> {
    if let Some(map) = value.as_object() {
        if let Some(err) = map.get("evalError").and_then(Value::as_str) {
            return Err(DomError::Eval(err.to_string()));
        }
        if let Some(err) = map.get("selectorError").and_then(Value::as_str) {
            return Err(DomError::InvalidSelector(err.to_string()));
        }
        if map.contains_key("stale") {
            return Err(DomError::StaleNode(node.unwrap_or_default()));
        }
    }
    Ok(value)
}

fn node_list(value: &Value) -> Result<Vec<NodeId>, DomError> {
    value
        .get("nodes")
        .and_then(Value::as_array)
        .map(|nodes| nodes.iter().filter_map(Value::as_u64).collect())
        .ok_or_else(|| DomError::Eval("evaluation returned no node list".into()))
}

const NODE_INFO_BODY: &str = r#"
const style = getComputedStyle(el);
const attributes = {};
for (const attr of el.attributes) { attributes[attr.name] = attr.value; }
if (el.value !== undefined && el.value !== null) { attributes.value = String(el.value); }
if (el.href) { attributes.href = String(el.href); }
if (el.src) { attributes.src = String(el.src); }
const rect = el.getBoundingClientRect();
const parent = el.parentElement;
return done({
  tag: el.tagName.toLowerCase(),
  id: el.id || '',
  classes: typeof el.className === 'string' ? el.className.trim().split(/\s+/).filter(Boolean) : [],
  attributes,
  text: (el.innerText || '').trim(),
  boundingBox: { x: rect.x, y: rect.y, width: rect.width, height: rect.height },
  style: {
    display: style.display,
    visibility: style.visibility,
    opacity: style.opacity,
    hasLayoutParent: el.offsetParent !== null || el.tagName === 'BODY' || el.tagName === 'HTML'
  },
  siblingPosition: parent ? Array.prototype.indexOf.call(parent.children, el) + 1 : 1
});
"#;

#[async_trait]
impl DocumentPort for ChromeDocument {
    async fn meta(&self) -> Result<PageMeta, DomError> {
        let body = "return done({ url: window.location.href, title: document.title, \
                     viewport: { width: window.innerWidth, height: window.innerHeight, \
                     scrollY: window.scrollY } });"
            .to_string();
        let value = self.run(body, None).await?;
        serde_json::from_value(value)
            .map_err(|err| DomError::Eval(format!("malformed page meta: {err}")))
    }

    async fn readable_text(&self, max_chars: usize) -> Result<String, DomError> {
        let body = format!(
            "const clone = document.body.cloneNode(true);\n\
             clone.querySelectorAll('script, style, noscript').forEach((el) => el.remove());\n\
             const text = (clone.innerText || clone.textContent || '').trim();\n\
             return done(Array.from(text).slice(0, {max_chars}).join(''));"
        );
        let value = self.run(body, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn query(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let body = format!(
            "let matched;\n\
             try {{ matched = document.querySelectorAll({sel}); }}\n\
             catch (err) {{ return done({{ selectorError: String((err && err.message) || err) }}); }}\n\
             return done({{ nodes: Array.from(matched).map(take) }});",
            sel = js_str(selector),
        );
        let value = self.run(body, None).await?;
        node_list(&value)
    }

    async fn query_within(&self, node: NodeId, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let body = format!(
            "{guard}\n\
             let matched;\n\
             try {{ matched = el.querySelectorAll({sel}); }}\n\
             catch (err) {{ return done({{ selectorError: String((err && err.message) || err) }}); }}\n\
             return done({{ nodes: Array.from(matched).map(take) }});",
            guard = node_guard(node),
            sel = js_str(selector),
        );
        let value = self.run(body, Some(node)).await?;
        node_list(&value)
    }

    async fn info(&self, node: NodeId) -> Result<NodeInfo, DomError> {
        let body = format!("{}\n{}", node_guard(node), NODE_INFO_BODY);
        let value = self.run(body, Some(node)).await?;
        serde_json::from_value(value)
            .map_err(|err| DomError::Eval(format!("malformed node info: {err}")))
    }

    async fn parent(&self, node: NodeId) -> Result<Option<NodeId>, DomError> {
        let body = format!(
            "{}\nreturn done({{ parent: el.parentElement ? take(el.parentElement) : null }});",
            node_guard(node),
        );
        let value = self.run(body, Some(node)).await?;
        Ok(value.get("parent").and_then(Value::as_u64))
    }

    async fn inner_html(&self, node: NodeId) -> Result<String, DomError> {
        let body = format!("{}\nreturn done(el.innerHTML);", node_guard(node));
        let value = self.run(body, Some(node)).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn click(&self, node: NodeId) -> Result<(), DomError> {
        let body = format!("{}\nel.click();\nreturn done({{ ok: true }});", node_guard(node));
        self.run(body, Some(node)).await.map(|_| ())
    }

    async fn set_value(&self, node: NodeId, value: &str) -> Result<(), DomError> {
        let body = format!(
            "{guard}\n\
             el.focus();\n\
             el.value = {value};\n\
             el.dispatchEvent(new Event('input', {{ bubbles: true }}));\n\
             el.dispatchEvent(new Event('change', {{ bubbles: true }}));\n\
             return done({{ ok: true }});",
            guard = node_guard(node),
            value = js_str(value),
        );
        self.run(body, Some(node)).await.map(|_| ())
    }

    async fn scroll_into_view(&self, node: NodeId) -> Result<(), DomError> {
        let body = format!(
            "{}\nel.scrollIntoView({{ behavior: 'smooth', block: 'center' }});\nreturn done({{ ok: true }});",
            node_guard(node),
        );
        self.run(body, Some(node)).await.map(|_| ())
    }

    async fn scroll(&self, direction: ScrollDirection) -> Result<(), DomError> {
        let motion = match direction {
            ScrollDirection::Down => {
                "window.scrollBy({ top: window.innerHeight * 0.8, behavior: 'smooth' });"
            }
            ScrollDirection::Up => {
                "window.scrollBy({ top: -window.innerHeight * 0.8, behavior: 'smooth' });"
            }
            ScrollDirection::Top => "window.scrollTo({ top: 0, behavior: 'smooth' });",
            ScrollDirection::Bottom => {
                "window.scrollTo({ top: document.body.scrollHeight, behavior: 'smooth' });"
            }
        };
        let body = format!("{motion}\nreturn done({{ ok: true }});");
        self.run(body, None).await.map(|_| ())
    }

    async fn navigate(&self, url: &str) -> Result<(), DomError> {
        let body = format!(
            "window.location.href = {};\nreturn done({{ ok: true }});",
            js_str(url),
        );
        self.run(body, None).await.map(|_| ())
    }

    async fn set_highlight(&self, node: NodeId, on: bool) -> Result<(), DomError> {
        let body = if on {
            format!(
                "{guard}\n\
                 if (!('{node}' in reg.saved)) {{\n\
                   reg.saved['{node}'] = {{ outline: el.style.outline, background: el.style.backgroundColor }};\n\
                 }}\n\
                 el.style.outline = '3px solid #ff6b6b';\n\
                 el.style.backgroundColor = 'rgba(255, 107, 107, 0.1)';\n\
                 return done({{ ok: true }});",
                guard = node_guard(node),
            )
        } else {
            format!(
                "{guard}\n\
                 const saved = reg.saved['{node}'];\n\
                 if (saved) {{\n\
                   el.style.outline = saved.outline;\n\
                   el.style.backgroundColor = saved.background;\n\
                   delete reg.saved['{node}'];\n\
                 }}\n\
                 return done({{ ok: true }});",
                guard = node_guard(node),
            )
        };
        self.run(body, Some(node)).await.map(|_| ())
    }
}
