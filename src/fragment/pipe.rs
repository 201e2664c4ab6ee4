//! Client-side pipe runtime.
//!
//! Each request gets a unique pipe instance name. The pipe definition is an
//! inline script installed under that name; fragment output is bracketed by
//! small calls into it so the browser can move deferred fragments into the
//! slot their tag occupied.

use axum::body::Bytes;
use axum::http::HeaderMap;

/// A fresh per-request pipe instance name (a valid JS identifier).
pub fn instance_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("p{}", &id[..12])
}

/// Inline script defining the pipe runtime under `name`.
pub fn definition(name: &str) -> Bytes {
    Bytes::from(format!(
        concat!(
            "<script data-pipe>(function (w, d, name) {{",
            "var anchors = {{}}, starts = {{}};",
            "function current() {{ var s = d.getElementsByTagName('script'); return d.currentScript || s[s.length - 1]; }}",
            "function load(src) {{ var el = d.createElement('script'); el.src = src; el.async = true; d.head.appendChild(el); }}",
            "w[name] = {{",
            "placeholder: function (i) {{ anchors[i] = current(); }},",
            "start: function (i, script) {{ starts[i] = current(); if (script) {{ load(script); }} }},",
            "end: function (i) {{",
            "var end = current(), start = starts[i], anchor = anchors[i], node;",
            "if (!start) {{ return; }}",
            "if (anchor) {{",
            "while ((node = start.nextSibling) && node !== end) {{ anchor.parentNode.insertBefore(node, anchor); }}",
            "anchor.parentNode.removeChild(anchor);",
            "}}",
            "start.parentNode.removeChild(start); end.parentNode.removeChild(end);",
            "delete starts[i]; delete anchors[i];",
            "}}",
            "}};",
            "}})(window, document, '{name}');</script>"
        ),
        name = name
    ))
}

/// Marks where a deferred fragment belongs.
pub fn placeholder_script(pipe: &str, index: usize) -> Bytes {
    Bytes::from(format!("<script data-pipe>{pipe}.placeholder({index})</script>"))
}

pub fn start_script(pipe: &str, index: usize, script: Option<&str>) -> Bytes {
    Bytes::from(match script {
        Some(src) => format!("<script data-pipe>{pipe}.start({index}, {})</script>", js_string(src)),
        None => format!("<script data-pipe>{pipe}.start({index})</script>"),
    })
}

pub fn end_script(pipe: &str, index: usize) -> Bytes {
    Bytes::from(format!("<script data-pipe>{pipe}.end({index})</script>"))
}

pub fn stylesheet_link(href: &str) -> Bytes {
    Bytes::from(format!("<link rel=\"stylesheet\" href=\"{}\">", href.replace('"', "&quot;")))
}

/// Assets announced by a fragment through its `Link` headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentAssets {
    pub stylesheets: Vec<String>,
    pub script: Option<String>,
}

impl FragmentAssets {
    /// Read `Link: <url>; rel="stylesheet"` and `Link: <url>; rel="fragment-script"`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut assets = Self::default();
        for value in headers.get_all(axum::http::header::LINK) {
            let Ok(value) = value.to_str() else { continue };
            for link in value.split(',') {
                let mut parts = link.split(';');
                let Some(target) = parts.next().map(str::trim) else { continue };
                let Some(url) = target.strip_prefix('<').and_then(|t| t.strip_suffix('>')) else {
                    continue;
                };
                let rel = parts
                    .filter_map(|p| p.trim().strip_prefix("rel="))
                    .map(|r| r.trim_matches('"'))
                    .next();
                match rel {
                    Some("stylesheet") => assets.stylesheets.push(url.to_string()),
                    Some("fragment-script") if assets.script.is_none() => {
                        assets.script = Some(url.to_string());
                    }
                    _ => {}
                }
            }
        }
        assets
    }

    pub fn is_empty(&self) -> bool {
        self.stylesheets.is_empty() && self.script.is_none()
    }
}

fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '<' => out.push_str("\\u003c"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
