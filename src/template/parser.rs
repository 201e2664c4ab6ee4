//! HTML placeholder parser.
//!
//! Splits a raw template into literal byte runs and the tags composition cares
//! about. Everything else passes through untouched.
//!
//! # Recognized markup
//! - `<{fragment tag} .../>` and `<{fragment tag} ...></{fragment tag}>`
//! - any configured handled tag, same forms
//! - `<head ...>`: a pipe placeholder is inserted right after it
//! - `</body>`: an async placeholder is inserted right before it, or at the
//!   very end when the document has no `</body>`
//!
//! Comments and the bodies of `<script>`/`<style>` are never scanned for tags.

use axum::body::Bytes;

use crate::template::{Attributes, Placeholder, PlaceholderTag, Template, TemplateError, TemplateNode};

/// Turns raw template text into a [`Template`].
pub trait TemplateParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<Template, TemplateError>;
}

/// Parser recognizing the fragment tag plus a list of handled tags.
#[derive(Debug, Clone)]
pub struct HtmlTagParser {
    tags: Vec<String>,
}

impl HtmlTagParser {
    pub fn new(fragment_tag: &str, handled_tags: &[String]) -> Self {
        let mut tags = vec![fragment_tag.to_ascii_lowercase()];
        tags.extend(handled_tags.iter().map(|t| t.to_ascii_lowercase()));
        Self { tags }
    }

    fn is_recognized(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t == name)
    }
}

impl TemplateParser for HtmlTagParser {
    fn parse(&self, raw: &str) -> Result<Template, TemplateError> {
        let bytes = raw.as_bytes();
        let mut nodes = Vec::new();
        let mut literal_start = 0;
        let mut pos = 0;
        let mut saw_body_end = false;

        let flush = |nodes: &mut Vec<TemplateNode>, from: usize, to: usize| {
            if to > from {
                nodes.push(TemplateNode::Literal(Bytes::copy_from_slice(&bytes[from..to])));
            }
        };

        while let Some(offset) = raw[pos..].find('<') {
            let start = pos + offset;

            if raw[start..].starts_with("<!--") {
                pos = raw[start..]
                    .find("-->")
                    .map(|end| start + end + 3)
                    .unwrap_or(bytes.len());
                continue;
            }

            let (closing, name, name_end) = read_tag_name(bytes, start);
            if name.is_empty() {
                pos = start + 1;
                continue;
            }

            if closing {
                if name == "body" && !saw_body_end {
                    flush(&mut nodes, literal_start, start);
                    nodes.push(TemplateNode::Tag(PlaceholderTag::placeholder(Placeholder::Async)));
                    literal_start = start;
                    saw_body_end = true;
                }
                pos = name_end;
                continue;
            }

            let tag_end = match find_tag_end(bytes, name_end) {
                Some(end) => end,
                None if self.is_recognized(&name) => {
                    return Err(TemplateError::Parse { tag: name, offset: start });
                }
                None => break,
            };

            if self.is_recognized(&name) {
                let self_closing = bytes[tag_end - 1] == b'/';
                let inner_end = if self_closing { tag_end - 1 } else { tag_end };
                let attributes = parse_attributes(&raw[name_end..inner_end]);

                flush(&mut nodes, literal_start, start);
                nodes.push(TemplateNode::Tag(PlaceholderTag::new(name.clone(), attributes)));

                pos = tag_end + 1;
                if !self_closing {
                    if let Some(after_close) = find_closing_tag(raw, pos, &name) {
                        pos = after_close;
                    }
                }
                literal_start = pos;
                continue;
            }

            pos = tag_end + 1;
            match name.as_str() {
                "head" => {
                    flush(&mut nodes, literal_start, pos);
                    nodes.push(TemplateNode::Tag(PlaceholderTag::placeholder(Placeholder::Pipe)));
                    literal_start = pos;
                }
                "script" | "style" => {
                    pos = find_raw_text_end(raw, pos, &name);
                }
                _ => {}
            }
        }

        flush(&mut nodes, literal_start, bytes.len());
        if !saw_body_end {
            nodes.push(TemplateNode::Tag(PlaceholderTag::placeholder(Placeholder::Async)));
        }

        Ok(Template::new(nodes))
    }
}

/// Read the tag name after `<` (or `</`). Returns (closing, lowercase name, index after name).
fn read_tag_name(bytes: &[u8], start: usize) -> (bool, String, usize) {
    let mut i = start + 1;
    let closing = bytes.get(i) == Some(&b'/');
    if closing {
        i += 1;
    }
    let name_start = i;
    while i < bytes.len() && is_name_char(bytes[i]) {
        i += 1;
    }
    if name_start == i || !bytes[name_start].is_ascii_alphabetic() {
        return (closing, String::new(), i);
    }
    let name = String::from_utf8_lossy(&bytes[name_start..i]).to_ascii_lowercase();
    (closing, name, i)
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':'
}

/// Index of the `>` closing a start tag, skipping quoted attribute values.
fn find_tag_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut quote = None;
    for (i, &b) in bytes.iter().enumerate().skip(from) {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"') | (None, b'\'') => quote = Some(b),
            (None, b'>') => return Some(i),
            _ => {}
        }
    }
    None
}

/// Position after `</name>` when it closes the tag opened just before `from`.
/// A later start tag of the same name means the first one was left unclosed.
fn find_closing_tag(raw: &str, from: usize, name: &str) -> Option<usize> {
    let lower = raw[from..].to_ascii_lowercase();
    let close_at = lower.find(&format!("</{}", name))?;
    if let Some(open_at) = lower.find(&format!("<{}", name)) {
        if open_at < close_at {
            return None;
        }
    }
    let gt = lower[close_at..].find('>')?;
    Some(from + close_at + gt + 1)
}

fn find_raw_text_end(raw: &str, from: usize, name: &str) -> usize {
    raw[from..]
        .to_ascii_lowercase()
        .find(&format!("</{}", name))
        .map(|i| from + i)
        .unwrap_or(raw.len())
}

/// Parse `a="x" b='y' c=z d` into attributes.
fn parse_attributes(source: &str) -> Attributes {
    let mut attributes = Attributes::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() || c == '/' {
            chars.next();
            continue;
        }

        let mut name_end = source.len();
        while let Some(&(i, c)) = chars.peek() {
            if c.is_whitespace() || c == '=' || c == '/' {
                name_end = i;
                break;
            }
            chars.next();
        }
        if name_end == start {
            chars.next();
            continue;
        }
        let name = &source[start..name_end];

        while matches!(chars.peek(), Some(&(_, c)) if c.is_whitespace()) {
            chars.next();
        }

        if !matches!(chars.peek(), Some(&(_, '='))) {
            attributes.insert(name, "");
            continue;
        }
        chars.next();
        while matches!(chars.peek(), Some(&(_, c)) if c.is_whitespace()) {
            chars.next();
        }

        let value = match chars.peek().copied() {
            Some((i, q)) if q == '"' || q == '\'' => {
                chars.next();
                let mut end = source.len();
                for (j, c) in chars.by_ref() {
                    if c == q {
                        end = j;
                        break;
                    }
                }
                &source[i + 1..end]
            }
            Some((i, _)) => {
                let mut end = source.len();
                while let Some(&(j, c)) = chars.peek() {
                    if c.is_whitespace() {
                        end = j;
                        break;
                    }
                    chars.next();
                }
                &source[i..end]
            }
            None => "",
        };
        attributes.insert(name, value);
    }

    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> HtmlTagParser {
        HtmlTagParser::new("fragment", &["x-clock".to_string()])
    }

    fn literal(s: &str) -> TemplateNode {
        TemplateNode::Literal(Bytes::copy_from_slice(s.as_bytes()))
    }

    fn tag_of(node: &TemplateNode) -> &PlaceholderTag {
        match node {
            TemplateNode::Tag(tag) => tag,
            other => panic!("expected tag, got {:?}", other),
        }
    }

    #[test]
    fn splits_literals_and_fragment_tags() {
        let template = parser()
            .parse(r#"<div><fragment primary async=false src="http://f1"/></div>"#)
            .unwrap();
        let nodes = template.nodes();

        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0], literal("<div>"));
        let tag = tag_of(&nodes[1]);
        assert_eq!(tag.name, "fragment");
        assert!(tag.attributes.flag("primary"));
        assert!(!tag.attributes.flag("async"));
        assert_eq!(tag.attributes.get("src"), Some("http://f1"));
        assert_eq!(nodes[2], literal("</div>"));
        // no </body>: async placeholder lands at the end
        assert_eq!(tag_of(&nodes[3]).placeholder, Some(Placeholder::Async));
    }

    #[test]
    fn inserts_pipe_after_head_and_async_before_body_end() {
        let template = parser()
            .parse("<html><head><title>t</title></head><body>x</body></html>")
            .unwrap();
        let nodes = template.nodes();

        assert_eq!(nodes[0], literal("<html><head>"));
        assert_eq!(tag_of(&nodes[1]).placeholder, Some(Placeholder::Pipe));
        assert_eq!(nodes[2], literal("<title>t</title></head><body>x"));
        assert_eq!(tag_of(&nodes[3]).placeholder, Some(Placeholder::Async));
        assert_eq!(nodes[4], literal("</body></html>"));
        assert_eq!(nodes.len(), 5);
    }

    #[test]
    fn closing_tag_and_children_are_consumed() {
        let template = parser()
            .parse("a<fragment src='http://x'>ignored</fragment>b<x-clock></x-clock>c")
            .unwrap();
        let nodes = template.nodes();

        assert_eq!(nodes[0], literal("a"));
        assert_eq!(tag_of(&nodes[1]).attributes.get("src"), Some("http://x"));
        assert_eq!(nodes[2], literal("b"));
        assert_eq!(tag_of(&nodes[3]).name, "x-clock");
        assert_eq!(nodes[4], literal("c"));
    }

    #[test]
    fn unclosed_fragment_does_not_swallow_its_sibling() {
        let template = parser()
            .parse("<fragment src=http://a>-<fragment src=http://b></fragment>")
            .unwrap();
        let srcs: Vec<_> = template
            .nodes()
            .iter()
            .filter_map(|n| match n {
                TemplateNode::Tag(t) if t.placeholder.is_none() => t.attributes.get("src"),
                _ => None,
            })
            .collect();
        assert_eq!(srcs, vec!["http://a", "http://b"]);
    }

    #[test]
    fn comments_and_scripts_are_opaque() {
        let template = parser()
            .parse("<!-- <fragment src=a/> --><script>if (a<fragment) {}</script>")
            .unwrap();
        assert_eq!(template.nodes().len(), 2);
        assert_eq!(
            template.nodes()[0],
            literal("<!-- <fragment src=a/> --><script>if (a<fragment) {}</script>")
        );
    }

    #[test]
    fn unterminated_fragment_tag_is_an_error() {
        let err = parser().parse("<p><fragment src=\"http://a\"").unwrap_err();
        assert!(matches!(err, TemplateError::Parse { ref tag, offset: 3 } if tag == "fragment"));
    }

    #[test]
    fn quoted_gt_does_not_end_the_tag() {
        let template = parser().parse(r#"<fragment fallback="<b>n/a</b>"/>"#).unwrap();
        assert_eq!(tag_of(&template.nodes()[0]).attributes.get("fallback"), Some("<b>n/a</b>"));
    }
}
