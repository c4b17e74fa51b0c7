//! Markup parser – turns tag soup into a [`Dom`].
//!
//! A single left-to-right scan with three lexical states (text, tag,
//! character reference) feeds a stack of unfinished elements. Missing
//! `html`/`head`/`body` wrappers are inserted implicitly and anything still
//! open at end of input is closed, so every input yields exactly one root.
//! Parsing never fails.

use std::collections::HashMap;

use crate::dom::{Dom, ElementData, NodeData, NodeId};
use crate::entities;

/// Elements that never have content and are attached without being pushed.
pub const SELF_CLOSING_TAGS: &[&str] = &[
    "area", "base", "br", "meta", "col", "hr", "img", "wbr", "input", "link", "param", "source",
    "track", "embed",
];

/// Elements that belong in `<head>`.
pub const HEAD_TAGS: &[&str] = &[
    "base", "basefont", "bgsound", "noscript", "link", "meta", "title", "style", "script",
];

/// Elements whose content is taken verbatim up to the matching close tag.
const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

/// Parse markup into a tree. Always returns a tree with a single root.
pub fn parse_html(markup: &str) -> Dom {
    HtmlParser::new(markup).parse()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    Tag,
    Entity,
}

struct HtmlParser<'a> {
    input: &'a str,
    dom: Dom,
    unfinished: Vec<NodeId>,
}

impl<'a> HtmlParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            dom: Dom::new(),
            unfinished: Vec::new(),
        }
    }

    fn parse(mut self) -> Dom {
        let mut state = State::Text;
        let mut text = String::new();
        let mut tag = String::new();
        let mut entity = String::new();
        let mut pos = 0;

        while let Some(c) = self.input[pos..].chars().next() {
            pos += c.len_utf8();
            match state {
                State::Text => match c {
                    '<' => {
                        self.flush_text(&mut text);
                        state = State::Tag;
                    }
                    '&' => {
                        entity.clear();
                        state = State::Entity;
                    }
                    _ => text.push(c),
                },
                State::Entity => match c {
                    ';' => {
                        match entities::resolve(&entity) {
                            Some(resolved) => text.push_str(&resolved),
                            None => {
                                text.push('&');
                                text.push_str(&entity);
                                text.push(';');
                            }
                        }
                        state = State::Text;
                    }
                    c if c.is_ascii_alphanumeric() || c == '#' => entity.push(c),
                    _ => {
                        // Not a reference after all: emit it literally and
                        // let the text state see this character again.
                        text.push('&');
                        text.push_str(&entity);
                        pos -= c.len_utf8();
                        state = State::Text;
                    }
                },
                State::Tag => {
                    if c == '>' {
                        state = State::Text;
                        let raw = std::mem::take(&mut tag);
                        if let Some(raw_text_tag) = self.add_tag(&raw) {
                            pos = self.consume_raw_text(pos, &raw_text_tag);
                        }
                    } else {
                        tag.push(c);
                        if tag == "!--" {
                            pos = match self.input[pos..].find("-->") {
                                Some(end) => pos + end + 3,
                                None => self.input.len(),
                            };
                            tag.clear();
                            state = State::Text;
                        }
                    }
                }
            }
        }

        match state {
            State::Entity => {
                text.push('&');
                text.push_str(&entity);
            }
            State::Tag => log::debug!("dropping unterminated tag <{tag}"),
            State::Text => {}
        }
        self.flush_text(&mut text);
        self.finish()
    }

    /// Read `<script>`/`<style>` content verbatim. Returns the position of
    /// the closing tag (or end of input).
    fn consume_raw_text(&mut self, pos: usize, tag: &str) -> usize {
        let rest = &self.input[pos..];
        let closer = format!("</{tag}");
        let end = rest
            .to_ascii_lowercase()
            .find(&closer)
            .unwrap_or(rest.len());
        let content = &rest[..end];
        if !content.is_empty() {
            self.add_text(content);
        }
        pos + end
    }

    fn in_pre(&self) -> bool {
        self.unfinished
            .iter()
            .any(|&id| self.dom.tag(id) == Some("pre"))
    }

    fn flush_text(&mut self, text: &mut String) {
        if !text.is_empty() {
            let t = std::mem::take(text);
            self.add_text(&t);
        }
    }

    fn add_text(&mut self, text: &str) {
        if text.chars().all(char::is_whitespace) && !self.in_pre() {
            return;
        }
        self.implicit_tags(None);
        let parent = self.top();
        let node = self
            .dom
            .alloc(NodeData::Text(text.to_string()), Some(parent));
        self.dom.append_child(parent, node);
    }

    /// Process one buffered tag. Returns the tag name when it opened a
    /// raw-text element.
    fn add_tag(&mut self, raw: &str) -> Option<String> {
        let (tag, attributes) = parse_tag_text(raw);
        if tag.is_empty() || tag.starts_with('!') || tag.starts_with('?') {
            return None;
        }
        self.implicit_tags(Some(&tag));

        if tag.starts_with('/') {
            if self.unfinished.len() <= 1 {
                log::debug!("ignoring <{tag}> with nothing open to close");
                return None;
            }
            if let Some(node) = self.unfinished.pop() {
                let parent = self.top();
                self.dom.append_child(parent, node);
            }
            None
        } else if SELF_CLOSING_TAGS.contains(&tag.as_str()) {
            let parent = self.top();
            let node = self.dom.alloc(element(&tag, attributes), Some(parent));
            self.dom.append_child(parent, node);
            None
        } else {
            let parent = self.unfinished.last().copied();
            let node = self.dom.alloc(element(&tag, attributes), parent);
            self.unfinished.push(node);
            RAW_TEXT_TAGS.contains(&tag.as_str()).then_some(tag)
        }
    }

    fn top(&self) -> NodeId {
        // implicit_tags guarantees at least the root is open.
        self.unfinished[self.unfinished.len() - 1]
    }

    fn open_tags(&self) -> Vec<&str> {
        self.unfinished
            .iter()
            .filter_map(|&id| self.dom.tag(id))
            .collect()
    }

    fn implicit_tags(&mut self, tag: Option<&str>) {
        loop {
            let open = self.open_tags();
            if open.is_empty() && tag != Some("html") {
                self.add_tag("html");
            } else if open == ["html"]
                && !matches!(tag, Some("head") | Some("body") | Some("/html"))
            {
                if tag.is_some_and(|t| HEAD_TAGS.contains(&t)) {
                    self.add_tag("head");
                } else {
                    self.add_tag("body");
                }
            } else if open == ["html", "head"]
                && !tag.is_some_and(|t| t == "/head" || HEAD_TAGS.contains(&t))
            {
                self.add_tag("/head");
            } else {
                break;
            }
        }
    }

    fn finish(mut self) -> Dom {
        if self.unfinished.is_empty() {
            self.implicit_tags(None);
        }
        while self.unfinished.len() > 1 {
            if let Some(node) = self.unfinished.pop() {
                let parent = self.top();
                self.dom.append_child(parent, node);
            }
        }
        self.dom
    }
}

fn element(tag: &str, attributes: HashMap<String, String>) -> NodeData {
    let mut data = ElementData::new(tag);
    data.attributes = attributes;
    NodeData::Element(data)
}

// ---------------------------------------------------------------------------
// Tag text
// ---------------------------------------------------------------------------

/// Split buffered tag text into a case-folded name and its attributes.
fn parse_tag_text(raw: &str) -> (String, HashMap<String, String>) {
    let raw = raw.trim();
    let raw = match raw.strip_suffix('/') {
        Some(inner) if !inner.is_empty() && ends_before_self_close(inner) => inner.trim_end(),
        _ => raw,
    };
    let (name, rest) = match raw.find(char::is_whitespace) {
        Some(i) => (&raw[..i], &raw[i..]),
        None => (raw, ""),
    };
    (name.to_lowercase(), parse_attributes(rest))
}

/// Is a trailing `/` after `inner` self-closing syntax? Not when it ends an
/// unquoted attribute value, as in `href=docs/`.
fn ends_before_self_close(inner: &str) -> bool {
    !inner.contains(char::is_whitespace)
        || inner.ends_with(|c: char| c.is_whitespace() || c == '"' || c == '\'')
}

fn is_name_char(c: char) -> bool {
    !(c.is_whitespace() || matches!(c, '=' | '"' | '\'' | '>' | '/'))
}

/// Recognises `name`, `name=value`, `name="quoted"` and `name='quoted'`.
fn parse_attributes(s: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    let mut rest = s;
    loop {
        rest = rest.trim_start_matches(|c: char| !is_name_char(c));
        if rest.is_empty() {
            break;
        }
        let name_end = rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len());
        let name = rest[..name_end].to_lowercase();
        rest = &rest[name_end..];

        let mut value = String::new();
        let after_ws = rest.trim_start();
        if let Some(after_eq) = after_ws.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let end = body.find(quote).unwrap_or(body.len());
                    value = entities::decode(&body[..end]);
                    rest = body.get(end + 1..).unwrap_or("");
                }
                Some(_) => {
                    let end = after_eq
                        .find(|c: char| {
                            c.is_whitespace() || matches!(c, '"' | '\'' | '=' | '<' | '>' | '`')
                        })
                        .unwrap_or(after_eq.len());
                    if end > 0 {
                        value = entities::decode(&after_eq[..end]);
                        rest = &after_eq[end..];
                    }
                }
                None => rest = after_eq,
            }
        }
        attributes.insert(name, value);
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(dom: &Dom, id: NodeId) -> Vec<String> {
        dom.children(id)
            .iter()
            .map(|&c| match dom.tag(c) {
                Some(t) => t.to_string(),
                None => format!("#{}", dom.node(c).text().unwrap_or_default()),
            })
            .collect()
    }

    fn body(dom: &Dom) -> NodeId {
        dom.elements_by_tag(dom.root(), "body")[0]
    }

    fn assert_consistent(dom: &Dom) {
        let root = dom.root();
        assert_eq!(dom.parent(root), None);
        let reachable = dom.descendants(root);
        for &id in &reachable {
            for &child in dom.children(id) {
                assert_eq!(dom.parent(child), Some(id));
            }
        }
        let mut sorted = reachable.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), reachable.len(), "a node is reachable twice");
    }

    #[test]
    fn implicit_html_and_body() {
        let dom = parse_html("<p>Hello</p>");
        let root = dom.root();
        assert_eq!(dom.tag(root), Some("html"));
        assert_eq!(tags(&dom, root), vec!["body"]);
        assert_eq!(tags(&dom, body(&dom)), vec!["p"]);
        assert_consistent(&dom);
    }

    #[test]
    fn head_tags_go_to_head_then_body_opens() {
        let dom = parse_html("<title>T</title><p>x</p>");
        let root = dom.root();
        assert_eq!(tags(&dom, root), vec!["head", "body"]);
        let head = dom.children(root)[0];
        assert_eq!(tags(&dom, head), vec!["title"]);
        assert_consistent(&dom);
    }

    #[test]
    fn empty_input_yields_html_body() {
        let dom = parse_html("");
        assert_eq!(dom.tag(dom.root()), Some("html"));
        assert_eq!(tags(&dom, dom.root()), vec!["body"]);
    }

    #[test]
    fn stray_close_tags_never_underflow() {
        let dom = parse_html("</div></p></html>text</b>");
        assert_eq!(dom.tag(dom.root()), Some("html"));
        assert_consistent(&dom);
        assert!(dom.text_content(dom.root()).contains("text"));
    }

    #[test]
    fn unclosed_elements_close_at_end() {
        let dom = parse_html("<div><p>one<b>two");
        assert_consistent(&dom);
        let div = dom.elements_by_tag(dom.root(), "div")[0];
        let p = dom.children(div)[0];
        assert_eq!(tags(&dom, p), vec!["#one", "b"]);
    }

    #[test]
    fn void_elements_do_not_nest() {
        let dom = parse_html(r#"<p>a<br/>b<img src="x.png"/>c</p>"#);
        let p = dom.elements_by_tag(dom.root(), "p")[0];
        assert_eq!(tags(&dom, p), vec!["#a", "br", "#b", "img", "#c"]);
        let img = dom.children(p)[3];
        assert_eq!(dom.element(img).and_then(|e| e.attr("src")), Some("x.png"));
    }

    #[test]
    fn entities_decode_in_text() {
        let dom = parse_html("<p>&lt;b&gt; &amp; &copy; &#65;</p>");
        assert_eq!(dom.text_content(dom.root()), "<b> & \u{a9} A");
    }

    #[test]
    fn malformed_entities_are_literal() {
        let dom = parse_html("<p>a &bogus; b & c &lt</p>");
        assert_eq!(dom.text_content(dom.root()), "a &bogus; b & c &lt");
    }

    #[test]
    fn attribute_forms() {
        let dom = parse_html(
            r#"<div ID=main data-x='single q' Class="a b" hidden title=plain></div>"#,
        );
        let div = dom.elements_by_tag(dom.root(), "div")[0];
        let e = dom.element(div).map(|e| e.attributes.clone()).unwrap_or_default();
        assert_eq!(e.get("id").map(String::as_str), Some("main"));
        assert_eq!(e.get("data-x").map(String::as_str), Some("single q"));
        assert_eq!(e.get("class").map(String::as_str), Some("a b"));
        assert_eq!(e.get("hidden").map(String::as_str), Some(""));
        assert_eq!(e.get("title").map(String::as_str), Some("plain"));
    }

    #[test]
    fn slash_stays_in_unquoted_values() {
        let dom = parse_html("<a href=docs/>x</a><a href=/ >y</a><hr />");
        let links = dom.elements_by_tag(dom.root(), "a");
        let href = |n: NodeId| dom.element(n).and_then(|e| e.attr("href")).map(str::to_string);
        assert_eq!(href(links[0]).as_deref(), Some("docs/"));
        assert_eq!(dom.text_content(links[0]), "x");
        assert_eq!(href(links[1]).as_deref(), Some("/"));
        assert_eq!(dom.elements_by_tag(dom.root(), "hr").len(), 1);
        assert_consistent(&dom);
    }

    #[test]
    fn tag_names_are_case_folded() {
        let dom = parse_html("<DIV><P>x</P></DIV>");
        assert_eq!(dom.elements_by_tag(dom.root(), "div").len(), 1);
        assert_eq!(dom.elements_by_tag(dom.root(), "p").len(), 1);
    }

    #[test]
    fn comments_and_doctype_are_ignored() {
        let dom = parse_html("<!doctype html><!-- a > b --><p>x</p>");
        assert_eq!(tags(&dom, body(&dom)), vec!["p"]);
        assert_eq!(dom.text_content(dom.root()), "x");
    }

    #[test]
    fn style_content_is_raw() {
        let dom = parse_html("<style>a > b { color: red }</style><p>x</p>");
        let style = dom.elements_by_tag(dom.root(), "style")[0];
        assert_eq!(dom.text_content(style), "a > b { color: red }");
        assert_consistent(&dom);
    }

    #[test]
    fn whitespace_kept_only_in_pre() {
        let dom = parse_html("<div>  </div><pre>  </pre>");
        let div = dom.elements_by_tag(dom.root(), "div")[0];
        let pre = dom.elements_by_tag(dom.root(), "pre")[0];
        assert!(dom.children(div).is_empty());
        assert_eq!(dom.text_content(pre), "  ");
    }

    #[test]
    fn soup_always_single_root() {
        for markup in [
            "<<>>",
            "<p <b>>",
            "</>",
            "<html><html><body></head>",
            "text only",
            "<a href='unterminated>x",
            "&&&;;;",
        ] {
            let dom = parse_html(markup);
            assert_eq!(dom.tag(dom.root()), Some("html"), "input {markup:?}");
            assert_consistent(&dom);
        }
    }
}
