//! Stylesheet parser – a small recursive-descent parser for the CSS subset
//! the cascade understands: tag, class, id and descendant selectors followed
//! by `property: value;` declarations.
//!
//! Malformed input is skipped rather than reported: a bad declaration skips
//! to the next `;` or `}`, a bad selector skips the whole rule.

use std::collections::HashMap;
use std::fmt;

use crate::dom::{Dom, NodeData, NodeId};

/// Property → value declarations of one rule.
pub type Declarations = HashMap<String, String>;

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Lowercase tag name.
    Tag(String),
    Class(String),
    Id(String),
    Descendant {
        ancestor: Box<Selector>,
        descendant: Box<Selector>,
    },
}

impl Selector {
    /// Specificity score: tag 1, class 10, id 20, descendant the sum.
    pub fn priority(&self) -> u32 {
        match self {
            Selector::Tag(_) => 1,
            Selector::Class(_) => 10,
            Selector::Id(_) => 20,
            Selector::Descendant {
                ancestor,
                descendant,
            } => ancestor.priority() + descendant.priority(),
        }
    }

    /// Does this selector match `node`? Text nodes never match.
    pub fn matches(&self, dom: &Dom, node: NodeId) -> bool {
        let NodeData::Element(element) = &dom.node(node).data else {
            return false;
        };
        match self {
            Selector::Tag(tag) => element.tag == *tag,
            Selector::Class(class) => element.has_class(class),
            Selector::Id(id) => element.id() == Some(id.as_str()),
            Selector::Descendant {
                ancestor,
                descendant,
            } => {
                descendant.matches(dom, node)
                    && dom.ancestors(node).any(|a| ancestor.matches(dom, a))
            }
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Tag(t) => write!(f, "{t}"),
            Selector::Class(c) => write!(f, ".{c}"),
            Selector::Id(i) => write!(f, "#{i}"),
            Selector::Descendant {
                ancestor,
                descendant,
            } => write!(f, "{ancestor} {descendant}"),
        }
    }
}

/// A selector with its declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    pub selector: Selector,
    pub declarations: Declarations,
}

/// Sort rules by ascending specificity. The sort is stable, so among equal
/// scores the later rule still comes later and wins.
pub fn sort_by_priority(rules: &mut [StyleRule]) {
    rules.sort_by_key(|r| r.selector.priority());
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a whole stylesheet into rules in source order.
pub fn parse_stylesheet(source: &str) -> Vec<StyleRule> {
    CssParser::new(source).parse()
}

/// Parse the body of a `style="..."` attribute.
pub fn parse_declarations(source: &str) -> Declarations {
    CssParser::new(source).body()
}

#[derive(Debug)]
struct ParseError {
    pos: usize,
    expected: &'static str,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {} at byte {}", self.expected, self.pos)
    }
}

type ParseResult<T> = Result<T, ParseError>;

/// Characters allowed in selector and property words.
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '#' | '-' | '.' | '%' | '_')
}

/// Characters allowed in declaration values.
fn is_value_char(c: char) -> bool {
    is_word_char(c) || matches!(c, ',' | '!' | '"' | '\'' | '(' | ')' | '/' | '+') || c.is_whitespace()
}

struct CssParser<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> CssParser<'a> {
    fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    fn error(&self, expected: &'static str) -> ParseError {
        ParseError {
            pos: self.i,
            expected,
        }
    }

    /// Skip whitespace and `/* ... */` comments.
    fn whitespace(&mut self) {
        loop {
            let rest = &self.s[self.i..];
            let trimmed = rest.trim_start();
            self.i += rest.len() - trimmed.len();
            if trimmed.starts_with("/*") {
                self.i += match trimmed[2..].find("*/") {
                    Some(end) => end + 4,
                    None => trimmed.len(),
                };
            } else {
                break;
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.i;
        let rest = &self.s[start..];
        let len = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.i += len;
        &self.s[start..self.i]
    }

    fn word(&mut self) -> ParseResult<&'a str> {
        let w = self.take_while(is_word_char);
        if w.is_empty() {
            return Err(self.error("a word"));
        }
        Ok(w)
    }

    fn value(&mut self) -> ParseResult<String> {
        let v = self.take_while(is_value_char).trim_end();
        if v.is_empty() {
            return Err(self.error("a value"));
        }
        Ok(v.to_string())
    }

    fn literal(&mut self, literal: char) -> ParseResult<()> {
        if self.peek() != Some(literal) {
            return Err(self.error(match literal {
                ':' => "':'",
                ';' => "';'",
                '{' => "'{'",
                '}' => "'}'",
                _ => "a delimiter",
            }));
        }
        self.i += literal.len_utf8();
        Ok(())
    }

    fn pair(&mut self) -> ParseResult<(String, String)> {
        let property = self.word()?.to_lowercase();
        self.whitespace();
        self.literal(':')?;
        self.whitespace();
        let value = self.value()?;
        Ok((property, value))
    }

    /// Advance to the first of `chars` without consuming it.
    fn ignore_until(&mut self, chars: &[char]) -> Option<char> {
        let rest = &self.s[self.i..];
        match rest.find(|c: char| chars.contains(&c)) {
            Some(offset) => {
                self.i += offset;
                self.peek()
            }
            None => {
                self.i = self.s.len();
                None
            }
        }
    }

    fn body(&mut self) -> Declarations {
        let mut pairs = Declarations::new();
        self.whitespace();
        while self.i < self.s.len() && self.peek() != Some('}') {
            match self.pair() {
                Ok((property, value)) => {
                    pairs.insert(property, value);
                    self.whitespace();
                    // The last declaration may omit its semicolon.
                    if self.peek() == Some(';') {
                        self.i += 1;
                    } else if self.peek() != Some('}') && self.i < self.s.len() {
                        log::debug!("{}; skipping declaration tail", self.error("';'"));
                        self.skip_declaration();
                    }
                    self.whitespace();
                }
                Err(e) => {
                    log::debug!("{e}; skipping declaration");
                    self.skip_declaration();
                    self.whitespace();
                }
            }
        }
        pairs
    }

    fn skip_declaration(&mut self) {
        if self.ignore_until(&[';', '}']) == Some(';') {
            self.i += 1;
        }
    }

    fn selector(&mut self) -> ParseResult<Selector> {
        let mut out = simple_selector(self.word()?);
        self.whitespace();
        while self.i < self.s.len() && self.peek() != Some('{') {
            let descendant = simple_selector(self.word()?);
            out = Selector::Descendant {
                ancestor: Box::new(out),
                descendant: Box::new(descendant),
            };
            self.whitespace();
        }
        Ok(out)
    }

    fn rule(&mut self) -> ParseResult<StyleRule> {
        let selector = self.selector()?;
        self.literal('{')?;
        let declarations = self.body();
        self.literal('}')?;
        Ok(StyleRule {
            selector,
            declarations,
        })
    }

    fn parse(&mut self) -> Vec<StyleRule> {
        let mut rules = Vec::new();
        self.whitespace();
        while self.i < self.s.len() {
            match self.rule() {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    log::debug!("{e}; skipping rule");
                    if self.ignore_until(&['}']).is_some() {
                        self.i += 1;
                    }
                }
            }
            self.whitespace();
        }
        rules
    }
}

fn simple_selector(word: &str) -> Selector {
    if let Some(class) = word.strip_prefix('.') {
        Selector::Class(class.to_string())
    } else if let Some(id) = word.strip_prefix('#') {
        Selector::Id(id.to_string())
    } else {
        Selector::Tag(word.to_lowercase())
    }
}
