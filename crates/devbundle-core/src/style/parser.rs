//! Hand-written parser for CSS and SCSS-flavoured style sheets.
//!
//! Structure only: selectors, at-rule params and declaration values are kept
//! as raw text. Strings, parentheses, block comments and `#{...}`
//! interpolation are skipped while looking for statement terminators.

use super::ast::{AtRule, Comment, Declaration, Node, NodeId, Raws, Rule, Stylesheet};
use thiserror::Error;

/// Syntax error with a 1-based position.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Parse a style sheet.
pub fn parse(source: &str) -> Result<Stylesheet, ParseError> {
    let mut parser = Parser::new(source);
    let (nodes, after) = parser.parse_nodes(false)?;
    Ok(Stylesheet {
        nodes,
        raws: Raws {
            after,
            ..Default::default()
        },
        source: None,
    })
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, at: usize, message: impl Into<String>) -> ParseError {
        let consumed = &self.src[..at.min(self.src.len())];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed.rfind('\n').map_or(consumed.len(), |nl| consumed.len() - nl - 1) + 1;
        ParseError {
            line,
            column,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s)
    }

    fn take_whitespace(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
        self.src[start..self.pos].to_string()
    }

    /// Parse nodes until EOF (top level) or the matching `}` (nested).
    /// Returns the nodes and the whitespace before the terminator.
    fn parse_nodes(&mut self, nested: bool) -> Result<(Vec<Node>, String), ParseError> {
        let mut nodes = Vec::new();
        loop {
            let before = self.take_whitespace();
            let Some(c) = self.peek() else {
                if nested {
                    return Err(self.error(self.pos, "Unclosed block"));
                }
                return Ok((nodes, before));
            };

            match c {
                b'}' => {
                    if !nested {
                        return Err(self.error(self.pos, "Unexpected }"));
                    }
                    self.pos += 1;
                    return Ok((nodes, before));
                }
                b';' => {
                    self.pos += 1;
                    if let Some(last) = nodes.last_mut() {
                        last.raws_mut().semicolon = true;
                    }
                }
                b'/' if self.starts_with("/*") => nodes.push(self.parse_block_comment(before)?),
                b'/' if self.starts_with("//") => nodes.push(self.parse_inline_comment(before)),
                b'@' => nodes.push(self.parse_at_rule(before)?),
                _ => nodes.push(self.parse_rule_or_declaration(before)?),
            }
        }
    }

    fn parse_block_comment(&mut self, before: String) -> Result<Node, ParseError> {
        let start = self.pos;
        let Some(end) = self.src[start + 2..].find("*/").map(|i| start + 2 + i) else {
            return Err(self.error(start, "Unclosed comment"));
        };
        self.pos = end + 2;
        Ok(Node::Comment(Comment {
            id: NodeId::next(),
            text: self.src[start + 2..end].to_string(),
            inline: false,
            raws: Raws::before(before),
        }))
    }

    fn parse_inline_comment(&mut self, before: String) -> Node {
        let start = self.pos;
        let end = self.src[start..]
            .find('\n')
            .map_or(self.src.len(), |i| start + i);
        self.pos = end;
        Node::Comment(Comment {
            id: NodeId::next(),
            text: self.src[start + 2..end].to_string(),
            inline: true,
            raws: Raws::before(before),
        })
    }

    fn parse_at_rule(&mut self, before: String) -> Result<Node, ParseError> {
        let at = self.pos;
        self.pos += 1;
        let name_start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            self.pos += 1;
        }
        if self.pos == name_start {
            return Err(self.error(at, "At-rule without name"));
        }
        let name = self.src[name_start..self.pos].to_string();
        let after_name = self.take_whitespace();

        let (end, terminator) = self.scan_statement()?;
        let raw = &self.src[self.pos..end];
        let params = raw.trim_end().to_string();
        let between = raw[params.len()..].to_string();

        let mut rule = AtRule {
            id: NodeId::next(),
            name,
            params,
            nodes: None,
            raws: Raws {
                before,
                between,
                after_name,
                ..Default::default()
            },
        };

        match terminator {
            Some(b'{') => {
                self.pos = end + 1;
                let (children, after) = self.parse_nodes(true)?;
                rule.nodes = Some(children);
                rule.raws.after = after;
            }
            Some(b';') => {
                self.pos = end + 1;
                rule.raws.semicolon = true;
            }
            _ => self.pos = end,
        }
        Ok(Node::AtRule(rule))
    }

    fn parse_rule_or_declaration(&mut self, before: String) -> Result<Node, ParseError> {
        let start = self.pos;
        let (end, terminator) = self.scan_statement()?;
        let chunk = &self.src[start..end];

        if terminator == Some(b'{') {
            let selector = chunk.trim_end().to_string();
            let between = chunk[selector.len()..].to_string();
            self.pos = end + 1;
            let (nodes, after) = self.parse_nodes(true)?;
            return Ok(Node::Rule(Rule {
                id: NodeId::next(),
                selector,
                nodes,
                raws: Raws {
                    before,
                    between,
                    after,
                    ..Default::default()
                },
            }));
        }

        let Some(colon) = chunk.find(':') else {
            return Err(self.error(start, format!("Unknown word `{}`", chunk.trim())));
        };
        let prop = chunk[..colon].trim_end().to_string();
        let rest = &chunk[colon + 1..];
        let value_start = rest.len() - rest.trim_start().len();
        let between = chunk[prop.len()..=colon + value_start].to_string();
        let value_raw = &rest[value_start..];
        let value = value_raw.trim_end().to_string();
        let after = value_raw[value.len()..].to_string();

        let semicolon = terminator == Some(b';');
        self.pos = if semicolon { end + 1 } else { end };

        Ok(Node::Declaration(Declaration {
            id: NodeId::next(),
            prop,
            value,
            raws: Raws {
                before,
                between,
                after,
                semicolon,
                ..Default::default()
            },
        }))
    }

    /// Find the end of the statement starting at `self.pos`.
    ///
    /// Returns the index of the terminator (`;`, `{` or `}`) and the
    /// terminator itself, or the end of input and `None`.
    fn scan_statement(&self) -> Result<(usize, Option<u8>), ParseError> {
        let mut i = self.pos;
        let mut parens = 0usize;
        let mut interpolation = 0usize;

        while let Some(&b) = self.bytes.get(i) {
            match b {
                b'\\' => i += 1,
                b'"' | b'\'' => {
                    let mut j = i + 1;
                    loop {
                        match self.bytes.get(j) {
                            None => return Err(self.error(i, "Unclosed string")),
                            Some(b'\\') => j += 2,
                            Some(&q) if q == b => break,
                            Some(_) => j += 1,
                        }
                    }
                    i = j;
                }
                b'/' if self.bytes.get(i + 1) == Some(&b'*') => {
                    let Some(end) = self.src[i + 2..].find("*/") else {
                        return Err(self.error(i, "Unclosed comment"));
                    };
                    i += 2 + end + 1;
                }
                b'#' if self.bytes.get(i + 1) == Some(&b'{') => {
                    interpolation += 1;
                    i += 1;
                }
                b'(' => parens += 1,
                b')' => parens = parens.saturating_sub(1),
                b'}' if interpolation > 0 => interpolation -= 1,
                b';' | b'{' | b'}' if parens == 0 && interpolation == 0 => {
                    return Ok((i, Some(b)));
                }
                _ => {}
            }
            i += 1;
        }
        Ok((self.bytes.len(), None))
    }
}
