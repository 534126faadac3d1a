//! Lossless style-sheet syntax tree.
//!
//! The tree keeps the whitespace around every node (`Raws`) so that printing
//! an unmodified tree reproduces the source byte for byte. Nodes carry a
//! process-unique [`NodeId`] so a position can still be found after subtrees
//! have been moved between documents.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of a node, stable across moves and clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Allocate a fresh id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Whitespace and punctuation preserved around a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Raws {
    /// Whitespace before the node.
    pub before: String,
    /// Between selector/params and `{`, or between prop and value (including `:`).
    pub between: String,
    /// Whitespace before the closing `}` of a container.
    pub after: String,
    /// Between `@name` and params.
    pub after_name: String,
    /// Whether the statement was terminated by `;` in the source.
    pub semicolon: bool,
}

impl Raws {
    #[must_use]
    pub fn before(ws: impl Into<String>) -> Self {
        Self {
            before: ws.into(),
            ..Default::default()
        }
    }
}

/// A parsed style sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheet {
    pub nodes: Vec<Node>,
    /// Trailing whitespace at the end of the file lives in `raws.after`.
    pub raws: Raws,
    /// File the sheet was parsed from, if any.
    pub source: Option<PathBuf>,
}

/// A single node in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Rule(Rule),
    AtRule(AtRule),
    Declaration(Declaration),
    Comment(Comment),
}

/// `selector { ... }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub id: NodeId,
    pub selector: String,
    pub nodes: Vec<Node>,
    pub raws: Raws,
}

/// `@name params;` or `@name params { ... }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtRule {
    pub id: NodeId,
    pub name: String,
    pub params: String,
    /// `None` for statement at-rules such as `@import`.
    pub nodes: Option<Vec<Node>>,
    pub raws: Raws,
}

/// `prop: value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub id: NodeId,
    pub prop: String,
    pub value: String,
    pub raws: Raws,
}

/// `/* text */`, or `// text` when `inline` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: NodeId,
    pub text: String,
    pub inline: bool,
    pub raws: Raws,
}

impl Node {
    #[must_use]
    pub fn id(&self) -> NodeId {
        match self {
            Node::Rule(n) => n.id,
            Node::AtRule(n) => n.id,
            Node::Declaration(n) => n.id,
            Node::Comment(n) => n.id,
        }
    }

    #[must_use]
    pub fn raws(&self) -> &Raws {
        match self {
            Node::Rule(n) => &n.raws,
            Node::AtRule(n) => &n.raws,
            Node::Declaration(n) => &n.raws,
            Node::Comment(n) => &n.raws,
        }
    }

    pub fn raws_mut(&mut self) -> &mut Raws {
        match self {
            Node::Rule(n) => &mut n.raws,
            Node::AtRule(n) => &mut n.raws,
            Node::Declaration(n) => &mut n.raws,
            Node::Comment(n) => &mut n.raws,
        }
    }

    /// Child nodes of a container, `None` for leaves.
    #[must_use]
    pub fn children(&self) -> Option<&Vec<Node>> {
        match self {
            Node::Rule(n) => Some(&n.nodes),
            Node::AtRule(n) => n.nodes.as_ref(),
            Node::Declaration(_) | Node::Comment(_) => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Rule(n) => Some(&mut n.nodes),
            Node::AtRule(n) => n.nodes.as_mut(),
            Node::Declaration(_) | Node::Comment(_) => None,
        }
    }

    #[must_use]
    pub fn as_comment(&self) -> Option<&Comment> {
        match self {
            Node::Comment(c) => Some(c),
            _ => None,
        }
    }

    /// Give this node and every descendant a fresh id.
    ///
    /// Used when a subtree is copied into more than one place.
    pub fn reassign_ids(&mut self) {
        match self {
            Node::Rule(n) => n.id = NodeId::next(),
            Node::AtRule(n) => n.id = NodeId::next(),
            Node::Declaration(n) => n.id = NodeId::next(),
            Node::Comment(n) => n.id = NodeId::next(),
        }
        if let Some(children) = self.children_mut() {
            for child in children {
                child.reassign_ids();
            }
        }
    }

    /// Scope key used to match inclusion rules.
    ///
    /// Rules are keyed by selector, mixins by name, other block at-rules by
    /// `@name params`. Leaves have no key.
    #[must_use]
    pub fn scope_key(&self) -> Option<String> {
        match self {
            Node::Rule(rule) => Some(rule.selector.trim().to_string()),
            Node::AtRule(at) if at.nodes.is_some() => {
                if at.name == "mixin" || at.name == "define-mixin" {
                    let name = at
                        .params
                        .split(|c: char| c == '(' || c.is_whitespace())
                        .next()
                        .unwrap_or("");
                    Some(name.to_string())
                } else if at.params.trim().is_empty() {
                    Some(format!("@{}", at.name))
                } else {
                    Some(format!("@{} {}", at.name, at.params.trim()))
                }
            }
            _ => None,
        }
    }
}

impl Rule {
    #[must_use]
    pub fn new(selector: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            id: NodeId::next(),
            selector: selector.into(),
            nodes,
            raws: Raws::default(),
        }
    }
}

impl AtRule {
    #[must_use]
    pub fn new(name: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            id: NodeId::next(),
            name: name.into(),
            params: params.into(),
            nodes: None,
            raws: Raws::default(),
        }
    }
}

impl Declaration {
    #[must_use]
    pub fn new(prop: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: NodeId::next(),
            prop: prop.into(),
            value: value.into(),
            raws: Raws::default(),
        }
    }
}

impl Comment {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: NodeId::next(),
            text: text.into(),
            inline: false,
            raws: Raws::default(),
        }
    }
}

/// A classified `@import` that the resolver will inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDirective {
    pub id: NodeId,
    /// Target as written, without quotes or `url()`.
    pub uri: String,
}

impl ImportDirective {
    /// Classify a node as an inlinable import.
    ///
    /// Only `@import` statements with a single local target and no media
    /// query qualify; everything else is left for the browser.
    #[must_use]
    pub fn from_node(node: &Node) -> Option<Self> {
        let Node::AtRule(at) = node else {
            return None;
        };
        if !at.name.eq_ignore_ascii_case("import") || at.nodes.is_some() {
            return None;
        }
        let uri = parse_import_target(at.params.trim())?;
        if is_remote(&uri) {
            return None;
        }
        Some(Self { id: at.id, uri })
    }
}

fn parse_import_target(params: &str) -> Option<String> {
    let (target, rest) = if let Some(inner) = params.strip_prefix("url(") {
        let end = inner.find(')')?;
        let raw = inner[..end].trim();
        (unquote(raw).unwrap_or(raw).to_string(), &inner[end + 1..])
    } else {
        let quote = params.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let end = params[1..].find(quote)? + 1;
        (params[1..end].to_string(), &params[end + 1..])
    };
    if !rest.trim().is_empty() || target.is_empty() {
        return None;
    }
    Some(target)
}

fn unquote(s: &str) -> Option<&str> {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
}

fn is_remote(uri: &str) -> bool {
    uri.starts_with("http:")
        || uri.starts_with("https:")
        || uri.starts_with("//")
        || uri.starts_with("data:")
}
