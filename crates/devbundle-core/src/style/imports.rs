//! Recursive `@import` inlining.
//!
//! Resolution runs in two phases over one [`ImportContext`]:
//!
//! 1. **Discovery** walks the tree depth-first in document order. Each distinct
//!    resolved path gets exactly one [`ImportRecord`], appended to the ordered
//!    record list when first seen; its file is read and parsed once, and its
//!    own imports are discovered before the walk continues with siblings.
//!    Later references only widen the record's scope (global and/or a set of
//!    inclusion-rule names).
//! 2. **Injection** (root document only) reports every record as a build
//!    dependency, splices scoped records into their inclusion rules, prepends
//!    globally imported records in discovery order and finally sweeps any
//!    import nodes that are still in the tree.
//!
//! An import is *scoped* when it sits inside a container (a rule, a mixin or
//! another block at-rule). Its inclusion-rule tag is the container's scope key
//! with the configured modifier prefix stripped.

use super::ast::{ImportDirective, Node, NodeId, Stylesheet};
use super::parser::parse;
use super::StyleError;
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Comment markers consumed by conditional-compilation tooling downstream.
pub const DEFAULT_CONDITION_MARKERS: &[&str] = &["#if", "#elif", "#else", "#endif"];

/// Maps an import URI to an absolute path.
pub trait ImportPathResolver: Send + Sync {
    /// Resolve `uri` as written in `importer`.
    fn resolve(&self, uri: &str, importer: &Path) -> PathBuf;
}

/// Default resolver: join onto the importing file's directory.
///
/// A URI without an extension inherits the importer's extension, so
/// `@import 'colors'` inside `theme.scss` loads `colors.scss`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinResolver;

impl ImportPathResolver for JoinResolver {
    fn resolve(&self, uri: &str, importer: &Path) -> PathBuf {
        let base = importer.parent().unwrap_or_else(|| Path::new(""));
        let mut path = base.join(uri);
        if path.extension().is_none() {
            if let Some(ext) = importer.extension() {
                path.set_extension(ext);
            }
        }
        normalize(&path)
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Reads imported files.
pub trait SourceLoader: Send + Sync {
    fn load<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<String>>;
}

/// Loads files from disk with `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl SourceLoader for FsLoader {
    fn load<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<String>> {
        Box::pin(tokio::fs::read_to_string(path))
    }
}

/// Rewrites every imported sheet after it is parsed and before its own
/// imports are discovered.
pub trait StyleTransform: Send + Sync {
    fn name(&self) -> &str;
    fn transform(&self, sheet: &mut Stylesheet) -> Result<(), String>;
}

/// Import resolution settings.
#[derive(Clone)]
pub struct ImportOptions {
    pub resolver: Arc<dyn ImportPathResolver>,
    pub loader: Arc<dyn SourceLoader>,
    /// Prefix allowed in front of an inclusion rule's name (e.g. `%`).
    pub modifier: Option<String>,
    /// Comments containing any of these survive import removal.
    pub condition_markers: Vec<String>,
    pub transforms: Vec<Arc<dyn StyleTransform>>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            resolver: Arc::new(JoinResolver),
            loader: Arc::new(FsLoader),
            modifier: None,
            condition_markers: DEFAULT_CONDITION_MARKERS
                .iter()
                .map(ToString::to_string)
                .collect(),
            transforms: Vec::new(),
        }
    }
}

impl fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportOptions")
            .field("modifier", &self.modifier)
            .field("condition_markers", &self.condition_markers)
            .field(
                "transforms",
                &self.transforms.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Message for the incremental-rebuild watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BuildMessage {
    Dependency { file: PathBuf, parent: PathBuf },
}

/// Output of [`resolve_imports`].
#[derive(Debug, Clone)]
pub struct ResolvedStylesheet {
    pub stylesheet: Stylesheet,
    pub messages: Vec<BuildMessage>,
}

impl ResolvedStylesheet {
    /// Every inlined file, in discovery order.
    #[must_use]
    pub fn dependencies(&self) -> Vec<&Path> {
        self.messages
            .iter()
            .map(|m| match m {
                BuildMessage::Dependency { file, .. } => file.as_path(),
            })
            .collect()
    }
}

/// One per distinct resolved path.
#[derive(Debug, Clone)]
struct ImportRecord {
    /// Parsed nodes of the imported file.
    root: Vec<Node>,
    /// First top-level import of the file, removed when it is prepended.
    global_node: Option<NodeId>,
    full_path: PathBuf,
    from_path: PathBuf,
    globally_imported: bool,
    inclusion_rules: BTreeSet<String>,
}

/// An import found during discovery.
#[derive(Debug, Clone)]
struct ImportSite {
    id: NodeId,
    uri: String,
    tag: Option<String>,
}

struct ImportContext<'o> {
    options: &'o ImportOptions,
    root_path: PathBuf,
    records: Vec<ImportRecord>,
    by_path: HashMap<PathBuf, usize>,
    /// Resolved target of every import node seen.
    targets: HashMap<NodeId, PathBuf>,
}

/// Inline every local `@import` of `sheet`, which was read from `path`.
pub async fn resolve_imports(
    mut sheet: Stylesheet,
    path: &Path,
    options: &ImportOptions,
) -> Result<ResolvedStylesheet, StyleError> {
    let mut ctx = ImportContext {
        options,
        root_path: path.to_path_buf(),
        records: Vec::new(),
        by_path: HashMap::new(),
        targets: HashMap::new(),
    };

    let sites = collect_sites(&sheet.nodes, options.modifier.as_deref());
    discover(&mut ctx, sites, path.to_path_buf()).await?;
    debug!(
        file = %path.display(),
        imports = ctx.records.len(),
        "discovered style imports"
    );

    let messages = ctx.inject(&mut sheet.nodes)?;
    Ok(ResolvedStylesheet {
        stylesheet: sheet,
        messages,
    })
}

/// Import sites of a tree in document order, with their inclusion-rule tags.
fn collect_sites(nodes: &[Node], modifier: Option<&str>) -> Vec<ImportSite> {
    fn walk(nodes: &[Node], tag: Option<&str>, modifier: Option<&str>, out: &mut Vec<ImportSite>) {
        for node in nodes {
            if let Some(directive) = ImportDirective::from_node(node) {
                out.push(ImportSite {
                    id: directive.id,
                    uri: directive.uri,
                    tag: tag.map(ToString::to_string),
                });
                continue;
            }
            if let Some(children) = node.children() {
                let key = node.scope_key().map(|key| strip_modifier(&key, modifier));
                walk(children, key.as_deref().or(tag), modifier, out);
            }
        }
    }

    let mut out = Vec::new();
    walk(nodes, None, modifier, &mut out);
    out
}

fn strip_modifier(key: &str, modifier: Option<&str>) -> String {
    match modifier {
        Some(m) if !m.is_empty() => key.strip_prefix(m).unwrap_or(key).to_string(),
        _ => key.to_string(),
    }
}

/// Depth-first discovery. Siblings are loaded strictly one after another so
/// the record order is the document order.
fn discover<'a, 'o: 'a>(
    ctx: &'a mut ImportContext<'o>,
    sites: Vec<ImportSite>,
    from: PathBuf,
) -> BoxFuture<'a, Result<(), StyleError>> {
    Box::pin(async move {
        for site in sites {
            let full_path = ctx.options.resolver.resolve(&site.uri, &from);
            ctx.targets.insert(site.id, full_path.clone());

            if full_path == ctx.root_path {
                warn!(file = %from.display(), "ignoring import of the root style sheet");
                continue;
            }

            if let Some(&index) = ctx.by_path.get(&full_path) {
                let record = &mut ctx.records[index];
                match site.tag {
                    None => {
                        record.globally_imported = true;
                        record.global_node.get_or_insert(site.id);
                    }
                    Some(tag) => {
                        record.inclusion_rules.insert(tag);
                    }
                }
                continue;
            }

            let source = ctx
                .options
                .loader
                .load(&full_path)
                .await
                .map_err(|source| StyleError::Read {
                    path: full_path.clone(),
                    source,
                })?;
            let mut sheet = parse(&source).map_err(|source| StyleError::Parse {
                path: full_path.clone(),
                source,
            })?;
            sheet.source = Some(full_path.clone());
            for transform in &ctx.options.transforms {
                transform
                    .transform(&mut sheet)
                    .map_err(|message| StyleError::Transform {
                        name: transform.name().to_string(),
                        message,
                    })?;
            }

            let nested = collect_sites(&sheet.nodes, ctx.options.modifier.as_deref());
            let mut record = ImportRecord {
                root: sheet.nodes,
                global_node: site.tag.is_none().then_some(site.id),
                full_path: full_path.clone(),
                from_path: from.clone(),
                globally_imported: site.tag.is_none(),
                inclusion_rules: BTreeSet::new(),
            };
            if let Some(tag) = site.tag {
                record.inclusion_rules.insert(tag);
            }
            ctx.by_path.insert(full_path.clone(), ctx.records.len());
            ctx.records.push(record);

            discover(ctx, nested, full_path).await?;
        }
        Ok(())
    })
}

/// Result of looking for an inclusion rule in one tree, ordered by how far
/// the search got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ScopeSearch {
    NoScope,
    ScopeWithoutImport,
    Spliced,
}

impl ImportContext<'_> {
    fn inject(&mut self, document: &mut Vec<Node>) -> Result<Vec<BuildMessage>, StyleError> {
        let messages = self
            .records
            .iter()
            .map(|record| BuildMessage::Dependency {
                file: record.full_path.clone(),
                parent: record.from_path.clone(),
            })
            .collect();

        let markers = self.options.condition_markers.clone();

        // Global imports leave their directive behind; drop it and its comment.
        // Scoped directives of the same file stay for the splice below.
        for index in 0..self.records.len() {
            let Some(id) = self.records[index].global_node else {
                continue;
            };
            if !remove_by_id(document, id, &markers) {
                for record in &mut self.records {
                    if remove_by_id(&mut record.root, id, &markers) {
                        break;
                    }
                }
            }
        }

        // Scoped splices run innermost first: a record discovered later may
        // live inside a scope defined by an earlier one, and that earlier
        // record has to be complete before it is copied anywhere.
        for index in (0..self.records.len()).rev() {
            let rules: Vec<String> = self.records[index].inclusion_rules.iter().cloned().collect();
            for rule in rules {
                self.splice_scoped(document, index, &rule, &markers)?;
            }
        }

        let mut prepended = Vec::new();
        for record in &mut self.records {
            if record.globally_imported {
                let mut nodes = std::mem::take(&mut record.root);
                ensure_leading_newline(&mut nodes, !prepended.is_empty());
                prepended.extend(nodes);
            }
        }
        if !prepended.is_empty() {
            ensure_leading_newline(document, true);
            prepended.append(document);
            *document = prepended;
        }

        sweep_imports(document);
        Ok(messages)
    }

    fn splice_scoped(
        &mut self,
        document: &mut Vec<Node>,
        index: usize,
        rule: &str,
        markers: &[String],
    ) -> Result<(), StyleError> {
        let full_path = self.records[index].full_path.clone();
        let content = self.records[index].root.clone();
        let mut keys = vec![rule.to_string()];
        if let Some(modifier) = self.options.modifier.as_deref().filter(|m| !m.is_empty()) {
            keys.push(format!("{modifier}{rule}"));
        }

        let targets = &self.targets;
        let is_target = |node: &Node| {
            ImportDirective::from_node(node)
                .is_some_and(|d| targets.get(&d.id) == Some(&full_path))
        };

        let mut outcome = splice_into_scope(document, &keys, &is_target, &content, markers);
        for (other, record) in self.records.iter_mut().enumerate() {
            if other != index {
                let found = splice_into_scope(&mut record.root, &keys, &is_target, &content, markers);
                outcome = outcome.max(found);
            }
        }

        match outcome {
            ScopeSearch::Spliced => Ok(()),
            ScopeSearch::NoScope => Err(StyleError::MissingInclusionRule {
                rule: rule.to_string(),
                file: self.records[index].full_path.clone(),
            }),
            ScopeSearch::ScopeWithoutImport => Err(StyleError::MissingImportToReplace {
                rule: rule.to_string(),
                file: self.records[index].full_path.clone(),
            }),
        }
    }
}

/// Replace the target import with a copy of `content` in every container
/// keyed by one of `keys`, at any depth. A selector may be defined more than
/// once and each definition gets its own copy.
fn splice_into_scope(
    tree: &mut [Node],
    keys: &[String],
    is_target: &dyn Fn(&Node) -> bool,
    content: &[Node],
    markers: &[String],
) -> ScopeSearch {
    let mut outcome = ScopeSearch::NoScope;

    for node in tree.iter_mut() {
        let matches = node.scope_key().is_some_and(|key| keys.contains(&key));
        if matches {
            outcome = outcome.max(ScopeSearch::ScopeWithoutImport);
            if let Some(children) = node.children_mut() {
                if replace_import(children, is_target, content, markers) {
                    outcome = ScopeSearch::Spliced;
                }
            }
        }
        if let Some(children) = node.children_mut() {
            outcome = outcome.max(splice_into_scope(children, keys, is_target, content, markers));
        }
    }

    outcome
}

/// Replace every direct child import matching `is_target`. Nested containers
/// carry their own scope key and are handled by [`splice_into_scope`].
fn replace_import(
    nodes: &mut Vec<Node>,
    is_target: &dyn Fn(&Node) -> bool,
    content: &[Node],
    markers: &[String],
) -> bool {
    let mut replaced = false;
    while let Some(index) = nodes.iter().position(|n| is_target(n)) {
        let removed = nodes.remove(index);
        let index = remove_preceding_comment(nodes, index, markers);

        let mut copy: Vec<Node> = content.to_vec();
        for node in &mut copy {
            node.reassign_ids();
        }
        if let Some(first) = copy.first_mut() {
            first.raws_mut().before.clone_from(&removed.raws().before);
        }
        nodes.splice(index..index, copy);
        replaced = true;
    }
    replaced
}

/// Detach the node with `id` if it is attached anywhere in `nodes`.
fn remove_by_id(nodes: &mut Vec<Node>, id: NodeId, markers: &[String]) -> bool {
    if let Some(index) = nodes.iter().position(|n| n.id() == id) {
        let removed = nodes.remove(index);
        let index = remove_preceding_comment(nodes, index, markers);
        keep_line_break(nodes, index, &removed);
        return true;
    }
    nodes
        .iter_mut()
        .filter_map(Node::children_mut)
        .any(|children| remove_by_id(children, id, markers))
}

/// Drop the comment right before `index` unless it carries a condition
/// marker. Returns the position the removed node used to occupy.
fn remove_preceding_comment(nodes: &mut Vec<Node>, index: usize, markers: &[String]) -> usize {
    if index == 0 {
        return index;
    }
    let removable = nodes[index - 1]
        .as_comment()
        .is_some_and(|c| !markers.iter().any(|m| c.text.contains(m.as_str())));
    if removable {
        nodes.remove(index - 1);
        index - 1
    } else {
        index
    }
}

/// Keep the node now at `index` on its own line if the removed node was.
fn keep_line_break(nodes: &mut [Node], index: usize, removed: &Node) {
    if !removed.raws().before.contains('\n') && index != 0 {
        return;
    }
    if let Some(next) = nodes.get_mut(index) {
        let before = &mut next.raws_mut().before;
        if !before.contains('\n') {
            before.insert(0, '\n');
        }
    }
}

fn ensure_leading_newline(nodes: &mut [Node], needed: bool) {
    if !needed {
        return;
    }
    if let Some(first) = nodes.first_mut() {
        let before = &mut first.raws_mut().before;
        if !before.contains('\n') {
            before.insert(0, '\n');
        }
    }
}

/// Remove every import directive still in the tree.
fn sweep_imports(nodes: &mut Vec<Node>) {
    let mut index = 0;
    while index < nodes.len() {
        if ImportDirective::from_node(&nodes[index]).is_some() {
            let removed = nodes.remove(index);
            keep_line_break(nodes, index, &removed);
            continue;
        }
        if let Some(children) = nodes[index].children_mut() {
            sweep_imports(children);
        }
        index += 1;
    }
}
