//! Entry targets: logical build units keyed by their primary script.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Environment variable carrying the comma-joined entry ids a worker builds.
pub const ENTRIES_ENV_VAR: &str = "DEVBUNDLE_ENTRIES";

/// Layout-direction suffixes emitted next to the default style output.
const LAYOUT_SUFFIXES: &[&str] = &[".rtl", "-rtl"];

const STYLE_EXTENSIONS: &[&str] = &[".css", ".scss", ".sass", ".less"];

/// Source files of one entry target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EntryFiles {
    pub scripts: Vec<String>,
    pub styles: Vec<String>,
}

impl EntryFiles {
    #[must_use]
    pub fn new<S: Into<String>>(
        scripts: impl IntoIterator<Item = S>,
        styles: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            scripts: scripts.into_iter().map(Into::into).collect(),
            styles: styles.into_iter().map(Into::into).collect(),
        }
    }
}

/// Configured entry targets, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryTargets(BTreeMap<String, EntryFiles>);

impl EntryTargets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, files: EntryFiles) {
        self.0.insert(id.into(), files);
    }

    #[must_use]
    pub fn with(mut self, id: impl Into<String>, files: EntryFiles) -> Self {
        self.insert(id, files);
        self
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&EntryFiles> {
        self.0.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntryFiles)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Find the entry target that owns a requested asset.
    ///
    /// Scripts match when the request path (or its file name) is listed in a
    /// target's scripts. Otherwise the file name, minus extension and
    /// layout-direction suffix, is compared with each style's file name after
    /// `source_prefix` and extension are stripped. `None` means no configured
    /// target claims the asset.
    #[must_use]
    pub fn resolve_entry_for(&self, asset_path: &str, source_prefix: &str) -> Option<&str> {
        let path = asset_path.split(['?', '#']).next().unwrap_or(asset_path);
        let path = path.trim_start_matches('/');
        let file = file_name(path);
        if file.is_empty() {
            return None;
        }

        let script_match = self.0.iter().find(|(_, files)| {
            files.scripts.iter().any(|script| {
                let script = script.trim_start_matches("./");
                script == path || script == file
            })
        });
        if let Some((id, _)) = script_match {
            return Some(id.as_str());
        }

        let requested = requested_style_name(file);
        self.0
            .iter()
            .find(|(_, files)| {
                files
                    .styles
                    .iter()
                    .any(|style| configured_style_name(style, source_prefix) == requested)
            })
            .map(|(id, _)| id.as_str())
    }

    /// Restrict to the ids named in a worker selection.
    ///
    /// An empty selection keeps every target.
    pub fn select(&self, ids: &[String]) -> Result<Self, Error> {
        if ids.is_empty() {
            return Ok(self.clone());
        }
        let mut selected = Self::new();
        for id in ids {
            let files = self
                .0
                .get(id)
                .ok_or_else(|| Error::UnknownEntry { id: id.clone() })?;
            selected.insert(id.clone(), files.clone());
        }
        Ok(selected)
    }

    /// Bundler entry map: id to scripts followed by styles.
    #[must_use]
    pub fn to_bundler_entries(&self) -> BTreeMap<String, Vec<String>> {
        self.0
            .iter()
            .map(|(id, files)| {
                let sources = files
                    .scripts
                    .iter()
                    .chain(files.styles.iter())
                    .cloned()
                    .collect();
                (id.clone(), sources)
            })
            .collect()
    }
}

/// Split a comma-joined entry list, ignoring blanks.
#[must_use]
pub fn parse_entry_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Join entry ids for the worker environment.
#[must_use]
pub fn join_entry_list<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    ids.into_iter().collect::<Vec<_>>().join(",")
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn strip_style_extension(name: &str) -> &str {
    STYLE_EXTENSIONS
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(name)
}

fn requested_style_name(file: &str) -> &str {
    let name = strip_style_extension(file);
    LAYOUT_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name)
}

fn configured_style_name<'a>(style: &'a str, source_prefix: &str) -> &'a str {
    let style = style.trim_start_matches("./");
    let style = if source_prefix.is_empty() {
        style
    } else {
        style.strip_prefix(source_prefix).unwrap_or(style)
    };
    strip_style_extension(file_name(style))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets() -> EntryTargets {
        EntryTargets::new()
            .with("index.js", EntryFiles::new(["index.js"], ["styles"]))
            .with(
                "admin.js",
                EntryFiles::new(["admin.js", "admin-extras.js"], ["./src/admin/panel.scss"]),
            )
    }

    #[test]
    fn test_resolve_script() {
        let targets = targets();
        assert_eq!(targets.resolve_entry_for("index.js", "src/"), Some("index.js"));
        assert_eq!(targets.resolve_entry_for("/index.js?v=3", "src/"), Some("index.js"));
        assert_eq!(targets.resolve_entry_for("/admin-extras.js", "src/"), Some("admin.js"));
    }

    #[test]
    fn test_resolve_style_with_layout_suffix() {
        let targets = targets();
        assert_eq!(targets.resolve_entry_for("styles.rtl", "src/"), Some("index.js"));
        assert_eq!(targets.resolve_entry_for("/styles.css", "src/"), Some("index.js"));
        assert_eq!(targets.resolve_entry_for("/styles-rtl.css", "src/"), Some("index.js"));
        assert_eq!(targets.resolve_entry_for("/panel.rtl.css", "src/"), Some("admin.js"));
    }

    #[test]
    fn test_unclaimed_asset() {
        let targets = targets();
        assert_eq!(targets.resolve_entry_for("/chunk-42.js", "src/"), None);
        assert_eq!(targets.resolve_entry_for("/", "src/"), None);
    }

    #[test]
    fn test_select() {
        let targets = targets();
        let selected = targets.select(&parse_entry_list("admin.js, ")).unwrap();
        assert_eq!(selected.ids().collect::<Vec<_>>(), vec!["admin.js"]);
        assert_eq!(targets.select(&[]).unwrap().len(), 2);
        assert!(matches!(
            targets.select(&["nope.js".to_string()]),
            Err(Error::UnknownEntry { .. })
        ));
    }

    #[test]
    fn test_entry_list_round_trip() {
        assert_eq!(join_entry_list(["a.js", "b.js"]), "a.js,b.js");
        assert_eq!(parse_entry_list(" a.js ,,b.js"), vec!["a.js", "b.js"]);
    }

    #[test]
    fn test_bundler_entries() {
        let entries = targets().to_bundler_entries();
        assert_eq!(entries["index.js"], vec!["index.js", "styles"]);
    }
}
