//! Style entry compilation: inline imports, then Sass, then minify.

use super::css::{process_css, CssOptions};
use super::imports::{resolve_imports, BuildMessage, ImportOptions};
use super::parser::parse;
use super::printer::print;
use super::sass::{compile_sass, is_sass_file, SassOptions};
use super::StyleError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Options for [`compile_entry`].
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub imports: ImportOptions,
    pub minify: bool,
    pub autoprefixer: bool,
    /// Extra Sass load paths.
    pub include_paths: Vec<String>,
}

/// A compiled style entry.
#[derive(Debug, Clone)]
pub struct CompiledStyle {
    pub code: String,
    /// Dependency records for the watcher, in discovery order.
    pub messages: Vec<BuildMessage>,
}

impl CompiledStyle {
    /// The entry plus every file inlined into it.
    #[must_use]
    pub fn watched_files(&self, entry: &Path) -> Vec<PathBuf> {
        let mut files = vec![entry.to_path_buf()];
        for message in &self.messages {
            let BuildMessage::Dependency { file, .. } = message;
            files.push(file.clone());
        }
        files
    }
}

/// Compile one style entry point.
pub async fn compile_entry(path: &Path, options: &CompileOptions) -> Result<CompiledStyle, StyleError> {
    let source = options
        .imports
        .loader
        .load(path)
        .await
        .map_err(|source| StyleError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let mut sheet = parse(&source).map_err(|source| StyleError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    sheet.source = Some(path.to_path_buf());

    let resolved = resolve_imports(sheet, path, &options.imports).await?;
    let mut code = print(&resolved.stylesheet);
    let filename = path.display().to_string();

    if is_sass_file(path) {
        code = compile_sass(
            &code,
            &SassOptions {
                include_paths: options.include_paths.clone(),
                minify: false,
                filename: Some(filename.clone()),
            },
        )?;
    }

    let code = process_css(
        &code,
        &CssOptions {
            minify: options.minify,
            autoprefixer: options.autoprefixer,
            filename: Some(filename),
            targets: None,
        },
    )?;

    debug!(
        file = %path.display(),
        dependencies = resolved.messages.len(),
        bytes = code.len(),
        "compiled style entry"
    );

    Ok(CompiledStyle {
        code,
        messages: resolved.messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_compile_css_entry_with_imports() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base.css"), ".base { color: red; }").unwrap();
        std::fs::write(
            dir.path().join("main.css"),
            "/* base */\n@import 'base.css';\n.main { margin: 0; }\n",
        )
        .unwrap();

        let entry = dir.path().join("main.css");
        let options = CompileOptions {
            minify: true,
            ..Default::default()
        };
        let compiled = compile_entry(&entry, &options).await.unwrap();

        assert!(compiled.code.contains(".base{color:red}"), "{}", compiled.code);
        assert!(compiled.code.find(".base").unwrap() < compiled.code.find(".main").unwrap());
        assert_eq!(compiled.watched_files(&entry).len(), 2);
    }

    #[tokio::test]
    async fn test_compile_scss_entry_with_scoped_import() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pad.scss"), "padding: $gap;").unwrap();
        std::fs::write(
            dir.path().join("main.scss"),
            "$gap: 2px;\n@mixin padded {\n  @import 'pad';\n}\n.box { @include padded; }\n",
        )
        .unwrap();

        let compiled = compile_entry(&dir.path().join("main.scss"), &CompileOptions::default())
            .await
            .unwrap();
        assert!(compiled.code.contains("padding: 2px"), "{}", compiled.code);
        assert!(!compiled.code.contains("@import"));
    }

    #[tokio::test]
    async fn test_missing_entry_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = compile_entry(&dir.path().join("nope.css"), &CompileOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StyleError::Read { .. }));
    }
}
