//! Sass/SCSS compilation using grass.

use super::StyleError;
use std::path::Path;

/// Sass compilation options.
#[derive(Debug, Clone, Default)]
pub struct SassOptions {
    /// Include paths for any `@use`/`@forward` left after import inlining.
    pub include_paths: Vec<String>,
    /// Compressed instead of expanded output.
    pub minify: bool,
    /// Source file path (selects indented syntax for `.sass`).
    pub filename: Option<String>,
}

/// Compile Sass/SCSS to CSS.
pub fn compile_sass(source: &str, options: &SassOptions) -> Result<String, StyleError> {
    let mut grass_options = grass::Options::default();

    if let Some(fname) = options.filename.as_deref() {
        if Path::new(fname)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sass"))
        {
            grass_options = grass_options.input_syntax(grass::InputSyntax::Sass);
        }
        if let Some(parent) = Path::new(fname).parent() {
            grass_options = grass_options.load_path(parent);
        }
    }

    grass_options = grass_options.style(if options.minify {
        grass::OutputStyle::Compressed
    } else {
        grass::OutputStyle::Expanded
    });

    for path in &options.include_paths {
        grass_options = grass_options.load_path(path);
    }

    grass::from_string(source.to_string(), &grass_options).map_err(|e| StyleError::Sass(format!("{e}")))
}

/// Check if a file is a Sass/SCSS file.
#[must_use]
pub fn is_sass_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == "scss" || e == "sass")
}
