//! Style-sheet processing.
//!
//! Provides:
//! - A lossless syntax tree with parser and printer
//! - Recursive `@import` inlining with inclusion-rule scoping
//! - Sass/SCSS compilation (grass) and minification/prefixing (lightningcss)

pub mod ast;
pub mod compile;
pub mod css;
pub mod imports;
pub mod parser;
pub mod printer;
pub mod sass;

pub use ast::{AtRule, Comment, Declaration, ImportDirective, Node, NodeId, Raws, Rule, Stylesheet};
pub use compile::{compile_entry, CompileOptions, CompiledStyle};
pub use imports::{
    resolve_imports, BuildMessage, FsLoader, ImportOptions, ImportPathResolver, JoinResolver,
    ResolvedStylesheet, SourceLoader, StyleTransform,
};
pub use parser::{parse, ParseError};
pub use printer::print;

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building a style entry.
#[derive(Error, Debug)]
pub enum StyleError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("No inclusion rule `{rule}` found for import of {file}")]
    MissingInclusionRule { rule: String, file: PathBuf },

    #[error("Inclusion rule `{rule}` has no import of {file} to replace")]
    MissingImportToReplace { rule: String, file: PathBuf },

    #[error("[{name}] transform failed: {message}")]
    Transform { name: String, message: String },

    #[error("Sass compile error: {0}")]
    Sass(String),

    #[error("CSS error: {0}")]
    Css(String),
}
