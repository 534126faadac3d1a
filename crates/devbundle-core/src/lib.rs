#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod entries;
pub mod error;
pub mod style;
pub mod version;

pub use config::{BuildConfig, OptionValue, SourceMapMode};
pub use entries::{EntryFiles, EntryTargets, ENTRIES_ENV_VAR};
pub use error::Error;
pub use style::{
    compile_entry, parse, print, resolve_imports, BuildMessage, CompileOptions, CompiledStyle,
    ImportOptions, ResolvedStylesheet, StyleError, Stylesheet,
};
pub use version::VERSION;
