//! Build configuration loaded from `devbundle.json`.
//!
//! Every option is a typed field. Named lookups go through
//! [`BuildConfig::option`], which rejects names it does not know.

use crate::entries::{parse_entry_list, EntryTargets, ENTRIES_ENV_VAR};
use crate::error::Error;
use crate::style::imports::{ImportOptions, DEFAULT_CONDITION_MARKERS};
use crate::style::CompileOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory.
pub const CONFIG_FILE: &str = "devbundle.json";

/// Source map flavour handed to the bundler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SourceMapMode {
    None,
    #[default]
    Eval,
    Cheap,
    SourceMap,
}

impl SourceMapMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Eval => "eval",
            Self::Cheap => "cheap",
            Self::SourceMap => "source-map",
        }
    }
}

/// Root directories of the project, relative to the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct PathRoots {
    pub root: PathBuf,
    pub src: PathBuf,
    pub output: PathBuf,
    pub public: PathBuf,
}

impl Default for PathRoots {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            src: PathBuf::from("src"),
            output: PathBuf::from("dist"),
            public: PathBuf::from("public"),
        }
    }
}

/// Front server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BrokerSettings {
    pub port: u16,
    /// Entry ids started before the first request.
    pub prewarm: Vec<String>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            port: 3000,
            prewarm: Vec::new(),
        }
    }
}

/// How the bundler dev server is launched and probed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct WorkerSettings {
    pub command: String,
    pub args: Vec<String>,
    pub port: u16,
    pub startup_grace_ms: u64,
    pub ready_timeout_ms: u64,
    pub fallback_wait_ms: u64,
    pub probe_interval_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            command: "npx".to_string(),
            args: vec!["webpack".to_string(), "serve".to_string()],
            port: 3001,
            startup_grace_ms: 500,
            ready_timeout_ms: 60_000,
            fallback_wait_ms: 5_000,
            probe_interval_ms: 100,
        }
    }
}

/// Style entry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct StyleSettings {
    /// Prefix allowed in front of inclusion-rule names.
    pub modifier: Option<String>,
    /// Prefix stripped from configured style paths when matching requests.
    pub source_prefix: String,
    pub condition_markers: Vec<String>,
    pub minify: bool,
    pub autoprefixer: bool,
}

impl Default for StyleSettings {
    fn default() -> Self {
        Self {
            modifier: None,
            source_prefix: "src/".to_string(),
            condition_markers: DEFAULT_CONDITION_MARKERS
                .iter()
                .map(ToString::to_string)
                .collect(),
            minify: false,
            autoprefixer: true,
        }
    }
}

/// Complete build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BuildConfig {
    pub fast_refresh: bool,
    pub live_reload: bool,
    pub source_map: SourceMapMode,
    pub filesystem_cache: bool,
    pub bundle_analyzer: bool,
    pub bundle_stats: bool,
    pub paths: PathRoots,
    pub entries: EntryTargets,
    pub broker: BrokerSettings,
    pub worker: WorkerSettings,
    pub styles: StyleSettings,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            fast_refresh: true,
            live_reload: true,
            source_map: SourceMapMode::default(),
            filesystem_cache: true,
            bundle_analyzer: false,
            bundle_stats: false,
            paths: PathRoots::default(),
            entries: EntryTargets::default(),
            broker: BrokerSettings::default(),
            worker: WorkerSettings::default(),
            styles: StyleSettings::default(),
        }
    }
}

/// Value of a named option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Text(String),
    Path(PathBuf),
    Port(u16),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => f.write_str(s),
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Port(p) => write!(f, "{p}"),
        }
    }
}

/// Names accepted by [`BuildConfig::option`].
pub const OPTION_NAMES: &[&str] = &[
    "fastRefresh",
    "liveReload",
    "sourceMap",
    "filesystemCache",
    "bundleAnalyzer",
    "bundleStats",
    "paths.root",
    "paths.src",
    "paths.output",
    "paths.public",
    "broker.port",
    "worker.port",
];

impl BuildConfig {
    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `devbundle.json` from `cwd`, or defaults when there is none.
    pub fn discover(cwd: &Path) -> Result<Self, Error> {
        let path = cwd.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    #[must_use]
    pub fn with_broker_port(mut self, port: u16) -> Self {
        self.broker.port = port;
        self
    }

    #[must_use]
    pub fn with_worker_port(mut self, port: u16) -> Self {
        self.worker.port = port;
        self
    }

    #[must_use]
    pub fn with_entries(mut self, entries: EntryTargets) -> Self {
        self.entries = entries;
        self
    }

    /// Look up an option by name.
    pub fn option(&self, name: &str) -> Result<OptionValue, Error> {
        let value = match name {
            "fastRefresh" => OptionValue::Bool(self.fast_refresh),
            "liveReload" => OptionValue::Bool(self.live_reload),
            "sourceMap" => OptionValue::Text(self.source_map.as_str().to_string()),
            "filesystemCache" => OptionValue::Bool(self.filesystem_cache),
            "bundleAnalyzer" => OptionValue::Bool(self.bundle_analyzer),
            "bundleStats" => OptionValue::Bool(self.bundle_stats),
            "paths.root" => OptionValue::Path(self.paths.root.clone()),
            "paths.src" => OptionValue::Path(self.paths.src.clone()),
            "paths.output" => OptionValue::Path(self.paths.output.clone()),
            "paths.public" => OptionValue::Path(self.paths.public.clone()),
            "broker.port" => OptionValue::Port(self.broker.port),
            "worker.port" => OptionValue::Port(self.worker.port),
            _ => {
                return Err(Error::UnrecognizedOption {
                    name: name.to_string(),
                })
            }
        };
        Ok(value)
    }

    /// Entry points a worker should build.
    ///
    /// `selection` is the comma-joined id list from the worker environment;
    /// `None` or an empty list selects every configured entry.
    pub fn entry_points(&self, selection: Option<&str>) -> Result<EntryTargets, Error> {
        let ids = selection.map(parse_entry_list).unwrap_or_default();
        self.entries.select(&ids)
    }

    /// Style compile options built from the `styles` section.
    #[must_use]
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            imports: ImportOptions {
                modifier: self.styles.modifier.clone(),
                condition_markers: self.styles.condition_markers.clone(),
                ..ImportOptions::default()
            },
            minify: self.styles.minify,
            autoprefixer: self.styles.autoprefixer,
            include_paths: vec![self.paths.src.display().to_string()],
        }
    }

    /// [`Self::entry_points`] using the worker environment variable.
    pub fn entry_points_from_env(&self) -> Result<EntryTargets, Error> {
        let selection = std::env::var(ENTRIES_ENV_VAR).ok();
        self.entry_points(selection.as_deref())
    }
}
