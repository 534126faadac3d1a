//! `devbundle css` command implementation.
//!
//! Compiles one style entry with `@import` inlining. With `--watch`, the entry
//! and every file inlined into it are watched and the entry is recompiled on
//! change.

use devbundle_core::style::BuildMessage;
use devbundle_core::{compile_entry, CompileOptions, CompiledStyle};
use miette::{IntoDiagnostic, Result};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Quiet period after a change before recompiling.
const DEBOUNCE: Duration = Duration::from_millis(50);

/// Style compile action.
#[derive(Debug, Clone)]
pub struct CssAction {
    /// Entry file, absolute.
    pub entry: PathBuf,
    /// Output file; stdout when absent.
    pub output: Option<PathBuf>,
    pub watch: bool,
}

/// JSON result.
#[derive(Serialize)]
struct CssResult<'a> {
    ok: bool,
    entry: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    messages: &'a [BuildMessage],
    duration_ms: u64,
}

pub fn run(options: CompileOptions, action: CssAction, json: bool) -> Result<()> {
    let runtime = Runtime::new().into_diagnostic()?;
    let compiled = compile_once(&runtime, &options, &action, json)?;
    if !action.watch {
        return Ok(());
    }
    watch(&runtime, &options, &action, &compiled, json)
}

fn compile_once(
    runtime: &Runtime,
    options: &CompileOptions,
    action: &CssAction,
    json: bool,
) -> Result<CompiledStyle> {
    let started = Instant::now();
    let compiled = runtime
        .block_on(compile_entry(&action.entry, options))
        .into_diagnostic()?;
    let duration_ms = started.elapsed().as_millis() as u64;

    if let Some(output) = &action.output {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).into_diagnostic()?;
        }
        std::fs::write(output, &compiled.code).into_diagnostic()?;
    }

    if json {
        let result = CssResult {
            ok: true,
            entry: action.entry.display().to_string(),
            output: action.output.as_ref().map(|p| p.display().to_string()),
            code: action.output.is_none().then_some(compiled.code.as_str()),
            messages: &compiled.messages,
            duration_ms,
        };
        println!("{}", serde_json::to_string(&result).into_diagnostic()?);
    } else if action.output.is_none() {
        print!("{}", compiled.code);
    }

    info!(
        entry = %action.entry.display(),
        dependencies = compiled.messages.len(),
        duration_ms,
        "compiled"
    );
    Ok(compiled)
}

fn watch(
    runtime: &Runtime,
    options: &CompileOptions,
    action: &CssAction,
    compiled: &CompiledStyle,
    json: bool,
) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let mut watcher = RecommendedWatcher::new(tx, Config::default()).into_diagnostic()?;
    let mut watched = BTreeSet::new();
    sync_watches(&mut watcher, &mut watched, compiled.watched_files(&action.entry));
    eprintln!("  Watching {} files. Press Ctrl+C to stop.", watched.len());

    loop {
        match rx.recv() {
            Ok(Ok(event)) => {
                if event.kind.is_access() {
                    continue;
                }
                debug!(paths = ?event.paths, "change");
                // Editors emit bursts of events for one save.
                while rx.recv_timeout(DEBOUNCE).is_ok() {}

                match compile_once(runtime, options, action, json) {
                    Ok(compiled) => {
                        sync_watches(&mut watcher, &mut watched, compiled.watched_files(&action.entry));
                    }
                    Err(e) => eprintln!("{e:?}"),
                }
            }
            Ok(Err(e)) => warn!("watch error: {e}"),
            Err(_) => break,
        }
    }
    Ok(())
}

/// Re-register every file; atomic saves replace the watched inode.
fn sync_watches(watcher: &mut RecommendedWatcher, watched: &mut BTreeSet<PathBuf>, files: Vec<PathBuf>) {
    for path in std::mem::take(watched) {
        let _ = watcher.unwatch(&path);
    }
    for path in files {
        if watch_path(watcher, &path) {
            watched.insert(path);
        }
    }
}

fn watch_path(watcher: &mut RecommendedWatcher, path: &Path) -> bool {
    match watcher.watch(path, RecursiveMode::NonRecursive) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), "cannot watch: {e}");
            false
        }
    }
}
