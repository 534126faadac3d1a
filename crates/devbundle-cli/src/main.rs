#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use devbundle_core::BuildConfig;
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "devbundle")]
#[command(author, version, about = "On-demand bundler dev server and style import inliner", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Config file (default: devbundle.json in the working directory)
    #[arg(long, global = true, value_name = "PATH", env = "DEVBUNDLE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Run the on-demand dev server broker
    Dev {
        /// Port the broker listens on
        #[arg(short, long)]
        port: Option<u16>,

        /// Port the bundler worker listens on
        #[arg(long)]
        worker_port: Option<u16>,

        /// Entry ids to start before the first request
        #[arg(long, value_delimiter = ',')]
        prewarm: Vec<String>,
    },

    /// Compile a style entry, inlining its imports
    Css {
        /// Style entry file
        entry: PathBuf,

        /// Write the result here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Minify the output
        #[arg(long)]
        minify: bool,

        /// Prefix allowed in front of inclusion-rule names
        #[arg(long)]
        modifier: Option<String>,

        /// Recompile when the entry or an inlined file changes
        #[arg(short, long)]
        watch: bool,
    },

    /// Print the bundler entry map for the worker's selected entries
    Entries {
        /// Comma-separated entry ids (default: DEVBUNDLE_ENTRIES, else all)
        #[arg(long)]
        only: Option<String>,
    },

    /// Print a named config option, or the whole config
    Config {
        /// Option name, e.g. `fastRefresh` or `paths.output`
        name: Option<String>,
    },
}

fn load_config(cwd: &Path, path: Option<&Path>) -> Result<BuildConfig> {
    match path {
        Some(path) => BuildConfig::load(&cwd.join(path)),
        None => BuildConfig::discover(cwd),
    }
    .into_diagnostic()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    logging::init(cli.verbose, cli.json);

    let command = match cli.command {
        Some(Commands::Version) | None => return commands::version::run(),
        Some(command) => command,
    };
    let config = load_config(&cwd, cli.config.as_deref())?;

    match command {
        Commands::Version => commands::version::run(),
        Commands::Dev {
            port,
            worker_port,
            prewarm,
        } => commands::dev::run(
            config,
            commands::dev::DevAction {
                cwd,
                port,
                worker_port,
                prewarm,
            },
        ),
        Commands::Css {
            entry,
            output,
            minify,
            modifier,
            watch,
        } => {
            let mut options = config.compile_options();
            options.minify |= minify;
            options.include_paths = options
                .include_paths
                .iter()
                .map(|p| cwd.join(p).display().to_string())
                .collect();
            if modifier.is_some() {
                options.imports.modifier = modifier;
            }
            let action = commands::css::CssAction {
                entry: cwd.join(entry),
                output: output.map(|p| cwd.join(p)),
                watch,
            };
            commands::css::run(options, action, cli.json)
        }
        Commands::Entries { only } => commands::entries::run(&config, only.as_deref()),
        Commands::Config { name: Some(name) } => commands::config::run(&config, &name, cli.json),
        Commands::Config { name: None } => commands::config::dump(&config),
    }
}
