//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ConfigOverrides;
use crate::core::Priority;

/// Dynamic application runtime: compile, hot-reload and schedule apps
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: search upward for hotdesk.toml)
    #[arg(short = 'C', long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Apps root directory (overrides `runtime.apps_dir`)
    #[arg(short, long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub apps_dir: Option<PathBuf>,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Load every app, launch them and run the host loop with hot reload
    #[command(visible_alias = "r")]
    Run {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Validate an app directory without loading it
    #[command(visible_alias = "c")]
    Check {
        /// App directory containing `manifest.json` (or its name under the apps root)
        #[arg(default_value = ".", value_hint = clap::ValueHint::DirPath)]
        dir: PathBuf,
    },

    /// Copy an app directory into the apps root and load it
    #[command(visible_alias = "i")]
    Install {
        #[arg(value_hint = clap::ValueHint::DirPath)]
        source: PathBuf,
    },

    /// Remove an installed app
    Uninstall {
        /// App id from its manifest
        app: String,
    },

    /// List apps under the apps root
    #[command(visible_alias = "ls")]
    List,

    /// Scaffold a new app
    #[command(visible_alias = "n")]
    New {
        /// Directory to create (relative to the apps root)
        #[arg(value_hint = clap::ValueHint::DirPath)]
        name: PathBuf,

        /// App id (default: directory name, upper-cased)
        #[arg(long)]
        id: Option<String>,
    },
}

/// Arguments of the `run` command.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Apps to launch (default: every loaded app)
    #[arg(short, long, value_delimiter = ',')]
    pub launch: Vec<String>,

    /// Enable hot reload of app sources
    #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub watch: Option<bool>,

    /// Debounce delay for source changes, in milliseconds
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// Host tick length, in milliseconds
    #[arg(short, long)]
    pub tick_ms: Option<u64>,

    /// Priority of launched processes
    #[arg(short, long, value_enum)]
    pub priority: Option<Priority>,

    /// Crash report directory
    #[arg(long, value_hint = clap::ValueHint::DirPath)]
    pub crash_dir: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(short, long)]
    pub duration: Option<u64>,
}

impl Cli {
    /// Values that take precedence over `hotdesk.toml`.
    pub fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            apps_dir: self.apps_dir.clone(),
            ..ConfigOverrides::default()
        };
        if let Commands::Run { args } = &self.command {
            overrides.reload = args.watch;
            overrides.debounce_ms = args.debounce_ms;
            overrides.tick_ms = args.tick_ms;
            overrides.default_priority = args.priority;
            overrides.crash_dir = args.crash_dir.clone();
        }
        overrides
    }
}
