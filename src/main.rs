//! Hotdesk - a dynamic application runtime.
//!
//! Compiles app sources into isolated units, hot-reloads them on change,
//! schedules their windows and contains their crashes.

#![allow(dead_code)]

mod cli;
mod compiler;
mod config;
mod core;
mod crash;
mod error;
mod install;
mod logger;
mod process;
mod registry;
mod reload;
mod runtime;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::HostConfig;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = HostConfig::load(cli.config.as_deref(), cli.overrides())?;

    match &cli.command {
        Commands::Run { args } => cli::run::run_host(config, args),
        Commands::Check { dir } => {
            let dir = utils::path::resolve_path(dir, &config.runtime.apps_dir);
            cli::check::check_app(&config, &dir)
        }
        Commands::Install { source } => cli::manage::install_app(config, source),
        Commands::Uninstall { app } => cli::manage::uninstall_app(config, app),
        Commands::List => cli::manage::list_apps(config),
        Commands::New { name, id } => {
            let dir = config.runtime.apps_dir.join(name);
            cli::new::new_app(&dir, id.as_deref())
        }
    }
}
