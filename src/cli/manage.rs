//! `hotdesk install`, `uninstall` and `list`.
//!
//! One-shot commands: each builds a runtime with hot reload off, loads the
//! apps root and performs a single registry operation.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;

use crate::config::HostConfig;
use crate::core::AppId;
use crate::crash::ConsoleNotifier;
use crate::log;
use crate::runtime::RuntimeContext;
use crate::utils::plural::plural_count;

fn one_shot(mut config: HostConfig) -> Result<RuntimeContext> {
    let apps_dir = config.runtime.apps_dir.clone();
    if !apps_dir.is_dir() {
        bail!("apps directory `{}` does not exist", apps_dir.display());
    }
    config.reload.enable = false;
    let mut ctx = RuntimeContext::new(config, Arc::new(ConsoleNotifier));
    ctx.load_apps();
    Ok(ctx)
}

pub fn install_app(config: HostConfig, source: &std::path::Path) -> Result<()> {
    let mut ctx = one_shot(config)?;
    let id = ctx
        .install(source)
        .with_context(|| format!("failed to install `{}`", source.display()))?;
    let dir = ctx.registry().directory_of(&id).map(|d| d.display().to_string());
    log!("install"; "{} -> {}", id, dir.unwrap_or_default());
    Ok(())
}

pub fn uninstall_app(config: HostConfig, app: &str) -> Result<()> {
    let mut ctx = one_shot(config)?;
    let id = AppId::new(app);
    let dir = ctx
        .uninstall(&id)
        .with_context(|| format!("failed to uninstall {id}"))?;
    log!("uninstall"; "{} removed from {}", id, dir.display());
    Ok(())
}

pub fn list_apps(config: HostConfig) -> Result<()> {
    let ctx = one_shot(config)?;
    let registry = ctx.registry();
    let ids = registry.registered_ids();

    for id in &ids {
        let Some(manifest) = registry.manifest_of(id) else {
            continue;
        };
        let status = if registry.is_loaded(id) {
            "loaded".green().to_string()
        } else {
            "failed".red().to_string()
        };
        println!(
            "{:<16} {:<8} {:<10} {}",
            id.bold(),
            status,
            manifest.version,
            manifest.name
        );
    }
    log!("list"; "{}", plural_count(ids.len(), "app"));
    Ok(())
}
