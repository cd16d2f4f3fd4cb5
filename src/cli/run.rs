//! `hotdesk run`: the headless host.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use super::RunArgs;
use crate::config::HostConfig;
use crate::core::AppId;
use crate::crash::ConsoleNotifier;
use crate::log;
use crate::runtime::RuntimeContext;
use crate::utils::plural::plural_count;

pub fn run_host(config: HostConfig, args: &RunArgs) -> Result<()> {
    let apps_dir = config.runtime.apps_dir.clone();
    if !apps_dir.is_dir() {
        anyhow::bail!("apps directory `{}` does not exist", apps_dir.display());
    }

    let mut ctx = RuntimeContext::new(config, Arc::new(ConsoleNotifier));
    ctx.load_apps();

    let targets: Vec<AppId> = if args.launch.is_empty() {
        ctx.registry()
            .registered_ids()
            .into_iter()
            .filter(|id| ctx.registry().is_loaded(id))
            .collect()
    } else {
        args.launch.iter().map(|id| AppId::new(id.as_str())).collect()
    };

    for id in &targets {
        ctx.launch(id, &[], args.priority);
    }
    log!(
        "host";
        "{} running, hot reload {}",
        plural_count(ctx.scheduler().live_count(), "instance"),
        if ctx.coordinator().is_enabled() { "on" } else { "off" }
    );

    ctx.run(args.duration.map(Duration::from_secs))
        .context("host stopped on a fault it could not attribute to an app")
}
