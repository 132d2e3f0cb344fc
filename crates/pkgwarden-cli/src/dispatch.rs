use std::collections::BTreeMap;
use std::env;
use std::io;
use std::path::Path;

use anyhow::{bail, Context, Result};
use pkgwarden_core::{CatalogueSource, DirectoryCatalogue};
use pkgwarden_native::{NativeBackend, PackageManager, ServiceManager, Systemctl};
use pkgwarden_store::{FileStore, StateDocument, Store, TaskLock};
use pkgwarden_tasks::{Broadcast, LogSink, TaskKind, TaskRunner, PACKAGE_MANAGER_LOCK};
use tracing::debug;

use crate::completion::write_completions_script;
use crate::config::{resolve_config_path, AppConfig, CONFIG_ENV};
use crate::render::{
    format_install_outcome, format_package_lines, format_refresh_outcome, format_sync_outcome,
    format_update_set_lines, format_upgrade_outcome, OutputStyle, TerminalProgressSink,
    TerminalRenderer,
};
use crate::{init_tracing, Cli, Commands, ServiceAction};

type Runner = TaskRunner<PackageManager, FileStore, DirectoryCatalogue>;

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let config_path = resolve_config_path(cli.config.as_deref(), env::var_os(CONFIG_ENV));
    let config = AppConfig::load(&config_path)?;
    init_tracing(&config.log_level);
    debug!(config = %config_path.display(), "configuration loaded");

    let renderer = TerminalRenderer::new(OutputStyle::detect(cli.plain));

    match cli.command {
        Commands::Refresh => {
            let runner = build_runner(&config, renderer)?;
            let outcome = runner.refresh()?;
            renderer.print_status("refresh", &format_refresh_outcome(&outcome));
        }
        Commands::Upgrade => {
            let runner = build_runner(&config, renderer)?;
            let outcome = runner.upgrade()?;
            for line in format_upgrade_outcome(&outcome) {
                renderer.print_status("upgrade", &line);
            }
            let failed = outcome.failed_restarts().count();
            if failed > 0 {
                renderer.print_status("warning", &format!("{failed} service restart(s) failed"));
            }
        }
        Commands::Install { names, remove } => {
            let runner = build_runner(&config, renderer)?;
            let state = runner.store().read()?;
            let (old, new) = desired_install_maps(&state, &names, &remove)?;
            let outcome = runner.install(&old, &new)?;
            renderer.print_status("install", &format_install_outcome(&outcome));
        }
        Commands::Sync { no_refresh } => {
            let runner = build_runner(&config, renderer)?;
            let outcome = runner.sync()?;
            renderer.print_status("sync", &format_sync_outcome(&outcome));
            if !no_refresh {
                let outcome = runner.refresh()?;
                renderer.print_status("refresh", &format_refresh_outcome(&outcome));
            }
        }
        Commands::Status => {
            renderer.print_lines(&status_lines(&config, &config_path)?);
        }
        Commands::Packages => {
            let state = FileStore::new(config.state_layout()).read()?;
            renderer.print_lines(&format_package_lines(&state));
        }
        Commands::Updates => {
            let state = FileStore::new(config.state_layout()).read()?;
            renderer.print_lines(&format_update_set_lines(&state));
        }
        Commands::Service { action, name } => {
            run_service_action(&Systemctl::default(), action, &name)?;
            renderer.print_status("service", &format!("{} {name}", action.as_str()));
        }
        Commands::Completions { shell } => {
            let mut stdout = io::stdout().lock();
            write_completions_script(shell, &mut stdout)?;
        }
    }

    Ok(())
}

fn build_runner(config: &AppConfig, renderer: TerminalRenderer) -> Result<Runner> {
    let layout = config.state_layout();
    let backend =
        PackageManager::detect().context("failed to detect the native package manager")?;
    let progress = Broadcast::new()
        .with(LogSink)
        .with(TerminalProgressSink::new(renderer.style()));
    Ok(TaskRunner::new(
        layout.clone(),
        backend,
        FileStore::new(layout),
        config.catalogue(),
        Box::new(Systemctl::default()),
        Box::new(progress),
    ))
}

/// Builds the before/after install maps for the named packages from the
/// recorded install state. Unrecorded names are left out of the old map.
pub(crate) fn desired_install_maps(
    state: &StateDocument,
    install: &[String],
    remove: &[String],
) -> Result<(BTreeMap<String, bool>, BTreeMap<String, bool>)> {
    if install.is_empty() && remove.is_empty() {
        bail!("nothing to install or remove");
    }
    if let Some(name) = install.iter().find(|name| remove.contains(*name)) {
        bail!("'{name}' cannot be both installed and removed");
    }

    let new: BTreeMap<String, bool> = install
        .iter()
        .map(|name| (name.clone(), true))
        .chain(remove.iter().map(|name| (name.clone(), false)))
        .collect();
    // Without a record the current state is unknown, so the request is
    // treated as a change and left to the package manager.
    let old = new
        .iter()
        .map(|(name, wanted)| {
            let installed = state
                .package(name)
                .map_or(!wanted, |record| record.installed);
            (name.clone(), installed)
        })
        .collect();
    Ok((old, new))
}

pub(crate) fn run_service_action(
    services: &dyn ServiceManager,
    action: ServiceAction,
    name: &str,
) -> Result<()> {
    let ok = match action {
        ServiceAction::Restart => services.restart(name),
        ServiceAction::Start => services.start(name),
        ServiceAction::Stop => services.stop(name),
    };
    if !ok {
        bail!("failed to {} service {name}", action.as_str());
    }
    Ok(())
}

fn status_lines(config: &AppConfig, config_path: &Path) -> Result<Vec<String>> {
    let layout = config.state_layout();
    let state = FileStore::new(layout.clone()).read()?;
    let catalogue = config.catalogue().control_packages()?;
    let backend = match PackageManager::detect() {
        Ok(manager) => manager.kind().to_string(),
        Err(err) => format!("unavailable ({err})"),
    };

    let mut lines = vec![
        format!("config: {}", config_path.display()),
        format!("state root: {}", layout.root().display()),
        format!("backend: {backend}"),
        format!("catalogue: {} package(s)", catalogue.len()),
        format!("records: {} package(s)", state.packages.len()),
    ];
    lines.push(match state.active_update_set() {
        Some(set) => format!(
            "pending update set: #{} ({}/{} applied)",
            set.id,
            set.packages.iter().filter(|item| item.updated).count(),
            set.packages.len()
        ),
        None => "pending update set: none".to_string(),
    });

    let lock_names = [
        TaskKind::Refresh.lock_name(),
        TaskKind::Upgrade.lock_name(),
        TaskKind::Install.lock_name(),
        TaskKind::Sync.lock_name(),
        PACKAGE_MANAGER_LOCK,
    ];
    for name in lock_names {
        let lock_state = match TaskLock::holder(&layout, name)? {
            Some(pid) => format!("running (pid {pid})"),
            None => "idle".to_string(),
        };
        lines.push(format!("lock {name}: {lock_state}"));
    }
    Ok(lines)
}
