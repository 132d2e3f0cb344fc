use std::io::IsTerminal;
use std::sync::Mutex;
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use pkgwarden_core::{PackageRecord, UpdateSet};
use pkgwarden_store::StateDocument;
use pkgwarden_tasks::{
    InstallOutcome, ProgressEvent, ProgressSink, RefreshOutcome, RefreshStatus, SyncOutcome,
    TaskKind, UpgradeOutcome,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

impl OutputStyle {
    pub(crate) fn detect(force_plain: bool) -> Self {
        if force_plain || !std::io::stdout().is_terminal() {
            Self::Plain
        } else {
            Self::Rich
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

impl TerminalRenderer {
    pub(crate) fn new(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }
}

/// Renders task progress events on stdout: an indicatif bar on a terminal,
/// one line per event otherwise.
pub(crate) struct TerminalProgressSink {
    style: OutputStyle,
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgressSink {
    pub(crate) fn new(style: OutputStyle) -> Self {
        Self {
            style,
            bar: Mutex::new(None),
        }
    }

    fn start_bar(task: TaskKind) -> ProgressBar {
        let bar = ProgressBar::new(1);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan.bold} {prefix:<8} [{bar:20.cyan/blue}] {pos:>3}/{len:3} {msg}",
        ) {
            bar.set_style(style.tick_chars(progress_tick_chars(task)).progress_chars("=>-"));
        }
        bar.set_prefix(task.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    }
}

impl ProgressSink for TerminalProgressSink {
    fn publish(&self, event: &ProgressEvent) {
        if self.style == OutputStyle::Plain {
            if let Some(line) = render_plain_event(event) {
                println!("{line}");
            }
            return;
        }

        let Ok(mut slot) = self.bar.lock() else {
            return;
        };
        match event {
            ProgressEvent::Progress { task, payload } => {
                let bar = slot.get_or_insert_with(|| Self::start_bar(*task));
                bar.set_length(payload.total.max(1));
                bar.set_position(payload.processed.min(payload.total.max(1)));
                bar.set_message(payload.message.clone());
            }
            ProgressEvent::Done { .. } => {
                if let Some(bar) = slot.take() {
                    bar.finish_and_clear();
                }
            }
        }
    }
}

pub(crate) fn render_plain_event(event: &ProgressEvent) -> Option<String> {
    let payload = event.payload()?;
    Some(format!(
        "[{}] {}/{} {}",
        event.task(),
        payload.processed,
        payload.total,
        payload.message
    ))
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => format!("{status}: {message}"),
        OutputStyle::Rich => format!(
            "{} {message}",
            colorize(status_style(status), &format!("{status:>10}"))
        ),
    }
}

pub(crate) fn format_refresh_outcome(outcome: &RefreshOutcome) -> String {
    let mut line = match outcome.status {
        RefreshStatus::NoControlUpdates => "no control package updates available".to_string(),
        RefreshStatus::Unchanged { update_set_id } => {
            format!("update set {update_set_id} is already current")
        }
        RefreshStatus::Reactivated { update_set_id } => {
            format!("update set {update_set_id} is pending again")
        }
        RefreshStatus::Created { update_set_id } => format!("created update set {update_set_id}"),
    };
    if !outcome.superseded.is_empty() {
        let ids = outcome
            .superseded
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        line.push_str(&format!(" (canceled {ids})"));
    }
    line
}

pub(crate) fn format_upgrade_outcome(outcome: &UpgradeOutcome) -> Vec<String> {
    match outcome {
        UpgradeOutcome::NothingPending => vec!["no pending update set".to_string()],
        UpgradeOutcome::Completed {
            update_set_id,
            upgraded,
            restarts,
        } => {
            let mut lines = vec![format!(
                "update set {update_set_id} done: upgraded {}",
                join_or_none(upgraded)
            )];
            for restart in restarts {
                let result = if restart.restarted { "restarted" } else { "restart failed" };
                lines.push(format!("service {}: {result}", restart.service));
            }
            lines
        }
    }
}

pub(crate) fn format_install_outcome(outcome: &InstallOutcome) -> String {
    if outcome.is_empty() {
        return "nothing to change".to_string();
    }
    format!(
        "installed {}; removed {}",
        join_or_none(&outcome.installed),
        join_or_none(&outcome.removed)
    )
}

pub(crate) fn format_sync_outcome(outcome: &SyncOutcome) -> String {
    format!(
        "synced {} package record(s); removed {}",
        outcome.refreshed.len(),
        join_or_none(&outcome.removed)
    )
}

pub(crate) fn format_package_lines(state: &StateDocument) -> Vec<String> {
    if state.packages.is_empty() {
        return vec!["no package records; run `pkgwarden sync`".to_string()];
    }
    state.packages.values().map(format_package_line).collect()
}

fn format_package_line(record: &PackageRecord) -> String {
    let version = record
        .info
        .as_ref()
        .map(|info| info.version.as_str())
        .unwrap_or("-");
    let installed = if record.installed {
        "installed"
    } else {
        "not installed"
    };
    let services = record
        .services
        .iter()
        .map(|service| {
            let state = if service.failed {
                "failed"
            } else if service.active {
                "active"
            } else {
                "inactive"
            };
            format!("{}={state}", service.name)
        })
        .collect::<Vec<_>>();
    let mut line = format!("{} {version} ({installed}) {}", record.key, record.name);
    if !services.is_empty() {
        line.push_str(&format!(" [{}]", services.join(", ")));
    }
    line
}

pub(crate) fn format_update_set_lines(state: &StateDocument) -> Vec<String> {
    if state.update_sets.is_empty() {
        return vec!["no update sets".to_string()];
    }
    let mut lines = Vec::new();
    for set in state.update_sets.iter().rev() {
        lines.extend(format_update_set(set));
    }
    lines
}

fn format_update_set(set: &UpdateSet) -> Vec<String> {
    let mut lines = vec![format!(
        "#{} {} ({} package(s))",
        set.id,
        set.state().as_str(),
        set.packages.len()
    )];
    for item in &set.packages {
        let marker = if item.updated { "x" } else { " " };
        lines.push(format!(
            "  [{marker}] {} {} -> {}",
            item.package_key, item.from_version, item.to_version
        ));
    }
    lines
}

fn join_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

fn progress_tick_chars(task: TaskKind) -> &'static str {
    match task {
        TaskKind::Install => ".oO@* ",
        TaskKind::Upgrade => "-=~* ",
        TaskKind::Refresh => "<^>v ",
        TaskKind::Sync => "|/-\\ ",
    }
}

fn status_style(status: &str) -> Style {
    let color = match status {
        "error" | "failed" | "busy" => AnsiColor::BrightRed,
        "warning" => AnsiColor::BrightYellow,
        _ => AnsiColor::BrightGreen,
    };
    Style::new()
        .fg_color(Some(color.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
