mod completion;
mod config;
mod dispatch;
mod render;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use crate::config::LOG_ENV;

#[derive(Parser, Debug)]
#[command(name = "pkgwarden")]
#[command(about = "Keeps control packages and their services up to date", long_about = None)]
struct Cli {
    /// Config file (defaults to $PKGWARDEN_CONFIG, then /etc/pkgwarden/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Disable progress bars and colors
    #[arg(long, global = true)]
    plain: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Refresh the native catalogue and the pending update set
    Refresh,
    /// Apply the pending update set
    Upgrade,
    /// Install and remove control packages
    Install {
        names: Vec<String>,
        #[arg(long = "remove", value_name = "NAME")]
        remove: Vec<String>,
    },
    /// Rebuild package records from the catalogue
    Sync {
        /// Skip the refresh that normally follows a sync
        #[arg(long)]
        no_refresh: bool,
    },
    Status,
    Packages,
    Updates,
    Service {
        #[arg(value_enum)]
        action: ServiceAction,
        name: String,
    },
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ServiceAction {
    Restart,
    Start,
    Stop,
}

impl ServiceAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dispatch::run_cli(cli)
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests;
