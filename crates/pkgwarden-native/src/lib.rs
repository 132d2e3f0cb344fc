mod apt;
mod backend;
mod command;
mod error;
mod manager;
mod pacman;
mod systemctl;

pub use apt::Apt;
pub use backend::{BackendKind, NativeBackend, UpgradeOptions, DEFER_RESTART_ENV};
pub use command::{describe_command, CommandOutput, CommandRunner, SystemRunner};
pub use error::{BackendError, ExecutionError};
pub use manager::PackageManager;
pub use pacman::Pacman;
pub use systemctl::{ServiceManager, Systemctl};

#[cfg(test)]
mod tests;
