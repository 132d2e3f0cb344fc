mod error;
mod install;
mod packages;
mod progress;
mod runner;
mod tracker;
mod upgrade;

pub use error::{render_error_chain, InstallError, RefreshError, SyncError, TaskError, UpgradeError};
pub use install::{change_set, InstallAction, InstallExecutor, InstallOutcome};
pub use packages::{refresh_package, sync_packages, SyncOutcome};
pub use progress::{
    Broadcast, ChannelSink, LogSink, NullSink, ProgressEvent, ProgressPayload, ProgressSink,
    TaskKind,
};
pub use runner::{TaskRunner, PACKAGE_MANAGER_LOCK};
pub use tracker::{RefreshOutcome, RefreshStatus, UpdateSetTracker};
pub use upgrade::{ServiceRestart, UpgradeExecutor, UpgradeOutcome};
