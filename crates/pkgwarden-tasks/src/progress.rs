use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, warn};

/// Long-running task kinds. Each one publishes under its own event names and
/// holds its own task lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Refresh,
    Upgrade,
    Install,
    Sync,
}

impl TaskKind {
    pub fn lock_name(&self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::Upgrade => "upgrade",
            Self::Install => "install",
            Self::Sync => "sync",
        }
    }

    /// Subscribers already listen for `package_manager_update_*` for the
    /// refresh task, so that name is kept.
    pub fn progress_event_name(&self) -> &'static str {
        match self {
            Self::Refresh => "package_manager_update_progress",
            Self::Upgrade => "package_manager_upgrade_progress",
            Self::Install => "package_manager_install_progress",
            Self::Sync => "package_manager_sync_progress",
        }
    }

    pub fn done_event_name(&self) -> &'static str {
        match self {
            Self::Refresh => "package_manager_update_done",
            Self::Upgrade => "package_manager_upgrade_done",
            Self::Install => "package_manager_install_done",
            Self::Sync => "package_manager_sync_done",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.lock_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressPayload {
    pub total: u64,
    pub processed: u64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Progress {
        task: TaskKind,
        payload: ProgressPayload,
    },
    Done {
        task: TaskKind,
    },
}

impl ProgressEvent {
    pub fn task(&self) -> TaskKind {
        match self {
            Self::Progress { task, .. } | Self::Done { task } => *task,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Progress { task, .. } => task.progress_event_name(),
            Self::Done { task } => task.done_event_name(),
        }
    }

    pub fn payload(&self) -> Option<&ProgressPayload> {
        match self {
            Self::Progress { payload, .. } => Some(payload),
            Self::Done { .. } => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// Fire-and-forget publisher. Delivery failures must never fail a task.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: &ProgressEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn publish(&self, _event: &ProgressEvent) {}
}

/// Writes every event to the tracing log at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn publish(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Progress { payload, .. } => debug!(
                event = event.event_name(),
                total = payload.total,
                processed = payload.processed,
                name = payload.name.as_deref().unwrap_or(""),
                "{}",
                payload.message
            ),
            ProgressEvent::Done { .. } => debug!(event = event.event_name(), "task finished"),
        }
    }
}

/// Forwards events to an in-process receiver, e.g. a socket bridge.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Mutex<Sender<ProgressEvent>>,
}

impl ChannelSink {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl ProgressSink for ChannelSink {
    fn publish(&self, event: &ProgressEvent) {
        let Ok(sender) = self.sender.lock() else {
            warn!(event = event.event_name(), "progress channel lock poisoned, dropping event");
            return;
        };
        if sender.send(event.clone()).is_err() {
            warn!(event = event.event_name(), "progress receiver is gone, dropping event");
        }
    }
}

/// Fans each event out to several sinks in order.
#[derive(Default)]
pub struct Broadcast {
    sinks: Vec<Box<dyn ProgressSink>>,
}

impl Broadcast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: Box<dyn ProgressSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ProgressSink for Broadcast {
    fn publish(&self, event: &ProgressEvent) {
        for sink in &self.sinks {
            sink.publish(event);
        }
    }
}

/// Publishes the events of one task run.
pub(crate) struct Reporter<'a> {
    sink: &'a dyn ProgressSink,
    task: TaskKind,
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink, task: TaskKind) -> Self {
        Self { sink, task }
    }

    pub(crate) fn progress(
        &self,
        total: u64,
        processed: u64,
        message: impl Into<String>,
        name: Option<&str>,
    ) {
        self.sink.publish(&ProgressEvent::Progress {
            task: self.task,
            payload: ProgressPayload {
                total,
                processed,
                message: message.into(),
                name: name.map(str::to_string),
            },
        });
    }

    pub(crate) fn done(&self) {
        self.sink.publish(&ProgressEvent::Done { task: self.task });
    }

    /// Runs `work` and always closes the task with a done event. A failure is
    /// announced as a final progress message first.
    pub(crate) fn bracket<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: std::error::Error,
        F: FnOnce(&Self) -> Result<T, E>,
    {
        let result = work(self);
        match &result {
            Ok(_) => self.done(),
            Err(err) => self.fail(err),
        }
        result
    }

    /// Announces a failure as a final progress message, then closes the task.
    pub(crate) fn fail<E: std::error::Error + ?Sized>(&self, err: &E) {
        self.progress(
            1,
            1,
            format!("{} failed: {}", self.task, crate::render_error_chain(err)),
            None,
        );
        self.done();
    }

    pub(crate) fn refreshing_catalogue(&self) {
        self.progress(1, 1, "Refreshing package catalogue...", None);
    }

    pub(crate) fn catalogue_refreshed(&self) {
        self.progress(1, 1, "Refreshing package catalogue done", None);
    }
}
