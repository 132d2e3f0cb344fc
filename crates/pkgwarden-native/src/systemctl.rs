use std::process::Command;
use std::sync::Arc;

use tracing::warn;

use crate::command::execute;
use crate::{CommandOutput, CommandRunner, SystemRunner};

/// OS service manager queried per call. Every method answers with a plain
/// bool; a query that cannot be run reads as `false`.
pub trait ServiceManager {
    fn is_enabled(&self, service: &str) -> bool;
    fn is_active(&self, service: &str) -> bool;
    fn is_failed(&self, service: &str) -> bool;
    fn restart(&self, service: &str) -> bool;
    fn start(&self, service: &str) -> bool;
    fn stop(&self, service: &str) -> bool;
}

#[derive(Clone)]
pub struct Systemctl {
    runner: Arc<dyn CommandRunner>,
}

impl Systemctl {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn systemctl(&self, verb: &str, service: &str) -> Option<CommandOutput> {
        let mut command = Command::new("systemctl");
        command.arg(verb).arg(service);
        match execute(self.runner.as_ref(), &mut command) {
            Ok(output) => Some(output),
            Err(err) => {
                warn!(service, verb, error = %err, "systemctl could not be run");
                None
            }
        }
    }

    fn reports(&self, verb: &str, service: &str, expected: &str) -> bool {
        self.systemctl(verb, service)
            .is_some_and(|output| output.stdout.trim() == expected)
    }

    fn succeeds(&self, verb: &str, service: &str) -> bool {
        self.systemctl(verb, service)
            .is_some_and(|output| output.success())
    }
}

impl Default for Systemctl {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner))
    }
}

impl ServiceManager for Systemctl {
    fn is_enabled(&self, service: &str) -> bool {
        self.reports("is-enabled", service, "enabled")
    }

    fn is_active(&self, service: &str) -> bool {
        self.reports("is-active", service, "active")
    }

    fn is_failed(&self, service: &str) -> bool {
        self.reports("is-failed", service, "failed")
    }

    fn restart(&self, service: &str) -> bool {
        self.succeeds("restart", service)
    }

    fn start(&self, service: &str) -> bool {
        self.succeeds("start", service)
    }

    fn stop(&self, service: &str) -> bool {
        self.succeeds("stop", service)
    }
}
