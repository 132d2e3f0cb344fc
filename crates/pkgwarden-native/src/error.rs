use std::io;

use thiserror::Error;

/// A native command ran but exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{command}` exited with {}: {stderr}", exit_code_label(.exit_code))]
pub struct ExecutionError {
    pub command: String,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("package '{0}' was not found")]
    NotFound(String),
    #[error("failed to run `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}
