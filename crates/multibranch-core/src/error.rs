use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("not initialized: run 'mbranch init'")]
    NotInitialized,

    #[error("child project not found: {0}")]
    ChildNotFound(String),

    #[error("'{0}' is not a branch project")]
    NotAProject(String),

    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("duplicate source id '{0}': source ids must be unique within a container")]
    DuplicateSourceId(String),

    #[error("build cause '{cause}' is unknown to suppression strategy '{strategy}'")]
    UnknownCause { cause: String, strategy: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid head spec '{0}': expected NAME or NAME=REVISION")]
    InvalidHeadSpec(String),

    #[error("reconciliation cancelled")]
    Cancelled,

    #[error("reconciliation task failed: {0}")]
    Task(String),

    #[error("persistence failed for '{name}': {reason}")]
    Persistence { name: String, reason: String },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),
}

/// Transient failures talking to a repository source.
///
/// A source that fails contributes nothing to the pass; the branches it owns
/// are left untouched rather than marked dead.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source '{source_id}' unavailable: {reason}")]
    Unavailable { source_id: String, reason: String },

    #[error("command '{command}' failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("git executable not found on PATH")]
    GitNotFound,

    #[error("malformed response from source '{source_id}': {detail}")]
    Malformed { source_id: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
