use std::path::PathBuf;
use thiserror::Error;

/// Terminal failure of a transfer step. Every variant carries the file or
/// command that triggered it so the log can name the culprit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("invalid pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("remote path `{path}` escapes the remote root")]
    PathTraversal { path: String },

    #[error("failed to connect to {host}: {reason}")]
    Connection { host: String, reason: String },

    #[error("failed to upload {} to `{remote}`: {reason}", local.display())]
    Transfer {
        local: PathBuf,
        remote: String,
        reason: String,
    },

    #[error("failed to clean remote directory `{remote}`: {reason}")]
    Clean { remote: String, reason: String },

    #[error("command `{command}` did not finish within {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("nothing to transfer: no files matched `{pattern}` and no command is configured")]
    NothingToTransfer { pattern: String },

    #[error("command `{command}` exited with status {status}")]
    NonZeroExit { command: String, status: u32 },

    #[error("command `{command}` failed: {reason}")]
    Exec { command: String, reason: String },

    #[error("session to {host} was closed")]
    Cancelled { host: String },

    #[error("host configuration `{0}` not found")]
    ConfigNotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PublishError {
    /// Short stable name of the failure kind, used in summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::Pattern { .. } => "PatternError",
            PublishError::PathTraversal { .. } => "PathTraversalError",
            PublishError::Connection { .. } => "ConnectionError",
            PublishError::Transfer { .. } | PublishError::Clean { .. } => "TransferError",
            PublishError::Timeout { .. } => "TimeoutError",
            PublishError::NothingToTransfer { .. } => "NothingToTransferError",
            PublishError::NonZeroExit { .. } => "NonZeroExitError",
            PublishError::Exec { .. } => "ExecError",
            PublishError::Cancelled { .. } => "CancelledError",
            PublishError::ConfigNotFound(_) => "ConfigNotFoundError",
            PublishError::Config(_) => "ConfigError",
        }
    }
}

/// Rejection produced by the configuration-time validators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("either source files or an exec command must be configured")]
    SourceOrExecRequired,

    #[error("source files are required because exec is disabled for `{0}`")]
    SourceFilesRequired(String),

    #[error("host configuration `{0}` not found")]
    ConfigNotFound(String),

    #[error("`{0}` is not a non-negative integer")]
    InvalidTimeout(String),

    #[error("duplicate host configuration `{0}`")]
    DuplicateHost(String),
}
