use std::path::PathBuf;

/// Broad classes of failure, used by callers that want to branch without
/// matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Upstream overloaded (502); worth another attempt.
    TransientUpstream,
    /// HTTP, transport, parse or local I/O failure. Not retried.
    Terminal,
    /// The operation did not finish inside its time limit.
    Timeout,
    /// Caught before any network call: missing selection, empty query...
    UserInput,
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{context} failed with HTTP status {status}")]
    Http { status: u16, context: String },

    #[error("Error in API request: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx answer from the chat-completion endpoint.
    #[error("Error in API request: chat completion returned HTTP status {status}")]
    Completion { status: u16 },

    #[error("Error: Operation timed out")]
    Timeout { operation: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Input(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl AppError {
    pub fn http(status: u16, context: impl Into<String>) -> Self {
        Self::Http { status, context: context.into() }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http { status: 502, .. } => ErrorKind::TransientUpstream,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Input(_) => ErrorKind::UserInput,
            _ => ErrorKind::Terminal,
        }
    }

    /// Only an overloaded upstream (502) is worth retrying; every other
    /// failure aborts the call immediately.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientUpstream
    }
}

pub type AppResult<T> = Result<T, AppError>;
