use crate::baseline::store::BaselineError;
use crate::model::ExecutionTrace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    Config,
    Connection,
    MalformedResponse,
    Timeout,
    JudgeUnavailable,
    Baseline,
    Io,
}

impl EvalErrorKind {
    /// Stable label used in logs and JSON reports.
    pub fn as_str(self) -> &'static str {
        match self {
            EvalErrorKind::Config => "config",
            EvalErrorKind::Connection => "connection",
            EvalErrorKind::MalformedResponse => "malformed_response",
            EvalErrorKind::Timeout => "timeout",
            EvalErrorKind::JudgeUnavailable => "judge_unavailable",
            EvalErrorKind::Baseline => "baseline",
            EvalErrorKind::Io => "io",
        }
    }
}

impl std::fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("ConfigError: {message}")]
    Config { message: String },

    #[error("connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    #[error(transparent)]
    MalformedResponse(#[from] MalformedResponse),

    #[error("no terminal event within {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("judge unavailable ({provider}): {message}")]
    JudgeUnavailable { provider: String, message: String },

    #[error(transparent)]
    Baseline(#[from] BaselineError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EvalError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn judge_unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JudgeUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> EvalErrorKind {
        match self {
            EvalError::Config { .. } => EvalErrorKind::Config,
            EvalError::Connection { .. } => EvalErrorKind::Connection,
            EvalError::MalformedResponse(_) => EvalErrorKind::MalformedResponse,
            EvalError::Timeout { .. } => EvalErrorKind::Timeout,
            EvalError::JudgeUnavailable { .. } => EvalErrorKind::JudgeUnavailable,
            EvalError::Baseline(_) => EvalErrorKind::Baseline,
            EvalError::Io(_) => EvalErrorKind::Io,
        }
    }

    /// Whether retrying the same operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EvalError::Connection { .. } | EvalError::Timeout { .. } | EvalError::JudgeUnavailable { .. }
        )
    }
}

/// A backend response that could not be fully decoded.
///
/// `partial` holds everything recovered before the problem, with
/// `terminal = malformed_stream`.
#[derive(Debug, thiserror::Error)]
#[error("malformed response: {reason}")]
pub struct MalformedResponse {
    pub reason: String,
    pub partial: Box<ExecutionTrace>,
}

pub type EvalResult<T> = Result<T, EvalError>;
