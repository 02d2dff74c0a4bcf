use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Browser extension not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Executor failure: {0}")]
    ExecutorFailure(String),

    #[error("Decision service error{}: {message}", .status.map(|s| format!(" {}", s)).unwrap_or_default())]
    DecisionService {
        status: Option<u16>,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Channel-level failures: no executor attached, or the link dropped mid-call.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::NotConnected | Error::Transport(_))
    }

    /// Decision-service failures worth retrying: rate limits, overload, 5xx and
    /// network errors (no status). Other 4xx are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::DecisionService { status: None, .. } => true,
            Error::DecisionService { status: Some(code), .. } => {
                *code == 429 || *code == 529 || (500..600).contains(code)
            }
            _ => false,
        }
    }

    /// Translation-boundary rejections; the action is skipped, not dispatched.
    pub fn is_unknown_action(&self) -> bool {
        matches!(self, Error::UnsupportedAction(_) | Error::InvalidAction(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
