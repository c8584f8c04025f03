use thiserror::Error;

#[derive(Error, Debug)]
pub enum FelError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Connection error: {0}")]
    Transport(String),
    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FelError {
    /// Whether the failure happened before any server status was obtained.
    pub fn is_transport(&self) -> bool {
        matches!(self, FelError::Transport(_))
    }
}

impl From<reqwest::Error> for FelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FelError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FelError::Remote {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            FelError::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for FelError {
    fn from(err: url::ParseError) -> Self {
        FelError::Config(format!("invalid URL: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, FelError>;
