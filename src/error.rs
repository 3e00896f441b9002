#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not authenticated")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// One-line message safe to show to the user. Internals are logged,
    /// never rendered.
    pub fn user_notice(&self) -> String {
        match self {
            AppError::Unauthorized => "Please sign in and try again.".to_string(),
            AppError::NotFound(_) => "That item no longer exists.".to_string(),
            AppError::Validation(msg) => msg.clone(),
            AppError::Backend { .. } => {
                tracing::error!("Backend error: {}", self);
                "The server rejected the request. Please try again.".to_string()
            }
            AppError::Http(e) => {
                tracing::error!("HTTP error: {}", e);
                "Could not reach the server. Check your connection.".to_string()
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                "Something went wrong. Please try again.".to_string()
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                "Something went wrong. Please try again.".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
