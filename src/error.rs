use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TodoError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote provider error: {0}")]
    Remote(String),

    #[error("Task is not saved")]
    TaskNotSaved,

    #[error("Local storage integrity error: {0}")]
    StorageIntegrity(String),

    #[error("Not signed in to the remote provider")]
    NotSignedIn,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl TodoError {
    pub fn to_error_code(&self) -> &'static str {
        match self {
            TodoError::Database(_) => "DATABASE_ERROR",
            TodoError::Io(_) => "IO_ERROR",
            TodoError::Json(_) => "JSON_ERROR",
            TodoError::Http(_) => "HTTP_ERROR",
            TodoError::Remote(_) => "REMOTE_ERROR",
            TodoError::TaskNotSaved => "TASK_NOT_SAVED",
            TodoError::StorageIntegrity(_) => "STORAGE_INTEGRITY",
            TodoError::NotSignedIn => "NOT_SIGNED_IN",
            TodoError::InvalidInput(_) => "INVALID_INPUT",
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.to_error_code().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TodoError>;
