use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// Envelope every marketplace endpoint answers with.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn into_data(self) -> AppResult<T> {
        let message = self.message;
        self.data
            .ok_or_else(|| AppError::InvalidResponse(format!("missing data ({message})")))
    }
}

/// Error body shape; `code` is a machine-readable reason when the server sends one.
#[derive(Debug, Deserialize, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}
