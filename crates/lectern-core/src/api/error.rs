//! Errors from the textbook content API.

use thiserror::Error;

/// Failures talking to the content server.
///
/// The content API is public; there is no session that can expire, so
/// 401/403 are treated like any other refused request.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The chapter, section, term or quiz behind `path` does not exist.
    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Content API rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Content API is rate limiting requests")]
    RateLimited,

    #[error("Content server unavailable ({status}): {body}")]
    Unavailable { status: u16, body: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

/// Longest response body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 500;

impl ApiError {
    fn truncate_body(body: &str) -> String {
        match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
            None => body.to_string(),
            Some((cut, _)) => format!("{}... (truncated, {} total bytes)", &body[..cut], body.len()),
        }
    }

    /// Map a non-success status for a request to `path`.
    pub fn from_status(status: reqwest::StatusCode, path: &str, body: &str) -> Self {
        let code = status.as_u16();
        match code {
            404 => ApiError::NotFound(path.to_string()),
            429 => ApiError::RateLimited,
            400..=499 => ApiError::Rejected {
                status: code,
                body: Self::truncate_body(body),
            },
            500..=599 => ApiError::Unavailable {
                status: code,
                body: Self::truncate_body(body),
            },
            _ => ApiError::InvalidResponse(format!("Status {} for {}", status, path)),
        }
    }
}
