//! Error taxonomy for every backend interaction.
//!
//! Transport failures and timeouts are always recoverable and shown generically. Server
//! failures carry the server's message when it sent one. Authorization failures end the
//! session. Validation failures never reach the network.

use thiserror::Error;

pub const GENERIC_RETRY: &str = "Something went wrong. Please check your connection and try again.";
pub const GENERIC_SERVER: &str = "The server could not complete the request.";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
  #[error("transport failure: {0}")]
  Transport(String),

  #[error("request timed out")]
  Timeout,

  #[error("server error {status}: {}", .message.as_deref().unwrap_or("<no message>"))]
  Server { status: u16, message: Option<String> },

  #[error("not authorized (HTTP {status})")]
  Unauthorized { status: u16 },

  #[error("not found")]
  NotFound,

  #[error("{0}")]
  Validation(String),

  #[error("unexpected response body: {0}")]
  Decode(String),
}

impl ApiError {
  /// Text suitable for showing to the user.
  pub fn user_message(&self) -> String {
    match self {
      ApiError::Transport(_) | ApiError::Timeout => GENERIC_RETRY.to_string(),
      ApiError::Server { message: Some(m), .. } if !m.trim().is_empty() => m.clone(),
      ApiError::Server { .. } | ApiError::Decode(_) => GENERIC_SERVER.to_string(),
      ApiError::Unauthorized { .. } => "Your session has expired. Please log in again.".to_string(),
      ApiError::NotFound => "The requested item no longer exists.".to_string(),
      ApiError::Validation(m) => m.clone(),
    }
  }

  pub fn is_auth(&self) -> bool {
    matches!(self, ApiError::Unauthorized { .. })
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      ApiError::Timeout
    } else if e.is_decode() {
      ApiError::Decode(e.to_string())
    } else {
      ApiError::Transport(e.to_string())
    }
  }
}
