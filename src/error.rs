//! Error taxonomy shared by the flow engine, the grader and the HTTP/WS surface.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use thiserror::Error;

/// Generic message shown to the learner when grading fails.
pub const RETRY_MESSAGE: &str = "An error occurred. Please try again.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssessError {
  /// Engine misuse: an operation was called in the wrong phase.
  #[error("invalid state: {0}")]
  InvalidState(String),
  /// Navigation target outside the catalog bounds.
  #[error("position ({section}, {question}) is out of range")]
  OutOfRange { section: usize, question: usize },
  /// Transport or provider failure while grading.
  #[error("grader unavailable: {0}")]
  GraderUnavailable(String),
  /// Speech input failure, code passed through from the platform.
  #[error("speech capture failed: {code}")]
  Capture { code: String },
  #[error("Please provide a response.")]
  EmptyResponse,
  #[error("bad request: {0}")]
  BadRequest(String),
}

impl AssessError {
  pub fn invalid_state(msg: impl Into<String>) -> Self {
    AssessError::InvalidState(msg.into())
  }

  /// Stable machine-readable code used in HTTP bodies and WS error frames.
  pub fn code(&self) -> &'static str {
    match self {
      AssessError::InvalidState(_) => "invalid_state",
      AssessError::OutOfRange { .. } => "out_of_range",
      AssessError::GraderUnavailable(_) => "grader_unavailable",
      AssessError::Capture { .. } => "capture_error",
      AssessError::EmptyResponse => "empty_response",
      AssessError::BadRequest(_) => "bad_request",
    }
  }

  /// Text meant for the learner. Grader failures never leak provider details.
  pub fn user_message(&self) -> String {
    match self {
      AssessError::GraderUnavailable(_) => RETRY_MESSAGE.to_string(),
      AssessError::Capture { code } => format!("An error occurred with speech recognition: {code}."),
      other => other.to_string(),
    }
  }

  fn status(&self) -> StatusCode {
    match self {
      AssessError::InvalidState(_) => StatusCode::CONFLICT,
      AssessError::OutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
      AssessError::GraderUnavailable(_) => StatusCode::BAD_GATEWAY,
      AssessError::Capture { .. } | AssessError::EmptyResponse | AssessError::BadRequest(_) => {
        StatusCode::BAD_REQUEST
      }
    }
  }
}

impl IntoResponse for AssessError {
  fn into_response(self) -> Response {
    let body = json!({
      "error": {
        "code": self.code(),
        "message": self.user_message(),
      }
    });
    (self.status(), Json(body)).into_response()
  }
}
