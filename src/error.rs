//! Application error type shared by handlers and services.
//!
//! Every variant maps to one HTTP status. Handlers return `Result<_, AppError>`
//! and the body is always `{ "error": "<message>" }`.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use thiserror::Error;

use crate::domain::QuizShapeError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
  #[error("{0} not found")]
  NotFound(String),
  #[error("quiz {0} has no questions")]
  EmptyQuiz(String),
  #[error("option {index} is out of range (question has {count} options)")]
  InvalidOption { index: usize, count: usize },
  #[error("invalid quiz: {0}")]
  InvalidQuiz(#[from] QuizShapeError),
  #[error("bad request: {0}")]
  BadRequest(String),
  #[error("attempt already finished and recorded")]
  AlreadyFinished,
  #[error("profile update conflicted too many times, please retry")]
  Conflict,
}

impl AppError {
  pub fn status(&self) -> StatusCode {
    match self {
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::EmptyQuiz(_) => StatusCode::UNPROCESSABLE_ENTITY,
      AppError::InvalidOption { .. } | AppError::InvalidQuiz(_) | AppError::BadRequest(_) => {
        StatusCode::BAD_REQUEST
      }
      AppError::AlreadyFinished | AppError::Conflict => StatusCode::CONFLICT,
    }
  }
}

impl From<StoreError> for AppError {
  fn from(e: StoreError) -> Self {
    match e {
      StoreError::VersionConflict { .. } => AppError::Conflict,
      StoreError::DuplicateId(id) => AppError::BadRequest(format!("duplicate id {}", id)),
    }
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(target: "quizforge", error = %self, "request failed");
    } else {
      tracing::debug!(target: "quizforge", error = %self, %status, "request rejected");
    }
    (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn store_conflicts_surface_as_409() {
    let e: AppError = StoreError::VersionConflict { id: "u1".into(), expected: Some(1), found: Some(2) }.into();
    assert_eq!(e.status(), StatusCode::CONFLICT);
    assert_eq!(AppError::EmptyQuiz("q".into()).status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(AppError::InvalidOption { index: 5, count: 4 }.status(), StatusCode::BAD_REQUEST);
  }
}
