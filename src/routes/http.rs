//! HTTP endpoint handlers. These are thin wrappers that forward to the state,
//! session and generator layers. Each handler is instrumented and logs its
//! parameters and basic result info.

use std::{net::{IpAddr, Ipv4Addr, SocketAddr}, sync::Arc, time::Duration};

use axum::{
  body::Bytes,
  extract::{ConnectInfo, Multipart, Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
  Json,
};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::domain::{Quiz, UserProfile};
use crate::error::AppError;
use crate::generator::{generate_and_store, GenerateError};
use crate::pdf::{extract_text, ExtractError, UploadGuard};
use crate::protocol::*;
use crate::rank::{leaderboard, refresh_all_ranks, DEFAULT_LEADERBOARD_SIZE};
use crate::session::SelectOutcome;
use crate::state::AppState;
use crate::store::QuizFilter;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut {
    ok: true,
    quizzes: state.store.quiz_count().await,
    live_sessions: state.sessions.read().await.len(),
    generation_enabled: state.openai.is_some(),
  })
}

// ---------- Quizzes ----------

#[instrument(level = "info", skip(state))]
pub async fn http_list_quizzes(
  State(state): State<Arc<AppState>>,
  Query(q): Query<QuizListQuery>,
) -> impl IntoResponse {
  let filter = QuizFilter { category: q.category, difficulty: q.difficulty };
  let quizzes: Vec<QuizSummaryOut> = state.store.list_quizzes(&filter).await.iter().map(QuizSummaryOut::from).collect();
  info!(target: "quizforge", count = quizzes.len(), "Quiz list served");
  Json(quizzes)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_quiz(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<Quiz>, AppError> {
  let quiz = state.store.get_quiz(&id).await.ok_or_else(|| AppError::NotFound(format!("quiz {}", id)))?;
  Ok(Json(quiz))
}

#[instrument(level = "info", skip(state, body), fields(title = %body.title))]
pub async fn http_post_quiz(
  State(state): State<Arc<AppState>>,
  Json(body): Json<QuizIn>,
) -> Result<impl IntoResponse, AppError> {
  let quiz = state.create_quiz(body).await?;
  Ok((StatusCode::CREATED, Json(quiz)))
}

// ---------- Sessions ----------

#[instrument(level = "info", skip(state, body), fields(quiz_id = %body.quiz_id, user_id = %body.user_id))]
pub async fn http_start_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionStartIn>,
) -> Result<impl IntoResponse, AppError> {
  let shared = state.start_session(&body.quiz_id, &body.user_id).await?;
  let out = session_out(&*shared.lock().await);
  Ok((StatusCode::CREATED, Json(out)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionOut>, AppError> {
  let shared = state.get_session(&id).await?;
  let out = session_out(&*shared.lock().await);
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(option = body.option))]
pub async fn http_post_select(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<SelectIn>,
) -> Result<Json<SelectOut>, AppError> {
  let shared = state.get_session(&id).await?;
  let mut s = shared.lock().await;
  let correct = match s.select_option(body.option)? {
    SelectOutcome::Correct => Some(true),
    SelectOutcome::Incorrect => Some(false),
    SelectOutcome::Ignored => None,
  };
  Ok(Json(SelectOut { correct, session: session_out(&s) }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_next(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionOut>, AppError> {
  let shared = state.get_session(&id).await?;
  let mut s = shared.lock().await;
  s.advance();
  Ok(Json(session_out(&s)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_skip(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionOut>, AppError> {
  let shared = state.get_session(&id).await?;
  let mut s = shared.lock().await;
  s.skip();
  Ok(Json(session_out(&s)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_finish(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<ResultOut>, AppError> {
  let outcome = state.finish_session(&id).await?;
  Ok(Json(ResultOut::from(&outcome)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
  state.abandon_session(&id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ---------- Users & ranks ----------

#[instrument(level = "info", skip(state))]
pub async fn http_get_user(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Json<UserProfile> {
  Json(state.profile_or_default(&id).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_leaderboard(
  State(state): State<Arc<AppState>>,
  Query(q): Query<LeaderboardQuery>,
) -> impl IntoResponse {
  let users = state.store.all_users().await;
  let limit = q.limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE).max(1);
  let entries = leaderboard(&users, q.range, limit, Utc::now());
  info!(target: "rank", range = ?q.range, entries = entries.len(), "Leaderboard served");
  Json(LeaderboardOut { entries })
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_rank_refresh(State(state): State<Arc<AppState>>) -> Json<RankRefreshOut> {
  let report = refresh_all_ranks(&state.store, state.session_settings.write_retries).await;
  Json(RankRefreshOut { updated: report.updated, failed: report.failed })
}

// ---------- PDF quiz generation ----------

/// Status for a failed generation.
pub fn generate_status(e: &GenerateError) -> StatusCode {
  match e {
    GenerateError::Extraction(ExtractError::Timeout(_)) | GenerateError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
    GenerateError::Extraction(ExtractError::Spawn(_)) | GenerateError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    GenerateError::Extraction(_) | GenerateError::NoJson | GenerateError::Malformed(_) | GenerateError::InvalidShape(_) => {
      StatusCode::UNPROCESSABLE_ENTITY
    }
    GenerateError::PolicyViolation(_) => StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS,
    GenerateError::ModerationUnavailable(_) | GenerateError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
    GenerateError::Upstream(_) => StatusCode::BAD_GATEWAY,
  }
}

fn generate_reply(status: StatusCode, body: GenerateOut) -> (StatusCode, Json<GenerateOut>) {
  (status, Json(body))
}

/// Pull the `pdf` field out of the form, enforcing type and size.
async fn read_pdf_field(mut multipart: Multipart, max_bytes: usize) -> Result<Bytes, (StatusCode, String)> {
  loop {
    let field = multipart
      .next_field()
      .await
      .map_err(|e| (e.status(), e.body_text()))?
      .ok_or_else(|| (StatusCode::BAD_REQUEST, "No PDF file uploaded".to_string()))?;
    if field.name() != Some("pdf") {
      continue;
    }
    if field.content_type() != Some("application/pdf") {
      return Err((StatusCode::BAD_REQUEST, "Only PDF files are allowed".into()));
    }
    let bytes = field.bytes().await.map_err(|e| (e.status(), e.body_text()))?;
    if bytes.len() > max_bytes {
      return Err((StatusCode::PAYLOAD_TOO_LARGE, format!("PDF exceeds the {} byte limit", max_bytes)));
    }
    return Ok(bytes);
  }
}

#[instrument(level = "info", skip(state, connect, multipart))]
pub async fn http_post_generate(
  State(state): State<Arc<AppState>>,
  connect: Option<ConnectInfo<SocketAddr>>,
  multipart: Multipart,
) -> impl IntoResponse {
  let ip = connect.map(|ConnectInfo(addr)| addr.ip()).unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
  if let Err(retry_in) = state.generate_limiter.check(ip).await {
    warn!(target: "generator", %ip, retry_in = ?retry_in, "Generation rate limited");
    return generate_reply(
      StatusCode::TOO_MANY_REQUESTS,
      GenerateOut::err(format!("Too many requests, retry in {}s", retry_in.as_secs().max(1))),
    );
  }

  let settings = &state.generator;
  let bytes = match read_pdf_field(multipart, settings.max_upload_bytes).await {
    Ok(b) => b,
    Err((status, message)) => {
      warn!(target: "generator", %status, %message, "Upload rejected");
      return generate_reply(status, GenerateOut::err(message));
    }
  };

  let Some(model) = state.openai.as_ref() else {
    let e = GenerateError::Disabled;
    return generate_reply(generate_status(&e), GenerateOut::err(e.to_string()));
  };

  // The guard removes the file even if this future is dropped mid-way.
  let upload = match UploadGuard::write(&state.upload_dir, &bytes).await {
    Ok(g) => g,
    Err(e) => {
      warn!(target: "generator", error = %e, "Failed to store upload");
      return generate_reply(StatusCode::INTERNAL_SERVER_ERROR, GenerateOut::err("Failed to store upload"));
    }
  };

  let deadline = Duration::from_secs(settings.extraction_timeout_secs);
  let result = match extract_text(upload.path(), deadline).await {
    Ok(text) => generate_and_store(model, &state.store, &state.prompts, settings, &text).await,
    Err(e) => Err(GenerateError::from(e)),
  };
  upload.remove().await;

  match result {
    Ok(quiz) => {
      info!(target: "generator", quiz_id = %quiz.id, title = %quiz.title, "Generated quiz stored");
      generate_reply(StatusCode::OK, GenerateOut::ok(quiz))
    }
    Err(e) => {
      let status = generate_status(&e);
      warn!(target: "generator", %status, error = %e, "Quiz generation failed");
      generate_reply(status, GenerateOut::err(e.to_string()))
    }
  }
}
