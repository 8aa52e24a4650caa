//! PDF-to-quiz pipeline: text -> moderation -> generation -> strict validation.
//!
//! A quiz only reaches the store after every stage succeeds. Model output is
//! carved with `json_object_slice`, parsed into a typed document and then
//! shape-checked; anything off is a rejection, never a partial quiz.

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{GeneratorSettings, Prompts};
use crate::domain::{time_estimate_for, Question, Quiz, QuizShapeError, QuizSource};
use crate::openai::{ModelTier, TextModel};
use crate::pdf::{usable_text, ExtractError};
use crate::store::{DocumentStore, StoreError};
use crate::util::{fill_template, json_object_slice, trunc_for_log, truncate_chars};

#[derive(Error, Debug)]
pub enum GenerateError {
  #[error("Failed to extract text from PDF: {0}")]
  Extraction(#[from] ExtractError),
  #[error("Content policy violation: {0}. This PDF contains content that violates our policy")]
  PolicyViolation(String),
  #[error("content moderation unavailable: {0}")]
  ModerationUnavailable(String),
  #[error("model call failed: {0}")]
  Upstream(String),
  #[error("model call timed out after {0}s")]
  Timeout(u64),
  #[error("no JSON object found in model response")]
  NoJson,
  #[error("model response is not valid quiz JSON: {0}")]
  Malformed(String),
  #[error("generated quiz rejected: {0}")]
  InvalidShape(#[from] QuizShapeError),
  #[error("quiz generation is disabled (OPENAI_API_KEY not set)")]
  Disabled,
  #[error("failed to store quiz: {0}")]
  Store(#[from] StoreError),
}

/// Moderation answer as requested in the moderation prompt.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModerationVerdict {
  pub is_appropriate: bool,
  #[serde(default)]
  pub reason: Option<String>,
  #[serde(default)]
  pub categories: Vec<String>,
}

impl ModerationVerdict {
  fn explanation(&self) -> String {
    match (&self.reason, self.categories.is_empty()) {
      (Some(r), _) if !r.trim().is_empty() => r.trim().to_string(),
      (_, false) => self.categories.join(", "),
      _ => "content flagged as inappropriate".into(),
    }
  }
}

pub fn parse_moderation(raw: &str) -> Result<ModerationVerdict, String> {
  let slice = json_object_slice(raw).ok_or_else(|| "no JSON object in moderation reply".to_string())?;
  serde_json::from_str(slice).map_err(|e| e.to_string())
}

/// Quiz document as the model is asked to return it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedQuiz {
  title: String,
  category: String,
  difficulty: String,
  #[serde(default)]
  description: String,
  questions: Vec<Question>,
}

/// Parse and validate a raw model reply into a new quiz document.
pub fn parse_quiz_response(raw: &str, settings: &GeneratorSettings) -> Result<Quiz, GenerateError> {
  let slice = json_object_slice(raw).ok_or(GenerateError::NoJson)?;
  let generated: GeneratedQuiz =
    serde_json::from_str(slice).map_err(|e| GenerateError::Malformed(e.to_string()))?;

  let quiz = Quiz {
    id: Uuid::new_v4().to_string(),
    title: generated.title.trim().to_string(),
    category: generated.category.trim().to_string(),
    difficulty: generated.difficulty.trim().to_lowercase(),
    description: generated.description.trim().to_string(),
    time_estimate: time_estimate_for(generated.questions.len()),
    questions: generated.questions,
    source: QuizSource::Generated,
    created_at: Some(Utc::now()),
  };
  quiz.validate(settings.min_questions, settings.max_questions)?;
  Ok(quiz)
}

/// Optional policy check. When the check itself fails, `moderation_fail_closed`
/// decides: reject, or let the content through (the default).
#[instrument(level = "info", skip_all, fields(text_len = text.len()))]
async fn moderate<M: TextModel>(
  model: &M,
  prompts: &Prompts,
  settings: &GeneratorSettings,
  text: &str,
) -> Result<(), GenerateError> {
  if !settings.moderation_enabled {
    return Ok(());
  }
  let sample = truncate_chars(text, settings.moderation_sample_chars);
  let user = fill_template(&prompts.moderation_user_template, &[("text", &sample)]);
  let deadline = Duration::from_secs(settings.generation_timeout_secs);

  let verdict = match tokio::time::timeout(deadline, model.complete(ModelTier::Fast, &prompts.moderation_system, &user, 0.0)).await {
    Err(_) => Err(format!("timed out after {}s", deadline.as_secs())),
    Ok(Err(e)) => Err(e),
    Ok(Ok(raw)) => parse_moderation(&raw),
  };

  match verdict {
    Ok(v) if v.is_appropriate => Ok(()),
    Ok(v) => {
      warn!(target: "generator", categories = ?v.categories, "Content flagged by moderation");
      Err(GenerateError::PolicyViolation(v.explanation()))
    }
    Err(e) if settings.moderation_fail_closed => {
      error!(target: "generator", error = %e, "Moderation failed; rejecting (fail-closed)");
      Err(GenerateError::ModerationUnavailable(e))
    }
    Err(e) => {
      warn!(target: "generator", error = %e, "Moderation failed; allowing content (fail-open)");
      Ok(())
    }
  }
}

/// Run the model stages on already-extracted text.
#[instrument(level = "info", skip_all, fields(source_len = source_text.len()))]
pub async fn generate_quiz<M: TextModel>(
  model: &M,
  prompts: &Prompts,
  settings: &GeneratorSettings,
  source_text: &str,
) -> Result<Quiz, GenerateError> {
  let text = truncate_chars(&usable_text(source_text)?, settings.max_source_chars);

  moderate(model, prompts, settings, &text).await?;

  let min = settings.min_questions.to_string();
  let max = settings.max_questions.to_string();
  // Text goes last so placeholders inside the document are left alone.
  let user = fill_template(
    &prompts.quiz_user_template,
    &[("min_questions", &min), ("max_questions", &max), ("text", &text)],
  );

  let deadline = Duration::from_secs(settings.generation_timeout_secs);
  let start = std::time::Instant::now();
  let raw = tokio::time::timeout(deadline, model.complete(ModelTier::Strong, &prompts.quiz_system, &user, 0.7))
    .await
    .map_err(|_| GenerateError::Timeout(deadline.as_secs()))?
    .map_err(GenerateError::Upstream)?;
  info!(target: "generator", elapsed = ?start.elapsed(), raw_len = raw.len(), preview = %trunc_for_log(&raw, 80), "Model reply received");

  let quiz = parse_quiz_response(&raw, settings)?;
  info!(target: "generator", quiz_id = %quiz.id, title = %quiz.title, questions = quiz.questions.len(), "Quiz generated");
  Ok(quiz)
}

/// Generate and persist. Nothing is written unless generation fully succeeds.
pub async fn generate_and_store<M: TextModel>(
  model: &M,
  store: &DocumentStore,
  prompts: &Prompts,
  settings: &GeneratorSettings,
  source_text: &str,
) -> Result<Quiz, GenerateError> {
  let quiz = generate_quiz(model, prompts, settings, source_text).await?;
  store.insert_quiz(quiz.clone()).await?;
  Ok(quiz)
}
