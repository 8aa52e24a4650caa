//! Loading service configuration (prompts, tunables, optional quiz bank) from TOML.
//!
//! Every table is optional; anything missing falls back to the defaults below.
//!
//! ```toml
//! [session]
//! question_seconds = 30
//! idle_ttl_secs = 600
//!
//! [generator]
//! min_questions = 5
//! max_questions = 10
//! moderation_fail_closed = false
//!
//! [[quizzes]]
//! title = "Capitals"
//! category = "Geography"
//! difficulty = "easy"
//! questions = [
//!   { questionText = "Capital of France?", options = ["Paris", "Rome", "Madrid", "Berlin"], correctOption = 0 },
//! ]
//! ```

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Question;
use crate::scoring::DEFAULT_WRITE_RETRIES;
use crate::session::DEFAULT_QUESTION_SECONDS;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub session: SessionSettings,
  #[serde(default)]
  pub generator: GeneratorSettings,
  #[serde(default)]
  pub quizzes: Vec<QuizCfg>,
}

/// Quiz entry accepted in the TOML bank.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizCfg {
  #[serde(default)] pub id: Option<String>,
  pub title: String,
  #[serde(default)] pub category: String,
  #[serde(default)] pub difficulty: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub questions: Vec<Question>,
  #[serde(default)] pub time_estimate: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
  /// Countdown per question, in seconds.
  pub question_seconds: u32,
  /// Compare-and-swap retries for profile writes.
  pub write_retries: u32,
  /// Live sessions untouched for this long are dropped without recording.
  pub idle_ttl_secs: u64,
  /// How often the idle sweep runs.
  pub sweep_interval_secs: u64,
}

impl Default for SessionSettings {
  fn default() -> Self {
    Self {
      question_seconds: DEFAULT_QUESTION_SECONDS,
      write_retries: DEFAULT_WRITE_RETRIES,
      idle_ttl_secs: 600,
      sweep_interval_secs: 60,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
  pub min_questions: usize,
  pub max_questions: usize,
  /// Extracted text is truncated to this many characters before prompting.
  pub max_source_chars: usize,
  pub moderation_enabled: bool,
  /// When the moderation call itself fails: reject (true) or let the
  /// content through (false).
  pub moderation_fail_closed: bool,
  pub moderation_sample_chars: usize,
  pub extraction_timeout_secs: u64,
  pub generation_timeout_secs: u64,
  pub max_upload_bytes: usize,
  /// Generations per client IP per minute.
  pub rate_limit_per_minute: u32,
}

impl Default for GeneratorSettings {
  fn default() -> Self {
    Self {
      min_questions: 5,
      max_questions: 10,
      max_source_chars: 6_000,
      moderation_enabled: true,
      moderation_fail_closed: false,
      moderation_sample_chars: 3_000,
      extraction_timeout_secs: 30,
      generation_timeout_secs: 60,
      max_upload_bytes: 5 * 1024 * 1024,
      rate_limit_per_minute: 10,
    }
  }
}

/// Prompts sent to the text model. Override in TOML to tune wording.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub quiz_system: String,
  pub quiz_user_template: String,
  pub moderation_system: String,
  pub moderation_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      quiz_system: "You write multiple-choice quizzes from study material. Respond ONLY with clean JSON, no markdown.".into(),
      quiz_user_template: r#"Generate a quiz from this text with these requirements:
- {min_questions}-{max_questions} multiple choice questions
- 4 options per question
- Mark the correct answer with its zero-based index (0-3)
- Include title, category, difficulty (easy/medium/hard), description

Text: {text}

Required JSON format:
{
  "title": "Quiz Title",
  "category": "Subject",
  "difficulty": "easy/medium/hard",
  "description": "Brief summary",
  "questions": [
    { "questionText": "Question here", "options": ["A", "B", "C", "D"], "correctOption": 0 }
  ]
}"#
        .into(),
      moderation_system: "You are a content policy checker for an educational quiz platform. Respond ONLY with JSON.".into(),
      moderation_user_template: r#"Analyze the following text for content policy violations.
Check for: 18+ content, explicit sexual material, graphic violence, hate speech, abusive language, harassment, or content inappropriate for educational purposes.

Respond with only a JSON object:
{ "isAppropriate": true/false, "reason": "explanation if inappropriate", "categories": ["violation types if any"] }

Text: {text}"#
        .into(),
    }
  }
}

/// Attempt to load `AppConfig` from QUIZ_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("QUIZ_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "quizforge", %path, quizzes = cfg.quizzes.len(), "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "quizforge", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "quizforge", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_defaults() {
    let cfg: AppConfig = toml::from_str(
      r#"
        [session]
        question_seconds = 15

        [generator]
        moderation_fail_closed = true

        [[quizzes]]
        title = "Capitals"
        category = "Geography"
        questions = [
          { questionText = "Capital of France?", options = ["Paris", "Rome", "Madrid", "Berlin"], correctOption = 0 },
        ]
      "#,
    )
    .unwrap();

    assert_eq!(cfg.session.question_seconds, 15);
    assert_eq!(cfg.session.write_retries, DEFAULT_WRITE_RETRIES);
    assert!(cfg.generator.moderation_fail_closed);
    assert_eq!(cfg.generator.max_questions, 10);
    assert_eq!(cfg.quizzes.len(), 1);
    assert_eq!(cfg.quizzes[0].questions[0].correct_option, 0);
    assert!(cfg.prompts.quiz_user_template.contains("{text}"));
  }

  #[test]
  fn empty_file_is_all_defaults() {
    let cfg: AppConfig = toml::from_str("").unwrap();
    assert_eq!(cfg.session.question_seconds, DEFAULT_QUESTION_SECONDS);
    assert_eq!(cfg.session.idle_ttl_secs, 600);
    assert_eq!(cfg.generator.max_upload_bytes, 5 * 1024 * 1024);
    assert!(cfg.quizzes.is_empty());
  }
}
