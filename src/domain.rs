//! Domain models: quizzes, questions, user profiles and performance records.
//!
//! Field names serialize in camelCase so documents keep the shape the front end
//! already reads (`questionText`, `correctOption`, `totalXP`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every question carries exactly this many options.
pub const OPTIONS_PER_QUESTION: usize = 4;
/// XP granted per correct answer. No difficulty weighting.
pub const XP_PER_CORRECT: u64 = 100;
/// XP needed per level step.
pub const XP_PER_LEVEL: u64 = 500;
pub const PERFECT_SCORE_BADGE: &str = "Perfect Score";

/// Where did a quiz come from?
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuizSource {
  /// Entered through the creation endpoint.
  #[default]
  Manual,
  /// Loaded from the TOML quiz bank.
  LocalBank,
  /// Produced by the PDF generator.
  Generated,
  /// Built-in samples (last resort so the app is never empty).
  Seed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub question_text: String,
  pub options: Vec<String>,
  pub correct_option: usize,
}

impl Question {
  pub fn is_correct(&self, index: usize) -> bool {
    index == self.correct_option
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
  pub id: String,
  pub title: String,
  #[serde(default)] pub category: String,
  #[serde(default)] pub difficulty: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub questions: Vec<Question>,
  #[serde(default)] pub time_estimate: String,
  #[serde(default)] pub source: QuizSource,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
}

/// Shape problems found while validating a quiz document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuizShapeError {
  #[error("quiz title is empty")]
  EmptyTitle,
  #[error("quiz has {found} questions, expected between {min} and {max}")]
  QuestionCount { found: usize, min: usize, max: usize },
  #[error("question {index} has empty text")]
  EmptyQuestion { index: usize },
  #[error("question {index} has {found} options, expected 4")]
  OptionCount { index: usize, found: usize },
  #[error("question {index} has an empty option")]
  EmptyOption { index: usize },
  #[error("question {index} marks option {correct} as correct, out of range")]
  CorrectOutOfRange { index: usize, correct: usize },
}

impl Quiz {
  /// Check the document shape. `min..=max` bounds the question count.
  pub fn validate(&self, min: usize, max: usize) -> Result<(), QuizShapeError> {
    if self.title.trim().is_empty() {
      return Err(QuizShapeError::EmptyTitle);
    }
    let found = self.questions.len();
    if found < min || found > max {
      return Err(QuizShapeError::QuestionCount { found, min, max });
    }
    for (index, q) in self.questions.iter().enumerate() {
      if q.question_text.trim().is_empty() {
        return Err(QuizShapeError::EmptyQuestion { index });
      }
      if q.options.len() != OPTIONS_PER_QUESTION {
        return Err(QuizShapeError::OptionCount { index, found: q.options.len() });
      }
      if q.options.iter().any(|o| o.trim().is_empty()) {
        return Err(QuizShapeError::EmptyOption { index });
      }
      if q.correct_option >= q.options.len() {
        return Err(QuizShapeError::CorrectOutOfRange { index, correct: q.correct_option });
      }
    }
    Ok(())
  }
}

/// "7 min" style estimate, 1.5 minutes per question rounded up.
pub fn time_estimate_for(question_count: usize) -> String {
  let minutes = (question_count * 3).div_ceil(2);
  format!("{} min", minutes)
}

/// One finished attempt, appended to the profile.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
  pub quiz_id: String,
  pub quiz_title: String,
  pub category: String,
  pub score: usize,
  pub total_questions: usize,
  pub percentage: u32,
  pub xp_earned: u64,
  pub time_spent_secs: u64,
  pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub display_name: Option<String>,
  #[serde(default)] pub xp: u64,
  #[serde(default, rename = "totalXP")] pub total_xp: u64,
  #[serde(default = "first_level")] pub level: u64,
  /// Set semantics: membership is checked before every insert.
  #[serde(default)] pub badges: Vec<String>,
  #[serde(default)] pub quizzes_completed: u64,
  #[serde(default)] pub perfect_scores: u64,
  #[serde(default)] pub quiz_performance: Vec<PerformanceRecord>,
  #[serde(default)] pub rank: Option<u32>,
  #[serde(default)] pub previous_rank: Option<u32>,
  #[serde(default)] pub last_rank_update: Option<DateTime<Utc>>,
  /// Bumped by the store on every successful write.
  #[serde(default)] pub version: u64,
}

fn first_level() -> u64 { 1 }

impl UserProfile {
  /// Baseline document for a user that has never finished a quiz.
  pub fn baseline() -> Self {
    Self { level: 1, ..Default::default() }
  }

  pub fn has_badge(&self, badge: &str) -> bool {
    self.badges.iter().any(|b| b == badge)
  }

  /// Insert a badge if absent. Returns true when the badge is new.
  pub fn award_badge(&mut self, badge: &str) -> bool {
    if self.has_badge(badge) {
      return false;
    }
    self.badges.push(badge.to_string());
    true
  }
}

pub fn level_for(total_xp: u64) -> u64 {
  total_xp / XP_PER_LEVEL + 1
}

#[cfg(test)]
mod tests {
  use super::*;

  fn q(correct: usize) -> Question {
    Question {
      question_text: "2 + 2?".into(),
      options: vec!["3".into(), "4".into(), "5".into(), "6".into()],
      correct_option: correct,
    }
  }

  fn quiz(questions: Vec<Question>) -> Quiz {
    Quiz {
      id: "q1".into(),
      title: "Arithmetic".into(),
      category: "Math".into(),
      difficulty: "easy".into(),
      description: String::new(),
      questions,
      time_estimate: String::new(),
      source: QuizSource::Manual,
      created_at: None,
    }
  }

  #[test]
  fn level_steps_every_500_xp() {
    assert_eq!(level_for(0), 1);
    assert_eq!(level_for(499), 1);
    assert_eq!(level_for(500), 2);
    assert_eq!(level_for(1250), 3);
  }

  #[test]
  fn validate_rejects_out_of_range_correct_option() {
    let err = quiz(vec![q(1), q(4)]).validate(1, 10).unwrap_err();
    assert_eq!(err, QuizShapeError::CorrectOutOfRange { index: 1, correct: 4 });
  }

  #[test]
  fn validate_enforces_question_bounds() {
    let err = quiz(vec![q(0)]).validate(5, 10).unwrap_err();
    assert!(matches!(err, QuizShapeError::QuestionCount { found: 1, .. }));
    assert!(quiz(vec![q(0); 5]).validate(5, 10).is_ok());
  }

  #[test]
  fn validate_requires_four_options() {
    let mut bad = q(0);
    bad.options.pop();
    let err = quiz(vec![bad]).validate(1, 10).unwrap_err();
    assert_eq!(err, QuizShapeError::OptionCount { index: 0, found: 3 });
  }

  #[test]
  fn award_badge_is_idempotent() {
    let mut p = UserProfile::baseline();
    assert!(p.award_badge(PERFECT_SCORE_BADGE));
    assert!(!p.award_badge(PERFECT_SCORE_BADGE));
    assert_eq!(p.badges, vec![PERFECT_SCORE_BADGE.to_string()]);
  }

  #[test]
  fn time_estimate_rounds_up() {
    assert_eq!(time_estimate_for(5), "8 min");
    assert_eq!(time_estimate_for(4), "6 min");
  }

  #[test]
  fn quiz_json_uses_camel_case() {
    let json = serde_json::to_value(quiz(vec![q(1)])).unwrap();
    assert_eq!(json["questions"][0]["correctOption"], 1);
    assert!(json["questions"][0].get("questionText").is_some());
    assert!(json.get("timeEstimate").is_some());
  }
}
