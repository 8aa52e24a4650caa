//! XP, level and badge bookkeeping for a finished attempt.
//!
//! `apply_attempt` is the pure merge of one attempt into a profile;
//! `record_attempt` wraps it in a compare-and-swap loop against the store so
//! two attempts finishing at once cannot overwrite each other.

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::domain::{level_for, PerformanceRecord, UserProfile, PERFECT_SCORE_BADGE, XP_PER_CORRECT};
use crate::error::AppError;
use crate::session::AttemptSummary;
use crate::store::{DocumentStore, StoreError};

pub const DEFAULT_WRITE_RETRIES: u32 = 5;

/// What a single attempt added to the profile.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptGain {
  pub xp_earned: u64,
  pub percentage: u32,
  pub perfect: bool,
  pub new_badges: Vec<String>,
}

pub fn percentage(score: usize, total: usize) -> u32 {
  if total == 0 {
    return 0;
  }
  ((score as f64 / total as f64) * 100.0).round() as u32
}

/// Merge one attempt into `profile`. XP only ever grows.
pub fn apply_attempt(profile: &mut UserProfile, summary: &AttemptSummary, now: DateTime<Utc>) -> AttemptGain {
  let xp_earned = summary.score as u64 * XP_PER_CORRECT;
  let perfect = summary.score == summary.total_questions;
  let pct = percentage(summary.score, summary.total_questions);

  profile.xp += xp_earned;
  profile.total_xp += xp_earned;
  profile.level = level_for(profile.total_xp);
  profile.quizzes_completed += 1;

  let mut new_badges = Vec::new();
  if perfect {
    profile.perfect_scores += 1;
    if profile.award_badge(PERFECT_SCORE_BADGE) {
      new_badges.push(PERFECT_SCORE_BADGE.to_string());
    }
  }

  profile.quiz_performance.push(PerformanceRecord {
    quiz_id: summary.quiz_id.clone(),
    quiz_title: summary.quiz_title.clone(),
    category: summary.category.clone(),
    score: summary.score,
    total_questions: summary.total_questions,
    percentage: pct,
    xp_earned,
    time_spent_secs: summary.time_spent_secs,
    timestamp: now,
  });

  AttemptGain { xp_earned, percentage: pct, perfect, new_badges }
}

/// Persist an attempt as one logical update. A missing profile is created from
/// the baseline. Version conflicts re-read and recompute up to `retries` times.
#[instrument(level = "info", skip(store, summary), fields(quiz_id = %summary.quiz_id, score = summary.score))]
pub async fn record_attempt(
  store: &DocumentStore,
  user_id: &str,
  summary: &AttemptSummary,
  retries: u32,
) -> Result<(UserProfile, AttemptGain), AppError> {
  for attempt in 0..=retries {
    let (mut profile, expected) = match store.get_user(user_id).await {
      Some(p) => {
        let v = p.version;
        (p, Some(v))
      }
      None => (UserProfile::baseline(), None),
    };

    let gain = apply_attempt(&mut profile, summary, Utc::now());
    match store.put_user(user_id, profile, expected).await {
      Ok(saved) => {
        info!(target: "scoring", %user_id, xp_earned = gain.xp_earned, total_xp = saved.total_xp, level = saved.level, perfect = gain.perfect, "Attempt recorded");
        return Ok((saved, gain));
      }
      Err(StoreError::VersionConflict { .. }) => {
        warn!(target: "scoring", %user_id, attempt, "Profile changed underneath us; retrying");
      }
      Err(e) => return Err(e.into()),
    }
  }
  Err(AppError::Conflict)
}
