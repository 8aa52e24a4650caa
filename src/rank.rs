//! Rank recomputation and leaderboard views.
//!
//! Tie-break rule: competition ranking. A user's rank is one plus the number of
//! users with strictly more points, so equal totals share a rank and the next
//! rank is skipped (500, 300, 300, 100 -> 1, 2, 2, 4). Both the stored rank and
//! the leaderboard use this rule.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::domain::UserProfile;
use crate::error::AppError;
use crate::store::{DocumentStore, StoreError};

pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;

/// 1 + number of entries strictly greater than `points`.
pub fn competition_rank(points: u64, all: impl IntoIterator<Item = u64>) -> u32 {
  1 + all.into_iter().filter(|p| *p > points).count() as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RankChange {
  Up,
  Down,
  Same,
}

impl RankChange {
  pub fn between(previous: Option<u32>, current: Option<u32>) -> Self {
    match (previous, current) {
      (Some(prev), Some(cur)) if cur < prev => RankChange::Up,
      (Some(prev), Some(cur)) if cur > prev => RankChange::Down,
      _ => RankChange::Same,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankUpdate {
  pub rank: u32,
  pub previous_rank: u32,
  pub change: RankChange,
}

/// Recompute one user's rank with a full scan and store it, keeping the old
/// value in `previousRank`. Returns `None` when the user has no profile.
#[instrument(level = "info", skip(store))]
pub async fn update_user_rank(
  store: &DocumentStore,
  user_id: &str,
  retries: u32,
) -> Result<Option<RankUpdate>, AppError> {
  for attempt in 0..=retries {
    let Some(mut profile) = store.get_user(user_id).await else {
      return Ok(None);
    };
    let everyone = store.all_users().await;
    let rank = competition_rank(profile.total_xp, everyone.iter().map(|(_, p)| p.total_xp));

    let previous = profile.rank.unwrap_or(rank);
    profile.previous_rank = Some(previous);
    profile.rank = Some(rank);
    profile.last_rank_update = Some(Utc::now());

    let expected = Some(profile.version);
    match store.put_user(user_id, profile, expected).await {
      Ok(_) => {
        info!(target: "rank", %user_id, previous, rank, "Rank updated");
        return Ok(Some(RankUpdate {
          rank,
          previous_rank: previous,
          change: RankChange::between(Some(previous), Some(rank)),
        }));
      }
      Err(StoreError::VersionConflict { .. }) => {
        warn!(target: "rank", %user_id, attempt, "Profile changed during rank update; retrying");
      }
      Err(e) => return Err(e.into()),
    }
  }
  Err(AppError::Conflict)
}

/// Outcome of a full rank refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RankRefreshReport {
  pub updated: usize,
  /// Users whose rank could not be written; the rest were still refreshed.
  pub failed: Vec<String>,
}

async fn refresh_each<F, Fut>(ids: Vec<String>, mut update: F) -> RankRefreshReport
where
  F: FnMut(String) -> Fut,
  Fut: Future<Output = Result<Option<RankUpdate>, AppError>>,
{
  let mut report = RankRefreshReport::default();
  for id in ids {
    match update(id.clone()).await {
      Ok(Some(_)) => report.updated += 1,
      Ok(None) => {}
      Err(e) => {
        warn!(target: "rank", user_id = %id, error = %e, "Rank refresh failed for user; continuing");
        report.failed.push(id);
      }
    }
  }
  report
}

/// Recompute every user's rank. A failure on one user is logged and the
/// refresh moves on to the next.
#[instrument(level = "info", skip(store))]
pub async fn refresh_all_ranks(store: &DocumentStore, retries: u32) -> RankRefreshReport {
  let ids: Vec<String> = store.all_users().await.into_iter().map(|(id, _)| id).collect();
  let users = ids.len();
  let report = refresh_each(ids, |id| async move { update_user_rank(store, &id, retries).await }).await;
  info!(target: "rank", users, updated = report.updated, failed = report.failed.len(), "Rank refresh complete");
  report
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardRange {
  #[default]
  Week,
  Month,
  All,
}

/// `change` compares the stored all-time `previousRank` and `rank`, in every
/// range. Week and month views have no rank history of their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
  pub user_id: String,
  pub name: String,
  pub points: u64,
  pub level: u64,
  pub rank: u32,
  pub change: RankChange,
}

fn points_in_range(profile: &UserProfile, range: LeaderboardRange, now: DateTime<Utc>) -> u64 {
  let window = match range {
    LeaderboardRange::All => return profile.total_xp,
    LeaderboardRange::Week => Duration::days(7),
    LeaderboardRange::Month => Duration::days(30),
  };
  let since = now - window;
  profile
    .quiz_performance
    .iter()
    .filter(|r| r.timestamp >= since)
    .map(|r| r.xp_earned)
    .sum()
}

/// Top `limit` users by points in `range`. Users without points in a
/// week/month window are left out.
pub fn leaderboard(
  users: &[(String, UserProfile)],
  range: LeaderboardRange,
  limit: usize,
  now: DateTime<Utc>,
) -> Vec<LeaderboardEntry> {
  let mut scored: Vec<(&String, &UserProfile, u64)> = users
    .iter()
    .map(|(id, p)| (id, p, points_in_range(p, range, now)))
    .filter(|(_, _, points)| range == LeaderboardRange::All || *points > 0)
    .collect();
  // Points desc, then user id so equal scores list deterministically.
  scored.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(b.0)));

  let all_points: Vec<u64> = scored.iter().map(|(_, _, pts)| *pts).collect();
  scored
    .iter()
    .take(limit)
    .map(|(id, profile, points)| LeaderboardEntry {
      user_id: (*id).clone(),
      name: profile.display_name.clone().unwrap_or_else(|| "Anonymous".into()),
      points: *points,
      level: profile.level,
      rank: competition_rank(*points, all_points.iter().copied()),
      change: RankChange::between(profile.previous_rank, profile.rank),
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::PerformanceRecord;

  fn user(total_xp: u64) -> UserProfile {
    UserProfile { total_xp, xp: total_xp, ..UserProfile::baseline() }
  }

  fn record(xp_earned: u64, timestamp: DateTime<Utc>) -> PerformanceRecord {
    PerformanceRecord {
      quiz_id: "q".into(),
      quiz_title: "Q".into(),
      category: "General".into(),
      score: (xp_earned / 100) as usize,
      total_questions: 5,
      percentage: 0,
      xp_earned,
      time_spent_secs: 10,
      timestamp,
    }
  }

  #[test]
  fn ties_share_a_rank_and_skip_the_next() {
    let xp = [500, 300, 300, 100];
    let ranks: Vec<u32> = xp.iter().map(|x| competition_rank(*x, xp)).collect();
    assert_eq!(ranks, vec![1, 2, 2, 4]);
  }

  #[test]
  fn rank_change_direction() {
    assert_eq!(RankChange::between(Some(5), Some(2)), RankChange::Up);
    assert_eq!(RankChange::between(Some(2), Some(5)), RankChange::Down);
    assert_eq!(RankChange::between(Some(3), Some(3)), RankChange::Same);
    assert_eq!(RankChange::between(None, Some(3)), RankChange::Same);
  }

  #[tokio::test]
  async fn stored_ranks_use_competition_rule() {
    let store = DocumentStore::new();
    for (id, xp) in [("a", 500), ("b", 300), ("c", 300), ("d", 100)] {
      store.put_user(id, user(xp), None).await.unwrap();
    }
    assert_eq!(refresh_all_ranks(&store, 3).await, RankRefreshReport { updated: 4, failed: vec![] });

    let mut ranks = Vec::new();
    for id in ["a", "b", "c", "d"] {
      ranks.push(store.get_user(id).await.unwrap().rank.unwrap());
    }
    assert_eq!(ranks, vec![1, 2, 2, 4]);
  }

  #[tokio::test]
  async fn previous_rank_keeps_the_old_value() {
    let store = DocumentStore::new();
    store.put_user("a", user(500), None).await.unwrap();
    store.put_user("b", user(100), None).await.unwrap();

    let first = update_user_rank(&store, "b", 3).await.unwrap().unwrap();
    assert_eq!(first, RankUpdate { rank: 2, previous_rank: 2, change: RankChange::Same });

    let mut b = store.get_user("b").await.unwrap();
    b.total_xp = 900;
    let v = b.version;
    store.put_user("b", b, Some(v)).await.unwrap();

    let second = update_user_rank(&store, "b", 3).await.unwrap().unwrap();
    assert_eq!(second, RankUpdate { rank: 1, previous_rank: 2, change: RankChange::Up });
  }

  #[tokio::test]
  async fn unknown_user_has_no_rank() {
    let store = DocumentStore::new();
    assert_eq!(update_user_rank(&store, "ghost", 3).await.unwrap(), None);
  }

  #[test]
  fn weekly_leaderboard_counts_recent_xp_only() {
    let now = Utc::now();
    let mut recent = user(1_000);
    recent.display_name = Some("Ada".into());
    recent.quiz_performance = vec![record(300, now - Duration::days(2)), record(700, now - Duration::days(20))];
    let mut stale = user(5_000);
    stale.quiz_performance = vec![record(500, now - Duration::days(40))];

    let users = vec![("r".to_string(), recent), ("s".to_string(), stale)];

    let week = leaderboard(&users, LeaderboardRange::Week, 10, now);
    assert_eq!(week.len(), 1);
    assert_eq!(week[0].name, "Ada");
    assert_eq!(week[0].points, 300);

    let month = leaderboard(&users, LeaderboardRange::Month, 10, now);
    assert_eq!(month[0].points, 1_000);

    let all = leaderboard(&users, LeaderboardRange::All, 10, now);
    assert_eq!(all.iter().map(|e| e.user_id.as_str()).collect::<Vec<_>>(), vec!["s", "r"]);
    assert_eq!(all[0].name, "Anonymous");
    assert_eq!(all[1].name, "Ada");
  }

  #[tokio::test]
  async fn refresh_keeps_going_after_a_failed_user() {
    let ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
    let report = refresh_each(ids, |id| async move {
      match id.as_str() {
        "b" => Err(AppError::Conflict),
        _ => Ok(Some(RankUpdate { rank: 1, previous_rank: 1, change: RankChange::Same })),
      }
    })
    .await;
    assert_eq!(report, RankRefreshReport { updated: 2, failed: vec!["b".to_string()] });
  }

  #[test]
  fn windowed_views_report_all_time_rank_change() {
    let now = Utc::now();
    let mut climber = user(300);
    climber.rank = Some(1);
    climber.previous_rank = Some(3);
    climber.quiz_performance = vec![record(300, now - Duration::days(1))];
    let users = vec![("c".to_string(), climber)];

    let week = leaderboard(&users, LeaderboardRange::Week, 10, now);
    assert_eq!(week[0].change, RankChange::Up);
  }

  #[test]
  fn leaderboard_limit_keeps_tied_ranks() {
    let now = Utc::now();
    let users: Vec<(String, UserProfile)> = [("a", 500), ("b", 300), ("c", 300), ("d", 100)]
      .into_iter()
      .map(|(id, xp)| (id.to_string(), user(xp)))
      .collect();
    let top = leaderboard(&users, LeaderboardRange::All, 3, now);
    assert_eq!(top.iter().map(|e| e.rank).collect::<Vec<_>>(), vec![1, 2, 2]);
  }
}
