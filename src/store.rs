//! In-process document store with two collections: `quizzes` and `users`.
//!
//! Quizzes are write-once. User profiles are versioned: every write names the
//! version it read, and a mismatch is rejected instead of silently overwriting
//! a concurrent update.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::domain::{Quiz, UserProfile};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
  #[error("version conflict on {id}: expected {expected:?}, found {found:?}")]
  VersionConflict { id: String, expected: Option<u64>, found: Option<u64> },
  #[error("document {0} already exists")]
  DuplicateId(String),
}

/// Optional equality filters for quiz listing (case-insensitive).
#[derive(Debug, Default, Clone)]
pub struct QuizFilter {
  pub category: Option<String>,
  pub difficulty: Option<String>,
}

impl QuizFilter {
  fn matches(&self, q: &Quiz) -> bool {
    let eq = |want: &Option<String>, have: &str| {
      want.as_deref().map_or(true, |w| w.trim().is_empty() || w.eq_ignore_ascii_case(have))
    };
    eq(&self.category, &q.category) && eq(&self.difficulty, &q.difficulty)
  }
}

#[derive(Clone, Default)]
pub struct DocumentStore {
  quizzes: Arc<RwLock<HashMap<String, Quiz>>>,
  /// Insertion order, so listings are stable.
  quiz_order: Arc<RwLock<Vec<String>>>,
  users: Arc<RwLock<HashMap<String, UserProfile>>>,
}

impl DocumentStore {
  pub fn new() -> Self {
    Self::default()
  }

  #[instrument(level = "debug", skip(self, quiz), fields(id = %quiz.id))]
  pub async fn insert_quiz(&self, quiz: Quiz) -> Result<(), StoreError> {
    let mut quizzes = self.quizzes.write().await;
    if quizzes.contains_key(&quiz.id) {
      return Err(StoreError::DuplicateId(quiz.id));
    }
    self.quiz_order.write().await.push(quiz.id.clone());
    quizzes.insert(quiz.id.clone(), quiz);
    Ok(())
  }

  /// Insert unless the id is taken. Returns false when skipped.
  pub async fn insert_quiz_if_absent(&self, quiz: Quiz) -> bool {
    match self.insert_quiz(quiz).await {
      Ok(()) => true,
      Err(e) => {
        debug!(target: "quizforge", error = %e, "Skipping quiz insert");
        false
      }
    }
  }

  pub async fn get_quiz(&self, id: &str) -> Option<Quiz> {
    self.quizzes.read().await.get(id).cloned()
  }

  pub async fn list_quizzes(&self, filter: &QuizFilter) -> Vec<Quiz> {
    let quizzes = self.quizzes.read().await;
    let order = self.quiz_order.read().await;
    order
      .iter()
      .filter_map(|id| quizzes.get(id))
      .filter(|q| filter.matches(q))
      .cloned()
      .collect()
  }

  pub async fn quiz_count(&self) -> usize {
    self.quizzes.read().await.len()
  }

  pub async fn get_user(&self, id: &str) -> Option<UserProfile> {
    self.users.read().await.get(id).cloned()
  }

  /// Compare-and-swap write of a user profile.
  ///
  /// `expected_version = None` creates the document and fails if it exists.
  /// `Some(v)` requires the stored version to equal `v`. The stored copy gets
  /// the next version and is returned.
  #[instrument(level = "debug", skip(self, profile), fields(%id, ?expected_version))]
  pub async fn put_user(
    &self,
    id: &str,
    mut profile: UserProfile,
    expected_version: Option<u64>,
  ) -> Result<UserProfile, StoreError> {
    let mut users = self.users.write().await;
    let found = users.get(id).map(|p| p.version);
    if found != expected_version {
      warn!(target: "quizforge", %id, ?expected_version, ?found, "Profile version conflict");
      return Err(StoreError::VersionConflict { id: id.to_string(), expected: expected_version, found });
    }
    profile.version = found.map_or(1, |v| v + 1);
    users.insert(id.to_string(), profile.clone());
    Ok(profile)
  }

  /// Full scan of the users collection.
  pub async fn all_users(&self) -> Vec<(String, UserProfile)> {
    self
      .users
      .read()
      .await
      .iter()
      .map(|(id, p)| (id.clone(), p.clone()))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::QuizSource;

  fn quiz(id: &str, category: &str) -> Quiz {
    Quiz {
      id: id.into(),
      title: format!("Quiz {id}"),
      category: category.into(),
      difficulty: "easy".into(),
      description: String::new(),
      questions: vec![],
      time_estimate: String::new(),
      source: QuizSource::Manual,
      created_at: None,
    }
  }

  #[tokio::test]
  async fn duplicate_quiz_ids_are_rejected() {
    let store = DocumentStore::new();
    store.insert_quiz(quiz("a", "Math")).await.unwrap();
    let err = store.insert_quiz(quiz("a", "Math")).await.unwrap_err();
    assert_eq!(err, StoreError::DuplicateId("a".into()));
    assert!(!store.insert_quiz_if_absent(quiz("a", "Science")).await);
    assert_eq!(store.get_quiz("a").await.unwrap().category, "Math");
  }

  #[tokio::test]
  async fn listing_keeps_insertion_order_and_filters() {
    let store = DocumentStore::new();
    for (id, cat) in [("c", "Math"), ("a", "Science"), ("b", "math")] {
      store.insert_quiz(quiz(id, cat)).await.unwrap();
    }
    let all: Vec<_> = store.list_quizzes(&QuizFilter::default()).await.into_iter().map(|q| q.id).collect();
    assert_eq!(all, vec!["c", "a", "b"]);

    let filter = QuizFilter { category: Some("MATH".into()), difficulty: None };
    let math: Vec<_> = store.list_quizzes(&filter).await.into_iter().map(|q| q.id).collect();
    assert_eq!(math, vec!["c", "b"]);
  }

  #[tokio::test]
  async fn put_user_enforces_versions() {
    let store = DocumentStore::new();
    let created = store.put_user("u1", UserProfile::baseline(), None).await.unwrap();
    assert_eq!(created.version, 1);

    // A second create loses.
    let err = store.put_user("u1", UserProfile::baseline(), None).await.unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { found: Some(1), .. }));

    let mut next = created.clone();
    next.xp = 100;
    let updated = store.put_user("u1", next.clone(), Some(1)).await.unwrap();
    assert_eq!(updated.version, 2);

    // Stale writer based on version 1 is rejected.
    let err = store.put_user("u1", next, Some(1)).await.unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { expected: Some(1), found: Some(2), .. }));
    assert_eq!(store.get_user("u1").await.unwrap().xp, 100);
  }
}
