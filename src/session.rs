//! Quiz attempt state machine.
//!
//! One `QuizSession` is one user's pass through one quiz:
//!
//!   question shown --select--> answer revealed --advance--> next question
//!        |                                         \--> finished (past last)
//!        \--timer hits zero--> advance (no credit)
//!
//! The session is plain data with synchronous transitions. The countdown task
//! in `timer` and the HTTP/WS handlers all go through the same mutex, so every
//! transition is serialized.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::domain::{Question, Quiz};
use crate::error::AppError;

pub const DEFAULT_QUESTION_SECONDS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
  Correct,
  Incorrect,
  /// Already revealed or already finished: nothing changed.
  Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
  NextQuestion(usize),
  Finished,
  /// Attempt was already over; no-op.
  AlreadyFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
  /// Still counting; seconds left on the current question.
  Counting(u32),
  /// Reached zero and advanced without credit.
  Expired { question_index: usize, advance: Advance },
  /// Not counting (answer revealed or attempt finished).
  Idle,
}

/// What scoring needs once the attempt is over.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptSummary {
  pub quiz_id: String,
  pub quiz_title: String,
  pub category: String,
  pub score: usize,
  pub total_questions: usize,
  pub time_spent_secs: u64,
}

#[derive(Debug)]
pub struct QuizSession {
  pub id: String,
  pub user_id: String,
  quiz: Quiz,
  current: usize,
  selected: Option<usize>,
  revealed: bool,
  score: usize,
  time_left: u32,
  question_seconds: u32,
  finished: bool,
  recorded: bool,
  started_at: Instant,
  /// When the current question was shown; the countdown is phased from here.
  question_started_at: Instant,
  /// Last state change, from the player or the timer.
  last_activity: Instant,
}

impl QuizSession {
  /// Begin an attempt. A quiz without questions is an error state, not a
  /// session that finishes immediately.
  pub fn start(id: String, user_id: String, quiz: Quiz, question_seconds: u32) -> Result<Self, AppError> {
    if quiz.questions.is_empty() {
      return Err(AppError::EmptyQuiz(quiz.id));
    }
    let question_seconds = question_seconds.max(1);
    info!(target: "session", session_id = %id, %user_id, quiz_id = %quiz.id, questions = quiz.questions.len(), "Attempt started");
    let now = Instant::now();
    Ok(Self {
      id,
      user_id,
      quiz,
      current: 0,
      selected: None,
      revealed: false,
      score: 0,
      time_left: question_seconds,
      question_seconds,
      finished: false,
      recorded: false,
      started_at: now,
      question_started_at: now,
      last_activity: now,
    })
  }

  pub fn quiz(&self) -> &Quiz { &self.quiz }
  pub fn current_index(&self) -> usize { self.current }
  pub fn question_count(&self) -> usize { self.quiz.questions.len() }
  pub fn selected(&self) -> Option<usize> { self.selected }
  pub fn is_revealed(&self) -> bool { self.revealed }
  pub fn score(&self) -> usize { self.score }
  pub fn time_left(&self) -> u32 { self.time_left }
  pub fn is_finished(&self) -> bool { self.finished }
  pub fn question_started_at(&self) -> Instant { self.question_started_at }
  pub fn idle_for(&self) -> Duration { self.last_activity.elapsed() }

  /// `None` once the attempt is finished.
  pub fn current_question(&self) -> Option<&Question> {
    if self.finished { None } else { self.quiz.questions.get(self.current) }
  }

  /// Record an answer for the current question. The first selection wins;
  /// later ones are ignored until `advance`.
  pub fn select_option(&mut self, index: usize) -> Result<SelectOutcome, AppError> {
    if self.finished || self.revealed {
      return Ok(SelectOutcome::Ignored);
    }
    let question = &self.quiz.questions[self.current];
    if index >= question.options.len() {
      return Err(AppError::InvalidOption { index, count: question.options.len() });
    }
    self.selected = Some(index);
    self.revealed = true;
    self.last_activity = Instant::now();
    let outcome = if question.is_correct(index) {
      self.score += 1;
      SelectOutcome::Correct
    } else {
      SelectOutcome::Incorrect
    };
    debug!(target: "session", session_id = %self.id, question = self.current, index, ?outcome, score = self.score, "Option selected");
    Ok(outcome)
  }

  /// Reset per-question state and move on, or finish past the last question.
  pub fn advance(&mut self) -> Advance {
    if self.finished {
      return Advance::AlreadyFinished;
    }
    self.selected = None;
    self.revealed = false;
    self.time_left = self.question_seconds;
    let now = Instant::now();
    self.question_started_at = now;
    self.last_activity = now;

    if self.current + 1 < self.quiz.questions.len() {
      self.current += 1;
      Advance::NextQuestion(self.current)
    } else {
      self.finished = true;
      info!(target: "session", session_id = %self.id, score = self.score, total = self.question_count(), "Attempt finished");
      Advance::Finished
    }
  }

  /// Same transition as `advance`, named for the "skip" action.
  pub fn skip(&mut self) -> Advance {
    self.advance()
  }

  /// One wall-clock second elapsed.
  pub fn tick(&mut self) -> Tick {
    if self.finished || self.revealed {
      return Tick::Idle;
    }
    self.time_left = self.time_left.saturating_sub(1);
    if self.time_left > 0 {
      return Tick::Counting(self.time_left);
    }
    let question_index = self.current;
    debug!(target: "session", session_id = %self.id, question = question_index, "Question timed out");
    Tick::Expired { question_index, advance: self.advance() }
  }

  /// Close the attempt and hand back what scoring needs. Unanswered
  /// questions earn nothing. Fails once the result has been recorded.
  pub fn finish(&mut self) -> Result<AttemptSummary, AppError> {
    if self.recorded {
      return Err(AppError::AlreadyFinished);
    }
    self.finished = true;
    Ok(AttemptSummary {
      quiz_id: self.quiz.id.clone(),
      quiz_title: self.quiz.title.clone(),
      category: self.quiz.category.clone(),
      score: self.score,
      total_questions: self.quiz.questions.len(),
      time_spent_secs: self.started_at.elapsed().as_secs(),
    })
  }

  /// Called once the result is persisted; later `finish` calls fail.
  pub fn mark_recorded(&mut self) {
    self.recorded = true;
  }
}
