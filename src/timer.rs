//! Per-session countdown task.
//!
//! Each live session owns exactly one ticker, started with the session and
//! aborted when the `LiveSession` is dropped (finish, abandon or idle sweep).
//! Ticks are scheduled from the moment the current question was shown, so a
//! question reached by a manual advance gets its full budget instead of the
//! remainder of the previous question's second.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{
  sync::{broadcast, Mutex},
  task::JoinHandle,
  time::sleep_until,
};
use tracing::{debug, instrument};

use crate::session::{Advance, QuizSession, Tick};

pub type SharedSession = Arc<Mutex<QuizSession>>;

/// Pushed to WebSocket subscribers as the clock runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
  Tick {
    #[serde(rename = "questionIndex")]
    question_index: usize,
    #[serde(rename = "timeLeft")]
    time_left: u32,
  },
  TimeExpired {
    #[serde(rename = "questionIndex")]
    question_index: usize,
    finished: bool,
  },
}

pub struct LiveSession {
  pub session: SharedSession,
  events: broadcast::Sender<SessionEvent>,
  countdown: JoinHandle<()>,
}

impl LiveSession {
  pub fn start(session: QuizSession) -> Self {
    let session = Arc::new(Mutex::new(session));
    let (events, _) = broadcast::channel(32);
    let countdown = spawn_countdown(session.clone(), events.clone());
    Self { session, events, countdown }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
    self.events.subscribe()
  }
}

impl Drop for LiveSession {
  fn drop(&mut self) {
    self.countdown.abort();
  }
}

const SECOND: Duration = Duration::from_secs(1);

#[instrument(level = "debug", skip_all)]
fn spawn_countdown(session: SharedSession, events: broadcast::Sender<SessionEvent>) -> JoinHandle<()> {
  tokio::spawn(async move {
    let (mut question, mut next) = {
      let s = session.lock().await;
      (s.current_index(), s.question_started_at() + SECOND)
    };

    loop {
      sleep_until(next).await;
      let mut s = session.lock().await;
      if s.is_finished() {
        debug!(target: "session", session_id = %s.id, "Countdown stopped");
        break;
      }
      // Moved on since the last tick: rephase to the new question's start.
      if s.current_index() != question {
        question = s.current_index();
        next = s.question_started_at() + SECOND;
        continue;
      }

      let tick = s.tick();
      let finished = s.is_finished();
      if s.current_index() != question {
        question = s.current_index();
        next = s.question_started_at() + SECOND;
      } else {
        next += SECOND;
      }
      drop(s);

      // Send errors only mean nobody is listening.
      match tick {
        Tick::Counting(time_left) => {
          let _ = events.send(SessionEvent::Tick { question_index: question, time_left });
        }
        Tick::Expired { question_index, advance } => {
          let _ = events.send(SessionEvent::TimeExpired {
            question_index,
            finished: advance == Advance::Finished,
          });
        }
        Tick::Idle => {}
      }

      if finished {
        break;
      }
    }
  })
}
