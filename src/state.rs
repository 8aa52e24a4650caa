//! Application state: document store, live sessions, model client and settings.
//!
//! This module owns:
//!   - the document store (quizzes + user profiles)
//!   - live quiz sessions, each with its own countdown task
//!   - the optional model client and its prompts
//!   - the generation rate limiter
//!
//! Handlers receive it as `Arc<AppState>`; nothing here is global.

use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
  sync::{broadcast, RwLock},
  task::JoinHandle,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{load_config_from_env, AppConfig, GeneratorSettings, Prompts, QuizCfg, SessionSettings};
use crate::domain::{time_estimate_for, Quiz, QuizSource, UserProfile};
use crate::error::AppError;
use crate::openai::OpenAI;
use crate::protocol::QuizIn;
use crate::rank::{update_user_rank, RankUpdate};
use crate::ratelimit::RateLimiter;
use crate::scoring::{record_attempt, AttemptGain};
use crate::seeds::seed_quizzes;
use crate::session::{AttemptSummary, QuizSession};
use crate::store::DocumentStore;
use crate::timer::{LiveSession, SessionEvent, SharedSession};

/// Everything the caller learns when an attempt is finished.
#[derive(Debug, Clone)]
pub struct FinishOutcome {
  pub summary: AttemptSummary,
  pub profile: UserProfile,
  pub gain: AttemptGain,
  pub rank: Option<RankUpdate>,
}

type SessionMap = RwLock<HashMap<String, LiveSession>>;

pub struct AppState {
  pub store: DocumentStore,
  pub sessions: Arc<SessionMap>,
  pub openai: Option<OpenAI>,
  pub prompts: Prompts,
  pub session_settings: SessionSettings,
  pub generator: GeneratorSettings,
  pub upload_dir: PathBuf,
  pub generate_limiter: RateLimiter,
}

/// Drop live sessions with no state change for at least `ttl`. Sessions held
/// by a request in flight are left for the next pass.
async fn sweep_idle(sessions: &SessionMap, ttl: Duration) -> usize {
  let mut map = sessions.write().await;
  let before = map.len();
  map.retain(|_, live| !live.session.try_lock().map_or(false, |s| s.idle_for() >= ttl));
  before - map.len()
}

/// Periodic idle sweep. Stops once the session map itself is gone.
fn spawn_idle_sweep(sessions: &Arc<SessionMap>, settings: &SessionSettings) -> JoinHandle<()> {
  let sessions = Arc::downgrade(sessions);
  let ttl = Duration::from_secs(settings.idle_ttl_secs);
  let every = Duration::from_secs(settings.sweep_interval_secs.max(1));
  tokio::spawn(async move {
    let mut interval = tokio::time::interval(every);
    // First tick fires immediately.
    interval.tick().await;
    loop {
      interval.tick().await;
      let Some(sessions) = sessions.upgrade() else { break };
      let removed = sweep_idle(&sessions, ttl).await;
      if removed > 0 {
        info!(target: "session", removed, idle_ttl = ?ttl, "Idle sessions dropped");
      }
    }
  })
}

fn quiz_from_cfg(cc: &QuizCfg) -> Quiz {
  Quiz {
    id: cc.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
    title: cc.title.clone(),
    category: cc.category.clone(),
    difficulty: cc.difficulty.clone(),
    description: cc.description.clone(),
    time_estimate: cc.time_estimate.clone().unwrap_or_else(|| time_estimate_for(cc.questions.len())),
    questions: cc.questions.clone(),
    source: QuizSource::LocalBank,
    created_at: None,
  }
}

impl AppState {
  /// Build state from env: load config, seed quizzes, init the model client.
  #[instrument(level = "info", skip_all)]
  pub async fn from_env() -> Self {
    let cfg = load_config_from_env().unwrap_or_default();
    let upload_dir = std::env::var("UPLOAD_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("uploads"));

    let openai = OpenAI::from_env();
    if let Some(oa) = &openai {
      info!(target: "quizforge", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, timeout = ?oa.timeout, "Model client enabled.");
    } else {
      warn!(target: "quizforge", "OPENAI_API_KEY not set; PDF quiz generation disabled.");
    }

    Self::with_config(cfg, openai, upload_dir).await
  }

  /// Build state from an explicit config (also used by tests).
  pub async fn with_config(cfg: AppConfig, openai: Option<OpenAI>, upload_dir: PathBuf) -> Self {
    let store = DocumentStore::new();

    // Config bank first, then built-in seeds without overwriting ids.
    for cc in &cfg.quizzes {
      let quiz = quiz_from_cfg(cc);
      if let Err(e) = quiz.validate(1, usize::MAX) {
        error!(target: "quizforge", id = %quiz.id, title = %quiz.title, error = %e, "Skipping bank quiz");
        continue;
      }
      store.insert_quiz_if_absent(quiz).await;
    }
    for quiz in seed_quizzes() {
      store.insert_quiz_if_absent(quiz).await;
    }

    // Inventory summary by source.
    let mut by_source: HashMap<QuizSource, usize> = HashMap::new();
    for q in store.list_quizzes(&Default::default()).await {
      *by_source.entry(q.source).or_default() += 1;
    }
    for (source, count) in by_source {
      info!(target: "quizforge", ?source, count, "Startup quiz inventory");
    }

    let generate_limiter = RateLimiter::new(cfg.generator.rate_limit_per_minute, Duration::from_secs(60));
    let sessions = Arc::new(RwLock::new(HashMap::new()));
    spawn_idle_sweep(&sessions, &cfg.session);

    Self {
      store,
      sessions,
      openai,
      prompts: cfg.prompts,
      session_settings: cfg.session,
      generator: cfg.generator,
      upload_dir,
      generate_limiter,
    }
  }

  /// Load the quiz and open a live attempt with its countdown running.
  #[instrument(level = "info", skip(self))]
  pub async fn start_session(&self, quiz_id: &str, user_id: &str) -> Result<SharedSession, AppError> {
    if user_id.trim().is_empty() {
      return Err(AppError::BadRequest("userId is required".into()));
    }
    let quiz = self
      .store
      .get_quiz(quiz_id)
      .await
      .ok_or_else(|| AppError::NotFound(format!("quiz {}", quiz_id)))?;

    let id = Uuid::new_v4().to_string();
    let session = QuizSession::start(id.clone(), user_id.to_string(), quiz, self.session_settings.question_seconds)?;
    let live = LiveSession::start(session);
    let shared = live.session.clone();
    self.sessions.write().await.insert(id, live);
    Ok(shared)
  }

  pub async fn get_session(&self, id: &str) -> Result<SharedSession, AppError> {
    self
      .sessions
      .read()
      .await
      .get(id)
      .map(|live| live.session.clone())
      .ok_or_else(|| AppError::NotFound(format!("session {}", id)))
  }

  pub async fn subscribe(&self, id: &str) -> Result<broadcast::Receiver<SessionEvent>, AppError> {
    self
      .sessions
      .read()
      .await
      .get(id)
      .map(LiveSession::subscribe)
      .ok_or_else(|| AppError::NotFound(format!("session {}", id)))
  }

  /// Drop an attempt without recording anything.
  #[instrument(level = "info", skip(self))]
  pub async fn abandon_session(&self, id: &str) -> Result<(), AppError> {
    match self.sessions.write().await.remove(id) {
      Some(_) => {
        info!(target: "session", session_id = %id, "Attempt abandoned");
        Ok(())
      }
      None => Err(AppError::NotFound(format!("session {}", id))),
    }
  }

  /// Close the attempt, persist XP/badges and refresh the user's rank.
  ///
  /// The session lock is held until the profile write lands, so concurrent
  /// finishes of the same attempt record it once. A failed rank refresh is
  /// logged; the recorded score stands.
  #[instrument(level = "info", skip(self))]
  pub async fn finish_session(&self, id: &str) -> Result<FinishOutcome, AppError> {
    let shared = self.get_session(id).await?;
    let mut session = shared.lock().await;
    let summary = session.finish()?;
    let user_id = session.user_id.clone();
    let retries = self.session_settings.write_retries;

    let (profile, gain) = match record_attempt(&self.store, &user_id, &summary, retries).await {
      Ok(v) => v,
      Err(e) => {
        error!(target: "scoring", session_id = %id, %user_id, error = %e, "Failed to record attempt");
        return Err(e);
      }
    };
    session.mark_recorded();
    drop(session);

    let rank = match update_user_rank(&self.store, &user_id, retries).await {
      Ok(r) => r,
      Err(e) => {
        error!(target: "rank", %user_id, error = %e, "Rank update failed after scoring");
        None
      }
    };
    // Re-read so the returned profile carries the fresh rank.
    let profile = self.store.get_user(&user_id).await.unwrap_or(profile);

    self.sessions.write().await.remove(id);
    info!(target: "session", session_id = %id, %user_id, score = summary.score, xp = gain.xp_earned, at = %Utc::now(), "Attempt closed");
    Ok(FinishOutcome { summary, profile, gain, rank })
  }

  /// Store a manually entered quiz under a fresh id.
  #[instrument(level = "info", skip(self, input), fields(title = %input.title, questions = input.questions.len()))]
  pub async fn create_quiz(&self, input: QuizIn) -> Result<Quiz, AppError> {
    let quiz = Quiz {
      id: Uuid::new_v4().to_string(),
      title: input.title.trim().to_string(),
      category: input.category.trim().to_string(),
      difficulty: input.difficulty.trim().to_lowercase(),
      description: input.description.trim().to_string(),
      time_estimate: time_estimate_for(input.questions.len()),
      questions: input.questions,
      source: QuizSource::Manual,
      created_at: Some(Utc::now()),
    };
    quiz.validate(1, usize::MAX)?;
    self.store.insert_quiz(quiz.clone()).await?;
    info!(target: "quizforge", id = %quiz.id, "Quiz created");
    Ok(quiz)
  }

  /// Profile for display; users without a document get the baseline.
  pub async fn profile_or_default(&self, user_id: &str) -> UserProfile {
    self.store.get_user(user_id).await.unwrap_or_else(UserProfile::baseline)
  }
}
