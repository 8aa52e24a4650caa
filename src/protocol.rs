//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Question, Quiz, QuizSource};
use crate::rank::{LeaderboardEntry, LeaderboardRange, RankChange};
use crate::session::QuizSession;
use crate::state::FinishOutcome;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    StartQuiz {
        #[serde(rename = "quizId")]
        quiz_id: String,
        #[serde(rename = "userId")]
        user_id: String,
    },
    SelectOption {
        option: usize,
    },
    Next,
    Skip,
    Finish,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        session: SessionOut,
    },
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
    Result {
        result: ResultOut,
    },
    Error {
        message: String,
    },
}

// ---------- HTTP DTOs ----------

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub quizzes: usize,
    #[serde(rename = "liveSessions")]
    pub live_sessions: usize,
    #[serde(rename = "generationEnabled")]
    pub generation_enabled: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct QuizListQuery {
    pub category: Option<String>,
    pub difficulty: Option<String>,
}

/// Listing view: everything but the questions.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummaryOut {
    pub id: String,
    pub title: String,
    pub category: String,
    pub difficulty: String,
    pub description: String,
    pub question_count: usize,
    pub time_estimate: String,
    pub source: QuizSource,
}

impl From<&Quiz> for QuizSummaryOut {
    fn from(q: &Quiz) -> Self {
        Self {
            id: q.id.clone(),
            title: q.title.clone(),
            category: q.category.clone(),
            difficulty: q.difficulty.clone(),
            description: q.description.clone(),
            question_count: q.questions.len(),
            time_estimate: q.time_estimate.clone(),
            source: q.source,
        }
    }
}

/// Manual quiz entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizIn {
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub description: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartIn {
    pub quiz_id: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectIn {
    pub option: usize,
}

/// Question as shown to the player. The answer is only included once revealed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOut {
    pub question_text: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_option: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub session_id: String,
    pub quiz_id: String,
    pub quiz_title: String,
    pub user_id: String,
    pub question_index: usize,
    pub question_count: usize,
    pub question: Option<QuestionOut>,
    pub selected_option: Option<usize>,
    pub revealed: bool,
    pub score: usize,
    pub time_left: u32,
    pub finished: bool,
}

pub fn session_out(s: &QuizSession) -> SessionOut {
    let question = s.current_question().map(|q| QuestionOut {
        question_text: q.question_text.clone(),
        options: q.options.clone(),
        correct_option: s.is_revealed().then_some(q.correct_option),
    });
    SessionOut {
        session_id: s.id.clone(),
        quiz_id: s.quiz().id.clone(),
        quiz_title: s.quiz().title.clone(),
        user_id: s.user_id.clone(),
        question_index: s.current_index(),
        question_count: s.question_count(),
        question,
        selected_option: s.selected(),
        revealed: s.is_revealed(),
        score: s.score(),
        time_left: s.time_left(),
        finished: s.is_finished(),
    }
}

#[derive(Debug, Serialize)]
pub struct SelectOut {
    /// None when the selection was ignored (already revealed or finished).
    pub correct: Option<bool>,
    pub session: SessionOut,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultOut {
    pub score: usize,
    pub total_questions: usize,
    pub percentage: u32,
    pub xp_earned: u64,
    #[serde(rename = "totalXP")]
    pub total_xp: u64,
    pub level: u64,
    pub new_badges: Vec<String>,
    pub badges: Vec<String>,
    pub rank: Option<u32>,
    pub previous_rank: Option<u32>,
    pub rank_change: Option<RankChange>,
}

impl From<&FinishOutcome> for ResultOut {
    fn from(o: &FinishOutcome) -> Self {
        Self {
            score: o.summary.score,
            total_questions: o.summary.total_questions,
            percentage: o.gain.percentage,
            xp_earned: o.gain.xp_earned,
            total_xp: o.profile.total_xp,
            level: o.profile.level,
            new_badges: o.gain.new_badges.clone(),
            badges: o.profile.badges.clone(),
            rank: o.rank.as_ref().map(|r| r.rank),
            previous_rank: o.rank.as_ref().map(|r| r.previous_rank),
            rank_change: o.rank.as_ref().map(|r| r.change),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub range: LeaderboardRange,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardOut {
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Serialize)]
pub struct RankRefreshOut {
    pub updated: usize,
    /// Users left with a stale rank.
    pub failed: Vec<String>,
}

/// Reply of the PDF generator endpoint.
#[derive(Debug, Serialize)]
pub struct GenerateOut {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz: Option<Quiz>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerateOut {
    pub fn ok(quiz: Quiz) -> Self {
        Self { success: true, quiz: Some(quiz), error: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { success: false, quiz: None, error: Some(message.into()) }
    }
}
