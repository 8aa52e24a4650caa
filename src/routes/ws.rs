//! WebSocket upgrade + message loop. A connection drives at most one attempt
//! at a time: client messages are parsed as JSON and applied to it, and the
//! attempt's countdown events are pushed as they happen.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, instrument, warn};

use crate::error::AppError;
use crate::protocol::{session_out, ClientWsMessage, ResultOut, ServerWsMessage};
use crate::state::AppState;
use crate::timer::SessionEvent;

/// The attempt bound to one connection.
struct Attached {
  session_id: String,
  events: broadcast::Receiver<SessionEvent>,
}

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "quizforge", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn next_event(attached: &mut Option<Attached>) -> Result<SessionEvent, RecvError> {
  match attached {
    Some(a) => a.events.recv().await,
    None => std::future::pending().await,
  }
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> bool {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  match socket.send(Message::Text(out)).await {
    Ok(()) => true,
    Err(e) => {
      error!(target: "quizforge", error = %e, "WS send error");
      false
    }
  }
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "quizforge", "WebSocket connected");
  let mut attached: Option<Attached> = None;

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => {
            let reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
              Ok(incoming) => {
                debug!(target: "quizforge", "WS received: {:?}", &incoming);
                handle_client_ws(incoming, &state, &mut attached).await
              }
              Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
            };
            if !send(&mut socket, &reply).await {
              break;
            }
          }
          Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }

      event = next_event(&mut attached) => {
        let forwarded = match event {
          Ok(SessionEvent::Tick { question_index, time_left }) => {
            send(&mut socket, &ServerWsMessage::Tick { question_index, time_left }).await
          }
          Ok(SessionEvent::TimeExpired { question_index, finished }) => {
            // Follow the expiry with a snapshot of the question it advanced to.
            let snapshot = match &attached {
              Some(a) => state.get_session(&a.session_id).await.ok(),
              None => None,
            };
            let mut ok = send(&mut socket, &ServerWsMessage::TimeExpired { question_index, finished }).await;
            if let (true, Some(shared)) = (ok, snapshot) {
              let session = session_out(&*shared.lock().await);
              ok = send(&mut socket, &ServerWsMessage::Session { session }).await;
            }
            ok
          }
          Err(RecvError::Lagged(skipped)) => {
            warn!(target: "quizforge", skipped, "WS subscriber lagged behind countdown");
            true
          }
          Err(RecvError::Closed) => {
            attached = None;
            true
          }
        };
        if !forwarded {
          break;
        }
      }
    }
  }

  // An attempt left open by a dropped connection is abandoned.
  if let Some(a) = attached {
    let _ = state.abandon_session(&a.session_id).await;
  }
  info!(target: "quizforge", "WebSocket disconnected");
}

fn attached_id(attached: &Option<Attached>) -> Result<&str, AppError> {
  attached
    .as_ref()
    .map(|a| a.session_id.as_str())
    .ok_or_else(|| AppError::BadRequest("no quiz in progress; send start_quiz first".into()))
}

#[instrument(level = "info", skip(state, attached))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState, attached: &mut Option<Attached>) -> ServerWsMessage {
  match apply_client_ws(msg, state, attached).await {
    Ok(reply) => reply,
    Err(e) => ServerWsMessage::Error { message: e.to_string() },
  }
}

async fn apply_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  attached: &mut Option<Attached>,
) -> Result<ServerWsMessage, AppError> {
  match msg {
    ClientWsMessage::Ping => Ok(ServerWsMessage::Pong),

    ClientWsMessage::StartQuiz { quiz_id, user_id } => {
      let shared = state.start_session(&quiz_id, &user_id).await?;
      let session_id = shared.lock().await.id.clone();
      let events = state.subscribe(&session_id).await?;
      if let Some(previous) = attached.replace(Attached { session_id, events }) {
        let _ = state.abandon_session(&previous.session_id).await;
      }
      let session = session_out(&*shared.lock().await);
      tracing::info!(target: "session", session_id = %session.session_id, %quiz_id, "WS start_quiz served");
      Ok(ServerWsMessage::Session { session })
    }

    ClientWsMessage::SelectOption { option } => {
      let shared = state.get_session(attached_id(attached)?).await?;
      let mut s = shared.lock().await;
      s.select_option(option)?;
      Ok(ServerWsMessage::Session { session: session_out(&s) })
    }

    ClientWsMessage::Next => {
      let shared = state.get_session(attached_id(attached)?).await?;
      let mut s = shared.lock().await;
      s.advance();
      Ok(ServerWsMessage::Session { session: session_out(&s) })
    }

    ClientWsMessage::Skip => {
      let shared = state.get_session(attached_id(attached)?).await?;
      let mut s = shared.lock().await;
      s.skip();
      Ok(ServerWsMessage::Session { session: session_out(&s) })
    }

    ClientWsMessage::Finish => {
      let outcome = state.finish_session(attached_id(attached)?).await?;
      *attached = None;
      Ok(ServerWsMessage::Result { result: ResultOut::from(&outcome) })
    }
  }
}
