//! WebSocket upgrade + session loop. Each connection owns one `Session`; the
//! loop handles one event at a time: a client frame, the question deadline, or
//! a finished grading call.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::error::AssessError;
use crate::flow::GradeTicket;
use crate::grader::Grader;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::session::{Effects, Session};
use crate::state::AppState;

type GradeResult = (GradeTicket, Result<String, AssessError>);

/// Frame source and sink for one session. `recv` yields `None` once the peer is gone.
#[async_trait]
pub trait Transport: Send {
  async fn recv(&mut self) -> Option<Result<ClientWsMessage, String>>;
  async fn send(&mut self, msg: &ServerWsMessage) -> Result<(), String>;
}

#[async_trait]
impl Transport for WebSocket {
  async fn recv(&mut self) -> Option<Result<ClientWsMessage, String>> {
    loop {
      match WebSocket::recv(self).await? {
        Ok(Message::Text(txt)) => {
          return Some(serde_json::from_str::<ClientWsMessage>(&txt).map_err(|e| format!("Invalid JSON: {}", e)));
        }
        Ok(Message::Ping(payload)) => {
          if WebSocket::send(self, Message::Pong(payload)).await.is_err() {
            return None;
          }
        }
        Ok(Message::Close(_)) => return None,
        Ok(_) => continue,
        Err(e) => {
          warn!(target: "assess_backend", error = %e, "WS receive error");
          return None;
        }
      }
    }
  }

  async fn send(&mut self, msg: &ServerWsMessage) -> Result<(), String> {
    let out = serde_json::to_string(msg).unwrap_or_else(|e| {
      serde_json::json!({ "type": "error", "code": "internal", "message": format!("Serialization error: {}", e) }).to_string()
    });
    WebSocket::send(self, Message::Text(out)).await.map_err(|e| e.to_string())
  }
}

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "assess_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn sleep_until_opt(deadline: Option<Instant>) {
  match deadline {
    Some(at) => tokio::time::sleep_until(at).await,
    None => std::future::pending::<()>().await,
  }
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  let mut session = Session::new(state.catalog.clone(), state.time_limit);
  info!(target: "assess_backend", session = %session.id(), "WebSocket connected");
  run_session(&mut socket, &mut session, state.grader.clone()).await;
  info!(target: "assess_backend", session = %session.id(), "WebSocket disconnected");
}

/// Drive `session` until the transport closes or a send fails.
pub async fn run_session<T: Transport>(transport: &mut T, session: &mut Session, grader: Arc<dyn Grader>) {
  let (tx, mut rx) = mpsc::unbounded_channel::<GradeResult>();

  loop {
    let deadline = session.deadline();
    let effects = tokio::select! {
      incoming = transport.recv() => match incoming {
        Some(Ok(msg)) => session.handle(msg),
        Some(Err(message)) => Effects::reply(ServerWsMessage::Error { code: "bad_request".into(), message }),
        None => break,
      },
      _ = sleep_until_opt(deadline) => {
        debug!(target: "flow", session = %session.id(), "Question deadline reached");
        session.on_deadline()
      }
      Some((ticket, result)) = rx.recv() => session.on_graded(ticket, result),
    };

    if let Some(pending) = effects.grade {
      let grader = grader.clone();
      let tx = tx.clone();
      tokio::spawn(async move {
        let result = grader.grade(&pending.request).await;
        // Receiver gone means the learner disconnected; the result is moot.
        let _ = tx.send((pending.ticket, result));
      });
    }

    for reply in &effects.replies {
      if let Err(e) = transport.send(reply).await {
        error!(target: "assess_backend", session = %session.id(), error = %e, "WS send error");
        return;
      }
    }
  }
}
