//! One learner's assessment session: maps client events, deadline expiries and
//! grading completions onto the `FlowEngine` and produces outgoing frames.
//!
//! The session never awaits. Grading work is handed back to the caller as a
//! `PendingGrade` and its result comes back through `on_graded`.

use std::{sync::Arc, time::Duration};

use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Catalog, PresentationMode};
use crate::error::AssessError;
use crate::flow::{DeadlineTicket, FlowEngine, GradeOutcome, GradeTicket, PendingGrade, Phase, TimeoutAction};
use crate::protocol::{to_question_out, ClientWsMessage, ServerWsMessage};

/// Frames to send plus at most one grading call to start.
#[derive(Debug, Default)]
pub struct Effects {
  pub replies: Vec<ServerWsMessage>,
  pub grade: Option<PendingGrade>,
}

impl Effects {
  pub fn reply(msg: ServerWsMessage) -> Self {
    Self { replies: vec![msg], grade: None }
  }

  fn error(e: &AssessError) -> Self {
    Self::reply(ServerWsMessage::Error { code: e.code().into(), message: e.user_message() })
  }
}

pub struct Session {
  id: Uuid,
  engine: FlowEngine,
  time_limit: Duration,
  deadline: Option<(Instant, DeadlineTicket)>,
}

impl Session {
  pub fn new(catalog: Arc<Catalog>, time_limit: Duration) -> Self {
    Self { id: Uuid::new_v4(), engine: FlowEngine::new(catalog), time_limit, deadline: None }
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  #[cfg(test)]
  pub fn engine(&self) -> &FlowEngine {
    &self.engine
  }

  /// When the current question's deadline passes, if armed.
  pub fn deadline(&self) -> Option<Instant> {
    self.deadline.map(|(at, _)| at)
  }

  pub fn handle(&mut self, msg: ClientWsMessage) -> Effects {
    debug!(target: "flow", session = %self.id, phase = ?self.engine.phase(), position = ?self.engine.position(), ?msg, "Client event");
    match self.dispatch(msg) {
      Ok(effects) => effects,
      Err(e) => {
        warn!(target: "flow", session = %self.id, code = e.code(), error = %e, "Client event rejected");
        Effects::error(&e)
      }
    }
  }

  fn dispatch(&mut self, msg: ClientWsMessage) -> Result<Effects, AssessError> {
    match msg {
      ClientWsMessage::Ping => Ok(Effects::reply(ServerWsMessage::Pong)),
      ClientWsMessage::Start => {
        self.engine.start()?;
        info!(
          target: "flow",
          session = %self.id,
          sections = self.engine.catalog().sections().len(),
          total = self.engine.total_questions(),
          "Session started"
        );
        self.present(true)
      }
      ClientWsMessage::Current => self.present(false),
      ClientWsMessage::JumpTo { section, question } => {
        self.engine.jump_to(section, question)?;
        self.present(true)
      }
      ClientWsMessage::Advance => match self.engine.advance()? {
        Phase::Finished => {
          self.deadline = None;
          info!(target: "flow", session = %self.id, "Session finished");
          Ok(Effects::reply(ServerWsMessage::Finished { report: self.engine.report() }))
        }
        _ => self.present(true),
      },
      ClientWsMessage::Draft { text } => {
        self.engine.update_draft(&text)?;
        Ok(Effects::default())
      }
      ClientWsMessage::Submit { text } | ClientWsMessage::Transcript { text } => {
        let pending = self.engine.submit(&text)?;
        Ok(self.grading(pending))
      }
      ClientWsMessage::CaptureError { code } => Err(AssessError::Capture { code }),
      ClientWsMessage::Palette => Ok(Effects::reply(ServerWsMessage::Palette { palette: self.engine.palette() })),
      ClientWsMessage::Report => Ok(Effects::reply(ServerWsMessage::Report { report: self.engine.report() })),
    }
  }

  /// Render the current question; `arm` restarts its deadline.
  fn present(&mut self, arm: bool) -> Result<Effects, AssessError> {
    let (mode, global) = {
      let cur = self.engine.current_question()?;
      (cur.mode, cur.global_index)
    };
    let answered = self.engine.responses().get(global).map_or(false, |r| r.completed);
    if arm {
      self.deadline = None;
      // Revisiting an answered question must not let a timeout overwrite it.
      if mode != PresentationMode::Passage && !answered {
        let ticket = self.engine.arm_deadline()?;
        self.deadline = Some((Instant::now() + self.time_limit, ticket));
      }
    }
    let cur = self.engine.current_question()?;
    let question = to_question_out(
      &cur,
      self.time_limit.as_secs(),
      self.engine.is_grading(),
      self.engine.responses().get(global),
    );
    Ok(Effects::reply(ServerWsMessage::Question { question, palette: self.engine.palette() }))
  }

  fn grading(&self, pending: PendingGrade) -> Effects {
    Effects {
      replies: vec![ServerWsMessage::Grading { global_index: pending.ticket.global_index() }],
      grade: Some(pending),
    }
  }

  pub fn on_deadline(&mut self) -> Effects {
    let Some((_, ticket)) = self.deadline.take() else {
      return Effects::default();
    };
    debug!(target: "flow", session = %self.id, position = ?ticket.position(), "Deadline expired");
    match self.engine.time_expired(ticket) {
      Ok(TimeoutAction::CancelCapture) => Effects::reply(ServerWsMessage::CancelCapture),
      Ok(TimeoutAction::Submit(pending)) => self.grading(pending),
      Ok(TimeoutAction::Stale) | Ok(TimeoutAction::Ignored) => Effects::default(),
      Err(e) => Effects::error(&e),
    }
  }

  pub fn on_graded(&mut self, ticket: GradeTicket, result: Result<String, AssessError>) -> Effects {
    match self.engine.complete_grading(&ticket, result) {
      Ok(GradeOutcome::Applied(record)) => {
        self.deadline = None;
        Effects {
          replies: vec![
            ServerWsMessage::Feedback {
              global_index: ticket.global_index(),
              user_response: record.user_response,
              feedback: record.feedback,
            },
            ServerWsMessage::Palette { palette: self.engine.palette() },
          ],
          grade: None,
        }
      }
      Ok(GradeOutcome::Stale) => {
        debug!(target: "flow", session = %self.id, position = ?ticket.position(), "Late feedback ignored");
        Effects::default()
      }
      Err(e) => {
        warn!(target: "flow", session = %self.id, error = %e, "Grading failed");
        Effects::error(&e)
      }
    }
  }
}
