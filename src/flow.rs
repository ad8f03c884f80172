//! Question-flow engine.
//!
//! Owns the position inside the catalog, the session phase and the response
//! store. It is driven by discrete events (navigation, submissions, timer
//! expiries, grading completions) handled one at a time by its owner.
//!
//! Two kinds of tickets guard against stale asynchronous work:
//!   - `DeadlineTicket`: issued by `arm_deadline`; any transition
//!     (`advance`, `jump_to`, `record_response`) bumps the deadline epoch so an
//!     old ticket can never touch the store.
//!   - `GradeTicket`: issued by `submit`; at most one is outstanding per
//!     question, and its result is applied only if the engine still sits on
//!     the ticket's position.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::domain::{Catalog, PresentationMode, Position, Question, Section};
use crate::error::AssessError;
use crate::grader::GradeRequest;
use crate::responses::{ResponseRecord, ResponseStore, NO_ANSWER};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  NotStarted,
  InProgress,
  Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeadlineTicket {
  epoch: u64,
  position: Position,
}

impl DeadlineTicket {
  pub fn position(&self) -> Position {
    self.position
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GradeTicket {
  id: u64,
  position: Position,
  global_index: usize,
  user_response: String,
}

impl GradeTicket {
  pub fn position(&self) -> Position {
    self.position
  }

  pub fn global_index(&self) -> usize {
    self.global_index
  }
}

/// A submission waiting for the grader.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingGrade {
  pub ticket: GradeTicket,
  pub request: GradeRequest,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TimeoutAction {
  /// The ticket no longer targets the current question.
  Stale,
  /// Spoken question: the capture collaborator must stop listening.
  CancelCapture,
  /// Typed question: the partial input was submitted for grading.
  Submit(PendingGrade),
  /// Nothing to do (grading already outstanding, or nothing to answer).
  Ignored,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GradeOutcome {
  Applied(ResponseRecord),
  /// The engine has left the ticket's position; the result was dropped.
  Stale,
}

/// Read-only view of the question at the current position.
#[derive(Clone, Copy, Debug)]
pub struct CurrentQuestion<'a> {
  pub position: Position,
  pub global_index: usize,
  pub total: usize,
  pub section: &'a Section,
  pub question: &'a Question,
  pub mode: PresentationMode,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
  pub global_index: usize,
  pub position: Position,
  pub question: Question,
  pub record: ResponseRecord,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SectionReport {
  pub title: String,
  pub entries: Vec<ReportEntry>,
}

/// Total over the catalog: every question appears exactly once, in order.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
  pub sections: Vec<SectionReport>,
  pub completed: usize,
  pub total: usize,
}

#[cfg(test)]
impl Report {
  pub fn entries(&self) -> impl Iterator<Item = &ReportEntry> {
    self.sections.iter().flat_map(|s| s.entries.iter())
  }

  pub fn entry(&self, global_index: usize) -> Option<&ReportEntry> {
    self.entries().find(|e| e.global_index == global_index)
  }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaletteStatus {
  Current,
  Completed,
  Pending,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaletteEntry {
  pub position: Position,
  pub global_index: usize,
  pub status: PaletteStatus,
}

pub struct FlowEngine {
  catalog: Arc<Catalog>,
  phase: Phase,
  position: Position,
  responses: ResponseStore,
  deadline_epoch: u64,
  deadline_armed: bool,
  next_ticket: u64,
  /// global index -> id of the outstanding grading ticket
  outstanding: HashMap<usize, u64>,
  draft: String,
}

impl FlowEngine {
  pub fn new(catalog: Arc<Catalog>) -> Self {
    Self {
      catalog,
      phase: Phase::NotStarted,
      position: Position::default(),
      responses: ResponseStore::default(),
      deadline_epoch: 0,
      deadline_armed: false,
      next_ticket: 0,
      outstanding: HashMap::new(),
      draft: String::new(),
    }
  }

  pub fn catalog(&self) -> &Catalog {
    &self.catalog
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn position(&self) -> Position {
    self.position
  }

  pub fn total_questions(&self) -> usize {
    self.catalog.total_questions()
  }

  pub fn responses(&self) -> &ResponseStore {
    &self.responses
  }

  fn require_in_progress(&self, op: &str) -> Result<(), AssessError> {
    match self.phase {
      Phase::InProgress => Ok(()),
      other => Err(AssessError::invalid_state(format!("{op} requires an assessment in progress (phase: {other:?})"))),
    }
  }

  fn current_global(&self) -> usize {
    // Position is kept within bounds by every transition.
    self.catalog.global_index(self.position).unwrap_or_default()
  }

  fn cancel_deadline(&mut self) {
    self.deadline_epoch += 1;
    self.deadline_armed = false;
  }

  fn leave_question(&mut self) {
    self.cancel_deadline();
    self.draft.clear();
  }

  #[instrument(level = "info", skip(self), fields(total = self.catalog.total_questions()))]
  pub fn start(&mut self) -> Result<(), AssessError> {
    if self.phase != Phase::NotStarted {
      return Err(AssessError::invalid_state(format!("start called twice (phase: {:?})", self.phase)));
    }
    self.responses = ResponseStore::for_catalog(&self.catalog);
    self.position = Position::default();
    self.outstanding.clear();
    self.leave_question();
    self.phase = Phase::InProgress;
    info!(target: "flow", "Assessment started");
    Ok(())
  }

  #[instrument(level = "debug", skip(self))]
  pub fn jump_to(&mut self, section: usize, question: usize) -> Result<(), AssessError> {
    self.require_in_progress("jump_to")?;
    let target = Position::new(section, question);
    if !self.catalog.contains(target) {
      return Err(AssessError::OutOfRange { section, question });
    }
    self.position = target;
    self.leave_question();
    debug!(target: "flow", section, question, "Jumped");
    Ok(())
  }

  /// Move to the next question; past the last one the session finishes.
  #[instrument(level = "debug", skip(self), fields(from = ?self.position))]
  pub fn advance(&mut self) -> Result<Phase, AssessError> {
    self.require_in_progress("advance")?;
    match self.catalog.next(self.position) {
      Some(next) => self.position = next,
      None => {
        self.phase = Phase::Finished;
        info!(target: "flow", completed = self.responses.completed_count(), total = self.responses.len(), "Assessment finished");
      }
    }
    self.leave_question();
    Ok(self.phase)
  }

  pub fn current_question(&self) -> Result<CurrentQuestion<'_>, AssessError> {
    self.require_in_progress("current_question")?;
    let section = self
      .catalog
      .section(self.position.section)
      .ok_or_else(|| AssessError::invalid_state("position outside catalog"))?;
    let question = section
      .questions
      .get(self.position.question)
      .ok_or_else(|| AssessError::invalid_state("position outside catalog"))?;
    Ok(CurrentQuestion {
      position: self.position,
      global_index: self.current_global(),
      total: self.catalog.total_questions(),
      section,
      question,
      mode: question.mode(),
    })
  }

  /// Write (or overwrite) the record of the current question. Does not advance.
  pub fn record_response(&mut self, user_response: &str, feedback: &str) -> Result<ResponseRecord, AssessError> {
    self.require_in_progress("record_response")?;
    let global = self.current_global();
    let prompt = self.current_question()?.question.prompt.clone();
    self.responses.complete(global, &prompt, user_response, feedback);
    self.cancel_deadline();
    debug!(target: "flow", global, "Response recorded");
    self
      .responses
      .get(global)
      .cloned()
      .ok_or_else(|| AssessError::invalid_state("response store smaller than catalog"))
  }

  /// Keep the learner's partial typed input; used when the deadline passes.
  pub fn update_draft(&mut self, text: &str) -> Result<(), AssessError> {
    self.require_in_progress("update_draft")?;
    self.draft.clear();
    self.draft.push_str(text);
    Ok(())
  }

  /// Start the per-question deadline. Earlier tickets become stale.
  pub fn arm_deadline(&mut self) -> Result<DeadlineTicket, AssessError> {
    self.require_in_progress("arm_deadline")?;
    self.cancel_deadline();
    self.deadline_armed = true;
    Ok(DeadlineTicket { epoch: self.deadline_epoch, position: self.position })
  }

  pub fn is_grading(&self) -> bool {
    self.phase == Phase::InProgress && self.outstanding.contains_key(&self.current_global())
  }

  /// Submit a learner response for grading.
  pub fn submit(&mut self, user_response: &str) -> Result<PendingGrade, AssessError> {
    self.require_in_progress("submit")?;
    let mode = self.current_question()?.mode;
    if !mode.captures_speech() && !mode.takes_text_input() {
      return Err(AssessError::invalid_state(format!("{mode:?} question takes no response")));
    }
    let answer = user_response.trim();
    if answer.is_empty() {
      return Err(AssessError::EmptyResponse);
    }
    self.begin_grading(answer.to_string())
  }

  fn begin_grading(&mut self, user_response: String) -> Result<PendingGrade, AssessError> {
    let global = self.current_global();
    if self.outstanding.contains_key(&global) {
      return Err(AssessError::invalid_state(format!("grading already in flight for question {global}")));
    }
    let current = self.current_question()?;
    let request = GradeRequest {
      channel: current.mode.channel(),
      prompt: current.question.prompt.clone(),
      user_response: user_response.clone(),
      section_title: Some(current.section.title.clone()),
      question_kind: Some(current.question.kind),
      mode: Some(current.mode),
      expected_answer: current.question.expected_answer.clone(),
    };
    let ticket = GradeTicket { id: self.next_ticket, position: self.position, global_index: global, user_response };
    self.next_ticket += 1;
    self.outstanding.insert(global, ticket.id);
    debug!(target: "flow", global, ticket = ticket.id, "Grading requested");
    Ok(PendingGrade { ticket, request })
  }

  /// Apply a grading result if its ticket still targets the current question.
  pub fn complete_grading(
    &mut self,
    ticket: &GradeTicket,
    result: Result<String, AssessError>,
  ) -> Result<GradeOutcome, AssessError> {
    if self.outstanding.get(&ticket.global_index) == Some(&ticket.id) {
      self.outstanding.remove(&ticket.global_index);
    }
    if self.phase != Phase::InProgress || self.position != ticket.position {
      debug!(target: "flow", global = ticket.global_index, ticket = ticket.id, "Dropping stale grading result");
      return Ok(GradeOutcome::Stale);
    }
    let feedback = result?;
    self.record_response(&ticket.user_response, &feedback).map(GradeOutcome::Applied)
  }

  /// Deadline elapsed without a response.
  #[instrument(level = "debug", skip(self), fields(position = ?ticket.position))]
  pub fn time_expired(&mut self, ticket: DeadlineTicket) -> Result<TimeoutAction, AssessError> {
    let live = self.phase == Phase::InProgress
      && self.deadline_armed
      && ticket.epoch == self.deadline_epoch
      && ticket.position == self.position;
    if !live {
      debug!(target: "flow", "Ignoring stale deadline");
      return Ok(TimeoutAction::Stale);
    }
    // A ticket fires once.
    self.cancel_deadline();

    let mode = self.current_question()?.mode;
    if mode.captures_speech() {
      info!(target: "flow", position = ?self.position, "Time up: cancelling capture");
      return Ok(TimeoutAction::CancelCapture);
    }
    if !mode.takes_text_input() || self.is_grading() {
      return Ok(TimeoutAction::Ignored);
    }
    let answer = match self.draft.trim() {
      "" => NO_ANSWER.to_string(),
      partial => partial.to_string(),
    };
    info!(target: "flow", position = ?self.position, no_answer = answer == NO_ANSWER, "Time up: submitting partial input");
    self.begin_grading(answer).map(TimeoutAction::Submit)
  }

  /// Paired (question, record) for the whole catalog; callable in any phase.
  pub fn report(&self) -> Report {
    let mut sections: Vec<SectionReport> = self
      .catalog
      .sections()
      .iter()
      .map(|s| SectionReport { title: s.title.clone(), entries: Vec::with_capacity(s.questions.len()) })
      .collect();
    for (position, global, _, question) in self.catalog.iter() {
      let record = self
        .responses
        .get(global)
        .cloned()
        .unwrap_or_else(|| ResponseRecord::empty(question.prompt.clone()));
      sections[position.section].entries.push(ReportEntry { global_index: global, position, question: question.clone(), record });
    }
    Report { sections, completed: self.responses.completed_count(), total: self.catalog.total_questions() }
  }

  pub fn palette(&self) -> Vec<PaletteEntry> {
    self
      .catalog
      .iter()
      .map(|(position, global, _, _)| {
        let status = if self.phase == Phase::InProgress && position == self.position {
          PaletteStatus::Current
        } else if self.responses.get(global).map_or(false, |r| r.completed) {
          PaletteStatus::Completed
        } else {
          PaletteStatus::Pending
        };
        PaletteEntry { position, global_index: global, status }
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Channel, QuestionKind};

  fn engine_for(sections: Vec<Section>) -> FlowEngine {
    FlowEngine::new(Arc::new(Catalog::new(sections).expect("catalog")))
  }

  fn text_then_choice() -> FlowEngine {
    engine_for(vec![Section::new("Grammar", vec![
      Question::new(QuestionKind::ShortText, "Say hello"),
      Question::new(QuestionKind::MultipleChoice, "Pick A").with_options(["A", "B"]).with_expected("A"),
    ])])
  }

  fn three_sections() -> FlowEngine {
    engine_for(vec![
      Section::new("Reading", vec![Question::new(QuestionKind::ReadAloud, "r1"), Question::new(QuestionKind::ReadAloud, "r2")]),
      Section::new("Speaking", vec![Question::new(QuestionKind::FreeSpeech, "s1")]),
      Section::new("Grammar", vec![
        Question::new(QuestionKind::ShortText, "g1"),
        Question::new(QuestionKind::WordReorder, "g2"),
        Question::new(QuestionKind::NarrativeIntro, "g3").with_passage("Once upon a time."),
      ]),
    ])
  }

  #[test]
  fn start_builds_one_empty_record_per_question() {
    let mut e = three_sections();
    e.start().expect("start");
    assert_eq!(e.responses().len(), e.total_questions());
    assert_eq!(e.responses().len(), 6);
    assert_eq!(e.responses().completed_count(), 0);
    assert_eq!(e.position(), Position::new(0, 0));
    assert!(matches!(e.start(), Err(AssessError::InvalidState(_))));
  }

  #[test]
  fn advancing_total_times_finishes_then_rejects() {
    let mut e = three_sections();
    e.start().expect("start");
    for i in 0..e.total_questions() {
      let phase = e.advance().expect("advance");
      let expected = if i + 1 == e.total_questions() { Phase::Finished } else { Phase::InProgress };
      assert_eq!(phase, expected);
    }
    assert!(matches!(e.advance(), Err(AssessError::InvalidState(_))));
    assert!(matches!(e.jump_to(0, 0), Err(AssessError::InvalidState(_))));
  }

  #[test]
  fn advance_before_start_is_invalid_state() {
    let mut e = three_sections();
    assert!(matches!(e.advance(), Err(AssessError::InvalidState(_))));
    assert!(matches!(e.current_question(), Err(AssessError::InvalidState(_))));
    assert!(matches!(e.record_response("x", "y"), Err(AssessError::InvalidState(_))));
  }

  #[test]
  fn jump_is_pure_navigation() {
    let mut e = three_sections();
    e.start().expect("start");
    e.record_response("r1 said", "fine").expect("record");
    let sections = e.catalog().sections().to_vec();
    for (s, section) in sections.iter().enumerate() {
      for (q, question) in section.questions.iter().enumerate() {
        e.jump_to(s, q).expect("jump");
        let cur = e.current_question().expect("current");
        assert_eq!(cur.question, question);
        assert_eq!(cur.position, Position::new(s, q));
      }
    }
    assert_eq!(e.responses().completed_count(), 1);
    assert!(e.responses().get(0).map_or(false, |r| r.completed));
  }

  #[test]
  fn out_of_range_jump_changes_nothing() {
    let mut e = three_sections();
    e.start().expect("start");
    e.advance().expect("advance");
    let before = e.position();
    assert_eq!(e.jump_to(5, 0), Err(AssessError::OutOfRange { section: 5, question: 0 }));
    assert_eq!(e.jump_to(1, 1), Err(AssessError::OutOfRange { section: 1, question: 1 }));
    assert_eq!(e.position(), before);
    assert_eq!(e.responses().completed_count(), 0);
    assert_eq!(e.responses().len(), 6);
  }

  #[test]
  fn record_then_overwrite_on_same_position() {
    let mut e = text_then_choice();
    e.start().expect("start");
    e.record_response("first", "meh").expect("record");
    let r = e.report();
    let entry = r.entry(0).expect("entry");
    assert!(entry.record.completed);
    assert_eq!(entry.record.feedback, "meh");

    e.record_response("second", "better").expect("record");
    let r = e.report();
    assert_eq!(r.completed, 1);
    assert_eq!(r.entry(0).map(|x| x.record.user_response.as_str()), Some("second"));
    assert_eq!(r.entries().count(), 2);
  }

  #[test]
  fn two_question_walkthrough() {
    let mut e = text_then_choice();
    e.start().expect("start");
    assert_eq!(e.position(), Position::new(0, 0));
    e.record_response("hello", "ok").expect("record");
    assert!(e.report().entry(0).map_or(false, |x| x.record.completed));
    e.advance().expect("advance");
    assert_eq!(e.position(), Position::new(0, 1));
    e.record_response("A", "correct").expect("record");
    assert_eq!(e.advance().expect("advance"), Phase::Finished);

    let report = e.report();
    let entries: Vec<&ReportEntry> = report.entries().collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].question.prompt, "Say hello");
    assert_eq!(entries[1].question.prompt, "Pick A");
    assert!(entries.iter().all(|x| x.record.completed));
    assert_eq!(entries[1].record.feedback, "correct");
  }

  #[test]
  fn report_is_total_even_when_incomplete() {
    let mut e = three_sections();
    let before = e.report();
    assert_eq!(before.entries().count(), 6);
    assert_eq!(before.entry(2).map(|x| x.record.prompt.as_str()), Some("s1"));

    e.start().expect("start");
    e.jump_to(2, 0).expect("jump");
    e.record_response("text", "good").expect("record");
    let r = e.report();
    assert_eq!(r.sections.len(), 3);
    assert_eq!(r.sections[2].title, "Grammar");
    let globals: Vec<usize> = r.entries().map(|x| x.global_index).collect();
    assert_eq!(globals, vec![0, 1, 2, 3, 4, 5]);
    assert!(r.entries().filter(|x| x.global_index != 3).all(|x| !x.record.completed && x.record.feedback.is_empty()));
  }

  #[test]
  fn timeout_after_advance_leaves_old_record_alone() {
    let mut e = text_then_choice();
    e.start().expect("start");
    e.update_draft("half an ans").expect("draft");
    let ticket = e.arm_deadline().expect("arm");
    e.advance().expect("advance");

    assert_eq!(e.time_expired(ticket).expect("expire"), TimeoutAction::Stale);
    assert!(!e.responses().get(0).map_or(true, |r| r.completed));
    assert!(!e.is_grading());
  }

  #[test]
  fn timeout_after_jump_back_is_still_stale() {
    let mut e = text_then_choice();
    e.start().expect("start");
    let ticket = e.arm_deadline().expect("arm");
    e.jump_to(0, 1).expect("jump");
    e.jump_to(0, 0).expect("jump back");
    assert_eq!(e.time_expired(ticket).expect("expire"), TimeoutAction::Stale);
  }

  #[test]
  fn timeout_on_text_question_submits_draft_once() {
    let mut e = text_then_choice();
    e.start().expect("start");
    e.update_draft("  hel ").expect("draft");
    let ticket = e.arm_deadline().expect("arm");

    let pending = match e.time_expired(ticket).expect("expire") {
      TimeoutAction::Submit(p) => p,
      other => panic!("expected submit, got {other:?}"),
    };
    assert_eq!(pending.request.user_response, "hel");
    assert_eq!(pending.request.channel, Channel::Text);
    assert!(e.is_grading());
    assert_eq!(e.time_expired(ticket).expect("expire"), TimeoutAction::Stale);

    let outcome = e.complete_grading(&pending.ticket, Ok("partial".into())).expect("complete");
    assert!(matches!(outcome, GradeOutcome::Applied(ref r) if r.user_response == "hel" && r.completed));
  }

  #[test]
  fn timeout_without_input_uses_no_answer_sentinel() {
    let mut e = text_then_choice();
    e.start().expect("start");
    e.advance().expect("advance");
    let ticket = e.arm_deadline().expect("arm");
    match e.time_expired(ticket).expect("expire") {
      TimeoutAction::Submit(p) => {
        assert_eq!(p.request.user_response, NO_ANSWER);
        assert_eq!(p.request.expected_answer.as_deref(), Some("A"));
      }
      other => panic!("expected submit, got {other:?}"),
    }
  }

  #[test]
  fn timeout_while_grading_does_not_double_submit() {
    let mut e = text_then_choice();
    e.start().expect("start");
    let ticket = e.arm_deadline().expect("arm");
    let _pending = e.submit("hello").expect("submit");
    assert_eq!(e.time_expired(ticket).expect("expire"), TimeoutAction::Ignored);
  }

  #[test]
  fn timeout_on_spoken_question_cancels_capture() {
    let mut e = three_sections();
    e.start().expect("start");
    let ticket = e.arm_deadline().expect("arm");
    assert_eq!(e.time_expired(ticket).expect("expire"), TimeoutAction::CancelCapture);
    assert_eq!(e.responses().completed_count(), 0);
  }

  #[test]
  fn timeout_on_passage_is_ignored() {
    let mut e = three_sections();
    e.start().expect("start");
    e.jump_to(2, 2).expect("jump");
    let ticket = e.arm_deadline().expect("arm");
    assert_eq!(e.time_expired(ticket).expect("expire"), TimeoutAction::Ignored);
  }

  #[test]
  fn passage_rejects_submissions() {
    let mut e = three_sections();
    e.start().expect("start");
    e.jump_to(2, 2).expect("jump");
    assert!(matches!(e.submit("I read it"), Err(AssessError::InvalidState(_))));
    assert!(!e.is_grading());
    assert_eq!(e.responses().completed_count(), 0);
    assert_eq!(e.palette()[5].status, PaletteStatus::Current);
  }

  #[test]
  fn recording_cancels_the_deadline() {
    let mut e = text_then_choice();
    e.start().expect("start");
    let ticket = e.arm_deadline().expect("arm");
    e.record_response("hello", "ok").expect("record");
    assert_eq!(e.time_expired(ticket).expect("expire"), TimeoutAction::Stale);
  }

  #[test]
  fn rearming_invalidates_previous_ticket() {
    let mut e = text_then_choice();
    e.start().expect("start");
    let old = e.arm_deadline().expect("arm");
    let new = e.arm_deadline().expect("arm");
    assert_eq!(e.time_expired(old).expect("expire"), TimeoutAction::Stale);
    assert!(matches!(e.time_expired(new).expect("expire"), TimeoutAction::Submit(_)));
  }

  #[test]
  fn one_outstanding_grade_per_question() {
    let mut e = text_then_choice();
    e.start().expect("start");
    assert_eq!(e.submit("   "), Err(AssessError::EmptyResponse));
    let pending = e.submit("hello").expect("submit");
    assert!(matches!(e.submit("again"), Err(AssessError::InvalidState(_))));

    // Another question may be graded meanwhile.
    e.advance().expect("advance");
    let other = e.submit("A").expect("submit other");
    assert_eq!(other.ticket.global_index(), 1);

    // Back on the first question the original call is still outstanding.
    e.jump_to(0, 0).expect("jump");
    assert!(e.is_grading());
    let outcome = e.complete_grading(&pending.ticket, Ok("ok".into())).expect("complete");
    assert!(matches!(outcome, GradeOutcome::Applied(_)));
    assert!(!e.is_grading());
    assert!(e.submit("retry").is_ok());
  }

  #[test]
  fn stale_grading_result_is_dropped() {
    let mut e = text_then_choice();
    e.start().expect("start");
    let pending = e.submit("hello").expect("submit");
    e.advance().expect("advance");
    let outcome = e.complete_grading(&pending.ticket, Ok("late".into())).expect("complete");
    assert_eq!(outcome, GradeOutcome::Stale);
    assert_eq!(e.responses().completed_count(), 0);

    // The ticket no longer blocks the first question.
    e.jump_to(0, 0).expect("jump");
    assert!(e.submit("hello again").is_ok());
  }

  #[test]
  fn grader_failure_surfaces_and_allows_retry() {
    let mut e = text_then_choice();
    e.start().expect("start");
    let pending = e.submit("hello").expect("submit");
    let err = e
      .complete_grading(&pending.ticket, Err(AssessError::GraderUnavailable("down".into())))
      .expect_err("should surface");
    assert!(matches!(err, AssessError::GraderUnavailable(_)));
    assert_eq!(e.phase(), Phase::InProgress);
    assert_eq!(e.responses().completed_count(), 0);
    assert!(e.submit("hello").is_ok());
  }

  #[test]
  fn grade_request_carries_question_metadata() {
    let mut e = engine_for(vec![Section::new("Repeat", vec![Question::new(QuestionKind::FreeSpeech, "How can I help you today?")])
      .with_mode(PresentationMode::ListenAndRepeat)]);
    e.start().expect("start");
    let p = e.submit("how can i help you today").expect("submit");
    assert_eq!(p.request.channel, Channel::Voice);
    assert_eq!(p.request.mode, Some(PresentationMode::ListenAndRepeat));
    assert_eq!(p.request.section_title.as_deref(), Some("Repeat"));
    assert_eq!(p.request.question_kind, Some(QuestionKind::FreeSpeech));
  }

  #[test]
  fn palette_tracks_current_and_completed() {
    let mut e = text_then_choice();
    e.start().expect("start");
    e.record_response("hello", "ok").expect("record");
    e.advance().expect("advance");
    let statuses: Vec<PaletteStatus> = e.palette().into_iter().map(|p| p.status).collect();
    assert_eq!(statuses, vec![PaletteStatus::Completed, PaletteStatus::Current]);
  }

  #[test]
  fn navigation_clears_draft() {
    let mut e = text_then_choice();
    e.start().expect("start");
    e.update_draft("abc").expect("draft");
    e.advance().expect("advance");
    e.jump_to(0, 0).expect("jump back");
    let ticket = e.arm_deadline().expect("arm");
    match e.time_expired(ticket).expect("expire") {
      TimeoutAction::Submit(p) => assert_eq!(p.request.user_response, NO_ANSWER),
      other => panic!("expected submit, got {other:?}"),
    }
  }
}
