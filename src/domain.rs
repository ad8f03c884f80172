//! Domain models: question kinds, presentation modes, sections and the catalog.
//!
//! The catalog is validated once at construction and never mutated afterwards.
//! Each question's presentation mode is computed there as well, so renderers
//! and the flow engine only ever read a tag.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the learner is asked to do.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
  ReadAloud,
  FreeSpeech,
  FillBlankSpeak,
  ShortText,
  MultipleChoice,
  WordReorder,
  NarrativeIntro,
}

impl QuestionKind {
  /// Mode used when the section carries no override.
  pub fn default_mode(self) -> PresentationMode {
    match self {
      QuestionKind::ReadAloud => PresentationMode::ReadAloud,
      QuestionKind::FreeSpeech | QuestionKind::FillBlankSpeak => PresentationMode::FreeSpeech,
      QuestionKind::ShortText => PresentationMode::TextEntry,
      QuestionKind::MultipleChoice => PresentationMode::ChoiceSelection,
      QuestionKind::WordReorder => PresentationMode::WordReorder,
      QuestionKind::NarrativeIntro => PresentationMode::Passage,
    }
  }
}

/// Rendering/interaction behavior for a question.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PresentationMode {
  /// Prompt is spoken to the learner first and hidden; learner repeats it.
  ListenAndRepeat,
  ReadAloud,
  FreeSpeech,
  TextEntry,
  ChoiceSelection,
  WordReorder,
  /// Reading material with nothing to answer.
  Passage,
}

/// Which relay endpoint/prompt family grades a response.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
  Voice,
  Text,
}

impl PresentationMode {
  /// Pure derivation from (section, question). Section override wins.
  pub fn derive(section_override: Option<PresentationMode>, kind: QuestionKind) -> Self {
    section_override.unwrap_or_else(|| kind.default_mode())
  }

  /// True for modes whose answer comes from the speech capture collaborator.
  pub fn captures_speech(self) -> bool {
    matches!(
      self,
      PresentationMode::ListenAndRepeat | PresentationMode::ReadAloud | PresentationMode::FreeSpeech
    )
  }

  /// True for modes answered through typed/selected input.
  pub fn takes_text_input(self) -> bool {
    matches!(
      self,
      PresentationMode::TextEntry | PresentationMode::ChoiceSelection | PresentationMode::WordReorder
    )
  }

  pub fn channel(self) -> Channel {
    if self.captures_speech() { Channel::Voice } else { Channel::Text }
  }
}

/// Immutable question descriptor.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub kind: QuestionKind,
  pub prompt: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub context: Option<String>,
  /// Answer key; never serialized to clients.
  #[serde(skip_serializing)]
  pub expected_answer: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub options: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub passage: Option<String>,
  mode: PresentationMode,
}

impl Question {
  pub fn new(kind: QuestionKind, prompt: impl Into<String>) -> Self {
    Self {
      kind,
      prompt: prompt.into(),
      context: None,
      expected_answer: None,
      options: None,
      passage: None,
      mode: kind.default_mode(),
    }
  }

  pub fn with_context(mut self, context: impl Into<String>) -> Self {
    self.context = Some(context.into());
    self
  }

  pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
    self.expected_answer = Some(expected.into());
    self
  }

  pub fn with_options<I, S>(mut self, options: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.options = Some(options.into_iter().map(Into::into).collect());
    self
  }

  pub fn with_passage(mut self, passage: impl Into<String>) -> Self {
    self.passage = Some(passage.into());
    self
  }

  pub fn mode(&self) -> PresentationMode {
    self.mode
  }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Section {
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub instruction: Option<String>,
  #[serde(rename = "mode", skip_serializing_if = "Option::is_none")]
  pub mode_override: Option<PresentationMode>,
  pub questions: Vec<Question>,
}

impl Section {
  pub fn new(title: impl Into<String>, questions: Vec<Question>) -> Self {
    Self { title: title.into(), instruction: None, mode_override: None, questions }
  }

  pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
    self.instruction = Some(instruction.into());
    self
  }

  pub fn with_mode(mut self, mode: PresentationMode) -> Self {
    self.mode_override = Some(mode);
    self
  }
}

/// (section, question) pointer, both zero-based.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Position {
  pub section: usize,
  pub question: usize,
}

impl Position {
  pub const fn new(section: usize, question: usize) -> Self {
    Self { section, question }
  }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
  #[error("catalog has no sections")]
  Empty,
  #[error("section '{0}' has no questions")]
  EmptySection(String),
  #[error("question {question} of section '{section}' is multiple choice but has no options")]
  MissingOptions { section: String, question: usize },
  #[error("question {question} of section '{section}' expects an answer that is not among its options")]
  ExpectedNotInOptions { section: String, question: usize },
}

/// Ordered, validated, read-only set of sections.
#[derive(Clone, Debug, PartialEq)]
pub struct Catalog {
  sections: Vec<Section>,
  offsets: Vec<usize>,
  total: usize,
}

impl Catalog {
  pub fn new(mut sections: Vec<Section>) -> Result<Self, CatalogError> {
    if sections.is_empty() {
      return Err(CatalogError::Empty);
    }
    let mut offsets = Vec::with_capacity(sections.len());
    let mut total = 0usize;
    for section in &mut sections {
      if section.questions.is_empty() {
        return Err(CatalogError::EmptySection(section.title.clone()));
      }
      for (qi, q) in section.questions.iter_mut().enumerate() {
        if q.kind == QuestionKind::MultipleChoice {
          let options = match &q.options {
            Some(o) if !o.is_empty() => o,
            _ => {
              return Err(CatalogError::MissingOptions { section: section.title.clone(), question: qi })
            }
          };
          if let Some(expected) = &q.expected_answer {
            if !options.iter().any(|o| o == expected) {
              return Err(CatalogError::ExpectedNotInOptions {
                section: section.title.clone(),
                question: qi,
              });
            }
          }
        }
        q.mode = PresentationMode::derive(section.mode_override, q.kind);
      }
      offsets.push(total);
      total += section.questions.len();
    }
    Ok(Self { sections, offsets, total })
  }

  pub fn sections(&self) -> &[Section] {
    &self.sections
  }

  pub fn section(&self, index: usize) -> Option<&Section> {
    self.sections.get(index)
  }

  pub fn question(&self, pos: Position) -> Option<&Question> {
    self.sections.get(pos.section)?.questions.get(pos.question)
  }

  pub fn contains(&self, pos: Position) -> bool {
    self.question(pos).is_some()
  }

  pub fn total_questions(&self) -> usize {
    self.total
  }

  /// Flattened index used as the response store key.
  pub fn global_index(&self, pos: Position) -> Option<usize> {
    if !self.contains(pos) {
      return None;
    }
    Some(self.offsets[pos.section] + pos.question)
  }

  /// Following position in catalog order, `None` past the last question.
  pub fn next(&self, pos: Position) -> Option<Position> {
    let section = self.sections.get(pos.section)?;
    if pos.question + 1 < section.questions.len() {
      Some(Position::new(pos.section, pos.question + 1))
    } else if pos.section + 1 < self.sections.len() {
      Some(Position::new(pos.section + 1, 0))
    } else {
      None
    }
  }

  /// Every question in catalog order with its position and global index.
  pub fn iter(&self) -> impl Iterator<Item = (Position, usize, &Section, &Question)> + '_ {
    self.sections.iter().enumerate().flat_map(move |(si, section)| {
      let base = self.offsets[si];
      section
        .questions
        .iter()
        .enumerate()
        .map(move |(qi, q)| (Position::new(si, qi), base + qi, section, q))
    })
  }
}
