//! Response store: one record per question, keyed by global index.

use serde::Serialize;

use crate::domain::Catalog;

/// Recorded as the user response when a deadline passes with no input.
pub const NO_ANSWER: &str = "(no answer)";

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
  /// Snapshot of the question prompt, not a reference into the catalog.
  pub prompt: String,
  pub user_response: String,
  pub feedback: String,
  pub completed: bool,
}

impl ResponseRecord {
  pub fn empty(prompt: impl Into<String>) -> Self {
    Self { prompt: prompt.into(), ..Self::default() }
  }
}

/// Fixed-size once built; records are overwritten, never removed.
#[derive(Clone, Debug, Default)]
pub struct ResponseStore {
  records: Vec<ResponseRecord>,
}

impl ResponseStore {
  /// One empty record per question, in catalog order.
  pub fn for_catalog(catalog: &Catalog) -> Self {
    let records = catalog.iter().map(|(_, _, _, q)| ResponseRecord::empty(q.prompt.clone())).collect();
    Self { records }
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn get(&self, global_index: usize) -> Option<&ResponseRecord> {
    self.records.get(global_index)
  }

  /// Overwrite the record at `global_index` as completed. Returns false when the
  /// index is outside the store.
  pub fn complete(&mut self, global_index: usize, prompt: &str, user_response: &str, feedback: &str) -> bool {
    match self.records.get_mut(global_index) {
      Some(slot) => {
        *slot = ResponseRecord {
          prompt: prompt.to_string(),
          user_response: user_response.to_string(),
          feedback: feedback.to_string(),
          completed: true,
        };
        true
      }
      None => false,
    }
  }

  pub fn completed_count(&self) -> usize {
    self.records.iter().filter(|r| r.completed).count()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Question, QuestionKind, Section};

  fn catalog() -> Catalog {
    Catalog::new(vec![
      Section::new("A", vec![Question::new(QuestionKind::ShortText, "one"), Question::new(QuestionKind::ShortText, "two")]),
      Section::new("B", vec![Question::new(QuestionKind::FreeSpeech, "three")]),
    ])
    .expect("catalog")
  }

  #[test]
  fn store_matches_catalog_size_and_starts_incomplete() {
    let store = ResponseStore::for_catalog(&catalog());
    assert_eq!(store.len(), 3);
    assert!((0..3).filter_map(|i| store.get(i)).all(|r| !r.completed && r.feedback.is_empty()));
    assert_eq!(store.get(2).map(|r| r.prompt.as_str()), Some("three"));
  }

  #[test]
  fn complete_overwrites_in_place() {
    let mut store = ResponseStore::for_catalog(&catalog());
    assert!(store.complete(1, "two", "first", "meh"));
    assert!(store.complete(1, "two", "second", "better"));
    assert_eq!(store.len(), 3);
    assert_eq!(store.completed_count(), 1);
    let r = store.get(1).expect("record");
    assert_eq!((r.user_response.as_str(), r.feedback.as_str()), ("second", "better"));
    assert!(!store.complete(3, "x", "y", "z"));
  }
}
