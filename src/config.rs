//! Configuration: grading prompts + optional catalog from TOML, server settings from env.
//!
//! TOML schema (every key optional):
//!
//! ```toml
//! time_limit_secs = 90
//!
//! [prompts]
//! text_template = "..."
//!
//! [[sections]]
//! title = "Repeat Exactly What You Hear"
//! mode = "listen_and_repeat"
//!
//! [[sections.questions]]
//! kind = "free_speech"
//! prompt = "The quick brown fox jumps over the lazy dog."
//! ```

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::{Catalog, CatalogError, PresentationMode, Question, QuestionKind, Section};

/// Per-question deadline when neither env nor TOML override it.
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 60;
pub const DEFAULT_PORT: u16 = 5001;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub time_limit_secs: Option<u64>,
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub sections: Vec<SectionCfg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SectionCfg {
  pub title: String,
  #[serde(default)] pub instruction: Option<String>,
  #[serde(default)] pub mode: Option<PresentationMode>,
  #[serde(default)] pub questions: Vec<QuestionCfg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct QuestionCfg {
  pub kind: QuestionKind,
  pub prompt: String,
  #[serde(default)] pub context: Option<String>,
  #[serde(default)] pub expected: Option<String>,
  #[serde(default)] pub options: Option<Vec<String>>,
  #[serde(default)] pub passage: Option<String>,
}

/// Prompts used by the LLM grader. `{prompt}`, `{response}` and `{expected}`
/// are substituted per request.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub voice_system: String,
  pub voice_repeat_template: String,
  pub voice_task_template: String,
  pub text_system: String,
  pub text_template: String,
  pub expected_answer_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      voice_system: "You are a professional voice assessment tool.".into(),
      voice_repeat_template: "The user's task was to repeat the following sentence exactly: \"{prompt}\". Based on the user's transcription \"{response}\", provide a score from 1-10 for accuracy and give specific, actionable feedback on how they might improve their pronunciation and clarity. Make the feedback concise and helpful.".into(),
      voice_task_template: "The user was asked to complete the following task: \"{prompt}\". Based on the user's transcription \"{response}\", provide a score from 1-10 for fluency and pronunciation, and give specific, actionable feedback on how they might improve, as if you have just heard their response. Make the feedback concise and helpful.".into(),
      text_system: "You are a professional communication assessment tool.".into(),
      text_template: "Evaluate the user's response: \"{response}\" based on the prompt: \"{prompt}\". Provide a score from 1-10 for correctness and relevance, and give detailed feedback.".into(),
      expected_answer_template: "The expected answer is \"{expected}\".".into(),
    }
  }
}

pub fn parse_config(s: &str) -> Result<AppConfig, toml::de::Error> {
  toml::from_str::<AppConfig>(s)
}

/// Attempt to load `AppConfig` from ASSESS_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("ASSESS_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_config(&s) {
      Ok(cfg) => {
        info!(target: "assess_backend", %path, sections = cfg.sections.len(), "Loaded assessment config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "assess_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "assess_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

pub fn build_catalog(sections: &[SectionCfg]) -> Result<Catalog, CatalogError> {
  let sections = sections
    .iter()
    .map(|s| {
      let questions = s.questions.iter().map(question_from_cfg).collect();
      let mut section = Section::new(s.title.clone(), questions);
      section.instruction = s.instruction.clone();
      section.mode_override = s.mode;
      section
    })
    .collect();
  Catalog::new(sections)
}

fn question_from_cfg(q: &QuestionCfg) -> Question {
  let mut out = Question::new(q.kind, q.prompt.clone());
  out.context = q.context.clone();
  out.expected_answer = q.expected.clone();
  out.options = q.options.clone();
  out.passage = q.passage.clone();
  out
}

/// Process-level settings resolved from env, falling back to TOML then defaults.
#[derive(Clone, Debug)]
pub struct Settings {
  pub port: u16,
  pub static_dir: String,
  pub time_limit: Duration,
}

impl Settings {
  pub fn from_env(cfg: Option<&AppConfig>) -> Self {
    let port = std::env::var("PORT")
      .ok()
      .and_then(|p| p.parse::<u16>().ok())
      .unwrap_or(DEFAULT_PORT);
    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./public".into());

    let env_limit = std::env::var("QUESTION_TIME_LIMIT_SECS").ok().and_then(|v| match v.parse::<u64>() {
      Ok(n) if n > 0 => Some(n),
      _ => {
        warn!(target: "assess_backend", value = %v, "Ignoring invalid QUESTION_TIME_LIMIT_SECS");
        None
      }
    });
    let secs = env_limit
      .or_else(|| cfg.and_then(|c| c.time_limit_secs).filter(|n| *n > 0))
      .unwrap_or(DEFAULT_TIME_LIMIT_SECS);

    Self { port, static_dir, time_limit: Duration::from_secs(secs) }
  }
}
