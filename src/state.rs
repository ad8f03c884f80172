//! Application state: the shared catalog, the grader and per-question timing.
//!
//! Nothing here is per-learner: every WebSocket session builds its own
//! `FlowEngine` over the shared `Arc<Catalog>`.

use std::{sync::Arc, time::Duration};

use tracing::{error, info, instrument};

use crate::config::{build_catalog, load_config_from_env, AppConfig, Settings};
use crate::domain::{Catalog, CatalogError};
use crate::grader::{Grader, LlmGrader, LocalGrader};
use crate::openai::OpenAI;
use crate::seeds::default_catalog;

#[derive(Clone)]
pub struct AppState {
  pub catalog: Arc<Catalog>,
  pub grader: Arc<dyn Grader>,
  /// Kept separately for the connectivity probe.
  pub llm: Option<OpenAI>,
  pub time_limit: Duration,
}

impl AppState {
  /// Build state from env: load config, pick the catalog, init the grader.
  #[instrument(level = "info", skip_all)]
  pub fn from_env() -> Result<(Self, Settings), CatalogError> {
    let cfg = load_config_from_env();
    let settings = Settings::from_env(cfg.as_ref());
    let catalog = select_catalog(cfg.as_ref())?;

    let llm = OpenAI::from_env();
    let prompts = cfg.map(|c| c.prompts).unwrap_or_default();
    let grader: Arc<dyn Grader> = match &llm {
      Some(oa) => {
        info!(target: "assess_backend", base_url = %oa.base_url, model = %oa.model, "LLM grading enabled.");
        Arc::new(LlmGrader::new(oa.clone(), prompts))
      }
      None => {
        info!(target: "assess_backend", "LLM grading disabled (no OPENAI_API_KEY). Using local grader.");
        Arc::new(LocalGrader)
      }
    };

    info!(
      target: "assess_backend",
      sections = catalog.sections().len(),
      questions = catalog.total_questions(),
      time_limit_secs = settings.time_limit.as_secs(),
      "Assessment catalog ready"
    );
    let state = Self { catalog: Arc::new(catalog), grader, llm, time_limit: settings.time_limit };
    Ok((state, settings))
  }

  pub fn new(catalog: Catalog, grader: Arc<dyn Grader>, time_limit: Duration) -> Self {
    Self { catalog: Arc::new(catalog), grader, llm: None, time_limit }
  }
}

/// TOML catalog when present and valid, the built-in one otherwise.
fn select_catalog(cfg: Option<&AppConfig>) -> Result<Catalog, CatalogError> {
  if let Some(cfg) = cfg.filter(|c| !c.sections.is_empty()) {
    match build_catalog(&cfg.sections) {
      Ok(c) => return Ok(c),
      Err(e) => error!(target: "assess_backend", error = %e, "Configured catalog is invalid; using built-in catalog"),
    }
  }
  default_catalog()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::parse_config;

  #[test]
  fn invalid_configured_catalog_falls_back_to_built_in() {
    let cfg = parse_config("[[sections]]\ntitle = \"Empty\"\n").expect("toml");
    let c = select_catalog(Some(&cfg)).expect("catalog");
    assert_eq!(c.total_questions(), default_catalog().expect("seed").total_questions());
  }

  #[test]
  fn valid_configured_catalog_is_used() {
    let cfg = parse_config("[[sections]]\ntitle = \"Only\"\n[[sections.questions]]\nkind = \"short_text\"\nprompt = \"p\"\n")
      .expect("toml");
    let c = select_catalog(Some(&cfg)).expect("catalog");
    assert_eq!(c.total_questions(), 1);
    assert_eq!(c.sections()[0].title, "Only");
  }
}
