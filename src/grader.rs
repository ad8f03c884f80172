//! Response grading: the `Grader` seam, an LLM-backed grader and a local fallback.

use async_trait::async_trait;
use tracing::{debug, error, info, instrument};

use crate::config::Prompts;
use crate::domain::{Channel, PresentationMode, QuestionKind};
use crate::error::AssessError;
use crate::openai::OpenAI;
use crate::responses::NO_ANSWER;
use crate::util::{fill_template, trunc_for_log};

/// Everything a grader may use to score one response.
#[derive(Clone, Debug, PartialEq)]
pub struct GradeRequest {
  pub channel: Channel,
  pub prompt: String,
  pub user_response: String,
  pub section_title: Option<String>,
  pub question_kind: Option<QuestionKind>,
  pub mode: Option<PresentationMode>,
  pub expected_answer: Option<String>,
}

#[async_trait]
pub trait Grader: Send + Sync {
  /// Feedback text for one response, or `GraderUnavailable`.
  async fn grade(&self, req: &GradeRequest) -> Result<String, AssessError>;

  fn name(&self) -> &'static str;
}

/// Assemble the evaluation message sent to the model.
pub fn build_evaluation_prompt(prompts: &Prompts, req: &GradeRequest) -> String {
  let pairs = [("prompt", req.prompt.as_str()), ("response", req.user_response.as_str())];
  match req.channel {
    Channel::Voice => {
      let tpl = if req.mode == Some(PresentationMode::ListenAndRepeat) {
        &prompts.voice_repeat_template
      } else {
        &prompts.voice_task_template
      };
      fill_template(tpl, &pairs)
    }
    Channel::Text => {
      let mut out = fill_template(&prompts.text_template, &pairs);
      if let Some(expected) = req.expected_answer.as_deref().filter(|e| !e.trim().is_empty()) {
        out.push('\n');
        out.push_str(&fill_template(&prompts.expected_answer_template, &[("expected", expected)]));
      }
      out
    }
  }
}

/// Grades through an OpenAI-compatible chat completion endpoint.
pub struct LlmGrader {
  client: OpenAI,
  prompts: Prompts,
}

impl LlmGrader {
  pub fn new(client: OpenAI, prompts: Prompts) -> Self {
    Self { client, prompts }
  }
}

#[async_trait]
impl Grader for LlmGrader {
  #[instrument(level = "info", skip(self, req), fields(channel = ?req.channel, kind = ?req.question_kind, answer_len = req.user_response.len()))]
  async fn grade(&self, req: &GradeRequest) -> Result<String, AssessError> {
    let system = match req.channel {
      Channel::Voice => &self.prompts.voice_system,
      Channel::Text => &self.prompts.text_system,
    };
    let user = build_evaluation_prompt(&self.prompts, req);
    debug!(target: "grader", prompt = %trunc_for_log(&user, 200), "Evaluation prompt assembled");

    let start = std::time::Instant::now();
    match self.client.chat_plain(system, &user, 0.2).await {
      Ok(feedback) => {
        info!(target: "grader", elapsed = ?start.elapsed(), feedback_len = feedback.len(), "Feedback received");
        Ok(feedback)
      }
      Err(e) => {
        error!(target: "grader", elapsed = ?start.elapsed(), error = %e, "LLM grading failed");
        Err(AssessError::GraderUnavailable(e.to_string()))
      }
    }
  }

  fn name(&self) -> &'static str {
    "llm"
  }
}

/// Used when no API key is configured. Checks expected answers exactly and
/// otherwise only acknowledges the response.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalGrader;

#[async_trait]
impl Grader for LocalGrader {
  #[instrument(level = "debug", skip(self, req), fields(channel = ?req.channel))]
  async fn grade(&self, req: &GradeRequest) -> Result<String, AssessError> {
    Ok(local_feedback(req))
  }

  fn name(&self) -> &'static str {
    "local"
  }
}

fn local_feedback(req: &GradeRequest) -> String {
  let answer = req.user_response.trim();
  if answer.is_empty() || answer == NO_ANSWER {
    return "No answer was given. Score: 0/10.".into();
  }

  let reference = req
    .expected_answer
    .as_deref()
    .or_else(|| (req.mode == Some(PresentationMode::ListenAndRepeat)).then_some(req.prompt.as_str()));

  match reference {
    Some(expected) if normalize_answer(expected) == normalize_answer(answer) => {
      "Correct. Score: 10/10.".into()
    }
    Some(expected) => format!("Not quite. Expected: \"{}\". Score: 2/10.", expected.trim()),
    None => {
      let words = answer.split_whitespace().count();
      format!("Response recorded ({words} words). Detailed feedback is unavailable offline.")
    }
  }
}

/// Lowercase, drop punctuation and collapse whitespace.
fn normalize_answer(s: &str) -> String {
  s.chars()
    .filter(|c| !c.is_ascii_punctuation())
    .collect::<String>()
    .split_whitespace()
    .map(str::to_lowercase)
    .collect::<Vec<_>>()
    .join(" ")
}
