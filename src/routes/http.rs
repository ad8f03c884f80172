//! HTTP endpoint handlers: the grading relay plus small read-only helpers.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use tracing::{error, info, instrument};

use crate::domain::Channel;
use crate::error::AssessError;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, grader: state.grader.name() })
}

#[instrument(level = "info", skip(state))]
pub async fn http_catalog(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(to_catalog_out(&state.catalog))
}

#[instrument(level = "info", skip(state, body), fields(answer_len = body.user_response.len()))]
pub async fn http_assess_voice(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AssessIn>,
) -> Result<Json<AssessOut>, AssessError> {
  assess(&state, body, Channel::Voice).await
}

#[instrument(level = "info", skip(state, body), fields(answer_len = body.user_response.len()))]
pub async fn http_assess_text(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AssessIn>,
) -> Result<Json<AssessOut>, AssessError> {
  assess(&state, body, Channel::Text).await
}

async fn assess(state: &AppState, body: AssessIn, channel: Channel) -> Result<Json<AssessOut>, AssessError> {
  if body.prompt.trim().is_empty() {
    return Err(AssessError::BadRequest("prompt must not be empty".into()));
  }
  let req = body.into_request(channel);
  let feedback = state.grader.grade(&req).await?;
  info!(target: "grader", ?channel, grader = state.grader.name(), feedback_len = feedback.len(), "HTTP assessment graded");
  Ok(Json(AssessOut { feedback }))
}

/// Short round trip to the configured LLM.
#[instrument(level = "info", skip(state))]
pub async fn http_test_llm(State(state): State<Arc<AppState>>) -> Result<Json<LlmTestOut>, AssessError> {
  let Some(llm) = &state.llm else {
    return Err(AssessError::GraderUnavailable("OPENAI_API_KEY not configured".into()));
  };
  match llm.chat_plain("You are a friendly assistant.", "Write a very short, positive, and friendly message.", 0.7).await {
    Ok(response) => Ok(Json(LlmTestOut { message: "LLM API test successful!".into(), response })),
    Err(e) => {
      error!(target: "grader", error = %e, "LLM connectivity test failed");
      Err(AssessError::GraderUnavailable(e.to_string()))
    }
  }
}
