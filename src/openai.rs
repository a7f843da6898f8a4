//! Minimal OpenAI client for curriculum generation.
//!
//! We only call chat.completions and request a strict JSON object back.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//! Returned node payloads are NOT trusted: callers validate them with `NodeDraft::into_node`.
//!
//! NOTE: We never log the API key.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::domain::{ExamQuestion, Flashcard};
use crate::paths::NodeDraft;
use crate::util::fill_template;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

#[derive(Deserialize)]
struct NodeBatch {
  #[serde(default)]
  nodes: Vec<NodeDraft>,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model })
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
      max_tokens: None,
    };

    let start = std::time::Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "pathquest-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      error!(elapsed = ?start.elapsed(), %status, "Model call failed");
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();
    info!(elapsed = ?start.elapsed(), response_len = text.len(), "Model response received");

    serde_json::from_str::<T>(&text).map_err(|e| format!("JSON parse error: {}", e))
  }

  // --- High-level helpers (domain-specialized) ---

  /// Draft a whole new path for a topic.
  #[instrument(level = "info", skip(self, prompts), fields(model = %self.strong_model))]
  pub async fn generate_path(&self, prompts: &Prompts, topic: &str, count: usize) -> Result<Vec<NodeDraft>, String> {
    let count = count.to_string();
    let user = fill_template(&prompts.path_user_template, &[("topic", topic), ("count", &count)]);
    let batch: NodeBatch = self.chat_json(&self.strong_model, &prompts.path_system, &user, 0.7).await?;
    info!(drafts = batch.nodes.len(), "Path drafts generated");
    Ok(batch.nodes)
  }

  /// Draft one node to replace the step described by `context`.
  #[instrument(level = "info", skip(self, prompts, context), fields(context_len = context.len()))]
  pub async fn generate_node(&self, prompts: &Prompts, topic: &str, context: &str) -> Result<NodeDraft, String> {
    let user = fill_template(&prompts.node_user_template, &[("topic", topic), ("context", context)]);
    self.chat_json(&self.fast_model, &prompts.node_system, &user, 0.8).await
  }

  /// Draft `count` nodes continuing the path summarised in `context`.
  #[instrument(level = "info", skip(self, prompts, context), fields(context_len = context.len()))]
  pub async fn generate_extension(
    &self,
    prompts: &Prompts,
    topic: &str,
    context: &str,
    count: usize,
  ) -> Result<Vec<NodeDraft>, String> {
    let count = count.to_string();
    let user = fill_template(
      &prompts.extend_user_template,
      &[("topic", topic), ("context", context), ("count", &count)],
    );
    let batch: NodeBatch = self.chat_json(&self.strong_model, &prompts.path_system, &user, 0.7).await?;
    Ok(batch.nodes)
  }

  #[instrument(level = "info", skip(self, prompts, description), fields(title_len = title.len()))]
  pub async fn generate_flashcards(
    &self,
    prompts: &Prompts,
    title: &str,
    description: &str,
  ) -> Result<Vec<Flashcard>, String> {
    #[derive(Deserialize)]
    struct Cards { flashcards: Vec<Flashcard> }

    let user = fill_template(
      &prompts.flashcards_user_template,
      &[("title", title), ("description", description)],
    );
    let cards: Cards = self.chat_json(&self.fast_model, &prompts.flashcards_system, &user, 0.4).await?;
    Ok(cards.flashcards)
  }

  #[instrument(level = "info", skip(self, prompts, outline), fields(outline_len = outline.len()))]
  pub async fn generate_gate_exam(
    &self,
    prompts: &Prompts,
    topic: &str,
    outline: &str,
    count: usize,
  ) -> Result<Vec<ExamQuestion>, String> {
    #[derive(Deserialize)]
    struct Exam { questions: Vec<ExamQuestion> }

    let count = count.to_string();
    let user = fill_template(
      &prompts.gate_exam_user_template,
      &[("topic", topic), ("outline", outline), ("count", &count)],
    );
    let exam: Exam = self.chat_json(&self.strong_model, &prompts.gate_exam_system, &user, 0.3).await?;
    Ok(exam.questions)
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}
