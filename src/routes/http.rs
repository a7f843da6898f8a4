//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;

use axum::{
  extract::{Path as UrlPath, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::domain::{CourseStructure, StudentProgressRecord};
use crate::error::CoreError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

impl IntoResponse for CoreError {
  fn into_response(self) -> Response {
    let status = match &self {
      CoreError::Validation(_) => StatusCode::BAD_REQUEST,
      CoreError::InvariantViolation(_) => StatusCode::CONFLICT,
      CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
      CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(target: "pathquest_backend", %status, error = %self, "Request failed");
    (status, Json(ErrorOut { error: self.kind(), message: self.to_string() })).into_response()
  }
}

type ApiResult<T> = Result<Json<T>, CoreError>;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, ai_enabled: state.openai.is_some() })
}

#[instrument(level = "info", skip(state, body), fields(owner_id = %body.owner_id, topic = %body.topic, nodes = body.nodes.len()))]
pub async fn http_create_path(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CreatePathIn>,
) -> ApiResult<PathOut> {
  let title = body.title.unwrap_or_default();
  let path = logic::create_path(&state, &body.owner_id, &title, &body.topic, body.nodes, body.metadata).await?;
  Ok(Json(to_path_out(path)))
}

#[instrument(level = "info", skip(state, body), fields(owner_id = %body.owner_id, topic = %body.topic))]
pub async fn http_generate_path(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GeneratePathIn>,
) -> ApiResult<PathOut> {
  let title = body.title.unwrap_or_default();
  let path = logic::generate_path(&state, &body.owner_id, &title, &body.topic, body.metadata).await?;
  Ok(Json(to_path_out(path)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_paths(
  State(state): State<Arc<AppState>>,
  UrlPath(owner_id): UrlPath<String>,
) -> ApiResult<Vec<PathSummaryOut>> {
  let paths = logic::list_paths(&state, &owner_id).await?;
  Ok(Json(paths.iter().map(PathSummaryOut::from).collect()))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_path(
  State(state): State<Arc<AppState>>,
  UrlPath(path_id): UrlPath<String>,
) -> ApiResult<PathOut> {
  Ok(Json(to_path_out(logic::get_path(&state, &path_id).await?)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_complete_node(
  State(state): State<Arc<AppState>>,
  UrlPath((path_id, node_id)): UrlPath<(String, String)>,
) -> ApiResult<PathOut> {
  let path = logic::complete_node(&state, &path_id, &node_id).await?;
  info!(target: "progress", %path_id, %node_id, "HTTP complete_node served");
  Ok(Json(to_path_out(path)))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_solve_secret(
  State(state): State<Arc<AppState>>,
  UrlPath((path_id, node_id)): UrlPath<(String, String)>,
  Json(body): Json<SecretIn>,
) -> ApiResult<PathOut> {
  Ok(Json(to_path_out(logic::solve_secret(&state, &path_id, &node_id, &body.answer).await?)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_regenerate_node(
  State(state): State<Arc<AppState>>,
  UrlPath((path_id, node_id)): UrlPath<(String, String)>,
) -> ApiResult<PathOut> {
  Ok(Json(to_path_out(logic::regenerate_node(&state, &path_id, &node_id).await?)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_node(
  State(state): State<Arc<AppState>>,
  UrlPath((path_id, node_id)): UrlPath<(String, String)>,
) -> ApiResult<PathOut> {
  Ok(Json(to_path_out(logic::delete_node(&state, &path_id, &node_id).await?)))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_extend_path(
  State(state): State<Arc<AppState>>,
  UrlPath(path_id): UrlPath<String>,
  body: Option<Json<ExtendIn>>,
) -> ApiResult<PathOut> {
  let count = body.and_then(|Json(b)| b.count);
  Ok(Json(to_path_out(logic::extend_path(&state, &path_id, count).await?)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_flashcards(
  State(state): State<Arc<AppState>>,
  UrlPath((path_id, node_id)): UrlPath<(String, String)>,
) -> ApiResult<FlashcardsOut> {
  let flashcards = logic::flashcards(&state, &path_id, &node_id).await?;
  Ok(Json(FlashcardsOut { flashcards }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_click_node(
  State(state): State<Arc<AppState>>,
  UrlPath((path_id, node_id)): UrlPath<(String, String)>,
) -> ApiResult<crate::view::NodeRoute> {
  Ok(Json(logic::click_node(&state, &path_id, &node_id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_gate(
  State(state): State<Arc<AppState>>,
  UrlPath(path_id): UrlPath<String>,
) -> ApiResult<GateExamOut> {
  Ok(Json(to_gate_exam_out(logic::gate_exam(&state, &path_id).await?)))
}

#[instrument(level = "info", skip(state, body), fields(answers = body.answers.len()))]
pub async fn http_attempt_gate(
  State(state): State<Arc<AppState>>,
  UrlPath(path_id): UrlPath<String>,
  Json(body): Json<GateAttemptIn>,
) -> ApiResult<GateAttemptOut> {
  let (outcome, path) = logic::attempt_gate(&state, &path_id, &body.answers).await?;
  info!(target: "progress", %path_id, passed = outcome.passed, "HTTP gate attempt evaluated");
  Ok(Json(GateAttemptOut { outcome, path: to_path_out(path) }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_course_mastery(
  State(state): State<Arc<AppState>>,
  UrlPath(course_id): UrlPath<String>,
) -> ApiResult<MasteryOut> {
  Ok(Json(to_mastery_out(logic::course_mastery(&state, &course_id).await?)))
}

#[instrument(level = "info", skip(state, course))]
pub async fn http_put_course(
  State(state): State<Arc<AppState>>,
  UrlPath(course_id): UrlPath<String>,
  Json(course): Json<CourseStructure>,
) -> ApiResult<CourseStructure> {
  if course.id != course_id {
    return Err(CoreError::validation("course id in body does not match the URL"));
  }
  Ok(Json(logic::put_course(&state, course).await?))
}

#[instrument(level = "info", skip(state, record))]
pub async fn http_put_progress(
  State(state): State<Arc<AppState>>,
  UrlPath((course_id, student_id)): UrlPath<(String, String)>,
  Json(record): Json<StudentProgressRecord>,
) -> ApiResult<StudentProgressRecord> {
  if record.student_id != student_id {
    return Err(CoreError::validation("student id in body does not match the URL"));
  }
  Ok(Json(logic::put_student_progress(&state, &course_id, record).await?))
}
