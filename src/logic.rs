//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! Every mutation follows the same shape: load a private copy of the document,
//! apply a pure operation from `unlock`/`paths`, re-derive the stored lock
//! flags, then save. An error anywhere before the save leaves the stored
//! document untouched.
//!
//! AI-backed helpers fall back to local content from `seeds` when the model is
//! disabled or the call fails. Node payloads the model does return are
//! validated and rejected if malformed.

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::aggregate::{build_aggregate_view, ClassMasteryView};
use crate::domain::{CourseStructure, ExamQuestion, Flashcard, Path, PathMetadata, StudentProgressRecord};
use crate::error::{CoreError, CoreResult};
use crate::paths::{self, nodes_from_drafts, GateOutcome, NodeDraft};
use crate::seeds;
use crate::state::AppState;
use crate::unlock::{self, compute_access_states, refresh_lock_flags};
use crate::util::trunc_for_log;
use crate::view::{route_node_click, NodeRoute};

/// Numbered outline of a path, used as positional context for the model.
pub fn outline(path: &Path) -> String {
  path
    .nodes
    .iter()
    .enumerate()
    .map(|(i, n)| format!("{}. [{}] {}: {}", i + 1, n.kind.as_str(), n.title, n.description))
    .collect::<Vec<_>>()
    .join("\n")
}

fn position_context(path: &Path, pos: usize) -> String {
  let prev = pos.checked_sub(1).and_then(|i| path.nodes.get(i)).map(|n| n.title.as_str()).unwrap_or("none");
  let next = path.nodes.get(pos + 1).map(|n| n.title.as_str()).unwrap_or("none");
  format!("step {} of {}; previous: {}; next: {}", pos + 1, path.nodes.len(), prev, next)
}

#[instrument(level = "info", skip(state, drafts, metadata), fields(drafts = drafts.len()))]
pub async fn create_path(
  state: &AppState,
  owner_id: &str,
  title: &str,
  topic: &str,
  drafts: Vec<NodeDraft>,
  metadata: PathMetadata,
) -> CoreResult<Path> {
  let nodes = nodes_from_drafts(drafts)?;
  let path = paths::create_path(owner_id, title, topic, nodes, metadata, Utc::now())?;
  state.store.save_path(&path).await?;
  info!(target: "progress", path_id = %path.id, %owner_id, nodes = path.nodes.len(), "Path created");
  Ok(path)
}

#[instrument(level = "info", skip(state, metadata))]
pub async fn generate_path(
  state: &AppState,
  owner_id: &str,
  title: &str,
  topic: &str,
  metadata: PathMetadata,
) -> CoreResult<Path> {
  if topic.trim().is_empty() {
    return Err(CoreError::validation("topic is required"));
  }
  let count = state.progression.path_length;
  let nodes = if let Some(oa) = &state.openai {
    match oa.generate_path(&state.prompts, topic, count).await {
      Ok(drafts) => nodes_from_drafts(drafts)?,
      Err(e) => {
        error!(target: "progress", %topic, error = %e, "OpenAI generate_path failed; using local fallback.");
        seeds::fallback_path_nodes(topic)
      }
    }
  } else {
    seeds::fallback_path_nodes(topic)
  };

  let path = paths::create_path(owner_id, title, topic, nodes, metadata, Utc::now())?;
  state.store.save_path(&path).await?;
  info!(target: "progress", path_id = %path.id, %owner_id, nodes = path.nodes.len(), "Path generated");
  Ok(path)
}

pub async fn get_path(state: &AppState, path_id: &str) -> CoreResult<Path> {
  state.store.load_path(path_id).await
}

pub async fn list_paths(state: &AppState, owner_id: &str) -> CoreResult<Vec<Path>> {
  state.store.list_paths(owner_id).await
}

#[instrument(level = "info", skip(state))]
pub async fn complete_node(state: &AppState, path_id: &str, node_id: &str) -> CoreResult<Path> {
  let mut path = state.store.load_path(path_id).await?;
  unlock::mark_completed(&mut path, node_id, Utc::now())?;
  refresh_lock_flags(&mut path);
  state.store.save_path(&path).await?;
  info!(target: "progress", %path_id, %node_id, completed = path.completed_count(), total = path.nodes.len(), "Node completed");
  Ok(path)
}

#[instrument(level = "info", skip(state, answer), fields(answer_len = answer.len()))]
pub async fn solve_secret(state: &AppState, path_id: &str, node_id: &str, answer: &str) -> CoreResult<Path> {
  let mut path = state.store.load_path(path_id).await?;
  if let Err(e) = paths::solve_secret(&mut path, node_id, answer, Utc::now()) {
    warn!(target: "progress", %path_id, %node_id, error = %e, "Secret attempt rejected");
    return Err(e);
  }
  refresh_lock_flags(&mut path);
  state.store.save_path(&path).await?;
  info!(target: "progress", %path_id, %node_id, "Secret node solved");
  Ok(path)
}

#[instrument(level = "info", skip(state))]
pub async fn regenerate_node(state: &AppState, path_id: &str, node_id: &str) -> CoreResult<Path> {
  let mut path = state.store.load_path(path_id).await?;
  let pos = path.position(node_id).ok_or_else(|| CoreError::node_not_found(node_id))?;
  let context = position_context(&path, pos);

  let replacement = if let Some(oa) = &state.openai {
    match oa.generate_node(&state.prompts, &path.topic, &context).await {
      Ok(draft) => draft.into_node()?,
      Err(e) => {
        error!(target: "progress", %path_id, %node_id, error = %e, "OpenAI generate_node failed; using local fallback.");
        seeds::fallback_replacement(&path.topic, &context)
      }
    }
  } else {
    seeds::fallback_replacement(&path.topic, &context)
  };

  let old = paths::regenerate_node(&mut path, node_id, replacement)?;
  state.store.save_path(&path).await?;
  info!(target: "progress", %path_id, %node_id, old_title = %trunc_for_log(&old.title, 40), "Node regenerated");
  Ok(path)
}

#[instrument(level = "info", skip(state))]
pub async fn delete_node(state: &AppState, path_id: &str, node_id: &str) -> CoreResult<Path> {
  let mut path = state.store.load_path(path_id).await?;
  unlock::delete_node(&mut path, node_id)?;
  path.gate_exam = None;
  refresh_lock_flags(&mut path);
  state.store.save_path(&path).await?;
  info!(target: "progress", %path_id, %node_id, remaining = path.nodes.len(), "Node deleted");
  Ok(path)
}

#[instrument(level = "info", skip(state))]
pub async fn extend_path(state: &AppState, path_id: &str, count: Option<usize>) -> CoreResult<Path> {
  let count = count.unwrap_or(state.progression.extend_batch);
  if count == 0 {
    return Err(CoreError::validation("count must be at least 1"));
  }
  let mut path = state.store.load_path(path_id).await?;

  let new_nodes = if let Some(oa) = &state.openai {
    match oa.generate_extension(&state.prompts, &path.topic, &outline(&path), count).await {
      Ok(drafts) => nodes_from_drafts(drafts)?,
      Err(e) => {
        error!(target: "progress", %path_id, error = %e, "OpenAI generate_extension failed; using local fallback.");
        seeds::fallback_extension(&path.topic, path.nodes.len(), count)
      }
    }
  } else {
    seeds::fallback_extension(&path.topic, path.nodes.len(), count)
  };

  let added = unlock::append_nodes(&mut path, new_nodes)?;
  path.gate_exam = None;
  refresh_lock_flags(&mut path);
  state.store.save_path(&path).await?;
  info!(target: "progress", %path_id, added, total = path.nodes.len(), "Path extended");
  Ok(path)
}

/// Flashcards for a node, generated once and then served from the node cache.
#[instrument(level = "info", skip(state))]
pub async fn flashcards(state: &AppState, path_id: &str, node_id: &str) -> CoreResult<Vec<Flashcard>> {
  let mut path = state.store.load_path(path_id).await?;
  let pos = path.position(node_id).ok_or_else(|| CoreError::node_not_found(node_id))?;
  if let Some(cards) = &path.nodes[pos].cache.flashcards {
    info!(target: "progress", %path_id, %node_id, cards = cards.len(), "Flashcards served from cache");
    return Ok(cards.clone());
  }

  let node = &path.nodes[pos];
  let generated = match &state.openai {
    Some(oa) => match oa.generate_flashcards(&state.prompts, &node.title, &node.description).await {
      Ok(cards) => cards.into_iter().filter(|c| !c.front.trim().is_empty() && !c.back.trim().is_empty()).collect(),
      Err(e) => {
        error!(target: "progress", %path_id, %node_id, error = %e, "OpenAI generate_flashcards failed; using local fallback.");
        Vec::new()
      }
    },
    None => Vec::new(),
  };
  let cards = if generated.is_empty() { seeds::fallback_flashcards(node) } else { generated };

  path.nodes[pos].cache.flashcards = Some(cards.clone());
  state.store.save_path(&path).await?;
  Ok(cards)
}

/// The path's gatekeeper exam, generated once per path shape.
#[instrument(level = "info", skip(state))]
pub async fn gate_exam(state: &AppState, path_id: &str) -> CoreResult<Vec<ExamQuestion>> {
  let mut path = state.store.load_path(path_id).await?;
  if let Some(exam) = &path.gate_exam {
    return Ok(exam.clone());
  }

  let size = state.progression.gate_exam_size;
  let generated = match &state.openai {
    Some(oa) => match oa.generate_gate_exam(&state.prompts, &path.topic, &outline(&path), size).await {
      Ok(exam) => match paths::validate_exam(&exam) {
        Ok(()) => Some(exam),
        Err(e) => {
          warn!(target: "progress", %path_id, error = %e, "Model returned an unusable exam; using local fallback.");
          None
        }
      },
      Err(e) => {
        error!(target: "progress", %path_id, error = %e, "OpenAI generate_gate_exam failed; using local fallback.");
        None
      }
    },
    None => None,
  };
  let exam = generated.unwrap_or_else(|| seeds::fallback_gate_exam(&path, size));

  path.gate_exam = Some(exam.clone());
  state.store.save_path(&path).await?;
  info!(target: "progress", %path_id, questions = exam.len(), "Gate exam prepared");
  Ok(exam)
}

/// Grade a gatekeeper attempt; a pass completes the whole path in one transition.
#[instrument(level = "info", skip(state, answers), fields(answers = answers.len()))]
pub async fn attempt_gate(state: &AppState, path_id: &str, answers: &[usize]) -> CoreResult<(GateOutcome, Path)> {
  let mut path = state.store.load_path(path_id).await?;
  let exam = path
    .gate_exam
    .clone()
    .ok_or_else(|| CoreError::validation("no gate exam issued for this path yet"))?;
  let outcome = paths::grade_gate_exam(&exam, answers, state.progression.gate_pass_percent)?;

  if outcome.passed {
    let newly = paths::skip_path_via_gate(&mut path, Utc::now());
    state.store.save_path(&path).await?;
    info!(target: "progress", %path_id, correct = outcome.correct, total = outcome.total, newly_completed = newly, "Gate passed; path completed");
  } else {
    info!(target: "progress", %path_id, correct = outcome.correct, total = outcome.total, "Gate failed");
  }
  Ok((outcome, path))
}

/// Decide where a click on `node_id` leads.
pub async fn click_node(state: &AppState, path_id: &str, node_id: &str) -> CoreResult<NodeRoute> {
  let path = state.store.load_path(path_id).await?;
  let pos = path.position(node_id).ok_or_else(|| CoreError::node_not_found(node_id))?;
  let states = compute_access_states(&path.nodes);
  Ok(route_node_click(&path.nodes[pos], states[pos], pos + 1 == path.nodes.len()))
}

#[instrument(level = "info", skip(state))]
pub async fn course_mastery(state: &AppState, course_id: &str) -> CoreResult<ClassMasteryView> {
  let course = state.store.load_course_structure(course_id).await?;
  let records = state.store.load_all_student_progress(course_id).await?;
  let view = build_aggregate_view(&course, &records);
  info!(target: "mastery", %course_id, students = view.total_students, weak_spots = view.weak_spots().count(), "Class mastery served");
  Ok(view)
}

#[instrument(level = "info", skip(state, course), fields(course_id = %course.id))]
pub async fn put_course(state: &AppState, course: CourseStructure) -> CoreResult<CourseStructure> {
  if course.id.trim().is_empty() || course.title.trim().is_empty() {
    return Err(CoreError::validation("course needs an id and a title"));
  }
  state.store.save_course_structure(&course).await?;
  Ok(course)
}

#[instrument(level = "info", skip(state, record), fields(student_id = %record.student_id))]
pub async fn put_student_progress(
  state: &AppState,
  course_id: &str,
  record: StudentProgressRecord,
) -> CoreResult<StudentProgressRecord> {
  if record.student_id.trim().is_empty() {
    return Err(CoreError::validation("student id is required"));
  }
  state.store.save_student_progress(course_id, &record).await?;
  Ok(record)
}
