//! Domain models: curriculum nodes, learner paths, course structures and
//! per-student progress records.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of curriculum unit is this?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
  Theory,
  Practice,
  /// Boss-style, high-stakes node.
  Challenge,
  /// Hidden bonus node, reached only by explicit navigation.
  Secret,
}

impl NodeKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      NodeKind::Theory => "theory",
      NodeKind::Practice => "practice",
      NodeKind::Challenge => "challenge",
      NodeKind::Secret => "secret",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_lowercase().as_str() {
      "theory" => Some(NodeKind::Theory),
      "practice" => Some(NodeKind::Practice),
      "challenge" | "boss" => Some(NodeKind::Challenge),
      "secret" => Some(NodeKind::Secret),
      _ => None,
    }
  }
}

/// Derived access state of a node. Never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessState {
  Locked,
  Available,
  Done,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Riddle {
  pub question: String,
  pub answer: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
  pub front: String,
  pub back: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamQuestion {
  pub question: String,
  pub options: Vec<String>,
  pub answer_index: usize,
}

/// Generated sub-content kept to avoid repeating AI calls. Not authoritative.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCache {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub flashcards: Option<Vec<Flashcard>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub exam_questions: Option<Vec<ExamQuestion>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
  pub id: String,
  pub title: String,
  pub description: String,
  pub kind: NodeKind,
  #[serde(default)] pub is_locked: bool,
  #[serde(default)] pub is_completed: bool,
  #[serde(default)] pub completed_at: Option<DateTime<Utc>>,
  #[serde(default)] pub riddle: Option<Riddle>,
  #[serde(default)] pub cache: NodeCache,
}

impl Node {
  /// Fresh, locked, incomplete node with a generated id.
  pub fn new(title: impl Into<String>, description: impl Into<String>, kind: NodeKind) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      title: title.into(),
      description: description.into(),
      kind,
      is_locked: true,
      is_completed: false,
      completed_at: None,
      riddle: None,
      cache: NodeCache::default(),
    }
  }

  pub fn with_riddle(mut self, question: impl Into<String>, answer: impl Into<String>) -> Self {
    self.riddle = Some(Riddle { question: question.into(), answer: answer.into() });
    self
  }
}

/// Commitment-contract metadata. Has no effect on progression.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wager {
  pub stake: u32,
  #[serde(default)] pub deadline: Option<DateTime<Utc>>,
}

/// Optional metadata supplied when a path is created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathMetadata {
  #[serde(default)] pub wager: Option<Wager>,
}

/// Progression history. A gate skip is recorded as one event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathEvent {
  NodeCompleted { node_id: String, at: DateTime<Utc> },
  SecretSolved { node_id: String, at: DateTime<Utc> },
  NodesAppended { count: usize },
  NodeDeleted { node_id: String },
  NodeRegenerated { node_id: String },
  GateSkipped { at: DateTime<Utc>, newly_completed: usize },
}

/// One learner's ordered curriculum. Sequence order is the unlock order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Path {
  pub id: String,
  pub creator_id: String,
  pub title: String,
  pub topic: String,
  pub nodes: Vec<Node>,
  #[serde(default)] pub wager: Option<Wager>,
  pub created_at: DateTime<Utc>,
  #[serde(default)] pub history: Vec<PathEvent>,
  #[serde(default)] pub gate_exam: Option<Vec<ExamQuestion>>,
}

impl Path {
  pub fn position(&self, node_id: &str) -> Option<usize> {
    self.nodes.iter().position(|n| n.id == node_id)
  }

  pub fn node(&self, node_id: &str) -> Option<&Node> {
    self.nodes.iter().find(|n| n.id == node_id)
  }

  pub fn completed_count(&self) -> usize {
    self.nodes.iter().filter(|n| n.is_completed).count()
  }
}

//
// Course structure and roster progress (teacher side)
//

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
  File,
  Quiz,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemKind {
  Lesson,
  Assignment { assignment_type: AssignmentType },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseItem {
  pub id: String,
  pub title: String,
  #[serde(default)] pub description: String,
  #[serde(flatten)] pub kind: ItemKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseModule {
  pub id: String,
  pub title: String,
  #[serde(default)] pub items: Vec<CourseItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseStructure {
  pub id: String,
  pub title: String,
  #[serde(default)] pub modules: Vec<CourseModule>,
}

impl CourseStructure {
  /// Items in module/item authored order.
  pub fn items(&self) -> impl Iterator<Item = (&CourseModule, &CourseItem)> {
    self.modules.iter().flat_map(|m| m.items.iter().map(move |i| (m, i)))
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
  Pending,
  Submitted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
  pub assignment_id: String,
  pub status: SubmissionStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProgressRecord {
  pub student_id: String,
  #[serde(default)] pub completed_lessons: BTreeSet<String>,
  #[serde(default)] pub submissions: Vec<Submission>,
}

/// Path with one node per flag; `true` marks the node completed.
#[cfg(test)]
pub(crate) fn test_path(completed: &[bool]) -> Path {
  use chrono::TimeZone;
  let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
  let nodes = completed
    .iter()
    .enumerate()
    .map(|(i, done)| Node {
      id: format!("n{i}"),
      title: format!("Node {i}"),
      description: format!("Step {i}"),
      kind: NodeKind::Theory,
      is_locked: !done && i > 0,
      is_completed: *done,
      completed_at: done.then_some(at),
      riddle: None,
      cache: NodeCache::default(),
    })
    .collect();
  Path {
    id: "p1".into(),
    creator_id: "learner-1".into(),
    title: "Test path".into(),
    topic: "testing".into(),
    nodes,
    wager: None,
    created_at: at,
    history: vec![],
    gate_exam: None,
  }
}
