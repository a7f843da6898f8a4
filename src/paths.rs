//! Path-level mutation contracts used by the service layer and the AI pipeline:
//! creation, in-place regeneration, secret-node solving and the gatekeeper skip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ExamQuestion, Node, NodeCache, NodeKind, Path, PathEvent, PathMetadata, Riddle};
use crate::error::{CoreError, CoreResult};
use crate::unlock::refresh_lock_flags;
use crate::util::normalize_answer;

/// Node content as produced by the AI collaborator or a manual editor.
/// Nothing is trusted until `into_node` has checked its shape.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct NodeDraft {
  #[serde(default)] pub title: Option<String>,
  #[serde(default)] pub description: Option<String>,
  #[serde(default)] pub kind: Option<String>,
  #[serde(default)] pub riddle: Option<Riddle>,
}

impl NodeDraft {
  pub fn into_node(self) -> CoreResult<Node> {
    let title = non_blank(self.title, "title")?;
    let description = non_blank(self.description, "description")?;
    let raw_kind = non_blank(self.kind, "kind")?;
    let kind = NodeKind::parse(&raw_kind)
      .ok_or_else(|| CoreError::validation(format!("unknown node kind '{raw_kind}'")))?;

    let mut node = Node::new(title, description, kind);
    if kind == NodeKind::Secret {
      match self.riddle {
        Some(r) if !r.question.trim().is_empty() && !r.answer.trim().is_empty() => node.riddle = Some(r),
        _ => return Err(CoreError::validation("secret node needs a riddle with question and answer")),
      }
    }
    Ok(node)
  }
}

fn non_blank(v: Option<String>, field: &str) -> CoreResult<String> {
  match v {
    Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
    _ => Err(CoreError::validation(format!("node is missing '{field}'"))),
  }
}

/// Validate a batch of drafts. All-or-nothing: one bad draft rejects the batch.
pub fn nodes_from_drafts(drafts: Vec<NodeDraft>) -> CoreResult<Vec<Node>> {
  drafts.into_iter().map(NodeDraft::into_node).collect()
}

/// Assemble a new path. The first incomplete node is unlocked, the rest locked.
pub fn create_path(
  owner_id: &str,
  title: &str,
  topic: &str,
  nodes: Vec<Node>,
  metadata: PathMetadata,
  at: DateTime<Utc>,
) -> CoreResult<Path> {
  if owner_id.trim().is_empty() {
    return Err(CoreError::validation("path owner is required"));
  }
  if nodes.is_empty() {
    return Err(CoreError::validation("a path needs at least one node"));
  }
  let title = if title.trim().is_empty() { topic.trim() } else { title.trim() };

  let mut path = Path {
    id: Uuid::new_v4().to_string(),
    creator_id: owner_id.to_string(),
    title: title.to_string(),
    topic: topic.trim().to_string(),
    nodes,
    wager: metadata.wager,
    created_at: at,
    history: Vec::new(),
    gate_exam: None,
  };
  refresh_lock_flags(&mut path);
  Ok(path)
}

/// Replace a node in place. The slot keeps its id and position; progress and
/// cached content start over because the content changed.
pub fn regenerate_node(path: &mut Path, node_id: &str, replacement: Node) -> CoreResult<Node> {
  let pos = path.position(node_id).ok_or_else(|| CoreError::node_not_found(node_id))?;
  let fresh = Node {
    id: node_id.to_string(),
    is_locked: true,
    is_completed: false,
    completed_at: None,
    cache: NodeCache::default(),
    ..replacement
  };
  let old = std::mem::replace(&mut path.nodes[pos], fresh);
  path.gate_exam = None;
  path.history.push(PathEvent::NodeRegenerated { node_id: node_id.to_string() });
  refresh_lock_flags(path);
  Ok(old)
}

/// Gatekeeper override: every node becomes completed in one transition.
///
/// Nodes that were already completed keep their original `completed_at`; the
/// skip itself is recorded once in the path history. Returns how many nodes
/// were newly completed.
pub fn skip_path_via_gate(path: &mut Path, at: DateTime<Utc>) -> usize {
  let mut newly_completed = 0;
  for node in path.nodes.iter_mut() {
    if !node.is_completed {
      node.is_completed = true;
      node.completed_at = Some(at);
      newly_completed += 1;
    }
    node.is_locked = false;
  }
  path.history.push(PathEvent::GateSkipped { at, newly_completed });
  newly_completed
}

/// Explicit unlock gesture for a secret node: answering its riddle completes it
/// wherever it sits in the sequence.
pub fn solve_secret(path: &mut Path, node_id: &str, answer: &str, at: DateTime<Utc>) -> CoreResult<()> {
  let pos = path.position(node_id).ok_or_else(|| CoreError::node_not_found(node_id))?;
  let node = &path.nodes[pos];
  if node.kind != NodeKind::Secret {
    return Err(CoreError::validation(format!("node {node_id} is not a secret node")));
  }
  let riddle = node
    .riddle
    .as_ref()
    .ok_or_else(|| CoreError::validation(format!("secret node {node_id} has no riddle")))?;
  if normalize_answer(answer) != normalize_answer(&riddle.answer) {
    return Err(CoreError::validation("incorrect answer"));
  }
  if node.is_completed {
    return Ok(());
  }

  let node = &mut path.nodes[pos];
  node.is_completed = true;
  node.is_locked = false;
  node.completed_at = Some(at);
  path.history.push(PathEvent::SecretSolved { node_id: node_id.to_string(), at });
  Ok(())
}

/// Reject exam payloads that could never be graded.
pub fn validate_exam(questions: &[ExamQuestion]) -> CoreResult<()> {
  if questions.is_empty() {
    return Err(CoreError::validation("exam has no questions"));
  }
  for (i, q) in questions.iter().enumerate() {
    if q.question.trim().is_empty() {
      return Err(CoreError::validation(format!("question {i} is blank")));
    }
    if q.options.len() < 2 {
      return Err(CoreError::validation(format!("question {i} needs at least two options")));
    }
    if q.answer_index >= q.options.len() {
      return Err(CoreError::validation(format!("question {i} points at a missing option")));
    }
  }
  Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GateOutcome {
  pub correct: usize,
  pub total: usize,
  pub passed: bool,
}

/// Grade a gatekeeper attempt. Passing needs at least `pass_percent` correct.
pub fn grade_gate_exam(exam: &[ExamQuestion], answers: &[usize], pass_percent: u8) -> CoreResult<GateOutcome> {
  validate_exam(exam)?;
  if answers.len() != exam.len() {
    return Err(CoreError::validation(format!(
      "expected {} answers, got {}",
      exam.len(),
      answers.len()
    )));
  }
  let correct = exam.iter().zip(answers).filter(|(q, a)| q.answer_index == **a).count();
  let total = exam.len();
  let passed = correct * 100 >= total * usize::from(pass_percent);
  Ok(GateOutcome { correct, total, passed })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::test_path;
  use crate::domain::AccessState;
  use crate::unlock::compute_access_states;

  fn draft(title: &str, description: &str, kind: &str) -> NodeDraft {
    NodeDraft {
      title: Some(title.into()),
      description: Some(description.into()),
      kind: Some(kind.into()),
      riddle: None,
    }
  }

  fn exam(n: usize) -> Vec<ExamQuestion> {
    (0..n)
      .map(|i| ExamQuestion {
        question: format!("Q{i}"),
        options: vec!["a".into(), "b".into(), "c".into()],
        answer_index: i % 3,
      })
      .collect()
  }

  #[test]
  fn draft_with_all_fields_becomes_a_locked_node() {
    let node = draft("Ownership", "Moves and borrows", "Theory").into_node().unwrap();
    assert_eq!(node.kind, NodeKind::Theory);
    assert!(node.is_locked && !node.is_completed);
    assert!(!node.id.is_empty());
  }

  #[test]
  fn draft_missing_fields_is_rejected() {
    let mut d = draft("Ownership", "", "theory");
    assert!(matches!(d.clone().into_node(), Err(CoreError::Validation(_))));
    d.description = Some("ok".into());
    d.kind = None;
    assert!(matches!(d.clone().into_node(), Err(CoreError::Validation(_))));
    d.kind = Some("dragon".into());
    assert!(matches!(d.into_node(), Err(CoreError::Validation(_))));
  }

  #[test]
  fn secret_draft_requires_a_riddle() {
    let mut d = draft("Hidden", "Bonus", "secret");
    assert!(d.clone().into_node().is_err());
    d.riddle = Some(Riddle { question: "What has keys but no locks?".into(), answer: "piano".into() });
    let node = d.into_node().unwrap();
    assert_eq!(node.kind, NodeKind::Secret);
    assert!(node.riddle.is_some());
  }

  #[test]
  fn one_bad_draft_rejects_the_batch() {
    let drafts = vec![draft("A", "a", "theory"), draft("", "b", "practice")];
    assert!(nodes_from_drafts(drafts).is_err());
  }

  #[test]
  fn create_path_rejects_empty_nodes() {
    let err = create_path("learner", "T", "rust", vec![], PathMetadata::default(), Utc::now()).unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
  }

  #[test]
  fn create_path_unlocks_only_the_first_node() {
    let nodes = vec![
      Node::new("A", "a", NodeKind::Theory),
      Node::new("B", "b", NodeKind::Practice),
      Node::new("C", "c", NodeKind::Challenge),
    ];
    let path = create_path("learner", "", "Rust basics", nodes, PathMetadata::default(), Utc::now()).unwrap();
    assert_eq!(path.title, "Rust basics");
    let locked: Vec<bool> = path.nodes.iter().map(|n| n.is_locked).collect();
    assert_eq!(locked, vec![false, true, true]);
  }

  #[test]
  fn regenerate_keeps_id_and_position() {
    let mut path = test_path(&[true, true, false]);
    let replacement = Node::new("New B", "fresh", NodeKind::Challenge);
    let old = regenerate_node(&mut path, "n1", replacement).unwrap();
    assert_eq!(old.title, "Node 1");
    assert_eq!(path.nodes[1].id, "n1");
    assert_eq!(path.nodes[1].title, "New B");
    assert!(!path.nodes[1].is_completed);
    assert_eq!(
      compute_access_states(&path.nodes),
      vec![AccessState::Done, AccessState::Available, AccessState::Locked]
    );
  }

  #[test]
  fn regenerating_inside_the_done_prefix_keeps_later_nodes_done() {
    let mut path = test_path(&[true, true, true]);
    regenerate_node(&mut path, "n0", Node::new("New A", "fresh", NodeKind::Theory)).unwrap();
    assert_eq!(
      compute_access_states(&path.nodes),
      vec![AccessState::Available, AccessState::Done, AccessState::Done]
    );
    assert!(!path.nodes[0].is_locked);
    assert!(path.nodes[1].is_completed && path.nodes[1].completed_at.is_some());
    assert!(path.nodes[2].is_completed);
  }

  #[test]
  fn regenerate_unknown_node_is_not_found() {
    let mut path = test_path(&[false, false, false]);
    let before = path.clone();
    let err = regenerate_node(&mut path, "zz", Node::new("x", "y", NodeKind::Theory)).unwrap_err();
    assert_eq!(err, CoreError::node_not_found("zz"));
    assert_eq!(path, before);
  }

  #[test]
  fn gate_skip_completes_everything_in_one_event() {
    let mut path = test_path(&[true, false, false, false]);
    let original_stamp = path.nodes[0].completed_at;
    let newly = skip_path_via_gate(&mut path, Utc::now());
    assert_eq!(newly, 3);
    assert!(path.nodes.iter().all(|n| n.is_completed && !n.is_locked));
    assert_eq!(path.nodes[0].completed_at, original_stamp);
    assert_eq!(path.history.len(), 1);
    assert!(compute_access_states(&path.nodes).iter().all(|s| *s == AccessState::Done));
  }

  #[test]
  fn secret_node_is_solved_out_of_order() {
    let mut path = test_path(&[false, false, false, false]);
    path.nodes[3].kind = NodeKind::Secret;
    path.nodes[3].riddle = Some(Riddle { question: "?".into(), answer: "Ferris".into() });

    assert!(matches!(
      solve_secret(&mut path, "n3", "crab", Utc::now()),
      Err(CoreError::Validation(_))
    ));
    assert!(!path.nodes[3].is_completed);

    solve_secret(&mut path, "n3", "  ferris ", Utc::now()).unwrap();
    assert!(path.nodes[3].is_completed);
    assert_eq!(compute_access_states(&path.nodes)[3], AccessState::Done);
  }

  #[test]
  fn solving_a_regular_node_is_rejected() {
    let mut path = test_path(&[false, false, false]);
    assert!(matches!(
      solve_secret(&mut path, "n0", "anything", Utc::now()),
      Err(CoreError::Validation(_))
    ));
  }

  #[test]
  fn gate_exam_pass_threshold_is_inclusive() {
    let questions = exam(5);
    let mut answers: Vec<usize> = questions.iter().map(|q| q.answer_index).collect();
    answers[0] = (answers[0] + 1) % 3;
    let outcome = grade_gate_exam(&questions, &answers, 80).unwrap();
    assert_eq!(outcome, GateOutcome { correct: 4, total: 5, passed: true });

    answers[1] = (answers[1] + 1) % 3;
    assert!(!grade_gate_exam(&questions, &answers, 80).unwrap().passed);
  }

  #[test]
  fn gate_exam_with_wrong_answer_count_is_rejected() {
    assert!(grade_gate_exam(&exam(3), &[0, 1], 80).is_err());
  }

  #[test]
  fn exam_with_out_of_range_answer_is_invalid() {
    let mut questions = exam(2);
    questions[1].answer_index = 7;
    assert!(validate_exam(&questions).is_err());
  }
}
