//! Seed data and local fallbacks used when the AI collaborator is absent or failing.

use crate::domain::{
  AssignmentType, CourseItem, CourseModule, CourseStructure, ExamQuestion, Flashcard, ItemKind, Node, NodeKind, Path,
  StudentProgressRecord, Submission, SubmissionStatus,
};

/// A generic five-step path that keeps the app usable without a model.
pub fn fallback_path_nodes(topic: &str) -> Vec<Node> {
  vec![
    Node::new(format!("{topic}: the big picture"), format!("What {topic} is, why it matters, and the core vocabulary."), NodeKind::Theory),
    Node::new(format!("{topic}: first steps"), format!("Work through three small guided exercises on {topic}."), NodeKind::Practice),
    Node::new(format!("{topic}: how it works"), format!("The mechanisms behind {topic}, one layer deeper."), NodeKind::Theory),
    Node::new(format!("{topic}: boss fight"), format!("A timed challenge mixing everything covered so far on {topic}."), NodeKind::Challenge),
    Node::new(format!("{topic}: hidden chamber"), "A bonus lesson for the curious.".to_string(), NodeKind::Secret)
      .with_riddle("I get bigger the more you take away from me. What am I?", "a hole"),
  ]
}

/// Extra nodes appended after `existing` nodes.
pub fn fallback_extension(topic: &str, existing: usize, count: usize) -> Vec<Node> {
  (0..count)
    .map(|i| {
      let step = existing + i + 1;
      let kind = if (i + 1) % 3 == 0 { NodeKind::Challenge } else if i % 2 == 0 { NodeKind::Theory } else { NodeKind::Practice };
      Node::new(format!("{topic}: step {step}"), format!("Continue with {topic}, building on step {}.", step - 1), kind)
    })
    .collect()
}

pub fn fallback_replacement(topic: &str, context: &str) -> Node {
  Node::new(
    format!("{topic}: another angle"),
    format!("A fresh take on this step. Context: {context}"),
    NodeKind::Practice,
  )
}

pub fn fallback_flashcards(node: &Node) -> Vec<Flashcard> {
  vec![
    Flashcard { front: format!("What is \"{}\" about?", node.title), back: node.description.clone() },
    Flashcard { front: format!("Name one thing to practise after \"{}\".", node.title), back: "Explain it in your own words, then try a small example.".into() },
  ]
}

/// Multiple-choice exam matching node descriptions to node titles.
pub fn fallback_gate_exam(path: &Path, size: usize) -> Vec<ExamQuestion> {
  let candidates: Vec<&Node> = path.nodes.iter().filter(|n| n.kind != NodeKind::Secret).collect();
  candidates
    .iter()
    .take(size.max(1))
    .enumerate()
    .map(|(i, node)| {
      let mut options: Vec<String> = candidates
        .iter()
        .filter(|other| other.id != node.id)
        .take(3)
        .map(|other| other.title.clone())
        .collect();
      if options.is_empty() {
        options.push("None of the above".into());
      }
      let answer_index = i % (options.len() + 1);
      options.insert(answer_index, node.title.clone());
      ExamQuestion {
        question: format!("Which step covers: \"{}\"?", node.description),
        options,
        answer_index,
      }
    })
    .collect()
}

/// Small demo course so the teacher dashboard has something to show.
pub fn demo_course() -> CourseStructure {
  let lesson = |id: &str, title: &str| CourseItem {
    id: id.into(),
    title: title.into(),
    description: String::new(),
    kind: ItemKind::Lesson,
  };
  let assignment = |id: &str, title: &str, assignment_type| CourseItem {
    id: id.into(),
    title: title.into(),
    description: String::new(),
    kind: ItemKind::Assignment { assignment_type },
  };
  CourseStructure {
    id: "demo-course".into(),
    title: "Intro to Programming".into(),
    modules: vec![
      CourseModule {
        id: "m1".into(),
        title: "Basics".into(),
        items: vec![lesson("l1", "Variables"), assignment("q1", "Variables quiz", AssignmentType::Quiz)],
      },
      CourseModule {
        id: "m2".into(),
        title: "Control flow".into(),
        items: vec![lesson("l2", "Loops"), assignment("a1", "Loop project", AssignmentType::File)],
      },
    ],
  }
}

pub fn demo_roster() -> Vec<StudentProgressRecord> {
  let record = |id: &str, lessons: &[&str], subs: &[(&str, SubmissionStatus)]| StudentProgressRecord {
    student_id: id.into(),
    completed_lessons: lessons.iter().map(|s| s.to_string()).collect(),
    submissions: subs
      .iter()
      .map(|(a, status)| Submission { assignment_id: a.to_string(), status: *status })
      .collect(),
  };
  vec![
    record("student-1", &["l1", "l2"], &[("q1", SubmissionStatus::Submitted), ("a1", SubmissionStatus::Submitted)]),
    record("student-2", &["l1"], &[("q1", SubmissionStatus::Pending), ("a1", SubmissionStatus::Pending)]),
    record("student-3", &["l1"], &[]),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::test_path;
  use crate::paths::validate_exam;

  #[test]
  fn fallback_nodes_are_a_valid_path() {
    let nodes = fallback_path_nodes("Rust");
    assert!(nodes.len() >= crate::unlock::MIN_PATH_NODES);
    let secret = nodes.iter().find(|n| n.kind == NodeKind::Secret).expect("one secret node");
    assert!(secret.riddle.is_some());
  }

  #[test]
  fn fallback_exam_is_gradable() {
    let exam = fallback_gate_exam(&test_path(&[false, false, false, false]), 3);
    assert_eq!(exam.len(), 3);
    validate_exam(&exam).unwrap();
    for (q, i) in exam.iter().zip(0..) {
      assert_eq!(q.options[q.answer_index], format!("Node {i}"));
    }
  }

  #[test]
  fn single_node_exam_still_has_two_options() {
    let exam = fallback_gate_exam(&test_path(&[false]), 5);
    assert_eq!(exam.len(), 1);
    validate_exam(&exam).unwrap();
  }
}
