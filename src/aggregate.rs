//! Class-wide mastery projection for the teacher dashboard.
//!
//! The view is rebuilt on every request from the course structure and the
//! roster's progress records. It is never persisted, never feeds back into a
//! learner's path, and carries no lock semantics.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::domain::{
  AssignmentType, CourseItem, CourseStructure, ItemKind, NodeKind, StudentProgressRecord, SubmissionStatus,
};

/// Three-tier classification of one curriculum item's completion rate.
/// Boundaries belong to the higher tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryTier {
  /// Below 50 %: flagged as a weak spot.
  Weak,
  /// 50 % up to (not including) 80 %.
  Developing,
  /// 80 % and above.
  Mastered,
}

impl MasteryTier {
  /// Exact integer comparison; no students means nobody has mastered anything.
  pub fn from_counts(completed: usize, total: usize) -> Self {
    if total == 0 {
      MasteryTier::Weak
    } else if completed * 10 >= total * 8 {
      MasteryTier::Mastered
    } else if completed * 2 >= total {
      MasteryTier::Developing
    } else {
      MasteryTier::Weak
    }
  }

  /// Node kind the render surface draws this tier with.
  pub fn visual_kind(&self) -> NodeKind {
    match self {
      MasteryTier::Weak => NodeKind::Challenge,
      MasteryTier::Developing => NodeKind::Theory,
      MasteryTier::Mastered => NodeKind::Practice,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMastery {
  pub item_id: String,
  pub module_id: String,
  pub title: String,
  pub description: String,
  pub completed_count: usize,
  pub rate: f64,
  pub tier: MasteryTier,
  pub mastered: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMasteryView {
  pub course_id: String,
  pub title: String,
  pub total_students: usize,
  pub items: Vec<ItemMastery>,
}

impl ClassMasteryView {
  pub fn weak_spots(&self) -> impl Iterator<Item = &ItemMastery> {
    self.items.iter().filter(|i| i.tier == MasteryTier::Weak)
  }
}

/// Did this student finish this item?
///
/// Lessons count when present in the lesson-progress set. File assignments need a
/// submission with status `submitted`; quizzes count on any submission.
pub fn is_item_done(item: &CourseItem, record: &StudentProgressRecord) -> bool {
  match &item.kind {
    ItemKind::Lesson => record.completed_lessons.contains(&item.id),
    ItemKind::Assignment { assignment_type: AssignmentType::File } => record
      .submissions
      .iter()
      .any(|s| s.assignment_id == item.id && s.status == SubmissionStatus::Submitted),
    ItemKind::Assignment { assignment_type: AssignmentType::Quiz } => {
      record.submissions.iter().any(|s| s.assignment_id == item.id)
    }
  }
}

#[instrument(level = "debug", skip_all, fields(course_id = %course.id, records = records.len()))]
pub fn build_aggregate_view(course: &CourseStructure, records: &[StudentProgressRecord]) -> ClassMasteryView {
  // A student with several records is still one student.
  let mut by_student: BTreeMap<&str, Vec<&StudentProgressRecord>> = BTreeMap::new();
  for r in records {
    by_student.entry(r.student_id.as_str()).or_default().push(r);
  }
  let total_students = by_student.len();

  let items: Vec<ItemMastery> = course
    .items()
    .map(|(module, item)| {
      let completed_count = by_student
        .values()
        .filter(|recs| recs.iter().any(|r| is_item_done(item, r)))
        .count();
      let rate = if total_students == 0 { 0.0 } else { completed_count as f64 / total_students as f64 };
      let tier = MasteryTier::from_counts(completed_count, total_students);
      ItemMastery {
        item_id: item.id.clone(),
        module_id: module.id.clone(),
        title: item.title.clone(),
        description: item.description.clone(),
        completed_count,
        rate,
        tier,
        mastered: tier == MasteryTier::Mastered,
      }
    })
    .collect();

  let view = ClassMasteryView {
    course_id: course.id.clone(),
    title: course.title.clone(),
    total_students,
    items,
  };
  debug!(target: "mastery", items = view.items.len(), weak = view.weak_spots().count(), total_students, "Built class mastery view");
  view
}
