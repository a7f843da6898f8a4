//! Storage collaborator: the document-store seam and its in-memory implementation.
//!
//! Documents are cloned in and out, so callers mutate a private copy and only a
//! successful `save_*` makes the change visible. When a snapshot file is
//! configured, every save rewrites it as one JSON document before the change
//! is applied in memory, and saves are applied one at a time.

use std::{
  collections::{BTreeMap, HashMap},
  path::PathBuf,
  sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use crate::domain::{CourseStructure, Path, StudentProgressRecord};
use crate::error::{CoreError, CoreResult};

#[async_trait]
pub trait Store: Send + Sync {
  async fn load_path(&self, path_id: &str) -> CoreResult<Path>;
  async fn save_path(&self, path: &Path) -> CoreResult<()>;
  async fn list_paths(&self, owner_id: &str) -> CoreResult<Vec<Path>>;

  async fn load_course_structure(&self, course_id: &str) -> CoreResult<CourseStructure>;
  async fn save_course_structure(&self, course: &CourseStructure) -> CoreResult<()>;

  async fn load_all_student_progress(&self, course_id: &str) -> CoreResult<Vec<StudentProgressRecord>>;
  async fn save_student_progress(&self, course_id: &str, record: &StudentProgressRecord) -> CoreResult<()>;
}

type ProgressByCourse = HashMap<String, BTreeMap<String, StudentProgressRecord>>;

#[derive(Clone, Default)]
pub struct MemoryStore {
  paths: Arc<RwLock<HashMap<String, Path>>>,
  courses: Arc<RwLock<HashMap<String, CourseStructure>>>,
  // course id -> student id -> record
  progress: Arc<RwLock<ProgressByCourse>>,
  // Held for the whole of every save so snapshots reach disk in commit order.
  commit: Arc<Mutex<()>>,
  snapshot: Option<PathBuf>,
}

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
  #[serde(default)] paths: HashMap<String, Path>,
  #[serde(default)] courses: HashMap<String, CourseStructure>,
  #[serde(default)] progress: ProgressByCourse,
}

/// One document write.
enum Change<'a> {
  Path(&'a Path),
  Course(&'a CourseStructure),
  Progress(&'a str, &'a StudentProgressRecord),
}

impl Change<'_> {
  fn apply(
    &self,
    paths: &mut HashMap<String, Path>,
    courses: &mut HashMap<String, CourseStructure>,
    progress: &mut ProgressByCourse,
  ) {
    match self {
      Change::Path(p) => {
        paths.insert(p.id.clone(), (*p).clone());
      }
      Change::Course(c) => {
        courses.insert(c.id.clone(), (*c).clone());
      }
      Change::Progress(course_id, r) => {
        progress
          .entry(course_id.to_string())
          .or_default()
          .insert(r.student_id.clone(), (*r).clone());
      }
    }
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Store backed by a JSON snapshot file. A missing file starts empty.
  #[instrument(level = "info", skip_all, fields(file = %file.display()))]
  pub async fn open_snapshot(file: PathBuf) -> CoreResult<Self> {
    let snap = match tokio::fs::read_to_string(&file).await {
      Ok(s) => serde_json::from_str::<Snapshot>(&s)
        .map_err(|e| CoreError::Storage(format!("corrupt snapshot {}: {e}", file.display())))?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
      Err(e) => return Err(CoreError::Storage(format!("cannot read {}: {e}", file.display()))),
    };
    info!(target: "pathquest_backend", paths = snap.paths.len(), courses = snap.courses.len(), "Snapshot loaded");
    Ok(Self {
      paths: Arc::new(RwLock::new(snap.paths)),
      courses: Arc::new(RwLock::new(snap.courses)),
      progress: Arc::new(RwLock::new(snap.progress)),
      commit: Arc::new(Mutex::new(())),
      snapshot: Some(file),
    })
  }

  /// Make one change visible. With a snapshot configured, the file holding the
  /// change is written first; if that fails memory is left as it was.
  async fn commit(&self, change: Change<'_>) -> CoreResult<()> {
    let _order = self.commit.lock().await;

    if let Some(file) = &self.snapshot {
      let mut snap = Snapshot {
        paths: self.paths.read().await.clone(),
        courses: self.courses.read().await.clone(),
        progress: self.progress.read().await.clone(),
      };
      change.apply(&mut snap.paths, &mut snap.courses, &mut snap.progress);
      let body = serde_json::to_string_pretty(&snap).map_err(|e| CoreError::Storage(e.to_string()))?;
      tokio::fs::write(file, body)
        .await
        .map_err(|e| CoreError::Storage(format!("cannot write {}: {e}", file.display())))?;
    }

    let mut paths = self.paths.write().await;
    let mut courses = self.courses.write().await;
    let mut progress = self.progress.write().await;
    change.apply(&mut paths, &mut courses, &mut progress);
    Ok(())
  }
}

#[async_trait]
impl Store for MemoryStore {
  #[instrument(level = "debug", skip(self))]
  async fn load_path(&self, path_id: &str) -> CoreResult<Path> {
    self
      .paths
      .read()
      .await
      .get(path_id)
      .cloned()
      .ok_or_else(|| CoreError::path_not_found(path_id))
  }

  #[instrument(level = "debug", skip(self, path), fields(path_id = %path.id, nodes = path.nodes.len()))]
  async fn save_path(&self, path: &Path) -> CoreResult<()> {
    self.commit(Change::Path(path)).await
  }

  #[instrument(level = "debug", skip(self))]
  async fn list_paths(&self, owner_id: &str) -> CoreResult<Vec<Path>> {
    let mut out: Vec<Path> = self
      .paths
      .read()
      .await
      .values()
      .filter(|p| p.creator_id == owner_id)
      .cloned()
      .collect();
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(out)
  }

  #[instrument(level = "debug", skip(self))]
  async fn load_course_structure(&self, course_id: &str) -> CoreResult<CourseStructure> {
    self
      .courses
      .read()
      .await
      .get(course_id)
      .cloned()
      .ok_or_else(|| CoreError::course_not_found(course_id))
  }

  #[instrument(level = "debug", skip(self, course), fields(course_id = %course.id))]
  async fn save_course_structure(&self, course: &CourseStructure) -> CoreResult<()> {
    self.commit(Change::Course(course)).await
  }

  #[instrument(level = "debug", skip(self))]
  async fn load_all_student_progress(&self, course_id: &str) -> CoreResult<Vec<StudentProgressRecord>> {
    if !self.courses.read().await.contains_key(course_id) {
      return Err(CoreError::course_not_found(course_id));
    }
    let records = self
      .progress
      .read()
      .await
      .get(course_id)
      .map(|by_student| by_student.values().cloned().collect())
      .unwrap_or_default();
    Ok(records)
  }

  #[instrument(level = "debug", skip(self, record), fields(student_id = %record.student_id))]
  async fn save_student_progress(&self, course_id: &str, record: &StudentProgressRecord) -> CoreResult<()> {
    // Courses are never removed, so the check stays valid through the commit.
    if !self.courses.read().await.contains_key(course_id) {
      return Err(CoreError::course_not_found(course_id));
    }
    self.commit(Change::Progress(course_id, record)).await?;
    debug!(target: "mastery", %course_id, student_id = %record.student_id, "Student progress stored");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::test_path;

  fn course(id: &str) -> CourseStructure {
    CourseStructure { id: id.into(), title: "Course".into(), modules: vec![] }
  }

  #[tokio::test]
  async fn saved_path_round_trips_as_a_copy() {
    let store = MemoryStore::new();
    let mut path = test_path(&[false, false, false]);
    store.save_path(&path).await.unwrap();
    path.title = "changed locally".into();
    assert_eq!(store.load_path("p1").await.unwrap().title, "Test path");
  }

  #[tokio::test]
  async fn missing_documents_are_not_found() {
    let store = MemoryStore::new();
    assert_eq!(store.load_path("nope").await.unwrap_err(), CoreError::path_not_found("nope"));
    assert_eq!(store.load_course_structure("c").await.unwrap_err(), CoreError::course_not_found("c"));
    assert!(store.load_all_student_progress("c").await.is_err());
  }

  #[tokio::test]
  async fn paths_are_listed_per_owner() {
    let store = MemoryStore::new();
    let mut a = test_path(&[false, false, false]);
    a.id = "a".into();
    let mut b = test_path(&[false, false, false]);
    b.id = "b".into();
    b.creator_id = "someone-else".into();
    store.save_path(&a).await.unwrap();
    store.save_path(&b).await.unwrap();
    let mine = store.list_paths("learner-1").await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, "a");
  }

  #[tokio::test]
  async fn progress_is_upserted_per_student() {
    let store = MemoryStore::new();
    store.save_course_structure(&course("c1")).await.unwrap();
    let mut rec = StudentProgressRecord { student_id: "s1".into(), ..Default::default() };
    store.save_student_progress("c1", &rec).await.unwrap();
    rec.completed_lessons.insert("l1".into());
    store.save_student_progress("c1", &rec).await.unwrap();

    let all = store.load_all_student_progress("c1").await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].completed_lessons.contains("l1"));
  }

  #[tokio::test]
  async fn snapshot_survives_reopen() {
    let file = std::env::temp_dir().join(format!("pathquest-{}.json", uuid::Uuid::new_v4()));
    let store = MemoryStore::open_snapshot(file.clone()).await.unwrap();
    store.save_path(&test_path(&[true, false, false])).await.unwrap();

    let reopened = MemoryStore::open_snapshot(file.clone()).await.unwrap();
    let path = reopened.load_path("p1").await.unwrap();
    assert!(path.nodes[0].is_completed);
    let _ = std::fs::remove_file(file);
  }

  #[tokio::test]
  async fn corrupt_snapshot_is_a_storage_error() {
    let file = std::env::temp_dir().join(format!("pathquest-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&file, "{ not json").unwrap();
    let err = MemoryStore::open_snapshot(file.clone()).await.err().unwrap();
    assert!(matches!(err, CoreError::Storage(_)));
    let _ = std::fs::remove_file(file);
  }

  #[tokio::test]
  async fn progress_for_unknown_course_is_rejected() {
    let store = MemoryStore::new();
    let rec = StudentProgressRecord { student_id: "s1".into(), ..Default::default() };
    assert!(matches!(store.save_student_progress("zz", &rec).await, Err(CoreError::NotFound { .. })));
  }

  #[tokio::test]
  async fn failed_snapshot_write_leaves_memory_unchanged() {
    let dir = std::env::temp_dir().join(format!("pathquest-missing-{}", uuid::Uuid::new_v4()));
    let store = MemoryStore::open_snapshot(dir.join("snap.json")).await.unwrap();

    let err = store.save_path(&test_path(&[false, false, false])).await.unwrap_err();
    assert!(matches!(err, CoreError::Storage(_)));
    assert_eq!(store.load_path("p1").await.unwrap_err(), CoreError::path_not_found("p1"));

    assert!(store.save_course_structure(&course("c1")).await.is_err());
    assert!(store.load_course_structure("c1").await.is_err());
  }

  #[tokio::test]
  async fn concurrent_saves_all_reach_the_snapshot() {
    let file = std::env::temp_dir().join(format!("pathquest-{}.json", uuid::Uuid::new_v4()));
    let store = MemoryStore::open_snapshot(file.clone()).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..16 {
      let store = store.clone();
      tasks.push(tokio::spawn(async move {
        let mut path = test_path(&[false, false, false]);
        path.id = format!("p{i}");
        store.save_path(&path).await
      }));
    }
    for t in tasks {
      t.await.unwrap().unwrap();
    }

    let reopened = MemoryStore::open_snapshot(file.clone()).await.unwrap();
    assert_eq!(reopened.list_paths("learner-1").await.unwrap().len(), 16);
    let _ = std::fs::remove_file(file);
  }
}
