//! Application state: document store, prompts, progression settings and the optional OpenAI client.
//!
//! This module owns:
//!   - the storage collaborator (in-memory, optionally snapshotted to disk)
//!   - the prompts struct (from TOML or defaults)
//!   - progression settings (gate threshold, batch sizes)
//!   - optional OpenAI client
//!
//! Seed courses come from TOML when configured, otherwise a small demo course
//! is inserted so the teacher dashboard works out of the box.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use tracing::{info, instrument, warn};

use crate::config::{load_agent_config_from_env, AgentConfig, Prompts, ProgressionSettings};
use crate::domain::{CourseStructure, StudentProgressRecord};
use crate::error::{CoreError, CoreResult};
use crate::openai::OpenAI;
use crate::seeds::{demo_course, demo_roster};
use crate::store::{MemoryStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub openai: Option<OpenAI>,
    pub prompts: Prompts,
    pub progression: ProgressionSettings,
}

impl AppState {
    /// Build state from env: load config, open the store, seed courses, init OpenAI.
    #[instrument(level = "info", skip_all)]
    pub async fn from_env() -> CoreResult<Self> {
        let cfg = load_agent_config_from_env().unwrap_or_default();

        let store: Arc<dyn Store> = match std::env::var("STORE_SNAPSHOT_PATH") {
            Ok(file) => Arc::new(MemoryStore::open_snapshot(PathBuf::from(file)).await?),
            Err(_) => {
                info!(target: "pathquest_backend", "STORE_SNAPSHOT_PATH not set; documents live in memory only.");
                Arc::new(MemoryStore::new())
            }
        };

        // Build optional OpenAI client (if API key present).
        let openai = OpenAI::from_env();
        if let Some(oa) = &openai {
            info!(target: "pathquest_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
        } else {
            info!(target: "pathquest_backend", "OpenAI disabled (no OPENAI_API_KEY). Using local fallbacks.");
        }

        Self::with_store(store, openai, cfg).await
    }

    /// Assemble state around an existing store and seed it from `cfg`.
    pub async fn with_store(store: Arc<dyn Store>, openai: Option<OpenAI>, cfg: AgentConfig) -> CoreResult<Self> {
        let state = Self {
            store,
            openai,
            prompts: cfg.prompts.clone(),
            progression: cfg.progression.clone(),
        };
        state.seed(&cfg).await?;
        Ok(state)
    }

    /// Insert seed courses and rosters, never overwriting courses already stored.
    async fn seed(&self, cfg: &AgentConfig) -> CoreResult<()> {
        let (courses, mut rosters): (Vec<CourseStructure>, HashMap<String, Vec<StudentProgressRecord>>) =
            if cfg.courses.is_empty() {
                let course = demo_course();
                let roster = HashMap::from([(course.id.clone(), demo_roster())]);
                (vec![course], roster)
            } else {
                let mut rosters: HashMap<String, Vec<StudentProgressRecord>> = HashMap::new();
                for s in &cfg.students {
                    rosters.entry(s.course_id.clone()).or_default().push(s.to_record());
                }
                (cfg.courses.clone(), rosters)
            };

        for course in courses {
            match self.store.load_course_structure(&course.id).await {
                Ok(_) => {
                    info!(target: "mastery", course_id = %course.id, "Course already stored; seed skipped");
                    continue;
                }
                Err(CoreError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
            self.store.save_course_structure(&course).await?;
            let roster = rosters.remove(&course.id).unwrap_or_default();
            for record in &roster {
                self.store.save_student_progress(&course.id, record).await?;
            }
            info!(target: "mastery", course_id = %course.id, students = roster.len(), "Seeded course");
        }

        for course_id in rosters.keys() {
            warn!(target: "mastery", %course_id, "Roster entries reference an unknown course; ignored");
        }
        Ok(())
    }

    /// State for tests: in-memory store, no model, demo seeds.
    #[cfg(test)]
    pub async fn for_tests() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), None, AgentConfig::default())
            .await
            .expect("in-memory seeding cannot fail")
    }
}
