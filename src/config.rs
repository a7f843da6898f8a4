//! Loading agent configuration (prompts, progression settings, seed courses) from TOML.
//!
//! See `AgentConfig` and `Prompts` for expected schema.

use std::collections::BTreeSet;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{CourseStructure, StudentProgressRecord, Submission};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub progression: ProgressionSettings,
  #[serde(default)]
  pub courses: Vec<CourseStructure>,
  #[serde(default)]
  pub students: Vec<StudentSeed>,
}

/// Roster entry accepted in TOML configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct StudentSeed {
  pub course_id: String,
  pub student_id: String,
  #[serde(default)] pub completed_lessons: Vec<String>,
  #[serde(default)] pub submissions: Vec<Submission>,
}

impl StudentSeed {
  pub fn to_record(&self) -> StudentProgressRecord {
    StudentProgressRecord {
      student_id: self.student_id.clone(),
      completed_lessons: self.completed_lessons.iter().cloned().collect::<BTreeSet<_>>(),
      submissions: self.submissions.clone(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProgressionSettings {
  /// Percentage of correct gatekeeper answers needed to skip a whole path.
  pub gate_pass_percent: u8,
  /// Nodes added per "extend path" request when the caller gives no count.
  pub extend_batch: usize,
  pub gate_exam_size: usize,
  /// Node count requested from the model for a brand new path.
  pub path_length: usize,
}

impl Default for ProgressionSettings {
  fn default() -> Self {
    Self { gate_pass_percent: 80, extend_batch: 3, gate_exam_size: 5, path_length: 6 }
  }
}

/// Prompts used by the OpenAI client. Defaults are sensible for general curricula.
/// You can override them in TOML if you need to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Whole path
  pub path_system: String,
  pub path_user_template: String,
  // Single replacement node
  pub node_system: String,
  pub node_user_template: String,
  // Extension
  pub extend_user_template: String,
  // Study material
  pub flashcards_system: String,
  pub flashcards_user_template: String,
  // Gatekeeper exam
  pub gate_exam_system: String,
  pub gate_exam_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      path_system: "You design gamified learning paths. Respond ONLY with strict JSON.".into(),
      path_user_template: "Create a learning path about '{topic}' with {count} steps. Return JSON {\"nodes\": [{\"title\": string, \"description\": string, \"kind\": \"theory\"|\"practice\"|\"challenge\"|\"secret\", \"riddle\": {\"question\": string, \"answer\": string} | null}]}. Order steps from easiest to hardest. Use at most one secret node, and give it a riddle.".into(),
      node_system: "You write single steps of a learning path. Respond ONLY with strict JSON.".into(),
      node_user_template: "Topic: {topic}\nPosition in the path: {context}\nWrite ONE replacement step. Return JSON {\"title\": string, \"description\": string, \"kind\": \"theory\"|\"practice\"|\"challenge\"}.".into(),
      extend_user_template: "Topic: {topic}\nThe path so far: {context}\nContinue it with {count} new steps that build on the last one. Return JSON {\"nodes\": [{\"title\": string, \"description\": string, \"kind\": \"theory\"|\"practice\"|\"challenge\"}]}.".into(),
      flashcards_system: "You write concise study flashcards. Respond ONLY with strict JSON.".into(),
      flashcards_user_template: "Step: {title}\nDetails: {description}\nReturn JSON {\"flashcards\": [{\"front\": string, \"back\": string}]} with 5 cards.".into(),
      gate_exam_system: "You write fair multiple-choice exams. Respond ONLY with strict JSON.".into(),
      gate_exam_user_template: "Topic: {topic}\nSteps:\n{outline}\nWrite {count} questions covering the whole path. Return JSON {\"questions\": [{\"question\": string, \"options\": [string], \"answerIndex\": number}]}.".into(),
    }
  }
}

/// Parse a TOML document into `AgentConfig`.
pub fn parse_agent_config(s: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(s)
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "pathquest_backend", %path, courses = cfg.courses.len(), students = cfg.students.len(), "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "pathquest_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "pathquest_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
