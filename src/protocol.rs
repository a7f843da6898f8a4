//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::ClassMasteryView;
use crate::domain::{AccessState, ExamQuestion, Flashcard, Node, NodeKind, Path, PathEvent, PathMetadata, Wager};
use crate::error::CoreError;
use crate::paths::{GateOutcome, NodeDraft};
use crate::unlock::compute_access_states;
use crate::view::{mastery_views, path_views, NodeView};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    GetPath {
        #[serde(rename = "pathId")]
        path_id: String,
    },
    CompleteNode {
        #[serde(rename = "pathId")]
        path_id: String,
        #[serde(rename = "nodeId")]
        node_id: String,
    },
    ExtendPath {
        #[serde(rename = "pathId")]
        path_id: String,
        #[serde(default)]
        count: Option<usize>,
    },
    CourseMastery {
        #[serde(rename = "courseId")]
        course_id: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Path {
        path: PathOut,
    },
    Mastery {
        mastery: MasteryOut,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl From<CoreError> for ServerWsMessage {
    fn from(e: CoreError) -> Self {
        ServerWsMessage::Error { kind: e.kind().into(), message: e.to_string() }
    }
}

/// Riddle as shown to the learner: the question only.
#[derive(Debug, Serialize)]
pub struct RiddleOut {
    pub question: String,
}

/// Learner-facing node. Riddle answers and cached exam keys stay server-side.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOut {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: NodeKind,
    pub is_locked: bool,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub riddle: Option<RiddleOut>,
}

impl From<Node> for NodeOut {
    fn from(n: Node) -> Self {
        Self {
            id: n.id,
            title: n.title,
            description: n.description,
            kind: n.kind,
            is_locked: n.is_locked,
            is_completed: n.is_completed,
            completed_at: n.completed_at,
            riddle: n.riddle.map(|r| RiddleOut { question: r.question }),
        }
    }
}

/// Learner-facing path document. The gate exam is fetched separately, without answers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerPathOut {
    pub id: String,
    pub creator_id: String,
    pub title: String,
    pub topic: String,
    pub nodes: Vec<NodeOut>,
    pub wager: Option<Wager>,
    pub created_at: DateTime<Utc>,
    pub history: Vec<PathEvent>,
    pub gate_exam_ready: bool,
}

impl From<Path> for LearnerPathOut {
    fn from(p: Path) -> Self {
        Self {
            gate_exam_ready: p.gate_exam.is_some(),
            id: p.id,
            creator_id: p.creator_id,
            title: p.title,
            topic: p.topic,
            nodes: p.nodes.into_iter().map(NodeOut::from).collect(),
            wager: p.wager,
            created_at: p.created_at,
            history: p.history,
        }
    }
}

/// Path document plus everything the render surface derives from it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathOut {
    pub path: LearnerPathOut,
    pub access_states: Vec<AccessState>,
    pub views: Vec<NodeView>,
}

pub fn to_path_out(path: Path) -> PathOut {
    PathOut {
        access_states: compute_access_states(&path.nodes),
        views: path_views(&path),
        path: path.into(),
    }
}

#[derive(Debug, Serialize)]
pub struct MasteryOut {
    pub view: ClassMasteryView,
    pub nodes: Vec<NodeView>,
}

pub fn to_mastery_out(view: ClassMasteryView) -> MasteryOut {
    MasteryOut { nodes: mastery_views(&view), view }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePathIn {
    pub owner_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub topic: String,
    pub nodes: Vec<NodeDraft>,
    #[serde(default)]
    pub metadata: PathMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePathIn {
    pub owner_id: String,
    pub topic: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: PathMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathSummaryOut {
    pub id: String,
    pub title: String,
    pub topic: String,
    pub completed: usize,
    pub total: usize,
}

impl From<&Path> for PathSummaryOut {
    fn from(p: &Path) -> Self {
        Self {
            id: p.id.clone(),
            title: p.title.clone(),
            topic: p.topic.clone(),
            completed: p.completed_count(),
            total: p.nodes.len(),
        }
    }
}

#[derive(Deserialize)]
pub struct SecretIn {
    pub answer: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtendIn {
    #[serde(default)]
    pub count: Option<usize>,
}

#[derive(Serialize)]
pub struct FlashcardsOut {
    pub flashcards: Vec<Flashcard>,
}

/// Exam question as shown to the learner: no answer key.
#[derive(Debug, Serialize)]
pub struct GateQuestionOut {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GateExamOut {
    pub questions: Vec<GateQuestionOut>,
}

pub fn to_gate_exam_out(exam: Vec<ExamQuestion>) -> GateExamOut {
    GateExamOut {
        questions: exam
            .into_iter()
            .map(|q| GateQuestionOut { question: q.question, options: q.options })
            .collect(),
    }
}

#[derive(Deserialize)]
pub struct GateAttemptIn {
    pub answers: Vec<usize>,
}

#[derive(Serialize)]
pub struct GateAttemptOut {
    pub outcome: GateOutcome,
    pub path: PathOut,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub ai_enabled: bool,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: &'static str,
    pub message: String,
}
