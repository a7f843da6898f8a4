//! Render-surface view model.
//!
//! Learner paths and class mastery views are different things; they only share
//! this shape so the front end can draw both with the same widgets. Fog of war
//! and click routing live here, not in the unlock engine.

use serde::Serialize;

use crate::aggregate::{ClassMasteryView, MasteryTier};
use crate::domain::{AccessState, Node, NodeKind, Path};
use crate::unlock::compute_access_states;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
  pub id: String,
  pub title: String,
  pub description: String,
  pub visual_kind: NodeKind,
  pub visual_state: AccessState,
  /// False while hidden by fog of war.
  pub revealed: bool,
  pub weak_spot: bool,
}

/// Number of leading nodes drawn: the done prefix, the available node, and one
/// teaser beyond it.
pub fn reveal_horizon(states: &[AccessState]) -> usize {
  match states.iter().position(|s| *s != AccessState::Done) {
    Some(frontier) => (frontier + 2).min(states.len()),
    None => states.len(),
  }
}

pub fn path_views(path: &Path) -> Vec<NodeView> {
  let states = compute_access_states(&path.nodes);
  let horizon = reveal_horizon(&states);
  path
    .nodes
    .iter()
    .zip(states)
    .enumerate()
    .map(|(i, (node, state))| NodeView {
      id: node.id.clone(),
      title: node.title.clone(),
      description: node.description.clone(),
      visual_kind: node.kind,
      visual_state: state,
      revealed: i < horizon || node.kind == NodeKind::Secret,
      weak_spot: false,
    })
    .collect()
}

pub fn mastery_views(view: &ClassMasteryView) -> Vec<NodeView> {
  view
    .items
    .iter()
    .map(|item| NodeView {
      id: item.item_id.clone(),
      title: item.title.clone(),
      description: item.description.clone(),
      visual_kind: item.tier.visual_kind(),
      visual_state: if item.mastered { AccessState::Done } else { AccessState::Available },
      revealed: true,
      weak_spot: item.tier == MasteryTier::Weak,
    })
    .collect()
}

/// Where a click on a node should take the learner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum NodeRoute {
  /// Standard study view. The last node offers to extend the path.
  Study {
    #[serde(rename = "nodeId")]
    node_id: String,
    #[serde(rename = "offerExtension")]
    offer_extension: bool,
  },
  /// Secret nodes open their riddle instead of the study view.
  SolveRiddle {
    #[serde(rename = "nodeId")]
    node_id: String,
    question: String,
  },
  Blocked {
    #[serde(rename = "nodeId")]
    node_id: String,
  },
}

pub fn route_node_click(node: &Node, state: AccessState, is_last_in_sequence: bool) -> NodeRoute {
  let node_id = node.id.clone();
  match node.kind {
    NodeKind::Secret => NodeRoute::SolveRiddle {
      node_id,
      question: node.riddle.as_ref().map(|r| r.question.clone()).unwrap_or_default(),
    },
    NodeKind::Theory | NodeKind::Practice | NodeKind::Challenge => match state {
      AccessState::Locked => NodeRoute::Blocked { node_id },
      AccessState::Available | AccessState::Done => NodeRoute::Study { node_id, offer_extension: is_last_in_sequence },
    },
  }
}
