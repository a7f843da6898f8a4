//! Unlock engine: derives per-node access state from a path's completion flags
//! and applies the small set of progression mutations.
//!
//! Progression is strictly linear. Scanning left to right, every completed node
//! is `Done`, the first incomplete node is `Available`, and everything after it
//! is `Locked`. Node kind plays no part in the derived states; routing secret
//! nodes is a render-surface concern (see `view`). A secret node is completed
//! only by answering its riddle (`paths::solve_secret`), never through
//! `mark_completed`.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::domain::{AccessState, Node, NodeKind, Path, PathEvent};
use crate::error::{CoreError, CoreResult};

/// A path never shrinks below this many nodes.
pub const MIN_PATH_NODES: usize = 3;

/// Access state for each node, in sequence order. Empty in, empty out.
pub fn compute_access_states(nodes: &[Node]) -> Vec<AccessState> {
  let mut previous_satisfied = true;
  nodes
    .iter()
    .map(|node| {
      if node.is_completed {
        previous_satisfied = true;
        AccessState::Done
      } else if previous_satisfied {
        previous_satisfied = false;
        AccessState::Available
      } else {
        AccessState::Locked
      }
    })
    .collect()
}

/// Rewrite the stored `is_locked` flags so they agree with the derived states.
pub fn refresh_lock_flags(path: &mut Path) {
  let states = compute_access_states(&path.nodes);
  for (node, state) in path.nodes.iter_mut().zip(states) {
    node.is_locked = state == AccessState::Locked;
  }
}

/// Mark one node completed. The node must not currently be `Locked` and must
/// not be a secret node. Other nodes are left untouched; callers re-derive
/// states afterwards.
#[instrument(level = "debug", skip(path), fields(path_id = %path.id))]
pub fn mark_completed(path: &mut Path, node_id: &str, at: DateTime<Utc>) -> CoreResult<()> {
  let pos = path.position(node_id).ok_or_else(|| CoreError::node_not_found(node_id))?;
  if path.nodes[pos].kind == NodeKind::Secret && !path.nodes[pos].is_completed {
    return Err(CoreError::validation(format!(
      "node {node_id} is a secret node; answer its riddle to complete it"
    )));
  }
  let state = compute_access_states(&path.nodes)[pos];
  match state {
    AccessState::Locked => Err(CoreError::validation(format!(
      "node {node_id} is locked; complete the nodes before it first"
    ))),
    AccessState::Done => {
      debug!(target: "progress", %node_id, "Node already completed");
      Ok(())
    }
    AccessState::Available => {
      let node = &mut path.nodes[pos];
      node.is_completed = true;
      node.is_locked = false;
      node.completed_at = Some(at);
      path.history.push(PathEvent::NodeCompleted { node_id: node_id.to_string(), at });
      Ok(())
    }
  }
}

/// Append nodes to the end of the path. Appended nodes always start locked and incomplete.
pub fn append_nodes(path: &mut Path, new_nodes: Vec<Node>) -> CoreResult<usize> {
  if new_nodes.is_empty() {
    return Err(CoreError::validation("nothing to append"));
  }
  let count = new_nodes.len();
  path.nodes.extend(new_nodes.into_iter().map(|mut n| {
    n.is_locked = true;
    n.is_completed = false;
    n.completed_at = None;
    n
  }));
  path.history.push(PathEvent::NodesAppended { count });
  Ok(count)
}

/// Remove a node, keeping the relative order of the rest.
pub fn delete_node(path: &mut Path, node_id: &str) -> CoreResult<Node> {
  if path.nodes.len() <= MIN_PATH_NODES {
    return Err(CoreError::InvariantViolation(format!(
      "a path must keep at least {MIN_PATH_NODES} nodes (has {})",
      path.nodes.len()
    )));
  }
  let pos = path.position(node_id).ok_or_else(|| CoreError::node_not_found(node_id))?;
  let removed = path.nodes.remove(pos);
  path.history.push(PathEvent::NodeDeleted { node_id: node_id.to_string() });
  Ok(removed)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::test_path;
  use AccessState::*;

  fn now() -> DateTime<Utc> {
    Utc::now()
  }

  #[test]
  fn empty_list_yields_no_states() {
    assert!(compute_access_states(&[]).is_empty());
  }

  #[test]
  fn prefix_done_then_one_available_then_locked() {
    // Every completion pattern up to six nodes.
    for n in 1..=6usize {
      for mask in 0..(1u32 << n) {
        let flags: Vec<bool> = (0..n).map(|i| mask & (1 << i) != 0).collect();
        let path = test_path(&flags);
        let states = compute_access_states(&path.nodes);
        assert_eq!(states.len(), n);

        match flags.iter().position(|done| !done) {
          None => assert!(states.iter().all(|s| *s == Done), "flags={flags:?}"),
          Some(k) => {
            assert!(states[..k].iter().all(|s| *s == Done), "flags={flags:?}");
            assert_eq!(states[k], Available, "flags={flags:?}");
            for (i, s) in states.iter().enumerate().skip(k + 1) {
              let expected = if flags[i] { Done } else { Locked };
              assert_eq!(*s, expected, "flags={flags:?} index={i}");
            }
          }
        }
      }
    }
  }

  #[test]
  fn computing_twice_is_identical() {
    let path = test_path(&[true, false, true, false]);
    assert_eq!(compute_access_states(&path.nodes), compute_access_states(&path.nodes));
  }

  #[test]
  fn completing_the_available_node_moves_the_frontier() {
    let mut path = test_path(&[true, false, false]);
    assert_eq!(compute_access_states(&path.nodes), vec![Done, Available, Locked]);

    let b = path.nodes[1].id.clone();
    mark_completed(&mut path, &b, now()).expect("available node completes");
    assert_eq!(compute_access_states(&path.nodes), vec![Done, Done, Available]);
    assert!(path.nodes[1].completed_at.is_some());
    assert!(matches!(path.history.last(), Some(PathEvent::NodeCompleted { node_id, .. }) if *node_id == b));
  }

  #[test]
  fn completing_a_locked_node_is_rejected_and_changes_nothing() {
    let mut path = test_path(&[false, false, false]);
    let before = path.clone();
    let c = path.nodes[2].id.clone();
    let err = mark_completed(&mut path, &c, now()).unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(path, before);
  }

  #[test]
  fn completing_a_done_node_is_a_no_op() {
    let mut path = test_path(&[true, false, false]);
    let stamp = path.nodes[0].completed_at;
    let a = path.nodes[0].id.clone();
    mark_completed(&mut path, &a, now()).unwrap();
    assert_eq!(path.nodes[0].completed_at, stamp);
    assert!(path.history.is_empty());
  }

  #[test]
  fn secret_nodes_cannot_be_marked_completed() {
    let mut path = test_path(&[true, false, false]);
    path.nodes[1].kind = crate::domain::NodeKind::Secret;
    let before = path.clone();
    let err = mark_completed(&mut path, "n1", now()).unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(path, before);
  }

  #[test]
  fn completing_an_unknown_node_is_not_found() {
    let mut path = test_path(&[false, false, false]);
    let err = mark_completed(&mut path, "missing", now()).unwrap_err();
    assert_eq!(err, CoreError::node_not_found("missing"));
  }

  #[test]
  fn appended_nodes_start_locked_and_incomplete() {
    let mut path = test_path(&[true, true, true]);
    let mut extra = Node::new("Extra", "More work", crate::domain::NodeKind::Practice);
    extra.is_locked = false;
    extra.is_completed = true;
    let count = append_nodes(&mut path, vec![extra]).unwrap();
    assert_eq!(count, 1);
    let last = path.nodes.last().unwrap();
    assert!(last.is_locked && !last.is_completed);
    assert_eq!(compute_access_states(&path.nodes)[3], Available);
  }

  #[test]
  fn appending_nothing_is_rejected() {
    let mut path = test_path(&[false, false, false]);
    assert!(matches!(append_nodes(&mut path, vec![]), Err(CoreError::Validation(_))));
  }

  #[test]
  fn deleting_from_three_nodes_violates_the_minimum() {
    let mut path = test_path(&[false, false, false]);
    let id = path.nodes[1].id.clone();
    let err = delete_node(&mut path, &id).unwrap_err();
    assert!(matches!(err, CoreError::InvariantViolation(_)));
    assert_eq!(path.nodes.len(), 3);
  }

  #[test]
  fn deleting_from_four_nodes_keeps_relative_order() {
    let mut path = test_path(&[true, false, false, false]);
    let ids: Vec<String> = path.nodes.iter().map(|n| n.id.clone()).collect();
    let removed = delete_node(&mut path, &ids[1]).unwrap();
    assert_eq!(removed.id, ids[1]);
    let left: Vec<&str> = path.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(left, vec![ids[0].as_str(), ids[2].as_str(), ids[3].as_str()]);
  }

  #[test]
  fn refresh_lock_flags_matches_derived_states() {
    let mut path = test_path(&[true, false, false, true]);
    for n in path.nodes.iter_mut() {
      n.is_locked = false;
    }
    refresh_lock_flags(&mut path);
    let locked: Vec<bool> = path.nodes.iter().map(|n| n.is_locked).collect();
    assert_eq!(locked, vec![false, false, true, false]);
  }
}
