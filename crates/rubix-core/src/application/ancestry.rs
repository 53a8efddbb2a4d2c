//! Parent-chain walking shared by the lock table, the writer and the engines.

use std::collections::HashSet;

use crate::domain::entities::{Node, NodeId};
use crate::domain::store::{EntityStore, RecordKey};
use crate::error::CoreError;

/// Load a node by id
pub(crate) async fn load_node(
    store: &dyn EntityStore,
    id: &NodeId,
) -> Result<Option<Node>, CoreError> {
    Ok(store
        .get(&RecordKey::Node(id.clone()))
        .await?
        .and_then(|record| record.into_node()))
}

/// Ancestors of `node`, nearest first, ending at the forest root.
///
/// A dangling parent reference or a repeated id means the stored tree is
/// corrupt and yields [`CoreError::InvariantViolation`].
pub(crate) async fn ancestor_path(
    store: &dyn EntityStore,
    node: &Node,
) -> Result<Vec<NodeId>, CoreError> {
    let mut path = Vec::new();
    let mut seen = HashSet::from([node.id.clone()]);
    let mut next = node.parent_id.clone();

    while let Some(parent_id) = next {
        if !seen.insert(parent_id.clone()) {
            return Err(CoreError::InvariantViolation(format!(
                "parent chain of node {} loops through {}",
                node.id, parent_id
            )));
        }
        let parent = load_node(store, &parent_id).await?.ok_or_else(|| {
            CoreError::InvariantViolation(format!(
                "node {} references missing ancestor {}",
                node.id, parent_id
            ))
        })?;
        next = parent.parent_id;
        path.push(parent_id);
    }

    Ok(path)
}

/// Fail with [`CoreError::Conflict`] when `node` no longer sits below
/// `expected`, i.e. it was moved between computing the path and locking it.
pub(crate) async fn ensure_path_unchanged(
    store: &dyn EntityStore,
    node: &Node,
    expected: &[NodeId],
) -> Result<(), CoreError> {
    if ancestor_path(store, node).await? != expected {
        return Err(CoreError::Conflict(format!(
            "node {} was moved while being locked",
            node.id
        )));
    }
    Ok(())
}
