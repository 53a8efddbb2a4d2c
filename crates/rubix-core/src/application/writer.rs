//! Graph Writer: creation and structural mutation.
//!
//! Every entity starts alive. The writer refuses to hang live data under a
//! dead owner and refuses parent assignments that would close a cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::application::ancestry::{ancestor_path, ensure_path_unchanged, load_node};
use crate::application::locks::{CascadeGuard, CascadeLockTable};
use crate::domain::entities::{
    Edge, EdgeId, Node, NodeId, NodeType, Payload, Port, PortDirection, PortId, Tag, TagKey,
    Value, ValueId,
};
use crate::domain::store::{EntityStore, Record, RecordKey, WriteBatch, WriteOp};
use crate::error::CoreError;

/// Input for [`GraphWriter::create_node`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNode {
    /// Generated when absent
    pub id: Option<NodeId>,
    pub node_type: NodeType,
    pub parent_id: Option<NodeId>,
    pub name: String,
    pub description: String,
}

impl NewNode {
    pub fn new(node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            id: None,
            node_type,
            parent_id: None,
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<NodeId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Default port name: direction plus the first eight characters of the id
pub fn default_port_name(direction: PortDirection, id: &PortId) -> String {
    let prefix: String = id.as_str().chars().take(8).collect();
    match direction {
        PortDirection::Input => format!("Input-{}", prefix),
        PortDirection::Output => format!("Output-{}", prefix),
    }
}

pub struct GraphWriter {
    store: Arc<dyn EntityStore>,
    locks: Arc<CascadeLockTable>,
}

impl GraphWriter {
    pub fn new(store: Arc<dyn EntityStore>, locks: Arc<CascadeLockTable>) -> Self {
        Self { store, locks }
    }

    /// Create a node under an existing, alive parent (or as a forest root)
    #[instrument(skip(self, new_node), fields(name = %new_node.name))]
    pub async fn create_node(&self, new_node: NewNode) -> Result<Node, CoreError> {
        let store = self.store.as_ref();
        let id = new_node.id.unwrap_or_else(NodeId::generate);

        let mut ancestors = Vec::new();
        if let Some(parent_id) = &new_node.parent_id {
            let parent = load_node(store, parent_id)
                .await?
                .ok_or_else(|| CoreError::node_not_found(parent_id))?;
            ancestors.push(parent.id.clone());
            ancestors.extend(ancestor_path(store, &parent).await?);
        }
        // A cascade over any ancestor could otherwise miss the new child
        let _guard = self.locks.try_acquire(&id, ancestors.clone())?;

        if load_node(store, &id).await?.is_some() {
            return Err(CoreError::InvalidArgument(format!("node {} already exists", id)));
        }
        if let Some(parent_id) = &new_node.parent_id {
            let parent = self.require_alive_node(parent_id, "parent").await?;
            ensure_path_unchanged(store, &parent, &ancestors[1..]).await?;
        }

        let node = Node {
            id,
            node_type: new_node.node_type,
            parent_id: new_node.parent_id,
            name: new_node.name,
            description: new_node.description,
            alive: true,
        };
        store.put(Record::Node(node.clone())).await?;

        info!(node_id = %node.id, node_type = node.node_type.as_str(), "Node created");
        Ok(node)
    }

    /// Move `node_id` under `new_parent` (`None` makes it a forest root)
    #[instrument(skip(self), fields(node_id = %node_id))]
    pub async fn reparent_node(
        &self,
        node_id: &NodeId,
        new_parent: Option<&NodeId>,
    ) -> Result<Node, CoreError> {
        let store = self.store.as_ref();
        let node = load_node(store, node_id)
            .await?
            .ok_or_else(|| CoreError::node_not_found(node_id))?;

        let old_path = ancestor_path(store, &node).await?;
        let mut affected = old_path.clone();
        let mut parent_path = Vec::new();

        if let Some(parent_id) = new_parent {
            if parent_id == node_id {
                return Err(CoreError::InvalidArgument(format!(
                    "node {} cannot be its own parent",
                    node_id
                )));
            }
            let parent = load_node(store, parent_id)
                .await?
                .ok_or_else(|| CoreError::node_not_found(parent_id))?;
            parent_path = ancestor_path(store, &parent).await?;
            affected.push(parent.id);
            affected.extend(parent_path.iter().cloned());
        }

        let _guard = self.locks.try_acquire(node_id, affected)?;

        // Validate against what the lock now protects
        let mut node = load_node(store, node_id)
            .await?
            .ok_or_else(|| CoreError::node_not_found(node_id))?;
        ensure_path_unchanged(store, &node, &old_path).await?;

        if let Some(parent_id) = new_parent {
            let parent = load_node(store, parent_id)
                .await?
                .ok_or_else(|| CoreError::node_not_found(parent_id))?;
            ensure_path_unchanged(store, &parent, &parent_path).await?;
            if parent_path.contains(node_id) {
                return Err(CoreError::InvalidArgument(format!(
                    "moving node {} under {} would create a cycle",
                    node_id, parent_id
                )));
            }
            if node.alive && !parent.alive {
                return Err(CoreError::InvalidArgument(format!(
                    "cannot attach alive node {} under dead node {}",
                    node_id, parent_id
                )));
            }
        }

        node.parent_id = new_parent.cloned();
        store.put(Record::Node(node.clone())).await?;

        info!(
            node_id = %node_id,
            parent_id = ?node.parent_id,
            "Node reparented"
        );
        Ok(node)
    }

    /// Create a port on an alive node. An empty name gets the default
    /// `Input-xxxxxxxx` / `Output-xxxxxxxx` form.
    #[instrument(skip(self, name, description), fields(node_id = %node_id))]
    pub async fn create_port(
        &self,
        node_id: &NodeId,
        direction: PortDirection,
        name: impl Into<String> + Send,
        description: impl Into<String> + Send,
    ) -> Result<Port, CoreError> {
        let _guard = self.lock_alive_owners(&[node_id], "port owner").await?;

        let id = PortId::generate();
        let mut name = name.into();
        if name.is_empty() {
            name = default_port_name(direction, &id);
        }

        let port = Port {
            id,
            node_id: node_id.clone(),
            direction,
            name,
            description: description.into(),
            alive: true,
        };
        self.store.put(Record::Port(port.clone())).await?;

        debug!(port_id = %port.id, "Port created");
        Ok(port)
    }

    /// Connect two distinct alive ports
    #[instrument(skip(self, description), fields(from = %from_port_id, to = %to_port_id))]
    pub async fn connect(
        &self,
        from_port_id: &PortId,
        to_port_id: &PortId,
        description: impl Into<String> + Send,
    ) -> Result<Edge, CoreError> {
        if from_port_id == to_port_id {
            return Err(CoreError::InvalidArgument(format!(
                "edge endpoints must differ, got {} twice",
                from_port_id
            )));
        }
        let from = self.load_port(from_port_id).await?;
        let to = self.load_port(to_port_id).await?;

        let _guard = self
            .lock_alive_owners(&[&from.node_id, &to.node_id], "port owner")
            .await?;
        self.require_alive_port(from_port_id).await?;
        self.require_alive_port(to_port_id).await?;

        let edge = Edge {
            id: EdgeId::generate(),
            from_port_id: from_port_id.clone(),
            to_port_id: to_port_id.clone(),
            description: description.into(),
            alive: true,
        };
        self.store.put(Record::Edge(edge.clone())).await?;

        debug!(edge_id = %edge.id, "Edge created");
        Ok(edge)
    }

    /// Append an unsynced observation to an alive port
    pub async fn record_value(
        &self,
        port_id: &PortId,
        timestamp: DateTime<Utc>,
        payload: Payload,
    ) -> Result<Value, CoreError> {
        let port = self.load_port(port_id).await?;
        let _guard = self
            .lock_alive_owners(&[&port.node_id], "port owner")
            .await?;
        self.require_alive_port(port_id).await?;

        let value = Value {
            id: ValueId::generate(),
            port_id: port_id.clone(),
            timestamp,
            payload,
            synced: false,
            synced_at: None,
            alive: true,
        };
        self.store.put(Record::Value(value.clone())).await?;
        Ok(value)
    }

    /// Mark a value as synced. Already-synced values are returned unchanged.
    pub async fn mark_synced(&self, value_id: &ValueId) -> Result<Value, CoreError> {
        let mut value = self
            .store
            .get(&RecordKey::Value(value_id.clone()))
            .await?
            .and_then(Record::into_value)
            .ok_or_else(|| CoreError::NotFound(format!("value {}", value_id)))?;

        if value.synced {
            return Ok(value);
        }

        let synced_at = Utc::now();
        self.store
            .commit(WriteBatch::single(WriteOp::MarkSynced {
                value_id: value_id.clone(),
                synced_at,
            }))
            .await?;

        value.synced = true;
        value.synced_at = Some(synced_at);
        Ok(value)
    }

    /// Tag an alive node. Repeating an existing `(key, value)` is a no-op.
    pub async fn tag_node(
        &self,
        node_id: &NodeId,
        key: impl Into<String> + Send,
        value: impl Into<String> + Send,
    ) -> Result<Tag, CoreError> {
        let (key, value) = (key.into(), value.into());
        if key.is_empty() {
            return Err(CoreError::InvalidArgument("tag key must not be empty".to_string()));
        }
        let _guard = self.lock_alive_owners(&[node_id], "tagged node").await?;

        let tag = Tag {
            node_id: node_id.clone(),
            key,
            value,
            alive: true,
        };
        self.store.put(Record::Tag(tag.clone())).await?;
        Ok(tag)
    }

    /// Remove a tag row. Returns whether it existed.
    pub async fn untag_node(
        &self,
        node_id: &NodeId,
        key: impl Into<String> + Send,
        value: impl Into<String> + Send,
    ) -> Result<bool, CoreError> {
        let key = RecordKey::Tag(TagKey {
            node_id: node_id.clone(),
            key: key.into(),
            value: value.into(),
        });
        if self.store.get(&key).await?.is_none() {
            return Ok(false);
        }
        self.store.hard_delete(key).await?;
        Ok(true)
    }

    /// Permanently remove a node, its descendants and everything they own
    #[instrument(skip(self), fields(node_id = %node_id))]
    pub async fn hard_delete_node(&self, node_id: &NodeId) -> Result<(), CoreError> {
        let store = self.store.as_ref();
        let node = load_node(store, node_id)
            .await?
            .ok_or_else(|| CoreError::node_not_found(node_id))?;
        let ancestors = ancestor_path(store, &node).await?;
        let _guard = self.locks.try_acquire(node_id, ancestors.clone())?;

        let node = load_node(store, node_id)
            .await?
            .ok_or_else(|| CoreError::node_not_found(node_id))?;
        ensure_path_unchanged(store, &node, &ancestors).await?;

        store.hard_delete(RecordKey::Node(node_id.clone())).await?;

        info!(node_id = %node_id, "Node hard-deleted");
        Ok(())
    }

    /// Permanently remove a port with its values and incident edges
    pub async fn hard_delete_port(&self, port_id: &PortId) -> Result<(), CoreError> {
        let key = RecordKey::Port(port_id.clone());
        if self.store.get(&key).await?.is_none() {
            return Err(CoreError::NotFound(format!("port {}", port_id)));
        }
        self.store.hard_delete(key).await?;
        debug!(port_id = %port_id, "Port hard-deleted");
        Ok(())
    }

    pub async fn hard_delete_edge(&self, edge_id: &EdgeId) -> Result<(), CoreError> {
        let key = RecordKey::Edge(edge_id.clone());
        if self.store.get(&key).await?.is_none() {
            return Err(CoreError::NotFound(format!("edge {}", edge_id)));
        }
        self.store.hard_delete(key).await?;
        Ok(())
    }

    async fn require_alive_node(&self, id: &NodeId, role: &str) -> Result<Node, CoreError> {
        let node = load_node(self.store.as_ref(), id)
            .await?
            .ok_or_else(|| CoreError::node_not_found(id))?;
        if !node.alive {
            return Err(CoreError::InvalidArgument(format!("{} {} is dead", role, id)));
        }
        Ok(node)
    }

    /// Lock `owners` against overlapping cascades, then re-check under the
    /// guard that each is still alive and still where it was when locked.
    async fn lock_alive_owners(
        &self,
        owners: &[&NodeId],
        role: &str,
    ) -> Result<CascadeGuard, CoreError> {
        let store = self.store.as_ref();

        let mut entries = Vec::with_capacity(owners.len());
        for id in owners {
            let node = load_node(store, id)
                .await?
                .ok_or_else(|| CoreError::node_not_found(id))?;
            let path = ancestor_path(store, &node).await?;
            entries.push((node.id, path));
        }
        let guard = self.locks.try_acquire_all(entries.clone())?;

        for (id, path) in &entries {
            let node = self.require_alive_node(id, role).await?;
            ensure_path_unchanged(store, &node, path).await?;
        }
        Ok(guard)
    }

    async fn load_port(&self, id: &PortId) -> Result<Port, CoreError> {
        self.store
            .get(&RecordKey::Port(id.clone()))
            .await?
            .and_then(Record::into_port)
            .ok_or_else(|| CoreError::NotFound(format!("port {}", id)))
    }

    async fn require_alive_port(&self, id: &PortId) -> Result<Port, CoreError> {
        let port = self.load_port(id).await?;
        if !port.alive {
            return Err(CoreError::InvalidArgument(format!("port {} is dead", id)));
        }
        Ok(port)
    }
}
