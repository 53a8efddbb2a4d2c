//! Entity Store interface
//!
//! This module defines the storage substrate consumed by the engines: keyed
//! records, composite secondary-index keys shared by every backend, paged
//! index scans and atomic write batches. External crates implement
//! [`EntityStore`] to provide different persistence mechanisms.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::entities::{
    Edge, EdgeId, Node, NodeId, Port, PortId, Tag, TagKey, Value, ValueId,
};
use crate::error::StoreError;

/// A stored record of any entity kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    Node(Node),
    Port(Port),
    Edge(Edge),
    Value(Value),
    Tag(Tag),
}

impl Record {
    /// Primary key of the record
    pub fn key(&self) -> RecordKey {
        match self {
            Record::Node(node) => RecordKey::Node(node.id.clone()),
            Record::Port(port) => RecordKey::Port(port.id.clone()),
            Record::Edge(edge) => RecordKey::Edge(edge.id.clone()),
            Record::Value(value) => RecordKey::Value(value.id.clone()),
            Record::Tag(tag) => RecordKey::Tag(tag.key()),
        }
    }

    pub fn alive(&self) -> bool {
        match self {
            Record::Node(node) => node.alive,
            Record::Port(port) => port.alive,
            Record::Edge(edge) => edge.alive,
            Record::Value(value) => value.alive,
            Record::Tag(tag) => tag.alive,
        }
    }

    pub fn set_alive(&mut self, alive: bool) {
        match self {
            Record::Node(node) => node.alive = alive,
            Record::Port(port) => port.alive = alive,
            Record::Edge(edge) => edge.alive = alive,
            Record::Value(value) => value.alive = alive,
            Record::Tag(tag) => tag.alive = alive,
        }
    }

    pub fn into_node(self) -> Option<Node> {
        match self {
            Record::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn into_port(self) -> Option<Port> {
        match self {
            Record::Port(port) => Some(port),
            _ => None,
        }
    }

    pub fn into_edge(self) -> Option<Edge> {
        match self {
            Record::Edge(edge) => Some(edge),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Record::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_tag(self) -> Option<Tag> {
        match self {
            Record::Tag(tag) => Some(tag),
            _ => None,
        }
    }
}

/// Primary key of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKey {
    Node(NodeId),
    Port(PortId),
    Edge(EdgeId),
    Value(ValueId),
    Tag(TagKey),
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Node(id) => write!(f, "node {}", id),
            RecordKey::Port(id) => write!(f, "port {}", id),
            RecordKey::Edge(id) => write!(f, "edge {}", id),
            RecordKey::Value(id) => write!(f, "value {}", id),
            RecordKey::Tag(key) => write!(f, "tag {}", key),
        }
    }
}

/// Encode a boolean index column
pub fn encode_bool(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

/// Decode a boolean index column
pub fn decode_bool(value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

/// Encode a timestamp index column; fixed width so string order is time order
pub fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Decode a timestamp index column
pub fn decode_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Composite secondary-index key: indexed columns followed by the primary key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexKey(pub Vec<String>);

impl IndexKey {
    pub fn starts_with(&self, prefix: &IndexKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }
}

/// Secondary indexes every backend maintains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexName {
    /// `(parent_id, alive, id)` on nodes; roots have an empty parent column
    NodesByParent,
    /// `(node_id, alive, id)` on ports
    PortsByNode,
    /// `(port_id, alive, timestamp, id)` on values
    ValuesByPort,
    /// `(from_port_id, alive, id)` on edges
    EdgesByFromPort,
    /// `(to_port_id, alive, id)` on edges
    EdgesByToPort,
    /// `(node_id, alive, key, value)` on tags
    TagsByNode,
    /// `(key, value, alive, node_id)` on tags
    TagsByKeyValue,
}

impl IndexName {
    pub const ALL: [IndexName; 7] = [
        IndexName::NodesByParent,
        IndexName::PortsByNode,
        IndexName::ValuesByPort,
        IndexName::EdgesByFromPort,
        IndexName::EdgesByToPort,
        IndexName::TagsByNode,
        IndexName::TagsByKeyValue,
    ];

    /// Full index key of `record`, or `None` when the index does not cover its kind
    pub fn key_for(&self, record: &Record) -> Option<IndexKey> {
        let columns = match (self, record) {
            (IndexName::NodesByParent, Record::Node(node)) => vec![
                node.parent_id
                    .as_ref()
                    .map(|p| p.0.clone())
                    .unwrap_or_default(),
                encode_bool(node.alive),
                node.id.0.clone(),
            ],
            (IndexName::PortsByNode, Record::Port(port)) => vec![
                port.node_id.0.clone(),
                encode_bool(port.alive),
                port.id.0.clone(),
            ],
            (IndexName::ValuesByPort, Record::Value(value)) => vec![
                value.port_id.0.clone(),
                encode_bool(value.alive),
                encode_timestamp(&value.timestamp),
                value.id.0.clone(),
            ],
            (IndexName::EdgesByFromPort, Record::Edge(edge)) => vec![
                edge.from_port_id.0.clone(),
                encode_bool(edge.alive),
                edge.id.0.clone(),
            ],
            (IndexName::EdgesByToPort, Record::Edge(edge)) => vec![
                edge.to_port_id.0.clone(),
                encode_bool(edge.alive),
                edge.id.0.clone(),
            ],
            (IndexName::TagsByNode, Record::Tag(tag)) => vec![
                tag.node_id.0.clone(),
                encode_bool(tag.alive),
                tag.key.clone(),
                tag.value.clone(),
            ],
            (IndexName::TagsByKeyValue, Record::Tag(tag)) => vec![
                tag.key.clone(),
                tag.value.clone(),
                encode_bool(tag.alive),
                tag.node_id.0.clone(),
            ],
            _ => return None,
        };
        Some(IndexKey(columns))
    }

    /// Number of columns in a full key of this index
    pub fn width(&self) -> usize {
        match self {
            IndexName::ValuesByPort | IndexName::TagsByNode | IndexName::TagsByKeyValue => 4,
            _ => 3,
        }
    }
}

/// A prefix range scan over one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexScan {
    /// Children of `parent_id` (`None` scans forest roots)
    NodesByParent {
        parent_id: Option<NodeId>,
        alive: Option<bool>,
    },
    PortsByNode {
        node_id: NodeId,
        alive: Option<bool>,
    },
    ValuesByPort {
        port_id: PortId,
        alive: Option<bool>,
    },
    EdgesByFromPort {
        port_id: PortId,
        alive: Option<bool>,
    },
    EdgesByToPort {
        port_id: PortId,
        alive: Option<bool>,
    },
    TagsByNode {
        node_id: NodeId,
        alive: Option<bool>,
    },
    /// Exact `(key, value)` match; `value: None` scans every value of `key`
    /// and cannot constrain `alive`.
    TagsByKeyValue {
        key: String,
        value: Option<String>,
        alive: Option<bool>,
    },
}

impl IndexScan {
    pub fn index(&self) -> IndexName {
        match self {
            IndexScan::NodesByParent { .. } => IndexName::NodesByParent,
            IndexScan::PortsByNode { .. } => IndexName::PortsByNode,
            IndexScan::ValuesByPort { .. } => IndexName::ValuesByPort,
            IndexScan::EdgesByFromPort { .. } => IndexName::EdgesByFromPort,
            IndexScan::EdgesByToPort { .. } => IndexName::EdgesByToPort,
            IndexScan::TagsByNode { .. } => IndexName::TagsByNode,
            IndexScan::TagsByKeyValue { .. } => IndexName::TagsByKeyValue,
        }
    }

    /// Leading index columns this scan is bound to
    pub fn prefix(&self) -> IndexKey {
        fn with_alive(mut columns: Vec<String>, alive: &Option<bool>) -> IndexKey {
            if let Some(alive) = alive {
                columns.push(encode_bool(*alive));
            }
            IndexKey(columns)
        }

        match self {
            IndexScan::NodesByParent { parent_id, alive } => with_alive(
                vec![parent_id.as_ref().map(|p| p.0.clone()).unwrap_or_default()],
                alive,
            ),
            IndexScan::PortsByNode { node_id, alive } | IndexScan::TagsByNode { node_id, alive } => {
                with_alive(vec![node_id.0.clone()], alive)
            }
            IndexScan::ValuesByPort { port_id, alive }
            | IndexScan::EdgesByFromPort { port_id, alive }
            | IndexScan::EdgesByToPort { port_id, alive } => {
                with_alive(vec![port_id.0.clone()], alive)
            }
            IndexScan::TagsByKeyValue { key, value, alive } => match value {
                Some(value) => with_alive(vec![key.clone(), value.clone()], alive),
                None => IndexKey(vec![key.clone()]),
            },
        }
    }
}

/// Resume point of a scan: the full index key of the last entry returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken(pub IndexKey);

impl ContinuationToken {
    /// Opaque string form for callers that page across process boundaries
    pub fn encode(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(&self.0 .0)?)
    }

    pub fn decode(token: &str) -> Result<Self, StoreError> {
        let columns: Vec<String> = serde_json::from_str(token)
            .map_err(|e| StoreError::InvalidToken(format!("{}: {}", token, e)))?;
        Ok(Self(IndexKey(columns)))
    }

    /// Reject tokens that were not produced by a scan with this prefix
    pub fn validate(&self, scan: &IndexScan) -> Result<(), StoreError> {
        let index = scan.index();
        if self.0 .0.len() != index.width() || !self.0.starts_with(&scan.prefix()) {
            return Err(StoreError::InvalidToken(format!(
                "token {:?} does not belong to a {:?} scan",
                self.0 .0, index
            )));
        }
        Ok(())
    }
}

/// One page of scan results, in index order
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPage {
    pub records: Vec<Record>,
    /// `None` once the scan is exhausted
    pub next: Option<ContinuationToken>,
}

/// A single mutation inside a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or replace a record by primary key
    Put(Record),
    /// Flip the alive flag of an existing record
    SetAlive { key: RecordKey, alive: bool },
    /// Mark an existing value as synced
    MarkSynced {
        value_id: ValueId,
        synced_at: DateTime<Utc>,
    },
    /// Permanently remove a record. Deleting a node removes its descendant
    /// nodes and every port, value, edge and tag they own; deleting a port
    /// removes its values and incident edges.
    HardDelete(RecordKey),
}

/// Ordered set of mutations committed atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(op: WriteOp) -> Self {
        Self { ops: vec![op] }
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn set_alive(&mut self, key: RecordKey, alive: bool) {
        self.push(WriteOp::SetAlive { key, alive });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Keyed storage with secondary indexes and atomic multi-row writes
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Point lookup by primary key
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>, StoreError>;

    /// Return up to `limit` records matching `scan`, in index order, starting
    /// strictly after `after` when given.
    async fn scan(
        &self,
        scan: &IndexScan,
        after: Option<&ContinuationToken>,
        limit: usize,
    ) -> Result<ScanPage, StoreError>;

    /// Apply every op in `batch` or none of them
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Insert or replace one record
    async fn put(&self, record: Record) -> Result<(), StoreError> {
        self.commit(WriteBatch::single(WriteOp::Put(record))).await
    }

    /// Permanently remove one record and everything it structurally owns
    async fn hard_delete(&self, key: RecordKey) -> Result<(), StoreError> {
        self.commit(WriteBatch::single(WriteOp::HardDelete(key))).await
    }
}

/// Lazily page through `scan`, fetching `page_size` records per round trip
pub fn scan_stream<'a>(
    store: &'a dyn EntityStore,
    scan: IndexScan,
    page_size: usize,
) -> BoxStream<'a, Result<Record, StoreError>> {
    let page_size = page_size.max(1);
    // `Some(None)` means "start from the beginning", `None` means exhausted
    let initial: Option<Option<ContinuationToken>> = Some(None);

    stream::try_unfold((scan, initial), move |(scan, cursor)| async move {
        let after = match cursor {
            Some(after) => after,
            None => return Ok::<_, StoreError>(None),
        };
        let page = store.scan(&scan, after.as_ref(), page_size).await?;
        let cursor = page.next.map(Some);
        Ok(Some((page.records, (scan, cursor))))
    })
    .map_ok(|records| stream::iter(records.into_iter().map(Ok::<Record, StoreError>)))
    .try_flatten()
    .boxed()
}

/// Drain a scan into memory
pub async fn collect_scan(
    store: &dyn EntityStore,
    scan: IndexScan,
    page_size: usize,
) -> Result<Vec<Record>, StoreError> {
    scan_stream(store, scan, page_size).try_collect().await
}
