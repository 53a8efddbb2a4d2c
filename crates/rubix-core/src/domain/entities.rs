//! Entity model: nodes, ports, edges, values and tags.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

const ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LEN: usize = 26;

fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LEN)
        .map(|_| ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())] as char)
        .collect()
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh 26-character lowercase alphanumeric id
            pub fn generate() -> Self {
                Self(generate_id())
            }

            /// Borrow the raw id
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Value object: Node ID
    NodeId
);
string_id!(
    /// Value object: Port ID
    PortId
);
string_id!(
    /// Value object: Edge ID
    EdgeId
);
string_id!(
    /// Value object: Value (observation) ID
    ValueId
);

/// Kind of hierarchical entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Top-level network
    Network,
    /// Device, usually under a network
    Device,
    /// Point, usually under a device
    Point,
}

impl NodeType {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Network => "network",
            NodeType::Device => "device",
            NodeType::Point => "point",
        }
    }

    /// Parse the storage representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "network" => Some(NodeType::Network),
            "device" => Some(NodeType::Device),
            "point" => Some(NodeType::Point),
            _ => None,
        }
    }
}

/// Direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// Data flows into the owning node
    Input,
    /// Data flows out of the owning node
    Output,
}

impl PortDirection {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PortDirection::Input => "input",
            PortDirection::Output => "output",
        }
    }

    /// Parse the storage representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "input" => Some(PortDirection::Input),
            "output" => Some(PortDirection::Output),
            _ => None,
        }
    }
}

/// Hierarchical entity (network, device or point)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    /// `None` for forest roots
    pub parent_id: Option<NodeId>,
    pub name: String,
    pub description: String,
    pub alive: bool,
}

/// Directional connection point owned by exactly one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub node_id: NodeId,
    pub direction: PortDirection,
    pub name: String,
    pub description: String,
    pub alive: bool,
}

/// Directed link between two ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from_port_id: PortId,
    pub to_port_id: PortId,
    pub description: String,
    pub alive: bool,
}

impl Edge {
    /// Whether `port` is one of this edge's endpoints
    pub fn touches(&self, port: &PortId) -> bool {
        &self.from_port_id == port || &self.to_port_id == port
    }
}

/// Observation payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Payload {
    Numeric(f64),
    Text(String),
    Boolean(bool),
    Structured(serde_json::Value),
}

/// Time-stamped observation recorded on a port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub id: ValueId,
    pub port_id: PortId,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
    pub synced: bool,
    pub synced_at: Option<DateTime<Utc>>,
    pub alive: bool,
}

/// Searchable key/value annotation. Identity is `(node_id, key, value)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub node_id: NodeId,
    pub key: String,
    pub value: String,
    pub alive: bool,
}

impl Tag {
    /// Primary key of this tag row
    pub fn key(&self) -> TagKey {
        TagKey {
            node_id: self.node_id.clone(),
            key: self.key.clone(),
            value: self.value.clone(),
        }
    }
}

/// Primary key of a tag row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagKey {
    pub node_id: NodeId,
    pub key: String,
    pub value: String,
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}={}]", self.node_id, self.key, self.value)
    }
}

/// Required `(key, value)` predicate of a tag search
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagPredicate {
    pub key: String,
    pub value: String,
}

impl TagPredicate {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One row of a subtree query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAtLevel {
    pub id: NodeId,
    pub name: String,
    pub node_type: NodeType,
    pub description: String,
    /// Distance from the query root (root = 0)
    pub level: u32,
}

impl NodeAtLevel {
    pub(crate) fn from_node(node: Node, level: u32) -> Self {
        Self {
            id: node.id,
            name: node.name,
            node_type: node.node_type,
            description: node.description,
            level,
        }
    }
}
