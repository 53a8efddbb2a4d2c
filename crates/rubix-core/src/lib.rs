//!
//! Rubix Core - cascade consistency and query engines for the Rubix graph store
//!
//! Nodes (networks, devices, points) form a forest; nodes own ports, ports
//! own time-stamped values and are linked by directed edges, and nodes carry
//! key/value tags. This crate defines the domain model, the [`EntityStore`]
//! interface that backends implement, and the engines built on top of it:
//!
//! - [`CascadeEngine`]: soft-delete and restore of whole subtrees as one
//!   atomic write
//! - [`HierarchyQueryEngine`]: bounded-depth subtree retrieval
//! - [`TagQueryEngine`]: conjunctive tag search
//! - [`GraphWriter`]: creation and hard deletion
//!
//! [`GraphService`] wires them together over one store.

#![forbid(unsafe_code)]

/// Domain layer - entities and the storage interface
pub mod domain;

/// Application services - engines and the write path
pub mod application;

/// Engine configuration
pub mod config;

/// Error types
pub mod error;

/// Test helpers
#[cfg(feature = "testing")]
pub mod testing;

pub use application::cancel::CancelToken;
pub use application::cascade::{CascadeEngine, CascadeReport};
pub use application::hierarchy::HierarchyQueryEngine;
pub use application::locks::{CascadeGuard, CascadeLockTable};
pub use application::service::GraphService;
pub use application::tags::TagQueryEngine;
pub use application::writer::{default_port_name, GraphWriter, NewNode};
pub use config::EngineConfig;
pub use domain::entities::{
    Edge, EdgeId, Node, NodeAtLevel, NodeId, NodeType, Payload, Port, PortDirection, PortId, Tag,
    TagKey, TagPredicate, Value, ValueId,
};
pub use domain::store::{
    collect_scan, scan_stream, ContinuationToken, EntityStore, IndexKey, IndexName, IndexScan,
    Record, RecordKey, ScanPage, WriteBatch, WriteOp,
};
pub use error::{CoreError, StoreError};
