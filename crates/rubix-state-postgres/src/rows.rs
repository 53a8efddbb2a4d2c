//! Row <-> record mapping

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Decode, Postgres, Row, Type};

use rubix_core::{
    Edge, EdgeId, Node, NodeId, NodeType, Payload, Port, PortDirection, PortId, Record, StoreError,
    Tag, Value, ValueId,
};

use crate::map_sqlx_error;

/// Which table a row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Table {
    Nodes,
    Ports,
    Edges,
    Values,
    Tags,
}

impl Table {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Table::Nodes => "nodes",
            Table::Ports => "ports",
            Table::Edges => "edges",
            Table::Values => "port_values",
            Table::Tags => "tags",
        }
    }

    pub(crate) fn columns(&self) -> &'static str {
        match self {
            Table::Nodes => "id, node_type, parent_id, name, description, alive",
            Table::Ports => "id, node_id, direction, name, description, alive",
            Table::Edges => "id, from_port_id, to_port_id, description, alive",
            Table::Values => "id, port_id, ts, payload, synced, synced_at, alive",
            Table::Tags => "node_id, tag_key, tag_value, alive",
        }
    }

    pub(crate) fn decode(&self, row: &PgRow) -> Result<Record, StoreError> {
        Ok(match self {
            Table::Nodes => Record::Node(node_from_row(row)?),
            Table::Ports => Record::Port(port_from_row(row)?),
            Table::Edges => Record::Edge(edge_from_row(row)?),
            Table::Values => Record::Value(value_from_row(row)?),
            Table::Tags => Record::Tag(tag_from_row(row)?),
        })
    }
}

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get(name).map_err(map_sqlx_error)
}

fn node_from_row(row: &PgRow) -> Result<Node, StoreError> {
    let node_type: String = col(row, "node_type")?;
    Ok(Node {
        id: NodeId(col(row, "id")?),
        node_type: NodeType::parse(&node_type)
            .ok_or_else(|| StoreError::Backend(format!("unknown node type '{}'", node_type)))?,
        parent_id: col::<Option<String>>(row, "parent_id")?.map(NodeId),
        name: col(row, "name")?,
        description: col(row, "description")?,
        alive: col(row, "alive")?,
    })
}

fn port_from_row(row: &PgRow) -> Result<Port, StoreError> {
    let direction: String = col(row, "direction")?;
    Ok(Port {
        id: PortId(col(row, "id")?),
        node_id: NodeId(col(row, "node_id")?),
        direction: PortDirection::parse(&direction)
            .ok_or_else(|| StoreError::Backend(format!("unknown port direction '{}'", direction)))?,
        name: col(row, "name")?,
        description: col(row, "description")?,
        alive: col(row, "alive")?,
    })
}

fn edge_from_row(row: &PgRow) -> Result<Edge, StoreError> {
    Ok(Edge {
        id: EdgeId(col(row, "id")?),
        from_port_id: PortId(col(row, "from_port_id")?),
        to_port_id: PortId(col(row, "to_port_id")?),
        description: col(row, "description")?,
        alive: col(row, "alive")?,
    })
}

fn value_from_row(row: &PgRow) -> Result<Value, StoreError> {
    let payload: Json<Payload> = col(row, "payload")?;
    Ok(Value {
        id: ValueId(col(row, "id")?),
        port_id: PortId(col(row, "port_id")?),
        timestamp: col::<DateTime<Utc>>(row, "ts")?,
        payload: payload.0,
        synced: col(row, "synced")?,
        synced_at: col(row, "synced_at")?,
        alive: col(row, "alive")?,
    })
}

fn tag_from_row(row: &PgRow) -> Result<Tag, StoreError> {
    Ok(Tag {
        node_id: NodeId(col(row, "node_id")?),
        key: col(row, "tag_key")?,
        value: col(row, "tag_value")?,
        alive: col(row, "alive")?,
    })
}
