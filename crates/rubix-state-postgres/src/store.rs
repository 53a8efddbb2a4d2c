use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::debug;

use rubix_core::domain::store::{decode_bool, decode_timestamp};
use rubix_core::{
    ContinuationToken, EntityStore, IndexName, IndexScan, Record, RecordKey, ScanPage, StoreError,
    WriteBatch, WriteOp,
};

use crate::rows::Table;
use crate::{map_sqlx_error, PostgresConnection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Text,
    Bool,
    Timestamp,
}

/// SQL columns backing one secondary index, in key order
struct IndexLayout {
    table: Table,
    columns: &'static [(&'static str, ColumnKind)],
}

fn layout(index: IndexName) -> IndexLayout {
    use ColumnKind::*;

    let (table, columns): (Table, &'static [(&'static str, ColumnKind)]) = match index {
        IndexName::NodesByParent => (
            Table::Nodes,
            &[("COALESCE(parent_id, '')", Text), ("alive", Bool), ("id", Text)],
        ),
        IndexName::PortsByNode => (
            Table::Ports,
            &[("node_id", Text), ("alive", Bool), ("id", Text)],
        ),
        IndexName::ValuesByPort => (
            Table::Values,
            &[
                ("port_id", Text),
                ("alive", Bool),
                ("ts", Timestamp),
                ("id", Text),
            ],
        ),
        IndexName::EdgesByFromPort => (
            Table::Edges,
            &[("from_port_id", Text), ("alive", Bool), ("id", Text)],
        ),
        IndexName::EdgesByToPort => (
            Table::Edges,
            &[("to_port_id", Text), ("alive", Bool), ("id", Text)],
        ),
        IndexName::TagsByNode => (
            Table::Tags,
            &[
                ("node_id", Text),
                ("alive", Bool),
                ("tag_key", Text),
                ("tag_value", Text),
            ],
        ),
        IndexName::TagsByKeyValue => (
            Table::Tags,
            &[
                ("tag_key", Text),
                ("tag_value", Text),
                ("alive", Bool),
                ("node_id", Text),
            ],
        ),
    };
    IndexLayout { table, columns }
}

fn push_key_column(
    builder: &mut QueryBuilder<'static, Postgres>,
    kind: ColumnKind,
    value: &str,
) -> Result<(), StoreError> {
    match kind {
        ColumnKind::Text => {
            builder.push_bind(value.to_string());
        }
        ColumnKind::Bool => {
            let flag = decode_bool(value)
                .ok_or_else(|| StoreError::InvalidToken(format!("bad alive column '{}'", value)))?;
            builder.push_bind(flag);
        }
        ColumnKind::Timestamp => {
            let ts = decode_timestamp(value)
                .ok_or_else(|| StoreError::InvalidToken(format!("bad timestamp '{}'", value)))?;
            builder.push_bind(ts);
        }
    }
    Ok(())
}

/// Keyset-paginated scan: prefix equality, strictly after the token, one
/// extra row to learn whether another page exists.
pub(crate) fn build_scan_query(
    scan: &IndexScan,
    after: Option<&ContinuationToken>,
    limit: usize,
) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    let layout = layout(scan.index());
    let column_list = layout
        .columns
        .iter()
        .map(|(column, _)| *column)
        .collect::<Vec<_>>()
        .join(", ");

    let mut builder = QueryBuilder::new(format!(
        "SELECT {} FROM {} WHERE TRUE",
        layout.table.columns(),
        layout.table.name()
    ));

    for (value, (column, kind)) in scan.prefix().0.iter().zip(layout.columns) {
        builder.push(format!(" AND {} = ", column));
        push_key_column(&mut builder, *kind, value)?;
    }

    if let Some(token) = after {
        token.validate(scan)?;
        builder.push(format!(" AND ({}) > (", column_list));
        for (i, (value, (_, kind))) in token.0 .0.iter().zip(layout.columns).enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            push_key_column(&mut builder, *kind, value)?;
        }
        builder.push(")");
    }

    builder.push(format!(" ORDER BY {} LIMIT ", column_list));
    builder.push_bind(limit.saturating_add(1).min(i64::MAX as usize) as i64);
    Ok(builder)
}

fn table_of(key: &RecordKey) -> Table {
    match key {
        RecordKey::Node(_) => Table::Nodes,
        RecordKey::Port(_) => Table::Ports,
        RecordKey::Edge(_) => Table::Edges,
        RecordKey::Value(_) => Table::Values,
        RecordKey::Tag(_) => Table::Tags,
    }
}

/// Append `WHERE <primary key> = ...` for `key`
fn push_key_filter(builder: &mut QueryBuilder<'static, Postgres>, key: &RecordKey) {
    match key {
        RecordKey::Node(id) => {
            builder.push(" WHERE id = ").push_bind(id.0.clone());
        }
        RecordKey::Port(id) => {
            builder.push(" WHERE id = ").push_bind(id.0.clone());
        }
        RecordKey::Edge(id) => {
            builder.push(" WHERE id = ").push_bind(id.0.clone());
        }
        RecordKey::Value(id) => {
            builder.push(" WHERE id = ").push_bind(id.0.clone());
        }
        RecordKey::Tag(tag) => {
            builder
                .push(" WHERE node_id = ")
                .push_bind(tag.node_id.0.clone())
                .push(" AND tag_key = ")
                .push_bind(tag.key.clone())
                .push(" AND tag_value = ")
                .push_bind(tag.value.clone());
        }
    }
}

const UPSERT_NODE: &str = "
    INSERT INTO nodes (id, node_type, parent_id, name, description, alive)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (id) DO UPDATE SET
        node_type = EXCLUDED.node_type,
        parent_id = EXCLUDED.parent_id,
        name = EXCLUDED.name,
        description = EXCLUDED.description,
        alive = EXCLUDED.alive
";

const UPSERT_PORT: &str = "
    INSERT INTO ports (id, node_id, direction, name, description, alive)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (id) DO UPDATE SET
        node_id = EXCLUDED.node_id,
        direction = EXCLUDED.direction,
        name = EXCLUDED.name,
        description = EXCLUDED.description,
        alive = EXCLUDED.alive
";

const UPSERT_EDGE: &str = "
    INSERT INTO edges (id, from_port_id, to_port_id, description, alive)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (id) DO UPDATE SET
        from_port_id = EXCLUDED.from_port_id,
        to_port_id = EXCLUDED.to_port_id,
        description = EXCLUDED.description,
        alive = EXCLUDED.alive
";

const UPSERT_VALUE: &str = "
    INSERT INTO port_values (id, port_id, ts, payload, synced, synced_at, alive)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (id) DO UPDATE SET
        port_id = EXCLUDED.port_id,
        ts = EXCLUDED.ts,
        payload = EXCLUDED.payload,
        synced = EXCLUDED.synced,
        synced_at = EXCLUDED.synced_at,
        alive = EXCLUDED.alive
";

const UPSERT_TAG: &str = "
    INSERT INTO tags (node_id, tag_key, tag_value, alive)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (node_id, tag_key, tag_value) DO UPDATE SET
        alive = EXCLUDED.alive
";

/// PostgreSQL implementation of [`EntityStore`]
#[derive(Clone, Debug)]
pub struct PostgresEntityStore {
    conn: PostgresConnection,
}

impl PostgresEntityStore {
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }

    /// Get the connection
    pub fn connection(&self) -> &PostgresConnection {
        &self.conn
    }

    async fn put_record(conn: &mut PgConnection, record: &Record) -> Result<(), StoreError> {
        let result = match record {
            Record::Node(node) => {
                sqlx::query(UPSERT_NODE)
                    .bind(&node.id.0)
                    .bind(node.node_type.as_str())
                    .bind(node.parent_id.as_ref().map(|p| p.0.clone()))
                    .bind(&node.name)
                    .bind(&node.description)
                    .bind(node.alive)
                    .execute(&mut *conn)
                    .await
            }
            Record::Port(port) => {
                sqlx::query(UPSERT_PORT)
                    .bind(&port.id.0)
                    .bind(&port.node_id.0)
                    .bind(port.direction.as_str())
                    .bind(&port.name)
                    .bind(&port.description)
                    .bind(port.alive)
                    .execute(&mut *conn)
                    .await
            }
            Record::Edge(edge) => {
                sqlx::query(UPSERT_EDGE)
                    .bind(&edge.id.0)
                    .bind(&edge.from_port_id.0)
                    .bind(&edge.to_port_id.0)
                    .bind(&edge.description)
                    .bind(edge.alive)
                    .execute(&mut *conn)
                    .await
            }
            Record::Value(value) => {
                sqlx::query(UPSERT_VALUE)
                    .bind(&value.id.0)
                    .bind(&value.port_id.0)
                    .bind(value.timestamp)
                    .bind(Json(&value.payload))
                    .bind(value.synced)
                    .bind(value.synced_at)
                    .bind(value.alive)
                    .execute(&mut *conn)
                    .await
            }
            Record::Tag(tag) => {
                sqlx::query(UPSERT_TAG)
                    .bind(&tag.node_id.0)
                    .bind(&tag.key)
                    .bind(&tag.value)
                    .bind(tag.alive)
                    .execute(&mut *conn)
                    .await
            }
        };
        result.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn apply_op(conn: &mut PgConnection, op: &WriteOp) -> Result<(), StoreError> {
        let (mut builder, key) = match op {
            WriteOp::Put(record) => return Self::put_record(conn, record).await,
            WriteOp::SetAlive { key, alive } => {
                let mut builder = QueryBuilder::new(format!(
                    "UPDATE {} SET alive = ",
                    table_of(key).name()
                ));
                builder.push_bind(*alive);
                push_key_filter(&mut builder, key);
                (builder, key.clone())
            }
            WriteOp::MarkSynced {
                value_id,
                synced_at,
            } => {
                let key = RecordKey::Value(value_id.clone());
                let mut builder =
                    QueryBuilder::new("UPDATE port_values SET synced = TRUE, synced_at = ");
                builder.push_bind(*synced_at);
                push_key_filter(&mut builder, &key);
                (builder, key)
            }
            WriteOp::HardDelete(key) => {
                let mut builder =
                    QueryBuilder::new(format!("DELETE FROM {}", table_of(key).name()));
                push_key_filter(&mut builder, key);
                (builder, key.clone())
            }
        };

        let result = builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRecord(key.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for PostgresEntityStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>, StoreError> {
        let table = table_of(key);
        let mut builder = QueryBuilder::new(format!(
            "SELECT {} FROM {}",
            table.columns(),
            table.name()
        ));
        push_key_filter(&mut builder, key);

        let row = builder
            .build()
            .fetch_optional(self.conn.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.map(|row| table.decode(&row)).transpose()
    }

    async fn scan(
        &self,
        scan: &IndexScan,
        after: Option<&ContinuationToken>,
        limit: usize,
    ) -> Result<ScanPage, StoreError> {
        if limit == 0 {
            return Ok(ScanPage {
                records: Vec::new(),
                next: None,
            });
        }

        let index = scan.index();
        let table = layout(index).table;
        let rows = build_scan_query(scan, after, limit)?
            .build()
            .fetch_all(self.conn.pool())
            .await
            .map_err(map_sqlx_error)?;

        let has_more = rows.len() > limit;
        let records = rows
            .iter()
            .take(limit)
            .map(|row| table.decode(row))
            .collect::<Result<Vec<_>, _>>()?;

        let next = if has_more {
            records
                .last()
                .and_then(|record| index.key_for(record))
                .map(ContinuationToken)
        } else {
            None
        };

        Ok(ScanPage { records, next })
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let ops = batch.len();
        let mut tx = self.conn.pool().begin().await.map_err(map_sqlx_error)?;

        for op in batch.ops() {
            // Dropping the transaction on error rolls it back
            Self::apply_op(&mut tx, op).await?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(ops, "Batch committed");
        Ok(())
    }
}
