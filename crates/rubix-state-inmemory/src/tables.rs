//! Record tables and B-tree secondary indexes.
//!
//! All mutation goes through [`Tables::replace`], which keeps every index in
//! step with the primary table and returns the previous row so that a failed
//! batch can be undone in reverse order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;

use rubix_core::{
    ContinuationToken, IndexKey, IndexName, IndexScan, NodeId, PortId, Record, RecordKey,
    ScanPage, StoreError, WriteOp,
};

/// Previous state of one row, recorded before it was changed
type Undo = (RecordKey, Option<Record>);

#[derive(Debug, Default, Clone)]
pub(crate) struct Tables {
    records: HashMap<RecordKey, Record>,
    indexes: HashMap<IndexName, BTreeMap<IndexKey, RecordKey>>,
}

impl Tables {
    pub(crate) fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.records.get(key)
    }

    pub(crate) fn records(&self) -> &HashMap<RecordKey, Record> {
        &self.records
    }

    /// Set or clear the row at `key`, returning what was there
    fn replace(&mut self, key: RecordKey, record: Option<Record>) -> Option<Record> {
        let previous = self.records.remove(&key);
        if let Some(old) = &previous {
            for index in IndexName::ALL {
                if let (Some(old_key), Some(entries)) =
                    (index.key_for(old), self.indexes.get_mut(&index))
                {
                    entries.remove(&old_key);
                }
            }
        }

        if let Some(record) = record {
            for index in IndexName::ALL {
                if let Some(index_key) = index.key_for(&record) {
                    self.indexes
                        .entry(index)
                        .or_default()
                        .insert(index_key, key.clone());
                }
            }
            self.records.insert(key, record);
        }

        previous
    }

    pub(crate) fn scan(
        &self,
        scan: &IndexScan,
        after: Option<&ContinuationToken>,
        limit: usize,
    ) -> Result<ScanPage, StoreError> {
        let prefix = scan.prefix();
        let entries = match self.indexes.get(&scan.index()) {
            Some(entries) => entries,
            None => {
                return Ok(ScanPage {
                    records: Vec::new(),
                    next: None,
                })
            }
        };

        let start = match after {
            Some(token) => {
                token.validate(scan)?;
                Bound::Excluded(token.0.clone())
            }
            None => Bound::Included(prefix.clone()),
        };

        let mut matching = entries
            .range((start, Bound::Unbounded))
            .take_while(|(index_key, _)| index_key.starts_with(&prefix));

        let mut records = Vec::new();
        let mut last_key = None;
        for (index_key, record_key) in matching.by_ref().take(limit) {
            let record = self.records.get(record_key).ok_or_else(|| {
                StoreError::Backend(format!("index entry for missing {}", record_key))
            })?;
            records.push(record.clone());
            last_key = Some(index_key.clone());
        }

        let next = match (matching.next(), last_key) {
            (Some(_), Some(last_key)) => Some(ContinuationToken(last_key)),
            _ => None,
        };

        Ok(ScanPage { records, next })
    }

    /// Apply `ops` in order. On the first failure every applied change is
    /// reverted and the error returned.
    pub(crate) fn apply(&mut self, ops: Vec<WriteOp>) -> Result<usize, StoreError> {
        let mut undo: Vec<Undo> = Vec::new();

        for op in ops {
            if let Err(err) = self.apply_one(op, &mut undo) {
                self.rollback(undo);
                return Err(err);
            }
        }

        Ok(undo.len())
    }

    fn rollback(&mut self, undo: Vec<Undo>) {
        for (key, previous) in undo.into_iter().rev() {
            self.replace(key, previous);
        }
    }

    fn apply_one(&mut self, op: WriteOp, undo: &mut Vec<Undo>) -> Result<(), StoreError> {
        match op {
            WriteOp::Put(record) => {
                self.check_references(&record)?;
                let key = record.key();
                let previous = self.replace(key.clone(), Some(record));
                undo.push((key, previous));
            }
            WriteOp::SetAlive { key, alive } => {
                let mut record = self.require(&key)?.clone();
                record.set_alive(alive);
                let previous = self.replace(key.clone(), Some(record));
                undo.push((key, previous));
            }
            WriteOp::MarkSynced {
                value_id,
                synced_at,
            } => {
                let key = RecordKey::Value(value_id);
                let mut record = self.require(&key)?.clone();
                if let Record::Value(value) = &mut record {
                    value.synced = true;
                    value.synced_at = Some(synced_at);
                }
                let previous = self.replace(key.clone(), Some(record));
                undo.push((key, previous));
            }
            WriteOp::HardDelete(key) => {
                self.require(&key)?;
                for dependent in self.dependents(&key) {
                    let previous = self.replace(dependent.clone(), None);
                    undo.push((dependent, previous));
                }
            }
        }
        Ok(())
    }

    fn require(&self, key: &RecordKey) -> Result<&Record, StoreError> {
        self.records
            .get(key)
            .ok_or_else(|| StoreError::MissingRecord(key.to_string()))
    }

    fn check_references(&self, record: &Record) -> Result<(), StoreError> {
        let missing = |what: String| {
            StoreError::Constraint(format!("{} references missing {}", record.key(), what))
        };

        match record {
            Record::Node(node) => {
                if let Some(parent_id) = &node.parent_id {
                    if parent_id == &node.id {
                        return Err(StoreError::Constraint(format!(
                            "node {} cannot be its own parent",
                            node.id
                        )));
                    }
                    self.node_exists(parent_id, &missing)?;
                }
            }
            Record::Port(port) => self.node_exists(&port.node_id, &missing)?,
            Record::Edge(edge) => {
                if edge.from_port_id == edge.to_port_id {
                    return Err(StoreError::Constraint(format!(
                        "edge {} connects port {} to itself",
                        edge.id, edge.from_port_id
                    )));
                }
                self.port_exists(&edge.from_port_id, &missing)?;
                self.port_exists(&edge.to_port_id, &missing)?;
            }
            Record::Value(value) => self.port_exists(&value.port_id, &missing)?,
            Record::Tag(tag) => self.node_exists(&tag.node_id, &missing)?,
        }
        Ok(())
    }

    fn node_exists(
        &self,
        id: &NodeId,
        missing: &dyn Fn(String) -> StoreError,
    ) -> Result<(), StoreError> {
        if self.records.contains_key(&RecordKey::Node(id.clone())) {
            Ok(())
        } else {
            Err(missing(format!("node {}", id)))
        }
    }

    fn port_exists(
        &self,
        id: &PortId,
        missing: &dyn Fn(String) -> StoreError,
    ) -> Result<(), StoreError> {
        if self.records.contains_key(&RecordKey::Port(id.clone())) {
            Ok(())
        } else {
            Err(missing(format!("port {}", id)))
        }
    }

    /// Every key that disappears with `key`, the key itself included
    fn dependents(&self, key: &RecordKey) -> Vec<RecordKey> {
        let mut doomed = Vec::new();
        let mut seen = HashSet::new();

        match key {
            RecordKey::Node(root) => {
                let mut stack = vec![root.clone()];
                while let Some(node_id) = stack.pop() {
                    if !seen.insert(RecordKey::Node(node_id.clone())) {
                        continue;
                    }
                    for port_key in self.keys_with_prefix(IndexName::PortsByNode, node_id.as_str()) {
                        if let RecordKey::Port(port_id) = &port_key {
                            self.collect_port_dependents(port_id, &mut doomed, &mut seen);
                        }
                        if seen.insert(port_key.clone()) {
                            doomed.push(port_key);
                        }
                    }
                    for tag_key in self.keys_with_prefix(IndexName::TagsByNode, node_id.as_str()) {
                        if seen.insert(tag_key.clone()) {
                            doomed.push(tag_key);
                        }
                    }
                    for child in self.keys_with_prefix(IndexName::NodesByParent, node_id.as_str()) {
                        if let RecordKey::Node(child_id) = child {
                            stack.push(child_id);
                        }
                    }
                    doomed.push(RecordKey::Node(node_id));
                }
            }
            RecordKey::Port(port_id) => {
                self.collect_port_dependents(port_id, &mut doomed, &mut seen);
                doomed.push(key.clone());
            }
            _ => doomed.push(key.clone()),
        }

        doomed
    }

    fn collect_port_dependents(
        &self,
        port_id: &PortId,
        doomed: &mut Vec<RecordKey>,
        seen: &mut HashSet<RecordKey>,
    ) {
        let owned = [
            IndexName::ValuesByPort,
            IndexName::EdgesByFromPort,
            IndexName::EdgesByToPort,
        ];
        for index in owned {
            for dependent in self.keys_with_prefix(index, port_id.as_str()) {
                if seen.insert(dependent.clone()) {
                    doomed.push(dependent);
                }
            }
        }
    }

    /// Primary keys of every entry whose first index column is `first`
    fn keys_with_prefix(&self, index: IndexName, first: &str) -> Vec<RecordKey> {
        let prefix = IndexKey(vec![first.to_string()]);
        self.indexes
            .get(&index)
            .map(|entries| {
                entries
                    .range(prefix.clone()..)
                    .take_while(|(index_key, _)| index_key.starts_with(&prefix))
                    .map(|(_, record_key)| record_key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
