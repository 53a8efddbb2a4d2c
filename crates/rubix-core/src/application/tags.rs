//! Tag Query Engine: conjunctive `(key, value)` search with an optional
//! key-only filter applied to the reduced candidate set.

use futures::TryStreamExt;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::EngineConfig;
use crate::domain::entities::{NodeId, TagPredicate};
use crate::domain::store::{scan_stream, EntityStore, IndexScan, Record};
use crate::error::CoreError;

pub struct TagQueryEngine {
    store: Arc<dyn EntityStore>,
    config: EngineConfig,
}

impl TagQueryEngine {
    pub fn new(store: Arc<dyn EntityStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Ids of nodes carrying every predicate as an alive tag and, when
    /// `key_only` is set, at least one alive tag with that key.
    #[instrument(skip(self, predicates), fields(predicates = predicates.len()))]
    pub async fn find_by_tags(
        &self,
        predicates: &[TagPredicate],
        key_only: Option<&str>,
    ) -> Result<HashSet<NodeId>, CoreError> {
        if predicates.is_empty() {
            return Err(CoreError::InvalidArgument(
                "at least one (key, value) predicate is required".to_string(),
            ));
        }
        if predicates.iter().any(|p| p.key.is_empty()) || key_only == Some("") {
            return Err(CoreError::InvalidArgument(
                "tag keys must not be empty".to_string(),
            ));
        }

        let distinct: BTreeSet<&TagPredicate> = predicates.iter().collect();
        let required = distinct.len();
        let mut matches: HashMap<NodeId, usize> = HashMap::new();

        for predicate in distinct {
            let mut tags = scan_stream(
                self.store.as_ref(),
                IndexScan::TagsByKeyValue {
                    key: predicate.key.clone(),
                    value: Some(predicate.value.clone()),
                    alive: Some(true),
                },
                self.config.scan_page_size,
            );
            while let Some(record) = tags.try_next().await? {
                if let Record::Tag(tag) = record {
                    *matches.entry(tag.node_id).or_insert(0) += 1;
                }
            }
        }

        let candidates: HashSet<NodeId> = matches
            .into_iter()
            .filter(|(_, count)| *count == required)
            .map(|(node_id, _)| node_id)
            .collect();

        let result = match key_only {
            Some(key) => self.retain_with_key(candidates, key).await?,
            None => candidates,
        };

        debug!(matched = result.len(), "Tag search finished");
        Ok(result)
    }

    async fn retain_with_key(
        &self,
        candidates: HashSet<NodeId>,
        key: &str,
    ) -> Result<HashSet<NodeId>, CoreError> {
        let mut kept = HashSet::with_capacity(candidates.len());

        for node_id in candidates {
            let mut tags = scan_stream(
                self.store.as_ref(),
                IndexScan::TagsByNode {
                    node_id: node_id.clone(),
                    alive: Some(true),
                },
                self.config.scan_page_size,
            );
            while let Some(record) = tags.try_next().await? {
                if matches!(&record, Record::Tag(tag) if tag.key == key) {
                    kept.insert(node_id);
                    break;
                }
            }
        }

        Ok(kept)
    }
}
