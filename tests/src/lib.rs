//! Shared fixtures for the Rubix cross-crate test suites.
//!
//! [`scenario`] builds the three-level network A > device B > point C graph.
//! [`generate`] builds a larger forest from a seed and records what it wrote,
//! so tests can compare engine answers against a plain in-memory model.

use anyhow::Context;
use chrono::{TimeZone, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use rubix_core::{
    EngineConfig, GraphService, GraphWriter, NewNode, NodeId, NodeType, Payload, PortDirection,
    PortId, TagPredicate,
};
use rubix_state_inmemory::InMemoryEntityStore;

/// Tag keys and the values the generator draws from
pub const TAG_VOCABULARY: &[(&str, &[&str])] = &[
    ("category", &["low", "medium", "high"]),
    ("zone", &["north", "south", "east", "west"]),
    ("vendor", &["acme", "globex"]),
];

/// An in-memory store and a service over it
pub struct Harness {
    pub store: InMemoryEntityStore,
    pub service: GraphService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_page_size(EngineConfig::default().scan_page_size)
    }

    pub fn with_page_size(scan_page_size: usize) -> Self {
        let store = InMemoryEntityStore::new();
        let service = GraphService::new(
            Arc::new(store.clone()),
            EngineConfig::default().with_scan_page_size(scan_page_size),
        );
        Self { store, service }
    }

    pub fn writer(&self) -> &GraphWriter {
        self.service.writer()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// network A > device B > point C, C tagged (category, medium)
pub struct Scenario {
    pub harness: Harness,
    pub a: NodeId,
    pub b: NodeId,
    pub c: NodeId,
}

pub async fn scenario() -> anyhow::Result<Scenario> {
    let harness = Harness::new();
    let writer = harness.writer();

    let a = writer
        .create_node(NewNode::new(NodeType::Network, "A").with_id("A"))
        .await
        .context("creating network A")?;
    let b = writer
        .create_node(NewNode::new(NodeType::Device, "B").with_id("B").with_parent("A"))
        .await
        .context("creating device B")?;
    let c = writer
        .create_node(NewNode::new(NodeType::Point, "C").with_id("C").with_parent("B"))
        .await
        .context("creating point C")?;
    writer
        .tag_node(&c.id, "category", "medium")
        .await
        .context("tagging point C")?;

    Ok(Scenario {
        harness,
        a: a.id,
        b: b.id,
        c: c.id,
    })
}

/// Shape of a generated forest
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub networks: usize,
    pub devices_per_network: usize,
    pub points_per_device: usize,
    pub values_per_port: usize,
    /// Chance that a node carries a given vocabulary key
    pub tag_probability: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            networks: 2,
            devices_per_network: 3,
            points_per_device: 4,
            values_per_port: 2,
            tag_probability: 0.6,
            seed: 7,
        }
    }
}

/// What [`generate`] wrote, with every row alive
#[derive(Debug, Default, Clone)]
pub struct SyntheticGraph {
    pub parents: BTreeMap<NodeId, Option<NodeId>>,
    /// Input then output port of every node
    pub ports: BTreeMap<NodeId, [PortId; 2]>,
    pub tags: BTreeSet<(NodeId, String, String)>,
    pub edges: usize,
    pub values: usize,
}

impl SyntheticGraph {
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.parents.keys()
    }

    pub fn roots(&self) -> Vec<NodeId> {
        self.parents
            .iter()
            .filter(|(_, parent)| parent.is_none())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn children_of(&self, id: &NodeId) -> Vec<NodeId> {
        self.parents
            .iter()
            .filter(|(_, parent)| parent.as_ref() == Some(id))
            .map(|(child, _)| child.clone())
            .collect()
    }

    /// `id` and everything below it
    pub fn descendants(&self, id: &NodeId) -> BTreeSet<NodeId> {
        self.expected_subtree(id, u32::MAX, &HashSet::new())
            .into_keys()
            .collect()
    }

    /// Node -> level for the alive part of the subtree, skipping `dead`
    pub fn expected_subtree(
        &self,
        root: &NodeId,
        max_depth: u32,
        dead: &HashSet<NodeId>,
    ) -> BTreeMap<NodeId, u32> {
        let mut levels = BTreeMap::new();
        if !self.parents.contains_key(root) || dead.contains(root) {
            return levels;
        }

        let mut queue = VecDeque::from([(root.clone(), 0u32)]);
        while let Some((id, level)) = queue.pop_front() {
            if level < max_depth {
                for child in self.children_of(&id) {
                    if !dead.contains(&child) {
                        queue.push_back((child, level + 1));
                    }
                }
            }
            levels.insert(id, level);
        }
        levels
    }

    /// Nodes holding every predicate, skipping `dead`
    pub fn expected_tag_matches(
        &self,
        predicates: &[TagPredicate],
        key_only: Option<&str>,
        dead: &HashSet<NodeId>,
    ) -> HashSet<NodeId> {
        self.nodes()
            .filter(|id| !dead.contains(*id))
            .filter(|id| {
                predicates.iter().all(|p| {
                    self.tags
                        .contains(&((*id).clone(), p.key.clone(), p.value.clone()))
                })
            })
            .filter(|id| match key_only {
                Some(key) => self.tags.iter().any(|(node, k, _)| node == *id && k == key),
                None => true,
            })
            .cloned()
            .collect()
    }
}

/// Populate `writer`'s store with a deterministic forest
pub async fn generate(
    writer: &GraphWriter,
    config: &SyntheticConfig,
) -> anyhow::Result<SyntheticGraph> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut graph = SyntheticGraph::default();

    for n in 0..config.networks {
        let network = format!("n{}", n);
        add_node(writer, &mut graph, &mut rng, config, NodeType::Network, &network, None).await?;

        for d in 0..config.devices_per_network {
            let device = format!("{}-d{}", network, d);
            add_node(writer, &mut graph, &mut rng, config, NodeType::Device, &device, Some(&network))
                .await?;

            for p in 0..config.points_per_device {
                let point = format!("{}-p{}", device, p);
                add_node(writer, &mut graph, &mut rng, config, NodeType::Point, &point, Some(&device))
                    .await?;
            }
        }
    }

    // Wire each output to a random input on another node
    let owners: Vec<NodeId> = graph.ports.keys().cloned().collect();
    if owners.len() > 1 {
        for from in &owners {
            let to = loop {
                let candidate = &owners[rng.gen_range(0..owners.len())];
                if candidate != from {
                    break candidate;
                }
            };
            let from_port = graph.ports[from][1].clone();
            let to_port = graph.ports[to][0].clone();
            writer
                .connect(&from_port, &to_port, format!("{} to {}", from, to))
                .await
                .with_context(|| format!("connecting {} to {}", from, to))?;
            graph.edges += 1;
        }
    }

    Ok(graph)
}

async fn add_node(
    writer: &GraphWriter,
    graph: &mut SyntheticGraph,
    rng: &mut StdRng,
    config: &SyntheticConfig,
    node_type: NodeType,
    id: &str,
    parent: Option<&str>,
) -> anyhow::Result<()> {
    let mut new_node = NewNode::new(node_type, id.to_uppercase()).with_id(id);
    if let Some(parent) = parent {
        new_node = new_node.with_parent(parent);
    }
    let node = writer
        .create_node(new_node)
        .await
        .with_context(|| format!("creating node {}", id))?;

    let input = writer
        .create_port(&node.id, PortDirection::Input, "", "")
        .await
        .with_context(|| format!("creating input port on {}", id))?;
    let output = writer
        .create_port(&node.id, PortDirection::Output, "", "")
        .await
        .with_context(|| format!("creating output port on {}", id))?;

    for i in 0..config.values_per_port {
        let timestamp = Utc
            .timestamp_opt(1_700_000_000 + i as i64, 0)
            .single()
            .context("fixture timestamp out of range")?;
        writer
            .record_value(&output.id, timestamp, Payload::Numeric(rng.gen_range(0.0..100.0)))
            .await
            .with_context(|| format!("recording value on {}", output.id))?;
        graph.values += 1;
    }

    for (key, values) in TAG_VOCABULARY {
        if rng.gen_bool(config.tag_probability) {
            let value = values[rng.gen_range(0..values.len())];
            writer
                .tag_node(&node.id, *key, value)
                .await
                .with_context(|| format!("tagging {}", id))?;
            graph
                .tags
                .insert((node.id.clone(), key.to_string(), value.to_string()));
        }
    }

    graph
        .parents
        .insert(node.id.clone(), parent.map(NodeId::from));
    graph.ports.insert(node.id, [input.id, output.id]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generator_is_deterministic() {
        let config = SyntheticConfig::default();

        let first = Harness::new();
        let second = Harness::new();
        let a = generate(first.writer(), &config).await.unwrap();
        let b = generate(second.writer(), &config).await.unwrap();

        assert_eq!(a.parents, b.parents);
        assert_eq!(a.tags, b.tags);
        // 2 networks, 6 devices, 24 points
        assert_eq!(a.parents.len(), 32);
        assert_eq!(a.roots().len(), 2);
        assert_eq!(a.edges, 32);
    }

    #[test]
    fn test_expected_subtree_respects_depth_and_dead_nodes() {
        let mut graph = SyntheticGraph::default();
        graph.parents.insert("a".into(), None);
        graph.parents.insert("b".into(), Some("a".into()));
        graph.parents.insert("c".into(), Some("b".into()));
        graph.parents.insert("d".into(), Some("a".into()));

        let all = graph.expected_subtree(&"a".into(), 5, &HashSet::new());
        assert_eq!(all.len(), 4);
        assert_eq!(all[&NodeId::from("c")], 2);

        let shallow = graph.expected_subtree(&"a".into(), 1, &HashSet::new());
        assert_eq!(shallow.len(), 3);

        let dead = HashSet::from([NodeId::from("b")]);
        let pruned = graph.expected_subtree(&"a".into(), 5, &dead);
        assert_eq!(
            pruned.keys().cloned().collect::<Vec<_>>(),
            vec![NodeId::from("a"), NodeId::from("d")]
        );
    }
}
