use cucumber::World;
use std::collections::HashMap;

use rubix_core::{CascadeReport, CoreError, NodeAtLevel, NodeId, PortDirection, PortId};
use rubix_tests::Harness;

/// State shared by the steps of one scenario
#[derive(World, Default)]
#[world(init = Self::default)]
pub struct RubixWorld {
    pub harness: Harness,
    /// Ports created by the steps, by owner id and direction
    pub ports: HashMap<(String, PortDirection), PortId>,
    pub last_report: Option<CascadeReport>,
    pub last_subtree: Option<Vec<NodeAtLevel>>,
    pub last_error: Option<CoreError>,
}

impl RubixWorld {
    pub fn port(&self, node: &str, direction: PortDirection) -> PortId {
        self.ports
            .get(&(node.to_string(), direction))
            .cloned()
            .unwrap_or_else(|| panic!("no {} port on {}", direction.as_str(), node))
    }

    pub fn record_outcome<T>(&mut self, outcome: Result<T, CoreError>) -> Option<T> {
        match outcome {
            Ok(value) => {
                self.last_error = None;
                Some(value)
            }
            Err(err) => {
                self.last_error = Some(err);
                None
            }
        }
    }
}

pub fn parse_direction(word: &str) -> PortDirection {
    PortDirection::parse(word).unwrap_or_else(|| panic!("unknown port direction '{}'", word))
}

pub fn node_id(name: &str) -> NodeId {
    NodeId::from(name)
}

// Harness holds no Debug-able handles
impl std::fmt::Debug for RubixWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RubixWorld")
            .field("ports", &self.ports)
            .field("last_report", &self.last_report)
            .field("last_subtree", &self.last_subtree)
            .field("last_error", &self.last_error)
            .finish()
    }
}
