use cucumber::{then, when};
use std::collections::HashSet;

use rubix_core::{CoreError, NodeId, TagPredicate};

use crate::steps::world::{node_id, RubixWorld};

/// "category=medium, zone=north"
fn parse_predicates(text: &str) -> Vec<TagPredicate> {
    text.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .unwrap_or_else(|| panic!("expected key=value, got '{}'", pair));
            TagPredicate::new(key.trim(), value.trim())
        })
        .collect()
}

/// "A@0, B@1"
fn parse_levels(text: &str) -> Vec<(NodeId, u32)> {
    text.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, level) = entry
                .split_once('@')
                .unwrap_or_else(|| panic!("expected name@level, got '{}'", entry));
            (node_id(name), level.parse().unwrap())
        })
        .collect()
}

fn parse_names(text: &str) -> HashSet<NodeId> {
    text.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(node_id)
        .collect()
}

#[when(expr = "the subtree of {string} is queried to depth {int}")]
async fn when_subtree_queried(world: &mut RubixWorld, root: String, depth: i32) {
    let outcome = world.harness.service.get_subtree(&node_id(&root), depth).await;
    world.last_subtree = world.record_outcome(outcome);
}

#[then(expr = "the subtree of {string} to depth {int} is empty")]
async fn then_subtree_empty(world: &mut RubixWorld, root: String, depth: i32) {
    let rows = world
        .harness
        .service
        .get_subtree(&node_id(&root), depth)
        .await
        .unwrap();
    assert!(rows.is_empty(), "expected nothing, got {:?}", rows);
}

#[then(expr = "the subtree of {string} to depth {int} is {string}")]
async fn then_subtree_is(world: &mut RubixWorld, root: String, depth: i32, expected: String) {
    let rows: Vec<(NodeId, u32)> = world
        .harness
        .service
        .get_subtree(&node_id(&root), depth)
        .await
        .unwrap()
        .into_iter()
        .map(|row| (row.id, row.level))
        .collect();
    assert_eq!(rows, parse_levels(&expected));
}

#[then(expr = "searching tags {string} finds {string}")]
async fn then_tags_find(world: &mut RubixWorld, predicates: String, expected: String) {
    let found = world
        .harness
        .service
        .find_by_tags(&parse_predicates(&predicates), None)
        .await
        .unwrap();
    assert_eq!(found, parse_names(&expected));
}

#[then(expr = "searching tags {string} with key {string} finds {string}")]
async fn then_tags_with_key_find(
    world: &mut RubixWorld,
    predicates: String,
    key: String,
    expected: String,
) {
    let found = world
        .harness
        .service
        .find_by_tags(&parse_predicates(&predicates), Some(&key))
        .await
        .unwrap();
    assert_eq!(found, parse_names(&expected));
}

#[then(expr = "searching tags {string} finds nothing")]
async fn then_tags_find_nothing(world: &mut RubixWorld, predicates: String) {
    let found = world
        .harness
        .service
        .find_by_tags(&parse_predicates(&predicates), None)
        .await
        .unwrap();
    assert!(found.is_empty(), "expected nothing, got {:?}", found);
}

#[then(expr = "the request is rejected as an invalid argument")]
async fn then_invalid_argument(world: &mut RubixWorld) {
    match &world.last_error {
        Some(CoreError::InvalidArgument(_)) => {}
        other => panic!("expected InvalidArgument, got {:?}", other),
    }
}

#[then(expr = "the request fails because the node is unknown")]
async fn then_not_found(world: &mut RubixWorld) {
    match &world.last_error {
        Some(CoreError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {:?}", other),
    }
}
