use chrono::{TimeZone, Utc};
use cucumber::{given, then, when};

use rubix_core::{NewNode, NodeType, Payload, PortDirection, Record, RecordKey};

use crate::steps::world::{node_id, parse_direction, RubixWorld};

async fn create(world: &mut RubixWorld, node_type: NodeType, name: &str, parent: Option<&str>) {
    let mut new_node = NewNode::new(node_type, name).with_id(name);
    if let Some(parent) = parent {
        new_node = new_node.with_parent(parent);
    }
    world
        .harness
        .writer()
        .create_node(new_node)
        .await
        .unwrap_or_else(|e| panic!("creating {}: {}", name, e));
}

#[given(expr = "a network {string}")]
async fn given_network(world: &mut RubixWorld, name: String) {
    create(world, NodeType::Network, &name, None).await;
}

#[given(expr = "a device {string} under {string}")]
async fn given_device(world: &mut RubixWorld, name: String, parent: String) {
    create(world, NodeType::Device, &name, Some(&parent)).await;
}

#[given(expr = "a point {string} under {string}")]
async fn given_point(world: &mut RubixWorld, name: String, parent: String) {
    create(world, NodeType::Point, &name, Some(&parent)).await;
}

#[given(expr = "{string} is tagged {string} = {string}")]
async fn given_tag(world: &mut RubixWorld, name: String, key: String, value: String) {
    world
        .harness
        .writer()
        .tag_node(&node_id(&name), key, value)
        .await
        .unwrap();
}

#[given(expr = "{string} has an input and an output port")]
async fn given_ports(world: &mut RubixWorld, name: String) {
    for direction in [PortDirection::Input, PortDirection::Output] {
        let port = world
            .harness
            .writer()
            .create_port(&node_id(&name), direction, "", "")
            .await
            .unwrap();
        world.ports.insert((name.clone(), direction), port.id);
    }
}

#[given(expr = "the {word} port of {string} holds {int} value(s)")]
async fn given_values(world: &mut RubixWorld, direction: String, name: String, count: i64) {
    let port = world.port(&name, parse_direction(&direction));
    for secs in 0..count {
        world
            .harness
            .writer()
            .record_value(
                &port,
                Utc.timestamp_opt(secs, 0).unwrap(),
                Payload::Numeric(secs as f64),
            )
            .await
            .unwrap();
    }
}

#[given(expr = "the output of {string} is wired to the input of {string}")]
async fn given_edge(world: &mut RubixWorld, from: String, to: String) {
    let from_port = world.port(&from, PortDirection::Output);
    let to_port = world.port(&to, PortDirection::Input);
    world
        .harness
        .writer()
        .connect(&from_port, &to_port, "")
        .await
        .unwrap();
}

#[when(expr = "{string} is soft-deleted")]
async fn when_soft_deleted(world: &mut RubixWorld, name: String) {
    let outcome = world.harness.service.set_alive(&node_id(&name), false).await;
    world.last_report = world.record_outcome(outcome);
}

#[when(expr = "{string} is restored")]
async fn when_restored(world: &mut RubixWorld, name: String) {
    let outcome = world.harness.service.set_alive(&node_id(&name), true).await;
    world.last_report = world.record_outcome(outcome);
}

#[when(expr = "the {word} port of {string} is soft-deleted")]
async fn when_port_soft_deleted(world: &mut RubixWorld, direction: String, name: String) {
    let port = world.port(&name, parse_direction(&direction));
    let outcome = world
        .harness
        .service
        .cascade()
        .set_port_alive(&port, false)
        .await;
    world.last_report = world.record_outcome(outcome);
}

#[then(expr = "{int} node(s) changed")]
async fn then_nodes_changed(world: &mut RubixWorld, count: usize) {
    let report = world.last_report.expect("no cascade ran");
    assert_eq!(report.nodes, count);
}

#[then(expr = "nothing changed")]
async fn then_nothing_changed(world: &mut RubixWorld) {
    let report = world.last_report.expect("no cascade ran");
    assert!(!report.changed(), "unexpected writes: {:?}", report);
}

#[then(expr = "{string} is alive")]
async fn then_node_alive(world: &mut RubixWorld, name: String) {
    let node = world
        .harness
        .service
        .get_node(&node_id(&name))
        .await
        .unwrap()
        .unwrap();
    assert!(node.alive, "{} should be alive", name);
}

#[then(expr = "{string} is dead")]
async fn then_node_dead(world: &mut RubixWorld, name: String) {
    let node = world
        .harness
        .service
        .get_node(&node_id(&name))
        .await
        .unwrap()
        .unwrap();
    assert!(!node.alive, "{} should be dead", name);
}

#[then(regex = r#"^the (input|output) port of "([^"]+)" is (alive|dead)$"#)]
async fn then_port_state(world: &mut RubixWorld, direction: String, name: String, state: String) {
    let port = world.port(&name, parse_direction(&direction));
    let record = world
        .harness
        .store
        .snapshot()
        .await
        .remove(&RecordKey::Port(port))
        .unwrap();
    assert_eq!(record.alive(), state == "alive", "port state of {}", name);
}

#[then(expr = "every value and edge touching the {word} port of {string} is dead")]
async fn then_port_dependents_dead(world: &mut RubixWorld, direction: String, name: String) {
    let port = world.port(&name, parse_direction(&direction));
    let mut seen = 0;
    for record in world.harness.store.snapshot().await.into_values() {
        let touches = match &record {
            Record::Value(value) => value.port_id == port,
            Record::Edge(edge) => edge.touches(&port),
            _ => false,
        };
        if touches {
            assert!(!record.alive(), "{:?} should be dead", record.key());
            seen += 1;
        }
    }
    assert!(seen > 0, "no dependents found on {}", port);
}
