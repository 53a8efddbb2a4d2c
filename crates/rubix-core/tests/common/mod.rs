#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use rubix_core::{
    EngineConfig, EntityStore, GraphService, NewNode, Node, NodeType, Payload, Port,
    PortDirection, Record, RecordKey,
};
use rubix_state_inmemory::InMemoryEntityStore;

/// network A > device B > point C, each with an input and an output port,
/// C's output wired to A's input, C tagged (category, medium)
pub struct Fixture {
    pub store: InMemoryEntityStore,
    pub service: GraphService,
    pub a: Node,
    pub b: Node,
    pub c: Node,
    pub a_in: Port,
    pub b_out: Port,
    pub c_in: Port,
    pub c_out: Port,
}

pub fn service_over(store: Arc<dyn EntityStore>) -> GraphService {
    // Small pages so every scan exercises continuation tokens
    GraphService::new(store, EngineConfig::default().with_scan_page_size(2))
}

pub async fn fixture() -> Fixture {
    let store = InMemoryEntityStore::new();
    let service = service_over(Arc::new(store.clone()));
    build(store, service).await
}

pub async fn build(store: InMemoryEntityStore, service: GraphService) -> Fixture {
    let writer = service.writer();

    let a = writer
        .create_node(NewNode::new(NodeType::Network, "A").with_id("a"))
        .await
        .unwrap();
    let b = writer
        .create_node(NewNode::new(NodeType::Device, "B").with_id("b").with_parent("a"))
        .await
        .unwrap();
    let c = writer
        .create_node(NewNode::new(NodeType::Point, "C").with_id("c").with_parent("b"))
        .await
        .unwrap();

    let a_in = writer.create_port(&a.id, PortDirection::Input, "", "").await.unwrap();
    let b_out = writer.create_port(&b.id, PortDirection::Output, "", "").await.unwrap();
    let c_in = writer.create_port(&c.id, PortDirection::Input, "", "").await.unwrap();
    let c_out = writer.create_port(&c.id, PortDirection::Output, "", "").await.unwrap();

    writer.connect(&b_out.id, &c_in.id, "b to c").await.unwrap();
    writer.connect(&c_out.id, &a_in.id, "c to a").await.unwrap();

    for secs in 0..3 {
        writer
            .record_value(&c_out.id, Utc.timestamp_opt(secs, 0).unwrap(), Payload::Numeric(secs as f64))
            .await
            .unwrap();
    }
    writer
        .record_value(&c_in.id, Utc.timestamp_opt(5, 0).unwrap(), Payload::Boolean(true))
        .await
        .unwrap();

    writer.tag_node(&c.id, "category", "medium").await.unwrap();
    writer.tag_node(&b.id, "zone", "north").await.unwrap();

    Fixture {
        store,
        service,
        a,
        b,
        c,
        a_in,
        b_out,
        c_in,
        c_out,
    }
}

/// Alive flag of any stored row
pub async fn alive(store: &InMemoryEntityStore, key: RecordKey) -> bool {
    store
        .get(&key)
        .await
        .unwrap()
        .map(|record: Record| record.alive())
        .unwrap_or(false)
}

/// Whether every stored row has the given alive flag
pub async fn all_alive_eq(store: &InMemoryEntityStore, expected: bool) -> bool {
    store
        .snapshot()
        .await
        .values()
        .all(|record| record.alive() == expected)
}
