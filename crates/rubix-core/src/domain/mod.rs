/// Entity model: ids, nodes, ports, edges, values and tags
pub mod entities;

/// Storage interface consumed by the engines
pub mod store;
