pub mod graph_steps;
pub mod query_steps;
pub mod world;
