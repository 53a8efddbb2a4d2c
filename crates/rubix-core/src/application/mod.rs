/// Parent-chain helpers
mod ancestry;

/// Cooperative cancellation
pub mod cancel;

/// Cascade Consistency Engine
pub mod cascade;

/// Hierarchy Query Engine
pub mod hierarchy;

/// Advisory cascade locks
pub mod locks;

/// Facade over every engine
pub mod service;

/// Tag Query Engine
pub mod tags;

/// Write path
pub mod writer;
