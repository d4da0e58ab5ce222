//! papernav-hybrid
//!
//! Hybrid retrieval over the dual index: query encoding, weighted fusion,
//! response shaping with optional topic clusters, and the `AppContext` that
//! owns the engine for the life of the process.

pub mod context;
pub mod engine;
pub mod response;

pub use context::AppContext;
pub use engine::HybridSearchEngine;
pub use response::{ClusteringStats, SearchBreakdown, SearchResponse};
