//! papernav-core
//!
//! Shared data model, error taxonomy, the `Embedder` seam and layered
//! configuration used by the index, hybrid and clustering crates.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
