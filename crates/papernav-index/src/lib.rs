//! papernav-index
//!
//! Dual dense index over document text and document metadata: cosine
//! scoring, weighted-sum hybrid fusion and bincode snapshots.

pub mod similarity;
pub mod snapshot;
pub mod store;

pub use similarity::{cosine_similarity, top_k};
pub use snapshot::{snapshot_path, LoadOutcome, SNAPSHOT_FILE};
pub use store::{BuildReport, Fusion, IndexStore, IndexedCorpus, QueryVectors, SkippedDocument};
