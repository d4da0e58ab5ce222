use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Index not built; add documents and call build first")]
    NotIndexed,

    #[error("Encoding failed for '{id}': {reason}")]
    EncodingFailure { id: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Clustering infeasible: {n_documents} documents for k in [{min_k}, {max_k}]")]
    ClusteringInfeasible { n_documents: usize, min_k: usize, max_k: usize },

    #[error("Clustering failed: {0}")]
    Clustering(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
