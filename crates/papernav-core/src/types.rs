//! Domain types shared by the index store, the hybrid engine and clustering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub type DocumentId = String;

/// Number of metadata keywords folded into the enrichment string.
pub const ENRICHMENT_KEYWORDS: usize = 5;

/// A cleaned source document. Identity is `id`; immutable once added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Cleaned body used for the text vector.
    pub text: String,
    #[serde(default, alias = "full_text")]
    pub full_text_preview: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_path: String,
}

/// Bibliographic record extracted for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub affiliations: Vec<String>,
    #[serde(default)]
    pub emails: BTreeSet<String>,
    #[serde(default)]
    pub references_count: u32,
    #[serde(default)]
    pub citations: Vec<String>,
}

impl MetadataRecord {
    /// Title, abstract and up to five keywords, in that order. Empty parts are
    /// omitted; a record with nothing to say yields an empty string.
    pub fn enriched_text(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        let title = self.title.trim();
        if !title.is_empty() { parts.push(format!("Title: {title}")); }
        let abstract_text = self.abstract_text.trim();
        if !abstract_text.is_empty() { parts.push(format!("Abstract: {abstract_text}")); }
        let keywords: Vec<&str> = self
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .take(ENRICHMENT_KEYWORDS)
            .collect();
        if !keywords.is_empty() { parts.push(format!("Keywords: {}", keywords.join(", "))); }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    TextOnly,
    #[default]
    Hybrid,
}

impl FromStr for SearchMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "text_only" | "text-only" => Ok(Self::TextOnly),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(crate::Error::InvalidInput(format!("unknown search mode '{other}'"))),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TextOnly => f.write_str("text_only"),
            Self::Hybrid => f.write_str("hybrid"),
        }
    }
}

/// One ranked hit. `score` orders results; the component scores are only
/// present in hybrid mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub document_id: DocumentId,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_score: Option<f32>,
    /// 1-based position in the result list.
    pub rank: usize,
}

/// A search hit joined with its document, metadata and text vector.
///
/// The vector is carried for clustering and never serialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    #[serde(flatten)]
    pub result: SearchResult,
    pub document: Document,
    pub metadata: MetadataRecord,
    #[serde(skip)]
    pub text_vector: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub is_indexed: bool,
    pub n_documents: usize,
    pub n_pending: usize,
    pub embedding_dim: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: usize,
    pub centroid: Vec<f32>,
    /// Ordered by descending similarity to the centroid.
    pub member_ids: Vec<DocumentId>,
    pub keywords: Vec<String>,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringResult {
    /// Ordered by descending size.
    pub clusters: Vec<Cluster>,
    pub chosen_k: usize,
    pub silhouette_score: f32,
}

/// Transport view of one cluster with its member documents in cluster order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterView {
    pub cluster_id: usize,
    pub label: String,
    pub keywords: Vec<String>,
    pub size: usize,
    pub silhouette_score: f32,
    pub documents: Vec<ScoredDocument>,
}
