use serde::{Deserialize, Serialize};

use papernav_core::types::{ClusterView, ClusteringResult, ScoredDocument, SearchMode};

/// Mean component scores over one result list (hybrid mode only).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchBreakdown {
    pub text_score: f32,
    pub metadata_score: f32,
    pub combined_score: f32,
}

impl SearchBreakdown {
    pub fn from_results(results: &[ScoredDocument]) -> Option<Self> {
        if results.is_empty() { return None; }
        let n = results.len() as f32;
        let mean = |f: &dyn Fn(&ScoredDocument) -> Option<f32>| results.iter().filter_map(f).sum::<f32>() / n;
        if results.iter().any(|r| r.result.text_score.is_none() || r.result.metadata_score.is_none()) {
            return None;
        }
        Some(Self {
            text_score: mean(&|r| r.result.text_score),
            metadata_score: mean(&|r| r.result.metadata_score),
            combined_score: mean(&|r| Some(r.result.score)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusteringStats {
    pub chosen_k: usize,
    pub n_clusters: usize,
    pub silhouette_score: f32,
}

impl From<&ClusteringResult> for ClusteringStats {
    fn from(r: &ClusteringResult) -> Self {
        Self { chosen_k: r.chosen_k, n_clusters: r.clusters.len(), silhouette_score: r.silhouette_score }
    }
}

/// Everything one query produces, serialised once at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub num_results: usize,
    pub mode: SearchMode,
    pub results: Vec<ScoredDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<SearchBreakdown>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<ClusterView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clustering: Option<ClusteringStats>,
}
