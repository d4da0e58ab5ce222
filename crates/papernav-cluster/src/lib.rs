//! papernav-cluster
//!
//! Topic clustering over retrieval results: seeded linfa k-means for every candidate
//! cluster count, silhouette-based selection, keyword summaries and a flat
//! view for transport.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use papernav_core::config::ClusteringSettings;
use papernav_core::types::{Cluster, ClusterView, ClusteringResult, ScoredDocument};
use papernav_core::{Error, Result};
use papernav_index::similarity::{cosine_similarity, rank_order};

pub mod keywords;
pub mod kmeans;
pub mod silhouette;

pub use keywords::KeywordExtractor;
pub use kmeans::{fit, Partition};
pub use silhouette::silhouette_score;

const LABEL_KEYWORDS: usize = 3;

/// One item to cluster: an id, the text keywords are drawn from and its vector.
#[derive(Debug, Clone, Copy)]
pub struct ClusterInput<'a> {
    pub document_id: &'a str,
    pub text: &'a str,
    pub vector: &'a [f32],
}

impl<'a> From<&'a ScoredDocument> for ClusterInput<'a> {
    fn from(doc: &'a ScoredDocument) -> Self {
        Self { document_id: &doc.result.document_id, text: &doc.document.text, vector: &doc.text_vector }
    }
}

pub struct TopicClusterer {
    settings: ClusteringSettings,
    keywords: KeywordExtractor,
}

impl TopicClusterer {
    pub fn new(settings: ClusteringSettings) -> Self { Self { settings, keywords: KeywordExtractor::default() } }

    pub fn settings(&self) -> &ClusteringSettings { &self.settings }

    /// Cluster search hits by their text vectors.
    pub fn cluster(&self, results: &[ScoredDocument], min_k: usize, max_k: usize, k: Option<usize>) -> Result<ClusteringResult> {
        let inputs: Vec<ClusterInput<'_>> = results.iter().map(ClusterInput::from).collect();
        self.cluster_inputs(&inputs, min_k, max_k, k)
    }

    /// Partition `inputs` into `k` groups, or into the count in `[min_k, upper]`
    /// with the best silhouette when `k` is `None`. `upper` is
    /// `min(max_k, n - 1)`; ties favour the smaller count.
    pub fn cluster_inputs(&self, inputs: &[ClusterInput<'_>], min_k: usize, max_k: usize, k: Option<usize>) -> Result<ClusteringResult> {
        let n = inputs.len();
        let min_k = min_k.max(2);
        let infeasible = || Error::ClusteringInfeasible { n_documents: n, min_k, max_k };
        if n < min_k {
            return Err(infeasible());
        }
        let upper = max_k.min(n - 1);
        if upper < min_k {
            return Err(infeasible());
        }
        let dim = inputs[0].vector.len();
        if dim == 0 || inputs.iter().any(|i| i.vector.len() != dim) {
            return Err(Error::InvalidInput("cluster inputs need non-empty vectors of one dimension".into()));
        }
        let points: Vec<&[f32]> = inputs.iter().map(|i| i.vector).collect();

        let (partition, score) = match k {
            Some(k) => {
                let k = k.clamp(min_k, upper);
                let p = self.partition(&points, k)?;
                let s = silhouette_score(&points, &p.labels, p.k());
                (p, s)
            }
            None => {
                let mut best: Option<(Partition, f32)> = None;
                let mut last_error = None;
                for k in min_k..=upper {
                    let p = match self.partition(&points, k) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(k, error = %e, "skipping cluster count");
                            last_error = Some(e);
                            continue;
                        }
                    };
                    let s = silhouette_score(&points, &p.labels, p.k());
                    debug!(k, silhouette = s, "scored cluster count");
                    if best.as_ref().map_or(true, |(_, b)| s > *b) {
                        best = Some((p, s));
                    }
                }
                match (best, last_error) {
                    (Some(best), _) => best,
                    (None, Some(e)) => return Err(e),
                    (None, None) => return Err(infeasible()),
                }
            }
        };
        info!(n_documents = n, chosen_k = partition.k(), silhouette = score, "clustered results");
        Ok(self.summarize(inputs, partition, score))
    }

    fn partition(&self, points: &[&[f32]], k: usize) -> Result<Partition> {
        fit(points, k, self.settings.seed, self.settings.max_iterations)
    }

    fn summarize(&self, inputs: &[ClusterInput<'_>], partition: Partition, score: f32) -> ClusteringResult {
        let chosen_k = partition.k();
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); chosen_k];
        for (pos, &label) in partition.labels.iter().enumerate() { members[label].push(pos); }

        let mut clusters: Vec<Cluster> = partition
            .centroids
            .into_iter()
            .zip(members)
            .filter(|(_, m)| !m.is_empty())
            .map(|(centroid, positions)| {
                let mut ranked: Vec<(usize, f32)> = positions.iter().map(|&p| (p, cosine_similarity(inputs[p].vector, &centroid))).collect();
                ranked.sort_by(|a, b| rank_order(*a, *b));
                let keywords = self.keywords.extract(positions.iter().map(|&p| inputs[p].text), self.settings.num_keywords);
                Cluster {
                    cluster_id: 0,
                    size: ranked.len(),
                    member_ids: ranked.iter().map(|&(p, _)| inputs[p].document_id.to_string()).collect(),
                    keywords,
                    centroid,
                }
            })
            .collect();
        clusters.sort_by(|a, b| b.size.cmp(&a.size));
        for (id, cluster) in clusters.iter_mut().enumerate() { cluster.cluster_id = id; }
        ClusteringResult { clusters, chosen_k, silhouette_score: score }
    }
}

/// Flatten a clustering into transport views, members in cluster order.
/// Ids missing from `documents` are left out of the view.
pub fn format(result: &ClusteringResult, documents: &[ScoredDocument]) -> Vec<ClusterView> {
    let by_id: HashMap<&str, &ScoredDocument> = documents.iter().map(|d| (d.result.document_id.as_str(), d)).collect();
    result
        .clusters
        .iter()
        .map(|c| ClusterView {
            cluster_id: c.cluster_id,
            label: cluster_label(c),
            keywords: c.keywords.clone(),
            size: c.size,
            silhouette_score: result.silhouette_score,
            documents: c.member_ids.iter().filter_map(|id| by_id.get(id.as_str()).map(|d| (*d).clone())).collect(),
        })
        .collect()
}

pub fn cluster_label(cluster: &Cluster) -> String {
    if cluster.keywords.is_empty() {
        format!("Cluster {}", cluster.cluster_id)
    } else {
        cluster.keywords[..cluster.keywords.len().min(LABEL_KEYWORDS)].join(", ")
    }
}
