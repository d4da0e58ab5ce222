use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use papernav_cluster::{format, TopicClusterer};
use papernav_core::config::{RetrievalSettings, Settings};
use papernav_core::traits::Embedder;
use papernav_core::types::{Document, IndexStats, MetadataRecord, ScoredDocument, SearchMode, SearchResult};
use papernav_core::{Error, Result};
use papernav_embed::SharedEncoder;
use papernav_index::{BuildReport, Fusion, IndexStore, LoadOutcome, QueryVectors};

use crate::response::{ClusteringStats, SearchBreakdown, SearchResponse};

/// Query-time orchestration over one `IndexStore`.
///
/// The store sits behind a reader/writer lock: `add`, `build`, `save`, `load`
/// and `reset` take it exclusively; `search` and `stats` share it.
/// Queries are encoded before the lock is taken.
pub struct HybridSearchEngine {
    encoder: Arc<SharedEncoder>,
    store: RwLock<IndexStore>,
    retrieval: RetrievalSettings,
    fusion: Fusion,
    clusterer: TopicClusterer,
}

impl HybridSearchEngine {
    pub fn new(encoder: Arc<SharedEncoder>, settings: &Settings) -> Result<Self> {
        let r = &settings.retrieval;
        let fusion = Fusion::new(r.text_weight, r.metadata_weight, r.candidate_multiplier)?;
        let store = IndexStore::with_location(settings.embedding.dimension, settings.data.index_dir());
        Ok(Self {
            encoder,
            store: RwLock::new(store),
            retrieval: r.clone(),
            fusion,
            clusterer: TopicClusterer::new(settings.clustering.clone()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexStore> { self.store.read().unwrap_or_else(PoisonError::into_inner) }
    fn write(&self) -> RwLockWriteGuard<'_, IndexStore> { self.store.write().unwrap_or_else(PoisonError::into_inner) }

    fn embedder(&self) -> Result<&dyn Embedder> {
        self.encoder.get().map_err(|e| Error::InvalidConfig(format!("encoder unavailable: {e}")))
    }

    pub fn add(&self, document: Document, metadata: MetadataRecord) -> Result<()> {
        self.write().add(document, metadata)
    }

    pub fn build(&self) -> Result<BuildReport> {
        let embedder = self.embedder()?;
        self.write().build(embedder)
    }

    /// Ranked results for `query`. The query is encoded once and the same vector
    /// scores both collections.
    pub fn search(&self, query: &str, k: usize, mode: SearchMode) -> Result<Vec<SearchResult>> {
        let q = self.encode_query(query)?;
        self.read().search(QueryVectors { text: &q, metadata: &q }, k, mode, &self.fusion)
    }

    /// `search` joined with each hit's document, metadata and text vector, all
    /// read under one lock acquisition.
    pub fn search_documents(&self, query: &str, k: usize, mode: SearchMode) -> Result<Vec<ScoredDocument>> {
        let q = self.encode_query(query)?;
        let store = self.read();
        let hits = store.search(QueryVectors { text: &q, metadata: &q }, k, mode, &self.fusion)?;
        let corpus = store.corpus();
        Ok(hits
            .into_iter()
            .filter_map(|result| {
                let pos = store.position_of(&result.document_id)?;
                Some(ScoredDocument {
                    document: corpus.document(pos)?.clone(),
                    metadata: corpus.metadata(pos)?.clone(),
                    text_vector: corpus.text_vector(pos)?.to_vec(),
                    result,
                })
            })
            .collect())
    }

    /// One full query: results, hybrid breakdown and optional topic clusters.
    ///
    /// `k` defaults to `retrieval.top_k` and is capped at `retrieval.max_results`.
    /// Too few results to cluster is not an error; the response just has no clusters.
    pub fn respond(&self, query: &str, k: Option<usize>, mode: SearchMode, with_clusters: bool) -> Result<SearchResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("query must not be empty".into()));
        }
        let k = k.unwrap_or(self.retrieval.top_k).min(self.retrieval.max_results);
        let results = self.search_documents(query, k, mode)?;
        let breakdown = match mode {
            SearchMode::Hybrid => SearchBreakdown::from_results(&results),
            SearchMode::TextOnly => None,
        };

        let mut clusters = Vec::new();
        let mut clustering = None;
        let settings = self.clusterer.settings();
        if with_clusters && results.len() >= settings.min_clusters {
            let max_k = settings.max_clusters.min(results.len());
            match self.clusterer.cluster(&results, settings.min_clusters, max_k, None) {
                Ok(result) => {
                    clustering = Some(ClusteringStats::from(&result));
                    clusters = format(&result, &results);
                }
                Err(e @ Error::ClusteringInfeasible { .. }) => debug!(error = %e, "skipping clustering"),
                Err(e @ Error::Clustering(_)) => warn!(error = %e, "clustering failed; returning plain results"),
                Err(e) => return Err(e),
            }
        }

        Ok(SearchResponse { query: query.to_string(), num_results: results.len(), mode, results, breakdown, clusters, clustering })
    }

    fn encode_query(&self, query: &str) -> Result<Vec<f32>> {
        if !self.read().is_indexed() {
            return Err(Error::NotIndexed);
        }
        let embedder = self.embedder()?;
        embedder
            .embed(query)
            .map_err(|e| Error::EncodingFailure { id: "<query>".into(), reason: e.to_string() })
    }

    pub fn stats(&self) -> IndexStats { self.read().stats() }

    /// Save to the configured index directory.
    pub fn save(&self) -> Result<()> {
        let mut store = self.write();
        let location = store.location().map(Path::to_path_buf).ok_or_else(|| Error::Persistence("no index location configured".into()))?;
        store.save(&location)
    }

    /// Save under `location`, which later `load` and `reset` calls then use.
    pub fn save_to(&self, location: &Path) -> Result<()> { self.write().save(location) }

    /// Load from the configured index directory.
    pub fn load(&self) -> LoadOutcome {
        let location = self.read().location().map(Path::to_path_buf);
        match location {
            Some(location) => self.load_from(&location),
            None => LoadOutcome::Missing,
        }
    }

    /// Load a snapshot and reject it if it was built by a different encoder.
    pub fn load_from(&self, location: &Path) -> LoadOutcome {
        let mut store = self.write();
        let outcome = store.load(location);
        if !outcome.is_loaded() {
            return outcome;
        }
        let Some(saved) = store.encoder_id().map(str::to_string) else { return outcome };
        match self.encoder.get() {
            Ok(embedder) if embedder.id() != saved => {
                let reason = format!("index built with encoder '{saved}', active encoder is '{}'", embedder.id());
                warn!(location = %location.display(), %reason, "saved index unusable; starting empty");
                store.clear();
                LoadOutcome::Corrupt(reason)
            }
            Ok(_) => outcome,
            Err(e) => {
                warn!(error = %e, "encoder unavailable; cannot verify saved index");
                outcome
            }
        }
    }

    pub fn reset(&self) {
        self.write().reset();
        info!("index reset");
    }
}
