use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use papernav_core::traits::Embedder;
use papernav_core::types::{Document, IndexStats, MetadataRecord, SearchMode, SearchResult};
use papernav_core::{Error, Result};

use crate::similarity::{rank_order, score_all, top_k};
use crate::snapshot::{read_snapshot, snapshot_path, write_snapshot, LoadOutcome, ReadResult, SnapshotRef, FORMAT_VERSION};

const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1000..=2999;

/// Weighted-sum fusion parameters for hybrid search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fusion {
    pub text_weight: f32,
    pub metadata_weight: f32,
    /// Each sub-search contributes its top `k * candidate_multiplier` positions.
    pub candidate_multiplier: usize,
}

impl Default for Fusion {
    fn default() -> Self { Self { text_weight: 0.7, metadata_weight: 0.3, candidate_multiplier: 3 } }
}

impl Fusion {
    pub fn new(text_weight: f32, metadata_weight: f32, candidate_multiplier: usize) -> Result<Self> {
        papernav_core::config::validate_weights(text_weight, metadata_weight)?;
        if candidate_multiplier < 2 {
            return Err(Error::InvalidConfig(format!("candidate_multiplier must be >= 2, got {candidate_multiplier}")));
        }
        Ok(Self { text_weight, metadata_weight, candidate_multiplier })
    }

    pub fn fuse(&self, text_score: f32, metadata_score: f32) -> f32 {
        self.text_weight * text_score + self.metadata_weight * metadata_score
    }
}

/// Query vectors for both collections. Queries carry no metadata, so callers
/// encode the query text once per collection with the same encoder.
#[derive(Debug, Clone, Copy)]
pub struct QueryVectors<'a> {
    pub text: &'a [f32],
    pub metadata: &'a [f32],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub indexed: usize,
    pub skipped: Vec<SkippedDocument>,
}

/// The committed, search-ready corpus. All four sequences share positions.
#[derive(Debug, Clone, Default)]
pub struct IndexedCorpus {
    documents: Vec<Document>,
    metadata: Vec<MetadataRecord>,
    text_vectors: Vec<Vec<f32>>,
    metadata_vectors: Vec<Vec<f32>>,
}

impl IndexedCorpus {
    fn push(&mut self, entry: EncodedEntry) {
        self.documents.push(entry.document);
        self.metadata.push(entry.metadata);
        self.text_vectors.push(entry.text_vector);
        self.metadata_vectors.push(entry.metadata_vector);
    }

    pub fn len(&self) -> usize { self.documents.len() }
    pub fn is_empty(&self) -> bool { self.documents.is_empty() }

    fn is_aligned(&self) -> bool {
        let n = self.documents.len();
        self.metadata.len() == n && self.text_vectors.len() == n && self.metadata_vectors.len() == n
    }

    pub fn document(&self, pos: usize) -> Option<&Document> { self.documents.get(pos) }
    pub fn metadata(&self, pos: usize) -> Option<&MetadataRecord> { self.metadata.get(pos) }
    pub fn text_vector(&self, pos: usize) -> Option<&[f32]> { self.text_vectors.get(pos).map(Vec::as_slice) }
    pub fn metadata_vector(&self, pos: usize) -> Option<&[f32]> { self.metadata_vectors.get(pos).map(Vec::as_slice) }
}

struct PendingEntry {
    document: Document,
    metadata: MetadataRecord,
}

struct EncodedEntry {
    document: Document,
    metadata: MetadataRecord,
    text_vector: Vec<f32>,
    metadata_vector: Vec<f32>,
}

/// Dual vector index over document text and document metadata.
///
/// `add` queues entries, `build` encodes the queue and commits it in one step,
/// `search` scores against the committed corpus only.
pub struct IndexStore {
    dim: usize,
    encoder_id: Option<String>,
    corpus: IndexedCorpus,
    positions: HashMap<String, usize>,
    pending: Vec<PendingEntry>,
    pending_ids: HashSet<String>,
    location: Option<PathBuf>,
}

impl IndexStore {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            encoder_id: None,
            corpus: IndexedCorpus::default(),
            positions: HashMap::new(),
            pending: Vec::new(),
            pending_ids: HashSet::new(),
            location: None,
        }
    }

    /// A store whose persisted artifacts live under `location`; `reset` removes them.
    pub fn with_location(dim: usize, location: impl Into<PathBuf>) -> Self {
        Self { location: Some(location.into()), ..Self::new(dim) }
    }

    pub fn dim(&self) -> usize { self.dim }
    pub fn encoder_id(&self) -> Option<&str> { self.encoder_id.as_deref() }
    pub fn location(&self) -> Option<&Path> { self.location.as_deref() }
    pub fn corpus(&self) -> &IndexedCorpus { &self.corpus }

    pub fn is_indexed(&self) -> bool { !self.corpus.is_empty() && self.corpus.is_aligned() }

    pub fn position_of(&self, id: &str) -> Option<usize> { self.positions.get(id).copied() }

    pub fn add(&mut self, document: Document, metadata: MetadataRecord) -> Result<()> {
        let id = document.id.trim();
        if id.is_empty() {
            return Err(Error::InvalidInput("document id must not be empty".into()));
        }
        if id != document.id {
            return Err(Error::InvalidInput(format!("document id '{}' has surrounding whitespace", document.id)));
        }
        if self.positions.contains_key(id) || self.pending_ids.contains(id) {
            return Err(Error::InvalidInput(format!("duplicate document id '{id}'")));
        }
        if let Some(year) = metadata.year {
            if !YEAR_RANGE.contains(&year) {
                return Err(Error::InvalidInput(format!("document '{id}' has implausible year {year}")));
            }
        }
        self.pending_ids.insert(document.id.clone());
        self.pending.push(PendingEntry { document, metadata });
        Ok(())
    }

    /// Encode every pending entry and commit the ones that succeed.
    ///
    /// Failed entries are reported and dropped from the queue. If entries were
    /// pending and none encoded, nothing changes and `EncodingFailure` is returned.
    pub fn build(&mut self, embedder: &dyn Embedder) -> Result<BuildReport> {
        if self.pending.is_empty() {
            debug!("build called with nothing pending");
            return Ok(BuildReport::default());
        }
        if let Some(existing) = &self.encoder_id {
            if existing != embedder.id() && !self.corpus.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "index was built with encoder '{existing}', refusing to extend it with '{}'",
                    embedder.id()
                )));
            }
        }

        let total = self.pending.len();
        info!(pending = total, committed = self.corpus.len(), "building index");
        let pb = progress_bar(total);
        let mut encoded = Vec::with_capacity(total);
        let mut skipped = Vec::new();
        for entry in &self.pending {
            match self.encode_entry(embedder, entry) {
                Ok(e) => encoded.push(e),
                Err(Error::EncodingFailure { id, reason }) => {
                    warn!(%id, %reason, "skipping document");
                    skipped.push(SkippedDocument { id, reason });
                }
                Err(other) => return Err(other),
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        if encoded.is_empty() {
            let first = skipped.first().map_or_else(String::new, |s| s.id.clone());
            return Err(Error::EncodingFailure {
                id: first,
                reason: format!("all {total} pending documents failed to encode"),
            });
        }

        let indexed = encoded.len();
        for entry in encoded {
            self.positions.insert(entry.document.id.clone(), self.corpus.len());
            self.corpus.push(entry);
        }
        self.pending.clear();
        self.pending_ids.clear();
        self.encoder_id = Some(embedder.id().to_string());
        info!(indexed, skipped = skipped.len(), n_documents = self.corpus.len(), "index built");
        Ok(BuildReport { indexed, skipped })
    }

    fn encode_entry(&self, embedder: &dyn Embedder, entry: &PendingEntry) -> Result<EncodedEntry> {
        let id = &entry.document.id;
        let text_vector = self.encode_checked(embedder, id, &entry.document.text)?;
        let metadata_vector = self.encode_checked(embedder, id, &entry.metadata.enriched_text())?;
        Ok(EncodedEntry {
            document: entry.document.clone(),
            metadata: entry.metadata.clone(),
            text_vector,
            metadata_vector,
        })
    }

    fn encode_checked(&self, embedder: &dyn Embedder, id: &str, text: &str) -> Result<Vec<f32>> {
        let failure = |reason: String| Error::EncodingFailure { id: id.to_string(), reason };
        let v = embedder.embed(text).map_err(|e| failure(e.to_string()))?;
        if v.len() != self.dim {
            return Err(failure(format!("encoder returned {} dims, index expects {}", v.len(), self.dim)));
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(failure("encoder returned non-finite values".into()));
        }
        Ok(v)
    }

    /// Rank the committed corpus against `query`.
    ///
    /// `k` is clamped to the corpus size. `TextOnly` ranks by text similarity;
    /// `Hybrid` fuses text and metadata similarity over the union of both
    /// sub-searches' top `k * candidate_multiplier` positions.
    pub fn search(&self, query: QueryVectors<'_>, k: usize, mode: SearchMode, fusion: &Fusion) -> Result<Vec<SearchResult>> {
        if !self.is_indexed() {
            return Err(Error::NotIndexed);
        }
        let k = k.min(self.corpus.len());
        if k == 0 {
            return Ok(Vec::new());
        }
        let text_scores = score_all(query.text, &self.corpus.text_vectors);
        let results = match mode {
            SearchMode::TextOnly => top_k(&text_scores, k)
                .into_iter()
                .enumerate()
                .map(|(i, pos)| SearchResult {
                    document_id: self.corpus.documents[pos].id.clone(),
                    score: text_scores[pos],
                    text_score: None,
                    metadata_score: None,
                    rank: i + 1,
                })
                .collect(),
            SearchMode::Hybrid => {
                let metadata_scores = score_all(query.metadata, &self.corpus.metadata_vectors);
                let depth = k.saturating_mul(fusion.candidate_multiplier);
                let candidates: BTreeSet<usize> = top_k(&text_scores, depth)
                    .into_iter()
                    .chain(top_k(&metadata_scores, depth))
                    .collect();
                let mut fused: Vec<(usize, f32)> = candidates
                    .into_iter()
                    .map(|pos| (pos, fusion.fuse(text_scores[pos], metadata_scores[pos])))
                    .collect();
                fused.sort_by(|a, b| rank_order(*a, *b));
                fused
                    .into_iter()
                    .take(k)
                    .enumerate()
                    .map(|(i, (pos, score))| SearchResult {
                        document_id: self.corpus.documents[pos].id.clone(),
                        score,
                        text_score: Some(text_scores[pos]),
                        metadata_score: Some(metadata_scores[pos]),
                        rank: i + 1,
                    })
                    .collect()
            }
        };
        Ok(results)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            is_indexed: self.is_indexed(),
            n_documents: self.corpus.len(),
            n_pending: self.pending.len(),
            embedding_dim: self.dim,
        }
    }

    /// Persist the committed corpus (pending entries are not saved).
    ///
    /// `location` becomes the store's location, so a later `reset` removes
    /// what was written here.
    pub fn save(&mut self, location: &Path) -> Result<()> {
        let snapshot = SnapshotRef {
            version: FORMAT_VERSION,
            encoder_id: self.encoder_id.as_deref().unwrap_or_default(),
            dim: self.dim,
            documents: &self.corpus.documents,
            metadata: &self.corpus.metadata,
            text_vectors: &self.corpus.text_vectors,
            metadata_vectors: &self.corpus.metadata_vectors,
        };
        let path = write_snapshot(location, &snapshot)?;
        info!(path = %path.display(), n_documents = self.corpus.len(), "index saved");
        self.location = Some(location.to_path_buf());
        Ok(())
    }

    /// Replace the store's contents with the snapshot under `location`.
    ///
    /// Never fails: a missing or unusable snapshot leaves the store empty and
    /// NotIndexed, and the outcome says why.
    pub fn load(&mut self, location: &Path) -> LoadOutcome {
        self.clear();
        self.location = Some(location.to_path_buf());
        let snapshot = match read_snapshot(location) {
            ReadResult::Found(s) => s,
            ReadResult::Missing => {
                info!(location = %location.display(), "no saved index; starting empty");
                return LoadOutcome::Missing;
            }
            ReadResult::Corrupt(reason) => {
                warn!(location = %location.display(), %reason, "saved index unusable; starting empty");
                return LoadOutcome::Corrupt(reason);
            }
        };
        if let Err(reason) = snapshot.check_alignment(self.dim) {
            warn!(location = %location.display(), %reason, "saved index unusable; starting empty");
            return LoadOutcome::Corrupt(reason);
        }
        let mut positions = HashMap::with_capacity(snapshot.documents.len());
        for (pos, doc) in snapshot.documents.iter().enumerate() {
            if positions.insert(doc.id.clone(), pos).is_some() {
                let reason = format!("duplicate document id '{}'", doc.id);
                warn!(location = %location.display(), %reason, "saved index unusable; starting empty");
                return LoadOutcome::Corrupt(reason);
            }
        }
        let n_documents = snapshot.documents.len();
        let snapshot_version = snapshot.version;
        self.positions = positions;
        self.encoder_id = (!snapshot.encoder_id.is_empty()).then_some(snapshot.encoder_id);
        self.corpus = IndexedCorpus {
            documents: snapshot.documents,
            metadata: snapshot.metadata,
            text_vectors: snapshot.text_vectors,
            metadata_vectors: snapshot.metadata_vectors,
        };
        info!(location = %location.display(), n_documents, version = snapshot_version, "index loaded");
        LoadOutcome::Loaded { n_documents }
    }

    /// Drop everything in memory and delete the persisted snapshot, if any.
    pub fn reset(&mut self) {
        self.clear();
        if let Some(location) = &self.location {
            let path = snapshot_path(location);
            match fs::remove_file(&path) {
                Ok(()) => info!(path = %path.display(), "removed saved index"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove saved index"),
            }
        }
    }

    /// Drop the in-memory corpus and queue; persisted artifacts are untouched.
    pub fn clear(&mut self) {
        self.corpus = IndexedCorpus::default();
        self.positions.clear();
        self.pending.clear();
        self.pending_ids.clear();
        self.encoder_id = None;
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%)") {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
