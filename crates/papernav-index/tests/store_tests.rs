use std::collections::HashSet;

use anyhow::anyhow;
use proptest::prelude::*;

use papernav_core::traits::Embedder;
use papernav_core::types::{Document, MetadataRecord, SearchMode};
use papernav_core::Error;
use papernav_embed::HashingEmbedder;
use papernav_index::{snapshot_path, Fusion, IndexStore, LoadOutcome, QueryVectors};

const DIM: usize = 256;

fn doc(id: &str, text: &str) -> Document {
    Document { id: id.into(), text: text.into(), full_text_preview: String::new(), file_name: format!("{id}.pdf"), file_path: format!("/papers/{id}.pdf") }
}

fn meta(title: &str, keywords: &[&str]) -> MetadataRecord {
    MetadataRecord { title: title.into(), keywords: keywords.iter().map(|k| k.to_string()).collect(), year: Some(2020), ..MetadataRecord::default() }
}

fn five_paper_store(embedder: &HashingEmbedder) -> IndexStore {
    let mut store = IndexStore::new(DIM);
    let corpus = [
        ("p1", "a neural retrieval system for scientific papers", "Neural Retrieval", &["retrieval", "search"][..]),
        ("p2", "protein folding with molecular dynamics", "Protein Folding", &["biology"][..]),
        ("p3", "an information retrieval system evaluation", "IR Evaluation", &["retrieval", "evaluation"][..]),
        ("p4", "graph algorithms for shortest paths", "Shortest Paths", &["graphs"][..]),
        ("p5", "distributed storage system design", "Storage Systems", &["systems", "storage"][..]),
    ];
    for (id, text, title, kws) in corpus {
        store.add(doc(id, text), meta(title, kws)).expect("add");
    }
    let report = store.build(embedder).expect("build");
    assert_eq!(report.indexed, 5);
    assert!(report.skipped.is_empty());
    store
}

fn query<'a>(v: &'a [f32]) -> QueryVectors<'a> { QueryVectors { text: v, metadata: v } }

/// Fails on any text containing the marker, otherwise delegates to hashing.
struct FlakyEmbedder { inner: HashingEmbedder, marker: &'static str }

impl Embedder for FlakyEmbedder {
    fn id(&self) -> &str { self.inner.id() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        if text.contains(self.marker) { return Err(anyhow!("model refused input")); }
        self.inner.embed(text)
    }
}

#[test]
fn text_only_search_ranks_relevant_papers_first() {
    let embedder = HashingEmbedder::new(DIM);
    let store = five_paper_store(&embedder);
    let q = embedder.embed("retrieval system").expect("q");
    let results = store.search(query(&q), 3, SearchMode::TextOnly, &Fusion::default()).expect("search");

    assert_eq!(results.len(), 3);
    for pair in results.windows(2) { assert!(pair[0].score >= pair[1].score); }
    for (i, r) in results.iter().enumerate() {
        assert!((-1.0..=1.0).contains(&r.score));
        assert_eq!(r.rank, i + 1);
        assert!(r.text_score.is_none() && r.metadata_score.is_none());
    }
    let top_two: HashSet<&str> = results[..2].iter().map(|r| r.document_id.as_str()).collect();
    assert!(top_two.contains("p1") && top_two.contains("p3"), "got {results:?}");
}

#[test]
fn hybrid_scores_are_weighted_sums_of_components() {
    let embedder = HashingEmbedder::new(DIM);
    let store = five_paper_store(&embedder);
    let q = embedder.embed("retrieval evaluation").expect("q");
    let fusion = Fusion::default();
    let results = store.search(query(&q), 5, SearchMode::Hybrid, &fusion).expect("search");

    assert_eq!(results.len(), 5);
    for r in &results {
        let (t, m) = (r.text_score.expect("text"), r.metadata_score.expect("meta"));
        assert!((r.score - (0.7 * t + 0.3 * m)).abs() < 1e-6);
    }
    assert_eq!(results[0].document_id, "p3");
}

#[test]
fn k_is_clamped_and_zero_k_is_empty() {
    let embedder = HashingEmbedder::new(DIM);
    let store = five_paper_store(&embedder);
    let q = embedder.embed("system").expect("q");
    assert_eq!(store.search(query(&q), 50, SearchMode::Hybrid, &Fusion::default()).expect("search").len(), 5);
    assert!(store.search(query(&q), 0, SearchMode::TextOnly, &Fusion::default()).expect("search").is_empty());
}

#[test]
fn search_before_build_is_not_indexed_then_succeeds_after_build() {
    let embedder = HashingEmbedder::new(DIM);
    let mut store = IndexStore::new(DIM);
    let q = embedder.embed("anything").expect("q");
    assert!(matches!(store.search(query(&q), 3, SearchMode::Hybrid, &Fusion::default()), Err(Error::NotIndexed)));

    store.add(doc("only", "anything at all"), MetadataRecord::default()).expect("add");
    assert!(matches!(store.search(query(&q), 3, SearchMode::Hybrid, &Fusion::default()), Err(Error::NotIndexed)));
    assert_eq!(store.stats().n_pending, 1);

    store.build(&embedder).expect("build");
    let results = store.search(query(&q), 3, SearchMode::Hybrid, &Fusion::default()).expect("search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id, "only");
    let stats = store.stats();
    assert!(stats.is_indexed);
    assert_eq!((stats.n_documents, stats.n_pending, stats.embedding_dim), (1, 0, DIM));
}

#[test]
fn build_with_nothing_pending_is_a_no_op() {
    let embedder = HashingEmbedder::new(DIM);
    let mut store = five_paper_store(&embedder);
    let report = store.build(&embedder).expect("build");
    assert_eq!(report.indexed, 0);
    assert_eq!(store.stats().n_documents, 5);
}

#[test]
fn duplicate_ids_are_rejected_against_committed_and_pending() {
    let embedder = HashingEmbedder::new(DIM);
    let mut store = five_paper_store(&embedder);
    assert!(matches!(store.add(doc("p1", "again"), MetadataRecord::default()), Err(Error::InvalidInput(_))));
    store.add(doc("p6", "new"), MetadataRecord::default()).expect("add");
    assert!(matches!(store.add(doc("p6", "new"), MetadataRecord::default()), Err(Error::InvalidInput(_))));
    assert_eq!(store.stats().n_pending, 1);
}

#[test]
fn partial_encoding_failure_skips_only_the_bad_documents() {
    let embedder = FlakyEmbedder { inner: HashingEmbedder::new(DIM), marker: "POISON" };
    let mut store = IndexStore::new(DIM);
    store.add(doc("good", "clean text"), MetadataRecord::default()).expect("add");
    store.add(doc("bad", "POISON text"), MetadataRecord::default()).expect("add");

    let report = store.build(&embedder).expect("build");
    assert_eq!(report.indexed, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].id, "bad");
    assert_eq!(store.stats().n_documents, 1);
    assert_eq!(store.stats().n_pending, 0);
}

#[test]
fn total_encoding_failure_leaves_state_unchanged() {
    let embedder = FlakyEmbedder { inner: HashingEmbedder::new(DIM), marker: "text" };
    let mut store = IndexStore::new(DIM);
    store.add(doc("a", "some text"), MetadataRecord::default()).expect("add");
    store.add(doc("b", "more text"), MetadataRecord::default()).expect("add");

    assert!(matches!(store.build(&embedder), Err(Error::EncodingFailure { .. })));
    let stats = store.stats();
    assert!(!stats.is_indexed);
    assert_eq!((stats.n_documents, stats.n_pending), (0, 2));
}

#[test]
fn wrong_dimension_encoder_is_an_encoding_failure() {
    let embedder = HashingEmbedder::new(DIM / 2);
    let mut store = IndexStore::new(DIM);
    store.add(doc("a", "text"), MetadataRecord::default()).expect("add");
    assert!(matches!(store.build(&embedder), Err(Error::EncodingFailure { .. })));
}

#[test]
fn save_then_load_reproduces_stats_and_results() {
    let tmp = tempfile::tempdir().expect("tmp");
    let embedder = HashingEmbedder::new(DIM);
    let mut store = five_paper_store(&embedder);
    store.save(tmp.path()).expect("save");
    assert!(snapshot_path(tmp.path()).exists());

    let mut restored = IndexStore::new(DIM);
    assert_eq!(restored.load(tmp.path()), LoadOutcome::Loaded { n_documents: 5 });
    assert_eq!(restored.stats(), store.stats());
    assert_eq!(restored.encoder_id(), Some(embedder.id()));

    let q = embedder.embed("retrieval system").expect("q");
    for mode in [SearchMode::TextOnly, SearchMode::Hybrid] {
        let before = store.search(query(&q), 4, mode, &Fusion::default()).expect("before");
        let after = restored.search(query(&q), 4, mode, &Fusion::default()).expect("after");
        assert_eq!(before, after);
    }
}

#[test]
fn loading_a_missing_location_starts_empty() {
    let mut store = IndexStore::new(DIM);
    assert_eq!(store.load(std::path::Path::new("/nonexistent")), LoadOutcome::Missing);
    assert_eq!(store.stats().n_documents, 0);
    assert!(!store.stats().is_indexed);
}

#[test]
fn corrupt_or_mismatched_snapshots_are_reported_not_fatal() {
    let tmp = tempfile::tempdir().expect("tmp");
    std::fs::write(snapshot_path(tmp.path()), b"not a snapshot").expect("write");
    let mut store = IndexStore::new(DIM);
    assert!(matches!(store.load(tmp.path()), LoadOutcome::Corrupt(_)));
    assert!(!store.stats().is_indexed);

    let embedder = HashingEmbedder::new(DIM);
    five_paper_store(&embedder).save(tmp.path()).expect("save");
    let mut other_dim = IndexStore::new(DIM * 2);
    assert!(matches!(other_dim.load(tmp.path()), LoadOutcome::Corrupt(_)));
    assert_eq!(other_dim.stats().n_documents, 0);
}

#[test]
fn reset_clears_memory_and_disk_and_is_idempotent() {
    let tmp = tempfile::tempdir().expect("tmp");
    let embedder = HashingEmbedder::new(DIM);
    five_paper_store(&embedder).save(tmp.path()).expect("save");

    let mut store = IndexStore::with_location(DIM, tmp.path());
    assert!(store.load(tmp.path()).is_loaded());
    store.add(doc("p9", "pending"), MetadataRecord::default()).expect("add");

    store.reset();
    let stats = store.stats();
    assert_eq!((stats.n_documents, stats.n_pending, stats.is_indexed), (0, 0, false));
    assert!(!snapshot_path(tmp.path()).exists());

    store.reset();
    assert_eq!(store.stats(), stats);
    assert_eq!(store.load(tmp.path()), LoadOutcome::Missing);
}

#[test]
fn reset_removes_a_snapshot_written_by_save() {
    let tmp = tempfile::tempdir().expect("tmp");
    let embedder = HashingEmbedder::new(32);
    let mut store = IndexStore::new(32);
    assert_eq!(store.location(), None);
    store.add(doc("a", "only paper"), MetadataRecord::default()).expect("add");
    store.build(&embedder).expect("build");
    store.save(tmp.path()).expect("save");
    assert_eq!(store.location(), Some(tmp.path()));

    store.reset();
    assert!(!snapshot_path(tmp.path()).exists());
    assert_eq!(IndexStore::new(32).load(tmp.path()), LoadOutcome::Missing);
}

#[test]
fn metadata_encoding_failure_skips_the_whole_entry() {
    let embedder = FlakyEmbedder { inner: HashingEmbedder::new(DIM), marker: "Title:" };
    let mut store = IndexStore::new(DIM);
    store.add(doc("plain", "retrieval of papers"), MetadataRecord::default()).expect("add");
    store.add(doc("titled", "retrieval of papers"), meta("Retrieval", &["search"])).expect("add");

    let report = store.build(&embedder).expect("build");
    assert_eq!(report.indexed, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].id, "titled");
    assert_eq!(store.position_of("titled"), None);
    assert_eq!(store.corpus().len(), 1);

    let q = embedder.embed("retrieval").expect("q");
    let hits = store.search(query(&q), 5, SearchMode::Hybrid, &Fusion::default()).expect("search");
    let ids: Vec<&str> = hits.iter().map(|h| h.document_id.as_str()).collect();
    assert_eq!(ids, vec!["plain"]);
}

#[test]
fn hybrid_ties_keep_insertion_order() {
    let embedder = HashingEmbedder::new(DIM);
    let mut store = IndexStore::new(DIM);
    for id in ["z", "a", "m"] {
        store.add(doc(id, "identical body"), meta("Same Title", &["same"])).expect("add");
    }
    store.build(&embedder).expect("build");

    let q = embedder.embed("identical body").expect("q");
    let hits = store.search(query(&q), 3, SearchMode::Hybrid, &Fusion::default()).expect("search");
    let ids: Vec<&str> = hits.iter().map(|h| h.document_id.as_str()).collect();
    assert_eq!(ids, vec!["z", "a", "m"]);
    assert_eq!(hits.iter().map(|h| h.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(hits.windows(2).all(|w| w[0].score == w[1].score));
}

const VOCAB: &[&str] = &["graph", "neural", "protein", "retrieval", "storage", "system", "query", "index", "model", "cluster"];

fn sentence(words: &[usize]) -> String {
    words.iter().map(|&w| VOCAB[w % VOCAB.len()]).collect::<Vec<_>>().join(" ")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn hybrid_results_are_bounded_sorted_and_fused(
        texts in prop::collection::vec(prop::collection::vec(0usize..10, 1..6), 1..12),
        titles in prop::collection::vec(prop::collection::vec(0usize..10, 0..4), 12),
        q in prop::collection::vec(0usize..10, 1..4),
        k in 0usize..15,
        text_weight in 0.0f32..=1.0,
    ) {
        let embedder = HashingEmbedder::new(64);
        let mut store = IndexStore::new(64);
        for (i, words) in texts.iter().enumerate() {
            let m = MetadataRecord { title: sentence(&titles[i]), ..MetadataRecord::default() };
            store.add(doc(&format!("d{i}"), &sentence(words)), m).expect("add");
        }
        store.build(&embedder).expect("build");

        let fusion = Fusion::new(text_weight, 1.0 - text_weight, 3).expect("fusion");
        let qv = embedder.embed(&sentence(&q)).expect("q");
        let results = store.search(query(&qv), k, SearchMode::Hybrid, &fusion).expect("search");

        prop_assert!(results.len() <= k.min(texts.len()));
        let ids: HashSet<&str> = results.iter().map(|r| r.document_id.as_str()).collect();
        prop_assert_eq!(ids.len(), results.len());
        for pair in results.windows(2) { prop_assert!(pair[0].score >= pair[1].score); }
        for r in &results {
            let expected = fusion.text_weight * r.text_score.unwrap_or(f32::NAN) + fusion.metadata_weight * r.metadata_score.unwrap_or(f32::NAN);
            prop_assert!((r.score - expected).abs() < 1e-6);
        }
    }
}
