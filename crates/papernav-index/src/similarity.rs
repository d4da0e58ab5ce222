//! Exact cosine scoring and top-k selection over the committed vectors.

use std::cmp::Ordering;

/// Cosine similarity in `[-1, 1]`. Zero-norm, length-mismatched or
/// non-finite inputs score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() { return 0.0; }
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) { dot += x * y; na += x * x; nb += y * y; }
    if na == 0.0 || nb == 0.0 { return 0.0; }
    let sim = dot / (na.sqrt() * nb.sqrt());
    if sim.is_finite() { sim.clamp(-1.0, 1.0) } else { 0.0 }
}

pub fn score_all(query: &[f32], vectors: &[Vec<f32>]) -> Vec<f32> {
    vectors.iter().map(|v| cosine_similarity(query, v)).collect()
}

/// Descending by score; equal scores keep insertion order (lower position first).
pub fn rank_order(a: (usize, f32), b: (usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

/// Positions of the `k` best scores, best first.
pub fn top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| rank_order(*a, *b));
    ranked.truncate(k.min(scores.len()));
    ranked.into_iter().map(|(pos, _)| pos).collect()
}
