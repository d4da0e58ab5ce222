use crate::kmeans::squared_distance;

/// Mean silhouette coefficient (Euclidean). Points in singleton clusters
/// contribute 0; fewer than two clusters scores 0.
pub fn silhouette_score(points: &[&[f32]], labels: &[usize], k: usize) -> f32 {
    let n = points.len();
    if n == 0 || k < 2 { return 0.0; }
    let mut sizes = vec![0usize; k];
    for &l in labels { sizes[l] += 1; }

    let mut total = 0f64;
    for i in 0..n {
        let own = labels[i];
        if sizes[own] <= 1 { continue; }
        let mut sums = vec![0f64; k];
        for j in 0..n {
            if i != j { sums[labels[j]] += squared_distance(points[i], points[j]).sqrt(); }
        }
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 && b.is_finite() { total += (b - a) / denom; }
    }
    let score = (total / n as f64) as f32;
    if score.is_finite() { score } else { 0.0 }
}
