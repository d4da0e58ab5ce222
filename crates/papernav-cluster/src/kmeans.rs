//! Seeded k-means over `linfa-clustering`.
//!
//! Every run of `fit` with the same points, `k` and seed yields the same
//! labels. No returned cluster is empty as long as `k <= n`.

use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use papernav_core::{Error, Result};

const TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f32>>,
}

impl Partition {
    pub fn k(&self) -> usize { self.centroids.len() }

    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k()];
        for &l in &self.labels { sizes[l] += 1; }
        sizes
    }
}

pub fn squared_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| { let d = f64::from(*x) - f64::from(*y); d * d }).sum()
}

/// Fit `k` clusters (clamped to `1..=n`) with k-means++ seeding from `seed`.
pub fn fit(points: &[&[f32]], k: usize, seed: u64, max_iterations: usize) -> Result<Partition> {
    let n = points.len();
    if n == 0 {
        return Err(Error::InvalidInput("nothing to cluster".into()));
    }
    let dim = points[0].len();
    if dim == 0 || points.iter().any(|p| p.len() != dim) {
        return Err(Error::InvalidInput("points need non-empty vectors of one dimension".into()));
    }
    let k = k.clamp(1, n);

    let mut data = Array2::<f64>::zeros((n, dim));
    for (i, p) in points.iter().enumerate() {
        for (j, &v) in p.iter().enumerate() {
            data[[i, j]] = f64::from(v);
        }
    }
    let dataset = DatasetBase::from(data.clone());
    let model = KMeans::params_with_rng(k, StdRng::seed_from_u64(seed))
        .max_n_iterations(max_iterations.max(1) as u64)
        .tolerance(TOLERANCE)
        .fit(&dataset)
        .map_err(|e| Error::Clustering(format!("k-means with k={k} over {n} points: {e}")))?;

    let assignments: Array1<usize> = model.predict(&data);
    let mut labels: Vec<usize> = assignments.iter().copied().collect();
    let fitted: Vec<Vec<f32>> = model
        .centroids()
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|&v| v as f32).collect())
        .collect();

    fill_empty(points, &mut labels, &fitted);
    let centroids = recompute_centroids(points, &labels, k);
    Ok(Partition { labels, centroids })
}

/// Give every empty cluster the point farthest from its centroid, taken from a
/// cluster that can spare one.
fn fill_empty(points: &[&[f32]], labels: &mut [usize], centroids: &[Vec<f32>]) {
    let k = centroids.len();
    loop {
        let mut sizes = vec![0usize; k];
        for &l in labels.iter() { sizes[l] += 1; }
        let Some(empty) = sizes.iter().position(|&s| s == 0) else { return };
        let donor = labels
            .iter()
            .enumerate()
            .filter(|&(_, &l)| sizes[l] > 1)
            .map(|(i, &l)| (i, squared_distance(points[i], &centroids[l])))
            .fold(None::<(usize, f64)>, |best, (i, d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((i, d)),
            });
        match donor {
            Some((i, _)) => labels[i] = empty,
            None => return,
        }
    }
}

fn recompute_centroids(points: &[&[f32]], labels: &[usize], k: usize) -> Vec<Vec<f32>> {
    let dim = points.first().map_or(0, |p| p.len());
    let mut sums = vec![vec![0f64; dim]; k];
    let mut counts = vec![0usize; k];
    for (p, &l) in points.iter().zip(labels) {
        counts[l] += 1;
        for (s, x) in sums[l].iter_mut().zip(p.iter()) { *s += f64::from(*x); }
    }
    sums.into_iter()
        .zip(counts)
        .map(|(sum, c)| {
            let c = c.max(1) as f64;
            sum.into_iter().map(|s| (s / c) as f32).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0], vec![0.1, 0.0], vec![0.0, 0.1],
            vec![5.0, 5.0], vec![5.1, 5.0], vec![5.0, 5.1],
        ]
    }

    #[test]
    fn separates_two_blobs() {
        let data = blobs();
        let points: Vec<&[f32]> = data.iter().map(Vec::as_slice).collect();
        let p = fit(&points, 2, 42, 100).expect("fit");
        assert_eq!(p.labels[0], p.labels[1]);
        assert_eq!(p.labels[1], p.labels[2]);
        assert_eq!(p.labels[3], p.labels[4]);
        assert_ne!(p.labels[0], p.labels[3]);
        assert!((p.centroids[p.labels[3]][0] - 5.033).abs() < 0.01);
    }

    #[test]
    fn same_seed_same_partition() {
        let data = blobs();
        let points: Vec<&[f32]> = data.iter().map(Vec::as_slice).collect();
        assert_eq!(fit(&points, 3, 7, 100).expect("fit"), fit(&points, 3, 7, 100).expect("fit"));
    }

    #[test]
    fn k_is_clamped_to_the_point_count() {
        let data = blobs();
        let points: Vec<&[f32]> = data[..2].iter().map(Vec::as_slice).collect();
        let p = fit(&points, 5, 42, 100).expect("fit");
        assert_eq!(p.k(), 2);
        assert_eq!(p.sizes(), vec![1, 1]);
    }

    #[test]
    fn rejects_ragged_or_empty_input() {
        assert!(matches!(fit(&[], 2, 42, 10), Err(Error::InvalidInput(_))));
        let a = [1.0f32, 2.0];
        let b = [1.0f32];
        assert!(matches!(fit(&[&a, &b], 2, 42, 10), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn fill_empty_moves_the_farthest_spare_point() {
        let data = [vec![0.0f32], vec![0.1], vec![3.0]];
        let points: Vec<&[f32]> = data.iter().map(Vec::as_slice).collect();
        let mut labels = vec![0, 0, 0];
        fill_empty(&points, &mut labels, &[vec![0.0], vec![10.0]]);
        assert_eq!(labels, vec![0, 0, 1]);
    }
}
