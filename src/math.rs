use ndarray::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[inline]
pub fn squared_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Lloyd's k-means with k-means++ seeding.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub k: usize,
    pub n_init: usize,
    pub max_iterations: usize,
    pub tolerance: f32,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct Clustering {
    /// `(k, dims)` cluster centers.
    pub centers: Array2<f32>,
    pub labels: Vec<usize>,
    pub inertia: f32,
}

impl Clustering {
    /// Index of the nearest center, lowest index on ties.
    pub fn predict(&self, sample: ArrayView1<'_, f32>) -> usize {
        nearest(&self.centers, sample).0
    }
}

fn nearest(centers: &Array2<f32>, sample: ArrayView1<'_, f32>) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (idx, center) in centers.outer_iter().enumerate() {
        let d = squared_distance(center, sample);
        if d < best.1 {
            best = (idx, d);
        }
    }

    best
}

impl KMeans {
    pub fn new(k: usize, n_init: usize, max_iterations: usize, seed: u64) -> Self {
        Self {
            k,
            n_init,
            max_iterations,
            tolerance: 1e-4,
            seed,
        }
    }

    /// Clusters the rows of `data`; `None` when there are fewer rows than clusters.
    pub fn fit(&self, data: ArrayView2<'_, f32>) -> Option<Clustering> {
        if self.k == 0 || data.nrows() < self.k {
            return None;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut best: Option<Clustering> = None;

        for _ in 0..self.n_init.max(1) {
            let centers = self.seed_centers(data, &mut rng);
            let run = self.lloyd(data, centers);

            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }

        best
    }

    fn seed_centers(&self, data: ArrayView2<'_, f32>, rng: &mut ChaCha8Rng) -> Array2<f32> {
        let n = data.nrows();
        let mut centers = Array2::<f32>::zeros((self.k, data.ncols()));

        let first = rng.gen_range(0..n);
        centers.row_mut(0).assign(&data.row(first));

        let mut dist: Vec<f32> = data
            .outer_iter()
            .map(|row| squared_distance(row, centers.row(0)))
            .collect();

        for c in 1..self.k {
            let total: f32 = dist.iter().sum();

            let pick = if total > 0.0 {
                let mut target = rng.gen::<f32>() * total;
                let mut pick = n - 1;
                for (idx, d) in dist.iter().enumerate() {
                    if target < *d {
                        pick = idx;
                        break;
                    }
                    target -= d;
                }
                pick
            } else {
                rng.gen_range(0..n)
            };

            centers.row_mut(c).assign(&data.row(pick));

            for (idx, row) in data.outer_iter().enumerate() {
                dist[idx] = dist[idx].min(squared_distance(row, centers.row(c)));
            }
        }

        centers
    }

    fn lloyd(&self, data: ArrayView2<'_, f32>, mut centers: Array2<f32>) -> Clustering {
        let n = data.nrows();
        let dims = data.ncols();
        let mut labels = vec![0usize; n];

        for _ in 0..self.max_iterations {
            for (idx, row) in data.outer_iter().enumerate() {
                labels[idx] = nearest(&centers, row).0;
            }

            let mut sums = Array2::<f32>::zeros((self.k, dims));
            let mut counts = vec![0usize; self.k];
            for (idx, row) in data.outer_iter().enumerate() {
                let mut sum = sums.row_mut(labels[idx]);
                sum += &row;
                counts[labels[idx]] += 1;
            }

            let mut shift = 0.0;
            for c in 0..self.k {
                // an emptied cluster keeps its previous center
                if counts[c] == 0 {
                    continue;
                }

                let new_center = sums.row(c).mapv(|v| v / counts[c] as f32);
                shift += squared_distance(new_center.view(), centers.row(c));
                centers.row_mut(c).assign(&new_center);
            }

            if shift <= self.tolerance * self.tolerance {
                break;
            }
        }

        let mut inertia = 0.0;
        for (idx, row) in data.outer_iter().enumerate() {
            let (label, d) = nearest(&centers, row);
            labels[idx] = label;
            inertia += d;
        }

        Clustering {
            centers,
            labels,
            inertia,
        }
    }
}
