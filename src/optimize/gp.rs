// Gaussian-process minimization over the unit cube, behind a small
// `Minimizer` seam so any black-box search can stand in.

use std::time::Instant;

use nalgebra::{Cholesky, DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Outcome of a minimization run: the incumbent plus every evaluated point,
/// in evaluation order.
#[derive(Debug, Clone)]
pub struct MinimizeResult {
    pub best_x: Vec<f64>,
    pub best_value: f64,
    pub evaluations: Vec<(Vec<f64>, f64)>,
}

/// Black-box minimizer over `[0, 1]^dim`. An expired deadline stops the run
/// early; the result then reflects the completed evaluations only.
pub trait Minimizer {
    fn minimize(
        &self,
        dim: usize,
        n_calls: usize,
        deadline: Option<Instant>,
        objective: &mut dyn FnMut(&[f64]) -> f64,
    ) -> MinimizeResult;
}

/// Sequential GP surrogate with an expected-improvement acquisition.
/// Bootstraps with seeded uniform points, then proposes the best of a fixed
/// candidate batch per step. Deterministic for a fixed seed.
pub struct GpMinimizer {
    pub n_initial: usize,
    pub seed: u64,
    /// Candidate points scored per model-guided step.
    pub candidates: usize,
    /// RBF kernel length scale in unit-cube coordinates.
    pub length_scale: f64,
    /// Expected-improvement exploration margin.
    pub exploration: f64,
}

impl Default for GpMinimizer {
    fn default() -> Self {
        Self {
            n_initial: 10,
            seed: 42,
            candidates: 256,
            length_scale: 0.25,
            exploration: 0.01,
        }
    }
}

impl Minimizer for GpMinimizer {
    fn minimize(
        &self,
        dim: usize,
        n_calls: usize,
        deadline: Option<Instant>,
        objective: &mut dyn FnMut(&[f64]) -> f64,
    ) -> MinimizeResult {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut xs: Vec<Vec<f64>> = Vec::with_capacity(n_calls);
        let mut ys: Vec<f64> = Vec::with_capacity(n_calls);

        for call in 0..n_calls {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::info!(completed = call, budget = n_calls, "time budget reached");
                break;
            }
            let x = if call < self.n_initial || xs.len() < 2 {
                uniform_point(dim, &mut rng)
            } else {
                self.propose(&xs, &ys, dim, &mut rng)
                    .unwrap_or_else(|| uniform_point(dim, &mut rng))
            };
            let y = objective(&x);
            xs.push(x);
            ys.push(y);
        }

        let best = ys
            .iter()
            .enumerate()
            .filter(|(_, y)| y.is_finite())
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i);
        match best {
            Some(i) => MinimizeResult {
                best_x: xs[i].clone(),
                best_value: ys[i],
                evaluations: xs.into_iter().zip(ys).collect(),
            },
            None => MinimizeResult {
                best_x: vec![0.5; dim],
                best_value: f64::INFINITY,
                evaluations: xs.into_iter().zip(ys).collect(),
            },
        }
    }
}

impl GpMinimizer {
    /// Fit the surrogate on the standardized observations and return the
    /// candidate with the highest expected improvement. `None` when the
    /// surface is degenerate (flat observations, singular kernel).
    fn propose(
        &self,
        xs: &[Vec<f64>],
        ys: &[f64],
        dim: usize,
        rng: &mut StdRng,
    ) -> Option<Vec<f64>> {
        let n = xs.len();
        let mean = ys.iter().sum::<f64>() / n as f64;
        let std = (ys.iter().map(|y| (y - mean) * (y - mean)).sum::<f64>() / n as f64).sqrt();
        if std == 0.0 || !std.is_finite() {
            return None;
        }
        let y_std: Vec<f64> = ys.iter().map(|y| (y - mean) / std).collect();

        let mut k = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                k[(i, j)] = self.kernel(&xs[i], &xs[j]);
            }
            k[(i, i)] += 1e-6;
        }
        let chol = Cholesky::new(k)?;
        let alpha = chol.solve(&DVector::from_vec(y_std.clone()));
        let y_min = y_std.iter().copied().fold(f64::INFINITY, f64::min);

        let best_idx = ys
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)?;
        let normal = Normal::new(0.0, 1.0).ok()?;

        let mut best_candidate: Option<(f64, Vec<f64>)> = None;
        for c in 0..self.candidates {
            // Every fourth candidate perturbs the incumbent to sharpen the
            // local search; the rest explore uniformly.
            let candidate = if c % 4 == 3 {
                xs[best_idx]
                    .iter()
                    .map(|v| (v + rng.random_range(-0.1..0.1)).clamp(0.0, 1.0))
                    .collect()
            } else {
                uniform_point(dim, rng)
            };

            let k_vec = DVector::from_iterator(n, xs.iter().map(|x| self.kernel(x, &candidate)));
            let mu = k_vec.dot(&alpha);
            let v = chol.solve(&k_vec);
            let var = (1.0 - k_vec.dot(&v)).max(1e-12);
            let sigma = var.sqrt();

            let z = (y_min - mu - self.exploration) / sigma;
            let ei = (y_min - mu - self.exploration) * normal.cdf(z) + sigma * normal.pdf(z);
            if best_candidate.as_ref().is_none_or(|(score, _)| ei > *score) {
                best_candidate = Some((ei, candidate));
            }
        }
        best_candidate.map(|(_, x)| x)
    }

    fn kernel(&self, a: &[f64], b: &[f64]) -> f64 {
        let sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
        (-sq / (2.0 * self.length_scale * self.length_scale)).exp()
    }
}

fn uniform_point(dim: usize, rng: &mut StdRng) -> Vec<f64> {
    (0..dim).map(|_| rng.random::<f64>()).collect()
}
