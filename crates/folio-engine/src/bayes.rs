// Gaussian-process Bayesian optimization of the Omega ratio
//
// An alternative weight optimizer that shares no state with the AD graph:
// it only sees an objective callable over (weights, return matrix). The GP
// surrogate uses an RBF kernel, a Cholesky-based posterior, and a UCB
// acquisition over randomly sampled candidate weight vectors.

use folio_core::domain::errors::{FolioError, Result};
use ndarray::Array2;
use rand::Rng;

/// Objective contract consumed by the optimizer. Lower scores are better;
/// the Omega objective returns the negated ratio for that reason.
pub trait Objective {
    fn score(&self, weights: &[f64], asset_returns: &Array2<f64>) -> f64;
}

/// Gaussian kernel density estimator.
#[derive(Debug, Clone, Default)]
pub struct Kde;

impl Kde {
    fn gaussian_kernel(u: f64) -> f64 {
        (-0.5 * u * u).exp() / (2.0 * std::f64::consts::PI).sqrt()
    }

    /// Density of `data` at each of `points` with the given bandwidth.
    pub fn evaluate(&self, data: &[f64], bandwidth: f64, points: &[f64]) -> Vec<f64> {
        let n = data.len() as f64;
        points
            .iter()
            .map(|&p| {
                let sum: f64 = data
                    .iter()
                    .map(|&x| Self::gaussian_kernel((p - x) / bandwidth))
                    .sum();
                sum / (n * bandwidth)
            })
            .collect()
    }
}

/// Negated Omega ratio of the portfolio return distribution, estimated by
/// KDE-weighted gain/loss mass around `threshold`.
#[derive(Debug, Clone)]
pub struct OmegaRatio {
    kde: Kde,
    pub threshold: f64,
}

impl OmegaRatio {
    pub fn new(threshold: f64) -> Self {
        Self {
            kde: Kde,
            threshold,
        }
    }
}

impl Objective for OmegaRatio {
    fn score(&self, weights: &[f64], asset_returns: &Array2<f64>) -> f64 {
        let total: f64 = weights.iter().sum();
        let n_obs = asset_returns.ncols();

        // Portfolio returns under normalized weights.
        let mut rp = vec![0.0; n_obs];
        for (i, &w) in weights.iter().enumerate() {
            let w = w / total;
            for j in 0..n_obs {
                rp[j] += w * asset_returns[[i, j]];
            }
        }

        let n = rp.len() as f64;
        let mean = rp.iter().sum::<f64>() / n;
        let variance = rp.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / (n - 1.0);
        let std_dev = variance.sqrt();

        // Silverman's rule of thumb.
        let bandwidth = 1.06 * std_dev * n.powf(-0.2);
        let kde_values = self.kde.evaluate(&rp, bandwidth, &rp);

        let mut gain = 0.0;
        let mut loss = 0.0;
        for (r, k) in rp.iter().zip(&kde_values) {
            if *r > self.threshold {
                gain += k;
            } else {
                loss += k;
            }
        }

        -(gain / loss)
    }
}

pub struct BayesOptimizer {
    objective: Box<dyn Objective>,
    pub length_scale: f64,
    pub noise: f64,
    /// UCB exploration coefficient.
    pub beta: f64,
    /// Random candidates scored by the acquisition per call.
    pub candidates_per_call: usize,
}

impl BayesOptimizer {
    pub fn new(objective: Box<dyn Objective>) -> Self {
        Self {
            objective,
            length_scale: 1.0,
            noise: 1e-6,
            beta: 2.0,
            candidates_per_call: 32,
        }
    }

    /// Optimize portfolio weights over `asset_returns` (one row per asset)
    /// within a budget of `n_calls` objective evaluations. Returns the best
    /// weights found, normalized to sum 1.
    pub fn optimize(&self, asset_returns: &Array2<f64>, n_calls: usize) -> Result<Vec<f64>> {
        self.optimize_with(asset_returns, n_calls, &mut rand::thread_rng())
    }

    fn optimize_with<R: Rng>(
        &self,
        asset_returns: &Array2<f64>,
        n_calls: usize,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        let num_assets = asset_returns.nrows();
        if num_assets == 0 || n_calls == 0 {
            return Err(FolioError::PreconditionViolated(
                "bayes optimizer needs at least one asset and one call".to_string(),
            ));
        }

        let mut xs: Vec<Vec<f64>> = Vec::with_capacity(n_calls);
        let mut ys: Vec<f64> = Vec::with_capacity(n_calls);

        // Seed the surrogate with one random point per asset.
        let init_count = num_assets.min(n_calls);
        for _ in 0..init_count {
            let weights = random_weights(num_assets, rng);
            let y = self.objective.score(&weights, asset_returns);
            xs.push(weights);
            ys.push(y);
        }

        let mut best_index = 0;
        for (i, y) in ys.iter().enumerate() {
            if *y < ys[best_index] {
                best_index = i;
            }
        }
        let mut best_weights = xs[best_index].clone();
        let mut best_value = ys[best_index];

        for _ in init_count..n_calls {
            // Acquisition: the objective is a negated ratio, so UCB is
            // computed on its negation (the quantity being maximized).
            let mut next_point = random_weights(num_assets, rng);
            let mut best_ucb = f64::NEG_INFINITY;
            for _ in 0..self.candidates_per_call {
                let candidate = random_weights(num_assets, rng);
                let (mu, sigma) = self.gp_predict(&xs, &ys, &candidate)?;
                let ucb = -mu + self.beta * sigma;
                if ucb > best_ucb {
                    best_ucb = ucb;
                    next_point = candidate;
                }
            }

            let new_value = self.objective.score(&next_point, asset_returns);
            if new_value < best_value {
                best_value = new_value;
                best_weights = next_point.clone();
            }
            xs.push(next_point);
            ys.push(new_value);
        }

        let total: f64 = best_weights.iter().sum();
        Ok(best_weights.iter().map(|w| w / total).collect())
    }

    fn rbf_kernel(&self, x1: &[f64], x2: &[f64]) -> f64 {
        let sq_norm: f64 = x1
            .iter()
            .zip(x2)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        (-sq_norm / (2.0 * self.length_scale * self.length_scale)).exp()
    }

    /// GP posterior mean and standard deviation at `x_new`.
    fn gp_predict(&self, xs: &[Vec<f64>], ys: &[f64], x_new: &[f64]) -> Result<(f64, f64)> {
        let n = xs.len();
        let mut kernel = Array2::zeros((n, n));
        for i in 0..n {
            for j in 0..=i {
                let k = self.rbf_kernel(&xs[i], &xs[j]);
                kernel[[i, j]] = k;
                kernel[[j, i]] = k;
            }
        }
        for i in 0..n {
            kernel[[i, i]] += self.noise;
        }

        let k_star: Vec<f64> = xs.iter().map(|x| self.rbf_kernel(x, x_new)).collect();

        let lower = cholesky(&kernel)?;
        let alpha = cho_solve(&lower, ys);
        let mu: f64 = k_star.iter().zip(&alpha).map(|(a, b)| a * b).sum();

        let v = cho_solve(&lower, &k_star);
        let variance =
            self.rbf_kernel(x_new, x_new) - k_star.iter().zip(&v).map(|(a, b)| a * b).sum::<f64>();
        Ok((mu, variance.max(0.0).sqrt()))
    }
}

fn random_weights<R: Rng>(num_assets: usize, rng: &mut R) -> Vec<f64> {
    (0..num_assets).map(|_| rng.gen_range(0.0..1.0)).collect()
}

/// Lower-triangular Cholesky factor of a symmetric positive-definite matrix.
fn cholesky(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let n = matrix.nrows();
    let mut lower: Array2<f64> = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            if i == j {
                for k in 0..j {
                    sum += lower[[j, k]] * lower[[j, k]];
                }
                let val = matrix[[j, j]] - sum;
                if val <= 0.0 {
                    return Err(FolioError::PreconditionViolated(
                        "GP covariance matrix is not positive definite".to_string(),
                    ));
                }
                lower[[j, j]] = val.sqrt();
            } else {
                for k in 0..j {
                    sum += lower[[i, k]] * lower[[j, k]];
                }
                lower[[i, j]] = (matrix[[i, j]] - sum) / lower[[j, j]];
            }
        }
    }

    Ok(lower)
}

/// Solve (L * L') x = b given the lower Cholesky factor.
fn cho_solve(lower: &Array2<f64>, b: &[f64]) -> Vec<f64> {
    let n = b.len();

    // Forward substitution: L y = b.
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= lower[[i, j]] * y[j];
        }
        y[i] = sum / lower[[i, i]];
    }

    // Back substitution: L' x = y.
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in i + 1..n {
            sum -= lower[[j, i]] * x[j];
        }
        x[i] = sum / lower[[i, i]];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_cholesky_roundtrip() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let l = cholesky(&a).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                let mut reconstructed = 0.0;
                for k in 0..2 {
                    reconstructed += l[[i, k]] * l[[j, k]];
                }
                assert!((reconstructed - a[[i, j]]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(cholesky(&a).is_err());
    }

    #[test]
    fn test_cho_solve() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let l = cholesky(&a).unwrap();
        let x = cho_solve(&l, &[8.0, 7.0]);
        // A * x should give b back.
        assert!((4.0 * x[0] + 2.0 * x[1] - 8.0).abs() < 1e-10);
        assert!((2.0 * x[0] + 3.0 * x[1] - 7.0).abs() < 1e-10);
    }

    #[test]
    fn test_kde_is_symmetric_and_positive() {
        let kde = Kde;
        let data = [-1.0, 0.0, 1.0];
        let values = kde.evaluate(&data, 0.5, &[-2.0, 0.0, 2.0]);
        assert!(values.iter().all(|v| *v > 0.0));
        assert!((values[0] - values[2]).abs() < 1e-12);
        // The center sits closest to all three samples.
        assert!(values[1] > values[0]);
    }

    #[test]
    fn test_omega_prefers_gain_heavy_portfolio() {
        // Asset 0 gains most days, asset 1 loses most days.
        let returns = array![
            [0.02, 0.01, 0.03, -0.01, 0.02, 0.01],
            [-0.02, -0.01, -0.03, 0.01, -0.02, -0.01]
        ];
        let omega = OmegaRatio::new(0.0);
        let good = omega.score(&[1.0, 0.0], &returns);
        let bad = omega.score(&[0.0, 1.0], &returns);
        assert!(good < bad);
    }

    #[test]
    fn test_gp_predict_recovers_training_point() {
        let objective = OmegaRatio::new(0.0);
        let optimizer = BayesOptimizer::new(Box::new(objective));
        let xs = vec![vec![0.2, 0.8], vec![0.7, 0.3]];
        let ys = vec![-1.5, -0.8];
        let (mu, sigma) = optimizer.gp_predict(&xs, &ys, &xs[0]).unwrap();
        // At a training input the posterior collapses onto the observation.
        assert!((mu - ys[0]).abs() < 1e-3);
        assert!(sigma < 1e-2);
    }

    #[test]
    fn test_optimize_returns_normalized_weights() {
        let returns = array![
            [0.02, 0.01, 0.03, -0.01, 0.02, 0.01],
            [-0.02, -0.01, -0.03, 0.01, -0.02, -0.01]
        ];
        let optimizer = BayesOptimizer::new(Box::new(OmegaRatio::new(0.0)));
        let mut rng = StdRng::seed_from_u64(42);
        let weights = optimizer.optimize_with(&returns, 20, &mut rng).unwrap();

        assert_eq!(weights.len(), 2);
        let total: f64 = weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        // The gaining asset should dominate.
        assert!(weights[0] > weights[1]);
    }

    #[test]
    fn test_zero_budget_is_rejected() {
        let optimizer = BayesOptimizer::new(Box::new(OmegaRatio::new(0.0)));
        let returns = array![[0.01, 0.02]];
        assert!(optimizer.optimize(&returns, 0).is_err());
    }
}
