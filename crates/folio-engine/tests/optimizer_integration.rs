// Integration tests for the AD engine and the Sharpe optimizer

use folio_engine::{Graph, SharpeOptimizer, Value};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Sharpe ratio computed directly from the closed-form formula, used as the
/// reference for finite differences.
fn sharpe(weights: &[f64], mean: &[f64], cov: &Array2<f64>) -> f64 {
    let expected: f64 = weights.iter().zip(mean).map(|(w, m)| w * m).sum();
    let n = weights.len();
    let mut variance = 0.0;
    for i in 0..n {
        for j in 0..n {
            variance += weights[i] * cov[[i, j]] * weights[j];
        }
    }
    expected / variance.sqrt()
}

/// Gradient of the Sharpe graph at `weights`, via one evaluate + derive.
fn graph_gradient(weights: &[f64], mean: &[f64], cov: &Array2<f64>) -> Vec<f64> {
    let mut graph = Graph::new();
    let w = graph.variable(Value::Vector(weights.to_vec()));
    let expected = graph.linear_product(w, mean.to_vec());
    let variance = graph.quadratic_form(w, cov.clone());
    let inv_vol = graph.power(variance, -0.5);
    let root = graph.product(inv_vol, expected);

    graph.evaluate(root).unwrap();
    graph
        .derive(root, &Value::Vector(vec![1.0; weights.len()]))
        .unwrap();
    graph.partial(w).unwrap().as_slice().unwrap().to_vec()
}

fn random_problem(rng: &mut StdRng, n: usize) -> (Vec<f64>, Vec<f64>, Array2<f64>) {
    let mut weights: Vec<f64> = (0..n).map(|_| rng.gen_range(0.1..1.0)).collect();
    let total: f64 = weights.iter().sum();
    for w in weights.iter_mut() {
        *w /= total;
    }

    let mean: Vec<f64> = (0..n).map(|_| rng.gen_range(-0.01..0.03)).collect();

    // C = M'M / n plus a diagonal bump keeps the covariance symmetric and
    // positive definite.
    let m: Vec<Vec<f64>> = (0..n)
        .map(|_| (0..n).map(|_| rng.gen_range(-0.2..0.2)).collect())
        .collect();
    let mut cov = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..n {
                sum += m[k][i] * m[k][j];
            }
            cov[[i, j]] = sum / n as f64;
        }
        cov[[i, i]] += 0.01;
    }

    (weights, mean, cov)
}

#[test]
fn test_gradient_matches_finite_differences() {
    let mut rng = StdRng::seed_from_u64(7);

    for n in [2usize, 3, 5] {
        for _ in 0..20 {
            let (weights, mean, cov) = random_problem(&mut rng, n);
            let analytic = graph_gradient(&weights, &mean, &cov);

            let h = 1e-6;
            for i in 0..n {
                let mut up = weights.clone();
                let mut down = weights.clone();
                up[i] += h;
                down[i] -= h;
                let numeric = (sharpe(&up, &mean, &cov) - sharpe(&down, &mean, &cov)) / (2.0 * h);

                let scale = numeric.abs().max(1.0);
                assert!(
                    (analytic[i] - numeric).abs() / scale < 1e-5,
                    "n={} coord={} analytic={} numeric={}",
                    n,
                    i,
                    analytic[i],
                    numeric
                );
            }
        }
    }
}

#[test]
fn test_sum_invariant_over_many_iterations() {
    let mut rng = StdRng::seed_from_u64(11);
    let (mut weights, mean, cov) = random_problem(&mut rng, 4);

    let optimizer = SharpeOptimizer {
        iterations: 1000,
        ..Default::default()
    };
    optimizer.optimize(&mut weights, &mean, &cov).unwrap();

    let total: f64 = weights.iter().sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn test_end_to_end_two_asset_scenario() {
    let mean = vec![0.10, 0.20];
    let cov = ndarray::array![[0.04, 0.01], [0.01, 0.09]];
    let weights = vec![0.5, 0.5];

    // Node-level values: dot(w, mean) = 0.15, w'Cw = 0.0375.
    let expected: f64 = weights.iter().zip(&mean).map(|(w, m)| w * m).sum();
    assert!((expected - 0.15).abs() < 1e-12);
    let raw = sharpe(&weights, &mean, &cov);
    assert!((raw - 0.15 / 0.0375_f64.sqrt()).abs() < 1e-12);

    // This covariance puts the even split exactly at the tangency
    // portfolio, so the graph gradient vanishes and an ascent step is a
    // no-op up to renormalization noise.
    let grad = graph_gradient(&weights, &mean, &cov);
    assert!(grad[0].abs() < 1e-12 && grad[1].abs() < 1e-12);

    // With the diagonal swapped, asset 2 is higher-mean and lower-variance;
    // one ascent step must move weight from asset 1 to asset 2.
    let dominant_cov = ndarray::array![[0.09, 0.01], [0.01, 0.04]];
    let mut stepped = weights.clone();
    let optimizer = SharpeOptimizer {
        iterations: 1,
        ..Default::default()
    };
    optimizer.optimize(&mut stepped, &mean, &dominant_cov).unwrap();
    assert!(stepped[1] > 0.5);
    assert!(stepped[0] < 0.5);
}

#[test]
fn test_optimizer_improves_random_portfolios() {
    let mut rng = StdRng::seed_from_u64(23);

    for _ in 0..5 {
        let (mut weights, mean, cov) = random_problem(&mut rng, 3);
        let before = sharpe(&weights, &mean, &cov);

        let optimizer = SharpeOptimizer {
            iterations: 300,
            ..Default::default()
        };
        optimizer.optimize(&mut weights, &mean, &cov).unwrap();
        let after = sharpe(&weights, &mean, &cov);

        assert!(after >= before - 1e-9);
    }
}
