// Sharpe-ratio maximization by fixed-iteration gradient ascent
//
// Each iteration builds a fresh expression graph over the current weights:
//
//   excess return = dot(w, mean) - rf
//   variance      = w' * Cov * w
//   sharpe        = variance^(-1/2) * excess return
//
// evaluates it, back-propagates, applies an additive update and renormalizes
// the weights to sum 1. Iteration count is the only termination condition.

use folio_core::domain::errors::{FolioError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{Graph, NodeId};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct SharpeOptimizer {
    pub learning_rate: f64,
    pub iterations: usize,
    pub risk_free_rate: f64,
    /// Trading periods per year; the reported ratio is raw * sqrt(this).
    pub trading_days: f64,
    /// Allowed drift of sum(weights) from 1.0 at the top of an iteration.
    pub weight_tolerance: f64,
}

impl Default for SharpeOptimizer {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            iterations: 1000,
            risk_free_rate: 0.0,
            trading_days: 365.0,
            weight_tolerance: 1e-6,
        }
    }
}

/// Final state of one optimization run, for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub weights: Vec<f64>,
    pub raw_sharpe: f64,
    pub annualized_sharpe: f64,
    pub iterations: usize,
}

impl SharpeOptimizer {
    /// Optimize `weights` in place against the given return statistics and
    /// return the annualized Sharpe ratio achieved. `weights` must sum to 1
    /// on entry and sums to 1 again on exit.
    pub fn optimize(
        &self,
        weights: &mut Vec<f64>,
        mean: &[f64],
        covariance: &Array2<f64>,
    ) -> Result<f64> {
        for iteration in 0..self.iterations {
            self.check_weights(weights)?;

            let (mut graph, root, w) = self.build(weights, mean, covariance);
            let raw = graph.evaluate(root)?.as_scalar()?;

            // The scalar root is seeded with a ones vector sized to the
            // weight count; every backward step scales seeds elementwise,
            // so the uniform vector reproduces a unit scalar seed.
            let seed = Value::Vector(vec![1.0; weights.len()]);
            graph.derive(root, &seed)?;
            let gradient = graph.partial(w)?.as_slice()?;

            for (weight, g) in weights.iter_mut().zip(gradient) {
                *weight += self.learning_rate * g;
            }
            let total: f64 = weights.iter().sum();
            for weight in weights.iter_mut() {
                *weight /= total;
            }

            if iteration % 100 == 0 {
                debug!(iteration, raw_sharpe = raw, "gradient ascent step");
            }
        }

        // Forward-only pass over the final weights; with zero iterations
        // this is exactly the initial-weight Sharpe and nothing was updated.
        self.check_weights(weights)?;
        let (mut graph, root, _) = self.build(weights, mean, covariance);
        let raw = graph.evaluate(root)?.as_scalar()?;
        Ok(raw * self.trading_days.sqrt())
    }

    /// Convenience wrapper that also captures the final state for reporting.
    pub fn run(
        &self,
        mut weights: Vec<f64>,
        mean: &[f64],
        covariance: &Array2<f64>,
    ) -> Result<OptimizationOutcome> {
        let annualized = self.optimize(&mut weights, mean, covariance)?;
        Ok(OptimizationOutcome {
            raw_sharpe: annualized / self.trading_days.sqrt(),
            annualized_sharpe: annualized,
            iterations: self.iterations,
            weights,
        })
    }

    fn check_weights(&self, weights: &[f64]) -> Result<()> {
        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() >= self.weight_tolerance {
            return Err(FolioError::PreconditionViolated(format!(
                "portfolio weights sum to {}, expected 1.0",
                total
            )));
        }
        Ok(())
    }

    /// Assemble the Sharpe graph for the current weights. The graph owns
    /// everything for exactly one evaluate + derive cycle.
    fn build(
        &self,
        weights: &[f64],
        mean: &[f64],
        covariance: &Array2<f64>,
    ) -> (Graph, NodeId, NodeId) {
        let mut graph = Graph::new();
        let w = graph.variable(Value::Vector(weights.to_vec()));
        let expected = graph.linear_product(w, mean.to_vec());
        let excess = graph.subtract_constant(expected, self.risk_free_rate);
        let variance = graph.quadratic_form(w, covariance.clone());
        let inv_vol = graph.power(variance, -0.5);
        let root = graph.product(inv_vol, excess);
        (graph, root, w)
    }
}
