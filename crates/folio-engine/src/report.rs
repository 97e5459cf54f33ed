// Console report formatting for optimization results

use crate::sharpe::OptimizationOutcome;

/// Render the Sharpe optimization summary. Reads final weights and
/// objective values only; nothing in the engine prints on its own.
pub fn format_sharpe_outcome(tickers: &[String], outcome: &OptimizationOutcome) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Sharpe gradient ascent ({} iterations)\n",
        outcome.iterations
    ));
    out.push_str(&format_weights(tickers, &outcome.weights));
    out.push_str(&format!(
        "Raw Sharpe ratio:        {:.4}\nAnnualized Sharpe ratio: {:.4}\n",
        outcome.raw_sharpe, outcome.annualized_sharpe
    ));
    out
}

/// Render the Omega/GP optimization summary.
pub fn format_omega_outcome(tickers: &[String], weights: &[f64], omega: f64) -> String {
    let mut out = String::new();
    out.push_str("Bayesian Omega optimization\n");
    out.push_str(&format_weights(tickers, weights));
    out.push_str(&format!("Omega ratio: {:.4}\n", omega));
    out
}

fn format_weights(tickers: &[String], weights: &[f64]) -> String {
    let mut out = String::new();
    for (i, weight) in weights.iter().enumerate() {
        let ticker = tickers.get(i).map(String::as_str).unwrap_or("?");
        out.push_str(&format!("  {:<12} {:>8.4}\n", ticker, weight));
    }
    out
}
