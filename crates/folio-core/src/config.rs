// Core configuration structures for the folio portfolio optimizer

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::errors::{FolioError, Result};

/// Market-data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Polygon.io crypto tickers, e.g. "X:BTCUSD".
    pub tickers: Vec<String>,
    /// First day of the daily-aggregate request, YYYY-MM-DD.
    pub start_date: String,
    pub api_base: String,
    /// Directory for persisted return series (offline runs).
    pub data_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            tickers: vec!["X:BTCUSD".to_string(), "X:ETHUSD".to_string()],
            start_date: "2023-04-10".to_string(),
            api_base: "https://api.polygon.io".to_string(),
            data_dir: "data".to_string(),
        }
    }
}

/// Sharpe gradient-ascent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
    pub iterations: usize,
    pub risk_free_rate: f64,
    /// Trading periods per year used to annualize the Sharpe ratio.
    /// Crypto trades every day of the year.
    pub trading_days: f64,
    /// Allowed drift of sum(weights) from 1.0 before an iteration.
    pub weight_tolerance: f64,
}

impl Default for OptimizerConfig {
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

/// Bayesian (GP/Omega) optimizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BayesConfig {
    /// Total objective-evaluation budget.
    pub n_calls: usize,
    /// Random candidate weight vectors scored per acquisition step.
    pub candidates_per_call: usize,
    pub length_scale: f64,
    pub noise: f64,
    /// UCB exploration coefficient.
    pub beta: f64,
    /// Gain/loss threshold of the Omega ratio.
    pub omega_threshold: f64,
}

impl Default for BayesConfig {
    fn default() -> Self {
        Self {
            n_calls: 50,
            candidates_per_call: 32,
            length_scale: 1.0,
            noise: 1e-6,
            beta: 2.0,
            omega_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataConfig,
    pub optimizer: OptimizerConfig,
    pub bayes: BayesConfig,
}

impl Settings {
    /// Load settings from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FolioError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            FolioError::Configuration(format!("cannot parse {}: {}", path.display(), e))
        })
    }
}
