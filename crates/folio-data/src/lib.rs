// Market data retrieval (Polygon.io daily aggregates) and return statistics

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Daily close prices and the percentage returns derived from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub ticker: String,
    pub closes: Vec<f64>,
    pub returns: Vec<f64>,
}

impl ReturnSeries {
    pub fn from_closes(ticker: impl Into<String>, closes: Vec<f64>) -> Self {
        let returns = simple_returns(&closes);
        Self {
            ticker: ticker.into(),
            closes,
            returns,
        }
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    pub fn mean_return(&self) -> f64 {
        mean(&self.returns)
    }

    pub fn std_return(&self) -> f64 {
        stddev(&self.returns, self.mean_return())
    }
}

/// Percentage returns between consecutive closes. The first close only
/// seeds the previous-close state; a zero previous close yields no entry.
pub fn simple_returns(closes: &[f64]) -> Vec<f64> {
    let mut returns = Vec::with_capacity(closes.len().saturating_sub(1));
    let mut prev = 0.0;
    for &close in closes {
        if prev == 0.0 {
            prev = close;
            continue;
        }
        returns.push((close - prev) / prev);
        prev = close;
    }
    returns
}

// ----------------------------------------------------------------------------
// Polygon.io aggregates client
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AggsResponse {
    status: Option<String>,
    error: Option<String>,
    results: Option<Vec<AggBar>>,
}

#[derive(Debug, Deserialize)]
struct AggBar {
    /// Close price of the bar.
    c: f64,
}

#[derive(Debug, Clone)]
pub struct PolygonClient {
    base_url: String,
    api_key: String,
}

impl PolygonClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Build a client from the `POLYGON_API_KEY` environment variable.
    pub fn from_env(base_url: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("POLYGON_API_KEY")
            .context("POLYGON_API_KEY environment variable is not set")?;
        Ok(Self::new(base_url, api_key))
    }

    fn aggs_url(&self, ticker: &str, start_date: &str, end_date: &str) -> String {
        format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}?adjusted=true&sort=asc&apiKey={}",
            self.base_url, ticker, start_date, end_date, self.api_key
        )
    }

    /// Fetch daily close prices for `ticker` from `start_date` (YYYY-MM-DD)
    /// through today.
    pub fn fetch_daily_closes(&self, ticker: &str, start_date: &str) -> Result<Vec<f64>> {
        let end_date = Utc::now().format("%Y-%m-%d").to_string();
        let url = self.aggs_url(ticker, start_date, &end_date);

        let body = reqwest::blocking::get(&url)
            .with_context(|| format!("aggregates request failed for {}", ticker))?
            .text()
            .context("failed to read aggregates response body")?;

        let closes = parse_aggs(&body)
            .with_context(|| format!("bad aggregates response for {}", ticker))?;
        info!("Fetched {} daily closes for {}", closes.len(), ticker);
        Ok(closes)
    }

    /// Fetch closes and derive the return series in one step.
    pub fn fetch_return_series(&self, ticker: &str, start_date: &str) -> Result<ReturnSeries> {
        let closes = self.fetch_daily_closes(ticker, start_date)?;
        Ok(ReturnSeries::from_closes(ticker, closes))
    }
}

/// Parse a Polygon aggregates payload into close prices.
fn parse_aggs(json: &str) -> Result<Vec<f64>> {
    let response: AggsResponse = serde_json::from_str(json)?;

    if let Some(error) = response.error {
        bail!("API error: {}", error);
    }
    if let Some(status) = &response.status {
        if status != "OK" && status != "DELAYED" {
            bail!("unexpected API status: {}", status);
        }
    }

    let bars = match response.results {
        Some(bars) if !bars.is_empty() => bars,
        _ => bail!("no aggregate bars returned"),
    };

    Ok(bars.into_iter().map(|bar| bar.c).collect())
}

// ----------------------------------------------------------------------------
// Offline persistence
// ----------------------------------------------------------------------------

/// Save return series as JSON, one file for the whole universe.
pub fn save_return_series(path: impl AsRef<Path>, series: &[ReturnSeries]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(series)?;
    std::fs::write(path, json)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

pub fn load_return_series(path: impl AsRef<Path>) -> Result<Vec<ReturnSeries>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let series: Vec<ReturnSeries> = serde_json::from_str(&raw)
        .with_context(|| format!("cannot parse {}", path.display()))?;
    Ok(series)
}

// ----------------------------------------------------------------------------
// Return statistics
// ----------------------------------------------------------------------------

/// Common observation count across the universe: series of unequal length
/// are aligned to the tail of the shortest one.
pub fn common_len(series: &[ReturnSeries]) -> usize {
    series.iter().map(|s| s.len()).min().unwrap_or(0)
}

/// Per-asset mean historical return over the aligned tail.
pub fn mean_returns(series: &[ReturnSeries]) -> Vec<f64> {
    let n = common_len(series);
    series
        .iter()
        .map(|s| mean(&s.returns[s.len() - n..]))
        .collect()
}

/// Sample covariance matrix of the aligned return tails. Symmetric by
/// construction.
pub fn covariance_matrix(series: &[ReturnSeries]) -> Result<Array2<f64>> {
    let assets = series.len();
    let n = common_len(series);
    if n < 2 {
        bail!("need at least 2 overlapping observations, got {}", n);
    }

    let tails: Vec<&[f64]> = series.iter().map(|s| &s.returns[s.len() - n..]).collect();
    let means: Vec<f64> = tails.iter().map(|t| mean(t)).collect();

    let mut cov = Array2::zeros((assets, assets));
    for i in 0..assets {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..n {
                sum += (tails[i][k] - means[i]) * (tails[j][k] - means[j]);
            }
            let c = sum / (n as f64 - 1.0);
            cov[[i, j]] = c;
            cov[[j, i]] = c;
        }
    }
    Ok(cov)
}

/// Aligned returns as an assets x observations matrix (row per asset), the
/// layout the Omega objective consumes.
pub fn returns_matrix(series: &[ReturnSeries]) -> Result<Array2<f64>> {
    let assets = series.len();
    let n = common_len(series);
    if assets == 0 || n == 0 {
        bail!("empty return universe");
    }
    let mut matrix = Array2::zeros((assets, n));
    for (i, s) in series.iter().enumerate() {
        let tail = &s.returns[s.len() - n..];
        for (j, &r) in tail.iter().enumerate() {
            matrix[[i, j]] = r;
        }
    }
    Ok(matrix)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mut sum = 0.0;
    for v in values {
        let d = *v - mean;
        sum += d * d;
    }
    (sum / (values.len() as f64 - 1.0)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_returns() {
        let returns = simple_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(returns.len(), 2);
        assert!((returns[0] - 0.10).abs() < 1e-12);
        assert!((returns[1] - (99.0 - 110.0) / 110.0).abs() < 1e-12);
    }

    #[test]
    fn test_simple_returns_skips_zero_seed() {
        // A leading zero close only advances the previous-close state.
        let returns = simple_returns(&[0.0, 100.0, 110.0]);
        assert_eq!(returns.len(), 1);
        assert!((returns[0] - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_parse_aggs_valid() {
        let json = r#"{"status":"OK","results":[{"c":100.0,"v":1.0},{"c":101.5,"v":2.0},{"c":99.25,"v":3.0}]}"#;
        let closes = parse_aggs(json).unwrap();
        assert_eq!(closes, vec![100.0, 101.5, 99.25]);
    }

    #[test]
    fn test_parse_aggs_error_payload() {
        let json = r#"{"status":"ERROR","error":"Unknown API Key"}"#;
        assert!(parse_aggs(json).is_err());
    }

    #[test]
    fn test_parse_aggs_empty_results() {
        let json = r#"{"status":"OK","results":[]}"#;
        assert!(parse_aggs(json).is_err());
    }

    #[test]
    fn test_aggs_url() {
        let client = PolygonClient::new("https://api.polygon.io", "k3y");
        let url = client.aggs_url("X:BTCUSD", "2023-04-10", "2023-05-10");
        assert!(url.contains("/v2/aggs/ticker/X:BTCUSD/range/1/day/2023-04-10/2023-05-10"));
        assert!(url.contains("adjusted=true"));
        assert!(url.contains("apiKey=k3y"));
    }

    #[test]
    fn test_covariance_matrix_known_values() {
        let a = ReturnSeries {
            ticker: "A".to_string(),
            closes: vec![],
            returns: vec![0.01, -0.005, 0.008, -0.002, 0.012],
        };
        let b = ReturnSeries {
            ticker: "B".to_string(),
            closes: vec![],
            returns: vec![-0.003, 0.007, -0.001, 0.004, -0.002],
        };
        let cov = covariance_matrix(&[a.clone(), b.clone()]).unwrap();

        // Diagonal entries are the sample variances.
        let var_a = a.std_return() * a.std_return();
        assert!((cov[[0, 0]] - var_a).abs() < 1e-12);
        // Symmetry.
        assert_eq!(cov[[0, 1]], cov[[1, 0]]);
        // A and B move against each other in this sample.
        assert!(cov[[0, 1]] < 0.0);
    }

    #[test]
    fn test_alignment_uses_common_tail() {
        let long = ReturnSeries {
            ticker: "L".to_string(),
            closes: vec![],
            returns: vec![9.0, 9.0, 0.01, 0.02, 0.03],
        };
        let short = ReturnSeries {
            ticker: "S".to_string(),
            closes: vec![],
            returns: vec![0.02, 0.01, 0.03],
        };
        let means = mean_returns(&[long, short]);
        assert!((means[0] - 0.02).abs() < 1e-12);
        assert!((means[1] - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_returns_matrix_layout() {
        let a = ReturnSeries {
            ticker: "A".to_string(),
            closes: vec![],
            returns: vec![0.1, 0.2],
        };
        let b = ReturnSeries {
            ticker: "B".to_string(),
            closes: vec![],
            returns: vec![0.3, 0.4],
        };
        let m = returns_matrix(&[a, b]).unwrap();
        assert_eq!(m.shape(), &[2, 2]);
        assert_eq!(m[[0, 1]], 0.2);
        assert_eq!(m[[1, 0]], 0.3);
    }

    #[test]
    fn test_series_roundtrip() {
        let dir = std::env::temp_dir().join("folio_data_test");
        let path = dir.join("returns.json");
        let series = vec![ReturnSeries::from_closes("X:BTCUSD", vec![100.0, 110.0, 121.0])];
        save_return_series(&path, &series).unwrap();
        let back = load_return_series(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].ticker, "X:BTCUSD");
        assert_eq!(back[0].returns.len(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
