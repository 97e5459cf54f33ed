use anyhow::Result;

use folio_core::config::Settings;
use folio_core::logging::setup_minimal_logging;
use folio_data::{PolygonClient, ReturnSeries};
use folio_engine::bayes::{BayesOptimizer, Objective, OmegaRatio};
use folio_engine::{report, SharpeOptimizer};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose");
    let _ = setup_minimal_logging(verbose);

    if args.len() < 2 {
        print_help();
        return Ok(());
    }
    match args[1].as_str() {
        "fetch" => cmd_fetch(&args[2..]),
        "optimize" => cmd_optimize(&args[2..]),
        "bayes" => cmd_bayes(&args[2..]),
        _ => {
            print_help();
            Ok(())
        }
    }
}

fn cmd_fetch(args: &[String]) -> Result<()> {
    let settings = load_settings(args)?;
    let start = parse_flag(args, "--start").unwrap_or_else(|| settings.data.start_date.clone());
    let tickers = parse_tickers(args, &settings);
    let out = parse_flag(args, "--out")
        .unwrap_or_else(|| format!("{}/returns.json", settings.data.data_dir));

    let client = PolygonClient::from_env(settings.data.api_base.as_str())?;
    let mut series = Vec::with_capacity(tickers.len());
    for ticker in &tickers {
        let s = client.fetch_return_series(ticker, &start)?;
        println!(
            "{}: {} returns, mean={:.6}, std={:.6}",
            s.ticker,
            s.len(),
            s.mean_return(),
            s.std_return()
        );
        series.push(s);
    }

    folio_data::save_return_series(&out, &series)?;
    println!("Saved return series to {}", out);
    Ok(())
}

fn cmd_optimize(args: &[String]) -> Result<()> {
    let settings = load_settings(args)?;
    let series = load_series(args, &settings)?;
    let tickers: Vec<String> = series.iter().map(|s| s.ticker.clone()).collect();

    let mean = folio_data::mean_returns(&series);
    let covariance = folio_data::covariance_matrix(&series)?;

    let mut optimizer = SharpeOptimizer {
        learning_rate: settings.optimizer.learning_rate,
        iterations: settings.optimizer.iterations,
        risk_free_rate: settings.optimizer.risk_free_rate,
        trading_days: settings.optimizer.trading_days,
        weight_tolerance: settings.optimizer.weight_tolerance,
    };
    if let Some(iterations) = parse_flag(args, "--iterations") {
        optimizer.iterations = iterations.parse()?;
    }
    if let Some(lr) = parse_flag(args, "--lr") {
        optimizer.learning_rate = lr.parse()?;
    }

    let n = series.len();
    let weights = vec![1.0 / n as f64; n];
    let outcome = optimizer.run(weights, &mean, &covariance)?;

    print!("{}", report::format_sharpe_outcome(&tickers, &outcome));
    Ok(())
}

fn cmd_bayes(args: &[String]) -> Result<()> {
    let settings = load_settings(args)?;
    let series = load_series(args, &settings)?;
    let tickers: Vec<String> = series.iter().map(|s| s.ticker.clone()).collect();

    let returns = folio_data::returns_matrix(&series)?;
    let n_calls = match parse_flag(args, "--calls") {
        Some(calls) => calls.parse()?,
        None => settings.bayes.n_calls,
    };

    let objective = OmegaRatio::new(settings.bayes.omega_threshold);
    let mut optimizer = BayesOptimizer::new(Box::new(objective.clone()));
    optimizer.length_scale = settings.bayes.length_scale;
    optimizer.noise = settings.bayes.noise;
    optimizer.beta = settings.bayes.beta;
    optimizer.candidates_per_call = settings.bayes.candidates_per_call;

    let weights = optimizer.optimize(&returns, n_calls)?;
    let omega = -objective.score(&weights, &returns);

    print!("{}", report::format_omega_outcome(&tickers, &weights, omega));
    Ok(())
}

fn load_settings(args: &[String]) -> Result<Settings> {
    match parse_flag(args, "--config") {
        Some(path) => Ok(Settings::load(path)?),
        None => Ok(Settings::default()),
    }
}

/// Load persisted return series, or fetch live when none are on disk.
fn load_series(args: &[String], settings: &Settings) -> Result<Vec<ReturnSeries>> {
    if let Some(path) = parse_flag(args, "--returns-file") {
        return folio_data::load_return_series(path);
    }

    let default_path = format!("{}/returns.json", settings.data.data_dir);
    if std::path::Path::new(&default_path).exists() {
        return folio_data::load_return_series(default_path);
    }

    let client = PolygonClient::from_env(settings.data.api_base.as_str())?;
    let tickers = parse_tickers(args, settings);
    tickers
        .iter()
        .map(|t| client.fetch_return_series(t, &settings.data.start_date))
        .collect()
}

fn parse_tickers(args: &[String], settings: &Settings) -> Vec<String> {
    match parse_flag(args, "--tickers") {
        Some(list) => list
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.trim().to_string())
            .collect(),
        None => settings.data.tickers.clone(),
    }
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == flag {
            return iter.next().map(|v| v.to_string());
        }
    }
    None
}

fn print_help() {
    println!("folio - crypto portfolio optimizer");
    println!();
    println!("Usage: folio <command> [options]");
    println!();
    println!("Commands:");
    println!("  fetch      Fetch daily return series from Polygon.io");
    println!("             [--tickers X:BTCUSD,X:ETHUSD] [--start YYYY-MM-DD] [--out FILE]");
    println!("  optimize   Maximize the Sharpe ratio by gradient ascent");
    println!("             [--returns-file FILE] [--iterations N] [--lr RATE]");
    println!("  bayes      Maximize the Omega ratio by GP optimization");
    println!("             [--returns-file FILE] [--calls N]");
    println!();
    println!("Global options: --config FILE, --verbose");
}
