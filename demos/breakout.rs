//! # Daily volatility breakout
//!
//! Replays the breakout strategy over deterministic synthetic daily candles,
//! prints the metrics and the current target view, and draws the chart.
//!
//! ```sh
//! RUST_LOG=vbo_rs=debug cargo run --example breakout
//! ```

use chrono::{DateTime, Duration};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use vbo_rs::prelude::*;

/// Generates deterministic daily candles.
fn generate_sample_candles(days: i64, seed: i64, base_price: f64) -> Result<Vec<Candle>> {
    let start = DateTime::from_timestamp_millis(1_609_459_200_000).ok_or(Error::InvalidTimestamp(1_609_459_200_000))?;
    let mut open = base_price;

    (0..days)
        .map(|i| {
            let x = i as f64;
            // trend with a slow and a fast oscillation
            let drift = 0.002 * base_price * ((x * 0.05 + seed as f64).sin() + 0.2);
            let swing = 0.03 * base_price * (x * 0.7 + seed as f64).sin();
            let close = (open + drift + swing).max(base_price * 0.1);
            let spread = 0.01 * base_price * (1.0 + (x * 1.3).cos().abs() * 2.0);
            let high = open.max(close) + spread;
            let low = (open.min(close) - spread).max(base_price * 0.05);
            let volume = 1000.0 + 500.0 * (x * 0.2).sin().abs();

            let candle = CandleBuilder::builder()
                .symbol("BTCUSDT")
                .open(open)
                .high(high)
                .low(low)
                .close(close)
                .volume(volume)
                .open_time(start + Duration::days(i))
                .build();
            open = close;
            candle
        })
        .collect()
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    setup_logging();

    let candles = generate_sample_candles(730, 42, 30_000.0)?;
    let mut store = MemoryStore::new();
    store.save_candles(&candles)?;

    let config = Config::default().with_k(0.5).with_leverage(2.0).with_stop_loss(None).with_trailing_stop(Some(0.03));
    let mut backtest = Backtest::new(store.candles(&config.pair)?, config)?;

    match backtest.run() {
        Ok(report) => println!("{} trades over {} days", report.trade_count, report.balance_history.len() - 1),
        Err(Error::Liquidated(liquidation)) => println!("{liquidation}"),
        Err(e) => return Err(e.into()),
    }
    store.save_balance_history(&backtest.config().pair, backtest.balance_history())?;

    println!("{}", Metrics::from(&backtest));
    if let Some(view) = backtest.target_view() {
        println!("{view:?}");
    }

    #[cfg(feature = "draws")]
    {
        let options = DrawOptions::default()
            .title("BTCUSDT breakout")
            .show_volume(true)
            .draw_output(DrawOutput::Svg("breakout.svg".into()));
        Draw::from(&backtest).with_options(options).plot()?;
    }

    Ok(())
}
