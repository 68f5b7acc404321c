use chrono::{DateTime, Duration, Utc};
use vbo_rs::prelude::*;

fn day(n: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_609_459_200_000).unwrap() + Duration::days(n)
}

fn candle(n: i64, (open, high, low, close): (f64, f64, f64, f64)) -> Candle {
    CandleBuilder::builder()
        .symbol("BTCUSDT")
        .open(open)
        .high(high)
        .low(low)
        .close(close)
        .volume(1.0)
        .open_time(day(n))
        .build()
        .unwrap()
}

fn candles(ohlc: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
    ohlc.iter().enumerate().map(|(n, c)| candle(n as i64, *c)).collect()
}

fn plain_config() -> Config {
    Config::default()
        .with_k(0.5)
        .with_leverage(1.0)
        .with_stop_loss(None)
        .with_trailing_stop(None)
        .with_always_long(true)
        .with_shorting(false)
        .with_costs(0.0, 0.0)
}

#[test]
fn always_long_target_uses_the_full_range() {
    for close in [110.0, 95.0] {
        let data = candles(&[(100.0, 120.0, 90.0, close), (105.0, 110.0, 101.0, 108.0)]);
        let mut backtest = Backtest::new(data, plain_config()).unwrap();
        backtest.run().unwrap();

        // 105 + (120 - 90) * 0.5
        assert_eq!(backtest.pending_target(), Some(120.0));
        assert_eq!(backtest.bias(), PositionSide::Long);
        assert_eq!(backtest.trade_count(), 0);
    }
}

#[test]
fn liquidation_boundary_through_candles() {
    let setup = |leverage: f64, low: f64| {
        let config = plain_config().with_k(0.0).with_leverage(leverage);
        let data = candles(&[(100.0, 101.0, 99.0, 100.0), (100.0, 100.5, low, 95.0)]);
        let mut backtest = Backtest::new(data, config).unwrap();
        let result = backtest.run();
        (backtest, result)
    };

    // -9% at 10x
    let (backtest, result) = setup(10.0, 91.0);
    assert!(result.is_ok());
    assert!(!backtest.is_liquidated());
    assert_eq!(backtest.trade_count(), 1);

    // -9.1% at 11x
    let (backtest, result) = setup(11.0, 90.9);
    let Err(Error::Liquidated(liquidation)) = result else {
        panic!("expected a liquidation");
    };
    assert_eq!(liquidation.side, PositionSide::Long);
    assert_eq!(liquidation.entry_price, 100.0);
    assert_eq!(liquidation.exit_price, 90.9);
    assert_eq!(liquidation.timestamp, day(1));

    // the partial history is still available
    assert_eq!(backtest.balance_history(), &[10_000.0, 10_000.0]);
    let metrics = Metrics::from(&backtest);
    assert!(metrics.is_liquidated());
    assert_eq!(metrics.max_drawdown(), Ok(0.0));
}

#[test]
fn invalid_config_prevents_any_step() {
    let data = candles(&[(100.0, 120.0, 90.0, 110.0)]);
    let rejected = [
        plain_config().with_k(-1.0),
        plain_config().with_stop_loss(Some(0.02)).with_trailing_stop(Some(0.01)),
        plain_config().with_always_long(true).with_shorting(true),
        plain_config().with_pair(""),
    ];

    for config in rejected {
        let Err(Error::Config(errors)) = Backtest::new(data.clone(), config) else {
            panic!("configuration should be rejected");
        };
        assert_eq!(errors.iter().count(), 1);
    }
}

#[test]
fn first_violation_is_reported_with_all_others() {
    let config = plain_config().with_k(-1.0).with_leverage(-1.0);
    let Err(Error::Config(errors)) = config.validate() else {
        panic!("configuration should be rejected");
    };
    assert_eq!(errors.first(), Some(&ConfigError::NegativeK(-1.0)));
    assert!(errors.contains(&ConfigError::NegativeLeverage(-1.0)));
}

#[test]
fn two_engines_agree() {
    let data = candles(&[
        (100.0, 110.0, 95.0, 108.0),
        (108.0, 121.0, 104.0, 119.0),
        (119.0, 122.0, 101.0, 103.0),
        (103.0, 115.0, 99.0, 112.0),
        (112.0, 130.0, 111.0, 128.0),
    ]);
    let config = plain_config().with_leverage(3.0).with_trailing_stop(Some(0.04)).with_costs(0.0007, 0.0004);

    let mut first = Backtest::new(data.clone(), config.clone()).unwrap();
    let mut second = Backtest::new(data, config).unwrap();
    assert_eq!(first.run(), second.run());
    assert_eq!(first.trades().collect::<Vec<_>>(), second.trades().collect::<Vec<_>>());
}

#[test]
fn merged_sources_replay_once() {
    let a = candles(&[(100.0, 110.0, 95.0, 108.0), (108.0, 121.0, 104.0, 119.0)]);
    let b = vec![candle(1, (108.0, 121.0, 104.0, 119.0)), candle(2, (119.0, 122.0, 101.0, 103.0))];

    let merged = merge_candles([b, a]);
    assert_eq!(merged.len(), 3);

    let mut backtest = Backtest::new(merged, plain_config()).unwrap();
    let report = backtest.run().unwrap();
    assert_eq!(report.balance_history.len(), 3);
}

#[test]
fn missing_days_are_skipped() {
    let data = vec![
        candle(0, (100.0, 110.0, 95.0, 108.0)),
        candle(5, (108.0, 121.0, 104.0, 119.0)),
        candle(6, (119.0, 122.0, 101.0, 103.0)),
    ];
    let mut backtest = Backtest::new(data, plain_config()).unwrap();
    let report = backtest.run().unwrap();

    assert_eq!(report.balance_history.len(), 3);
    assert_eq!(backtest.rollovers().copied().collect::<Vec<_>>(), vec![day(5), day(6)]);
}

#[test]
fn short_trades_are_logged() {
    let config = plain_config().with_always_long(false).with_shorting(true);
    let data = candles(&[
        // closes on the low: short bias
        (100.0, 110.0, 90.0, 92.0),
        // target 90, opened by the low
        (100.0, 101.0, 85.0, 88.0),
        // rollover at 86
        (86.0, 90.0, 84.0, 88.0),
    ]);
    let mut backtest = Backtest::new(data, config).unwrap();
    let report = backtest.run().unwrap();

    assert_eq!(report.trade_count, 1);
    let trade = backtest.trades().next().copied().unwrap();
    assert_eq!(trade.side, PositionSide::Short);
    assert_eq!(trade.entry_price, 90.0);
    assert_eq!(trade.exit_price, 86.0);
    assert_eq!(trade.reason, ExitReason::Rollover);
    assert!(backtest.balance() > 10_000.0);

    let metrics = Metrics::from(&backtest);
    assert_eq!(metrics.win_rate(), Ok(1.0));
    assert!(metrics.total_return().unwrap() > 0.0);
}

#[test]
fn store_round_trip() {
    let data = candles(&[(100.0, 110.0, 95.0, 108.0), (108.0, 121.0, 104.0, 119.0)]);
    let mut store = MemoryStore::new();
    store.save_candles(&data).unwrap();

    let mut backtest = Backtest::new(store.candles("BTCUSDT").unwrap(), plain_config()).unwrap();
    let report = backtest.run().unwrap();
    store.save_balance_history("BTCUSDT", &report.balance_history).unwrap();

    assert_eq!(store.balance_history("BTCUSDT").unwrap(), report.balance_history);
}

#[cfg(feature = "serde")]
#[test]
fn config_from_json() {
    let config = Config::from_json_str(r#"{ "k": 0.5, "stop_loss": null, "trailing_stop": 0.03 }"#).unwrap();
    assert_eq!(config.trailing_stop, Some(0.03));
    assert_eq!(config.initial_capital, 10_000.0);

    let result = Config::from_json_str(r#"{ "k": -0.5 }"#);
    assert!(matches!(result, Err(Error::Config(_))));
}
