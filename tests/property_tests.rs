//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. History shape: first entry is the initial capital, one entry per rollover
//! 2. Drawdown range: within [-1, 0], and 0 exactly for non-decreasing histories
//! 3. Trailing stop monotonicity: a long's stop never loosens on a rising path
//! 4. Determinism: two fresh runs produce bit-identical output
//! 5. Validation: an invalid configuration prevents any simulation step

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use vbo_rs::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn start() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_609_459_200_000).unwrap()
}

fn build_candles(moves: &[(f64, f64, f64)]) -> Vec<Candle> {
    let mut open = 100.0;
    moves
        .iter()
        .enumerate()
        .map(|(day, &(drift, spread, skew))| {
            let close = open * (1.0 + drift);
            let high = open.max(close) * (1.0 + spread * skew);
            let low = open.min(close) * (1.0 - spread * (1.0 - skew));
            let candle = CandleBuilder::builder()
                .symbol("BTCUSDT")
                .open(open)
                .high(high)
                .low(low)
                .close(close)
                .volume(1.0)
                .open_time(start() + Duration::days(day as i64))
                .build()
                .unwrap();
            open = close;
            candle
        })
        .collect()
}

fn arb_candles() -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec((-0.08..0.08_f64, 0.0..0.1_f64, 0.0..=1.0_f64), 1..60)
        .prop_map(|moves| build_candles(&moves))
}

fn arb_stop() -> impl Strategy<Value = (Option<f64>, Option<f64>)> {
    prop_oneof![
        Just((None, None)),
        (0.005..0.2_f64).prop_map(|s| (Some(s), None)),
        (0.005..0.2_f64).prop_map(|t| (None, Some(t))),
    ]
}

fn arb_config() -> impl Strategy<Value = Config> {
    (0.0..1.5_f64, 0.0..5.0_f64, arb_stop(), any::<bool>(), any::<bool>(), 0.0..0.002_f64).prop_map(
        |(k, leverage, (stop_loss, trailing_stop), shorting, always_long, fee)| {
            Config::default()
                .with_k(k)
                .with_leverage(leverage)
                .with_stop_loss(stop_loss)
                .with_trailing_stop(trailing_stop)
                .with_shorting(shorting)
                .with_always_long(always_long && !shorting)
                .with_costs(fee, fee / 2.0)
        },
    )
}

fn arb_history() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec((1.0..1000.0_f64).prop_map(|v| (v * 100.0).round() / 100.0), 1..80)
}

fn run(candles: &[Candle], config: &Config) -> (Backtest, Result<Report>) {
    let mut backtest = Backtest::new(candles.to_vec(), config.clone()).unwrap();
    let result = backtest.run();
    (backtest, result)
}

// ── 1. History shape ─────────────────────────────────────────────────

proptest! {
    /// The history starts at the initial capital and grows by one entry per rollover,
    /// including when the run ends with a liquidation.
    #[test]
    fn history_has_one_entry_per_rollover(candles in arb_candles(), config in arb_config()) {
        let (backtest, result) = run(&candles, &config);
        prop_assert!(matches!(result, Ok(_) | Err(Error::Liquidated(_))));

        let history = backtest.balance_history();
        prop_assert_eq!(history[0], config.initial_capital);
        prop_assert_eq!(history.len(), backtest.rollovers().count() + 1);
        if result.is_ok() {
            prop_assert_eq!(history.len(), candles.len());
        }
    }

    /// A surviving account never has a non-positive balance.
    #[test]
    fn balance_stays_positive(candles in arb_candles(), config in arb_config()) {
        let (backtest, result) = run(&candles, &config);
        if result.is_ok() {
            prop_assert!(backtest.balance_history().iter().all(|b| *b > 0.0));
        }
    }
}

// ── 2. Drawdown range ────────────────────────────────────────────────

proptest! {
    /// Max drawdown lies in [-1, 0].
    #[test]
    fn drawdown_in_range(history in arb_history()) {
        let drawdown = max_drawdown(&history).unwrap();
        prop_assert!((-1.0..=0.0).contains(&drawdown));
    }

    /// Max drawdown is 0 if and only if the history never decreases.
    #[test]
    fn drawdown_zero_iff_non_decreasing(history in arb_history()) {
        let drawdown = max_drawdown(&history).unwrap();
        let non_decreasing = history.windows(2).all(|w| w[1] >= w[0]);
        prop_assert_eq!(drawdown == 0.0, non_decreasing);

        let mut sorted = history.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        prop_assert_eq!(max_drawdown(&sorted).unwrap(), 0.0);
    }
}

// ── 3. Trailing stop monotonicity ────────────────────────────────────

proptest! {
    /// On a rising path while holding long, the trailing stop never decreases.
    #[test]
    fn trailing_stop_never_loosens(steps in prop::collection::vec(0.01..5.0_f64, 1..100)) {
        let config = Config::default()
            .with_k(0.5)
            .with_stop_loss(None)
            .with_trailing_stop(Some(0.05))
            .with_costs(0.0, 0.0);
        let mut engine = Breakout::new(config).unwrap();
        for (i, price) in [100.0, 110.0, 90.0, 105.0].into_iter().enumerate() {
            engine.process(price, start() + Duration::minutes(i as i64)).unwrap();
        }
        // target 110
        let day = start() + Duration::days(1);
        engine.process(100.0, day).unwrap();
        engine.process(111.0, day + Duration::minutes(1)).unwrap();
        prop_assert!(engine.position().is_some());

        let mut price = 111.0;
        let mut stop = engine.stop().unwrap();
        for (i, step) in steps.iter().enumerate() {
            price += step;
            engine.process(price, day + Duration::minutes(i as i64 + 2)).unwrap();
            let current = engine.stop().unwrap();
            prop_assert!(current >= stop);
            prop_assert!(engine.position().is_some());
            stop = current;
        }
    }

    /// On a falling path while holding short, the trailing stop never increases.
    #[test]
    fn short_trailing_stop_never_loosens(steps in prop::collection::vec(0.01..0.5_f64, 1..100)) {
        let config = Config::default()
            .with_k(0.5)
            .with_stop_loss(None)
            .with_trailing_stop(Some(0.05))
            .with_always_long(false)
            .with_shorting(true)
            .with_costs(0.0, 0.0);
        let mut engine = Breakout::new(config).unwrap();
        for (i, price) in [100.0, 110.0, 90.0, 95.0].into_iter().enumerate() {
            engine.process(price, start() + Duration::minutes(i as i64)).unwrap();
        }
        // bearish day: target 90, stop 94.5
        let day = start() + Duration::days(1);
        engine.process(100.0, day).unwrap();
        engine.process(89.0, day + Duration::minutes(1)).unwrap();
        prop_assert_eq!(engine.position().map(|p| p.side()), Some(PositionSide::Short));

        let mut price = 89.0;
        let mut stop = engine.stop().unwrap();
        for (i, step) in steps.iter().enumerate() {
            price -= step;
            engine.process(price, day + Duration::minutes(i as i64 + 2)).unwrap();
            let current = engine.stop().unwrap();
            prop_assert!(current <= stop);
            prop_assert!(current > price);
            prop_assert_eq!(engine.position().map(|p| p.side()), Some(PositionSide::Short));
            stop = current;
        }
    }
}

// ── 4. Determinism ───────────────────────────────────────────────────

proptest! {
    /// Two fresh engines fed the same candles produce bit-identical output.
    #[test]
    fn replay_is_deterministic(candles in arb_candles(), config in arb_config()) {
        let (first, first_result) = run(&candles, &config);
        let (second, second_result) = run(&candles, &config);

        prop_assert_eq!(&first_result, &second_result);
        let bits = |b: &Backtest| b.balance_history().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        prop_assert_eq!(bits(&first), bits(&second));
        prop_assert_eq!(first.trade_count(), second.trade_count());
    }
}

// ── 5. Validation ────────────────────────────────────────────────────

proptest! {
    /// A negative range multiplier is rejected before any candle is replayed.
    #[test]
    fn negative_k_is_rejected(k in -10.0..-0.001_f64, candles in arb_candles()) {
        let config = Config::default().with_k(k);
        prop_assert!(matches!(Backtest::new(candles, config.clone()), Err(Error::Config(_))));
        prop_assert!(matches!(Breakout::new(config), Err(Error::Config(_))));
    }
}
