use std::sync::Arc;

use crate::{
    engine::*,
    errors::{Error, Result},
};

/// Backtesting engine: replays candles through a [`Breakout`] state machine.
///
/// Each candle contributes three price events, all stamped with the candle's open time:
/// the open price, then both extremes. When the engine is flat with a short bias, the low is
/// evaluated before the high so a short never benefits from an intraday up-move before its
/// downside is checked. Otherwise the high comes first.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Backtest {
    data: Arc<[Candle]>,
    engine: Breakout,
}

impl std::ops::Deref for Backtest {
    type Target = Breakout;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

impl Backtest {
    /// Creates a new backtest instance.
    ///
    /// ### Arguments
    /// * `data` - Time-ordered candles of the configured pair.
    /// * `config` - Strategy parameters, validated before anything else.
    ///
    /// ### Returns
    /// The new backtest instance or an error.
    ///
    /// ### Example
    /// ```rust
    /// use vbo_rs::prelude::*;
    ///
    /// let candle = CandleBuilder::builder()
    ///     .symbol("ETHUSDT")
    ///     .open(100.0)
    ///     .high(110.0)
    ///     .low(95.0)
    ///     .close(105.0)
    ///     .volume(1.0)
    ///     .timestamp(1_609_459_200_000)
    ///     .build()
    ///     .unwrap();
    ///
    /// let config = Config::default().with_pair("ETHUSDT");
    /// let bts = Backtest::new(vec![candle], config).unwrap();
    /// assert_eq!(bts.balance_history(), &[10_000.0]);
    /// ```
    pub fn new(data: impl Into<Arc<[Candle]>>, config: Config) -> Result<Self> {
        let engine = Breakout::new(config)?;
        let data = data.into();

        if data.is_empty() {
            return Err(Error::CandleDataEmpty);
        }
        ensure_ordered(&data)?;
        let pair = &engine.config().pair;
        if let Some(candle) = data.iter().find(|c| c.symbol() != pair) {
            return Err(Error::SymbolMismatch {
                expected: pair.clone(),
                found: candle.symbol().to_owned(),
            });
        }

        Ok(Self { data, engine })
    }

    /// Returns an iterator over the data.
    pub fn candles(&self) -> std::slice::Iter<'_, Candle> {
        self.data.iter()
    }

    /// Returns the underlying state machine.
    pub fn engine(&self) -> &Breakout {
        &self.engine
    }

    /// Runs the backtest from a fresh state.
    ///
    /// ### Returns
    /// The balance history and trade count, or the liquidation that ended the run.
    pub fn run(&mut self) -> Result<Report> {
        self.run_with(|_, _| Ok(()))
    }

    /// Runs the backtest from a fresh state, calling `observer` after each candle.
    ///
    /// ### Arguments
    /// * `observer` - A closure that takes the engine and the candle just processed.
    ///
    /// ### Example
    /// ```rust
    /// use vbo_rs::prelude::*;
    /// use chrono::{DateTime, Duration};
    ///
    /// let start = DateTime::from_timestamp_millis(1_609_459_200_000).unwrap();
    /// let candles = (0..2)
    ///     .map(|day| {
    ///         CandleBuilder::builder()
    ///             .symbol("BTCUSDT")
    ///             .open(100.0)
    ///             .high(110.0)
    ///             .low(95.0)
    ///             .close(105.0)
    ///             .open_time(start + Duration::days(day))
    ///             .build()
    ///             .unwrap()
    ///     })
    ///     .collect::<Vec<_>>();
    ///
    /// let mut bts = Backtest::new(candles, Config::default()).unwrap();
    /// let mut views = Vec::new();
    /// bts.run_with(|engine, _candle| {
    ///     views.extend(engine.target_view());
    ///     Ok(())
    /// })
    /// .unwrap();
    /// assert_eq!(views.len(), 2);
    /// ```
    pub fn run_with<O>(&mut self, mut observer: O) -> Result<Report>
    where
        O: FnMut(&Breakout, &Candle) -> Result<()>,
    {
        self.engine.reset();

        let candles = Arc::clone(&self.data);
        for candle in candles.iter() {
            let timestamp = candle.open_time();
            self.engine.process(candle.open(), timestamp)?;
            for price in extremes(&self.engine, candle) {
                self.engine.process(price, timestamp)?;
            }
            observer(&self.engine, candle)?;
        }

        let report = self.engine.finalize()?;
        tracing::info!(
            pair = %self.engine.config().pair,
            candles = candles.len(),
            balance = self.engine.balance(),
            trades = report.trade_count,
            "backtest completed"
        );
        Ok(report)
    }

    /// Resets the backtest to its initial state.
    pub fn reset(&mut self) {
        self.engine.reset();
    }
}

/// Returns the candle extremes in evaluation order.
fn extremes(engine: &Breakout, candle: &Candle) -> [f64; 2] {
    if engine.position().is_none() && engine.bias() == PositionSide::Short {
        [candle.low(), candle.high()]
    } else {
        [candle.high(), candle.low()]
    }
}
