use chrono::{DateTime, NaiveTime, Utc};

use crate::{
    FractionCalculus,
    engine::*,
    errors::{Error, Liquidation, Result},
};

/// Leveraged position return at or below which the account is wiped out.
pub const LIQUIDATION_THRESHOLD: f64 = -0.9;

/// Trading state of a run. At most one position exists at any time.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum State {
    /// No position. `target` is the pending breakout level, if one is set for the day.
    Flat {
        /// Pending breakout target.
        target: Option<f64>,
    },
    /// A position is open.
    Holding(Position),
    /// The account was wiped out. Terminal.
    Liquidated(Liquidation),
}

/// The in-progress daily candle.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayAggregate {
    /// First price of the day.
    pub open: f64,
    /// Highest price of the day.
    pub high: f64,
    /// Lowest price of the day.
    pub low: f64,
    /// Latest price.
    pub close: f64,
}

impl DayAggregate {
    fn new(price: f64) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
        }
    }

    fn update(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    /// Returns `high - low`.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Per-day tracking: day start, day candle and watermarks.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy)]
struct Session {
    start: DateTime<Utc>,
    candle: DayAggregate,
    high_watermark: f64,
    low_watermark: f64,
}

impl Session {
    fn new(price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            start: timestamp.date_naive().and_time(NaiveTime::MIN).and_utc(),
            candle: DayAggregate::new(price),
            high_watermark: price,
            low_watermark: price,
        }
    }

    fn is_next_day(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp.date_naive() > self.start.date_naive()
    }
}

/// Output of a completed run.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Equity at the start and after each rollover.
    pub balance_history: Vec<f64>,
    /// Number of opened positions.
    pub trade_count: usize,
}

/// Dashboard view of the current targets.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetView {
    /// Latest processed price.
    pub last: f64,
    /// Open price of the current day.
    pub open: f64,
    /// Pending long target.
    pub long_target: Option<f64>,
    /// Pending short target.
    pub short_target: Option<f64>,
    /// A long position can still be opened today.
    pub can_long: bool,
    /// A short position can still be opened today.
    pub can_short: bool,
}

/// The breakout strategy state machine.
///
/// Feed it price events with [`Breakout::process`] in time order. Each event goes through,
/// in this order: day rollover, trailing stop tightening, target check, stop check,
/// liquidation check, and the day candle update.
///
/// ### Example
/// ```rust
/// use vbo_rs::prelude::*;
/// use chrono::{DateTime, Duration};
///
/// let day = DateTime::from_timestamp_millis(1_609_459_200_000).unwrap();
/// let config = Config::default().with_k(0.5).with_stop_loss(None).with_costs(0.0, 0.0);
/// let mut engine = Breakout::new(config).unwrap();
///
/// for price in [100.0, 120.0, 90.0, 110.0] {
///     engine.process(price, day).unwrap();
/// }
/// engine.process(105.0, day + Duration::days(1)).unwrap();
/// assert_eq!(engine.pending_target(), Some(120.0));
///
/// engine.process(121.0, day + Duration::days(1)).unwrap();
/// assert_eq!(engine.trade_count(), 1);
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Breakout {
    config: Config,
    wallet: Wallet,
    state: State,
    bias: PositionSide,
    stop: Option<f64>,
    session: Option<Session>,
    last_price: Option<f64>,
    trade_count: usize,
    trades: Vec<Trade>,
    rollovers: Vec<DateTime<Utc>>,
}

impl std::ops::Deref for Breakout {
    type Target = Wallet;

    fn deref(&self) -> &Self::Target {
        &self.wallet
    }
}

impl Breakout {
    /// Creates a new engine after validating `config`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let wallet = Wallet::new(config.initial_capital)?;

        Ok(Self {
            config,
            wallet,
            state: State::Flat { target: None },
            bias: PositionSide::Long,
            stop: None,
            session: None,
            last_price: None,
            trade_count: 0,
            trades: Vec::new(),
            rollovers: Vec::new(),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the trading state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Returns the bias set at the last rollover.
    pub fn bias(&self) -> PositionSide {
        self.bias
    }

    /// Returns the active stop level.
    pub fn stop(&self) -> Option<f64> {
        self.stop
    }

    /// Returns the pending breakout target while flat.
    pub fn pending_target(&self) -> Option<f64> {
        match self.state {
            State::Flat { target } => target,
            _ => None,
        }
    }

    /// Returns the open position.
    pub fn position(&self) -> Option<&Position> {
        match &self.state {
            State::Holding(position) => Some(position),
            _ => None,
        }
    }

    /// Returns the in-progress day candle.
    pub fn day_aggregate(&self) -> Option<&DayAggregate> {
        self.session.as_ref().map(|s| &s.candle)
    }

    /// Returns the latest processed price.
    pub fn last_price(&self) -> Option<f64> {
        self.last_price
    }

    /// Returns the number of opened positions.
    pub fn trade_count(&self) -> usize {
        self.trade_count
    }

    /// Returns the closed positions.
    pub fn trades(&self) -> std::slice::Iter<'_, Trade> {
        self.trades.iter()
    }

    /// Returns the equity history. Still available after a liquidation.
    pub fn balance_history(&self) -> &[f64] {
        self.wallet.history()
    }

    /// Returns the timestamps of each rollover.
    pub fn rollovers(&self) -> std::slice::Iter<'_, DateTime<Utc>> {
        self.rollovers.iter()
    }

    /// Returns `true` once the account has been liquidated.
    pub fn is_liquidated(&self) -> bool {
        matches!(self.state, State::Liquidated(_))
    }

    /// Returns the dashboard view, once at least one price was processed.
    pub fn target_view(&self) -> Option<TargetView> {
        let last = self.last_price?;
        let session = self.session.as_ref()?;
        let target = self.pending_target();
        let (long_target, short_target) = match self.bias {
            PositionSide::Long => (target, None),
            PositionSide::Short => (None, target),
        };

        Some(TargetView {
            last,
            open: session.candle.open,
            long_target,
            short_target,
            can_long: long_target.is_some(),
            can_short: short_target.is_some() && self.config.shorting,
        })
    }

    /// Processes one price event.
    ///
    /// ### Arguments
    /// * `price` - The observed price.
    /// * `timestamp` - Moment of the observation, never earlier than the previous one.
    ///
    /// ### Returns
    /// Ok, or [`Error::Liquidated`] when the account is wiped out. Once liquidated,
    /// every further call returns the same error without changing the state.
    pub fn process(&mut self, price: f64, timestamp: DateTime<Utc>) -> Result<()> {
        if let State::Liquidated(liquidation) = self.state {
            return Err(liquidation.into());
        }
        if price <= 0.0 || !price.is_finite() {
            return Err(Error::InvalidPrice(price));
        }
        self.last_price = Some(price);

        let Some(session) = self.session.as_mut() else {
            self.session = Some(Session::new(price, timestamp));
            return Ok(());
        };
        session.high_watermark = session.high_watermark.max(price);
        session.low_watermark = session.low_watermark.min(price);
        let next_day = session.is_next_day(timestamp);

        if next_day {
            self.rollover(price, timestamp)?;
        }
        self.tighten_trailing_stop();
        self.check_target(price, timestamp);
        self.check_stop(price, timestamp)?;
        self.check_liquidation(price, timestamp)?;

        if let Some(session) = self.session.as_mut() {
            session.candle.update(price);
        }
        Ok(())
    }

    /// Returns the run output, or the liquidation that ended it.
    pub fn finalize(&self) -> Result<Report> {
        if let State::Liquidated(liquidation) = self.state {
            return Err(liquidation.into());
        }
        Ok(Report {
            balance_history: self.wallet.history().to_vec(),
            trade_count: self.trade_count,
        })
    }

    /// Resets the engine to its initial state, keeping the configuration.
    pub fn reset(&mut self) {
        self.wallet.reset();
        self.state = State::Flat { target: None };
        self.bias = PositionSide::Long;
        self.stop = None;
        self.session = None;
        self.last_price = None;
        self.trade_count = 0;
        self.trades = Vec::new();
        self.rollovers = Vec::new();
    }

    /// Closes the day: settles any position, records the balance and sets the next target.
    fn rollover(&mut self, price: f64, timestamp: DateTime<Utc>) -> Result<()> {
        if let State::Holding(position) = self.state {
            self.close_position(position, price, timestamp, ExitReason::Rollover)?;
        }
        self.wallet.record();
        self.rollovers.push(timestamp);

        let candle = self
            .session
            .map(|s| s.candle)
            .ok_or_else(|| Error::Msg("rollover without a trading day".to_owned()))?;
        self.bias = if self.config.always_long || candle.close > candle.open {
            PositionSide::Long
        } else {
            PositionSide::Short
        };

        let sign = self.bias.sign();
        let target = price + candle.range() * sign * self.config.k;
        self.stop = self.config.stop_distance().map(|d| target.subfrac(d * sign));
        self.state = State::Flat { target: Some(target) };
        self.session = Some(Session::new(price, timestamp));

        tracing::debug!(
            %timestamp,
            balance = self.wallet.balance(),
            bias = ?self.bias,
            target,
            stop = ?self.stop,
            "new trading day"
        );
        Ok(())
    }

    /// Moves the trailing stop toward the day's watermark, never away from it.
    fn tighten_trailing_stop(&mut self) {
        let (Some(fraction), Some(session)) = (self.config.trailing_stop, self.session.as_ref()) else {
            return;
        };
        let side = self.position().map_or(self.bias, Position::side);

        self.stop = Some(match side {
            PositionSide::Long => {
                let stop = session.high_watermark.subfrac(fraction);
                self.stop.map_or(stop, |current| current.max(stop))
            }
            PositionSide::Short => {
                let stop = session.low_watermark.addfrac(fraction);
                self.stop.map_or(stop, |current| current.min(stop))
            }
        });
    }

    /// Opens a position at the target when the price breaks through it.
    fn check_target(&mut self, price: f64, timestamp: DateTime<Utc>) {
        let State::Flat { target: Some(target) } = self.state else {
            return;
        };
        let side = match self.bias {
            PositionSide::Long if price > target => PositionSide::Long,
            PositionSide::Short if self.config.shorting && price < target => PositionSide::Short,
            _ => return,
        };

        self.trade_count += 1;
        // the target is consumed: no re-entry on the same day
        self.state = State::Holding(Position::from((side, target, timestamp)));
        tracing::debug!(%timestamp, ?side, entry = target, price, "position opened");
    }

    fn check_stop(&mut self, price: f64, timestamp: DateTime<Utc>) -> Result<()> {
        let (State::Holding(position), Some(stop)) = (self.state, self.stop) else {
            return Ok(());
        };
        let hit = match position.side() {
            PositionSide::Long => price < stop,
            PositionSide::Short => price > stop,
        };

        if hit {
            self.close_position(position, stop, timestamp, ExitReason::StopLoss)?;
            self.stop = None;
        }
        Ok(())
    }

    fn check_liquidation(&mut self, price: f64, timestamp: DateTime<Utc>) -> Result<()> {
        if let State::Holding(position) = self.state
            && position.estimate_return(price) * self.config.leverage < LIQUIDATION_THRESHOLD
        {
            return Err(self.liquidate(position, price, timestamp));
        }
        Ok(())
    }

    /// Settles `position` at `price` and goes flat without a target.
    fn close_position(
        &mut self,
        position: Position,
        price: f64,
        timestamp: DateTime<Utc>,
        reason: ExitReason,
    ) -> Result<()> {
        let gross_return = position.estimate_return(price);
        let cost = self.config.round_trip_cost();
        let balance = self.wallet.settle(gross_return, cost, self.config.leverage);

        self.trades.push(Trade {
            side: position.side(),
            entry_price: position.entry_price(),
            exit_price: price,
            opened_at: position.opened_at(),
            closed_at: timestamp,
            net_return: gross_return - cost,
            reason,
        });
        self.state = State::Flat { target: None };
        tracing::debug!(%timestamp, ?reason, exit = price, balance, "position closed");

        if balance <= 0.0 {
            return Err(self.liquidate(position, price, timestamp));
        }
        Ok(())
    }

    fn liquidate(&mut self, position: Position, price: f64, timestamp: DateTime<Utc>) -> Error {
        let liquidation = Liquidation {
            side: position.side(),
            entry_price: position.entry_price(),
            exit_price: price,
            timestamp,
        };
        self.state = State::Liquidated(liquidation);
        tracing::warn!(
            side = ?liquidation.side,
            entry = liquidation.entry_price,
            price,
            %timestamp,
            "account liquidated"
        );
        liquidation.into()
    }
}
