//! Performance metrics for backtesting.
//!
//! This module provides tools to calculate, from a balance history:
//! - Total and annualized return
//! - Max drawdown
//! - Sharpe ratio
//!
//! From the trade log:
//! - Win rate
//! - Profit factor
//!
//! And the buy-and-hold benchmark, from the raw candles only.
//!
//! Every function returns [`Error::InsufficientData`] or [`Error::NotComputable`] instead of
//! NaN or infinity.

use std::fmt;

use crate::{
    engine::*,
    errors::{Error, Result},
};

/// Number of trading days in a year; crypto markets never close.
pub const DAYS_PER_YEAR: f64 = 365.0;

fn finite(value: f64, what: &'static str) -> Result<f64> {
    if value.is_finite() { Ok(value) } else { Err(Error::NotComputable(what)) }
}

fn require(values: &[f64], required: usize) -> Result<()> {
    if values.len() < required {
        return Err(Error::InsufficientData {
            required,
            available: values.len(),
        });
    }
    Ok(())
}

/// Returns `last / first - 1`.
///
/// ### Example
/// ```rust
/// use vbo_rs::metrics::total_return;
///
/// let r = total_return(&[100.0, 150.0]).unwrap();
/// assert_eq!(r, 0.5);
/// ```
pub fn total_return(history: &[f64]) -> Result<f64> {
    require(history, 1)?;
    let (first, last) = (history[0], history[history.len() - 1]);
    if first <= 0.0 {
        return Err(Error::NotComputable("total return from a non-positive balance"));
    }
    finite(last / first - 1.0, "total return")
}

/// Returns `(1 + total_return) ^ (365 / days) - 1` where `days = history.len() - 1`.
///
/// A history with a single point covers no day: the result is [`Error::InsufficientData`].
pub fn annualized_return(history: &[f64]) -> Result<f64> {
    require(history, 2)?;
    let days = (history.len() - 1) as f64;
    let total = total_return(history)?;
    finite((1.0 + total).powf(DAYS_PER_YEAR / days) - 1.0, "annualized return")
}

/// Returns the largest peak-to-trough decline, as a fraction in `[-1, 0]`.
///
/// `0` means the history never went below its running maximum.
///
/// ### Example
/// ```rust
/// use vbo_rs::metrics::max_drawdown;
///
/// let dd = max_drawdown(&[100.0, 120.0, 90.0, 130.0]).unwrap();
/// assert_eq!(dd, -0.25);
/// ```
pub fn max_drawdown(history: &[f64]) -> Result<f64> {
    require(history, 1)?;

    let mut peak = history[0];
    let mut drawdown = 0.0_f64;
    for &value in history {
        peak = peak.max(value);
        if peak > 0.0 {
            drawdown = drawdown.min(value / peak - 1.0);
        }
    }

    finite(drawdown.clamp(-1.0, 0.0), "max drawdown")
}

/// Returns the buy-and-hold return: last close over first open.
pub fn benchmark_return(candles: &[Candle]) -> Result<f64> {
    let (Some(first), Some(last)) = (candles.first(), candles.last()) else {
        return Err(Error::InsufficientData {
            required: 1,
            available: 0,
        });
    };
    finite(last.close() / first.open() - 1.0, "benchmark return")
}

/// Returns the max drawdown of a buy-and-hold position, over the candle closes.
pub fn benchmark_max_drawdown(candles: &[Candle]) -> Result<f64> {
    let closes = candles.iter().map(Candle::close).collect::<Vec<_>>();
    max_drawdown(&closes)
}

/// Computes the Sharpe ratio of the per-day balance returns.
///
/// `risk_free_rate` is the per-day risk-free return (e.g. `0.0` for simplicity).
/// The ratio is not annualized.
pub fn sharpe_ratio(history: &[f64], risk_free_rate: f64) -> Result<f64> {
    require(history, 3)?;

    let mut returns = Vec::with_capacity(history.len() - 1);
    for pair in history.windows(2) {
        if pair[0] <= 0.0 {
            return Err(Error::NotComputable("return from a non-positive balance"));
        }
        returns.push(pair[1] / pair[0] - 1.0);
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let std_dev = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
    if std_dev < 1e-12 {
        return Err(Error::NotComputable("sharpe ratio of constant returns"));
    }

    finite((mean - risk_free_rate) / std_dev, "sharpe ratio")
}

/// Returns the fraction of closed trades with a positive net return, in `[0, 1]`.
pub fn win_rate(trades: &[Trade]) -> Result<f64> {
    if trades.is_empty() {
        return Err(Error::InsufficientData {
            required: 1,
            available: 0,
        });
    }
    let winners = trades.iter().filter(|t| t.net_return > 0.0).count();
    Ok(winners as f64 / trades.len() as f64)
}

/// Returns the sum of net gains over the sum of net losses.
pub fn profit_factor(trades: &[Trade]) -> Result<f64> {
    let (gains, losses) = trades.iter().fold((0.0, 0.0), |(gains, losses), trade| {
        if trade.net_return > 0.0 {
            (gains + trade.net_return, losses)
        } else {
            (gains, losses - trade.net_return)
        }
    });

    if losses == 0.0 {
        return Err(Error::NotComputable("profit factor without losing trades"));
    }
    finite(gains / losses, "profit factor")
}

/// A summary of a run: the engine output plus the buy-and-hold benchmark.
///
/// `Metrics` is typically constructed from a [`Backtest`] after [`Backtest::run`], including a
/// liquidated one: its partial balance history is kept.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    initial_balance: f64,
    balance: f64,
    fees: f64,
    trade_count: usize,
    liquidated: bool,
    balance_history: Vec<f64>,
    trades: Vec<Trade>,
    benchmark_return: Option<f64>,
    benchmark_max_drawdown: Option<f64>,
}

impl From<&Backtest> for Metrics {
    fn from(value: &Backtest) -> Self {
        let candles = value.candles().as_slice();
        Self {
            initial_balance: value.initial_balance(),
            balance: value.balance(),
            fees: value.fees_paid(),
            trade_count: value.trade_count(),
            liquidated: value.is_liquidated(),
            balance_history: value.balance_history().to_vec(),
            trades: value.trades().copied().collect(),
            benchmark_return: benchmark_return(candles).ok(),
            benchmark_max_drawdown: benchmark_max_drawdown(candles).ok(),
        }
    }
}

impl Metrics {
    /// Returns the initial balance.
    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Returns the final balance.
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Returns the cumulative transaction costs.
    pub fn fees(&self) -> f64 {
        self.fees
    }

    /// Returns the number of opened positions.
    pub fn trade_count(&self) -> usize {
        self.trade_count
    }

    /// Returns `true` if the run ended with a liquidation.
    pub fn is_liquidated(&self) -> bool {
        self.liquidated
    }

    /// Returns the balance history.
    pub fn balance_history(&self) -> &[f64] {
        &self.balance_history
    }

    /// Returns the closed trades.
    pub fn trades(&self) -> std::slice::Iter<'_, Trade> {
        self.trades.iter()
    }

    /// See [`total_return`].
    pub fn total_return(&self) -> Result<f64> {
        total_return(&self.balance_history)
    }

    /// See [`annualized_return`].
    pub fn annualized_return(&self) -> Result<f64> {
        annualized_return(&self.balance_history)
    }

    /// See [`max_drawdown`].
    pub fn max_drawdown(&self) -> Result<f64> {
        max_drawdown(&self.balance_history)
    }

    /// See [`sharpe_ratio`].
    pub fn sharpe_ratio(&self, risk_free_rate: f64) -> Result<f64> {
        sharpe_ratio(&self.balance_history, risk_free_rate)
    }

    /// See [`win_rate`].
    pub fn win_rate(&self) -> Result<f64> {
        win_rate(&self.trades)
    }

    /// See [`profit_factor`].
    pub fn profit_factor(&self) -> Result<f64> {
        profit_factor(&self.trades)
    }

    /// Returns the buy-and-hold return over the same candles.
    pub fn benchmark_return(&self) -> Option<f64> {
        self.benchmark_return
    }

    /// Returns the buy-and-hold max drawdown over the same candles.
    pub fn benchmark_max_drawdown(&self) -> Option<f64> {
        self.benchmark_max_drawdown
    }
}

struct Percent(Option<f64>);

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{:.2}%", value * 100.0),
            None => write!(f, "n/a"),
        }
    }
}

struct Ratio(Option<f64>);

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{value:.2}"),
            None => write!(f, "n/a"),
        }
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Backtest Metrics ===")?;
        writeln!(f, "Initial Balance: {:.2}", self.initial_balance)?;
        writeln!(f, "Final Balance: {:.2}", self.balance)?;
        writeln!(f, "Fees paid: {:.2}", self.fees)?;
        writeln!(f, "Trades: {}", self.trade_count)?;
        if self.liquidated {
            writeln!(f, "Liquidated: yes")?;
        }
        writeln!(f)?;
        writeln!(f, "Total Return: {}", Percent(self.total_return().ok()))?;
        writeln!(f, "Annualized Return: {}", Percent(self.annualized_return().ok()))?;
        writeln!(f, "Max Drawdown: {}", Percent(self.max_drawdown().ok()))?;
        writeln!(f, "Sharpe Ratio: {}", Ratio(self.sharpe_ratio(0.0).ok()))?;
        writeln!(f, "Win Rate: {}", Percent(self.win_rate().ok()))?;
        writeln!(f, "Profit Factor: {}", Ratio(self.profit_factor().ok()))?;
        writeln!(f)?;
        writeln!(f, "Benchmark Return: {}", Percent(self.benchmark_return))?;
        write!(f, "Benchmark Max Drawdown: {}", Percent(self.benchmark_max_drawdown))
    }
}
