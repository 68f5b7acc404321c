//! # VBO: Volatility BreakOut backtester
//!
//! **VBO** replays a daily volatility-breakout strategy over the recorded price history of a
//! single instrument and reports the hypothetical profit and loss.
//! It helps strategy designers evaluate a range multiplier, leverage, a stop-loss or trailing stop
//! and a long/short bias before risking capital.
//!
//! ## The strategy
//! Every UTC day, the previous day's range (`high - low`) scaled by `k` is added to the opening
//! price to obtain a **breakout target**. When the price crosses the target, a position is opened
//! at the target price. The position is closed at the next day rollover, when the stop is hit, or
//! the run ends with a liquidation when the leveraged loss reaches 90%.
//!
//! ## Core Components
//! | Component      | Description                                                                          |
//! |----------------|--------------------------------------------------------------------------------------|
//! | **`Candle`**   | OHLCV data for a single time period of one symbol.                                   |
//! | **`Config`**   | Versioned strategy parameters with defaults and validation.                          |
//! | **`Breakout`** | The per-event state machine: targets, stops, leverage, costs and liquidation.        |
//! | **`Backtest`** | Replays a candle sequence through `Breakout` with a fixed intraday event ordering.   |
//! | **`Metrics`**  | Return, annualized return, max drawdown, Sharpe ratio, win rate and the benchmark.   |
//! | **`Optimizer`**| Sweeps parameter combinations in parallel.                                           |
//!
//! ## Getting Started
//! ```rust
//! use vbo_rs::prelude::*;
//! use chrono::{DateTime, Duration};
//!
//! let start = DateTime::from_timestamp_millis(1_609_459_200_000).unwrap();
//! let candles = (0..3)
//!     .map(|day| {
//!         let open = 100.0 + day as f64 * 10.0;
//!         CandleBuilder::builder()
//!             .symbol("BTCUSDT")
//!             .open(open)
//!             .high(open + 15.0)
//!             .low(open - 5.0)
//!             .close(open + 10.0)
//!             .volume(1.0)
//!             .open_time(start + Duration::days(day))
//!             .build()
//!             .unwrap()
//!     })
//!     .collect::<Vec<_>>();
//!
//! let config = Config::default().with_k(0.5).with_stop_loss(None);
//! let mut backtest = Backtest::new(candles, config).unwrap();
//! let report = backtest.run().unwrap();
//!
//! assert_eq!(report.balance_history.len(), 3);
//! let metrics = Metrics::from(&backtest);
//! println!("{metrics}");
//! ```
//!
//! ## Error Handling
//! - Invalid parameters are rejected before the first price event with [`Error::Config`],
//!   listing every violated rule.
//! - A margin wipeout aborts the run with [`Error::Liquidated`] carrying the position snapshot;
//!   the balance history up to that point stays readable on the engine.
//! - Statistics on degenerate input return [`Error::InsufficientData`] or
//!   [`Error::NotComputable`] instead of NaN or infinity.
//!
//! ## License
//! MIT
#![warn(missing_docs)]

/// Core components: candles, configuration, positions, wallet and the breakout engine.
pub mod engine;

/// Error types for the library.
pub mod errors;

/// Performance metrics: return, drawdown, Sharpe ratio, win rate, benchmark.
pub mod metrics;

/// Storage seam for candles and balance histories.
pub mod store;

/// Utility functions and helpers.
#[cfg(feature = "serde")]
pub mod utils;

/// Strategy parameter optimization.
#[cfg(feature = "optimizer")]
pub mod optimizer;

/// Draw candles and the equity curve to svg or png.
#[cfg(feature = "draws")]
pub mod draws;

/// Re-exports of commonly used types and traits for convenience.
pub mod prelude {
    pub use super::*;
    pub use crate::engine::*;
    pub use crate::errors::*;
    pub use crate::metrics::*;
    pub use crate::store::*;

    #[cfg(feature = "serde")]
    pub use crate::utils::*;

    #[cfg(feature = "optimizer")]
    pub use crate::optimizer::*;

    #[cfg(feature = "draws")]
    pub use crate::draws::*;
}

use std::ops::{Add, Div, Mul, Neg, Sub};

/// Trait for fraction-based calculations.
///
/// Fractions are plain ratios: `0.02` means 2%.
pub trait FractionCalculus<Rhs = Self> {
    /// Adds a fraction of the value to itself, e.g. `100.0 * 1.5` for `addfrac(0.5)`.
    fn addfrac(self, rhs: Rhs) -> Self;

    /// Subtracts a fraction of the value from itself, e.g. `100.0 * 0.5` for `subfrac(0.5)`.
    fn subfrac(self, rhs: Rhs) -> Self;

    /// Returns the relative change from `self` to `new`, e.g. `0.1` from 100 to 110.
    fn change(self, new: Self) -> Self;
}

impl FractionCalculus for f64 {
    fn addfrac(self, fraction: Self) -> Self {
        self.mul(fraction.add(1.0))
    }

    fn subfrac(self, fraction: Self) -> Self {
        self.mul(fraction.neg().add(1.0))
    }

    fn change(self, new: Self) -> Self {
        new.div(self).sub(1.0)
    }
}
