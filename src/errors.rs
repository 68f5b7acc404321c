use std::fmt;

use chrono::{DateTime, Utc};

use crate::engine::PositionSide;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the engine, the statistics and the helpers around them.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The configuration breaks one or more rules. Raised before any simulation step.
    #[error("Invalid configuration: {0}")]
    Config(ConfigErrors),

    /// The leveraged loss of the open position reached the ruin threshold.
    /// The run is over, the payload describes the position at that moment.
    #[error("Account liquidated: {0}")]
    Liquidated(Liquidation),

    /// Not enough data points to compute a statistic.
    #[error("Insufficient data: {required} point(s) required, {available} available")]
    InsufficientData {
        /// Minimum number of points.
        required: usize,
        /// Points actually provided.
        available: usize,
    },

    /// The statistic is mathematically undefined for the given input.
    #[error("Not computable: {0}")]
    NotComputable(&'static str),

    /// The candle data provided is empty. Backtesting requires at least one candle.
    #[error("Candle data is empty: backtesting requires at least one candle")]
    CandleDataEmpty,

    /// The candle values are inconsistent (e.g. `high < low`).
    #[error("Invalid candle: {0}")]
    InvalidCandle(String),

    /// The candle sequence goes back in time at `index`.
    #[error("Candles are not time-ordered (at index {index})")]
    UnorderedCandles {
        /// Position of the first out-of-order candle.
        index: usize,
    },

    /// A candle belongs to another instrument than the configured pair.
    #[error("Symbol mismatch: expected {expected}, found {found}")]
    SymbolMismatch {
        /// Configured pair.
        expected: String,
        /// Symbol carried by the candle.
        found: String,
    },

    /// The epoch milliseconds cannot be represented as a date.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    /// The initial or current balance is not positive.
    #[error("Balance must be positive (got: {0})")]
    NegZeroBalance(f64),

    /// A price is zero, negative or not finite.
    #[error("Invalid price: {0}")]
    InvalidPrice(f64),

    /// Custom error message.
    #[error("{0}")]
    Msg(String),

    /// Chart rendering failed.
    #[cfg(feature = "draws")]
    #[error("Plotters error: {0}")]
    Plotters(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// JSON serialization/deserialization error occurred.
    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    JsonError(String),
}

// Manual conversions: the source errors are neither `Clone` nor `PartialEq`, only their message is kept.
impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value.to_string())
    }
}

#[cfg(feature = "serde")]
impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::JsonError(value.to_string())
    }
}

impl From<ConfigErrors> for Error {
    fn from(value: ConfigErrors) -> Self {
        Self::Config(value)
    }
}

impl From<Liquidation> for Error {
    fn from(value: Liquidation) -> Self {
        Self::Liquidated(value)
    }
}

/// A single configuration rule violation.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The range multiplier is negative.
    #[error("k cannot be negative (got: {0})")]
    NegativeK(f64),

    /// The leverage is negative.
    #[error("leverage cannot be negative (got: {0})")]
    NegativeLeverage(f64),

    /// Both stop rules are set.
    #[error("cannot specify stop-loss and trailing stop")]
    StopLossAndTrailingStop,

    /// Shorting is enabled while the bias is forced long.
    #[error("cannot short and be always long")]
    AlwaysLongWithShorting,

    /// No instrument was selected.
    #[error("universe must have at least one pair")]
    EmptyUniverse,

    /// The fee is negative.
    #[error("fee cannot be negative (got: {0})")]
    NegativeFee(f64),

    /// The slippage is negative.
    #[error("slippage cannot be negative (got: {0})")]
    NegativeSlippage(f64),

    /// The initial capital is zero or negative.
    #[error("initial capital must be positive (got: {0})")]
    NonPositiveInitialCapital(f64),

    /// A stop distance is outside `(0, 1)`.
    #[error("{name} must be within (0, 1) (got: {value})")]
    StopOutOfRange {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// A numeric parameter is NaN or infinite.
    #[error("{0} must be finite")]
    NonFinite(&'static str),

    /// The configuration was written for another layout version.
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),
}

/// Every violation found by one validation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigErrors(pub Vec<ConfigError>);

impl ConfigErrors {
    /// Returns the first violation.
    pub fn first(&self) -> Option<&ConfigError> {
        self.0.first()
    }

    /// Returns an iterator over the violations.
    pub fn iter(&self) -> std::slice::Iter<'_, ConfigError> {
        self.0.iter()
    }

    /// Returns `true` if `error` is among the violations.
    pub fn contains(&self, error: &ConfigError) -> bool {
        self.0.contains(error)
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages = self.0.iter().map(ToString::to_string).collect::<Vec<_>>();
        write!(f, "{}", messages.join("; "))
    }
}

/// Snapshot of the position that wiped out the account.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Liquidation {
    /// Direction of the liquidated position.
    pub side: PositionSide,
    /// Entry price of the position.
    pub entry_price: f64,
    /// Price that triggered the liquidation.
    pub exit_price: f64,
    /// Moment of the triggering price event.
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for Liquidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} entered at {:.2}, price {:.2} at {}",
            self.side, self.entry_price, self.exit_price, self.timestamp
        )
    }
}

#[cfg(test)]
#[test]
fn io_error_keeps_the_message() {
    let error = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"));
    assert_eq!(error, Error::IoError("no such file".to_owned()));
}

#[cfg(test)]
#[test]
fn config_errors_display_every_violation() {
    let errors = ConfigErrors(vec![ConfigError::NegativeK(-1.0), ConfigError::EmptyUniverse]);
    let error = Error::from(errors);
    assert_eq!(
        error.to_string(),
        "Invalid configuration: k cannot be negative (got: -1); universe must have at least one pair"
    );
}
