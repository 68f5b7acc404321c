use crate::errors::{ConfigError, ConfigErrors, Result};

/// Current layout version of [`Config`].
pub const CONFIG_VERSION: u32 = 1;

/// Strategy parameters of a breakout backtest.
///
/// One structure covers every supported behavior (fees, slippage, trailing stop, shorting);
/// each field has an explicit default.
///
/// ### Example
/// ```rust
/// use vbo_rs::prelude::*;
///
/// let config = Config::default().with_k(0.8).with_stop_loss(None).with_trailing_stop(Some(0.05));
/// assert!(config.validate().is_ok());
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Layout version of this configuration.
    pub version: u32,
    /// Range multiplier: `target = open + previous_day_range * k`.
    pub k: f64,
    /// Open short positions on short-biased days.
    pub shorting: bool,
    /// Leverage applied to position returns.
    pub leverage: f64,
    /// Stop-loss distance from the target, as a fraction (e.g. `0.02`).
    pub stop_loss: Option<f64>,
    /// Trailing stop distance from the day's watermark, as a fraction.
    pub trailing_stop: Option<f64>,
    /// Set long targets even if the previous day was down.
    pub always_long: bool,
    /// Trading pair the targets are set for.
    pub pair: String,
    /// Simulated slippage per market order, as a fraction.
    pub slippage: f64,
    /// Trading fee per order, as a fraction.
    pub fee: f64,
    /// Starting equity.
    pub initial_capital: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            k: 0.6,
            shorting: false,
            leverage: 1.0,
            stop_loss: Some(0.02),
            trailing_stop: None,
            always_long: true,
            pair: "BTCUSDT".to_owned(),
            slippage: 0.0004,
            fee: 0.0007,
            initial_capital: 10_000.0,
        }
    }
}

impl Config {
    /// Sets the range multiplier.
    pub fn with_k(mut self, k: f64) -> Self {
        self.k = k;
        self
    }

    /// Enables or disables shorting.
    pub fn with_shorting(mut self, shorting: bool) -> Self {
        self.shorting = shorting;
        self
    }

    /// Sets the leverage.
    pub fn with_leverage(mut self, leverage: f64) -> Self {
        self.leverage = leverage;
        self
    }

    /// Sets the stop-loss distance.
    pub fn with_stop_loss(mut self, stop_loss: Option<f64>) -> Self {
        self.stop_loss = stop_loss;
        self
    }

    /// Sets the trailing stop distance.
    pub fn with_trailing_stop(mut self, trailing_stop: Option<f64>) -> Self {
        self.trailing_stop = trailing_stop;
        self
    }

    /// Forces a long bias every day.
    pub fn with_always_long(mut self, always_long: bool) -> Self {
        self.always_long = always_long;
        self
    }

    /// Sets the trading pair.
    pub fn with_pair(mut self, pair: impl ToString) -> Self {
        self.pair = pair.to_string();
        self
    }

    /// Sets the fee and slippage.
    pub fn with_costs(mut self, fee: f64, slippage: f64) -> Self {
        self.fee = fee;
        self.slippage = slippage;
        self
    }

    /// Sets the initial capital.
    pub fn with_initial_capital(mut self, initial_capital: f64) -> Self {
        self.initial_capital = initial_capital;
        self
    }

    /// Returns the stop distance used when a new target is set, if any.
    pub fn stop_distance(&self) -> Option<f64> {
        self.stop_loss.or(self.trailing_stop)
    }

    /// Returns the round-trip transaction cost as a fraction of the position.
    pub fn round_trip_cost(&self) -> f64 {
        2.0 * (self.fee + self.slippage)
    }

    /// Parses a JSON document; missing fields take their default value.
    #[cfg(feature = "serde")]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the parameters for consistency.
    ///
    /// Every rule is checked, and all violations are reported at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        let numbers = [
            ("k", self.k),
            ("leverage", self.leverage),
            ("fee", self.fee),
            ("slippage", self.slippage),
            ("initial_capital", self.initial_capital),
        ];
        for (name, value) in numbers {
            if !value.is_finite() {
                errors.push(ConfigError::NonFinite(name));
            }
        }

        if self.version != CONFIG_VERSION {
            errors.push(ConfigError::UnsupportedVersion(self.version));
        }
        if self.k < 0.0 {
            errors.push(ConfigError::NegativeK(self.k));
        }
        if self.leverage < 0.0 {
            errors.push(ConfigError::NegativeLeverage(self.leverage));
        }
        if self.stop_loss.is_some() && self.trailing_stop.is_some() {
            errors.push(ConfigError::StopLossAndTrailingStop);
        }
        for (name, stop) in [("stop_loss", self.stop_loss), ("trailing_stop", self.trailing_stop)] {
            if let Some(value) = stop
                && !(value > 0.0 && value < 1.0)
            {
                errors.push(ConfigError::StopOutOfRange { name, value });
            }
        }
        if self.always_long && self.shorting {
            errors.push(ConfigError::AlwaysLongWithShorting);
        }
        if self.pair.trim().is_empty() {
            errors.push(ConfigError::EmptyUniverse);
        }
        if self.fee < 0.0 {
            errors.push(ConfigError::NegativeFee(self.fee));
        }
        if self.slippage < 0.0 {
            errors.push(ConfigError::NegativeSlippage(self.slippage));
        }
        if self.initial_capital <= 0.0 {
            errors.push(ConfigError::NonPositiveInitialCapital(self.initial_capital));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            for error in &errors {
                tracing::warn!(pair = %self.pair, "rejected configuration: {error}");
            }
            Err(ConfigErrors(errors).into())
        }
    }
}
