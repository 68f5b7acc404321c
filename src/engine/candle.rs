use chrono::{DateTime, Utc};

use crate::errors::{Error, Result};

/// OHLCV data of one symbol for a single time period.
///
/// Candles are immutable once built. Use [`CandleBuilder`] to create one.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    symbol: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    open_time: DateTime<Utc>,
}

impl Candle {
    /// Returns the instrument symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Returns the open price.
    pub fn open(&self) -> f64 {
        self.open
    }

    /// Returns the highest price.
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Returns the lowest price.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Returns the close price.
    pub fn close(&self) -> f64 {
        self.close
    }

    /// Returns the traded volume.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Returns the open time.
    pub fn open_time(&self) -> DateTime<Utc> {
        self.open_time
    }

    /// Returns the open time as epoch milliseconds.
    pub fn timestamp(&self) -> i64 {
        self.open_time.timestamp_millis()
    }
}

/// Builder for [`Candle`].
#[derive(Debug, Default)]
pub struct CandleBuilder {
    symbol: Option<String>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
    open_time: Option<DateTime<Utc>>,
    timestamp: Option<i64>,
}

impl CandleBuilder {
    /// Creates an empty builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Sets the symbol.
    pub fn symbol(mut self, symbol: impl ToString) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    /// Sets the open price.
    pub fn open(mut self, open: f64) -> Self {
        self.open = Some(open);
        self
    }

    /// Sets the highest price.
    pub fn high(mut self, high: f64) -> Self {
        self.high = Some(high);
        self
    }

    /// Sets the lowest price.
    pub fn low(mut self, low: f64) -> Self {
        self.low = Some(low);
        self
    }

    /// Sets the close price.
    pub fn close(mut self, close: f64) -> Self {
        self.close = Some(close);
        self
    }

    /// Sets the volume.
    pub fn volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Sets the open time.
    pub fn open_time(mut self, open_time: DateTime<Utc>) -> Self {
        self.open_time = Some(open_time);
        self
    }

    /// Sets the open time from epoch milliseconds.
    pub fn timestamp(mut self, millis: i64) -> Self {
        self.timestamp = Some(millis);
        self
    }

    /// Builds the candle.
    ///
    /// ### Returns
    /// The candle, or an error when a field is missing, a price is not strictly positive,
    /// or the extremes do not enclose the open and close prices.
    pub fn build(self) -> Result<Candle> {
        let missing = |field: &str| Error::InvalidCandle(format!("missing {field}"));

        let open = self.open.ok_or_else(|| missing("open"))?;
        let high = self.high.ok_or_else(|| missing("high"))?;
        let low = self.low.ok_or_else(|| missing("low"))?;
        let close = self.close.ok_or_else(|| missing("close"))?;
        let volume = self.volume.unwrap_or_default();
        let open_time = match (self.open_time, self.timestamp) {
            (Some(open_time), _) => open_time,
            (None, Some(millis)) => DateTime::from_timestamp_millis(millis).ok_or(Error::InvalidTimestamp(millis))?,
            (None, None) => return Err(missing("open time")),
        };

        for price in [open, high, low, close] {
            if price <= 0.0 || !price.is_finite() {
                return Err(Error::InvalidPrice(price));
            }
        }
        if volume < 0.0 || !volume.is_finite() {
            return Err(Error::InvalidCandle(format!("volume {volume}")));
        }
        if high < open.max(close) || low > open.min(close) {
            return Err(Error::InvalidCandle(format!(
                "open {open}, high {high}, low {low}, close {close}"
            )));
        }

        Ok(Candle {
            symbol: self.symbol.unwrap_or_default(),
            open,
            high,
            low,
            close,
            volume,
            open_time,
        })
    }
}

/// Checks that the candles never go back in time.
pub fn ensure_ordered(candles: &[Candle]) -> Result<()> {
    match candles.windows(2).position(|w| w[1].open_time < w[0].open_time) {
        Some(index) => Err(Error::UnorderedCandles { index: index + 1 }),
        None => Ok(()),
    }
}

/// Merges candles from overlapping sources into one time-ordered sequence.
///
/// When several candles share a timestamp, the one from the earliest source wins.
pub fn merge_candles<I>(sources: I) -> Vec<Candle>
where
    I: IntoIterator<Item = Vec<Candle>>,
{
    let mut candles = sources.into_iter().flatten().collect::<Vec<_>>();
    // stable: keeps source order among equal timestamps
    candles.sort_by_key(|c| c.open_time);
    candles.dedup_by_key(|c| c.open_time);
    candles
}
