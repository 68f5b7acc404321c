use std::{fs::File, io::BufReader, io::Read, path::Path};

use chrono::{DateTime, Utc, serde::ts_milliseconds};
use serde::Deserialize;

use crate::{
    engine::{Candle, CandleBuilder},
    errors::{Error, Result},
};

// Accepts both layouts:
// { "open_time": 1759813200000, "open_price": 124499.99, "high_price": 124640.76,
//   "low_price": 124240.37, "close_price": 124414.17, "volume": 424.20697, ... }
// { "symbol": "BTCUSDT", "timestamp": 1759813200000, "open": 124499.99, ... }

/// A kline record, as exported by exchanges or stored by the candle collector.
#[derive(Debug, Clone, Deserialize)]
pub struct KlineRecord {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(alias = "open_price")]
    open: f64,
    #[serde(alias = "high_price")]
    high: f64,
    #[serde(alias = "low_price")]
    low: f64,
    #[serde(alias = "close_price")]
    close: f64,
    #[serde(default)]
    volume: f64,
    #[serde(alias = "timestamp", with = "ts_milliseconds")]
    open_time: DateTime<Utc>,
}

impl KlineRecord {
    /// Returns the symbol carried by the record, if any.
    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    /// Returns the open time.
    pub fn open_time(&self) -> DateTime<Utc> {
        self.open_time
    }

    /// Converts the record into a validated candle.
    /// `symbol` is used when the record does not carry one.
    pub fn into_candle(self, symbol: &str) -> Result<Candle> {
        CandleBuilder::builder()
            .symbol(self.symbol.as_deref().unwrap_or(symbol))
            .open(self.open)
            .high(self.high)
            .low(self.low)
            .close(self.close)
            .volume(self.volume)
            .open_time(self.open_time)
            .build()
    }
}

/// Reads a JSON array of kline records and returns the candles of `symbol`, time-ordered.
///
/// Records carrying another symbol are skipped. Records without a symbol are taken as `symbol`.
pub fn candles_from_reader<R: Read>(reader: R, symbol: &str) -> Result<Vec<Candle>> {
    let records: Vec<KlineRecord> = serde_json::from_reader(reader).map_err(Error::from)?;
    let candles = records
        .into_iter()
        .filter(|record| record.symbol().is_none_or(|s| s == symbol))
        .map(|record| record.into_candle(symbol))
        .collect::<Result<Vec<_>>>()?;
    Ok(crate::engine::merge_candles([candles]))
}

/// Reads data from `filepath` and returns the candles of `symbol`, time-ordered.
pub fn get_data_from_file(filepath: impl AsRef<Path>, symbol: &str) -> Result<Vec<Candle>> {
    let file = File::open(filepath)?;
    let candles = candles_from_reader(BufReader::new(file), symbol)?;
    tracing::debug!(symbol, count = candles.len(), "candles loaded");
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_exchange_layout() {
        let json = r#"[
            { "open_time": 1609545600000, "open_price": 110.0, "high_price": 120.0,
              "low_price": 105.0, "close_price": 115.0, "volume": 3.5, "ignore": 0.0 },
            { "open_time": 1609459200000, "open_price": 100.0, "high_price": 112.0,
              "low_price": 95.0, "close_price": 110.0, "volume": 2.0, "ignore": 0.0 }
        ]"#;
        let candles = candles_from_reader(json.as_bytes(), "BTCUSDT").unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp(), 1_609_459_200_000);
        assert_eq!(candles[0].symbol(), "BTCUSDT");
        assert_eq!(candles[1].close(), 115.0);
    }

    #[test]
    fn read_stored_layout() {
        let json = r#"[{ "symbol": "ETHUSDT", "timestamp": 1609459200000,
            "open": 10.0, "high": 11.0, "low": 9.0, "close": 10.5, "volume": 1.0 }]"#;
        let candles = candles_from_reader(json.as_bytes(), "ETHUSDT").unwrap();
        assert_eq!(candles[0].symbol(), "ETHUSDT");
    }

    #[test]
    fn keep_only_the_requested_symbol() {
        let json = r#"[
            { "symbol": "ETHUSDT", "timestamp": 1609459200000,
              "open": 10.0, "high": 11.0, "low": 9.0, "close": 10.5 },
            { "symbol": "BTCUSDT", "timestamp": 1609459200000,
              "open": 100.0, "high": 110.0, "low": 90.0, "close": 105.0 },
            { "symbol": "BTCUSDT", "timestamp": 1609545600000,
              "open": 105.0, "high": 112.0, "low": 101.0, "close": 108.0 }
        ]"#;
        let candles = candles_from_reader(json.as_bytes(), "BTCUSDT").unwrap();

        let symbols = candles.iter().map(Candle::symbol).collect::<Vec<_>>();
        assert_eq!(symbols, vec!["BTCUSDT", "BTCUSDT"]);
        assert_eq!(candles[0].close(), 105.0);

        let candles = candles_from_reader(json.as_bytes(), "SOLUSDT").unwrap();
        assert!(candles.is_empty());
    }

    #[test]
    fn reject_inconsistent_record() {
        let json = r#"[{ "timestamp": 1609459200000, "open": 10.0, "high": 9.0, "low": 8.0, "close": 8.5 }]"#;
        let result = candles_from_reader(json.as_bytes(), "BTCUSDT");
        assert!(matches!(result, Err(Error::InvalidCandle(_))));
    }

    #[test]
    fn missing_file() {
        let result = get_data_from_file("does/not/exist.json", "BTCUSDT");
        assert!(matches!(result, Err(Error::IoError(_))));
    }
}
