//! Storage seam for candles and balance histories.
//!
//! The backtester never talks to a database directly. A storage backend implements
//! [`CandleStore`]: bulk writes arrive in batches of at most [`BATCH_SIZE`] records and reads
//! are keyed by symbol. [`MemoryStore`] keeps everything in memory.

use std::collections::HashMap;

use crate::{engine::*, errors::Result};

/// Maximum number of candles handed to a backend in one write.
pub const BATCH_SIZE: usize = 500;

/// Bulk storage and retrieval of candles and balance histories, keyed by symbol.
pub trait CandleStore {
    /// Writes one batch of at most [`BATCH_SIZE`] candles.
    fn write_batch(&mut self, candles: &[Candle]) -> Result<()>;

    /// Returns the stored candles of `symbol`, time-ordered.
    fn candles(&self, symbol: &str) -> Result<Vec<Candle>>;

    /// Replaces the stored balance history of `symbol`.
    fn save_balance_history(&mut self, symbol: &str, history: &[f64]) -> Result<()>;

    /// Returns the stored balance history of `symbol`, empty if none.
    fn balance_history(&self, symbol: &str) -> Result<Vec<f64>>;

    /// Writes `candles` in batches of [`BATCH_SIZE`].
    ///
    /// ### Returns
    /// The number of candles written.
    fn save_candles(&mut self, candles: &[Candle]) -> Result<usize> {
        for batch in candles.chunks(BATCH_SIZE) {
            self.write_batch(batch)?;
        }
        tracing::debug!(count = candles.len(), "candles saved");
        Ok(candles.len())
    }
}

/// An in-memory [`CandleStore`].
///
/// Candles of the same symbol and open time are stored once, the first write wins.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    candles: HashMap<String, Vec<Candle>>,
    histories: HashMap<String, Vec<f64>>,
    batches: usize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of batches written so far.
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Returns the stored symbols.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.candles.keys().map(String::as_str)
    }
}

impl CandleStore for MemoryStore {
    fn write_batch(&mut self, candles: &[Candle]) -> Result<()> {
        let mut by_symbol = HashMap::<&str, Vec<Candle>>::new();
        for candle in candles {
            by_symbol.entry(candle.symbol()).or_default().push(candle.clone());
        }

        for (symbol, batch) in by_symbol {
            let stored = self.candles.remove(symbol).unwrap_or_default();
            self.candles.insert(symbol.to_owned(), merge_candles([stored, batch]));
        }
        self.batches += 1;
        Ok(())
    }

    fn candles(&self, symbol: &str) -> Result<Vec<Candle>> {
        Ok(self.candles.get(symbol).cloned().unwrap_or_default())
    }

    fn save_balance_history(&mut self, symbol: &str, history: &[f64]) -> Result<()> {
        self.histories.insert(symbol.to_owned(), history.to_vec());
        Ok(())
    }

    fn balance_history(&self, symbol: &str) -> Result<Vec<f64>> {
        Ok(self.histories.get(symbol).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(symbol: &str, hour: i64, close: f64) -> Candle {
        CandleBuilder::builder()
            .symbol(symbol)
            .open(close)
            .high(close)
            .low(close)
            .close(close)
            .timestamp(1_609_459_200_000 + hour * 3_600_000)
            .build()
            .unwrap()
    }

    #[test]
    fn save_in_batches() {
        let candles = (0..1_200).map(|h| candle("BTCUSDT", h, 100.0)).collect::<Vec<_>>();
        let mut store = MemoryStore::new();

        assert_eq!(store.save_candles(&candles).unwrap(), 1_200);
        assert_eq!(store.batches(), 3);
        assert_eq!(store.candles("BTCUSDT").unwrap().len(), 1_200);
    }

    #[test]
    fn candles_are_keyed_by_symbol() {
        let mut store = MemoryStore::new();
        store
            .save_candles(&[candle("BTCUSDT", 1, 2.0), candle("ETHUSDT", 0, 9.0), candle("BTCUSDT", 0, 1.0)])
            .unwrap();

        let closes = store.candles("BTCUSDT").unwrap().iter().map(Candle::close).collect::<Vec<_>>();
        assert_eq!(closes, vec![1.0, 2.0]);
        assert_eq!(store.candles("ETHUSDT").unwrap().len(), 1);
        assert!(store.candles("SOLUSDT").unwrap().is_empty());
    }

    #[test]
    fn overlapping_writes_keep_one_candle_per_time() {
        let mut store = MemoryStore::new();
        store.save_candles(&[candle("BTCUSDT", 0, 1.0), candle("BTCUSDT", 1, 2.0)]).unwrap();
        store.save_candles(&[candle("BTCUSDT", 1, 5.0), candle("BTCUSDT", 2, 3.0)]).unwrap();

        let closes = store.candles("BTCUSDT").unwrap().iter().map(Candle::close).collect::<Vec<_>>();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn balance_history_round_trip() {
        let mut store = MemoryStore::new();
        assert!(store.balance_history("BTCUSDT").unwrap().is_empty());

        store.save_balance_history("BTCUSDT", &[10_000.0, 10_500.0]).unwrap();
        assert_eq!(store.balance_history("BTCUSDT").unwrap(), vec![10_000.0, 10_500.0]);
    }
}
