//! Core backtesting components.
//!
//! This module provides the fundamental types for backtesting:
//! - `Candle`: OHLCV data of one symbol.
//! - `Config`: Strategy parameters and their validation.
//! - `Position`: The open trade and the closed `Trade` records.
//! - `Wallet`: Tracks equity, its daily history and transaction costs.
//! - `Breakout`: The per-event strategy state machine.
//! - `Backtest`: Replays candles through `Breakout`.

mod breakout;
mod bts;
mod candle;
mod config;
mod position;
mod wallet;

pub use breakout::*;
pub use bts::*;
pub use candle::*;
pub use config::*;
pub use position::*;
pub use wallet::*;
