use chrono::{DateTime, Utc};

use crate::FractionCalculus;

/// Direction of a position, and of the daily bias.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionSide {
    /// Profits when the price goes up.
    Long,
    /// Profits when the price goes down.
    Short,
}

impl PositionSide {
    /// Returns `1.0` for long and `-1.0` for short.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }
}

/// An open position.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    side: PositionSide,
    entry_price: f64,
    opened_at: DateTime<Utc>,
}

impl From<(PositionSide, f64, DateTime<Utc>)> for Position {
    fn from((side, entry_price, opened_at): (PositionSide, f64, DateTime<Utc>)) -> Self {
        Self {
            side,
            entry_price,
            opened_at,
        }
    }
}

impl Position {
    /// Returns the position side.
    pub fn side(&self) -> PositionSide {
        self.side
    }

    /// Returns the entry price.
    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    /// Returns the moment the position was opened.
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Unleveraged return at `price`, signed by direction.
    pub fn estimate_return(&self, price: f64) -> f64 {
        self.entry_price.change(price) * self.side.sign()
    }
}

/// Why a position was closed.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The price crossed the active stop.
    StopLoss,
    /// The trading day ended.
    Rollover,
}

/// A closed position.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    /// Position side.
    pub side: PositionSide,
    /// Entry price.
    pub entry_price: f64,
    /// Exit price.
    pub exit_price: f64,
    /// Moment the position was opened.
    pub opened_at: DateTime<Utc>,
    /// Moment the position was closed.
    pub closed_at: DateTime<Utc>,
    /// Unleveraged return after transaction costs.
    pub net_return: f64,
    /// Exit reason.
    pub reason: ExitReason,
}
