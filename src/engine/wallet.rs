#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Account equity with its end-of-day history.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Wallet {
    // Initial balance used for reset
    initial_balance: f64,
    // Current equity
    balance: f64,
    // Equity at each rollover, starting with the initial balance
    history: Vec<f64>,
    // Cumulative transaction costs paid
    fees: f64,
}

impl Wallet {
    /// Creates a new wallet with the given initial balance.
    /// Negative balances are rejected.
    pub fn new(balance: f64) -> Result<Self> {
        if balance <= 0.0 || !balance.is_finite() {
            return Err(Error::NegZeroBalance(balance));
        }

        Ok(Self {
            balance,
            fees: 0.0,
            history: vec![balance],
            initial_balance: balance,
        })
    }

    /// Returns the initial balance.
    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Returns the balance.
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Returns the recorded balances.
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    /// Returns the transaction costs paid.
    pub fn fees_paid(&self) -> f64 {
        self.fees
    }

    /// Applies a closed position to the balance.
    ///
    /// `cost` is subtracted from the unleveraged return before leverage scales it.
    /// Returns the new balance, floored at zero; the caller decides what zero means.
    pub(crate) fn settle(&mut self, gross_return: f64, cost: f64, leverage: f64) -> f64 {
        let exposure = self.balance * leverage;
        self.fees += exposure * cost;
        self.balance = (self.balance + exposure * (gross_return - cost)).max(0.0);
        self.balance
    }

    /// Appends the current balance to the history.
    pub(crate) fn record(&mut self) {
        self.history.push(self.balance);
    }

    /// Resets the wallet to its initial balance.
    pub(crate) fn reset(&mut self) {
        self.fees = 0.0;
        self.balance = self.initial_balance;
        self.history = vec![self.initial_balance];
    }
}

#[cfg(test)]
#[test]
fn new_wallet_valid_balance() {
    let wallet = Wallet::new(100.0).unwrap();
    assert_eq!(wallet.balance(), 100.0);
    assert_eq!(wallet.history(), &[100.0]);
}

#[cfg(test)]
#[test]
fn new_wallet_invalid_balance() {
    let result = Wallet::new(0.0);
    assert!(matches!(result, Err(Error::NegZeroBalance(_))));

    let result = Wallet::new(-10.0);
    assert!(matches!(result, Err(Error::NegZeroBalance(_))));
}

#[cfg(test)]
#[test]
fn settle_profit_without_costs() {
    let mut wallet = Wallet::new(100.0).unwrap();
    assert_eq!(wallet.settle(0.5, 0.0, 1.0), 150.0);
    assert_eq!(wallet.fees_paid(), 0.0);
}

#[cfg(test)]
#[test]
fn settle_subtracts_cost_before_leverage() {
    let mut wallet = Wallet::new(1000.0).unwrap();
    // (0.1 - 0.02) * 3 * 1000
    let balance = wallet.settle(0.1, 0.02, 3.0);
    assert!((balance - 1240.0).abs() < 1e-9);
    assert!((wallet.fees_paid() - 60.0).abs() < 1e-9);
}

#[cfg(test)]
#[test]
fn settle_floors_the_balance_at_zero() {
    let mut wallet = Wallet::new(1000.0).unwrap();
    // -0.3 * 5 wipes out more than the balance
    assert_eq!(wallet.settle(-0.3, 0.0, 5.0), 0.0);
    assert_eq!(wallet.balance(), 0.0);
}

#[cfg(test)]
#[test]
fn record_and_reset() {
    let mut wallet = Wallet::new(100.0).unwrap();
    wallet.settle(-0.1, 0.0, 1.0);
    wallet.record();
    assert_eq!(wallet.history(), &[100.0, 90.0]);

    wallet.reset();
    assert_eq!(wallet.balance(), 100.0);
    assert_eq!(wallet.history(), &[100.0]);
    assert_eq!(wallet.fees_paid(), 0.0);
}
