//! Strategy parameter optimization.
//!
//! This module sweeps strategy parameters over the same candles.
//! The `Optimizer` struct runs one backtest per combination in parallel, while the
//! `ParameterCombination` trait defines how to generate parameter sets.
//! A combination that ends in a liquidation is kept in the results and flagged as such.

use std::{cmp::Ordering, marker::PhantomData, sync::Arc};

use crate::{
    engine::{Backtest, Candle, Config},
    errors::{Error, Result},
    metrics::max_drawdown,
};

use rayon::prelude::*;

/// Trait defining how to generate parameter combinations for optimization.
///
/// Implement this trait for your parameter types to define how combinations should be generated.
/// The associated type `Output` represents a single parameter combination (e.g., `(k, stop_loss)`).
pub trait ParameterCombination: Sync {
    /// Type representing a single parameter combination (e.g., `(f64, f64)`).
    type Output: Clone + Send + Sync;

    /// Generates all possible parameter combinations to test.
    ///
    /// # Returns
    /// A vector containing all parameter combinations.
    fn generate() -> Vec<Self::Output>;
}

/// Result of one backtest in a sweep.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<P> {
    /// The parameter combination.
    pub parameters: P,
    /// Balance when the run ended.
    pub final_balance: f64,
    /// Max drawdown of the balance history.
    pub max_drawdown: f64,
    /// Number of opened positions.
    pub trade_count: usize,
    /// The run ended with a liquidation.
    pub liquidated: bool,
}

/// What a sweep is ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Smallest drawdown first.
    MinDrawdown,
    /// Highest final balance first.
    MaxBalance,
}

/// Sorts `outcomes` best first. Liquidated runs always come last.
pub fn rank<P>(outcomes: &mut [Outcome<P>], objective: Objective) {
    outcomes.sort_by(|a, b| {
        a.liquidated.cmp(&b.liquidated).then_with(|| {
            let (x, y) = match objective {
                Objective::MinDrawdown => (b.max_drawdown, a.max_drawdown),
                Objective::MaxBalance => (b.final_balance, a.final_balance),
            };
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        })
    });
}

/// Optimizer for testing the breakout strategy with different parameter combinations.
#[derive(Debug, Clone)]
pub struct Optimizer<PC: ParameterCombination> {
    data: Arc<[Candle]>,
    config: Config,
    _marker: PhantomData<PC>,
}

impl<PC: ParameterCombination> From<&Backtest> for Optimizer<PC> {
    fn from(value: &Backtest) -> Self {
        Self {
            _marker: PhantomData,
            data: value.candles().cloned().collect(),
            config: value.config().clone(),
        }
    }
}

impl<PC: ParameterCombination> Optimizer<PC> {
    /// Creates a new `Optimizer` with the given data and base configuration.
    ///
    /// # Arguments
    /// * `data` - Historical candle data for backtesting.
    /// * `config` - Configuration each combination starts from.
    pub fn new(data: impl Into<Arc<[Candle]>>, config: Config) -> Self {
        Self {
            config,
            data: data.into(),
            _marker: PhantomData,
        }
    }

    /// Runs one backtest per parameter combination.
    ///
    /// # Arguments
    /// * `combinator` - Function that applies a parameter combination to the base configuration.
    ///
    /// # Returns
    /// One outcome per combination, in generation order.
    ///
    /// # Errors
    /// Returns an error if a combination yields an invalid configuration, or if the data is rejected.
    ///
    /// # Example
    /// ```rust
    /// use vbo_rs::prelude::*;
    /// use chrono::{DateTime, Duration};
    ///
    /// struct K;
    ///
    /// impl ParameterCombination for K {
    ///     type Output = f64;
    ///
    ///     fn generate() -> Vec<f64> {
    ///         vec![0.2, 0.5, 0.8]
    ///     }
    /// }
    ///
    /// let start = DateTime::from_timestamp_millis(1_609_459_200_000).unwrap();
    /// let candles = (0..10)
    ///     .map(|day| {
    ///         CandleBuilder::builder()
    ///             .symbol("BTCUSDT")
    ///             .open(100.0)
    ///             .high(105.0 + day as f64)
    ///             .low(95.0)
    ///             .close(101.0)
    ///             .open_time(start + Duration::days(day))
    ///             .build()
    ///             .unwrap()
    ///     })
    ///     .collect::<Vec<_>>();
    ///
    /// let optimizer = Optimizer::<K>::new(candles, Config::default());
    /// let mut outcomes = optimizer.with(|&k, config| Ok(config.clone().with_k(k))).unwrap();
    /// rank(&mut outcomes, Objective::MinDrawdown);
    /// assert_eq!(outcomes.len(), 3);
    /// ```
    pub fn with<C>(&self, combinator: C) -> Result<Vec<Outcome<PC::Output>>>
    where
        C: Fn(&PC::Output, &Config) -> Result<Config> + Sync,
    {
        let num_cpus = num_cpus::get();
        let combinations = PC::generate();
        let chunk_size = combinations.len().div_ceil(num_cpus).max(1);

        let outcomes = combinations
            .par_chunks(chunk_size)
            .map::<_, Result<_>>(|par_combinations| {
                let mut local_results = Vec::with_capacity(par_combinations.len());

                for param_set in par_combinations {
                    let config = combinator(param_set, &self.config)?;
                    let mut backtest = Backtest::new(Arc::clone(&self.data), config)?;
                    let liquidated = match backtest.run() {
                        Ok(_) => false,
                        Err(Error::Liquidated(_)) => true,
                        Err(e) => return Err(e),
                    };

                    local_results.push(Outcome {
                        parameters: param_set.clone(),
                        final_balance: backtest.balance(),
                        max_drawdown: max_drawdown(backtest.balance_history())?,
                        trade_count: backtest.trade_count(),
                        liquidated,
                    });
                }

                Ok(local_results)
            })
            .collect::<Result<Vec<_>>>()
            .map(|chunks| chunks.into_iter().flatten().collect::<Vec<_>>())?;

        tracing::info!(combinations = outcomes.len(), "optimization completed");
        Ok(outcomes)
    }
}
