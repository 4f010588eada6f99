//! # tickflow: ticks to bars to indicators to orders
//!
//! **tickflow** is a Rust library for building trading engines on top of a stream of market ticks.
//! It groups ticks into fixed-width time buckets, runs incremental indicators over them, and routes
//! the orders a decision layer emits through a gateway into an account ledger.
//!
//! ## Why tickflow?
//! - **Incremental**: every indicator updates in O(1) per tick, without rescanning history.
//! - **Deterministic**: subscribers are called synchronously, in subscription order.
//! - **Safe teardown**: one cancellation token closes every subscription and the order stream.
//! - **Pluggable**: tick sources, validators, error sinks and venues are traits.
//!
//! ## Core Components
//! | Component          | Description                                                                          |
//! |--------------------|--------------------------------------------------------------------------------------|
//! | **`Point`**        | A tick or a bucket, with a concurrent field store indicators write into.             |
//! | **`BucketSeries`** | Fixed-width time buckets for one instrument and one timeframe.                       |
//! | **`Instrument`**   | An instrument and its series per timeframe.                                          |
//! | **Indicators**     | Moving average, imbalance, RSI, ATR and performance, sharing one `Calculate` trait.  |
//! | **`Gateway`**      | Ticks in, bucket events out, order intents validated and filled.                     |
//! | **`Account`**      | Balance, orders and positions, netted per instrument.                                |
//! | **`Statement`**    | Drawdown, profit factor, Sharpe ratio, win rate and total return.                    |
//!
//! ## Getting Started
//! ```rust
//! use std::{sync::Arc, time::Duration};
//!
//! use parking_lot::Mutex;
//! use tickflow::prelude::*;
//!
//! let instrument = Instrument::new("GOOG", Duration::from_secs(60)).unwrap();
//! let account = Account::new("demo", 10_000.0).unwrap().with_instrument(instrument);
//! let mut gateway = Gateway::new(GatewayConfig::default(), account);
//!
//! let ma = Arc::new(Mutex::new(MovingAverage::new("ma", 3, MovingAverageMode::Close)));
//! let handle = ma.clone();
//! gateway
//!     .on_bucket(move |event: &BucketEvent<'_>| {
//!         let last = handle.lock().calculate(event.series).last();
//!         if last > 100.0 && event.account.position("GOOG").is_none() {
//!             let order: Order = (OrderSide::Buy, 1.0, "GOOG").into();
//!             event.orders.submit(order).unwrap();
//!         }
//!     })
//!     .unwrap();
//!
//! let ticks = ["0 99 1 100 1", "60 101 1 102 1", "120 103 1 104 1"];
//! let processed = gateway.run(&mut LineSource::new("GOOG", ticks.into_iter())).unwrap();
//! assert_eq!(processed, 3);
//! assert_eq!(ma.lock().values().len(), 3);
//! ```
//!
//! ## Tick records
//! Replay sources read one tick per line: `<unix_epoch_seconds> <bid> <bid_size> <ask> <ask_size>`.
//! Fields that are missing or not numbers become `0`.
//!
//! ## Error Handling
//! Nothing on the tick path is fatal:
//! - Unparsable fields default to zero.
//! - Invalid order batches are rejected and each problem goes to the gateway's `ErrorSink`.
//! - Indicators without input keep their previous state.
//!
//! Misuse that cannot be recovered (zero timeframe, unreadable tick file, bad config) surfaces as
//! [`errors::Error`].
//!
//! ## License
//! MIT

/// Market data and ledger types: points, bucket series, instruments, orders, positions, accounts.
pub mod engine;

/// Error types for the library.
pub mod errors;

/// Incremental indicators over bucket series.
pub mod indicators;

/// Gateway pipeline: tick sources, bucket events, order intents, cancellation.
pub mod gateway;

/// Utility functions and helpers.
mod utils;

/// Account statement and performance metrics: drawdown, Sharpe ratio, win rate, etc.
#[cfg(feature = "metrics")]
pub mod metrics;

/// Re-exports of commonly used types and traits for convenience.
pub mod prelude {
    pub use super::*;
    pub use crate::engine::*;
    pub use crate::errors::*;
    pub use crate::gateway::*;
    pub use crate::indicators::*;

    #[cfg(feature = "metrics")]
    pub use crate::metrics::*;
}

/// Percentage helpers on prices and balances.
pub trait PercentCalculus {
    /// `percent` % of `self`, e.g. `200.0.how_many(1.5) == 3.0`.
    fn how_many(self, percent: Self) -> Self;

    /// Change from `self` to `new`, in percent of `self`.
    fn change(self, new: Self) -> Self;
}

impl PercentCalculus for f64 {
    fn how_many(self, percent: Self) -> Self {
        self * percent / 100.0
    }

    fn change(self, new: Self) -> Self {
        (new - self) / self * 100.0
    }
}

#[cfg(test)]
mod percent {
    use super::*;

    #[test]
    fn share_of_balance() {
        assert_eq!(200.0.how_many(1.5), 3.0);
        assert_eq!(100.0.how_many(0.0), 0.0);
    }

    #[test]
    fn change_up_and_down() {
        assert_eq!(100.0.change(110.0), 10.0);
        assert_eq!(200.0.change(150.0), -25.0);
    }
}
