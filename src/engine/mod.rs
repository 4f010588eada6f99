//! Core market data and ledger types.
//!
//! This module provides:
//! - `Point`: a tick or a bucket, with its extensible field store.
//! - `BucketSeries`: fixed-width time buckets for one timeframe.
//! - `Instrument`: an instrument and its series per timeframe.
//! - `Order`, `Position`, `Account`: the order/position ledger.

mod account;
mod instrument;
mod order;
mod point;
mod position;
mod series;

pub use account::*;
pub use instrument::*;
pub use order::*;
pub use point::*;
pub use position::*;
pub use series::*;
