use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// OHLCV summary of the ticks that fell into one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// First price of the bucket.
    pub open: f64,
    /// Highest price of the bucket.
    pub high: f64,
    /// Lowest price of the bucket.
    pub low: f64,
    /// Latest price of the bucket.
    pub close: f64,
    /// Accumulated volume.
    pub volume: f64,
}

impl From<(f64, f64, f64, f64, f64)> for Bar {
    fn from((open, high, low, close, volume): (f64, f64, f64, f64, f64)) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl Bar {
    /// A bar where open, high, low and close are all `price`.
    pub fn flat(price: f64, volume: f64) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// Folds one more trade price into the bar. `open` never changes.
    pub fn merge(&mut self, price: f64, volume: f64) {
        self.close = price;
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.volume += volume;
    }
}

/// Payload of a field attached to a point by an indicator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Single number (moving average, oscillator level, cumulative total).
    Scalar(f64),
    /// OHLC result (equity curve with its peak and trough).
    Bar(Bar),
}

impl FieldValue {
    /// The headline number: the scalar itself or the bar close.
    pub fn value(&self) -> f64 {
        match self {
            Self::Scalar(value) => *value,
            Self::Bar(bar) => bar.close,
        }
    }
}

/// A derived value stamped with the instant and timeframe it was computed for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    /// Time of the source point.
    pub time: DateTime<Utc>,
    /// Timeframe of the series the source point belongs to.
    pub timeframe: Duration,
    /// The computed result.
    pub value: FieldValue,
}

/// Concurrent map from indicator name to the value it attached.
///
/// Cloning the store clones the handle: every clone of a [`Point`] sees the same entries.
#[derive(Debug, Clone, Default)]
pub struct FieldStore(Arc<DashMap<String, Field>>);

impl FieldStore {
    /// Attaches or overwrites the field published under `name`.
    pub fn insert(&self, name: impl Into<String>, field: Field) {
        self.0.insert(name.into(), field);
    }

    /// Returns a copy of the field under `name`.
    pub fn get(&self, name: &str) -> Option<Field> {
        self.0.get(name).map(|entry| *entry.value())
    }

    /// Whether a field has been attached under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Names of every attached field, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of attached fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been attached yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One market observation (a parsed tick) or one bucket of a series.
#[derive(Debug, Clone, Default)]
pub struct Point {
    /// Tick instant, or bucket start for series points.
    pub time: DateTime<Utc>,
    /// Best bid.
    pub bid: f64,
    /// Size available at the bid.
    pub bid_size: f64,
    /// Best ask.
    pub ask: f64,
    /// Size available at the ask.
    pub ask_size: f64,
    /// Last traded or computed value, `0.0` when unknown.
    pub last: f64,
    /// Bar summary.
    pub bar: Bar,
    /// Series name.
    pub name: String,
    /// Owning instrument name.
    pub instrument: String,
    /// Owning account name.
    pub account: String,
    /// Chart area the point belongs to.
    pub chart: String,
    /// Width of the bucket the point represents.
    pub timeframe: Duration,
    /// Bumped every time the bucket is created or merged into.
    pub revision: u64,
    fields: FieldStore,
}

impl Point {
    /// Builds a quote tick.
    pub fn quote(time: DateTime<Utc>, bid: f64, bid_size: f64, ask: f64, ask_size: f64) -> Self {
        Self {
            time,
            bid,
            bid_size,
            ask,
            ask_size,
            ..Default::default()
        }
    }

    /// Builds a point carrying a single computed value, as stored in indicator histories.
    pub fn value(time: DateTime<Utc>, timeframe: Duration, value: f64) -> Self {
        Self {
            time,
            timeframe,
            last: value,
            bar: Bar::flat(value, 0.0),
            ..Default::default()
        }
    }

    /// Reference price of the point.
    ///
    /// `last` when set, otherwise the mid of a two-sided quote, otherwise whichever side is quoted.
    pub fn price(&self) -> f64 {
        if self.last != 0.0 {
            self.last
        } else if self.bid > 0.0 && self.ask > 0.0 {
            (self.bid + self.ask) / 2.0
        } else {
            self.bid.max(self.ask)
        }
    }

    /// Volume carried by a tick: its bar volume, or the quoted sizes for pure quotes.
    pub fn volume(&self) -> f64 {
        if self.bar.volume > 0.0 {
            self.bar.volume
        } else {
            self.bid_size + self.ask_size
        }
    }

    /// Price a buy order would trade at.
    pub fn buy_price(&self) -> f64 {
        if self.ask > 0.0 { self.ask } else { self.price() }
    }

    /// Price a sell order would trade at.
    pub fn sell_price(&self) -> f64 {
        if self.bid > 0.0 { self.bid } else { self.price() }
    }

    /// Extensible fields attached by indicators.
    pub fn fields(&self) -> &FieldStore {
        &self.fields
    }

    /// Shorthand for the headline value attached under `name`.
    pub fn field_value(&self, name: &str) -> Option<f64> {
        self.fields.get(name).map(|field| field.value.value())
    }

    /// Attaches `value` under `name`, stamped with this point's time and timeframe.
    pub fn attach(&self, name: &str, value: FieldValue) -> Field {
        let field = Field {
            time: self.time,
            timeframe: self.timeframe,
            value,
        };
        self.fields.insert(name, field);
        field
    }

    /// Copy of the point with a fresh, empty field store.
    pub fn detached(&self) -> Self {
        Self {
            fields: FieldStore::default(),
            ..self.clone()
        }
    }
}
