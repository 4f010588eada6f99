//! Incremental indicators computed over bucket series.
//!
//! Every indicator follows the same steps on each call:
//! 1. read the latest point of the series (no point, no change),
//! 2. compute its value,
//! 3. attach it to the point's field store under the indicator name,
//! 4. push a copy onto its own [`Values`],
//! 5. return itself for chaining.

mod average_true_range;
mod imbalance;
mod moving_average;
mod performance;
mod relative_strength;
mod wilder;

pub use average_true_range::*;
pub use imbalance::*;
pub use moving_average::*;
pub use performance::*;
pub use relative_strength::*;
pub use wilder::*;

use crate::engine::{Account, BucketSeries, FieldValue, Point};

/// Output history of an indicator, one point per calculation, oldest first.
#[derive(Debug, Clone, Default)]
pub struct Values(Vec<Point>);

impl Values {
    /// Number of calculations recorded.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been calculated yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value at `index`, `None` when out of range.
    pub fn get(&self, index: usize) -> Option<&Point> {
        self.0.get(index)
    }

    /// Latest value.
    pub fn last(&self) -> Option<&Point> {
        self.0.last()
    }

    /// Iterates values oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.0.iter()
    }

    /// Attaches `value` to `point` under `name` and records a copy.
    pub(crate) fn record(&mut self, name: &str, point: &Point, value: FieldValue) -> f64 {
        point.attach(name, value);
        self.push(name, point, value)
    }

    /// Records `value` stamped like `point`, without touching its fields.
    pub(crate) fn push(&mut self, name: &str, point: &Point, value: FieldValue) -> f64 {
        let mut entry = Point::value(point.time, point.timeframe, value.value());
        if let FieldValue::Bar(bar) = value {
            entry.bar = bar;
        }
        entry.name = name.to_string();
        entry.instrument = point.instrument.clone();
        entry.account = point.account.clone();
        entry.chart = point.chart.clone();
        entry.revision = point.revision;
        self.0.push(entry);
        value.value()
    }
}

/// Read side shared by every indicator.
pub trait Indicator {
    /// Name the indicator publishes its field under.
    fn name(&self) -> &str;

    /// Output history.
    fn values(&self) -> &Values;

    /// Most recent result, `0.0` before the first calculation. Defaults to the close of the
    /// latest value.
    fn last(&self) -> f64 {
        self.values().last().map_or(0.0, |point| point.bar.close)
    }
}

/// Indicators that only need the series they run on.
pub trait Calculate: Indicator {
    /// Updates the indicator from the latest point of `series`.
    fn calculate(&mut self, series: &BucketSeries) -> &mut Self;
}

/// Any of the built-in indicators, for config-driven pipelines.
#[derive(Debug, Clone)]
pub enum AnyIndicator {
    MovingAverage(MovingAverage),
    Imbalance(Imbalance),
    RelativeStrength(RelativeStrength),
    AverageTrueRange(AverageTrueRange),
    Performance(Performance),
}

impl AnyIndicator {
    /// Runs the wrapped indicator. `accounts` is only read by [`Performance`].
    pub fn calculate(&mut self, series: &BucketSeries, accounts: &[&Account]) -> f64 {
        match self {
            Self::MovingAverage(indicator) => indicator.calculate(series).last(),
            Self::Imbalance(indicator) => indicator.calculate(series).last(),
            Self::RelativeStrength(indicator) => indicator.calculate(series).last(),
            Self::AverageTrueRange(indicator) => indicator.calculate(series).last(),
            Self::Performance(indicator) => indicator.calculate(series, accounts).last(),
        }
    }

    fn inner(&self) -> &dyn Indicator {
        match self {
            Self::MovingAverage(indicator) => indicator,
            Self::Imbalance(indicator) => indicator,
            Self::RelativeStrength(indicator) => indicator,
            Self::AverageTrueRange(indicator) => indicator,
            Self::Performance(indicator) => indicator,
        }
    }
}

impl Indicator for AnyIndicator {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn values(&self) -> &Values {
        self.inner().values()
    }

    fn last(&self) -> f64 {
        self.inner().last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Account, BucketSeries};
    use chrono::DateTime;
    use std::time::Duration;

    #[test]
    fn any_indicator_dispatches() {
        let mut series = BucketSeries::new(Duration::from_secs(60)).unwrap();
        let tick = Point::quote(DateTime::from_timestamp(0, 0).unwrap(), 10.0, 1.0, 12.0, 3.0);
        series.add(&tick);

        let account = Account::new("demo", 100.0).unwrap();
        let mut indicators = vec![
            AnyIndicator::MovingAverage(MovingAverage::new("ma", 0, MovingAverageMode::Close)),
            AnyIndicator::Imbalance(Imbalance::new("imb", ImbalanceDirection::Net)),
            AnyIndicator::Performance(Performance::new("perf")),
        ];
        let results: Vec<f64> = indicators
            .iter_mut()
            .map(|indicator| indicator.calculate(&series, &[&account]))
            .collect();

        assert_eq!(results, vec![11.0, 2.0, 100.0]);
        assert_eq!(indicators[1].name(), "imb");
        assert_eq!(indicators[2].values().len(), 1);

        let point = series.last().unwrap();
        assert_eq!(point.fields().names(), vec!["imb", "ma", "perf"]);
    }

    #[test]
    fn any_indicator_reports_moving_average_result() {
        let mut series = BucketSeries::new(Duration::from_secs(60)).unwrap();
        let account = Account::new("demo", 100.0).unwrap();
        let mut ma = AnyIndicator::MovingAverage(MovingAverage::new("ma", 2, MovingAverageMode::Close));
        for (secs, price) in [(0, 3.0), (60, 6.0)] {
            series.add(&Point::quote(DateTime::from_timestamp(secs, 0).unwrap(), price, 1.0, price, 1.0));
            ma.calculate(&series, &[&account]);
        }
        // (3 + 6*2) / 3
        assert_eq!(ma.last(), 5.0);
        assert_eq!(ma.values().last().unwrap().bar.close, 6.0);
    }

    #[test]
    fn record_copies_identity() {
        let mut point = Point::value(DateTime::default(), Duration::from_secs(60), 1.0);
        point.instrument = "GOOG".into();
        point.revision = 7;

        let mut values = Values::default();
        assert_eq!(values.record("x", &point, FieldValue::Scalar(4.0)), 4.0);
        let entry = values.last().unwrap();
        assert_eq!(entry.name, "x");
        assert_eq!(entry.instrument, "GOOG");
        assert_eq!(entry.revision, 7);
        assert_eq!(entry.bar.close, 4.0);
        assert_eq!(point.field_value("x"), Some(4.0));
    }
}
