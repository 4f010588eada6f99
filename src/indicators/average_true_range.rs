use chrono::{DateTime, Utc};

use crate::{
    engine::{Bar, BucketSeries, FieldValue},
    indicators::{Calculate, Indicator, Values, Wilder},
};

/// Average true range with Wilder smoothing, committed per bucket like [`RelativeStrength`].
///
/// [`RelativeStrength`]: crate::indicators::RelativeStrength
#[derive(Debug, Clone)]
pub struct AverageTrueRange {
    name: String,
    interval: usize,
    range: Wilder,
    prev_close: Option<f64>,
    pending: Option<(DateTime<Utc>, Bar)>,
    values: Values,
}

/// Largest of the bar range and the gaps from the previous close.
pub fn true_range(bar: &Bar, prev_close: Option<f64>) -> f64 {
    let range = bar.high - bar.low;
    match prev_close {
        None => range,
        Some(prev) => range.max((bar.high - prev).abs()).max((bar.low - prev).abs()),
    }
}

impl AverageTrueRange {
    /// Creates an ATR smoothed over `interval` bars.
    pub fn new(name: impl Into<String>, interval: usize) -> Self {
        Self {
            name: name.into(),
            interval,
            range: Wilder::new(interval),
            prev_close: None,
            pending: None,
            values: Values::default(),
        }
    }

    /// Smoothing period.
    pub fn interval(&self) -> usize {
        self.interval
    }
}

impl Indicator for AverageTrueRange {
    fn name(&self) -> &str {
        &self.name
    }

    fn values(&self) -> &Values {
        &self.values
    }
}

impl Calculate for AverageTrueRange {
    fn calculate(&mut self, series: &BucketSeries) -> &mut Self {
        let Some(point) = series.last() else {
            return self;
        };
        if let Some((time, bar)) = self.pending {
            if time != point.time {
                self.range.next(true_range(&bar, self.prev_close));
                self.prev_close = Some(bar.close);
            }
        }
        self.pending = Some((point.time, point.bar));

        let value = self.range.peek(true_range(&point.bar, self.prev_close));
        self.values.record(&self.name, point, FieldValue::Scalar(value));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Point;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn run(prices: &[(i64, f64)], interval: usize) -> AverageTrueRange {
        let mut series = BucketSeries::new(Duration::from_secs(60)).unwrap();
        let mut atr = AverageTrueRange::new("atr", interval);
        for (secs, price) in prices {
            let time = DateTime::from_timestamp(*secs, 0).unwrap();
            series.add(&Point::quote(time, *price, 1.0, *price, 1.0));
            atr.calculate(&series);
        }
        atr
    }

    #[test]
    fn true_range_uses_gaps() {
        let bar = Bar::from((10.0, 11.0, 9.0, 10.5, 0.0));
        assert_eq!(true_range(&bar, None), 2.0);
        assert_eq!(true_range(&bar, Some(14.0)), 5.0);
        assert_eq!(true_range(&bar, Some(6.0)), 5.0);
    }

    #[test]
    fn forming_bar_widens_range() {
        let atr = run(&[(0, 10.0), (30, 12.0)], 3);
        assert_relative_eq!(atr.last(), 2.0);
        assert_eq!(atr.values().len(), 2);
    }

    #[test]
    fn smoothed_over_bars() {
        // bar ranges: 2, then gap 12 -> 15 = 3, then flat 15 = 0
        let atr = run(&[(0, 10.0), (30, 12.0), (60, 15.0), (120, 15.0)], 2);
        let expected = ((2.0 + 3.0) / 2.0 + 0.0) / 2.0;
        assert_relative_eq!(atr.last(), expected);
    }
}
