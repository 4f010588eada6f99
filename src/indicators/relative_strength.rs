use chrono::{DateTime, Utc};

use crate::{
    engine::{BucketSeries, FieldValue},
    indicators::{Calculate, Indicator, Values, Wilder},
};

/// Relative strength index with Wilder smoothing.
///
/// Bar closes are committed when the next bucket starts. Until then the forming bar yields a
/// provisional value, so merges never disturb the committed averages and no history is rescanned.
#[derive(Debug, Clone)]
pub struct RelativeStrength {
    name: String,
    interval: usize,
    gain: Wilder,
    loss: Wilder,
    prev_close: Option<f64>,
    // forming bucket and its latest close
    pending: Option<(DateTime<Utc>, f64)>,
    values: Values,
}

impl RelativeStrength {
    /// Creates an RSI smoothed over `interval` bars.
    pub fn new(name: impl Into<String>, interval: usize) -> Self {
        Self {
            name: name.into(),
            interval,
            gain: Wilder::new(interval),
            loss: Wilder::new(interval),
            prev_close: None,
            pending: None,
            values: Values::default(),
        }
    }

    /// Smoothing period.
    pub fn interval(&self) -> usize {
        self.interval
    }

    fn commit(&mut self, close: f64) {
        if let Some(prev) = self.prev_close {
            let change = close - prev;
            self.gain.next(change.max(0.0));
            self.loss.next((-change).max(0.0));
        }
        self.prev_close = Some(close);
    }

    fn provisional(&self, close: f64) -> f64 {
        match self.prev_close {
            None => 50.0,
            Some(prev) => {
                let change = close - prev;
                rsi(self.gain.peek(change.max(0.0)), self.loss.peek((-change).max(0.0)))
            }
        }
    }
}

fn rsi(gain: f64, loss: f64) -> f64 {
    if gain == 0.0 && loss == 0.0 {
        50.0
    } else if loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + gain / loss)
    }
}

impl Indicator for RelativeStrength {
    fn name(&self) -> &str {
        &self.name
    }

    fn values(&self) -> &Values {
        &self.values
    }
}

impl Calculate for RelativeStrength {
    fn calculate(&mut self, series: &BucketSeries) -> &mut Self {
        let Some(point) = series.last() else {
            return self;
        };
        if let Some((time, close)) = self.pending {
            if time != point.time {
                self.commit(close);
            }
        }
        self.pending = Some((point.time, point.bar.close));

        let value = self.provisional(point.bar.close);
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

    fn run(prices: &[(i64, f64)], interval: usize) -> (BucketSeries, RelativeStrength) {
        let mut series = BucketSeries::new(Duration::from_secs(60)).unwrap();
        let mut rsi = RelativeStrength::new("rsi", interval);
        for (secs, price) in prices {
            let time = DateTime::from_timestamp(*secs, 0).unwrap();
            series.add(&Point::quote(time, *price, 1.0, *price, 1.0));
            rsi.calculate(&series);
        }
        (series, rsi)
    }

    #[test]
    fn neutral_without_history() {
        let (_, rsi) = run(&[(0, 10.0)], 14);
        assert_eq!(rsi.last(), 50.0);
    }

    #[test]
    fn rising_closes_saturate() {
        let (_, rsi) = run(&[(0, 10.0), (60, 11.0), (120, 12.0)], 14);
        assert_eq!(rsi.last(), 100.0);
    }

    #[test]
    fn falling_closes_bottom_out() {
        let (_, rsi) = run(&[(0, 10.0), (60, 9.0), (120, 8.0)], 14);
        assert_eq!(rsi.last(), 0.0);
    }

    #[test]
    fn wilder_values() {
        let (_, rsi) = run(&[(0, 10.0), (60, 12.0), (120, 11.0), (180, 13.0)], 2);
        // gains 2, 0, 2 and losses 0, 1, 0 smoothed over 2 bars
        let gain = ((2.0 + 0.0) / 2.0 + 2.0) / 2.0;
        let loss = ((0.0 + 1.0) / 2.0 + 0.0) / 2.0;
        assert_relative_eq!(rsi.last(), 100.0 - 100.0 / (1.0 + gain / loss));
    }

    #[test]
    fn forming_bar_is_provisional() {
        let merged = run(&[(0, 10.0), (60, 20.0), (70, 12.0), (120, 11.0)], 2);
        let direct = run(&[(0, 10.0), (60, 12.0), (120, 11.0)], 2);
        assert_relative_eq!(merged.1.last(), direct.1.last());
        assert_eq!(merged.1.values().len(), 4);
    }
}
