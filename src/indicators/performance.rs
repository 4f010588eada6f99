use crate::{
    engine::{Account, Bar, BucketSeries, FieldValue},
    indicators::{Indicator, Values},
};

/// Running equity of one or more accounts.
///
/// Each value is a bar: `open` is the combined initial balance, `high`/`low` the best and worst
/// equity seen so far, `close` the current equity (balances plus unrealized gain/loss).
#[derive(Debug, Clone)]
pub struct Performance {
    name: String,
    peak: f64,
    trough: f64,
    values: Values,
}

impl Performance {
    /// Creates the indicator.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            peak: f64::NEG_INFINITY,
            trough: f64::INFINITY,
            values: Values::default(),
        }
    }

    /// Records the equity of `accounts` on the latest point of `series`.
    pub fn calculate(&mut self, series: &BucketSeries, accounts: &[&Account]) -> &mut Self {
        let Some(point) = series.last() else {
            return self;
        };
        let initial: f64 = accounts.iter().map(|account| account.initial_balance()).sum();
        let equity: f64 = accounts.iter().map(|account| account.equity()).sum();
        self.peak = self.peak.max(equity);
        self.trough = self.trough.min(equity);

        let bar = Bar::from((initial, self.peak, self.trough, equity, 0.0));
        self.values.record(&self.name, point, FieldValue::Bar(bar));
        self
    }

    /// Largest peak-to-trough equity drop seen so far, as a fraction of the peak.
    pub fn drawdown(&self) -> f64 {
        let mut peak = f64::NEG_INFINITY;
        let mut worst: f64 = 0.0;
        for point in self.values.iter() {
            let equity = point.bar.close;
            peak = peak.max(equity);
            if peak > 0.0 {
                worst = worst.max((peak - equity) / peak);
            }
        }
        worst
    }
}

impl Indicator for Performance {
    fn name(&self) -> &str {
        &self.name
    }

    fn values(&self) -> &Values {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Instrument, OrderSide, Point};
    use approx::assert_relative_eq;
    use chrono::DateTime;
    use std::time::Duration;

    #[test]
    fn tracks_equity_range() {
        let mut series = BucketSeries::new(Duration::from_secs(60)).unwrap();
        let instrument = Instrument::new("GOOG", Duration::from_secs(60)).unwrap();
        let mut account = Account::new("demo", 1_000.0).unwrap().with_instrument(instrument);
        let id = account.place((OrderSide::Buy, 10.0, "GOOG").into());
        account.fill(id, 10.0, DateTime::default()).unwrap();

        let mut performance = Performance::new("perf");
        for (secs, price) in [(0, 10.0), (60, 15.0), (120, 5.0), (180, 12.0)] {
            series.add(&Point::quote(DateTime::from_timestamp(secs, 0).unwrap(), price, 1.0, price, 1.0));
            account.mark("GOOG", price);
            performance.calculate(&series, &[&account]);
        }

        let bar = performance.values().last().unwrap().bar;
        assert_eq!(bar.open, 1_000.0);
        assert_eq!(bar.high, 1_050.0);
        assert_eq!(bar.low, 950.0);
        assert_eq!(bar.close, 1_020.0);
        assert_eq!(performance.last(), 1_020.0);
        assert_relative_eq!(performance.drawdown(), 100.0 / 1_050.0);
        assert!(matches!(
            series.last().unwrap().fields().get("perf").map(|f| f.value),
            Some(FieldValue::Bar(_))
        ));
    }

    #[test]
    fn empty_series_is_noop() {
        let series = BucketSeries::new(Duration::from_secs(60)).unwrap();
        let account = Account::new("demo", 1.0).unwrap();
        let mut performance = Performance::new("perf");
        assert!(performance.calculate(&series, &[&account]).values().is_empty());
    }
}
