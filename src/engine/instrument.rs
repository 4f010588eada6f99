use std::{collections::BTreeMap, time::Duration};

use crate::{
    engine::{BucketSeries, BucketUpdate, Point},
    errors::Result,
};

/// A tradable instrument and the series it maintains, one per active timeframe.
#[derive(Debug, Clone)]
pub struct Instrument {
    name: String,
    chart: String,
    commission: f64,
    timeframe: Duration,
    series: BTreeMap<Duration, BucketSeries>,
}

impl Instrument {
    /// Creates an instrument with its primary timeframe.
    pub fn new(name: impl Into<String>, timeframe: Duration) -> Result<Self> {
        let name = name.into();
        let mut series = BTreeMap::new();
        series.insert(timeframe, BucketSeries::new(timeframe)?);
        Ok(Self {
            chart: name.clone(),
            name,
            commission: 0.0,
            timeframe,
            series,
        })
    }

    /// Adds a secondary timeframe. Every timeframe sees every tick and buckets independently.
    pub fn with_timeframe(mut self, timeframe: Duration) -> Result<Self> {
        if !self.series.contains_key(&timeframe) {
            self.series.insert(timeframe, BucketSeries::new(timeframe)?);
        }
        Ok(self)
    }

    /// Sets the commission charged per unit traded.
    pub fn with_commission(mut self, commission: f64) -> Self {
        self.commission = commission;
        self
    }

    /// Sets the chart area label.
    pub fn with_chart(mut self, chart: impl Into<String>) -> Self {
        self.chart = chart.into();
        self
    }

    /// Instrument name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Chart area label.
    pub fn chart(&self) -> &str {
        &self.chart
    }

    /// Commission per unit traded.
    pub fn commission(&self) -> f64 {
        self.commission
    }

    /// Primary timeframe.
    pub fn timeframe(&self) -> Duration {
        self.timeframe
    }

    /// Active timeframes, shortest first.
    pub fn timeframes(&self) -> impl Iterator<Item = Duration> + '_ {
        self.series.keys().copied()
    }

    /// Series of the primary timeframe.
    pub fn points(&self) -> &BucketSeries {
        &self.series[&self.timeframe]
    }

    /// Series of a given timeframe.
    pub fn series(&self, timeframe: Duration) -> Option<&BucketSeries> {
        self.series.get(&timeframe)
    }

    /// Appends a tick to every active series, shortest timeframe first.
    pub fn add(&mut self, point: &Point) -> Vec<BucketUpdate> {
        self.series.values_mut().filter_map(|series| series.add(point)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn tick(secs: i64, price: f64) -> Point {
        let mut point = Point::quote(DateTime::from_timestamp(secs, 0).unwrap(), price, 1.0, price, 1.0);
        point.instrument = "GOOG".into();
        point
    }

    #[test]
    fn timeframes_bucket_independently() {
        let mut instrument = Instrument::new("GOOG", Duration::from_secs(60))
            .unwrap()
            .with_timeframe(Duration::from_secs(300))
            .unwrap();

        for secs in [0, 30, 61, 130, 299, 301] {
            instrument.add(&tick(secs, secs as f64 + 1.0));
        }

        assert_eq!(instrument.points().len(), 5);
        let five = instrument.series(Duration::from_secs(300)).unwrap();
        assert_eq!(five.len(), 2);
        assert_eq!(five.get(0).unwrap().bar.close, 300.0);
        assert_eq!(five.get(1).unwrap().bar.open, 302.0);
    }

    #[test]
    fn add_reports_every_timeframe() {
        let mut instrument = Instrument::new("GOOG", Duration::from_secs(60))
            .unwrap()
            .with_timeframe(Duration::from_secs(1))
            .unwrap();
        let updates = instrument.add(&tick(0, 1.0));
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].timeframe, Duration::from_secs(1));
        assert_eq!(updates[1].instrument, "GOOG");
    }

    #[test]
    fn zero_timeframe_rejected() {
        assert!(Instrument::new("GOOG", Duration::ZERO).is_err());
    }
}
