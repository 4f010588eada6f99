use std::time::Duration;

use tracing::warn;

use crate::{
    engine::{Bar, Point},
    errors::{Error, Result},
    utils::{bucket_start, timeframe_micros},
};

/// How a tick changed its series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// The tick opened a new bucket.
    Appended,
    /// The tick was folded into the latest bucket.
    Merged,
}

/// Notification emitted for every append or merge.
#[derive(Debug, Clone)]
pub struct BucketUpdate {
    /// Instrument the series belongs to.
    pub instrument: String,
    /// Width of the series buckets.
    pub timeframe: Duration,
    /// Chronological index of the affected bucket.
    pub index: usize,
    /// Append or merge.
    pub kind: UpdateKind,
    /// Handle on the affected bucket; shares its field store with the series.
    pub point: Point,
}

/// Fixed-width time buckets for one instrument and one timeframe.
///
/// Points are stored oldest first and keyed by bucket start, with exactly one point per bucket.
#[derive(Debug, Clone)]
pub struct BucketSeries {
    timeframe: Duration,
    points: Vec<Point>,
    revision: u64,
}

impl BucketSeries {
    /// Creates an empty series. Zero-width timeframes are rejected.
    pub fn new(timeframe: Duration) -> Result<Self> {
        if timeframe_micros(timeframe) <= 0 {
            return Err(Error::ZeroTimeframe(timeframe));
        }
        Ok(Self {
            timeframe,
            points: Vec::new(),
            revision: 0,
        })
    }

    /// Width of the buckets.
    pub fn timeframe(&self) -> Duration {
        self.timeframe
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no tick has been added yet.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bucket at `index` (0 = oldest), `None` when out of range.
    pub fn get(&self, index: usize) -> Option<&Point> {
        self.points.get(index)
    }

    /// Most recent bucket.
    pub fn last(&self) -> Option<&Point> {
        self.points.last()
    }

    /// Iterates buckets oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.points.iter()
    }

    /// Adds a tick: merges it into the latest bucket when it shares its start, otherwise opens a
    /// new bucket.
    ///
    /// A tick older than the latest bucket is dropped and `None` is returned.
    pub fn add(&mut self, tick: &Point) -> Option<BucketUpdate> {
        let start = bucket_start(tick.time, self.timeframe);
        let price = tick.price();
        let volume = tick.volume();

        let kind = match self.points.last_mut() {
            Some(current) if current.time == start => {
                current.bar.merge(price, volume);
                current.bid_size += tick.bid_size;
                current.ask_size += tick.ask_size;
                refresh_quote(current, tick, price);
                UpdateKind::Merged
            }
            Some(current) if current.time > start => {
                warn!(
                    instrument = %tick.instrument,
                    tick = %tick.time,
                    bucket = %current.time,
                    "tick older than the latest bucket, dropped"
                );
                return None;
            }
            _ => {
                let mut point = tick.detached();
                point.time = start;
                point.timeframe = self.timeframe;
                point.bar = Bar::flat(price, volume);
                point.bid_size = tick.bid_size;
                point.ask_size = tick.ask_size;
                refresh_quote(&mut point, tick, price);
                self.points.push(point);
                UpdateKind::Appended
            }
        };

        self.revision += 1;
        let index = self.points.len() - 1;
        let current = &mut self.points[index];
        current.revision = self.revision;

        Some(BucketUpdate {
            instrument: current.instrument.clone(),
            timeframe: self.timeframe,
            index,
            kind,
            point: current.clone(),
        })
    }
}

// sizes are summed by the caller, prices follow the newest tick
fn refresh_quote(bucket: &mut Point, tick: &Point, price: f64) {
    bucket.bid = tick.bid;
    bucket.ask = tick.ask;
    bucket.last = price;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use proptest::prelude::*;

    fn tick(secs: i64, price: f64) -> Point {
        Point::quote(DateTime::from_timestamp(secs, 0).unwrap(), price, 1.0, price, 2.0)
    }

    fn minute() -> BucketSeries {
        BucketSeries::new(Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn zero_timeframe_rejected() {
        assert!(matches!(BucketSeries::new(Duration::ZERO), Err(Error::ZeroTimeframe(_))));
    }

    #[test]
    fn buckets_split_on_boundary() {
        let mut series = minute();
        series.add(&tick(0, 10.0));
        series.add(&tick(30, 12.0));
        series.add(&tick(59, 11.0));
        series.add(&tick(61, 13.0));

        assert_eq!(series.len(), 2);
        let first = series.get(0).unwrap();
        assert_eq!(first.time.timestamp(), 0);
        assert_eq!(first.bar, Bar::from((10.0, 12.0, 10.0, 11.0, 9.0)));

        let second = series.get(1).unwrap();
        assert_eq!(second.time.timestamp(), 60);
        assert_eq!(second.bar.open, 13.0);
        assert_eq!(second.bar.close, 13.0);
    }

    #[test]
    fn merge_sums_sizes_and_keeps_newest_quote() {
        let mut series = minute();
        series.add(&Point::quote(DateTime::from_timestamp(0, 0).unwrap(), 10.0, 1.0, 11.0, 3.0));
        series.add(&Point::quote(DateTime::from_timestamp(20, 0).unwrap(), 10.5, 2.0, 11.5, 4.0));

        let bucket = series.last().unwrap();
        assert_eq!((bucket.bid_size, bucket.ask_size), (3.0, 7.0));
        assert_eq!((bucket.bid, bucket.ask), (10.5, 11.5));
        assert_eq!(bucket.bar.volume, 10.0);

        series.add(&Point::quote(DateTime::from_timestamp(60, 0).unwrap(), 10.0, 5.0, 11.0, 6.0));
        let next = series.last().unwrap();
        assert_eq!((next.bid_size, next.ask_size), (5.0, 6.0));
    }

    #[test]
    fn update_reports_kind_and_index() {
        let mut series = minute();
        let first = series.add(&tick(0, 10.0)).unwrap();
        let merged = series.add(&tick(10, 11.0)).unwrap();
        let second = series.add(&tick(60, 12.0)).unwrap();

        assert_eq!((first.kind, first.index), (UpdateKind::Appended, 0));
        assert_eq!((merged.kind, merged.index), (UpdateKind::Merged, 0));
        assert_eq!((second.kind, second.index), (UpdateKind::Appended, 1));
        assert!(second.point.revision > merged.point.revision);
    }

    #[test]
    fn out_of_range_is_none() {
        let mut series = minute();
        assert!(series.get(0).is_none());
        series.add(&tick(0, 1.0));
        assert!(series.get(1).is_none());
        assert!(series.get(usize::MAX).is_none());
    }

    #[test]
    fn stale_tick_dropped() {
        let mut series = minute();
        series.add(&tick(120, 1.0));
        assert!(series.add(&tick(30, 2.0)).is_none());
        assert_eq!(series.len(), 1);
        assert_eq!(series.last().unwrap().bar.close, 1.0);
    }

    #[test]
    fn update_point_shares_fields_with_bucket() {
        let mut series = minute();
        let update = series.add(&tick(0, 1.0)).unwrap();
        update.point.attach("x", crate::engine::FieldValue::Scalar(3.0));
        assert_eq!(series.last().unwrap().field_value("x"), Some(3.0));
    }

    proptest! {
        #[test]
        fn one_point_per_bucket(mut times in prop::collection::vec(0i64..10_000, 1..200)) {
            times.sort();
            let mut series = minute();
            for t in &times {
                series.add(&tick(*t, 1.0));
            }
            let mut buckets: Vec<i64> = times.iter().map(|t| t - t % 60).collect();
            buckets.dedup();
            prop_assert_eq!(series.len(), buckets.len());
            for (point, start) in series.iter().zip(buckets) {
                prop_assert_eq!(point.time.timestamp(), start);
            }
        }
    }
}
