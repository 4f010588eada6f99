use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    engine::{BucketSeries, FieldValue, Point},
    indicators::{Calculate, Indicator, Values},
};

/// Which quoted sizes feed the imbalance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImbalanceDirection {
    /// `ask_size - bid_size`.
    #[default]
    Net,
    /// `ask_size` only.
    AskOnly,
    /// `bid_size` only.
    BidOnly,
}

impl TryFrom<i8> for ImbalanceDirection {
    type Error = i8;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Net),
            1 => Ok(Self::AskOnly),
            -1 => Ok(Self::BidOnly),
            other => Err(other),
        }
    }
}

impl ImbalanceDirection {
    fn delta(&self, point: &Point) -> f64 {
        match self {
            Self::Net => point.ask_size - point.bid_size,
            Self::AskOnly => point.ask_size,
            Self::BidOnly => point.bid_size,
        }
    }
}

/// Running sum of quoted size deltas. Never reset.
///
/// Buckets carry the sizes summed over their ticks, so a merge only adds what the bucket
/// gained since the previous call.
#[derive(Debug, Clone)]
pub struct Imbalance {
    name: String,
    direction: ImbalanceDirection,
    total: f64,
    // (timeframe, bucket time) being accumulated and the delta already counted for it
    bucket: Option<(Duration, DateTime<Utc>)>,
    counted: f64,
    revision: u64,
    values: Values,
}

impl Imbalance {
    pub fn new(name: impl Into<String>, direction: ImbalanceDirection) -> Self {
        Self {
            name: name.into(),
            direction,
            total: 0.0,
            bucket: None,
            counted: 0.0,
            revision: 0,
            values: Values::default(),
        }
    }

    pub fn direction(&self) -> ImbalanceDirection {
        self.direction
    }

    /// Cumulative total.
    pub fn total(&self) -> f64 {
        self.total
    }
}

impl Indicator for Imbalance {
    fn name(&self) -> &str {
        &self.name
    }

    fn values(&self) -> &Values {
        &self.values
    }
}

impl Calculate for Imbalance {
    fn calculate(&mut self, series: &BucketSeries) -> &mut Self {
        let Some(point) = series.last() else {
            return self;
        };
        let key = (point.timeframe, point.time);
        if self.bucket == Some(key) {
            if self.revision == point.revision {
                return self;
            }
        } else {
            self.bucket = Some(key);
            self.counted = 0.0;
        }
        self.revision = point.revision;

        let delta = self.direction.delta(point);
        self.total += delta - self.counted;
        self.counted = delta;
        self.values.record(&self.name, point, FieldValue::Scalar(self.total));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use proptest::prelude::*;
    use std::time::Duration;

    fn tick(secs: i64, bid_size: f64, ask_size: f64) -> Point {
        Point::quote(DateTime::from_timestamp(secs, 0).unwrap(), 10.0, bid_size, 11.0, ask_size)
    }

    #[test]
    fn direction_from_sign() {
        assert_eq!(ImbalanceDirection::try_from(0), Ok(ImbalanceDirection::Net));
        assert_eq!(ImbalanceDirection::try_from(1), Ok(ImbalanceDirection::AskOnly));
        assert_eq!(ImbalanceDirection::try_from(-1), Ok(ImbalanceDirection::BidOnly));
        assert_eq!(ImbalanceDirection::try_from(2), Err(2));
    }

    #[test]
    fn one_sided_directions() {
        let mut series = BucketSeries::new(Duration::from_secs(60)).unwrap();
        let mut ask = Imbalance::new("ask", ImbalanceDirection::AskOnly);
        let mut bid = Imbalance::new("bid", ImbalanceDirection::BidOnly);
        for secs in [0, 10] {
            series.add(&tick(secs, 2.0, 5.0));
            ask.calculate(&series);
            bid.calculate(&series);
        }
        assert_eq!(ask.last(), 10.0);
        assert_eq!(bid.last(), 4.0);
    }

    #[test]
    fn repeated_calculation_counts_once() {
        let mut series = BucketSeries::new(Duration::from_secs(60)).unwrap();
        let mut imbalance = Imbalance::new("imb", ImbalanceDirection::Net);
        series.add(&tick(0, 1.0, 4.0));
        imbalance.calculate(&series).calculate(&series).calculate(&series);
        assert_eq!(imbalance.total(), 3.0);
        assert_eq!(imbalance.values().len(), 1);
    }

    #[test]
    fn merged_ticks_count_once_each() {
        let mut series = BucketSeries::new(Duration::from_secs(60)).unwrap();
        let mut imbalance = Imbalance::new("imb", ImbalanceDirection::Net);
        for (secs, bid, ask) in [(0, 1.0, 2.0), (15, 1.0, 4.0), (30, 2.0, 2.0), (60, 0.0, 1.0)] {
            series.add(&tick(secs, bid, ask));
            imbalance.calculate(&series);
        }
        // 1 + 3 + 0 + 1
        assert_eq!(imbalance.total(), 5.0);
        assert_eq!(imbalance.values().len(), 4);
        assert_eq!(series.get(0).unwrap().field_value("imb"), Some(4.0));
    }

    proptest! {
        #[test]
        fn total_is_sum_of_deltas(sizes in prop::collection::vec((0u32..1000, 0u32..1000), 1..100)) {
            let mut series = BucketSeries::new(Duration::from_secs(60)).unwrap();
            let mut imbalance = Imbalance::new("imb", ImbalanceDirection::Net);
            let mut expected = 0.0;
            for (i, (bid, ask)) in sizes.iter().enumerate() {
                series.add(&tick(i as i64 * 7, *bid as f64, *ask as f64));
                imbalance.calculate(&series);
                imbalance.calculate(&series);
                expected += *ask as f64 - *bid as f64;
                prop_assert_eq!(imbalance.last(), expected);
            }
        }
    }
}
