use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{
    engine::{BucketSeries, FieldValue, Point},
    indicators::{Calculate, Indicator, Values},
};

/// Which side of the point feeds the average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovingAverageMode {
    Bid,
    Ask,
    #[default]
    Close,
}

impl MovingAverageMode {
    fn sample(&self, point: &Point) -> f64 {
        match self {
            Self::Bid => point.bid,
            Self::Ask => point.ask,
            Self::Close => point.bar.close,
        }
    }
}

/// Linear weighted moving average.
///
/// `values()` holds the raw samples; the average goes to `last()` and to the point field.
/// The newest of the last `interval` samples weighs `interval`, the oldest weighs 1.
/// With `interval == 0`, or when the average comes out as zero, the raw sample is used.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    name: String,
    interval: usize,
    mode: MovingAverageMode,
    window: VecDeque<f64>,
    last: f64,
    values: Values,
}

impl MovingAverage {
    /// Creates a moving average over `interval` samples.
    pub fn new(name: impl Into<String>, interval: usize, mode: MovingAverageMode) -> Self {
        Self {
            name: name.into(),
            interval,
            mode,
            window: VecDeque::with_capacity(interval),
            last: 0.0,
            values: Values::default(),
        }
    }

    /// Number of samples averaged.
    pub fn interval(&self) -> usize {
        self.interval
    }

    /// Sampled side.
    pub fn mode(&self) -> MovingAverageMode {
        self.mode
    }

    fn average(&mut self, sample: f64) -> f64 {
        if self.interval == 0 {
            return sample;
        }
        if self.window.len() == self.interval {
            self.window.pop_front();
        }
        self.window.push_back(sample);

        let (sum, weights) = self
            .window
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(sum, weights), (i, x)| {
                let weight = (i + 1) as f64;
                (sum + x * weight, weights + weight)
            });
        let average = sum / weights;
        if average == 0.0 { sample } else { average }
    }
}

impl Indicator for MovingAverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn values(&self) -> &Values {
        &self.values
    }

    fn last(&self) -> f64 {
        self.last
    }
}

impl Calculate for MovingAverage {
    fn calculate(&mut self, series: &BucketSeries) -> &mut Self {
        let Some(point) = series.last() else {
            return self;
        };
        let sample = self.mode.sample(point);
        let average = self.average(sample);
        point.attach(&self.name, FieldValue::Scalar(average));
        self.values.push(&self.name, point, FieldValue::Scalar(sample));
        self.last = average;
        self
    }
}
