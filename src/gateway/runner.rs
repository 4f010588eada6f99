use std::{collections::BTreeMap, time::Duration};

use crate::{
    gateway::{BucketEvent, IndicatorConfig},
    indicators::AnyIndicator,
};

/// Configured indicators, instantiated once per `(instrument, timeframe)` series.
///
/// Every series gets its own state, so several timeframes of one instrument never feed the same
/// indicator.
#[derive(Debug, Clone, Default)]
pub struct IndicatorRunner {
    configs: Vec<IndicatorConfig>,
    sets: BTreeMap<(String, Duration), Vec<AnyIndicator>>,
}

impl IndicatorRunner {
    pub fn new(configs: Vec<IndicatorConfig>) -> Self {
        Self {
            configs,
            sets: BTreeMap::new(),
        }
    }

    /// Runs the indicators of the event's series, creating them on its first event.
    pub fn on_bucket(&mut self, event: &BucketEvent<'_>) {
        let key = (event.update.instrument.clone(), event.update.timeframe);
        let configs = &self.configs;
        let set = self
            .sets
            .entry(key)
            .or_insert_with(|| configs.iter().map(IndicatorConfig::build).collect());
        for indicator in set.iter_mut() {
            indicator.calculate(event.series, &[event.account]);
        }
    }

    /// Indicators of one series, `None` before its first event.
    pub fn indicators(&self, instrument: &str, timeframe: Duration) -> Option<&[AnyIndicator]> {
        self.sets
            .get(&(instrument.to_string(), timeframe))
            .map(Vec::as_slice)
    }

    /// Every series seen so far, by instrument then timeframe.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Duration, &[AnyIndicator])> {
        self.sets
            .iter()
            .map(|((instrument, timeframe), set)| (instrument.as_str(), *timeframe, set.as_slice()))
    }
}
