use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    engine::{Account, Instrument},
    errors::{Error, Result},
    gateway::{FileSource, IndicatorRunner, MergedSource},
    indicators::{
        AnyIndicator, AverageTrueRange, Imbalance, ImbalanceDirection, MovingAverage, MovingAverageMode,
        Performance, RelativeStrength,
    },
};

/// Gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub name: String,
    pub account: String,
    /// Tick file replayed for the first instrument.
    pub source: Option<PathBuf>,
    /// Replay speed multiplier. `0` replays as fast as possible.
    pub speed: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: "simulator".into(),
            account: "demo".into(),
            source: None,
            speed: 0.0,
        }
    }
}

/// Built-in indicator families.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    #[default]
    MovingAverage,
    Imbalance,
    RelativeStrength,
    AverageTrueRange,
    Performance,
}

/// One indicator of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub name: String,
    pub kind: IndicatorKind,
    pub interval: usize,
    pub mode: MovingAverageMode,
    pub direction: ImbalanceDirection,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: IndicatorKind::MovingAverage,
            interval: 0,
            mode: MovingAverageMode::Close,
            direction: ImbalanceDirection::Net,
        }
    }
}

impl IndicatorConfig {
    /// Builds the configured indicator. Unnamed indicators are named after their kind.
    pub fn build(&self) -> AnyIndicator {
        let name = if self.name.is_empty() {
            format!("{:?}", self.kind).to_lowercase()
        } else {
            self.name.clone()
        };
        match self.kind {
            IndicatorKind::MovingAverage => AnyIndicator::MovingAverage(MovingAverage::new(name, self.interval, self.mode)),
            IndicatorKind::Imbalance => AnyIndicator::Imbalance(Imbalance::new(name, self.direction)),
            IndicatorKind::RelativeStrength => AnyIndicator::RelativeStrength(RelativeStrength::new(name, self.interval)),
            IndicatorKind::AverageTrueRange => AnyIndicator::AverageTrueRange(AverageTrueRange::new(name, self.interval)),
            IndicatorKind::Performance => AnyIndicator::Performance(Performance::new(name)),
        }
    }
}

/// An instrument and the timeframes it buckets on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub name: String,
    /// Bucket widths in seconds, primary first.
    pub timeframes: Vec<u64>,
    pub commission: f64,
    pub chart: Option<String>,
    /// Tick file for this instrument; overrides the gateway source.
    pub source: Option<PathBuf>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            timeframes: vec![60],
            commission: 0.0,
            chart: None,
            source: None,
        }
    }
}

impl InstrumentConfig {
    pub fn build(&self) -> Result<Instrument> {
        let mut timeframes = self.timeframes.iter().map(|secs| Duration::from_secs(*secs));
        let primary = timeframes.next().ok_or(Error::ZeroTimeframe(Duration::ZERO))?;
        let mut instrument = Instrument::new(self.name.clone(), primary)?.with_commission(self.commission);
        for timeframe in timeframes {
            instrument = instrument.with_timeframe(timeframe)?;
        }
        if let Some(chart) = &self.chart {
            instrument = instrument.with_chart(chart.clone());
        }
        Ok(instrument)
    }
}

/// Everything a replay needs, usually loaded from a TOML file.
///
/// ```toml
/// balance = 10000.0
///
/// [gateway]
/// name = "simulator"
/// source = "ticks.txt"
///
/// [[instruments]]
/// name = "GOOG"
/// timeframes = [60, 300]
///
/// [[indicators]]
/// name = "rsi"
/// kind = "relative_strength"
/// interval = 10
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub gateway: GatewayConfig,
    pub balance: f64,
    pub instruments: Vec<InstrumentConfig>,
    pub indicators: Vec<IndicatorConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            balance: 10_000.0,
            instruments: Vec::new(),
            indicators: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Reads and parses a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Builds the account with every configured instrument.
    pub fn build_account(&self) -> Result<Account> {
        let mut account = Account::new(self.gateway.account.clone(), self.balance)?;
        for instrument in &self.instruments {
            account.add_instrument(instrument.build()?);
        }
        Ok(account)
    }

    /// Builds the configured indicators, in order.
    pub fn build_indicators(&self) -> Vec<AnyIndicator> {
        self.indicators.iter().map(IndicatorConfig::build).collect()
    }

    /// Builds a runner that keeps one copy of the configured indicators per series.
    pub fn build_runner(&self) -> IndicatorRunner {
        IndicatorRunner::new(self.indicators.clone())
    }

    /// Opens the tick file of every instrument that has one, merged by time.
    pub fn tick_source(&self) -> Result<MergedSource> {
        let mut merged = MergedSource::new();
        for (index, instrument) in self.instruments.iter().enumerate() {
            let path = match (&instrument.source, index) {
                (Some(path), _) => path,
                (None, 0) => match &self.gateway.source {
                    Some(path) => path,
                    None => continue,
                },
                (None, _) => continue,
            };
            merged = merged.with_source(FileSource::open(path, instrument.name.clone())?);
        }
        Ok(merged)
    }
}
