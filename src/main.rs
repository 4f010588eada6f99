//! Replays tick files through the configured indicators and prints the account statement.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::Parser;
use parking_lot::Mutex;
use tickflow::prelude::*;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Replay ticks through indicators and a simulated gateway.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Engine configuration (TOML)
    #[arg(short, long, default_value = "engine.toml")]
    config: PathBuf,

    /// Tick file, overrides the gateway source of the configuration
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Replay speed multiplier, 0 replays as fast as possible
    #[arg(long)]
    speed: Option<f64>,

    /// Print the statement as JSON
    #[arg(long)]
    json: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut config = EngineConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(source) = args.source {
        config.gateway.source = Some(source);
    }
    if let Some(speed) = args.speed {
        config.gateway.speed = speed;
    }
    if config.instruments.is_empty() {
        bail!("{} declares no instrument", args.config.display());
    }

    let account = config.build_account()?;
    let mut gateway = Gateway::new(config.gateway.clone(), account);

    let runner = Arc::new(Mutex::new(config.build_runner()));
    let handle = runner.clone();
    gateway.on_bucket(move |event: &BucketEvent<'_>| handle.lock().on_bucket(event))?;

    let mut source = config.tick_source()?;
    let ticks = gateway.run(&mut source)?;
    info!(ticks, "replay done");

    for (instrument, timeframe, indicators) in runner.lock().iter() {
        for indicator in indicators {
            info!(
                instrument,
                timeframe = timeframe.as_secs(),
                indicator = indicator.name(),
                value = indicator.last(),
                "last value"
            );
        }
    }

    #[cfg(feature = "metrics")]
    {
        let statement = Statement::from(gateway.account());
        if args.json {
            println!("{}", statement.to_json()?);
        } else {
            println!("{statement}");
        }
    }

    Ok(())
}
