//! Always-in-the-market RSI reversal on a synthetic sine wave.
//!
//! Buys when the RSI drops below 30 and sells when it rises above 70. Flipping an existing
//! position trades twice the base size.

use std::{f64::consts::PI, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tickflow::prelude::*;

const INSTRUMENT: &str = "SINE";
const SIZE: f64 = 100.0;

fn ticks() -> Vec<String> {
    (0..2_400)
        .map(|i| {
            let secs = i * 15;
            let mid = 100.0 + 10.0 * (2.0 * PI * i as f64 / 400.0).sin() + rand::random_range(-0.3..0.3);
            let half_spread = mid.how_many(0.01);
            format!("{secs} {:.4} 1 {:.4} 1", mid - half_spread, mid + half_spread)
        })
        .collect()
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let instrument = Instrument::new(INSTRUMENT, Duration::from_secs(60))?.with_commission(0.01);
    let account = Account::new("demo", 10_000.0)?.with_instrument(instrument);
    let mut gateway = Gateway::new(GatewayConfig::default(), account);

    let rsi = Arc::new(Mutex::new(RelativeStrength::new("rsi", 10)));
    let atr = Arc::new(Mutex::new(AverageTrueRange::new("atr", 10)));
    let (rsi_handle, atr_handle) = (rsi.clone(), atr.clone());

    gateway.on_bucket(move |event: &BucketEvent<'_>| {
        let value = rsi_handle.lock().calculate(event.series).last();
        atr_handle.lock().calculate(event.series);

        let account = event.account;
        if !account.active_orders().is_empty() {
            return;
        }
        let side = match value {
            v if v < 30.0 => OrderSide::Buy,
            v if v > 70.0 => OrderSide::Sell,
            _ => return,
        };
        let size = match account.position(INSTRUMENT) {
            Some(position) if position.side == side => return,
            Some(_) => SIZE * 2.0,
            None => SIZE,
        };
        let order = Order::from((side, size, INSTRUMENT)).with_description(format!("rsi {value:.1}"));
        if let Err(e) = event.orders.submit(order) {
            eprintln!("order not sent: {e}");
        }
    })?;

    let lines = ticks();
    let count = gateway.run(&mut LineSource::new(INSTRUMENT, lines.into_iter()))?;
    println!("{count} ticks, last RSI {:.2}, last ATR {:.4}", rsi.lock().last(), atr.lock().last());

    #[cfg(feature = "metrics")]
    {
        let statement = Statement::from(gateway.account());
        println!("{statement}");
    }

    #[cfg(not(feature = "metrics"))]
    println!("balance: {:.2}", gateway.account().balance());

    Ok(())
}
