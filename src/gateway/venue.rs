use chrono::{DateTime, Utc};

use crate::engine::{Order, OrderSide, Point};

/// A fill reported by a venue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Execution {
    pub order_id: u64,
    pub price: f64,
    pub time: DateTime<Utc>,
}

/// Where validated orders go: a simulator, or an adapter to a live broker.
pub trait Venue: Send {
    /// Accepts a validated order.
    fn submit(&mut self, order: &Order);

    /// Withdraws a pending order. Returns `false` if the venue no longer holds it.
    fn cancel(&mut self, id: u64) -> bool;

    /// Offers a tick; returns the orders it fills.
    fn on_tick(&mut self, tick: &Point) -> Vec<Execution>;
}

#[derive(Debug, Clone)]
struct Resting {
    id: u64,
    instrument: String,
    side: OrderSide,
    price: f64,
}

/// Fills orders against the next tick of their instrument.
///
/// Market buys trade at the ask and market sells at the bid. Limit orders wait until the
/// quote crosses their price and trade at the limit.
#[derive(Debug, Clone, Default)]
pub struct SimulatedVenue {
    resting: Vec<Resting>,
}

impl SimulatedVenue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders waiting for a fill.
    pub fn pending(&self) -> usize {
        self.resting.len()
    }

    fn execution_price(order: &Resting, tick: &Point) -> Option<f64> {
        let quote = match order.side {
            OrderSide::Buy => tick.buy_price(),
            OrderSide::Sell => tick.sell_price(),
        };
        if quote <= 0.0 {
            return None;
        }
        if order.price == 0.0 {
            return Some(quote);
        }
        let crossed = match order.side {
            OrderSide::Buy => quote <= order.price,
            OrderSide::Sell => quote >= order.price,
        };
        crossed.then_some(order.price)
    }
}

impl Venue for SimulatedVenue {
    fn submit(&mut self, order: &Order) {
        self.resting.push(Resting {
            id: order.id(),
            instrument: order.instrument.clone(),
            side: order.side,
            price: order.price,
        });
    }

    fn cancel(&mut self, id: u64) -> bool {
        let before = self.resting.len();
        self.resting.retain(|order| order.id != id);
        self.resting.len() != before
    }

    fn on_tick(&mut self, tick: &Point) -> Vec<Execution> {
        let mut executions = Vec::new();
        self.resting.retain(|order| {
            if order.instrument != tick.instrument {
                return true;
            }
            match Self::execution_price(order, tick) {
                Some(price) => {
                    executions.push(Execution {
                        order_id: order.id,
                        price,
                        time: tick.time,
                    });
                    false
                }
                None => true,
            }
        });
        executions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(instrument: &str, bid: f64, ask: f64) -> Point {
        let mut point = Point::quote(DateTime::default(), bid, 1.0, ask, 1.0);
        point.instrument = instrument.into();
        point
    }

    #[test]
    fn market_orders_take_the_quote() {
        let mut venue = SimulatedVenue::new();
        let buy: Order = (OrderSide::Buy, 1.0, "GOOG").into();
        let sell: Order = (OrderSide::Sell, 1.0, "GOOG").into();
        venue.submit(&buy);
        venue.submit(&sell);

        assert!(venue.on_tick(&tick("MSFT", 1.0, 2.0)).is_empty());
        let fills = venue.on_tick(&tick("GOOG", 99.0, 101.0));
        assert_eq!(fills.len(), 2);
        assert_eq!((fills[0].order_id, fills[0].price), (buy.id(), 101.0));
        assert_eq!((fills[1].order_id, fills[1].price), (sell.id(), 99.0));
        assert_eq!(venue.pending(), 0);
    }

    #[test]
    fn limit_waits_for_cross() {
        let mut venue = SimulatedVenue::new();
        let buy: Order = (OrderSide::Buy, 1.0, 100.0, "GOOG").into();
        venue.submit(&buy);

        assert!(venue.on_tick(&tick("GOOG", 100.0, 100.5)).is_empty());
        let fills = venue.on_tick(&tick("GOOG", 99.0, 99.5));
        assert_eq!(fills[0].price, 100.0);
    }

    #[test]
    fn cancel_removes_resting() {
        let mut venue = SimulatedVenue::new();
        let order: Order = (OrderSide::Buy, 1.0, 10.0, "GOOG").into();
        venue.submit(&order);
        assert!(venue.cancel(order.id()));
        assert!(!venue.cancel(order.id()));
        assert_eq!(venue.pending(), 0);
    }
}
