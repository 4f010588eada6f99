use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{Order, OrderSide};

/// Whether a position is still held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    #[default]
    Open,
    Closed,
}

/// A holding created from a filled order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    id: u64,
    pub name: String,
    pub description: String,
    pub side: OrderSide,
    pub size: f64,
    pub group: Option<String>,
    /// Latest fill price applied to the position.
    pub price: f64,
    /// Average entry price.
    pub open_price: f64,
    pub close_price: Option<f64>,
    pub instrument: String,
    pub orders: Vec<Order>,
    pub time: Option<DateTime<Utc>>,
    pub close_time: Option<DateTime<Utc>>,
    state: PositionState,
    realized: f64,
    gain_loss: f64,
    gain_loss_min: f64,
    gain_loss_max: f64,
    commission: f64,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            description: String::new(),
            side: OrderSide::Buy,
            size: 0.0,
            group: None,
            price: 0.0,
            open_price: 0.0,
            close_price: None,
            instrument: String::new(),
            orders: Vec::new(),
            time: None,
            close_time: None,
            state: PositionState::Open,
            realized: 0.0,
            gain_loss: 0.0,
            gain_loss_min: 0.0,
            gain_loss_max: 0.0,
            commission: 0.0,
        }
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Copies the identity and terms of a filled order onto `position`.
///
/// This is the only way positions are built: id, name, description, side, size, group,
/// price (also used as the open price), instrument, nested orders and time all come from the order.
pub fn update_position_params<'p>(position: &'p mut Position, order: &Order) -> &'p mut Position {
    position.id = order.id();
    position.name = order.name.clone();
    position.description = order.description.clone();
    position.side = order.side;
    position.size = order.size;
    position.group = order.group.clone();
    position.price = order.price;
    position.open_price = order.price;
    position.instrument = order.instrument.clone();
    position.orders = order.orders.clone();
    position.time = order.time;
    position
}

impl From<&Order> for Position {
    fn from(order: &Order) -> Self {
        let mut position = Position::default();
        update_position_params(&mut position, order);
        position
    }
}

impl Position {
    /// Returns the position id (the id of the order that opened it).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the open/closed state.
    pub fn state(&self) -> PositionState {
        self.state
    }

    /// Whether the position is still held.
    pub fn is_open(&self) -> bool {
        self.state == PositionState::Open
    }

    /// Size with the side applied.
    pub fn signed_size(&self) -> f64 {
        self.size * self.side.sign()
    }

    /// Gain or loss of the remaining size if it were closed at `price`.
    pub fn estimate_pnl(&self, price: f64) -> f64 {
        (price - self.open_price) * self.signed_size()
    }

    /// Current gain/loss: unrealized while open, realized once closed.
    pub fn gain_loss(&self) -> f64 {
        self.gain_loss
    }

    /// Worst gain/loss seen while open.
    pub fn gain_loss_min(&self) -> f64 {
        self.gain_loss_min
    }

    /// Best gain/loss seen while open.
    pub fn gain_loss_max(&self) -> f64 {
        self.gain_loss_max
    }

    /// Gain/loss already booked by partial closes.
    pub fn realized(&self) -> f64 {
        self.realized
    }

    /// Commissions charged on the fills applied to this position.
    pub fn commission(&self) -> f64 {
        self.commission
    }

    pub(crate) fn add_commission(&mut self, amount: f64) {
        self.commission += amount;
    }

    /// Marks the position to `price` and tracks the excursion range.
    pub fn mark(&mut self, price: f64) -> f64 {
        if !self.is_open() || price <= 0.0 {
            return self.gain_loss;
        }
        self.gain_loss = self.realized + self.estimate_pnl(price);
        self.gain_loss_min = self.gain_loss_min.min(self.gain_loss);
        self.gain_loss_max = self.gain_loss_max.max(self.gain_loss);
        self.gain_loss
    }

    /// Adds a same-side fill, averaging the open price.
    pub(crate) fn increase(&mut self, size: f64, price: f64) {
        let total = self.size + size;
        self.open_price = (self.open_price * self.size + price * size) / total;
        self.size = total;
        self.price = price;
    }

    /// Books the gain/loss of `size` units closed at `price` and shrinks the position.
    pub(crate) fn reduce(&mut self, size: f64, price: f64) -> f64 {
        let size = size.min(self.size);
        let pnl = (price - self.open_price) * size * self.side.sign();
        self.realized += pnl;
        self.size -= size;
        self.price = price;
        pnl
    }

    /// Closes whatever is left at `price`; the gain/loss becomes the realized total.
    pub(crate) fn close(&mut self, price: f64, time: Option<DateTime<Utc>>) -> f64 {
        let pnl = self.reduce(self.size, price);
        self.close_price = Some(price);
        self.close_time = time;
        self.state = PositionState::Closed;
        self.gain_loss = self.realized;
        self.gain_loss_min = self.gain_loss_min.min(self.gain_loss);
        self.gain_loss_max = self.gain_loss_max.max(self.gain_loss);
        pnl
    }
}

#[cfg(test)]
fn filled(side: OrderSide, size: f64, price: f64) -> Order {
    let mut order: Order = (side, size, price, "GOOG").into();
    order.time = Some(DateTime::default());
    order
}

#[cfg(test)]
#[test]
fn position_inherits_order_params() {
    let order = filled(OrderSide::Buy, 100.0, 10.0)
        .with_description("rsi cross")
        .with_group("g1")
        .with_order((OrderSide::Sell, 100.0, 9.0, "GOOG").into());
    let position = Position::from(&order);

    assert_eq!(position.id(), order.id());
    assert_eq!(position.name, "GOOG");
    assert_eq!(position.description, "rsi cross");
    assert_eq!(position.side, OrderSide::Buy);
    assert_eq!(position.size, 100.0);
    assert_eq!(position.group.as_deref(), Some("g1"));
    assert_eq!(position.price, 10.0);
    assert_eq!(position.open_price, 10.0);
    assert_eq!(position.instrument, "GOOG");
    assert_eq!(position.orders.len(), 1);
    assert_eq!(position.time, order.time);
    assert!(position.is_open());
}

#[cfg(test)]
#[test]
fn mark_tracks_excursion() {
    let mut position = Position::from(&filled(OrderSide::Buy, 2.0, 10.0));
    assert_eq!(position.mark(12.0), 4.0);
    assert_eq!(position.mark(7.0), -6.0);
    assert_eq!(position.mark(11.0), 2.0);
    assert_eq!(position.gain_loss_min(), -6.0);
    assert_eq!(position.gain_loss_max(), 4.0);
}

#[cfg(test)]
#[test]
fn short_gain_loss() {
    let mut position = Position::from(&filled(OrderSide::Sell, 3.0, 10.0));
    assert_eq!(position.mark(8.0), 6.0);
    assert_eq!(position.estimate_pnl(11.0), -3.0);
}

#[cfg(test)]
#[test]
fn increase_averages_open_price() {
    let mut position = Position::from(&filled(OrderSide::Buy, 1.0, 10.0));
    position.increase(3.0, 14.0);
    assert_eq!(position.size, 4.0);
    assert_eq!(position.open_price, 13.0);
}

#[cfg(test)]
#[test]
fn partial_then_full_close() {
    let mut position = Position::from(&filled(OrderSide::Buy, 4.0, 10.0));
    assert_eq!(position.reduce(1.0, 12.0), 2.0);
    assert_eq!(position.size, 3.0);
    assert_eq!(position.mark(11.0), 5.0);
    assert_eq!(position.close(9.0, None), -3.0);
    assert_eq!(position.gain_loss(), -1.0);
    assert_eq!(position.state(), PositionState::Closed);
    assert_eq!(position.close_price, Some(9.0));
    // marks after close are ignored
    assert_eq!(position.mark(100.0), -1.0);
}
