use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    engine::{Instrument, Order, OrderStatus, Position},
    errors::{Error, Result},
};

const SIZE_EPSILON: f64 = 1e-9;

/// A trading account: balance, instruments, and the orders and positions opened through its gateway.
#[derive(Debug, Clone)]
pub struct Account {
    name: String,
    // Gateway routing orders for this account
    gateway: String,
    // Balance at creation
    initial_balance: f64,
    // Cash balance, realized P&L and commissions included
    balance: f64,
    // Cumulative commissions paid
    fees: f64,
    instruments: BTreeMap<String, Instrument>,
    active_orders: VecDeque<Order>,
    orders: Vec<Order>,
    active_positions: VecDeque<Position>,
    positions: Vec<Position>,
}

impl Account {
    /// Creates an account with a positive starting balance.
    pub fn new(name: impl Into<String>, balance: f64) -> Result<Self> {
        if balance <= 0.0 || !balance.is_finite() {
            return Err(Error::NegZeroBalance(balance));
        }
        Ok(Self {
            name: name.into(),
            gateway: String::new(),
            initial_balance: balance,
            balance,
            fees: 0.0,
            instruments: BTreeMap::new(),
            active_orders: VecDeque::new(),
            orders: Vec::new(),
            active_positions: VecDeque::new(),
            positions: Vec::new(),
        })
    }

    /// Registers an instrument, replacing any previous one with the same name.
    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.add_instrument(instrument);
        self
    }

    /// Registers an instrument, replacing any previous one with the same name.
    pub fn add_instrument(&mut self, instrument: Instrument) {
        self.instruments.insert(instrument.name().to_string(), instrument);
    }

    /// Account name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the gateway the account is bound to.
    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    pub(crate) fn set_gateway(&mut self, gateway: &str) {
        self.gateway = gateway.to_string();
    }

    /// Cash balance.
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Balance the account was opened with.
    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Commissions paid so far.
    pub fn fees_paid(&self) -> f64 {
        self.fees
    }

    /// Unrealized gain/loss of the open positions at their last mark.
    pub fn unrealized(&self) -> f64 {
        self.active_positions
            .iter()
            .map(|position| position.gain_loss() - position.realized())
            .sum()
    }

    /// Balance plus unrealized gain/loss.
    pub fn equity(&self) -> f64 {
        self.balance + self.unrealized()
    }

    /// Looks up an instrument by name.
    pub fn instrument(&self, name: &str) -> Option<&Instrument> {
        self.instruments.get(name)
    }

    /// Mutable access to an instrument.
    pub fn instrument_mut(&mut self, name: &str) -> Option<&mut Instrument> {
        self.instruments.get_mut(name)
    }

    /// Whether the account knows `name`.
    pub fn has_instrument(&self, name: &str) -> bool {
        self.instruments.contains_key(name)
    }

    /// Registered instruments, by name.
    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    /// Orders waiting for a fill.
    pub fn active_orders(&self) -> &VecDeque<Order> {
        &self.active_orders
    }

    /// Filled, cancelled and rejected orders, in completion order.
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Open positions.
    pub fn active_positions(&self) -> &VecDeque<Position> {
        &self.active_positions
    }

    /// Closed positions, in closing order.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Open position on `instrument`, if any.
    pub fn position(&self, instrument: &str) -> Option<&Position> {
        self.active_positions.iter().find(|p| p.instrument == instrument)
    }

    /// Queues a validated order until the venue fills it.
    pub fn place(&mut self, mut order: Order) -> u64 {
        order.set_status(OrderStatus::Pending);
        let id = order.id();
        debug!(account = %self.name, order = id, instrument = %order.instrument, "order placed");
        self.active_orders.push_back(order);
        id
    }

    /// Moves a pending order to history as cancelled.
    pub fn cancel_order(&mut self, id: u64) -> Result<&Order> {
        let index = self
            .active_orders
            .iter()
            .position(|o| o.id() == id)
            .ok_or(Error::OrderNotFound(id))?;
        let mut order = self.active_orders.remove(index).ok_or(Error::OrderNotFound(id))?;
        order.set_status(OrderStatus::Cancelled);
        debug!(account = %self.name, order = id, "order cancelled");
        self.orders.push(order);
        Ok(&self.orders[self.orders.len() - 1])
    }

    /// Records an order that never reached the active collection.
    pub(crate) fn record_rejected(&mut self, mut order: Order) {
        order.set_status(OrderStatus::Rejected);
        self.orders.push(order);
    }

    /// Fills a pending order at `price` and nets it into the instrument's position.
    ///
    /// ### Arguments
    /// * `id` - Id of a pending order.
    /// * `price` - Execution price.
    /// * `time` - Execution time.
    ///
    /// ### Returns
    /// The gain/loss realized by the fill, commission excluded.
    pub fn fill(&mut self, id: u64, price: f64, time: DateTime<Utc>) -> Result<f64> {
        if price <= 0.0 || !price.is_finite() {
            return Err(Error::InvalidPrice(price));
        }
        let index = self
            .active_orders
            .iter()
            .position(|o| o.id() == id)
            .ok_or(Error::OrderNotFound(id))?;
        let per_unit = {
            let order = &self.active_orders[index];
            let instrument = self
                .instruments
                .get(&order.instrument)
                .ok_or_else(|| Error::InstrumentNotFound(order.instrument.clone()))?;
            if order.size <= 0.0 {
                return Err(Error::NegZeroSize(order.size));
            }
            instrument.commission()
        };

        let mut order = self.active_orders.remove(index).ok_or(Error::OrderNotFound(id))?;
        order.price = price;
        order.time = Some(time);
        order.set_status(OrderStatus::Filled);

        let commission = per_unit * order.size;
        let realized = self.net(&order, price, time, per_unit);
        self.balance += realized - commission;
        self.fees += commission;
        info!(
            account = %self.name,
            order = id,
            side = ?order.side,
            size = order.size,
            price,
            realized,
            "order filled"
        );
        self.orders.push(order);
        Ok(realized)
    }

    fn net(&mut self, order: &Order, price: f64, time: DateTime<Utc>, per_unit: f64) -> f64 {
        let Some(index) = self.active_positions.iter().position(|p| p.instrument == order.instrument) else {
            self.open(Position::from(order), per_unit * order.size);
            return 0.0;
        };

        let position = &mut self.active_positions[index];
        if position.side == order.side {
            position.add_commission(per_unit * order.size);
            position.increase(order.size, price);
            position.mark(price);
            return 0.0;
        }

        position.add_commission(per_unit * order.size.min(position.size));
        if order.size + SIZE_EPSILON < position.size {
            let realized = position.reduce(order.size, price);
            position.mark(price);
            return realized;
        }

        let remainder = order.size - position.size;
        let Some(mut closed) = self.active_positions.remove(index) else {
            return 0.0;
        };
        let realized = closed.close(price, Some(time));
        info!(
            account = %self.name,
            position = closed.id(),
            instrument = %closed.instrument,
            gain_loss = closed.gain_loss(),
            "position closed"
        );
        self.positions.push(closed);

        if remainder > SIZE_EPSILON {
            let mut reversal = order.clone();
            reversal.size = remainder;
            self.open(Position::from(&reversal), per_unit * remainder);
        }
        realized
    }

    fn open(&mut self, mut position: Position, commission: f64) {
        position.add_commission(commission);
        info!(
            account = %self.name,
            position = position.id(),
            instrument = %position.instrument,
            side = ?position.side,
            size = position.size,
            price = position.open_price,
            "position opened"
        );
        self.active_positions.push_back(position);
    }

    /// Marks every open position on `instrument` to `price`.
    pub fn mark(&mut self, instrument: &str, price: f64) {
        for position in self.active_positions.iter_mut().filter(|p| p.instrument == instrument) {
            position.mark(price);
        }
    }
}

#[cfg(test)]
fn account() -> Account {
    use std::time::Duration;
    let instrument = Instrument::new("GOOG", Duration::from_secs(60)).unwrap().with_commission(0.01);
    Account::new("demo", 10_000.0).unwrap().with_instrument(instrument)
}

#[cfg(test)]
fn place(account: &mut Account, side: crate::engine::OrderSide, size: f64) -> u64 {
    account.place((side, size, "GOOG").into())
}

#[cfg(test)]
#[test]
fn new_account_invalid_balance() {
    assert!(matches!(Account::new("a", 0.0), Err(Error::NegZeroBalance(_))));
    assert!(matches!(Account::new("a", -1.0), Err(Error::NegZeroBalance(_))));
}

#[cfg(test)]
#[test]
fn fill_opens_position() {
    use crate::engine::OrderSide;

    let mut account = account();
    let id = place(&mut account, OrderSide::Buy, 100.0);
    assert_eq!(account.active_orders().len(), 1);

    let realized = account.fill(id, 10.0, DateTime::default()).unwrap();
    assert_eq!(realized, 0.0);
    assert!(account.active_orders().is_empty());
    assert_eq!(account.orders()[0].status(), OrderStatus::Filled);

    let position = account.position("GOOG").unwrap();
    assert_eq!(position.id(), id);
    assert_eq!(position.open_price, 10.0);
    approx::assert_relative_eq!(account.balance(), 10_000.0 - 1.0);
    approx::assert_relative_eq!(account.fees_paid(), 1.0);
}

#[cfg(test)]
#[test]
fn opposite_fill_reverses_position() {
    use crate::engine::OrderSide;

    let mut account = account();
    let buy = place(&mut account, OrderSide::Buy, 100.0);
    account.fill(buy, 10.0, DateTime::default()).unwrap();
    account.mark("GOOG", 11.0);
    assert_eq!(account.unrealized(), 100.0);

    let sell = place(&mut account, OrderSide::Sell, 200.0);
    let realized = account.fill(sell, 12.0, DateTime::default()).unwrap();
    assert_eq!(realized, 200.0);
    assert_eq!(account.positions().len(), 1);
    assert_eq!(account.positions()[0].gain_loss(), 200.0);

    let position = account.position("GOOG").unwrap();
    assert_eq!(position.side, OrderSide::Sell);
    assert_eq!(position.size, 100.0);
    assert_eq!(position.open_price, 12.0);
    approx::assert_relative_eq!(position.commission(), 1.0);
    approx::assert_relative_eq!(account.positions()[0].commission(), 2.0);
    // 3.0 commission on 300 units
    approx::assert_relative_eq!(account.balance(), 10_000.0 + 200.0 - 3.0);
}

#[cfg(test)]
#[test]
fn partial_reduce_keeps_position_open() {
    use crate::engine::OrderSide;

    let mut account = account();
    let buy = place(&mut account, OrderSide::Buy, 4.0);
    account.fill(buy, 10.0, DateTime::default()).unwrap();
    let sell = place(&mut account, OrderSide::Sell, 1.0);
    assert_eq!(account.fill(sell, 12.0, DateTime::default()).unwrap(), 2.0);

    let position = account.position("GOOG").unwrap();
    assert_eq!(position.size, 3.0);
    assert!(account.positions().is_empty());
    assert_eq!(account.unrealized(), 6.0);
}

#[cfg(test)]
#[test]
fn cancel_moves_order_to_history() {
    use crate::engine::OrderSide;

    let mut account = account();
    let id = place(&mut account, OrderSide::Buy, 1.0);
    assert_eq!(account.cancel_order(id).unwrap().status(), OrderStatus::Cancelled);
    assert!(account.active_orders().is_empty());
    assert!(matches!(account.cancel_order(id), Err(Error::OrderNotFound(_))));
    assert!(matches!(account.fill(id, 1.0, DateTime::default()), Err(Error::OrderNotFound(_))));
}

#[cfg(test)]
#[test]
fn fill_rejects_bad_price() {
    use crate::engine::OrderSide;

    let mut account = account();
    let id = place(&mut account, OrderSide::Buy, 1.0);
    assert!(matches!(account.fill(id, 0.0, DateTime::default()), Err(Error::InvalidPrice(_))));
    assert!(matches!(account.fill(id, f64::NAN, DateTime::default()), Err(Error::InvalidPrice(_))));
    assert_eq!(account.active_orders().len(), 1);
}
