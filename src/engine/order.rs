use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::random_id;

/// Represents the side of an order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// `1.0` for buys, `-1.0` for sells.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }

    /// The offsetting side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

/// Lifecycle of an order: pending until the venue fills it, or it is cancelled or rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Pending,
    Filled,
    Cancelled,
    Rejected,
}

/// Represents an order intent, optionally carrying nested orders (brackets, legs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: u64,
    pub name: String,
    pub description: String,
    pub side: OrderSide,
    pub size: f64,
    /// Limit price, `0.0` for market orders. Set to the execution price once filled.
    pub price: f64,
    pub group: Option<String>,
    pub instrument: String,
    pub orders: Vec<Order>,
    pub time: Option<DateTime<Utc>>,
    status: OrderStatus,
}

impl PartialEq for Order {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

type O1<'a> = (OrderSide, f64, &'a str);
type O2<'a> = (OrderSide, f64, f64, &'a str);

impl From<O1<'_>> for Order {
    fn from((side, size, instrument): O1<'_>) -> Self {
        Self {
            id: random_id(),
            name: instrument.to_string(),
            description: String::new(),
            side,
            size,
            price: 0.0,
            group: None,
            instrument: instrument.to_string(),
            orders: Vec::new(),
            time: None,
            status: OrderStatus::Pending,
        }
    }
}

impl From<O2<'_>> for Order {
    fn from((side, size, price, instrument): O2<'_>) -> Self {
        let mut order = Order::from((side, size, instrument));
        order.price = price;
        order
    }
}

impl Order {
    /// Returns the order id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the lifecycle status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Whether the order trades at whatever price the next tick offers.
    pub fn is_market(&self) -> bool {
        self.price == 0.0
    }

    /// Size with the side applied: positive for buys, negative for sells.
    pub fn signed_size(&self) -> f64 {
        self.size * self.side.sign()
    }

    /// Sets the order name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the order description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the order group.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Attaches a nested order.
    pub fn with_order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub(crate) fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
    }
}

#[cfg(test)]
#[test]
fn create_market_order() {
    let order: Order = (OrderSide::Buy, 2.0, "GOOG").into();

    assert_eq!(order.name, "GOOG");
    assert_eq!(order.instrument, "GOOG");
    assert_eq!(order.size, 2.0);
    assert!(order.is_market());
    assert_eq!(order.status(), OrderStatus::Pending);
    assert!(order.orders.is_empty());
}

#[cfg(test)]
#[test]
fn create_limit_order_with_legs() {
    let stop: Order = (OrderSide::Sell, 1.0, 90.0, "GOOG").into();
    let order: Order = Order::from((OrderSide::Buy, 1.0, 100.0, "GOOG"))
        .with_name("entry")
        .with_group("bracket")
        .with_order(stop);

    assert!(!order.is_market());
    assert_eq!(order.price, 100.0);
    assert_eq!(order.name, "entry");
    assert_eq!(order.group.as_deref(), Some("bracket"));
    assert_eq!(order.orders.len(), 1);
    assert_eq!(order.orders[0].side, OrderSide::Sell);
}

#[cfg(test)]
#[test]
fn order_equality() {
    let order1: Order = (OrderSide::Buy, 1.0, "GOOG").into();
    let order2: Order = (OrderSide::Buy, 1.0, "GOOG").into();
    assert_ne!(order1, order2);
    assert_eq!(order1, order1.clone());
}

#[cfg(test)]
#[test]
fn signed_size() {
    let buy: Order = (OrderSide::Buy, 3.0, "GOOG").into();
    let sell: Order = (OrderSide::Sell, 3.0, "GOOG").into();
    assert_eq!(buy.signed_size(), 3.0);
    assert_eq!(sell.signed_size(), -3.0);
    assert_eq!(sell.side.opposite(), OrderSide::Buy);
}
