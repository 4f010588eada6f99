use tracing::error;

use crate::engine::{Account, Order};

/// Why an order batch was refused.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Gateway has no name")]
    EmptyGatewayName,

    #[error("Order {0} has no name")]
    EmptyOrderName(u64),

    #[error("Order {0} has no instrument")]
    EmptyInstrument(u64),

    #[error("Order {id} references unknown instrument `{instrument}`")]
    UnknownInstrument { id: u64, instrument: String },

    #[error("Order {id} size must be positive (got: {size})")]
    InvalidSize { id: u64, size: f64 },

    #[error("Order {id} price must be zero (market) or positive (got: {price})")]
    InvalidPrice { id: u64, price: f64 },
}

/// Checks an order batch before it reaches the account.
pub trait Validator: Send + Sync {
    /// Returns every problem found; an empty list accepts the batch.
    fn validate(&self, gateway: &str, account: &Account, orders: &[Order]) -> Vec<ValidationError>;
}

/// Default rules: named gateway, and for every order and nested order a name, a known
/// instrument, a positive size and a non-negative price.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderRules;

impl OrderRules {
    fn check(account: &Account, order: &Order, errors: &mut Vec<ValidationError>) {
        let id = order.id();
        if order.name.trim().is_empty() {
            errors.push(ValidationError::EmptyOrderName(id));
        }
        if order.instrument.trim().is_empty() {
            errors.push(ValidationError::EmptyInstrument(id));
        } else if !account.has_instrument(&order.instrument) {
            errors.push(ValidationError::UnknownInstrument {
                id,
                instrument: order.instrument.clone(),
            });
        }
        if !(order.size > 0.0 && order.size.is_finite()) {
            errors.push(ValidationError::InvalidSize { id, size: order.size });
        }
        if !(order.price >= 0.0 && order.price.is_finite()) {
            errors.push(ValidationError::InvalidPrice { id, price: order.price });
        }
        for nested in &order.orders {
            Self::check(account, nested, errors);
        }
    }
}

impl Validator for OrderRules {
    fn validate(&self, gateway: &str, account: &Account, orders: &[Order]) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if gateway.trim().is_empty() {
            errors.push(ValidationError::EmptyGatewayName);
        }
        for order in orders {
            Self::check(account, order, &mut errors);
        }
        errors
    }
}

/// Destination for messages the pipeline reports but does not fail on.
pub trait ErrorSink: Send + Sync {
    fn error(&self, message: &str);
}

/// Forwards messages to `tracing` at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn error(&self, message: &str) {
        error!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Instrument, OrderSide};
    use std::time::Duration;

    fn account() -> Account {
        let instrument = Instrument::new("GOOG", Duration::from_secs(60)).unwrap();
        Account::new("demo", 100.0).unwrap().with_instrument(instrument)
    }

    #[test]
    fn valid_batch_passes() {
        let order: Order = (OrderSide::Buy, 1.0, "GOOG").into();
        assert!(OrderRules.validate("sim", &account(), &[order]).is_empty());
    }

    #[test]
    fn collects_every_failure() {
        let mut order: Order = (OrderSide::Buy, -1.0, "").into();
        order.price = -2.0;
        let errors = OrderRules.validate("", &account(), &[order]);
        assert_eq!(errors.len(), 5);
        assert_eq!(errors[0], ValidationError::EmptyGatewayName);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::EmptyInstrument(_))));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::EmptyOrderName(_))));
    }

    #[test]
    fn recurses_into_nested_orders() {
        let leg: Order = (OrderSide::Sell, 1.0, "MSFT").into();
        let order = Order::from((OrderSide::Buy, 1.0, "GOOG")).with_order(leg);
        let errors = OrderRules.validate("sim", &account(), &[order]);
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], ValidationError::UnknownInstrument { instrument, .. } if instrument == "MSFT"));
    }

    #[test]
    fn messages_are_readable() {
        let message = ValidationError::InvalidSize { id: 3, size: 0.0 }.to_string();
        assert_eq!(message, "Order 3 size must be positive (got: 0)");
    }
}
