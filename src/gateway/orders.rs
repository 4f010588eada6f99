use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::debug;

use crate::{
    engine::Order,
    errors::{Error, Result},
    gateway::CancellationToken,
};

/// What the decision layer asks the gateway to do.
#[derive(Debug, Clone)]
pub enum OrderIntent {
    /// Validate and place a batch. One invalid order rejects the whole batch.
    Create(Vec<Order>),
    /// Cancel a pending order by id.
    Cancel(u64),
}

/// Sending half of a gateway's order stream.
///
/// Intents are queued and processed after the current dispatch returns.
#[derive(Debug, Clone)]
pub struct OrderSender {
    tx: Sender<OrderIntent>,
    token: CancellationToken,
}

impl OrderSender {
    /// Queues an intent. Fails once the gateway is cancelled.
    pub fn send(&self, intent: OrderIntent) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.tx.send(intent).map_err(|_| Error::Cancelled)
    }

    /// Queues a batch of orders.
    pub fn create(&self, orders: Vec<Order>) -> Result<()> {
        self.send(OrderIntent::Create(orders))
    }

    /// Queues a single order.
    pub fn submit(&self, order: Order) -> Result<()> {
        self.create(vec![order])
    }

    /// Queues the cancellation of a pending order.
    pub fn cancel(&self, id: u64) -> Result<()> {
        self.send(OrderIntent::Cancel(id))
    }
}

/// Creates an unbounded order stream that stops accepting intents when `token` fires.
///
/// Intents still queued at that point are discarded.
pub(crate) fn order_channel(token: &CancellationToken) -> (OrderSender, Receiver<OrderIntent>) {
    let (tx, rx) = unbounded();
    let drain = rx.clone();
    token.on_cancel(move || {
        let dropped = drain.try_iter().count();
        debug!(dropped, "order stream closed");
    });
    (
        OrderSender {
            tx,
            token: token.clone(),
        },
        rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OrderSide;

    #[test]
    fn queued_until_drained() {
        let token = CancellationToken::new();
        let (sender, rx) = order_channel(&token);
        sender.submit((OrderSide::Buy, 1.0, "GOOG").into()).unwrap();
        sender.cancel(42).unwrap();

        let intents: Vec<OrderIntent> = rx.try_iter().collect();
        assert_eq!(intents.len(), 2);
        assert!(matches!(&intents[0], OrderIntent::Create(orders) if orders.len() == 1));
        assert!(matches!(intents[1], OrderIntent::Cancel(42)));
    }

    #[test]
    fn cancellation_discards_and_refuses() {
        let token = CancellationToken::new();
        let (sender, rx) = order_channel(&token);
        sender.submit((OrderSide::Sell, 1.0, "GOOG").into()).unwrap();

        token.cancel();
        assert!(rx.try_recv().is_err());
        assert!(matches!(sender.cancel(1), Err(Error::Cancelled)));
    }
}
