//! Gateway pipeline: ticks in, bucket events out, order intents back.
//!
//! A [`Gateway`] owns one account. Every tick it receives is stamped, bucketed on each timeframe
//! of its instrument, offered to the venue for fills, and announced to every subscriber. Orders
//! the subscribers send while handling an event are validated and placed right after the event.

mod broadcast;
mod cancel;
mod config;
mod orders;
mod runner;
mod tick;
mod validation;
mod venue;


pub use broadcast::*;
pub use cancel::*;
pub use config::*;
pub use orders::*;
pub use runner::*;
pub use tick::*;
pub use validation::*;
pub use venue::*;

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use tracing::{debug, error, info, warn};

use crate::{
    engine::{Account, BucketSeries, BucketUpdate, Instrument, Order, Point},
    errors::{Error, Result},
};

/// Connection state of a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for GatewayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "in error",
        };
        f.write_str(state)
    }
}

/// What subscribers receive for every bucket append or merge.
pub struct BucketEvent<'a> {
    /// The append or merge that triggered the event.
    pub update: &'a BucketUpdate,
    /// The series the update belongs to.
    pub series: &'a BucketSeries,
    /// The gateway's account, after fills and marks for this tick.
    pub account: &'a Account,
    /// Where to send order intents.
    pub orders: &'a OrderSender,
    /// The gateway's cancellation token.
    pub token: &'a CancellationToken,
}

/// Consumer of bucket events.
pub trait Subscriber: Send {
    fn on_bucket(&mut self, event: &BucketEvent<'_>);
}

impl<F> Subscriber for F
where
    F: FnMut(&BucketEvent<'_>) + Send,
{
    fn on_bucket(&mut self, event: &BucketEvent<'_>) {
        self(event)
    }
}

/// Turns a raw record line into a tick.
pub type Evaluate = Box<dyn Fn(&str) -> Point + Send + Sync>;

/// Stamps a tick with the identity of the account and instrument it is routed to.
pub fn update_point_params(point: &mut Point, account: &Account, instrument: &Instrument) {
    point.account = account.name().to_string();
    point.instrument = instrument.name().to_string();
    point.name = instrument.name().to_string();
    point.chart = instrument.chart().to_string();
    point.timeframe = instrument.timeframe();
}

/// Wall-clock wait between two replayed ticks at `speed` times real time.
pub fn replay_delay(prev: DateTime<Utc>, next: DateTime<Utc>, speed: f64) -> Option<Duration> {
    if speed <= 0.0 || !speed.is_finite() || next <= prev {
        return None;
    }
    let gap = (next - prev).to_std().ok()?;
    Some(gap.div_f64(speed))
}

/// Bridges a tick source to an account through a venue.
pub struct Gateway<V: Venue = SimulatedVenue> {
    config: GatewayConfig,
    state: GatewayState,
    account: Account,
    venue: V,
    evaluate: Evaluate,
    validator: Box<dyn Validator>,
    sink: Box<dyn ErrorSink>,
    token: CancellationToken,
    broadcaster: Broadcaster<dyn Subscriber>,
    orders: OrderSender,
    intents: Receiver<OrderIntent>,
    last_tick: Option<DateTime<Utc>>,
}

impl Gateway<SimulatedVenue> {
    /// Creates a disconnected gateway trading on the simulator.
    pub fn new(config: GatewayConfig, account: Account) -> Self {
        Self::with_venue(config, account, SimulatedVenue::new())
    }
}

impl<V: Venue> Gateway<V> {
    /// Creates a disconnected gateway routing orders to `venue`.
    pub fn with_venue(config: GatewayConfig, mut account: Account, venue: V) -> Self {
        account.set_gateway(&config.name);

        let token = CancellationToken::new();
        let broadcaster: Broadcaster<dyn Subscriber> = Broadcaster::new();
        broadcaster.take_until(&token);
        let (orders, intents) = order_channel(&token);

        let name = config.name.clone();
        token.on_cancel(move || info!(gateway = %name, "gateway cancelled"));

        Self {
            config,
            state: GatewayState::Disconnected,
            account,
            venue,
            evaluate: Box::new(parse_tick),
            validator: Box::new(OrderRules),
            sink: Box::new(TracingSink),
            token,
            broadcaster,
            orders,
            intents,
            last_tick: None,
        }
    }

    /// Replaces the order validation rules.
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    /// Replaces the destination of validation and execution errors.
    pub fn with_error_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Replaces the record parser.
    pub fn with_evaluate<F>(mut self, evaluate: F) -> Self
    where
        F: Fn(&str) -> Point + Send + Sync + 'static,
    {
        self.evaluate = Box::new(evaluate);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Current state. A cancelled gateway reports itself disconnected.
    pub fn state(&self) -> GatewayState {
        if self.token.is_cancelled() && self.state == GatewayState::Connected {
            GatewayState::Disconnected
        } else {
            self.state
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    /// Handle on the gateway's cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Sender for order intents, usable outside event handlers.
    pub fn orders(&self) -> OrderSender {
        self.orders.clone()
    }

    /// Moves from `Disconnected` (or `Error`) to `Connected`.
    pub fn connect(&mut self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.state {
            GatewayState::Disconnected | GatewayState::Error => {}
            state => return Err(self.state_error("connect", state)),
        }
        self.state = GatewayState::Connecting;
        debug!(gateway = %self.config.name, "connecting");
        self.state = GatewayState::Connected;
        info!(gateway = %self.config.name, account = %self.account.name(), "connected");
        Ok(())
    }

    /// Moves back to `Disconnected`. Subscribers stay registered.
    pub fn disconnect(&mut self) {
        if self.state != GatewayState::Disconnected {
            info!(gateway = %self.config.name, "disconnected");
        }
        self.state = GatewayState::Disconnected;
    }

    /// Fires the cancellation token: every subscriber is dropped and the order stream closes.
    /// Returns `false` if it had already fired.
    pub fn cancel(&mut self) -> bool {
        let fired = self.token.cancel();
        self.state = GatewayState::Disconnected;
        fired
    }

    /// Registers a subscriber. Fails once the gateway is cancelled.
    pub fn subscribe(&self, subscriber: impl Subscriber + 'static) -> Result<SubscriptionId> {
        self.broadcaster.subscribe(Box::new(subscriber))
    }

    /// Registers a closure as a subscriber.
    pub fn on_bucket<F>(&self, handler: F) -> Result<SubscriptionId>
    where
        F: FnMut(&BucketEvent<'_>) + Send + 'static,
    {
        self.subscribe(handler)
    }

    /// Removes a subscriber.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.broadcaster.unsubscribe(id)
    }

    /// Replays the configured source file for the first instrument of the account.
    ///
    /// A missing file puts the gateway in the `Error` state.
    pub fn replay(&mut self) -> Result<usize> {
        let instrument = match self.account.instruments().next() {
            Some(instrument) => instrument.name().to_string(),
            None => return Err(Error::InstrumentNotFound(String::new())),
        };
        let Some(path) = self.config.source.clone() else {
            return Err(self.fail(Error::NoSource(self.config.name.clone())));
        };
        match FileSource::open(&path, instrument) {
            Ok(mut source) => self.run(&mut source),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Pulls every record from `source` until it is exhausted or the gateway is cancelled.
    ///
    /// Connects first if needed. Returns the number of ticks processed.
    pub fn run(&mut self, source: &mut impl TickSource) -> Result<usize> {
        if self.state() != GatewayState::Connected {
            self.connect()?;
        }
        let mut count = 0;
        while let Some(record) = source.next_record() {
            if self.token.is_cancelled() {
                break;
            }
            let record = match record {
                Ok(record) => record,
                Err(e) => return Err(self.fail(e)),
            };
            let mut point = (self.evaluate)(&record.line);
            point.instrument = record.instrument;
            self.pace(point.time);
            match self.push_point(point) {
                Ok(_) => count += 1,
                Err(Error::Cancelled) => break,
                Err(e) => return Err(e),
            }
        }
        info!(gateway = %self.config.name, ticks = count, "replay finished");
        Ok(count)
    }

    /// Parses and processes one raw record.
    pub fn push_record(&mut self, record: &Record) -> Result<usize> {
        let mut point = (self.evaluate)(&record.line);
        point.instrument = record.instrument.clone();
        self.push_point(point)
    }

    /// Processes one tick: bucket, mark, fill, publish, then handle the intents it produced.
    ///
    /// ### Returns
    /// The number of bucket events published. Ticks for unknown instruments are skipped.
    pub fn push_point(&mut self, mut point: Point) -> Result<usize> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.state != GatewayState::Connected {
            return Err(self.state_error("process ticks", self.state));
        }

        let Some(instrument) = self.account.instrument(&point.instrument) else {
            warn!(gateway = %self.config.name, instrument = %point.instrument, "tick for unknown instrument skipped");
            return Ok(0);
        };
        update_point_params(&mut point, &self.account, instrument);
        let updates = match self.account.instrument_mut(&point.instrument) {
            Some(instrument) => instrument.add(&point),
            None => Vec::new(),
        };

        self.account.mark(&point.instrument, point.price());
        for execution in self.venue.on_tick(&point) {
            if let Err(e) = self.account.fill(execution.order_id, execution.price, execution.time) {
                self.sink.error(&e.to_string());
            }
        }
        self.last_tick = Some(point.time);

        let mut published = 0;
        for update in &updates {
            if self.token.is_cancelled() {
                break;
            }
            self.publish(update);
            published += 1;
            self.drain_intents();
        }
        Ok(published)
    }

    fn publish(&self, update: &BucketUpdate) {
        let Some(series) = self
            .account
            .instrument(&update.instrument)
            .and_then(|instrument| instrument.series(update.timeframe))
        else {
            return;
        };
        let event = BucketEvent {
            update,
            series,
            account: &self.account,
            orders: &self.orders,
            token: &self.token,
        };
        let reached = self.broadcaster.publish(|subscriber| subscriber.on_bucket(&event));
        debug!(
            instrument = %update.instrument,
            timeframe = ?update.timeframe,
            index = update.index,
            kind = ?update.kind,
            subscribers = reached,
            "bucket published"
        );
    }

    fn drain_intents(&mut self) {
        while let Ok(intent) = self.intents.try_recv() {
            match intent {
                OrderIntent::Create(orders) => self.create_orders(orders),
                OrderIntent::Cancel(id) => self.cancel_order(id),
            }
        }
    }

    fn create_orders(&mut self, orders: Vec<Order>) {
        let errors = self.validator.validate(&self.config.name, &self.account, &orders);
        if !errors.is_empty() {
            for e in &errors {
                self.sink.error(&e.to_string());
            }
            warn!(gateway = %self.config.name, orders = orders.len(), errors = errors.len(), "order batch rejected");
            for order in orders {
                self.account.record_rejected(order);
            }
            return;
        }
        for order in orders {
            self.venue.submit(&order);
            self.account.place(order);
        }
    }

    fn cancel_order(&mut self, id: u64) {
        self.venue.cancel(id);
        if let Err(e) = self.account.cancel_order(id) {
            self.sink.error(&e.to_string());
        }
    }

    fn pace(&mut self, time: DateTime<Utc>) {
        if let Some(prev) = self.last_tick {
            if let Some(delay) = replay_delay(prev, time, self.config.speed) {
                std::thread::sleep(delay);
            }
        }
    }

    fn fail(&mut self, e: Error) -> Error {
        self.state = GatewayState::Error;
        error!(gateway = %self.config.name, error = %e, "gateway failed");
        self.sink.error(&e.to_string());
        e
    }

    fn state_error(&self, action: &'static str, state: GatewayState) -> Error {
        Error::GatewayState {
            name: self.config.name.clone(),
            action,
            state: state.to_string(),
        }
    }
}

impl<V: Venue + fmt::Debug> fmt::Debug for Gateway<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("venue", &self.venue)
            .field("subscribers", &self.broadcaster.len())
            .finish_non_exhaustive()
    }
}
