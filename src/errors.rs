use std::time::Duration;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A series was created with a zero-width bucket.
    #[error("Timeframe must be greater than zero (got: {0:?})")]
    ZeroTimeframe(Duration),

    /// The initial balance is not positive. Trading requires a positive balance.
    #[error("Balance must be positive (got: {0})")]
    NegZeroBalance(f64),

    /// The instrument is not registered on the account.
    #[error("Instrument not found: {0}")]
    InstrumentNotFound(String),

    /// The order was not found.
    #[error("Order not found: {0}")]
    OrderNotFound(u64),

    /// The fill size must be strictly positive.
    #[error("Fill size must be positive (got: {0})")]
    NegZeroSize(f64),

    /// The fill price must be finite and positive.
    #[error("Fill price must be positive and finite (got: {0})")]
    InvalidPrice(f64),

    /// The gateway refused an operation in its current state.
    #[error("Gateway `{name}` cannot {action} while {state}")]
    GatewayState {
        /// Gateway name.
        name: String,
        /// Attempted action.
        action: &'static str,
        /// Current state.
        state: String,
    },

    /// The gateway was asked to replay without a tick file.
    #[error("Gateway `{0}` has no tick source configured")]
    NoSource(String),

    /// The pipeline was cancelled; the stream no longer accepts messages.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),

    /// JSON serialization/deserialization error occurred.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
