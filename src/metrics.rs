//! Account statement and performance metrics.
//!
//! A [`Statement`] replays the closed positions of an account in closing order and derives:
//! - Max drawdown
//! - Profit factor
//! - Sharpe ratio
//! - Win rate
//! - Total return
//!
//! It needs the `metrics` feature (on by default).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    PercentCalculus,
    engine::{Account, OrderSide, Position},
};

/// One closed trade and the balance right after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementEntry {
    /// Closing time, or opening time when unknown.
    pub time: Option<DateTime<Utc>>,
    pub instrument: String,
    pub side: OrderSide,
    /// Gain or loss of the trade, commission excluded.
    pub gain_loss: f64,
    pub commission: f64,
    /// Running balance after this trade.
    pub value: f64,
    /// Running balance at the worst point of the trade.
    pub min: f64,
    /// Running balance at the best point of the trade.
    pub max: f64,
}

/// Trade-by-trade equity statement of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    initial_balance: f64,
    balance: f64,
    unrealized: f64,
    fees: f64,
    entries: Vec<StatementEntry>,
}

impl From<&Account> for Statement {
    fn from(account: &Account) -> Self {
        let mut positions: Vec<&Position> = account.positions().iter().collect();
        positions.sort_by_key(|p| p.close_time.or(p.time));
        Self::new(account.initial_balance(), positions, account.unrealized())
    }
}

impl Statement {
    /// Builds a statement from closed positions, already sorted by time.
    pub fn new<'p>(initial_balance: f64, positions: impl IntoIterator<Item = &'p Position>, unrealized: f64) -> Self {
        let mut value = initial_balance;
        let mut fees = 0.0;
        let mut entries = Vec::new();
        for position in positions {
            let commission = position.commission();
            let start = value;
            value = start + position.gain_loss() - commission;
            fees += commission;
            entries.push(StatementEntry {
                time: position.close_time.or(position.time),
                instrument: position.instrument.clone(),
                side: position.side,
                gain_loss: position.gain_loss(),
                commission,
                value,
                min: start + position.gain_loss_min() - commission,
                max: start + position.gain_loss_max() - commission,
            });
        }
        Self {
            initial_balance,
            balance: value,
            unrealized,
            fees,
            entries,
        }
    }

    /// Returns the initial balance.
    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Balance after the last closed trade.
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Unrealized gain/loss of positions still open.
    pub fn unrealized(&self) -> f64 {
        self.unrealized
    }

    /// Commissions of the closed trades.
    pub fn fees(&self) -> f64 {
        self.fees
    }

    /// Returns the entries, oldest first.
    pub fn entries(&self) -> std::slice::Iter<'_, StatementEntry> {
        self.entries.iter()
    }

    /// Computes the maximum drawdown as a percentage, using the worst point of each trade.
    pub fn max_drawdown(&self) -> f64 {
        let mut max_peak = self.initial_balance;
        let mut max_drawdown: f64 = 0.0;

        for entry in &self.entries {
            let drawdown = (max_peak - entry.min.min(entry.value)) / max_peak;
            max_drawdown = max_drawdown.max(drawdown);
            max_peak = max_peak.max(entry.value).max(entry.max);
        }

        max_drawdown * 100.0
    }

    /// Computes the profit factor: gross gains over gross losses.
    pub fn profit_factor(&self) -> f64 {
        let (gains, losses) = self.entries.iter().fold((0.0, 0.0), |(gains, losses), entry| {
            let net = entry.gain_loss - entry.commission;
            if net > 0.0 { (gains + net, losses) } else { (gains, losses + net.abs()) }
        });

        if losses == 0.0 {
            return f64::INFINITY;
        }
        gains / losses
    }

    /// Computes the Sharpe ratio of per-trade returns.
    ///
    /// `risk_free_rate` is the per-trade risk-free return (e.g., 0.0 for simplicity).
    pub fn sharpe_ratio(&self, risk_free_rate: f64) -> f64 {
        let mut previous = self.initial_balance;
        let returns: Vec<f64> = self
            .entries
            .iter()
            .map(|entry| {
                let r = (entry.value - previous) / previous;
                previous = entry.value;
                r
            })
            .collect();

        let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;
        let std_dev = (returns.iter().map(|r| (r - mean_return).powi(2)).sum::<f64>() / returns.len() as f64).sqrt();

        (mean_return - risk_free_rate) / std_dev
    }

    /// Computes the win rate as a percentage of trades closed with a net gain.
    pub fn win_rate(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let winning = self.entries.iter().filter(|e| e.gain_loss - e.commission > 0.0).count();
        (winning as f64 / self.entries.len() as f64) * 100.0
    }

    /// Percentage change from the initial balance to the balance after the last trade.
    pub fn total_return(&self) -> f64 {
        self.initial_balance.change(self.balance)
    }

    /// Serializes the statement as pretty JSON.
    pub fn to_json(&self) -> crate::errors::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Statement ===")?;
        writeln!(f, "Initial Balance: {:.2}", self.initial_balance)?;
        writeln!(f, "Final Balance: {:.2}", self.balance)?;
        writeln!(f, "Unrealized P&L: {:.2}", self.unrealized)?;
        writeln!(f, "Fees paid: {:.2}", self.fees)?;
        writeln!(f, "Trades: {}", self.entries.len())?;
        writeln!(f)?;
        writeln!(f, "Total Return: {:.2}%", self.total_return())?;
        writeln!(f, "Max Drawdown: {:.2}%", self.max_drawdown())?;
        writeln!(f, "Profit Factor: {:.2}", self.profit_factor())?;
        writeln!(f, "Sharpe Ratio (risk-free rate = 0.0): {:.2}", self.sharpe_ratio(0.0))?;
        writeln!(f, "Win Rate: {:.2}%", self.win_rate())
    }
}

#[cfg(test)]
fn trade(account: &mut Account, side: OrderSide, open: f64, close: f64, secs: i64) {
    let time = DateTime::from_timestamp(secs, 0).unwrap();
    let entry = account.place((side, 1.0, "GOOG").into());
    account.fill(entry, open, time).unwrap();
    let exit = account.place((side.opposite(), 1.0, "GOOG").into());
    account.fill(exit, close, time).unwrap();
}

#[cfg(test)]
fn account() -> Account {
    let instrument = crate::engine::Instrument::new("GOOG", std::time::Duration::from_secs(60)).unwrap();
    Account::new("demo", 100.0).unwrap().with_instrument(instrument)
}

#[cfg(test)]
#[test]
fn statement_running_value() {
    let mut account = account();
    trade(&mut account, OrderSide::Buy, 10.0, 30.0, 0);
    trade(&mut account, OrderSide::Sell, 50.0, 60.0, 60);

    let statement = Statement::from(&account);
    let values: Vec<f64> = statement.entries().map(|e| e.value).collect();
    assert_eq!(values, vec![120.0, 110.0]);
    assert_eq!(statement.balance(), account.balance());
    assert_eq!(statement.total_return(), 10.0);
}

#[cfg(test)]
#[test]
fn max_drawdown() {
    let mut account = account();
    trade(&mut account, OrderSide::Buy, 10.0, 30.0, 0);
    trade(&mut account, OrderSide::Buy, 40.0, 10.0, 60);
    let statement = Statement::from(&account);
    assert_eq!(statement.max_drawdown(), 25.0); // (120 - 90) / 120
}

#[cfg(test)]
#[test]
fn max_drawdown_no_trades() {
    let statement = Statement::from(&account());
    assert_eq!(statement.max_drawdown(), 0.0);
}

#[cfg(test)]
#[test]
fn profit_factor() {
    let mut account = account();
    trade(&mut account, OrderSide::Buy, 10.0, 30.0, 0);
    trade(&mut account, OrderSide::Buy, 30.0, 20.0, 60);
    let statement = Statement::from(&account);
    assert_eq!(statement.profit_factor(), 2.0);
    assert_eq!(statement.win_rate(), 50.0);
}

#[cfg(test)]
#[test]
fn profit_factor_no_losses() {
    let mut account = account();
    trade(&mut account, OrderSide::Buy, 10.0, 30.0, 0);
    assert_eq!(Statement::from(&account).profit_factor(), f64::INFINITY);
    assert_eq!(Statement::from(&account).win_rate(), 100.0);
}

#[cfg(test)]
#[test]
fn sharpe_ratio() {
    let mut account = account();
    trade(&mut account, OrderSide::Buy, 10.0, 15.0, 0);
    trade(&mut account, OrderSide::Buy, 10.0, 8.0, 60);
    trade(&mut account, OrderSide::Buy, 10.0, 14.0, 120);
    let sharpe = Statement::from(&account).sharpe_ratio(0.0);
    assert!(sharpe > 0.0 && sharpe < 1.0);
}

#[cfg(test)]
#[test]
fn sharpe_ratio_no_trades() {
    assert!(Statement::from(&account()).sharpe_ratio(0.0).is_nan());
}

#[cfg(test)]
#[test]
fn display_and_json() {
    let mut account = account();
    trade(&mut account, OrderSide::Buy, 10.0, 30.0, 0);
    let statement = Statement::from(&account);
    assert!(statement.to_string().starts_with("=== Statement ==="));
    let json = statement.to_json().unwrap();
    assert!(json.contains("\"gain_loss\": 20.0"));
}
