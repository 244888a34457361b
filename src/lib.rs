//! VOLT-X
//!
//! Automated spot trading loop for Upbit KRW markets: rotates a set of hot
//! symbols, classifies the market regime from BTC, scans for volume
//! anomalies, evaluates the DIP / VBS / FIB entry strategies and sizes
//! entries under a daily circuit breaker.

pub mod clock;
pub mod config;
pub mod engine;
pub mod exchange;
pub mod indicators;
pub mod ledger;
pub mod notifier;
pub mod regime;
pub mod report;
pub mod risk;
pub mod scanner;
pub mod strategies;
pub mod trader;
pub mod types;
pub mod universe;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{Config, TradingMode};
pub use engine::{check_exit, TickOutcome, TradingEngine};
pub use exchange::{Exchange, ExchangeError, OrderRequest, Timeframe};
pub use types::*;
