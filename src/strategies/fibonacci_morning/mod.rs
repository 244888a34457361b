//! Fibonacci Morning Strategy
//!
//! Buys the first retracement of the market-open impulse candle.

mod config;
mod strategy;

pub use config::FibonacciMorningConfig;
pub use strategy::{FibLevels, FibonacciMorningStrategy};
