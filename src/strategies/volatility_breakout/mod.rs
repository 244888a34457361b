//! Volatility Breakout Strategy
//!
//! Larry Williams style breakout of today's open plus a fraction of
//! yesterday's range, traded only in a bull market with an active volume trend.

mod config;
mod strategy;

pub use config::VolatilityBreakoutConfig;
pub use strategy::{breakout_target, VolatilityBreakoutStrategy};
