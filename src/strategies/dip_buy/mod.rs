//! Dip-Buy Strategy
//!
//! Buys sharp pullbacks inside an intact short-term uptrend.

mod config;
mod strategy;

pub use config::{DipBuyConfig, DipThreshold};
pub use strategy::DipBuyStrategy;
