//! Quantbot: an AI-assisted trading decision and execution core.
//!
//! Flow per decision cycle: OHLCV history -> feature windows ->
//! predictor ensemble -> decision policy -> trade gate -> risk sizing
//! -> order validation and routing, with a reinforcement agent learning
//! from realized outcomes and a drift monitor scoring yesterday's
//! forecasts against today's price.

pub mod agent;
pub mod config;
pub mod domain;
pub mod drift;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod features;
pub mod gate;
pub mod ml;
pub mod policy;
pub mod risk;
pub mod weights;

pub use config::AppConfig;
pub use engine::{CycleOutcome, TradingEngine};
pub use error::{QuantbotError, Result};
