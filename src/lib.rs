//! perp-short: anomaly short strategy for OKX USDT perpetual swaps
//!
//! This library provides the core components for:
//! - Signed OKX v5 REST access and swap discovery
//! - 1-minute candle streaming over a reconnecting WebSocket
//! - Rolling close windows and streaming return statistics
//! - Paper/live order management with trailing take-profits
//! - Position book, drawdown stop and volatility gate
//! - Structured logging and Prometheus metrics

pub mod app;
pub mod cli;
pub mod config;
pub mod execution;
pub mod feed;
pub mod market;
pub mod model;
pub mod okx;
pub mod risk;
pub mod strategy;
pub mod telemetry;
pub mod ws;
