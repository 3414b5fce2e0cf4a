//! Core domain types and logic.

pub mod prices;
pub mod signal;
pub mod timeline;
pub mod returns;
pub mod position;
pub mod portfolio;
pub mod execution;
pub mod allocation;
pub mod config;
pub mod config_validation;
pub mod backtest;
pub mod metrics;
pub mod diversification;
pub mod universe;
pub mod result;
pub mod error;
