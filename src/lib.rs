pub mod bars;
pub mod config;
pub mod costs;
pub mod engine;
pub mod loader;
pub mod models;
pub mod optimizer;
pub mod param_utils;
pub mod performance;
pub mod strategy;
pub mod walkforward;
pub mod walkforward_optimizer;
