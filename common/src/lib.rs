// Common library for the drone-trigger agent

pub mod config;
pub mod errors;
pub mod http;
pub mod models;
pub mod monitor;
pub mod path;
pub mod store;
pub mod telemetry;
pub mod trigger;
