// Monitor module for change detection and build triggering

pub mod engine;

pub use engine::{Monitor, MonitorConfig, MonitorEngine};
