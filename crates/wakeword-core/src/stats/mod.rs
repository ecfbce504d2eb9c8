//! Statistics module
//!
//! Counters, timings and detection history of one detector instance.

pub mod store;

pub use store::{DetectionEvent, DetectorStats, Measurement, StatsStore};
