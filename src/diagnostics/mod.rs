//! Runtime statistics for the store.

mod statistics;

pub use statistics::{Counter, Statistics, StatisticsSnapshot, Timing, TimingGuard};
