// Observability: self metrics of the poll loop

pub mod metrics;

pub use metrics::{init, render, PollMetrics, PollOutcome};
