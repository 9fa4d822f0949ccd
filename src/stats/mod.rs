pub mod aggregator;
pub mod alerts;
pub mod trend;
