//! Progress reporting for consolidation runs

mod handler;
mod logging;

pub use handler::{ConsolidationEvent, NoOpHandler, ProgressHandler};
pub use logging::LoggingHandler;
