pub mod events;
pub mod logging;
pub mod metrics;

// Re-export common functions and types
pub use events::{EventLevel, EventLog, LogEvent, LogSink, TracingSink};
pub use logging::init_logging;
pub use metrics::{RunReport, RunStats, RunSummary};
