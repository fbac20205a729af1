pub mod logging;
pub mod metrics;

pub use logging::{sanitize_connection_string, StructuredLogger};
pub use metrics::{EngineMetrics, MetricsSnapshot, QueryMetrics};
