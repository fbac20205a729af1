use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct QueryMetrics {
    pub query_count: u64,
    pub total_latency: Duration,
    pub min_latency: Duration,
    pub max_latency: Duration,
}

impl Default for QueryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryMetrics {
    pub fn new() -> Self {
        Self {
            query_count: 0,
            total_latency: Duration::ZERO,
            min_latency: Duration::MAX,
            max_latency: Duration::ZERO,
        }
    }

    pub fn record_query(&mut self, latency: Duration) {
        self.query_count += 1;
        self.total_latency += latency;

        if latency < self.min_latency {
            self.min_latency = latency;
        }
        if latency > self.max_latency {
            self.max_latency = latency;
        }
    }

    pub fn average_latency(&self) -> Duration {
        if self.query_count == 0 {
            return Duration::ZERO;
        }
        self.total_latency / self.query_count as u32
    }
}

/// Counters kept by one engine instance.
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub cursors_opened: u64,
    pub cursors_closed: u64,
    pub rows_fetched: u64,
    pub driver_errors: u64,
    pub driver_warnings: u64,
    pub queries: QueryMetrics,
    start_time: Instant,
}

/// Serializable point-in-time view of [`EngineMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub cursors_opened: u64,
    pub cursors_closed: u64,
    pub executes: u64,
    pub rows_fetched: u64,
    pub driver_errors: u64,
    pub driver_warnings: u64,
    pub avg_execute_latency_us: u64,
    pub max_execute_latency_us: u64,
    pub uptime_secs: u64,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            connections_opened: 0,
            connections_closed: 0,
            cursors_opened: 0,
            cursors_closed: 0,
            rows_fetched: 0,
            driver_errors: 0,
            driver_warnings: 0,
            queries: QueryMetrics::new(),
            start_time: Instant::now(),
        }
    }

    pub fn record_execute(&mut self, latency: Duration) {
        self.queries.record_query(latency);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened,
            connections_closed: self.connections_closed,
            cursors_opened: self.cursors_opened,
            cursors_closed: self.cursors_closed,
            executes: self.queries.query_count,
            rows_fetched: self.rows_fetched,
            driver_errors: self.driver_errors,
            driver_warnings: self.driver_warnings,
            avg_execute_latency_us: self.queries.average_latency().as_micros() as u64,
            max_execute_latency_us: self.queries.max_latency.as_micros() as u64,
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_metrics_new() {
        let metrics = QueryMetrics::new();
        assert_eq!(metrics.query_count, 0);
        assert_eq!(metrics.total_latency, Duration::ZERO);
        assert_eq!(metrics.min_latency, Duration::MAX);
        assert_eq!(metrics.max_latency, Duration::ZERO);
    }

    #[test]
    fn test_query_metrics_record_multiple_queries() {
        let mut metrics = QueryMetrics::new();
        metrics.record_query(Duration::from_millis(50));
        metrics.record_query(Duration::from_millis(100));
        metrics.record_query(Duration::from_millis(75));

        assert_eq!(metrics.query_count, 3);
        assert_eq!(metrics.min_latency, Duration::from_millis(50));
        assert_eq!(metrics.max_latency, Duration::from_millis(100));
    }

    #[test]
    fn test_query_metrics_average_latency() {
        let mut metrics = QueryMetrics::new();
        assert_eq!(metrics.average_latency(), Duration::ZERO);

        metrics.record_query(Duration::from_millis(100));
        metrics.record_query(Duration::from_millis(200));
        assert_eq!(metrics.average_latency(), Duration::from_millis(150));
    }

    #[test]
    fn test_snapshot_reflects_counters() {
        let mut metrics = EngineMetrics::new();
        metrics.connections_opened = 2;
        metrics.rows_fetched = 10;
        metrics.record_execute(Duration::from_micros(300));
        metrics.record_execute(Duration::from_micros(100));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_opened, 2);
        assert_eq!(snapshot.rows_fetched, 10);
        assert_eq!(snapshot.executes, 2);
        assert_eq!(snapshot.avg_execute_latency_us, 200);
        assert_eq!(snapshot.max_execute_latency_us, 300);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_string(&EngineMetrics::new().snapshot()).unwrap();
        assert!(json.contains("\"executes\":0"));
        assert!(json.contains("\"driver_errors\":0"));
    }
}
