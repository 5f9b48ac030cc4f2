use super::MetricsCollector;

pub struct GraphMonitor {
    collector: MetricsCollector,
}

impl GraphMonitor {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }

    pub fn generate_report(&self) -> String {
        let snapshot = self.collector.snapshot();

        if snapshot.is_empty() {
            return "No stages registered".to_string();
        }

        let mut report = String::from("=== Graph Metrics ===\n");

        for (stage, metrics) in snapshot.iter() {
            report.push_str(&format!(
                "\n[{}]\n  Pushed: {}\n  Dropped: {} oldest, {} newest\n  Rejected: {}\n  Dispatches: {}\n  Emitted: {}\n  Errors: {}\n  Avg Latency: {}μs\n",
                stage,
                metrics.pushed,
                metrics.dropped_oldest,
                metrics.dropped_newest,
                metrics.rejected,
                metrics.dispatches,
                metrics.emitted,
                if metrics.errors > 0 {
                    format!("{} error{}", metrics.errors, if metrics.errors == 1 { "" } else { "s" })
                } else {
                    "0 errors".to_string()
                },
                metrics.avg_latency_us
            ));
        }

        report
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::StageMetrics;
    use std::sync::Arc;

    #[test]
    fn test_empty_report() {
        let monitor = GraphMonitor::new(MetricsCollector::new());
        assert_eq!(monitor.generate_report(), "No stages registered");
    }

    #[test]
    fn test_report_lists_stages() {
        let collector = MetricsCollector::new();
        let metrics = Arc::new(StageMetrics::new("sink"));
        metrics.record_error();
        collector.register("sink", metrics);

        let report = GraphMonitor::new(collector).generate_report();
        assert!(report.contains("[sink]"));
        assert!(report.contains("1 error\n"));
    }
}
