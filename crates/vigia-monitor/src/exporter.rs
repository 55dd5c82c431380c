use crate::alert::AlertLevel;
use crate::metric::{MetricType, WindowStats};
use prometheus::{CounterVec, Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};

/// Prometheus 指标导出器
pub struct MetricsExporter {
    metric_samples: GaugeVec,
    metric_avg: GaugeVec,
    metric_p95: GaugeVec,
    active_alerts: GaugeVec,
    subscribers: Gauge,
    alerts_total: CounterVec,
    registry: Registry,
}

impl MetricsExporter {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // 窗口统计
        let metric_samples = GaugeVec::new(
            Opts::new("vigia_metric_samples", "Samples inside the dashboard window"),
            &["metric"],
        )?;
        registry.register(Box::new(metric_samples.clone()))?;

        let metric_avg = GaugeVec::new(
            Opts::new("vigia_metric_avg", "Windowed average per metric"),
            &["metric"],
        )?;
        registry.register(Box::new(metric_avg.clone()))?;

        let metric_p95 = GaugeVec::new(
            Opts::new("vigia_metric_p95", "Windowed 95th percentile per metric"),
            &["metric"],
        )?;
        registry.register(Box::new(metric_p95.clone()))?;

        // 告警
        let active_alerts = GaugeVec::new(
            Opts::new("vigia_active_alerts", "Number of active alerts"),
            &["level"],
        )?;
        registry.register(Box::new(active_alerts.clone()))?;

        let alerts_total = CounterVec::new(
            Opts::new("vigia_alerts_total", "Total number of alerts raised"),
            &["level"],
        )?;
        registry.register(Box::new(alerts_total.clone()))?;

        let subscribers = Gauge::new("vigia_subscribers", "Number of live dashboard subscribers")?;
        registry.register(Box::new(subscribers.clone()))?;

        Ok(Self {
            metric_samples,
            metric_avg,
            metric_p95,
            active_alerts,
            subscribers,
            alerts_total,
            registry,
        })
    }

    pub fn update_metric(&self, metric: MetricType, stats: &WindowStats) {
        let label = [metric.as_str()];
        self.metric_samples
            .with_label_values(&label)
            .set(stats.count as f64);

        match stats.avg {
            Some(avg) => self.metric_avg.with_label_values(&label).set(avg),
            None => {
                let _ = self.metric_avg.remove_label_values(&label);
            }
        }
        match stats.p95 {
            Some(p95) => self.metric_p95.with_label_values(&label).set(p95),
            None => {
                let _ = self.metric_p95.remove_label_values(&label);
            }
        }
    }

    pub fn set_active_alerts(&self, level: AlertLevel, count: usize) {
        self.active_alerts
            .with_label_values(&[level.as_str()])
            .set(count as f64);
    }

    pub fn record_alert(&self, level: AlertLevel) {
        self.alerts_total.with_label_values(&[level.as_str()]).inc();
    }

    pub fn set_subscribers(&self, count: usize) {
        self.subscribers.set(count as f64);
    }

    // 导出指标
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_window_stats() {
        let exporter = MetricsExporter::new().unwrap();
        let stats = WindowStats::from_values(vec![100.0, 300.0]);

        exporter.update_metric(MetricType::SearchLatency, &stats);
        exporter.record_alert(AlertLevel::Critical);
        exporter.set_active_alerts(AlertLevel::Critical, 1);
        exporter.set_subscribers(2);

        let text = exporter.export().unwrap();
        assert!(text.contains("vigia_metric_avg{metric=\"search_latency\"} 200"));
        assert!(text.contains("vigia_alerts_total{level=\"critical\"} 1"));
        assert!(text.contains("vigia_subscribers 2"));
    }

    #[test]
    fn test_empty_window_removes_series() {
        let exporter = MetricsExporter::new().unwrap();
        exporter.update_metric(MetricType::ErrorRate, &WindowStats::from_values(vec![0.5]));
        exporter.update_metric(MetricType::ErrorRate, &WindowStats::empty());

        let text = exporter.export().unwrap();
        assert!(!text.contains("vigia_metric_avg{metric=\"error_rate\"}"));
        assert!(text.contains("vigia_metric_samples{metric=\"error_rate\"} 0"));
    }
}
