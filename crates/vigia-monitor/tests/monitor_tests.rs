use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use vigia_monitor::{
    AlertLevel, AlertThresholdConfig, AnomalySeverity, ChannelSink, FixedMemoryProbe, ManualClock, MetricType,
    MonitorConfig, MonitorError, PushSink, SearchMonitor,
};

fn monitor_with_clock() -> (Arc<SearchMonitor>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let monitor = SearchMonitor::with_clock(MonitorConfig::default(), clock.clone()).unwrap();
    (Arc::new(monitor), clock)
}

fn drain(rx: &mut Receiver<String>) -> Vec<serde_json::Value> {
    let mut messages = Vec::new();
    while let Ok(payload) = rx.try_recv() {
        messages.push(serde_json::from_str(&payload).unwrap());
    }
    messages
}

/// 第一次发送成功，之后全部失败
struct FlakySink {
    sends: AtomicUsize,
}

impl PushSink for FlakySink {
    fn is_open(&self) -> bool {
        true
    }

    fn send(&self, _payload: &str) -> vigia_monitor::Result<()> {
        if self.sends.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(())
        } else {
            Err(MonitorError::Sink("broken pipe".to_string()))
        }
    }
}

#[tokio::test]
async fn test_bounded_buffer_keeps_latest_samples() {
    let config = MonitorConfig {
        max_data_points: 10,
        ..Default::default()
    };
    let monitor = SearchMonitor::with_clock(config, Arc::new(ManualClock::default())).unwrap();

    for i in 0..15 {
        monitor.record_metric(MetricType::SuggestionLatency, i as f64, None).await;
    }

    let stats = monitor
        .get_metric_stats(MetricType::SuggestionLatency, Duration::hours(1))
        .await;
    assert_eq!(stats.count, 10);
    assert_eq!(stats.min, Some(5.0));
    assert_eq!(stats.max, Some(14.0));
}

#[tokio::test]
async fn test_window_stats() {
    let (monitor, _clock) = monitor_with_clock();

    for value in [100.0, 200.0, 300.0, 400.0, 500.0] {
        monitor.record_metric(MetricType::FilterLatency, value, None).await;
    }

    let stats = monitor.get_metric_stats(MetricType::FilterLatency, Duration::minutes(5)).await;
    assert_eq!(stats.count, 5);
    assert_eq!(stats.min, Some(100.0));
    assert_eq!(stats.max, Some(500.0));
    assert_eq!(stats.avg, Some(300.0));
    assert_eq!(stats.p95, Some(500.0));

    let empty = monitor.get_metric_stats(MetricType::CacheHitRate, Duration::minutes(5)).await;
    assert_eq!(empty.count, 0);
    assert!(empty.min.is_none() && empty.max.is_none() && empty.avg.is_none() && empty.p95.is_none());
}

#[tokio::test]
async fn test_alert_lifecycle() {
    let (monitor, clock) = monitor_with_clock();
    let (sink, mut rx) = ChannelSink::new();
    monitor.subscribe(Arc::new(sink)).await;
    drain(&mut rx);

    // 五个 600ms 样本只产生一个 WARNING
    for _ in 0..5 {
        monitor.record_metric(MetricType::SearchLatency, 600.0, None).await;
    }

    let active = monitor.get_active_alerts().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].level, AlertLevel::Warning);
    assert_eq!(active[0].metric, MetricType::SearchLatency);

    let pushed: Vec<_> = drain(&mut rx).into_iter().filter(|m| m["type"] == "alert").collect();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0]["data"]["level"], "warning");

    // 冷却期内不再告警
    clock.advance(Duration::seconds(30));
    monitor.record_metric(MetricType::SearchLatency, 650.0, None).await;
    assert_eq!(monitor.get_alert_history(100).await.len(), 1);

    // 窗口平均值回落到 warning 以下后解决
    for _ in 0..10 {
        monitor.record_metric(MetricType::SearchLatency, 100.0, None).await;
    }
    assert!(monitor.get_active_alerts().await.is_empty());
    assert_eq!(monitor.status().await.active_alerts, 0);

    let recent = monitor.get_recent_alerts(Duration::minutes(5)).await;
    assert_eq!(recent.len(), 1);
    assert!(monitor.acknowledge_alert(&recent[0].id, "oncall").await);
    assert!(monitor.get_alert_history(1).await[0].acknowledged);
}

#[tokio::test]
async fn test_alert_refires_after_cooldown() {
    let (monitor, clock) = monitor_with_clock();

    monitor.record_metric(MetricType::SearchLatency, 600.0, None).await;
    clock.advance(Duration::seconds(301));
    monitor.record_metric(MetricType::SearchLatency, 600.0, None).await;

    let history = monitor.get_alert_history(10).await;
    assert_eq!(history.len(), 2);
    assert_ne!(history[0].id, history[1].id);
    assert_eq!(monitor.get_active_alerts().await.len(), 1);
}

#[tokio::test]
async fn test_critical_alert_takes_precedence() {
    let (monitor, _clock) = monitor_with_clock();

    monitor.record_metric(MetricType::ErrorRate, 0.5, None).await;

    let active = monitor.get_active_alerts().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].level, AlertLevel::Critical);
    assert_eq!(active[0].threshold, 0.1);
}

#[tokio::test]
async fn test_set_threshold_changes_evaluation() {
    let (monitor, _clock) = monitor_with_clock();

    monitor
        .set_threshold(AlertThresholdConfig::new(MetricType::LevenshteinCalls, 100.0, 500.0, 60, 60))
        .await
        .unwrap();
    monitor.record_levenshtein_calls(150, None).await;

    let active = monitor.get_active_alerts().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].metric, MetricType::LevenshteinCalls);

    let invalid = AlertThresholdConfig::new(MetricType::LevenshteinCalls, 900.0, 500.0, 60, 60);
    assert!(monitor.set_threshold(invalid).await.is_err());
}

#[tokio::test]
async fn test_anomaly_detection() {
    let (monitor, _clock) = monitor_with_clock();

    for i in 0..50 {
        let value = if i % 2 == 0 { 90.0 } else { 110.0 };
        monitor.record_metric(MetricType::SuggestionLatency, value, None).await;
    }
    assert!(monitor.detect_anomalies().await.is_empty());

    monitor.record_metric(MetricType::SuggestionLatency, 200.0, None).await;
    let anomalies = monitor.detect_anomalies().await;

    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].metric, MetricType::SuggestionLatency);
    assert_eq!(anomalies[0].severity, AnomalySeverity::High);
    assert!(anomalies[0].z_score > 3.0);

    // 异常不影响告警
    assert!(monitor.get_active_alerts().await.is_empty());
    assert_eq!(monitor.get_anomalies().await.len(), 1);
}

#[tokio::test]
async fn test_search_trend_running_average() {
    let (monitor, _clock) = monitor_with_clock();

    monitor.record_search_trend("bolo", 100.0, true).await;
    monitor.record_search_trend("bolo", 200.0, false).await;
    monitor.record_search_trend("torta", 50.0, true).await;

    let trends = monitor.get_search_trends(10).await;
    assert_eq!(trends[0].query, "bolo");
    assert_eq!(trends[0].frequency, 2);
    assert_eq!(trends[0].avg_latency, 150.0);
    assert_eq!(trends[0].success_rate, 0.5);

    let advanced = monitor.get_advanced_metrics().await;
    assert_eq!(advanced.search_trends.len(), 2);
}

#[tokio::test]
async fn test_system_health_and_uptime() {
    let (monitor, clock) = monitor_with_clock();

    monitor.record_metric(MetricType::MemoryUsage, 85.0, None).await;
    clock.advance(Duration::seconds(10));

    let health = monitor.get_system_health().await;
    assert_eq!(health.overall, vigia_monitor::HealthStatus::Warning);
    assert_eq!(health.components[&MetricType::MemoryUsage], vigia_monitor::HealthStatus::Warning);
    assert_eq!(health.components[&MetricType::SearchLatency], vigia_monitor::HealthStatus::Healthy);
    assert_eq!(health.uptime_ms, 10_000);
}

#[tokio::test]
async fn test_cleanup_and_clear() {
    let (monitor, clock) = monitor_with_clock();

    monitor.record_metric(MetricType::ZeroResults, 1.0, None).await;
    clock.advance(Duration::hours(25));
    monitor.record_zero_results("pão de queijo", None).await;

    assert_eq!(monitor.cleanup_old_data().await, 1);

    monitor.record_search_trend("bolo", 10.0, true).await;
    monitor.clear_metrics().await;

    let report = monitor.generate_performance_report().await;
    assert_eq!(report.metrics[&MetricType::ZeroResults].count, 0);
    assert!(report.recent_alerts.is_empty());
    assert!(report.advanced_metrics.search_trends.is_empty());
}

#[tokio::test]
async fn test_performance_baseline_update() {
    let (monitor, _clock) = monitor_with_clock();

    let initial = monitor.get_advanced_metrics().await.performance_baseline;
    assert_eq!(initial.avg_search_latency, 200.0);

    monitor.record_metric(MetricType::SearchLatency, 120.0, None).await;
    let baseline = monitor.update_performance_baseline().await;

    assert_eq!(baseline.avg_search_latency, 120.0);
    assert_eq!(baseline.avg_suggestion_latency, 100.0);
}

#[tokio::test]
async fn test_failing_subscriber_does_not_block_others() {
    let (monitor, _clock) = monitor_with_clock();
    let (good, mut rx) = ChannelSink::new();

    monitor
        .subscribe(Arc::new(FlakySink {
            sends: AtomicUsize::new(0),
        }))
        .await;
    monitor.subscribe(Arc::new(good)).await;
    assert_eq!(monitor.subscriber_count().await, 2);
    drain(&mut rx);

    let report = monitor.broadcast_snapshot().await;

    assert_eq!(report.delivered, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(monitor.subscriber_count().await, 1);
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn test_stalled_subscriber_is_unregistered() {
    let (monitor, _clock) = monitor_with_clock();
    let (stalled, _stalled_rx) = ChannelSink::with_capacity(4);
    let (good, mut rx) = ChannelSink::new();

    monitor.subscribe(Arc::new(stalled)).await;
    monitor.subscribe(Arc::new(good)).await;

    // 初始快照占用 1 个位置，再广播 3 次后队列写满
    for _ in 0..3 {
        assert_eq!(monitor.broadcast_snapshot().await.delivered, 2);
        drain(&mut rx);
    }

    let report = monitor.broadcast_snapshot().await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(monitor.subscriber_count().await, 1);

    for _ in 0..100 {
        monitor.broadcast_snapshot().await;
        drain(&mut rx);
    }
    assert_eq!(monitor.subscriber_count().await, 1);
}

#[tokio::test]
async fn test_huge_windows_degrade_safely() {
    let config = MonitorConfig {
        retention_secs: u64::MAX,
        ..Default::default()
    };
    assert!(SearchMonitor::new(config).is_err());

    let (monitor, clock) = monitor_with_clock();
    monitor.record_metric(MetricType::ErrorRate, 0.5, None).await;
    clock.advance(Duration::days(3));

    let huge = Duration::seconds(9_467_280_000_000);
    assert_eq!(monitor.get_metric_stats(MetricType::ErrorRate, huge).await.count, 1);
    assert_eq!(monitor.get_recent_alerts(huge).await.len(), 1);
    assert_eq!(monitor.get_metric_stats(MetricType::ErrorRate, -huge).await.count, 1);
    assert_eq!(monitor.cleanup_old_data().await, 1);
}

#[tokio::test]
async fn test_alert_history_is_most_recent_first() {
    let (monitor, clock) = monitor_with_clock();

    monitor.record_metric(MetricType::SearchLatency, 600.0, None).await;
    clock.advance(Duration::seconds(301));
    monitor.record_metric(MetricType::SearchLatency, 2000.0, None).await;

    let history = monitor.get_alert_history(10).await;
    assert_eq!(history.len(), 2);
    assert!(history[0].created_at > history[1].created_at);
    assert_eq!(monitor.get_alert_history(1).await[0].id, history[0].id);

    let status = monitor.status().await;
    assert_eq!(status.total_alerts, 2);
    assert_eq!(status.metrics_collected, 2);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_broadcast_and_idempotent_shutdown() {
    let monitor = SearchMonitor::with_clock(MonitorConfig::default(), Arc::new(ManualClock::default()))
        .unwrap()
        .with_memory_probe(Box::new(FixedMemoryProbe(Some(30.0))));
    let monitor = Arc::new(monitor);
    let (sink, mut rx) = ChannelSink::new();

    monitor.start().await;
    monitor.start().await;
    assert_eq!(monitor.status().await.active_tasks, 4);

    monitor.subscribe(Arc::new(sink)).await;
    tokio::time::sleep(std::time::Duration::from_secs(11)).await;

    let snapshots = drain(&mut rx);
    assert_eq!(snapshots.len(), 3);
    assert!(snapshots.iter().all(|m| m["type"] == "snapshot"));

    monitor.shutdown().await;
    monitor.shutdown().await;

    let status = monitor.status().await;
    assert!(!status.running);
    assert_eq!(status.active_tasks, 0);
    assert_eq!(status.subscribers, 0);
}
