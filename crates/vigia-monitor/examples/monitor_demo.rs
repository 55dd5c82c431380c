use std::sync::Arc;
use vigia_monitor::{ChannelSink, MetricType, MonitorConfig, NotificationConfig, SearchMonitor};

#[tokio::main]
async fn main() -> vigia_monitor::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== Vigia 搜索监控示例 ===\n");

    // 1. 创建监控引擎
    println!("1. 创建监控引擎");
    let monitor = Arc::new(SearchMonitor::new(MonitorConfig::default())?);
    for threshold in monitor.thresholds().await {
        println!(
            "   {}: warning={} critical={} duration={}s cooldown={}s",
            threshold.metric, threshold.warning, threshold.critical, threshold.duration_secs, threshold.cooldown_secs
        );
    }
    println!();

    // 2. 配置通知渠道
    println!("2. 配置通知渠道");
    monitor
        .configure_notifications(NotificationConfig {
            enabled: true,
            email_recipients: vec!["ops@example.com".to_string()],
            ..Default::default()
        })
        .await;
    println!();

    // 3. 订阅仪表盘
    println!("3. 订阅仪表盘");
    let (sink, mut rx) = ChannelSink::new();
    let subscriber = monitor.subscribe(Arc::new(sink)).await;
    println!("   订阅者 {} 已连接\n", subscriber);

    // 4. 模拟搜索流量
    println!("4. 模拟搜索流量");
    for latency in [120.0, 180.0, 95.0, 640.0, 710.0, 820.0] {
        monitor.record_metric(MetricType::SearchLatency, latency, None).await;
    }
    monitor.record_cache_hit_rate(42, 8).await;
    monitor.record_zero_results("pão de queijo sem glúten", None).await;
    monitor.record_memory_usage(Some("search-index")).await;
    monitor.record_search_trend("bolo de cenoura", 130.0, true).await;
    monitor.record_search_trend("bolo de cenoura", 170.0, true).await;

    let result: Result<(), String> = monitor
        .measure_execution_time(MetricType::FilterLatency, None, || async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Err("filter backend unavailable".to_string())
        })
        .await;
    println!("   过滤操作结果: {:?}\n", result);

    // 5. 查看告警
    println!("5. 活跃告警");
    for alert in monitor.get_active_alerts().await {
        println!("   [{}] {}", alert.level, alert.message);
    }
    println!();

    // 6. 推送消息
    println!("6. 订阅者收到的消息");
    while let Ok(payload) = rx.try_recv() {
        let value: serde_json::Value = serde_json::from_str(&payload)?;
        println!("   type={}", value["type"]);
    }
    println!();

    // 7. 系统健康与报告
    println!("7. 系统健康");
    let health = monitor.get_system_health().await;
    println!("   overall={:?}", health.overall);
    for (metric, status) in &health.components {
        println!("   {} => {:?}", metric, status);
    }
    println!();

    println!("8. 性能报告");
    let report = monitor.generate_performance_report().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    monitor.shutdown().await;
    println!("\n=== 示例完成 ===");
    Ok(())
}
