use crate::alert::{AlertEvaluator, AlertEvent, AlertLevel, AlertThresholdConfig};
use crate::anomaly::{AnomalyDetector, AnomalyRecord};
use crate::clock::{Clock, SystemClock};
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::exporter::MetricsExporter;
use crate::health::{HealthAggregator, SystemHealthSnapshot};
use crate::hub::{BroadcastReport, DashboardSnapshot, HubMessage, PushSink, SubscriberId, SubscriptionHub};
use crate::metric::{MetricContext, MetricSample, MetricType, WindowStats};
use crate::notifier::{NotificationConfig, NotificationDispatcher};
use crate::report::{AdvancedMetrics, HealthReport, MonitorStatus, PerformanceBaseline, PerformanceReport};
use crate::store::MetricStore;
use crate::system::{MemoryProbe, SysinfoMemoryProbe, FALLBACK_MEMORY_USAGE};
use crate::task::TaskHandle;
use crate::trend::{SearchTrendEntry, SearchTrendTracker};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// 搜索监控引擎
///
/// 把指标存储、告警评估、异常检测、趋势跟踪、健康聚合、订阅推送和通知分发组合在一起。
/// 同时持有多把锁时顺序固定为：store → alerts / anomalies。
pub struct SearchMonitor {
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
    store: RwLock<MetricStore>,
    alerts: RwLock<AlertEvaluator>,
    anomalies: RwLock<AnomalyDetector>,
    trends: RwLock<SearchTrendTracker>,
    baseline: RwLock<PerformanceBaseline>,
    health: HealthAggregator,
    hub: SubscriptionHub,
    dispatcher: RwLock<Arc<NotificationDispatcher>>,
    memory_probe: Box<dyn MemoryProbe>,
    exporter: MetricsExporter,
    tasks: Mutex<Vec<TaskHandle>>,
}

impl SearchMonitor {
    pub fn new(config: MonitorConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: MonitorConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let now = clock.now();
        let exporter = MetricsExporter::new()?;

        info!(
            max_data_points = config.max_data_points,
            retention_secs = config.retention_secs,
            thresholds = config.thresholds.len(),
            "Search monitor created"
        );

        Ok(Self {
            store: RwLock::new(MetricStore::new(config.max_data_points)),
            alerts: RwLock::new(AlertEvaluator::new(config.thresholds.clone(), config.max_alert_history)),
            anomalies: RwLock::new(AnomalyDetector::new(config.anomaly.clone())),
            trends: RwLock::new(SearchTrendTracker::new(config.max_trends)),
            baseline: RwLock::new(PerformanceBaseline::initial(now)),
            health: HealthAggregator::new(config.health_window(), now),
            hub: SubscriptionHub::new(),
            dispatcher: RwLock::new(Arc::new(NotificationDispatcher::new(config.notifications.clone()))),
            memory_probe: Box::new(SysinfoMemoryProbe::new()),
            exporter,
            tasks: Mutex::new(Vec::new()),
            clock,
            config,
        })
    }

    /// 替换内存读取器
    pub fn with_memory_probe(mut self, probe: Box<dyn MemoryProbe>) -> Self {
        self.memory_probe = probe;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ---- 采集 ----

    /// 记录一个指标样本并重新评估该指标的告警阈值
    pub async fn record_metric(&self, metric: MetricType, value: f64, context: Option<MetricContext>) {
        if self.config.reject_non_finite && !value.is_finite() {
            warn!(metric = %metric, value, "Dropping non-finite metric value");
            return;
        }

        let evaluation = {
            let mut store = self.store.write().await;
            let now = self.now();
            store.record(metric, value, context.unwrap_or_default(), now);

            let mut alerts = self.alerts.write().await;
            alerts.evaluate(metric, &store, now)
        };

        for alert in evaluation.raised {
            self.publish_alert(alert).await;
        }
    }

    async fn publish_alert(&self, alert: AlertEvent) {
        self.exporter.record_alert(alert.level);

        let report = self.hub.broadcast(&HubMessage::Alert(alert.clone())).await;
        debug!(
            alert_id = %alert.id,
            delivered = report.delivered,
            dropped = report.dropped,
            "Alert pushed to subscribers"
        );

        if alert.level == AlertLevel::Critical {
            let dispatcher = self.dispatcher.read().await.clone();
            tokio::spawn(async move {
                dispatcher.dispatch(&alert).await;
            });
        }
    }

    /// 计时执行一个异步操作；失败时额外记录一次 error_rate 并原样返回错误
    pub async fn measure_execution_time<T, E, F, Fut>(
        &self,
        metric: MetricType,
        context: Option<MetricContext>,
        operation: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        let started = tokio::time::Instant::now();
        let result = operation().await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(_) => self.record_metric(metric, elapsed_ms, context).await,
            Err(e) => {
                let mut context = context.unwrap_or_default();
                context.insert("error".to_string(), Value::String(e.to_string()));
                self.record_metric(metric, elapsed_ms, Some(context.clone())).await;
                self.record_metric(MetricType::ErrorRate, 1.0, Some(context)).await;
            }
        }

        result
    }

    /// 记录一次无结果搜索
    pub async fn record_zero_results(&self, query: &str, filters: Option<Value>) {
        let mut context = MetricContext::new();
        context.insert("query".to_string(), Value::String(query.to_string()));
        if let Some(filters) = filters {
            context.insert("filters".to_string(), filters);
        }

        info!(query = %query, "Search returned no results");
        self.record_metric(MetricType::ZeroResults, 1.0, Some(context)).await;
    }

    /// 记录缓存命中率；hits + misses 为 0 时不记录
    pub async fn record_cache_hit_rate(&self, hits: u64, misses: u64) {
        let total = hits + misses;
        if total == 0 {
            return;
        }

        let mut context = MetricContext::new();
        context.insert("hits".to_string(), hits.into());
        context.insert("misses".to_string(), misses.into());
        context.insert("total".to_string(), total.into());

        self.record_metric(MetricType::CacheHitRate, hits as f64 / total as f64, Some(context))
            .await;
    }

    pub async fn record_levenshtein_calls(&self, count: u64, context: Option<MetricContext>) {
        self.record_metric(MetricType::LevenshteinCalls, count as f64, context).await;
    }

    /// 采样内存使用率；读取失败时记录估计值
    pub async fn record_memory_usage(&self, component: Option<&str>) {
        let usage = match self.memory_probe.usage_percent() {
            Ok(usage) => usage,
            Err(e) => {
                warn!(error = %e, "Memory usage unavailable, recording estimated value");
                FALLBACK_MEMORY_USAGE
            }
        };

        let mut context = MetricContext::new();
        if let Some(component) = component {
            context.insert("component".to_string(), Value::String(component.to_string()));
        }
        self.record_metric(MetricType::MemoryUsage, usage, Some(context)).await;
    }

    pub async fn record_search_trend(&self, query: &str, latency: f64, success: bool) {
        let now = self.now();
        self.trends.write().await.record(query, latency, success, now);
    }

    // ---- 查询 ----

    pub async fn get_metric_stats(&self, metric: MetricType, window: Duration) -> WindowStats {
        let now = self.now();
        self.store.read().await.window_stats(metric, window, now)
    }

    /// 按时间闭区间查询原始样本；不给区间时返回该指标全部样本
    pub async fn get_historical_metrics(
        &self,
        metric: MetricType,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Vec<MetricSample> {
        let store = self.store.read().await;
        match range {
            Some((start, end)) => store.range(metric, start, end),
            None => store.samples(metric).cloned().collect(),
        }
    }

    async fn all_metric_stats(&self, window: Duration, now: DateTime<Utc>) -> BTreeMap<MetricType, WindowStats> {
        let store = self.store.read().await;
        MetricType::ALL
            .iter()
            .map(|metric| (*metric, store.window_stats(*metric, window, now)))
            .collect()
    }

    pub async fn get_recent_alerts(&self, window: Duration) -> Vec<AlertEvent> {
        let now = self.now();
        self.alerts.read().await.recent(window, now)
    }

    pub async fn get_active_alerts(&self) -> Vec<AlertEvent> {
        self.alerts.read().await.active_alerts()
    }

    pub async fn get_alert_history(&self, limit: usize) -> Vec<AlertEvent> {
        self.alerts.read().await.history(limit)
    }

    pub async fn acknowledge_alert(&self, alert_id: &str, acknowledged_by: &str) -> bool {
        let now = self.now();
        self.alerts.write().await.acknowledge(alert_id, acknowledged_by, now)
    }

    pub async fn thresholds(&self) -> Vec<AlertThresholdConfig> {
        self.alerts.read().await.thresholds().to_vec()
    }

    /// 替换某个指标的阈值，配置非法时保持原值
    pub async fn set_threshold(&self, config: AlertThresholdConfig) -> Result<()> {
        self.alerts.write().await.set_threshold(config)
    }

    pub async fn get_system_health(&self) -> SystemHealthSnapshot {
        let thresholds = self.thresholds().await;
        let store = self.store.read().await;
        self.health.snapshot(&store, &thresholds, self.now())
    }

    /// 生成带优化建议的健康报告
    pub async fn generate_health_report(&self) -> HealthReport {
        let now = self.now();
        let health = self.get_system_health().await;
        let store = self.store.read().await;
        let active_alerts = self.alerts.read().await.active_count();

        HealthReport::build(health, &store, active_alerts, self.config.dashboard_window(), now)
    }

    pub async fn dashboard_snapshot(&self) -> DashboardSnapshot {
        let now = self.now();
        let window = self.config.dashboard_window();

        DashboardSnapshot {
            metrics: self.all_metric_stats(window, now).await,
            alerts: self.alerts.read().await.recent(window, now),
            system_health: self.get_system_health().await,
            timestamp: now,
        }
    }

    pub async fn get_search_trends(&self, limit: usize) -> Vec<SearchTrendEntry> {
        self.trends.read().await.top(limit)
    }

    pub async fn get_anomalies(&self) -> Vec<AnomalyRecord> {
        self.anomalies.read().await.history()
    }

    pub async fn get_advanced_metrics(&self) -> AdvancedMetrics {
        let search_trends = {
            let trends = self.trends.read().await;
            trends.top(trends.len())
        };

        AdvancedMetrics {
            search_trends,
            performance_baseline: self.baseline.read().await.clone(),
            anomalies: self.get_anomalies().await,
        }
    }

    /// 生成性能报告（默认覆盖最近 24 小时）
    pub async fn generate_performance_report(&self) -> PerformanceReport {
        let now = self.now();
        let window = self.config.report_window();

        PerformanceReport {
            metrics: self.all_metric_stats(window, now).await,
            advanced_metrics: self.get_advanced_metrics().await,
            system_health: self.get_system_health().await,
            recent_alerts: self.alerts.read().await.recent(window, now),
            generated_at: now,
        }
    }

    // ---- 订阅 ----

    /// 注册订阅者并立即推送一份完整快照
    pub async fn subscribe(&self, sink: Arc<dyn PushSink>) -> SubscriberId {
        let id = self.hub.register(sink).await;
        let snapshot = self.dashboard_snapshot().await;

        if self.hub.push_to(id, &HubMessage::Snapshot(snapshot)).await {
            info!(subscriber = id, "Dashboard subscriber connected");
        }
        id
    }

    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.hub.unsubscribe(id).await
    }

    pub async fn subscriber_count(&self) -> usize {
        self.hub.len().await
    }

    pub async fn broadcast_snapshot(&self) -> BroadcastReport {
        if self.hub.is_empty().await {
            return BroadcastReport::default();
        }

        let snapshot = self.dashboard_snapshot().await;
        self.hub.broadcast(&HubMessage::Snapshot(snapshot)).await
    }

    // ---- 通知 ----

    pub async fn configure_notifications(&self, config: NotificationConfig) {
        info!(
            enabled = config.enabled,
            webhook = config.webhook_url.is_some(),
            email_recipients = config.email_recipients.len(),
            sms_recipients = config.sms_recipients.len(),
            "Notification channels configured"
        );
        *self.dispatcher.write().await = Arc::new(NotificationDispatcher::new(config));
    }

    pub async fn notification_config(&self) -> NotificationConfig {
        self.dispatcher.read().await.config().clone()
    }

    // ---- 维护 ----

    /// 执行一轮异常检测
    pub async fn detect_anomalies(&self) -> Vec<AnomalyRecord> {
        let now = self.now();
        let store = self.store.read().await;
        self.anomalies.write().await.detect(&store, now)
    }

    /// 删除超过保留时长的样本
    pub async fn cleanup_old_data(&self) -> usize {
        let now = self.now();
        let removed = self.store.write().await.cleanup(self.config.retention(), now);
        if removed > 0 {
            info!(removed, "Expired metric samples cleaned up");
        }
        removed
    }

    pub async fn update_performance_baseline(&self) -> PerformanceBaseline {
        let now = self.now();
        let store = self.store.read().await;
        let mut baseline = self.baseline.write().await;
        baseline.refresh(&store, now);
        baseline.clone()
    }

    /// 清空所有样本、告警、趋势和异常记录，周期任务不受影响
    pub async fn clear_metrics(&self) {
        self.store.write().await.clear();
        self.alerts.write().await.clear();
        self.trends.write().await.clear();
        self.anomalies.write().await.clear();
        info!("All monitoring data cleared");
    }

    /// 以 Prometheus 文本格式导出当前状态
    pub async fn export_prometheus(&self) -> Result<String> {
        let now = self.now();
        for (metric, stats) in self.all_metric_stats(self.config.dashboard_window(), now).await {
            self.exporter.update_metric(metric, &stats);
        }

        let active = self.get_active_alerts().await;
        for level in [AlertLevel::Warning, AlertLevel::Critical] {
            let count = active.iter().filter(|a| a.level == level).count();
            self.exporter.set_active_alerts(level, count);
        }
        self.exporter.set_subscribers(self.hub.len().await);

        Ok(self.exporter.export()?)
    }

    // ---- 生命周期 ----

    /// 启动系统指标采集、快照广播、过期清理和异常检测周期任务；已启动时不做任何事
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            debug!("Search monitor already running");
            return;
        }

        let weak = Arc::downgrade(self);
        tasks.push(Self::spawn_task(
            "metrics-collection",
            self.config.collect_interval_secs,
            weak.clone(),
            |monitor| async move {
                monitor.record_memory_usage(None).await;
            },
        ));
        tasks.push(Self::spawn_task(
            "snapshot-broadcast",
            self.config.broadcast_interval_secs,
            weak.clone(),
            |monitor| async move {
                monitor.broadcast_snapshot().await;
            },
        ));
        tasks.push(Self::spawn_task(
            "retention-cleanup",
            self.config.cleanup_interval_secs,
            weak.clone(),
            |monitor| async move {
                monitor.cleanup_old_data().await;
            },
        ));
        if self.config.anomaly.enabled {
            tasks.push(Self::spawn_task(
                "anomaly-detection",
                self.config.anomaly.interval_secs,
                weak,
                |monitor| async move {
                    monitor.detect_anomalies().await;
                },
            ));
        }

        info!(tasks = tasks.len(), "Search monitor started");
    }

    fn spawn_task<F, Fut>(name: &'static str, period_secs: u64, monitor: Weak<Self>, run: F) -> TaskHandle
    where
        F: Fn(Arc<Self>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let run = Arc::new(run);
        TaskHandle::spawn_periodic(name, std::time::Duration::from_secs(period_secs), move || {
            let monitor = monitor.upgrade();
            let run = run.clone();
            async move {
                if let Some(monitor) = monitor {
                    run(monitor).await;
                }
            }
        })
    }

    /// 停止所有周期任务并清空订阅者，可重复调用
    pub async fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        let stopped = tasks.len();
        for task in tasks {
            task.shutdown().await;
        }
        self.hub.clear().await;

        if stopped > 0 {
            info!(tasks = stopped, "Search monitor stopped");
        }
    }

    pub async fn status(&self) -> MonitorStatus {
        let active_tasks = self
            .tasks
            .lock()
            .await
            .iter()
            .filter(|t| !t.is_finished())
            .count();

        let metrics_collected = self.store.read().await.total_samples();
        let (active_alerts, total_alerts) = {
            let alerts = self.alerts.read().await;
            (alerts.active_count(), alerts.history_len())
        };

        MonitorStatus {
            running: active_tasks > 0,
            active_tasks,
            subscribers: self.hub.len().await,
            active_alerts,
            metrics_collected,
            total_alerts,
            uptime_ms: (self.now() - self.health.start_time()).num_milliseconds(),
        }
    }
}

impl Drop for SearchMonitor {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
