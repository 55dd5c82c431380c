use crate::alert::AlertEvent;
use crate::anomaly::AnomalyRecord;
use crate::health::{HealthStatus, SystemHealthSnapshot};
use crate::metric::{MetricType, WindowStats};
use crate::store::MetricStore;
use crate::trend::SearchTrendEntry;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 性能基线
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceBaseline {
    pub avg_search_latency: f64,
    pub avg_suggestion_latency: f64,
    pub avg_cache_hit_rate: f64,
    pub avg_memory_usage: f64,
    pub avg_error_rate: f64,
    pub last_updated: DateTime<Utc>,
}

impl PerformanceBaseline {
    /// 基线统计窗口
    pub fn window() -> Duration {
        Duration::days(7)
    }

    /// 初始基线
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            avg_search_latency: 200.0,
            avg_suggestion_latency: 100.0,
            avg_cache_hit_rate: 0.8,
            avg_memory_usage: 50.0,
            avg_error_rate: 0.01,
            last_updated: now,
        }
    }

    /// 用最近 7 天平均值刷新基线，没有数据的指标保留原值
    pub fn refresh(&mut self, store: &MetricStore, now: DateTime<Utc>) {
        let window = Self::window();
        let fields = [
            (MetricType::SearchLatency, &mut self.avg_search_latency),
            (MetricType::SuggestionLatency, &mut self.avg_suggestion_latency),
            (MetricType::CacheHitRate, &mut self.avg_cache_hit_rate),
            (MetricType::MemoryUsage, &mut self.avg_memory_usage),
            (MetricType::ErrorRate, &mut self.avg_error_rate),
        ];

        for (metric, field) in fields {
            if let Some(avg) = store.window_stats(metric, window, now).avg {
                *field = avg;
            }
        }
        self.last_updated = now;
    }
}

/// 高级指标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedMetrics {
    pub search_trends: Vec<SearchTrendEntry>,
    pub performance_baseline: PerformanceBaseline,
    pub anomalies: Vec<AnomalyRecord>,
}

/// 性能报告
///
/// 每个指标的窗口统计以指标名为键平铺在顶层。
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    #[serde(flatten)]
    pub metrics: BTreeMap<MetricType, WindowStats>,
    pub advanced_metrics: AdvancedMetrics,
    pub system_health: SystemHealthSnapshot,
    pub recent_alerts: Vec<AlertEvent>,
    pub generated_at: DateTime<Utc>,
}

/// 健康报告
///
/// 在健康快照之上附加优化建议与一句话摘要。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall: HealthStatus,
    pub components: BTreeMap<MetricType, HealthStatus>,
    pub recommendations: Vec<String>,
    pub summary: String,
    pub generated_at: DateTime<Utc>,
}

const HIGH_LATENCY_MS: f64 = 1000.0;
const LOW_CACHE_HIT_RATE: f64 = 0.5;
const HIGH_ERROR_RATE: f64 = 0.05;
const HIGH_MEMORY_USAGE: f64 = 75.0;
const MAX_ACTIVE_ALERTS: usize = 5;

impl HealthReport {
    /// 由健康快照、各指标最新值和窗口均值生成报告
    ///
    /// 建议只针对有数据的指标给出；摘要中缺数据的均值按 0 计。
    pub fn build(
        health: SystemHealthSnapshot,
        store: &MetricStore,
        active_alerts: usize,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let current = |metric: MetricType| store.latest(metric).map(|s| s.value);
        let mut recommendations = Vec::new();

        if current(MetricType::SearchLatency).is_some_and(|v| v > HIGH_LATENCY_MS) {
            recommendations.push("Optimize search algorithms to reduce latency".to_string());
        }
        if current(MetricType::CacheHitRate).is_some_and(|v| v < LOW_CACHE_HIT_RATE) {
            recommendations.push("Review caching strategy to improve the hit rate".to_string());
        }
        if current(MetricType::ErrorRate).is_some_and(|v| v > HIGH_ERROR_RATE) {
            recommendations.push("Investigate and fix the causes of search errors".to_string());
        }
        if current(MetricType::MemoryUsage).is_some_and(|v| v > HIGH_MEMORY_USAGE) {
            recommendations.push("Reduce memory usage or provision more memory".to_string());
        }
        if active_alerts > MAX_ACTIVE_ALERTS {
            recommendations.push("Resolve active alerts to stabilize the system".to_string());
        }

        let state = match health.overall {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "degraded",
            HealthStatus::Critical => "critical",
        };
        let avg = |metric: MetricType| store.window_stats(metric, window, now).avg.unwrap_or(0.0);
        let summary = format!(
            "System {}. {} active alerts, average latency: {:.0}ms, cache hit rate: {:.1}%",
            state,
            active_alerts,
            avg(MetricType::SearchLatency),
            avg(MetricType::CacheHitRate) * 100.0
        );

        Self {
            overall: health.overall,
            components: health.components,
            recommendations,
            summary,
            generated_at: now,
        }
    }
}

/// 监控引擎运行状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub active_tasks: usize,
    pub subscribers: usize,
    pub active_alerts: usize,
    /// 当前保留的样本总数
    pub metrics_collected: usize,
    /// 历史告警条数
    pub total_alerts: usize,
    pub uptime_ms: i64,
}
