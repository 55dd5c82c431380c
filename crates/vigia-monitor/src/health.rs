use crate::alert::AlertThresholdConfig;
use crate::metric::MetricType;
use crate::store::MetricStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 健康状态，按严重程度排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// 系统健康快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealthSnapshot {
    pub overall: HealthStatus,
    pub components: BTreeMap<MetricType, HealthStatus>,
    pub uptime_ms: i64,
    pub last_check: DateTime<Utc>,
}

/// 由各指标最新窗口统计推导健康状态，按需计算不缓存
pub struct HealthAggregator {
    window: Duration,
    start_time: DateTime<Utc>,
}

impl HealthAggregator {
    pub fn new(window: Duration, start_time: DateTime<Utc>) -> Self {
        Self { window, start_time }
    }

    pub fn classify(avg: Option<f64>, threshold: Option<&AlertThresholdConfig>) -> HealthStatus {
        match (avg, threshold) {
            (Some(avg), Some(t)) if avg >= t.critical => HealthStatus::Critical,
            (Some(avg), Some(t)) if avg >= t.warning => HealthStatus::Warning,
            _ => HealthStatus::Healthy,
        }
    }

    pub fn snapshot(
        &self,
        store: &MetricStore,
        thresholds: &[AlertThresholdConfig],
        now: DateTime<Utc>,
    ) -> SystemHealthSnapshot {
        let components: BTreeMap<MetricType, HealthStatus> = MetricType::ALL
            .iter()
            .map(|metric| {
                let stats = store.window_stats(*metric, self.window, now);
                let threshold = thresholds.iter().find(|t| t.metric == *metric);
                (*metric, Self::classify(stats.avg, threshold))
            })
            .collect();

        let overall = components
            .values()
            .copied()
            .max()
            .unwrap_or(HealthStatus::Healthy);

        SystemHealthSnapshot {
            overall,
            components,
            uptime_ms: (now - self.start_time).num_milliseconds(),
            last_check: now,
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }
}
