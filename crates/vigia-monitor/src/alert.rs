use crate::clock::{seconds, window_start, MAX_WINDOW_SECS};
use crate::error::{MonitorError, Result};
use crate::metric::MetricType;
use crate::store::MetricStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::{error, info, warn};

/// 告警级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 阈值配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholdConfig {
    pub metric: MetricType,
    pub warning: f64,
    pub critical: f64,
    /// 计算窗口平均值的时长（秒）
    pub duration_secs: u64,
    /// 同一 (指标, 级别) 两次告警之间的最小间隔（秒）
    pub cooldown_secs: u64,
}

impl AlertThresholdConfig {
    pub fn new(metric: MetricType, warning: f64, critical: f64, duration_secs: u64, cooldown_secs: u64) -> Self {
        Self {
            metric,
            warning,
            critical,
            duration_secs,
            cooldown_secs,
        }
    }

    pub fn duration(&self) -> Duration {
        seconds(self.duration_secs)
    }

    pub fn cooldown(&self) -> Duration {
        seconds(self.cooldown_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.warning.is_finite() || !self.critical.is_finite() {
            return Err(MonitorError::InvalidThreshold(format!(
                "{}: thresholds must be finite",
                self.metric
            )));
        }
        if self.warning > self.critical {
            return Err(MonitorError::InvalidThreshold(format!(
                "{}: warning ({}) cannot be greater than critical ({})",
                self.metric, self.warning, self.critical
            )));
        }
        if self.duration_secs == 0 {
            return Err(MonitorError::InvalidThreshold(format!(
                "{}: duration must be greater than 0",
                self.metric
            )));
        }
        if self.duration_secs > MAX_WINDOW_SECS || self.cooldown_secs > MAX_WINDOW_SECS {
            return Err(MonitorError::InvalidThreshold(format!(
                "{}: duration and cooldown cannot exceed {}s",
                self.metric, MAX_WINDOW_SECS
            )));
        }
        Ok(())
    }

    /// 默认告警阈值
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(MetricType::SearchLatency, 500.0, 1000.0, 60, 300),
            Self::new(MetricType::ErrorRate, 0.05, 0.1, 300, 900),
            Self::new(MetricType::ZeroResults, 0.3, 0.5, 300, 1800),
            Self::new(MetricType::MemoryUsage, 80.0, 90.0, 120, 600),
        ]
    }
}

/// 告警事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    pub metric: MetricType,
    pub level: AlertLevel,
    pub value: f64,
    pub threshold: f64,
    pub created_at: DateTime<Utc>,
    pub message: String,
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl AlertEvent {
    fn new(metric: MetricType, level: AlertLevel, value: f64, threshold: f64, now: DateTime<Utc>, seq: u64) -> Self {
        let message = format!(
            "{} alert for {}: {} (threshold: {})",
            level,
            metric,
            metric.format_value(value),
            metric.format_value(threshold)
        );

        Self {
            id: format!("{}_{}_{}_{}", metric, level, now.timestamp_millis(), seq),
            metric,
            level,
            value,
            threshold,
            created_at: now,
            message,
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
        }
    }

    fn acknowledge(&mut self, by: &str, now: DateTime<Utc>) {
        self.acknowledged = true;
        self.acknowledged_by = Some(by.to_string());
        self.acknowledged_at = Some(now);
    }
}

/// 一次评估的结果
#[derive(Debug, Default)]
pub struct Evaluation {
    pub raised: Vec<AlertEvent>,
    pub resolved: Vec<AlertEvent>,
}

/// 阈值告警评估器
///
/// 每个 (指标, 级别) 对维护一个状态机：无 → 活跃 → 解决/确认。
pub struct AlertEvaluator {
    thresholds: Vec<AlertThresholdConfig>,
    active_alerts: HashMap<(MetricType, AlertLevel), AlertEvent>,
    last_alert_time: HashMap<(MetricType, AlertLevel), DateTime<Utc>>,
    alert_history: VecDeque<AlertEvent>,
    max_history: usize,
    sequence: u64,
}

impl AlertEvaluator {
    pub fn new(thresholds: Vec<AlertThresholdConfig>, max_history: usize) -> Self {
        Self {
            thresholds,
            active_alerts: HashMap::new(),
            last_alert_time: HashMap::new(),
            alert_history: VecDeque::new(),
            max_history: max_history.max(1),
            sequence: 0,
        }
    }

    /// 用最新窗口统计重新评估某个指标的全部阈值
    pub fn evaluate(&mut self, metric: MetricType, store: &MetricStore, now: DateTime<Utc>) -> Evaluation {
        let mut evaluation = Evaluation::default();
        let thresholds: Vec<AlertThresholdConfig> = self
            .thresholds
            .iter()
            .filter(|t| t.metric == metric)
            .cloned()
            .collect();

        for threshold in thresholds {
            let stats = store.window_stats(metric, threshold.duration(), now);
            let avg = match stats.avg {
                Some(avg) if stats.count > 0 => avg,
                _ => continue,
            };

            if avg >= threshold.critical {
                if let Some(alert) = self.breach(&threshold, AlertLevel::Critical, avg, now) {
                    evaluation.raised.push(alert);
                }
            } else if avg >= threshold.warning {
                if let Some(alert) = self.breach(&threshold, AlertLevel::Warning, avg, now) {
                    evaluation.raised.push(alert);
                }
            } else {
                for level in [AlertLevel::Warning, AlertLevel::Critical] {
                    if let Some(alert) = self.active_alerts.remove(&(metric, level)) {
                        info!(metric = %metric, level = %level, id = %alert.id, "Alert resolved");
                        evaluation.resolved.push(alert);
                    }
                }
            }
        }

        evaluation
    }

    fn breach(
        &mut self,
        threshold: &AlertThresholdConfig,
        level: AlertLevel,
        value: f64,
        now: DateTime<Utc>,
    ) -> Option<AlertEvent> {
        let key = (threshold.metric, level);

        if self.active_alerts.contains_key(&key) {
            if let Some(last) = self.last_alert_time.get(&key) {
                if now - *last <= threshold.cooldown() {
                    return None;
                }
            }
        }

        let bound = match level {
            AlertLevel::Warning => threshold.warning,
            AlertLevel::Critical => threshold.critical,
        };

        self.sequence += 1;
        let alert = AlertEvent::new(threshold.metric, level, value, bound, now, self.sequence);

        match level {
            AlertLevel::Warning => warn!(metric = %threshold.metric, value, threshold = bound, "{}", alert.message),
            AlertLevel::Critical => error!(metric = %threshold.metric, value, threshold = bound, "{}", alert.message),
        }

        self.alert_history.push_back(alert.clone());
        while self.alert_history.len() > self.max_history {
            self.alert_history.pop_front();
        }
        self.active_alerts.insert(key, alert.clone());
        self.last_alert_time.insert(key, now);

        Some(alert)
    }

    /// 确认告警（历史和活跃索引中都会标记）
    pub fn acknowledge(&mut self, alert_id: &str, acknowledged_by: &str, now: DateTime<Utc>) -> bool {
        let mut found = false;

        if let Some(alert) = self.alert_history.iter_mut().find(|a| a.id == alert_id) {
            alert.acknowledge(acknowledged_by, now);
            found = true;
        }
        if let Some(alert) = self.active_alerts.values_mut().find(|a| a.id == alert_id) {
            alert.acknowledge(acknowledged_by, now);
            found = true;
        }

        if found {
            info!(alert_id = %alert_id, acknowledged_by = %acknowledged_by, "Alert acknowledged");
        }
        found
    }

    /// 替换某个指标的阈值配置
    pub fn set_threshold(&mut self, config: AlertThresholdConfig) -> Result<()> {
        config.validate()?;
        info!(
            metric = %config.metric,
            warning = config.warning,
            critical = config.critical,
            "Alert threshold updated"
        );
        self.thresholds.retain(|t| t.metric != config.metric);
        self.thresholds.push(config);
        Ok(())
    }

    pub fn thresholds(&self) -> &[AlertThresholdConfig] {
        &self.thresholds
    }

    /// 指标的首个阈值配置
    pub fn threshold_for(&self, metric: MetricType) -> Option<&AlertThresholdConfig> {
        self.thresholds.iter().find(|t| t.metric == metric)
    }

    pub fn active_alerts(&self) -> Vec<AlertEvent> {
        let mut active: Vec<AlertEvent> = self.active_alerts.values().cloned().collect();
        active.sort_by_key(|a| a.created_at);
        active
    }

    pub fn is_active(&self, metric: MetricType, level: AlertLevel) -> bool {
        self.active_alerts.contains_key(&(metric, level))
    }

    pub fn active_count(&self) -> usize {
        self.active_alerts.len()
    }

    /// 最近 `limit` 条历史告警，最新的在前
    pub fn history(&self, limit: usize) -> Vec<AlertEvent> {
        self.alert_history.iter().rev().take(limit).cloned().collect()
    }

    pub fn recent(&self, window: Duration, now: DateTime<Utc>) -> Vec<AlertEvent> {
        let cutoff = window_start(now, window);
        self.alert_history
            .iter()
            .filter(|a| a.created_at >= cutoff)
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.alert_history.len()
    }

    pub fn clear(&mut self) {
        self.active_alerts.clear();
        self.last_alert_time.clear();
        self.alert_history.clear();
    }
}
