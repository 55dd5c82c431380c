//! 基于 z-score 的异常检测
//!
//! 对每种指标取最近 `window` 个样本计算均值与总体标准差，
//! 最新样本偏离均值超过 `z_score_threshold` 个标准差即记为异常。
//! 异常只做记录，不参与告警状态机。

use crate::metric::MetricType;
use crate::store::MetricStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;

/// 异常严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
}

impl AnomalySeverity {
    pub fn from_z_score(z_score: f64) -> Self {
        if z_score > 3.0 {
            AnomalySeverity::High
        } else if z_score > 2.5 {
            AnomalySeverity::Medium
        } else {
            AnomalySeverity::Low
        }
    }
}

/// 异常记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub metric: MetricType,
    pub value: f64,
    pub expected_range: (f64, f64),
    pub z_score: f64,
    pub severity: AnomalySeverity,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// 异常检测配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub z_score_threshold: f64,
    pub min_samples: usize,
    pub window: usize,
    pub max_history: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            z_score_threshold: 2.0,
            min_samples: 10,
            window: 50,
            max_history: 100,
        }
    }
}

/// 滚动均值 / 标准差
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl RollingStats {
    pub fn compute(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            mean,
            std_dev: variance.sqrt(),
        })
    }

    pub fn z_score(&self, value: f64) -> f64 {
        ((value - self.mean) / self.std_dev).abs()
    }
}

/// 异常检测器
pub struct AnomalyDetector {
    config: AnomalyConfig,
    history: VecDeque<AnomalyRecord>,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
        }
    }

    /// 检查一组按时间排序的样本值，最后一个值为待判定样本
    pub fn check(&self, metric: MetricType, values: &[f64], now: DateTime<Utc>) -> Option<AnomalyRecord> {
        let stats = RollingStats::compute(values)?;
        if stats.std_dev == 0.0 || !stats.std_dev.is_finite() {
            return None;
        }

        let latest = *values.last()?;
        let z_score = stats.z_score(latest);
        if z_score.is_nan() || z_score <= self.config.z_score_threshold {
            return None;
        }

        Some(AnomalyRecord {
            metric,
            value: latest,
            expected_range: (stats.mean - stats.std_dev, stats.mean + stats.std_dev),
            z_score,
            severity: AnomalySeverity::from_z_score(z_score),
            timestamp: now,
            description: format!(
                "Anomalous value detected: {:.2} (expected: {:.2} ± {:.2})",
                latest, stats.mean, stats.std_dev
            ),
        })
    }

    /// 对所有指标执行一轮检测，返回新发现的异常
    pub fn detect(&mut self, store: &MetricStore, now: DateTime<Utc>) -> Vec<AnomalyRecord> {
        if !self.config.enabled {
            return Vec::new();
        }

        let mut found = Vec::new();
        for metric in MetricType::ALL {
            if store.len(metric) < self.config.min_samples {
                continue;
            }

            let values = store.latest_values(metric, self.config.window);
            if let Some(anomaly) = self.check(metric, &values, now) {
                warn!(
                    metric = %anomaly.metric,
                    value = anomaly.value,
                    z_score = anomaly.z_score,
                    severity = ?anomaly.severity,
                    "Anomaly detected"
                );
                self.push(anomaly.clone());
                found.push(anomaly);
            }
        }

        found
    }

    fn push(&mut self, anomaly: AnomalyRecord) {
        self.history.push_back(anomaly);
        while self.history.len() > self.config.max_history {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> Vec<AnomalyRecord> {
        self.history.iter().cloned().collect()
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::MetricContext;

    fn seeded_store(values: &[f64]) -> MetricStore {
        let mut store = MetricStore::new(1000);
        let now = Utc::now();
        for v in values {
            store.record(MetricType::SearchLatency, *v, MetricContext::new(), now);
        }
        store
    }

    /// 50 个均值 100、标准差 10 的样本
    fn baseline() -> Vec<f64> {
        (0..50).map(|i| if i % 2 == 0 { 90.0 } else { 110.0 }).collect()
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(AnomalySeverity::from_z_score(2.1), AnomalySeverity::Low);
        assert_eq!(AnomalySeverity::from_z_score(2.7), AnomalySeverity::Medium);
        assert_eq!(AnomalySeverity::from_z_score(10.0), AnomalySeverity::High);
    }

    #[test]
    fn test_rolling_stats() {
        let stats = RollingStats::compute(&baseline()).unwrap();
        assert!((stats.mean - 100.0).abs() < 1e-9);
        assert!((stats.std_dev - 10.0).abs() < 1e-9);
        assert!((stats.z_score(200.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_spike_is_high_severity() {
        let mut values = baseline();
        values.push(200.0);
        let store = seeded_store(&values);
        let mut detector = AnomalyDetector::new(AnomalyConfig::default());

        let found = detector.detect(&store, Utc::now());

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metric, MetricType::SearchLatency);
        assert_eq!(found[0].value, 200.0);
        assert!(found[0].z_score > 3.0);
        assert_eq!(found[0].severity, AnomalySeverity::High);
        assert_eq!(detector.history().len(), 1);
    }

    #[test]
    fn test_constant_series_skipped() {
        let store = seeded_store(&[100.0; 30]);
        let mut detector = AnomalyDetector::new(AnomalyConfig::default());
        assert!(detector.detect(&store, Utc::now()).is_empty());
    }

    #[test]
    fn test_requires_min_samples() {
        let store = seeded_store(&[1.0, 1.0, 1.0, 1.0, 500.0]);
        let mut detector = AnomalyDetector::new(AnomalyConfig::default());
        assert!(detector.detect(&store, Utc::now()).is_empty());
    }

    #[test]
    fn test_disabled_detector() {
        let mut values = baseline();
        values.push(200.0);
        let store = seeded_store(&values);
        let mut detector = AnomalyDetector::new(AnomalyConfig {
            enabled: false,
            ..Default::default()
        });
        assert!(detector.detect(&store, Utc::now()).is_empty());
    }

    #[test]
    fn test_history_bounded() {
        let config = AnomalyConfig {
            max_history: 2,
            ..Default::default()
        };
        let mut detector = AnomalyDetector::new(config);
        let now = Utc::now();

        for i in 0..5 {
            let mut values = baseline();
            values.push(300.0 + i as f64);
            let store = seeded_store(&values);
            detector.detect(&store, now);
        }

        let history = detector.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].value, 304.0);
    }
}
