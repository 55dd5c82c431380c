use crate::alert::AlertThresholdConfig;
use crate::anomaly::AnomalyConfig;
use crate::clock::{seconds, MAX_WINDOW_SECS};
use crate::error::{MonitorError, Result};
use crate::notifier::NotificationConfig;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// 监控引擎配置，所有字段都有默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// 每种指标最多保留的样本数
    pub max_data_points: usize,
    /// 样本保留时长（秒）
    pub retention_secs: u64,
    /// 仪表盘快照广播间隔（秒）
    pub broadcast_interval_secs: u64,
    /// 过期数据清理间隔（秒）
    pub cleanup_interval_secs: u64,
    /// 系统指标（内存）采集间隔（秒）
    pub collect_interval_secs: u64,
    pub anomaly: AnomalyConfig,
    pub max_alert_history: usize,
    pub max_trends: usize,
    pub health_window_secs: u64,
    pub dashboard_window_secs: u64,
    pub report_window_secs: u64,
    /// 是否在入口丢弃 NaN / 无穷大
    pub reject_non_finite: bool,
    pub thresholds: Vec<AlertThresholdConfig>,
    pub notifications: NotificationConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_data_points: 1000,
            retention_secs: 24 * 60 * 60,
            broadcast_interval_secs: 5,
            cleanup_interval_secs: 60 * 60,
            collect_interval_secs: 5,
            anomaly: AnomalyConfig::default(),
            max_alert_history: 1000,
            max_trends: 1000,
            health_window_secs: 300,
            dashboard_window_secs: 300,
            report_window_secs: 24 * 60 * 60,
            reject_non_finite: false,
            thresholds: AlertThresholdConfig::defaults(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn retention(&self) -> Duration {
        seconds(self.retention_secs)
    }

    pub fn health_window(&self) -> Duration {
        seconds(self.health_window_secs)
    }

    pub fn dashboard_window(&self) -> Duration {
        seconds(self.dashboard_window_secs)
    }

    pub fn report_window(&self) -> Duration {
        seconds(self.report_window_secs)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.max_data_points == 0 {
            return Err(MonitorError::Config("max_data_points must be greater than 0".to_string()));
        }
        if self.max_alert_history == 0 || self.max_trends == 0 || self.anomaly.max_history == 0 {
            return Err(MonitorError::Config("history capacities must be greater than 0".to_string()));
        }
        if self.broadcast_interval_secs == 0
            || self.cleanup_interval_secs == 0
            || self.collect_interval_secs == 0
            || self.anomaly.interval_secs == 0
        {
            return Err(MonitorError::Config("task intervals must be greater than 0".to_string()));
        }
        let bounded = [
            ("retention_secs", self.retention_secs),
            ("health_window_secs", self.health_window_secs),
            ("dashboard_window_secs", self.dashboard_window_secs),
            ("report_window_secs", self.report_window_secs),
            ("broadcast_interval_secs", self.broadcast_interval_secs),
            ("cleanup_interval_secs", self.cleanup_interval_secs),
            ("collect_interval_secs", self.collect_interval_secs),
            ("anomaly.interval_secs", self.anomaly.interval_secs),
        ];
        if let Some((name, _)) = bounded.iter().find(|(_, secs)| *secs > MAX_WINDOW_SECS) {
            return Err(MonitorError::Config(format!("{} cannot exceed {}s", name, MAX_WINDOW_SECS)));
        }
        if self.anomaly.window < 2 {
            return Err(MonitorError::Config("anomaly window must hold at least 2 samples".to_string()));
        }
        for threshold in &self.thresholds {
            threshold.validate()?;
        }
        Ok(())
    }
}
