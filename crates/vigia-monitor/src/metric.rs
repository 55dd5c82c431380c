use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// 监控指标类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    SearchLatency,
    SuggestionLatency,
    CacheHitRate,
    ZeroResults,
    ErrorRate,
    MemoryUsage,
    LevenshteinCalls,
    FilterLatency,
}

impl MetricType {
    pub const ALL: [MetricType; 8] = [
        MetricType::SearchLatency,
        MetricType::SuggestionLatency,
        MetricType::CacheHitRate,
        MetricType::ZeroResults,
        MetricType::ErrorRate,
        MetricType::MemoryUsage,
        MetricType::LevenshteinCalls,
        MetricType::FilterLatency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::SearchLatency => "search_latency",
            MetricType::SuggestionLatency => "suggestion_latency",
            MetricType::CacheHitRate => "cache_hit_rate",
            MetricType::ZeroResults => "zero_results",
            MetricType::ErrorRate => "error_rate",
            MetricType::MemoryUsage => "memory_usage",
            MetricType::LevenshteinCalls => "levenshtein_calls",
            MetricType::FilterLatency => "filter_latency",
        }
    }

    /// 按指标单位格式化数值（告警消息使用）
    pub fn format_value(&self, value: f64) -> String {
        match self {
            MetricType::SearchLatency | MetricType::SuggestionLatency | MetricType::FilterLatency => {
                format!("{:.2}ms", value)
            }
            MetricType::CacheHitRate | MetricType::ErrorRate | MetricType::ZeroResults => {
                format!("{:.2}%", value * 100.0)
            }
            MetricType::MemoryUsage => format!("{:.2}%", value),
            MetricType::LevenshteinCalls => value.to_string(),
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric type: {0}")]
pub struct UnknownMetric(pub String);

impl FromStr for MetricType {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricType::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

/// 附加在样本上的上下文
pub type MetricContext = HashMap<String, serde_json::Value>;

/// 样本相对近期均值的走向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Stable,
}

impl Trend {
    /// 参与比较的最近样本数
    pub const LOOKBACK: usize = 5;

    /// 与最近 5 个样本的均值比较，偏离超过 5% 视为上升或下降；历史不足 2 个样本时为平稳
    pub fn against(recent: &[f64], value: f64) -> Self {
        if recent.len() < 2 {
            return Trend::Stable;
        }

        let tail = &recent[recent.len().saturating_sub(Self::LOOKBACK)..];
        let average = tail.iter().sum::<f64>() / tail.len() as f64;
        let band = average.abs() * 0.05;

        if value > average + band {
            Trend::Up
        } else if value < average - band {
            Trend::Down
        } else {
            Trend::Stable
        }
    }
}

/// 单个指标样本，写入后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub trend: Trend,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: MetricContext,
}

/// 时间窗口统计
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub p95: Option<f64>,
}

impl WindowStats {
    pub fn empty() -> Self {
        Self {
            count: 0,
            min: None,
            max: None,
            avg: None,
            p95: None,
        }
    }

    /// 由窗口内的样本值计算统计；p95 取下标 floor(n * 0.95)，不做插值
    pub fn from_values(mut values: Vec<f64>) -> Self {
        if values.is_empty() {
            return Self::empty();
        }

        values.sort_by(|a, b| a.total_cmp(b));

        let count = values.len();
        let sum: f64 = values.iter().sum();
        let p95_index = ((count as f64 * 0.95).floor() as usize).min(count - 1);

        Self {
            count,
            min: Some(values[0]),
            max: Some(values[count - 1]),
            avg: Some(sum / count as f64),
            p95: Some(values[p95_index]),
        }
    }
}

impl Default for WindowStats {
    fn default() -> Self {
        Self::empty()
    }
}
