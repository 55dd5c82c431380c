use crate::clock::window_start;
use crate::metric::{MetricContext, MetricSample, MetricType, Trend, WindowStats};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// 每种指标一个有界时间序列缓冲区
///
/// 写入只追加；超过容量时按 FIFO 淘汰最旧样本，按保留时长的淘汰由周期清理完成。
pub struct MetricStore {
    series: HashMap<MetricType, VecDeque<MetricSample>>,
    max_data_points: usize,
}

impl MetricStore {
    pub fn new(max_data_points: usize) -> Self {
        let series = MetricType::ALL
            .iter()
            .map(|m| (*m, VecDeque::new()))
            .collect();

        Self {
            series,
            max_data_points: max_data_points.max(1),
        }
    }

    /// 追加一个样本，同时按最近样本计算走向
    pub fn record(&mut self, metric: MetricType, value: f64, context: MetricContext, now: DateTime<Utc>) {
        let series = self.series.entry(metric).or_default();
        let recent: Vec<f64> = series
            .iter()
            .skip(series.len().saturating_sub(Trend::LOOKBACK))
            .map(|s| s.value)
            .collect();

        series.push_back(MetricSample {
            value,
            timestamp: now,
            trend: Trend::against(&recent, value),
            context,
        });

        while series.len() > self.max_data_points {
            series.pop_front();
        }
    }

    /// 计算 `now - window` 之后（含）样本的统计
    pub fn window_stats(&self, metric: MetricType, window: Duration, now: DateTime<Utc>) -> WindowStats {
        let cutoff = window_start(now, window);
        let values = self
            .series
            .get(&metric)
            .map(|series| {
                series
                    .iter()
                    .filter(|s| s.timestamp >= cutoff)
                    .map(|s| s.value)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        WindowStats::from_values(values)
    }

    /// 删除所有序列中早于 `now - retention` 的样本，返回删除数量
    pub fn cleanup(&mut self, retention: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = window_start(now, retention);
        let mut removed = 0;

        for (metric, series) in self.series.iter_mut() {
            let before = series.len();
            series.retain(|s| s.timestamp >= cutoff);
            let dropped = before - series.len();
            if dropped > 0 {
                debug!(metric = %metric, dropped, "Dropped expired samples");
            }
            removed += dropped;
        }

        removed
    }

    /// `[start, end]` 闭区间内的样本（按写入顺序）
    pub fn range(&self, metric: MetricType, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<MetricSample> {
        self.samples(metric)
            .filter(|s| s.timestamp >= start && s.timestamp <= end)
            .cloned()
            .collect()
    }

    pub fn latest(&self, metric: MetricType) -> Option<&MetricSample> {
        self.series.get(&metric).and_then(|series| series.back())
    }

    /// 所有序列中的样本总数
    pub fn total_samples(&self) -> usize {
        self.series.values().map(|s| s.len()).sum()
    }

    /// 最近 `n` 个样本值（按写入顺序）
    pub fn latest_values(&self, metric: MetricType, n: usize) -> Vec<f64> {
        self.series
            .get(&metric)
            .map(|series| {
                let skip = series.len().saturating_sub(n);
                series.iter().skip(skip).map(|s| s.value).collect()
            })
            .unwrap_or_default()
    }

    pub fn samples(&self, metric: MetricType) -> impl Iterator<Item = &MetricSample> {
        self.series.get(&metric).into_iter().flatten()
    }

    pub fn len(&self, metric: MetricType) -> usize {
        self.series.get(&metric).map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(|s| s.is_empty())
    }

    pub fn capacity(&self) -> usize {
        self.max_data_points
    }

    pub fn clear(&mut self) {
        for series in self.series.values_mut() {
            series.clear();
        }
    }
}
