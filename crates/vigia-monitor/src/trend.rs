use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// 单个查询的趋势统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTrendEntry {
    pub query: String,
    pub frequency: u64,
    pub avg_latency: f64,
    /// 0..=1
    pub success_rate: f64,
    pub timestamp: DateTime<Utc>,
}

/// 搜索趋势跟踪器，按查询字符串精确匹配
pub struct SearchTrendTracker {
    entries: HashMap<String, SearchTrendEntry>,
    max_entries: usize,
}

impl SearchTrendTracker {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn record(&mut self, query: &str, latency: f64, success: bool, now: DateTime<Utc>) {
        let hit = if success { 1.0 } else { 0.0 };

        match self.entries.get_mut(query) {
            Some(entry) => {
                let n = entry.frequency as f64;
                entry.avg_latency = (entry.avg_latency * n + latency) / (n + 1.0);
                entry.success_rate = (entry.success_rate * n + hit) / (n + 1.0);
                entry.frequency += 1;
                entry.timestamp = now;
            }
            None => {
                self.entries.insert(
                    query.to_string(),
                    SearchTrendEntry {
                        query: query.to_string(),
                        frequency: 1,
                        avg_latency: latency,
                        success_rate: hit,
                        timestamp: now,
                    },
                );
            }
        }

        if self.entries.len() > self.max_entries {
            self.evict();
        }
    }

    // 保留频次最高的 max_entries 个查询
    fn evict(&mut self) {
        let mut ranked = self.top(self.entries.len());
        let evicted = ranked.split_off(self.max_entries);
        for entry in &evicted {
            self.entries.remove(&entry.query);
        }
        debug!(evicted = evicted.len(), "Evicted least frequent search trends");
    }

    pub fn get(&self, query: &str) -> Option<&SearchTrendEntry> {
        self.entries.get(query)
    }

    /// 按频次降序（频次相同按查询字符串）返回前 `limit` 项
    pub fn top(&self, limit: usize) -> Vec<SearchTrendEntry> {
        let mut entries: Vec<SearchTrendEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.query.cmp(&b.query)));
        entries.truncate(limit);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_average() {
        let mut tracker = SearchTrendTracker::new(1000);
        let now = Utc::now();

        tracker.record("bolo", 100.0, true, now);
        tracker.record("bolo", 200.0, false, now);

        let entry = tracker.get("bolo").unwrap();
        assert_eq!(entry.frequency, 2);
        assert_eq!(entry.avg_latency, 150.0);
        assert_eq!(entry.success_rate, 0.5);
    }

    #[test]
    fn test_queries_are_exact_keys() {
        let mut tracker = SearchTrendTracker::new(1000);
        let now = Utc::now();

        tracker.record("bolo", 100.0, true, now);
        tracker.record("Bolo", 100.0, true, now);

        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_eviction_keeps_most_frequent() {
        let mut tracker = SearchTrendTracker::new(3);
        let now = Utc::now();

        for _ in 0..5 {
            tracker.record("pizza", 10.0, true, now);
        }
        for _ in 0..3 {
            tracker.record("bolo", 10.0, true, now);
        }
        for _ in 0..2 {
            tracker.record("torta", 10.0, true, now);
        }
        tracker.record("pastel", 10.0, true, now);

        assert_eq!(tracker.len(), 3);
        assert!(tracker.get("pastel").is_none());

        let top = tracker.top(10);
        let queries: Vec<&str> = top.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, vec!["pizza", "bolo", "torta"]);
    }
}
