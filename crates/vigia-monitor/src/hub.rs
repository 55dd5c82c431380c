use crate::alert::AlertEvent;
use crate::error::{MonitorError, Result};
use crate::health::SystemHealthSnapshot;
use crate::metric::{MetricType, WindowStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

/// 推送通道接口
///
/// 传输层（WebSocket、SSE、进程内通道）只需实现“是否打开”与“发送”两个能力。
pub trait PushSink: Send + Sync {
    fn is_open(&self) -> bool;
    fn send(&self, payload: &str) -> Result<()>;
}

/// 每个订阅者默认可积压的消息数
pub const DEFAULT_SINK_CAPACITY: usize = 64;

/// 基于 tokio mpsc 的进程内推送通道
///
/// 队列有界；接收端消费不及时导致队列写满时发送失败，订阅中心随即移除该订阅者。
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::Receiver<String>) {
        Self::with_capacity(DEFAULT_SINK_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl PushSink for ChannelSink {
    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, payload: &str) -> Result<()> {
        self.tx.try_send(payload.to_string()).map_err(|e| match e {
            TrySendError::Full(_) => MonitorError::Sink("subscriber queue is full".to_string()),
            TrySendError::Closed(_) => MonitorError::Sink("subscriber channel closed".to_string()),
        })
    }
}

/// 仪表盘快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub metrics: BTreeMap<MetricType, WindowStats>,
    pub alerts: Vec<AlertEvent>,
    pub system_health: SystemHealthSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// 推送给订阅者的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum HubMessage {
    Snapshot(DashboardSnapshot),
    Alert(AlertEvent),
}

pub type SubscriberId = u64;

/// 一次广播的投递结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// 订阅中心
///
/// 广播前先对注册表做快照再迭代，并发的订阅/退订不会影响正在进行的广播。
pub struct SubscriptionHub {
    subscribers: RwLock<HashMap<SubscriberId, Arc<dyn PushSink>>>,
    next_id: AtomicU64,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn register(&self, sink: Arc<dyn PushSink>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().await.insert(id, sink);
        debug!(subscriber = id, "Subscriber registered");
        id
    }

    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.write().await.remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "Subscriber removed");
        }
        removed
    }

    /// 推送给单个订阅者，失败或通道已关闭时将其移除
    pub async fn push_to(&self, id: SubscriberId, message: &HubMessage) -> bool {
        let sink = match self.subscribers.read().await.get(&id) {
            Some(sink) => sink.clone(),
            None => return false,
        };

        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize hub message: {}", e);
                return false;
            }
        };

        if Self::deliver(id, sink.as_ref(), &payload) {
            true
        } else {
            self.subscribers.write().await.remove(&id);
            false
        }
    }

    /// 推送给所有打开的订阅者
    pub async fn broadcast(&self, message: &HubMessage) -> BroadcastReport {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize hub message: {}", e);
                return BroadcastReport::default();
            }
        };

        let targets: Vec<(SubscriberId, Arc<dyn PushSink>)> = self
            .subscribers
            .read()
            .await
            .iter()
            .map(|(id, sink)| (*id, sink.clone()))
            .collect();

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for (id, sink) in targets {
            if Self::deliver(id, sink.as_ref(), &payload) {
                report.delivered += 1;
            } else {
                failed.push(id);
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in &failed {
                subscribers.remove(id);
            }
            report.dropped = failed.len();
        }

        report
    }

    fn deliver(id: SubscriberId, sink: &dyn PushSink, payload: &str) -> bool {
        if !sink.is_open() {
            debug!(subscriber = id, "Dropping closed subscriber");
            return false;
        }
        match sink.send(payload) {
            Ok(()) => true,
            Err(e) => {
                warn!(subscriber = id, error = %e, "Push failed, dropping subscriber");
                false
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.subscribers.write().await.clear();
    }
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertLevel;
    use std::sync::atomic::AtomicBool;

    struct FailingSink;

    impl PushSink for FailingSink {
        fn is_open(&self) -> bool {
            true
        }

        fn send(&self, _payload: &str) -> Result<()> {
            Err(MonitorError::Sink("connection reset".to_string()))
        }
    }

    struct ToggleSink {
        open: AtomicBool,
    }

    impl PushSink for ToggleSink {
        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn send(&self, _payload: &str) -> Result<()> {
            Ok(())
        }
    }

    fn sample_alert() -> AlertEvent {
        AlertEvent {
            id: "search_latency_warning_1_1".to_string(),
            metric: MetricType::SearchLatency,
            level: AlertLevel::Warning,
            value: 600.0,
            threshold: 500.0,
            created_at: Utc::now(),
            message: "warning alert for search_latency".to_string(),
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
        }
    }

    #[tokio::test]
    async fn test_failing_subscriber_is_isolated() {
        let hub = SubscriptionHub::new();
        let (good, mut rx) = ChannelSink::new();

        hub.register(Arc::new(FailingSink)).await;
        hub.register(Arc::new(good)).await;

        let report = hub.broadcast(&HubMessage::Alert(sample_alert())).await;

        assert_eq!(report, BroadcastReport { delivered: 1, dropped: 1 });
        assert_eq!(hub.len().await, 1);

        let payload = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "alert");
        assert_eq!(value["data"]["metric"], "search_latency");
    }

    #[tokio::test]
    async fn test_closed_subscriber_removed() {
        let hub = SubscriptionHub::new();
        let sink = Arc::new(ToggleSink {
            open: AtomicBool::new(true),
        });
        hub.register(sink.clone()).await;

        assert_eq!(hub.broadcast(&HubMessage::Alert(sample_alert())).await.delivered, 1);

        sink.open.store(false, Ordering::SeqCst);
        let report = hub.broadcast(&HubMessage::Alert(sample_alert())).await;
        assert_eq!(report.dropped, 1);
        assert!(hub.is_empty().await);
    }

    #[tokio::test]
    async fn test_dropped_receiver_closes_channel_sink() {
        let hub = SubscriptionHub::new();
        let (sink, rx) = ChannelSink::new();
        let id = hub.register(Arc::new(sink)).await;
        drop(rx);

        assert!(!hub.push_to(id, &HubMessage::Alert(sample_alert())).await);
        assert_eq!(hub.len().await, 0);
    }

    #[tokio::test]
    async fn test_stalled_receiver_is_dropped() {
        let hub = SubscriptionHub::new();
        let (sink, mut rx) = ChannelSink::with_capacity(2);
        hub.register(Arc::new(sink)).await;

        for _ in 0..2 {
            assert_eq!(hub.broadcast(&HubMessage::Alert(sample_alert())).await.delivered, 1);
        }

        let report = hub.broadcast(&HubMessage::Alert(sample_alert())).await;
        assert_eq!(report, BroadcastReport { delivered: 0, dropped: 1 });
        assert!(hub.is_empty().await);

        // 已入队的消息仍可读出，之后通道关闭
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let hub = SubscriptionHub::new();
        let (sink, _rx) = ChannelSink::new();
        let id = hub.register(Arc::new(sink)).await;

        assert!(hub.unsubscribe(id).await);
        assert!(!hub.unsubscribe(id).await);
        assert!(hub.is_empty().await);
    }
}
