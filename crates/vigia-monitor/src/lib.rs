pub mod alert;
pub mod anomaly;
pub mod clock;
pub mod config;
pub mod error;
pub mod exporter;
pub mod health;
pub mod hub;
pub mod metric;
pub mod monitor;
pub mod notifier;
pub mod report;
pub mod store;
pub mod system;
pub mod task;
pub mod trend;

pub use alert::{AlertEvaluator, AlertEvent, AlertLevel, AlertThresholdConfig, Evaluation};
pub use anomaly::{AnomalyConfig, AnomalyDetector, AnomalyRecord, AnomalySeverity};
pub use clock::{seconds, window_start, Clock, ManualClock, SystemClock, MAX_WINDOW_SECS};
pub use config::MonitorConfig;
pub use error::{MonitorError, Result};
pub use exporter::MetricsExporter;
pub use health::{HealthAggregator, HealthStatus, SystemHealthSnapshot};
pub use hub::{
    BroadcastReport, ChannelSink, DashboardSnapshot, HubMessage, PushSink, SubscriberId, SubscriptionHub,
    DEFAULT_SINK_CAPACITY,
};
pub use metric::{MetricContext, MetricSample, MetricType, Trend, UnknownMetric, WindowStats};
pub use monitor::SearchMonitor;
pub use notifier::{
    CriticalAlertPayload, DispatchReport, EmailNotifier, NotificationConfig, NotificationDispatcher, Notifier,
    NotifierError, SmsNotifier, WebhookNotifier,
};
pub use report::{AdvancedMetrics, HealthReport, MonitorStatus, PerformanceBaseline, PerformanceReport};
pub use store::MetricStore;
pub use system::{FixedMemoryProbe, MemoryProbe, SysinfoMemoryProbe};
pub use task::TaskHandle;
pub use trend::{SearchTrendEntry, SearchTrendTracker};
