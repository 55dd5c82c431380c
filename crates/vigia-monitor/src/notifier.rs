use crate::alert::{AlertEvent, AlertLevel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{error, info};

/// 通知配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
    pub email_recipients: Vec<String>,
    pub sms_recipients: Vec<String>,
    pub enabled: bool,
}

/// 严重告警的外发负载
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalAlertPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub alert: AlertEvent,
    pub timestamp: DateTime<Utc>,
}

impl CriticalAlertPayload {
    pub fn new(alert: AlertEvent, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: "critical_alert".to_string(),
            alert,
            timestamp,
        }
    }
}

/// 通知渠道接口
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, payload: &CriticalAlertPayload) -> Result<(), NotifierError>;
    fn name(&self) -> &str;
}

/// 通知错误
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Webhook rejected with status: {0}")]
    Rejected(u16),
}

/// Webhook 通知器
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
    timeout: StdDuration,
}

impl WebhookNotifier {
    /// 单次 webhook 请求的默认超时
    pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(10);

    pub fn new(url: String) -> Self {
        Self::with_timeout(url, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: String, timeout: StdDuration) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> StdDuration {
        self.timeout
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, payload: &CriticalAlertPayload) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifierError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifierError::Rejected(response.status().as_u16()));
        }

        info!("Webhook notification sent to {}", self.url);
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// 邮件通知器（只记录发送意图，实际投递由外部服务完成）
pub struct EmailNotifier {
    to: Vec<String>,
}

impl EmailNotifier {
    pub fn new(to: Vec<String>) -> Self {
        Self { to }
    }

    fn format_email(&self, payload: &CriticalAlertPayload) -> String {
        let alert = &payload.alert;
        let mut body = format!("Alert: {}\n\n", alert.id);
        body.push_str(&format!("Metric: {}\n", alert.metric));
        body.push_str(&format!("Level: {}\n", alert.level));
        body.push_str(&format!("Message: {}\n", alert.message));
        body.push_str(&format!("Created at: {}\n", alert.created_at));
        body
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, payload: &CriticalAlertPayload) -> Result<(), NotifierError> {
        info!(
            recipients = ?self.to,
            alert_id = %payload.alert.id,
            "Email notification would be sent: {}",
            self.format_email(payload)
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "email"
    }
}

/// 短信通知器（只记录发送意图）
pub struct SmsNotifier {
    to: Vec<String>,
}

impl SmsNotifier {
    pub fn new(to: Vec<String>) -> Self {
        Self { to }
    }
}

#[async_trait]
impl Notifier for SmsNotifier {
    async fn send(&self, payload: &CriticalAlertPayload) -> Result<(), NotifierError> {
        info!(
            recipients = ?self.to,
            alert_id = %payload.alert.id,
            "SMS notification would be sent: {}",
            payload.alert.message
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "sms"
    }
}

/// 一次分发的结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

/// 严重告警分发器
///
/// 只处理 CRITICAL 告警；失败只记录日志，不重试。
pub struct NotificationDispatcher {
    config: NotificationConfig,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotificationDispatcher {
    pub fn new(config: NotificationConfig) -> Self {
        let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

        if let Some(url) = &config.webhook_url {
            notifiers.push(Arc::new(WebhookNotifier::new(url.clone())));
        }
        if !config.email_recipients.is_empty() {
            notifiers.push(Arc::new(EmailNotifier::new(config.email_recipients.clone())));
        }
        if !config.sms_recipients.is_empty() {
            notifiers.push(Arc::new(SmsNotifier::new(config.sms_recipients.clone())));
        }

        Self { config, notifiers }
    }

    pub fn disabled() -> Self {
        Self::new(NotificationConfig::default())
    }

    /// 追加自定义渠道
    pub fn add_notifier(&mut self, notifier: Arc<dyn Notifier>) {
        info!("Adding notifier: {}", notifier.name());
        self.notifiers.push(notifier);
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    pub fn notifier_count(&self) -> usize {
        self.notifiers.len()
    }

    pub async fn dispatch(&self, alert: &AlertEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        if !self.config.enabled || alert.level != AlertLevel::Critical {
            return report;
        }

        let payload = CriticalAlertPayload::new(alert.clone(), Utc::now());
        for notifier in &self.notifiers {
            match notifier.send(&payload).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    error!(
                        alert_id = %alert.id,
                        "Failed to send critical notification via {}: {}",
                        notifier.name(),
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::disabled()
    }
}
