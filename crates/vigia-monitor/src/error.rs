use thiserror::Error;

/// 监控引擎统一错误类型
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Memory probe error: {0}")]
    MemoryProbe(String),

    #[error("Subscriber delivery error: {0}")]
    Sink(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Exporter error: {0}")]
    Exporter(#[from] prometheus::Error),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, MonitorError>;
