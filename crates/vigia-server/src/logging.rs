use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;
use vigia_config::{LogFormat, LoggingConfig};

/// 初始化 tracing；RUST_LOG 优先于配置文件中的级别
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    }
    .map_err(|e| anyhow!("Failed to initialize tracing: {}", e))
}
