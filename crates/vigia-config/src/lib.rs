pub mod app;
pub mod loader;

pub use app::{AppConfig, LogFormat, LoggingConfig, ServerConfig};
pub use loader::{ConfigLoader, CONFIG_FILE_NAME};
