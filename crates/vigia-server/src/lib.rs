pub mod api;
pub mod logging;
pub mod signal;
pub mod ws;

use std::sync::Arc;
use vigia_monitor::SearchMonitor;

// 路由共享状态（main.rs 和测试共用）
pub struct AppState {
    pub monitor: Arc<SearchMonitor>,
}

impl AppState {
    pub fn new(monitor: Arc<SearchMonitor>) -> Self {
        Self { monitor }
    }
}
