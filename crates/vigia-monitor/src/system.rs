use crate::error::{MonitorError, Result};
use std::sync::Mutex;
use sysinfo::System;
use tracing::debug;

/// 读取失败时记录的估计值
pub const FALLBACK_MEMORY_USAGE: f64 = 50.0;

/// 内存使用率读取接口（百分比 0..100）
pub trait MemoryProbe: Send + Sync {
    fn usage_percent(&self) -> Result<f64>;
}

/// 基于 sysinfo 的内存读取器
///
/// 优先取当前进程常驻内存占总内存的比例，取不到进程信息时退回整机已用内存比例。
pub struct SysinfoMemoryProbe {
    system: Mutex<System>,
}

impl SysinfoMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoMemoryProbe {
    fn usage_percent(&self) -> Result<f64> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| MonitorError::MemoryProbe("probe lock poisoned".to_string()))?;

        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return Err(MonitorError::MemoryProbe("total memory unavailable".to_string()));
        }

        let used = match sysinfo::get_current_pid() {
            Ok(pid) if system.refresh_process(pid) => system
                .process(pid)
                .map(|p| p.memory())
                .unwrap_or_else(|| system.used_memory()),
            _ => system.used_memory(),
        };

        let percent = used as f64 / total as f64 * 100.0;
        debug!(
            used_mb = used / 1024 / 1024,
            total_mb = total / 1024 / 1024,
            "Memory usage sampled: {:.2}%",
            percent
        );
        Ok(percent)
    }
}

/// 固定返回值的读取器
pub struct FixedMemoryProbe(pub Option<f64>);

impl MemoryProbe for FixedMemoryProbe {
    fn usage_percent(&self) -> Result<f64> {
        self.0
            .ok_or_else(|| MonitorError::MemoryProbe("memory usage unavailable".to_string()))
    }
}
