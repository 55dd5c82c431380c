use anyhow::{anyhow, Result};
use config::{Config, File, FileFormat};
use std::fs;
use std::path::{Path, PathBuf};

use crate::AppConfig;

/// 配置文件名
pub const CONFIG_FILE_NAME: &str = "vigia.toml";

/// 配置加载器
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// 创建配置加载器
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// 加载配置，文件不存在时返回默认配置
    pub fn load(&self) -> Result<AppConfig> {
        let config_path = self.config_path();

        if !config_path.exists() {
            return Ok(AppConfig::default());
        }

        let config = Config::builder()
            .add_source(File::new(
                config_path.to_str().ok_or_else(|| anyhow!("Invalid config path"))?,
                FileFormat::Toml,
            ))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// 验证配置文件
    pub fn validate(&self) -> Result<()> {
        Self::check(&self.load()?)
    }

    /// 加载并验证，文件只解析一次
    pub fn load_validated(&self) -> Result<AppConfig> {
        let config = self.load()?;
        Self::check(&config)?;
        Ok(config)
    }

    fn check(config: &AppConfig) -> Result<()> {
        if config.server.port == 0 {
            return Err(anyhow!("server.port must be greater than 0"));
        }
        if config.logging.level.trim().is_empty() {
            return Err(anyhow!("logging.level cannot be empty"));
        }

        config
            .monitor
            .validate()
            .map_err(|e| anyhow!("monitor: {}", e))
    }

    /// 写出一份默认配置，文件已存在时不覆盖
    pub fn write_default(&self) -> Result<PathBuf> {
        let config_path = self.config_path();
        if config_path.exists() {
            return Err(anyhow!("Config file already exists: {}", config_path.display()));
        }

        fs::create_dir_all(&self.config_dir)?;
        fs::write(&config_path, toml::to_string_pretty(&AppConfig::default())?)?;
        Ok(config_path)
    }
}
