//! 配置管理器 - 负责处理不同环境下的配置覆盖
//!
//! - 根据 `FLARE_ENV` 选择环境
//! - 加载 `config/environments/{env}.toml` 并合并到基础配置

use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use toml::Value;
use tracing::info;

use super::{WebPubSubConfig, load_toml_value, merge_value};

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取当前环境名称，未设置 `FLARE_ENV` 时为 "development"
    pub fn get_environment() -> String {
        env::var("FLARE_ENV").unwrap_or_else(|_| "development".to_string())
    }

    /// 加载当前环境的覆盖配置（若存在）
    pub fn load_environment_config(base_config: &mut WebPubSubConfig) -> Result<()> {
        let env = Self::get_environment();
        let env_config_path = format!("config/environments/{env}.toml");
        Self::apply_overlay_file(base_config, Path::new(&env_config_path))
    }

    /// 把一个覆盖文件合并进配置，文件不存在时什么也不做
    pub fn apply_overlay_file(base_config: &mut WebPubSubConfig, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let overlay = load_toml_value(path)?;
        Self::apply_overlay(base_config, overlay)
            .with_context(|| format!("invalid environment config: {}", path.display()))?;
        info!(path = %path.display(), "environment config applied");
        Ok(())
    }

    /// 覆盖值中的密钥与 origin 会整体替换对应列表
    pub fn apply_overlay(base_config: &mut WebPubSubConfig, overlay: Value) -> Result<()> {
        let mut merged = Value::try_from(&*base_config).context("unable to snapshot config")?;
        merge_value(&mut merged, overlay);
        *base_config = merged.try_into()?;
        Ok(())
    }
}
