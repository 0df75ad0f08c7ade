//! Flare WebPubSub 配置模块
//!
//! 该模块提供事件接入层的配置加载功能，包括：
//! - 签名校验密钥与允许的 origin
//! - 连接状态分片参数
//! - 日志配置
//!
//! 配置在启动时加载一次，之后以不可变值的形式传给各组件，不存在全局可变配置。

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use toml::Value;
use tracing::warn;

use crate::state::StateCodecConfig;

mod manager;
pub use manager::ConfigManager;

/// 指定配置路径的环境变量
pub const CONFIG_PATH_ENV: &str = "FLARE_WEBPUBSUB_CONFIG";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别（`RUST_LOG` 优先）
    pub level: String,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_file: bool,
    pub with_line_number: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
        }
    }
}

/// 访问密钥配置
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessKeyConfig {
    /// 密钥标识，仅用于日志
    pub id: String,
    pub secret: String,
}

impl std::fmt::Debug for AccessKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessKeyConfig")
            .field("id", &self.id)
            .field("secret", &"***")
            .finish()
    }
}

/// 签名与滥用保护配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ValidationConfig {
    /// 形如 `Endpoint=https://host;AccessKey=xxx;Version=1.0;` 的连接字符串
    pub connection_strings: Vec<String>,
    /// 额外的访问密钥（轮换期间同时配置新旧密钥）
    pub keys: Vec<AccessKeyConfig>,
    /// 允许的 origin，支持 `*.example.com`
    pub allowed_origins: Vec<String>,
}

/// 事件接入层配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WebPubSubConfig {
    pub validation: ValidationConfig,
    pub state: StateCodecConfig,
    pub logging: LoggingConfig,
}

impl WebPubSubConfig {
    fn ensure_defaults(&mut self) {
        if self.state.chunk_size == 0 {
            warn!("state.chunk_size is 0, falling back to default");
            self.state.chunk_size = crate::state::DEFAULT_CHUNK_SIZE;
        }
        if self.state.max_chunks == 0 {
            warn!("state.max_chunks is 0, falling back to default");
            self.state.max_chunks = crate::state::DEFAULT_MAX_CHUNKS;
        }
    }
}

/// 加载配置
///
/// 查找顺序：
/// 1. 参数 `path`
/// 2. 环境变量 `FLARE_WEBPUBSUB_CONFIG`
/// 3. `config/webpubsub.toml`、`config`
/// 4. 都不存在时使用默认配置
///
/// 路径可以是单个文件，也可以是包含 `base.toml` 的目录。
/// 之后再叠加 `config/environments/{FLARE_ENV}.toml`（若存在）。
pub fn load_config(path: Option<&str>) -> Result<WebPubSubConfig> {
    let explicit = path
        .map(PathBuf::from)
        .or_else(|| env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

    let mut cfg = match explicit {
        Some(path) => load_config_from_source(&path)?,
        None => {
            let candidates = [
                PathBuf::from("config/webpubsub.toml"),
                PathBuf::from("config"),
            ];
            match candidates.iter().find(|p| p.exists()) {
                Some(path) => load_config_from_source(path)?,
                None => {
                    warn!("no configuration found, using defaults");
                    WebPubSubConfig::default()
                }
            }
        }
    };

    ConfigManager::load_environment_config(&mut cfg)?;
    cfg.ensure_defaults();
    Ok(cfg)
}

/// 从字符串解析配置
pub fn parse_config(content: &str) -> Result<WebPubSubConfig> {
    let mut cfg: WebPubSubConfig = toml::from_str(content).context("invalid config format")?;
    cfg.ensure_defaults();
    Ok(cfg)
}

fn load_config_from_source(path: &Path) -> Result<WebPubSubConfig> {
    let metadata = path
        .metadata()
        .with_context(|| format!("unable to read metadata for {}", path.display()))?;

    if metadata.is_dir() {
        load_config_from_directory(path)
    } else {
        load_config_from_file(path)
    }
}

fn load_config_from_file(path: &Path) -> Result<WebPubSubConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid config format: {}", path.display()))
}

/// 目录形式：`base.toml` 之后按文件名顺序叠加 `overrides/*.toml`
fn load_config_from_directory(path: &Path) -> Result<WebPubSubConfig> {
    let base_file = path.join("base.toml");
    if !base_file.exists() {
        return Err(anyhow!(
            "missing base configuration: {}",
            base_file.display()
        ));
    }

    let mut merged = load_toml_value(&base_file)?;
    if !merged.is_table() {
        return Err(anyhow!(
            "base configuration must be a table: {}",
            base_file.display()
        ));
    }

    merge_directory(&mut merged, &path.join("overrides"))?;

    merged
        .try_into()
        .with_context(|| format!("invalid configuration after merging {}", path.display()))
}

fn merge_directory(root: &mut Value, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("unable to read config directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(OsStr::to_str)
                .map(|ext| ext.eq_ignore_ascii_case("toml"))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();

    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let value = load_toml_value(&entry.path())?;
        merge_value(root, value);
    }

    Ok(())
}

pub(crate) fn load_toml_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config fragment {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("invalid TOML content in fragment {}", path.display()))
}

/// 深度合并：表逐键合并，其他值整体覆盖
pub(crate) fn merge_value(base: &mut Value, overlay: Value) {
    match overlay {
        Value::Table(overlay_table) => {
            if let Value::Table(base_table) = base {
                for (key, overlay_value) in overlay_table.into_iter() {
                    match base_table.get_mut(&key) {
                        Some(base_value) => merge_value(base_value, overlay_value),
                        None => {
                            base_table.insert(key, overlay_value);
                        }
                    }
                }
            } else {
                *base = Value::Table(overlay_table);
            }
        }
        other => {
            *base = other;
        }
    }
}
