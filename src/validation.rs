//! 校验选项
//!
//! 由配置构造出不可变的 [`AccessKeySet`] 与 [`AllowedOriginSet`]，
//! 请求处理期间只读，可以在任意多个任务间共享。

use anyhow::{Context, Result, anyhow};
use tracing::info;
use url::Url;

use crate::abuse::AllowedOriginSet;
use crate::config::ValidationConfig;
use crate::signature::{AccessKey, AccessKeySet};

/// 连接字符串中解析出的服务端信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub host: String,
    pub access_key: Option<String>,
}

/// 解析 `Endpoint=https://host;AccessKey=xxx;Version=1.0;` 形式的连接字符串。
/// 键名大小写不敏感，未知键被忽略。
pub fn parse_connection_string(connection_string: &str) -> Result<ServiceEndpoint> {
    let mut endpoint = None;
    let mut access_key = None;

    for pair in connection_string.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid connection string segment: {pair}"))?;
        match key.trim().to_ascii_lowercase().as_str() {
            "endpoint" => endpoint = Some(value.trim().to_string()),
            "accesskey" => {
                let value = value.trim();
                if !value.is_empty() {
                    access_key = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    let endpoint = endpoint.ok_or_else(|| anyhow!("connection string is missing Endpoint"))?;
    let url = Url::parse(&endpoint).with_context(|| format!("invalid endpoint: {endpoint}"))?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("endpoint has no host: {endpoint}"))?
        .to_ascii_lowercase();

    Ok(ServiceEndpoint { host, access_key })
}

/// 签名校验与滥用保护所需的全部只读配置
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    pub keys: AccessKeySet,
    pub allowed_origins: AllowedOriginSet,
}

impl ValidationOptions {
    pub fn new(keys: AccessKeySet, allowed_origins: AllowedOriginSet) -> Self {
        Self {
            keys,
            allowed_origins,
        }
    }

    /// 连接字符串的 host 加入允许 origin，AccessKey 以 host 为标识加入密钥集合
    pub fn from_config(config: &ValidationConfig) -> Result<Self> {
        let mut keys = AccessKeySet::default();
        let mut origins = config.allowed_origins.clone();

        for connection_string in &config.connection_strings {
            let endpoint = parse_connection_string(connection_string)?;
            if let Some(secret) = endpoint.access_key {
                keys.push(AccessKey::new(endpoint.host.clone(), secret));
            }
            origins.push(endpoint.host);
        }
        for key in &config.keys {
            keys.push(AccessKey::new(key.id.clone(), key.secret.clone()));
        }

        let allowed_origins = AllowedOriginSet::new(&origins);
        info!(
            keys = keys.len(),
            origins = allowed_origins.len(),
            "validation options loaded"
        );
        Ok(Self::new(keys, allowed_origins))
    }
}
