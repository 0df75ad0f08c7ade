//! 连接状态编解码
//!
//! 连接状态是一组 `String -> JSON` 的键值，随每个事件通过 HTTP 头往返。
//! 单个头有长度上限，因此编码结果按固定大小切片，放在
//! `ce-connectionState-0`、`ce-connectionState-1`… 中。
//!
//! 编码：紧凑 JSON → URL-safe base64（无填充）→ 按 `chunk_size` 切片。
//! 解码：按头名中的序号排序后拼接，再逆向解析。

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{Result, WebPubSubError};
use crate::headers::{CE_CONNECTION_STATE, CE_CONNECTION_STATE_PREFIX};

/// 连接状态映射，使用 BTreeMap 保证编码结果确定
pub type ConnectionStates = BTreeMap<String, Value>;

pub const DEFAULT_CHUNK_SIZE: usize = 4096;
pub const DEFAULT_MAX_CHUNKS: usize = 16;

/// 状态编解码配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateCodecConfig {
    /// 单个头的最大字节数
    pub chunk_size: usize,
    /// 最多允许的分片数
    pub max_chunks: usize,
}

impl Default for StateCodecConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunks: DEFAULT_MAX_CHUNKS,
        }
    }
}

/// 单个 key 的变更
#[derive(Debug, Clone, PartialEq)]
pub enum StateMutation {
    Set(Value),
    Remove,
}

/// 一批状态变更
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdates {
    clear_all: bool,
    entries: BTreeMap<String, StateMutation>,
}

impl StateUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.entries
            .insert(key.into(), StateMutation::Set(value.into()));
        self
    }

    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), StateMutation::Remove);
        self
    }

    /// 清空全部状态，同批次内的其他变更都会被忽略
    pub fn clear_all(&mut self) -> &mut Self {
        self.clear_all = true;
        self
    }

    pub fn is_clear_all(&self) -> bool {
        self.clear_all
    }

    pub fn is_empty(&self) -> bool {
        !self.clear_all && self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &StateMutation)> {
        self.entries.iter()
    }
}

/// 把变更应用到已有状态上，返回新的状态，不修改入参。
///
/// 结果为 `None` 表示状态被清空（或本来就没有状态且没有新增）。
pub fn merge(existing: Option<&ConnectionStates>, updates: &StateUpdates) -> Option<ConnectionStates> {
    if updates.clear_all {
        return None;
    }

    let mut merged = existing.cloned().unwrap_or_default();
    for (key, mutation) in &updates.entries {
        match mutation {
            StateMutation::Set(value) => {
                merged.insert(key.clone(), value.clone());
            }
            StateMutation::Remove => {
                merged.remove(key);
            }
        }
    }

    if merged.is_empty() && existing.is_none() {
        None
    } else {
        Some(merged)
    }
}

/// 连接状态编解码器
#[derive(Debug, Clone, Default)]
pub struct ConnectionStateCodec {
    config: StateCodecConfig,
}

impl ConnectionStateCodec {
    pub fn new(config: StateCodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StateCodecConfig {
        &self.config
    }

    /// 编码为有序分片，空状态编码为空列表
    pub fn encode(&self, states: &ConnectionStates) -> Result<Vec<String>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }

        let json = serde_json::to_vec(states).map_err(WebPubSubError::bad_body)?;
        let encoded = URL_SAFE_NO_PAD.encode(json);

        // base64 字母表全是 ASCII，按字节切片不会落在字符中间
        let chunk_size = self.config.chunk_size.max(1);
        let required = encoded.len().div_ceil(chunk_size);
        if required > self.config.max_chunks {
            warn!(
                encoded_len = encoded.len(),
                required,
                max_chunks = self.config.max_chunks,
                "connection state exceeds header budget"
            );
            return Err(WebPubSubError::StateEncodingOverflow {
                required,
                max_chunks: self.config.max_chunks,
            });
        }

        Ok((0..encoded.len())
            .step_by(chunk_size)
            .map(|start| encoded[start..(start + chunk_size).min(encoded.len())].to_string())
            .collect())
    }

    /// 编码为带序号的头
    pub fn encode_headers(&self, states: &ConnectionStates) -> Result<Vec<(HeaderName, HeaderValue)>> {
        self.encode(states)?
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let name = HeaderName::from_bytes(
                    format!("{CE_CONNECTION_STATE_PREFIX}{index}").as_bytes(),
                )
                .map_err(WebPubSubError::bad_body)?;
                let value = HeaderValue::from_str(&chunk).map_err(WebPubSubError::bad_body)?;
                Ok((name, value))
            })
            .collect()
    }

    /// 从分片还原状态，序号必须从 0 开始连续
    pub fn decode<I, S>(&self, chunks: I) -> Result<Option<ConnectionStates>>
    where
        I: IntoIterator<Item = (usize, S)>,
        S: AsRef<str>,
    {
        let mut indexed: Vec<(usize, S)> = chunks.into_iter().collect();
        if indexed.is_empty() {
            return Ok(None);
        }
        if indexed.len() > self.config.max_chunks {
            return Err(WebPubSubError::BadRequestBody(format!(
                "connection state has {} chunks, at most {} are allowed",
                indexed.len(),
                self.config.max_chunks
            )));
        }
        indexed.sort_by_key(|(index, _)| *index);

        let mut encoded = String::new();
        for (expected, (index, chunk)) in indexed.iter().enumerate() {
            if *index != expected {
                return Err(WebPubSubError::BadRequestBody(format!(
                    "connection state chunk {expected} is missing"
                )));
            }
            encoded.push_str(chunk.as_ref().trim());
        }

        let json = URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .map_err(WebPubSubError::bad_body)?;
        let states: ConnectionStates =
            serde_json::from_slice(&json).map_err(WebPubSubError::bad_body)?;
        Ok(Some(states))
    }

    /// 从请求头中读取状态分片并解码。
    ///
    /// 没有任何状态头时返回 `None`；只有未分片的 `ce-connectionState`
    /// 时把它当作第 0 片。
    pub fn decode_headers(&self, headers: &HeaderMap) -> Result<Option<ConnectionStates>> {
        let mut chunks = Vec::new();
        for (name, value) in headers {
            let Some(suffix) = name.as_str().strip_prefix(CE_CONNECTION_STATE_PREFIX) else {
                continue;
            };
            let index = suffix.parse::<usize>().map_err(|_| {
                WebPubSubError::BadRequestBody(format!("invalid state header name: {name}"))
            })?;
            let value = value.to_str().map_err(WebPubSubError::bad_body)?;
            chunks.push((index, value));
        }

        if chunks.is_empty() {
            if let Some(single) = headers.get(CE_CONNECTION_STATE) {
                let value = single.to_str().map_err(WebPubSubError::bad_body)?;
                if value.trim().is_empty() {
                    return Ok(None);
                }
                chunks.push((0, value));
            }
        }

        self.decode(chunks)
    }
}
