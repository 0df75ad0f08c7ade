//! CloudEvents 头名称与读取工具
//!
//! HTTP 头名称大小写不敏感，`http::HeaderMap` 内部统一为小写存储。

use http::HeaderMap;

pub const CE_TYPE: &str = "ce-type";
pub const CE_HUB: &str = "ce-hub";
pub const CE_CONNECTION_ID: &str = "ce-connectionid";
pub const CE_USER_ID: &str = "ce-userid";
pub const CE_SIGNATURE: &str = "ce-signature";
pub const CE_EVENT_NAME: &str = "ce-eventname";
/// 单个（未分片）连接状态头
pub const CE_CONNECTION_STATE: &str = "ce-connectionstate";
/// 分片连接状态头前缀，后接分片序号
pub const CE_CONNECTION_STATE_PREFIX: &str = "ce-connectionstate-";

pub const WEBHOOK_REQUEST_ORIGIN: &str = "webhook-request-origin";
pub const WEBHOOK_ALLOWED_ORIGIN: &str = "webhook-allowed-origin";
pub const HOST: &str = "host";
pub const CONTENT_TYPE: &str = "content-type";

pub const TYPE_SYSTEM_PREFIX: &str = "azure.webpubsub.sys.";
pub const TYPE_USER_PREFIX: &str = "azure.webpubsub.user.";

pub const CONTENT_TYPE_TEXT: &str = "text/plain";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";

/// 读取首个值并去除首尾空白，空值视为缺失
pub fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// 读取同名头的全部值，逗号分隔的值会被拆开
pub fn all_values(headers: &HeaderMap, name: &str) -> Vec<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}
