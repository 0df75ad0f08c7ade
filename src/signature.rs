//! 连接签名校验
//!
//! 服务端使用访问密钥对 connection id 做 HMAC-SHA256，结果以
//! `sha256=<hex>` 形式放在 `ce-signature` 头中。密钥轮换期间会同时
//! 携带新旧密钥计算出的多个签名。

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// 单个访问密钥
#[derive(Clone)]
pub struct AccessKey {
    pub id: String,
    secret: String,
}

impl AccessKey {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
        }
    }

    /// 使用该密钥签名
    pub fn sign(&self, connection_id: &str) -> String {
        sign(connection_id, &self.secret)
    }
}

impl std::fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessKey")
            .field("id", &self.id)
            .field("secret", &"***")
            .finish()
    }
}

/// 当前与历史密钥集合，任意一个匹配即通过
#[derive(Debug, Clone, Default)]
pub struct AccessKeySet {
    keys: Vec<AccessKey>,
}

impl AccessKeySet {
    pub fn new(keys: Vec<AccessKey>) -> Self {
        Self { keys }
    }

    pub fn push(&mut self, key: AccessKey) {
        if !self.keys.iter().any(|k| k.secret == key.secret) {
            self.keys.push(key);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccessKey> {
        self.keys.iter()
    }
}

/// 计算 connection id 的签名，输出 `sha256=<小写 hex>`
pub fn sign(connection_id: &str, secret: &str) -> String {
    let mac = keyed_mac(secret, connection_id);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

fn keyed_mac(secret: &str, connection_id: &str) -> HmacSha256 {
    // HMAC 对密钥长度没有限制
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(connection_id.as_bytes());
    mac
}

/// 解析签名头：逗号或空白分隔，去掉 `sha256=` 前缀后 hex 解码。
/// 格式不合法的 token 被忽略。
pub fn parse_signature_tokens(raw: &str) -> Vec<Vec<u8>> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .filter_map(|token| {
            let prefix = token.get(..SIGNATURE_PREFIX.len())?;
            if !prefix.eq_ignore_ascii_case(SIGNATURE_PREFIX) {
                return None;
            }
            let digest = hex::decode(&token[SIGNATURE_PREFIX.len()..]).ok()?;
            (digest.len() == 32).then_some(digest)
        })
        .collect()
}

/// 校验签名
///
/// - 未配置任何密钥：直接通过（签名校验是可选的）
/// - 配置了密钥但没有签名或签名无合法 token：失败
/// - 比较使用 `Mac::verify_slice`，为常量时间
pub fn verify(connection_id: &str, provided: Option<&str>, keys: &AccessKeySet) -> bool {
    if keys.is_empty() {
        return true;
    }
    let Some(raw) = provided else {
        debug!(connection_id, "signature header missing");
        return false;
    };
    let tokens = parse_signature_tokens(raw);
    if tokens.is_empty() {
        debug!(connection_id, "signature header has no well-formed token");
        return false;
    }

    keys.iter().any(|key| {
        tokens
            .iter()
            .any(|token| keyed_mac(&key.secret, connection_id).verify_slice(token).is_ok())
    })
}
