//! 滥用保护（WebHook 预检）
//!
//! 服务端在投递事件前会发送 `OPTIONS` 请求并携带
//! `WebHook-Request-Origin` 头，订阅方需要回显被允许的 origin。

use std::collections::BTreeSet;

use http::{HeaderMap, Method};
use tracing::debug;

use crate::headers::{WEBHOOK_REQUEST_ORIGIN, all_values};

/// 预检判断结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preflight {
    NotPreflight,
    Preflight { requested_hosts: Vec<String> },
}

impl Preflight {
    pub fn is_preflight(&self) -> bool {
        matches!(self, Preflight::Preflight { .. })
    }

    pub fn requested_hosts(&self) -> &[String] {
        match self {
            Preflight::Preflight { requested_hosts } => requested_hosts,
            Preflight::NotPreflight => &[],
        }
    }
}

/// 判断请求是否为滥用保护预检：只有 OPTIONS 且带 origin 头才算
pub fn check_preflight(method: &Method, origin_values: &[String]) -> Preflight {
    if *method != Method::OPTIONS || origin_values.is_empty() {
        return Preflight::NotPreflight;
    }
    Preflight::Preflight {
        requested_hosts: origin_values.to_vec(),
    }
}

/// 从请求头中读取 origin 后判断
pub fn check_preflight_headers(method: &Method, headers: &HeaderMap) -> Preflight {
    check_preflight(method, &all_values(headers, WEBHOOK_REQUEST_ORIGIN))
}

/// 去掉 scheme、路径与端口并转小写
pub fn normalize_host(raw: &str) -> String {
    let raw = raw.trim();
    let without_scheme = raw.split_once("://").map(|(_, rest)| rest).unwrap_or(raw);
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let authority = authority.rsplit_once('@').map(|(_, h)| h).unwrap_or(authority);

    let host = if let Some(rest) = authority.strip_prefix('[') {
        // IPv6 字面量
        rest.split(']').next().unwrap_or_default()
    } else {
        authority.split(':').next().unwrap_or_default()
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum OriginPattern {
    Exact(String),
    /// `*.example.com`，保存 `example.com`
    Wildcard(String),
}

impl OriginPattern {
    fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let (wildcard, rest) = match trimmed
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(trimmed)
            .strip_prefix("*.")
        {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let host = normalize_host(rest);
        if host.is_empty() {
            return None;
        }
        Some(if wildcard {
            OriginPattern::Wildcard(host)
        } else {
            OriginPattern::Exact(host)
        })
    }

    fn matches(&self, host: &str) -> bool {
        match self {
            OriginPattern::Exact(expected) => expected == host,
            OriginPattern::Wildcard(suffix) => host
                .strip_suffix(suffix.as_str())
                .and_then(|label| label.strip_suffix('.'))
                .map(|label| !label.is_empty() && !label.contains('.'))
                .unwrap_or(false),
        }
    }
}

/// 允许投递事件的 origin 集合，构造后不可变
#[derive(Debug, Clone, Default)]
pub struct AllowedOriginSet {
    patterns: BTreeSet<OriginPattern>,
}

impl AllowedOriginSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .filter_map(|p| OriginPattern::parse(p.as_ref()))
                .collect(),
        }
    }

    /// 未配置任何 origin 时不做限制
    pub fn is_unrestricted(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// 判断 host 是否在允许集合内（大小写不敏感，忽略 scheme 与端口）
pub fn origin_allowed(host: &str, allowed: &AllowedOriginSet) -> bool {
    let host = normalize_host(host);
    if host.is_empty() {
        return false;
    }
    allowed.patterns.iter().any(|pattern| pattern.matches(&host))
}

/// 滥用保护守卫
#[derive(Debug, Clone, Default)]
pub struct AbuseProtectionGuard {
    allowed: AllowedOriginSet,
}

impl AbuseProtectionGuard {
    pub fn new(allowed: AllowedOriginSet) -> Self {
        Self { allowed }
    }

    pub fn allowed_origins(&self) -> &AllowedOriginSet {
        &self.allowed
    }

    /// 过滤出被允许的 host，保持请求中的顺序
    pub fn allowed_hosts(&self, requested: &[String]) -> Vec<String> {
        let allowed: Vec<String> = requested
            .iter()
            .filter(|host| origin_allowed(host, &self.allowed))
            .cloned()
            .collect();
        if allowed.len() < requested.len() {
            debug!(
                requested = ?requested,
                allowed = ?allowed,
                "some preflight origins are not allowed"
            );
        }
        allowed
    }
}
