//! 增量拉取协议的数据类型

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// 增量拉取请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_access_password: Option<String>,
    /// 上次成功拉取的 Unix 时间，服务端据此只返回变化的条目
    #[serde(rename = "lastFetchUTC", default, skip_serializing_if = "Option::is_none")]
    pub last_fetch_utc: Option<i64>,
    pub keys: Vec<String>,
    pub locales: Vec<String>,
}

/// 响应中的单个翻译条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationItem {
    pub key: String,
    /// 语言 → 文本；响应里为 null 的语言视为未翻译并被丢弃
    #[serde(default, deserialize_with = "non_null_translations")]
    pub translations: HashMap<String, String>,
}

impl TranslationItem {
    pub fn new<I, L, T>(key: &str, translations: I) -> Self
    where
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        Self {
            key: key.to_string(),
            translations: translations
                .into_iter()
                .map(|(l, t)| (l.into(), t.into()))
                .collect(),
        }
    }
}

/// 服务端返回的错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// 响应信封，`items` 与 `errors` 互斥
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<TranslationItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<RemoteError>>,
}

impl FetchResponse {
    /// 成功响应
    pub fn with_items(items: Vec<TranslationItem>) -> Self {
        Self {
            kind: None,
            count: items.len() as i64,
            items: Some(items),
            errors: None,
        }
    }

    /// 失败响应
    pub fn with_errors(errors: Vec<RemoteError>) -> Self {
        Self {
            kind: None,
            count: 0,
            items: None,
            errors: Some(errors),
        }
    }

    /// 结合 HTTP 状态得出拉取结果；非成功状态一律视为拒绝
    pub fn into_outcome(self, status: u16) -> FetchOutcome {
        let success = (200..300).contains(&status);
        match (success, self.errors) {
            (false, errors) => FetchOutcome::Rejected {
                status,
                errors: errors.unwrap_or_default(),
            },
            (true, Some(errors)) if !errors.is_empty() => FetchOutcome::Rejected { status, errors },
            (true, _) => FetchOutcome::Updated(self.items.unwrap_or_default()),
        }
    }
}

/// 一次拉取的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 服务端返回的条目，可能只是全部键的子集
    Updated(Vec<TranslationItem>),
    /// 服务端可达但拒绝了请求
    Rejected {
        status: u16,
        errors: Vec<RemoteError>,
    },
}

fn non_null_translations<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<HashMap<String, Option<String>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(locale, text)| text.map(|t| (locale, t)))
        .collect())
}
