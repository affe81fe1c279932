//! 远端翻译源
//!
//! `TranslationSource` 是刷新调度器与网络之间的接缝；
//! `HttpTranslationSource` 通过 reqwest 实现增量拉取和可达性探测。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;

use super::types::{FetchOutcome, FetchRequest, FetchResponse, RemoteError};
use crate::bucket::config::{constants, BucketConfig};
use crate::bucket::error::{BucketError, BucketResult};

/// 远端翻译源接口
#[async_trait]
pub trait TranslationSource: Send + Sync {
    /// 执行一次增量拉取
    ///
    /// 服务端可达时返回 `Ok`（成功或拒绝）；无法到达服务端时返回错误。
    async fn fetch(&self, request: &FetchRequest) -> BucketResult<FetchOutcome>;

    /// 轻量级可达性探测，只看 HTTP 状态
    async fn probe(&self) -> bool;
}

/// 基于 HTTP 的翻译源
///
/// # Invariants
/// - 地址在构造时拼好，基础地址不带结尾斜杠。
#[derive(Debug, Clone)]
pub struct HttpTranslationSource {
    client: Client,
    endpoint_url: String,
    probe_url: String,
    probe_timeout: Duration,
    api_key: Option<String>,
}

impl HttpTranslationSource {
    /// 根据配置构建 HTTP 翻译源
    pub fn new(config: &BucketConfig) -> BucketResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.max_response_wait())
            .gzip(true)
            .build()
            .map_err(|e| BucketError::NetworkError(format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self {
            client,
            endpoint_url: config.endpoint_url(),
            probe_url: config.probe_url(),
            probe_timeout: config.max_response_wait(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    fn build_headers(&self) -> BucketResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|_| BucketError::ConfigError("API Key 含有非法字符".to_string()))?;
            let name = HeaderName::from_bytes(constants::API_KEY_HEADER.as_bytes())
                .map_err(|e| BucketError::ConfigError(format!("无效的请求头名称: {}", e)))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl TranslationSource for HttpTranslationSource {
    async fn fetch(&self, request: &FetchRequest) -> BucketResult<FetchOutcome> {
        let response = self
            .client
            .post(&self.endpoint_url)
            .headers(self.build_headers()?)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => Default::default(),
        };

        match serde_json::from_slice::<FetchResponse>(&body) {
            Ok(parsed) => {
                if let Some(items) = &parsed.items {
                    if parsed.count != items.len() as i64 {
                        tracing::debug!(
                            "响应 count={} 与条目数 {} 不一致",
                            parsed.count,
                            items.len()
                        );
                    }
                }
                Ok(parsed.into_outcome(status.as_u16()))
            }
            Err(e) => Ok(FetchOutcome::Rejected {
                status: status.as_u16(),
                errors: vec![RemoteError {
                    code: i64::from(status.as_u16()),
                    message: format!("无法解析响应: {}", e),
                }],
            }),
        }
    }

    async fn probe(&self) -> bool {
        let result = self
            .client
            .get(&self.probe_url)
            .timeout(self.probe_timeout)
            .send()
            .await;

        match result {
            Ok(response) => {
                tracing::debug!("探测 {} 返回 {}", self.probe_url, response.status());
                response.status().is_success()
            }
            Err(e) => {
                tracing::debug!("探测 {} 失败: {}", self.probe_url, e);
                false
            }
        }
    }
}
