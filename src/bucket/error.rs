//! 翻译桶统一错误处理
//!
//! 提供结构化错误类型和错误分类。刷新流程本身不向调用方抛出错误，
//! 这里的错误只出现在构造、配置加载和显式持久化调用中。

use std::fmt;

use thiserror::Error;

/// 翻译桶错误类型
#[derive(Error, Debug, Clone)]
pub enum BucketError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 网络错误
    #[error("网络错误: {0}")]
    NetworkError(String),

    /// 超时错误
    #[error("操作超时: {0}")]
    TimeoutError(String),

    /// 持久化错误
    #[error("持久化错误: {0}")]
    PersistenceError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 外部设置存储错误
    #[error("设置存储错误: {0}")]
    SettingsError(String),

    /// 运行时错误（缺少 tokio 运行时、后台任务异常等）
    #[error("运行时错误: {0}")]
    RuntimeError(String),
}

impl BucketError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            BucketError::NetworkError(_) => true,
            BucketError::TimeoutError(_) => true,
            BucketError::PersistenceError(_) => true,
            BucketError::SettingsError(_) => true,
            BucketError::ConfigError(_) => false,
            BucketError::SerializationError(_) => false,
            BucketError::RuntimeError(_) => false,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            BucketError::ConfigError(_) => ErrorCategory::Configuration,
            BucketError::NetworkError(_) => ErrorCategory::Network,
            BucketError::TimeoutError(_) => ErrorCategory::Timeout,
            BucketError::PersistenceError(_) => ErrorCategory::Storage,
            BucketError::SerializationError(_) => ErrorCategory::Serialization,
            BucketError::SettingsError(_) => ErrorCategory::Storage,
            BucketError::RuntimeError(_) => ErrorCategory::Internal,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let new_msg = match &self {
            BucketError::ConfigError(msg)
            | BucketError::NetworkError(msg)
            | BucketError::TimeoutError(msg)
            | BucketError::PersistenceError(msg)
            | BucketError::SerializationError(msg)
            | BucketError::SettingsError(msg)
            | BucketError::RuntimeError(msg) => format!("{} (上下文: {})", msg, context),
        };

        match &mut self {
            BucketError::ConfigError(msg)
            | BucketError::NetworkError(msg)
            | BucketError::TimeoutError(msg)
            | BucketError::PersistenceError(msg)
            | BucketError::SerializationError(msg)
            | BucketError::SettingsError(msg)
            | BucketError::RuntimeError(msg) => *msg = new_msg,
        }

        self
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Timeout,
    Storage,
    Serialization,
    Internal,
}

/// 标准错误转换
impl From<std::io::Error> for BucketError {
    fn from(error: std::io::Error) -> Self {
        BucketError::PersistenceError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for BucketError {
    fn from(error: serde_json::Error) -> Self {
        BucketError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for BucketError {
    fn from(error: toml::de::Error) -> Self {
        BucketError::ConfigError(format!("TOML解析错误: {}", error))
    }
}

impl From<url::ParseError> for BucketError {
    fn from(error: url::ParseError) -> Self {
        BucketError::ConfigError(format!("URL解析错误: {}", error))
    }
}

impl From<reqwest::Error> for BucketError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            BucketError::TimeoutError(format!("HTTP请求超时: {}", error))
        } else if error.is_decode() {
            BucketError::SerializationError(format!("响应解析失败: {}", error))
        } else {
            BucketError::NetworkError(format!("HTTP请求失败: {}", error))
        }
    }
}

impl From<tokio::time::error::Elapsed> for BucketError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        BucketError::TimeoutError(format!("异步操作超时: {}", error))
    }
}

impl From<tokio::task::JoinError> for BucketError {
    fn from(error: tokio::task::JoinError) -> Self {
        BucketError::RuntimeError(format!("后台任务失败: {}", error))
    }
}

/// 错误结果类型别名
pub type BucketResult<T> = Result<T, BucketError>;
