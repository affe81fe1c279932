//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问，用于覆盖翻译桶配置

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    /// 只读取显式设置的值，忽略默认值
    fn get_set() -> Option<EnvResult<T>> {
        env::var(Self::NAME).ok().map(|value| Self::parse(&value))
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "LINGO_BUCKET_LOG_LEVEL";
        const DEFAULT: Option<String> = None;

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }
}

/// 翻译桶相关环境变量
pub mod bucket {
    use super::*;

    /// 桶名
    pub struct BucketName;
    impl EnvVar<String> for BucketName {
        const NAME: &'static str = "LINGO_BUCKET_NAME";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Bucket name used to keep buckets in one cache directory apart";

        fn parse(value: &str) -> EnvResult<String> {
            let name = non_empty(value, Self::NAME)?;
            if name.contains(|c: char| c == '/' || c == '\\') {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Bucket name cannot contain path separators".to_string(),
                });
            }
            Ok(name)
        }
    }

    /// 远端基础地址
    pub struct BaseUrl;
    impl EnvVar<String> for BaseUrl {
        const NAME: &'static str = "LINGO_BUCKET_BASE_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Base URL of the remote translation source";

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(url.to_string())
            } else {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Base URL must start with http:// or https://".to_string(),
                })
            }
        }
    }

    /// 增量拉取接口路径
    pub struct EndpointPath;
    impl EnvVar<String> for EndpointPath {
        const NAME: &'static str = "LINGO_BUCKET_ENDPOINT_PATH";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Path of the delta-fetch endpoint";

        fn parse(value: &str) -> EnvResult<String> {
            let path = value.trim();
            if path.starts_with('/') {
                Ok(path.to_string())
            } else {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Endpoint path must start with '/'".to_string(),
                })
            }
        }
    }

    /// 用户标识
    pub struct UserId;
    impl EnvVar<String> for UserId {
        const NAME: &'static str = "LINGO_BUCKET_USER_ID";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "User id sent with every fetch request";

        fn parse(value: &str) -> EnvResult<String> {
            Ok(value.trim().to_string())
        }
    }

    /// API Key
    pub struct ApiKey;
    impl EnvVar<String> for ApiKey {
        const NAME: &'static str = "LINGO_BUCKET_API_KEY";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Value of the API-Key request header";

        fn parse(value: &str) -> EnvResult<String> {
            non_empty(value, Self::NAME)
        }
    }

    /// 只读访问密码
    pub struct ReadPassword;
    impl EnvVar<String> for ReadPassword {
        const NAME: &'static str = "LINGO_BUCKET_READ_PASSWORD";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Read-access password sent with fetch requests";

        fn parse(value: &str) -> EnvResult<String> {
            non_empty(value, Self::NAME)
        }
    }

    /// 两次刷新之间的最小间隔
    pub struct MinRefreshInterval;
    impl EnvVar<Duration> for MinRefreshInterval {
        const NAME: &'static str = "LINGO_BUCKET_MIN_REFRESH_INTERVAL";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(120));
        const DESCRIPTION: &'static str = "Minimum seconds between two refreshes";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_bounded_u64(value, Self::NAME, 0, 86400 * 7).map(Duration::from_secs)
        }
    }

    /// 最长响应等待时间
    pub struct MaxResponseWait;
    impl EnvVar<Duration> for MaxResponseWait {
        const NAME: &'static str = "LINGO_BUCKET_MAX_RESPONSE_WAIT";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(4096));
        const DESCRIPTION: &'static str = "Maximum response wait in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_bounded_u64(value, Self::NAME, 1, 600_000).map(Duration::from_millis)
        }
    }

    /// 缓存目录
    pub struct CacheDir;
    impl EnvVar<String> for CacheDir {
        const NAME: &'static str = "LINGO_BUCKET_CACHE_DIR";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Directory holding cache and state files";

        fn parse(value: &str) -> EnvResult<String> {
            non_empty(value, Self::NAME)
        }
    }

    /// 是否通过外部设置存储保存刷新时间和语言索引
    pub struct ExternalState;
    impl EnvVar<bool> for ExternalState {
        const NAME: &'static str = "LINGO_BUCKET_EXTERNAL_STATE";
        const DEFAULT: Option<bool> = Some(true);
        const DESCRIPTION: &'static str =
            "Persist last-fetch time and active locale index in the settings store";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }
}

/// 辅助函数
fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!(
                "Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled",
                value
            ),
        }),
    }
}

fn parse_bounded_u64(value: &str, var_name: &str, min: u64, max: u64) -> EnvResult<u64> {
    let num: u64 = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

fn non_empty(value: &str, var_name: &str) -> EnvResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: "Value cannot be empty".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let mut docs = String::new();
    docs.push_str("# Environment Variables Documentation\n\n");
    docs.push_str("| Variable | Description | Default |\n");
    docs.push_str("|---|---|---|\n");

    let mut row = |name: &str, description: &str, default: String| {
        docs.push_str(&format!("| `{}` | {} | {} |\n", name, description, default));
    };

    row(core::LogLevel::NAME, core::LogLevel::DESCRIPTION, "info".to_string());
    row(bucket::BucketName::NAME, bucket::BucketName::DESCRIPTION, "default".to_string());
    row(bucket::BaseUrl::NAME, bucket::BaseUrl::DESCRIPTION, "-".to_string());
    row(bucket::EndpointPath::NAME, bucket::EndpointPath::DESCRIPTION, "-".to_string());
    row(bucket::UserId::NAME, bucket::UserId::DESCRIPTION, "-".to_string());
    row(bucket::ApiKey::NAME, bucket::ApiKey::DESCRIPTION, "-".to_string());
    row(bucket::ReadPassword::NAME, bucket::ReadPassword::DESCRIPTION, "-".to_string());
    row(
        bucket::MinRefreshInterval::NAME,
        bucket::MinRefreshInterval::DESCRIPTION,
        default_of(bucket::MinRefreshInterval::DEFAULT.map(|d| d.as_secs())),
    );
    row(
        bucket::MaxResponseWait::NAME,
        bucket::MaxResponseWait::DESCRIPTION,
        default_of(bucket::MaxResponseWait::DEFAULT.map(|d| d.as_millis())),
    );
    row(bucket::CacheDir::NAME, bucket::CacheDir::DESCRIPTION, "-".to_string());
    row(
        bucket::ExternalState::NAME,
        bucket::ExternalState::DESCRIPTION,
        default_of(bucket::ExternalState::DEFAULT),
    );

    docs
}

/// 文档中的默认值列使用与环境变量相同的写法
fn default_of<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
