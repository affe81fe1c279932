//! 简化的配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::constants;
use crate::bucket::error::{BucketError, BucketResult};

/// 翻译桶配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BucketConfig {
    // 身份
    /// 桶名：同一缓存目录下区分多个翻译桶，生成的标识按桶名保存
    pub bucket_name: String,
    pub bucket_id: Option<String>,

    // 远端接口
    pub base_url: String,
    pub endpoint_path: String,
    pub probe_path: String,

    // 刷新策略
    pub min_refresh_interval_secs: u64,
    pub max_response_wait_ms: u64,
    pub persistence_load_timeout_ms: u64,
    pub refresh_on_open: bool,

    // 请求内容
    pub locales: Vec<String>,
    pub keys: Vec<String>,

    // 凭据
    pub user_id: String,
    pub api_key: Option<String>,
    pub read_access_password: Option<String>,

    // 本地存储
    pub cache_dir: String,
    pub use_external_state: bool,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            bucket_name: constants::DEFAULT_BUCKET_NAME.to_string(),
            bucket_id: None,

            base_url: constants::DEFAULT_BASE_URL.to_string(),
            endpoint_path: constants::DEFAULT_ENDPOINT_PATH.to_string(),
            probe_path: constants::DEFAULT_PROBE_PATH.to_string(),

            min_refresh_interval_secs: constants::DEFAULT_MIN_REFRESH_INTERVAL.as_secs(),
            max_response_wait_ms: constants::DEFAULT_MAX_RESPONSE_WAIT.as_millis() as u64,
            persistence_load_timeout_ms: constants::DEFAULT_LOAD_TIMEOUT.as_millis() as u64,
            refresh_on_open: true,

            locales: Vec::new(),
            keys: Vec::new(),

            user_id: String::new(),
            api_key: None,
            read_access_password: None,

            cache_dir: constants::DEFAULT_CACHE_DIR.to_string(),
            use_external_state: true,
        }
    }
}

impl BucketConfig {
    /// 创建指向指定服务器的配置
    pub fn with_server(base_url: &str, locales: &[&str], keys: &[&str]) -> Self {
        Self {
            base_url: base_url.to_string(),
            locales: locales.iter().map(|l| l.to_string()).collect(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            ..Self::default()
        }
    }

    /// 验证配置
    pub fn validate(&self) -> BucketResult<()> {
        let url = Url::parse(&self.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(BucketError::ConfigError(format!(
                "不支持的协议: {}",
                url.scheme()
            )));
        }

        if !self.endpoint_path.starts_with('/') || !self.probe_path.starts_with('/') {
            return Err(BucketError::ConfigError("接口路径必须以 '/' 开头".to_string()));
        }

        if self.max_response_wait_ms == 0 {
            return Err(BucketError::ConfigError("最长响应等待时间不能为0".to_string()));
        }

        if self.persistence_load_timeout_ms == 0 {
            return Err(BucketError::ConfigError("缓存加载超时不能为0".to_string()));
        }

        let mut seen = HashSet::new();
        for locale in &self.locales {
            if locale.trim().is_empty() {
                return Err(BucketError::ConfigError("语言标识不能为空".to_string()));
            }
            if !seen.insert(locale.as_str()) {
                return Err(BucketError::ConfigError(format!("重复的语言标识: {}", locale)));
            }
        }

        if self.keys.iter().any(|k| k.trim().is_empty()) {
            return Err(BucketError::ConfigError("翻译键不能为空".to_string()));
        }

        if !is_valid_name(&self.bucket_name) {
            return Err(BucketError::ConfigError(format!(
                "无效的桶名: {:?}",
                self.bucket_name
            )));
        }

        if let Some(id) = &self.bucket_id {
            if !is_valid_name(id) {
                return Err(BucketError::ConfigError(format!("无效的桶标识: {:?}", id)));
            }
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{bucket, EnvResult, EnvVar};

        fn take<T>(value: Option<EnvResult<T>>) -> Option<T> {
            match value? {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("忽略无效的环境变量: {}", e);
                    None
                }
            }
        }

        if let Some(name) = take(bucket::BucketName::get_set()) {
            self.bucket_name = name;
        }

        if let Some(base_url) = take(bucket::BaseUrl::get_set()) {
            self.base_url = base_url;
            tracing::info!("环境变量覆盖 base URL: {}", self.base_url);
        }

        if let Some(path) = take(bucket::EndpointPath::get_set()) {
            self.endpoint_path = path;
        }

        if let Some(user_id) = take(bucket::UserId::get_set()) {
            self.user_id = user_id;
        }

        if let Some(api_key) = take(bucket::ApiKey::get_set()) {
            self.api_key = Some(api_key);
        }

        if let Some(password) = take(bucket::ReadPassword::get_set()) {
            self.read_access_password = Some(password);
        }

        if let Some(interval) = take(bucket::MinRefreshInterval::get_set()) {
            self.min_refresh_interval_secs = interval.as_secs();
        }

        if let Some(wait) = take(bucket::MaxResponseWait::get_set()) {
            self.max_response_wait_ms = wait.as_millis() as u64;
        }

        if let Some(dir) = take(bucket::CacheDir::get_set()) {
            self.cache_dir = dir;
        }

        if let Some(external) = take(bucket::ExternalState::get_set()) {
            self.use_external_state = external;
        }
    }

    /// 转换为Duration类型
    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_interval_secs)
    }

    pub fn max_response_wait(&self) -> Duration {
        Duration::from_millis(self.max_response_wait_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.persistence_load_timeout_ms)
    }

    /// 该桶生成标识在设置存储中的键
    pub fn identity_key(&self) -> String {
        crate::bucket::storage::namespaced_key(constants::IDENTITY_SETTINGS_KEY, &self.bucket_name)
    }

    /// 展开 `~` 后的缓存目录
    pub fn cache_dir_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.cache_dir).as_ref())
    }

    /// 增量拉取接口的完整地址
    pub fn endpoint_url(&self) -> String {
        join_url(&self.base_url, &self.endpoint_path)
    }

    /// 可达性探测接口的完整地址
    pub fn probe_url(&self) -> String {
        join_url(&self.base_url, &self.probe_path)
    }
}

/// 桶名和标识会出现在文件名中
fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains(|c: char| c == '/' || c == '\\')
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// 简化的配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    config: BucketConfig,
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new() -> BucketResult<Self> {
        let mut config = Self::load_config()?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 从指定文件创建配置管理器
    pub fn from_file<P: AsRef<Path>>(path: P) -> BucketResult<Self> {
        let mut config = Self::load_from_file(path.as_ref())?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &BucketConfig {
        &self.config
    }

    /// 取出配置
    pub fn into_config(self) -> BucketConfig {
        self.config
    }

    /// 从默认搜索路径加载配置
    fn load_config() -> BucketResult<BucketConfig> {
        Self::load_dotenv();

        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            let candidate = Path::new(expanded_path.as_ref());
            if candidate.exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(candidate);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(BucketConfig::default())
    }

    /// 从指定文件加载配置
    fn load_from_file(path: &Path) -> BucketResult<BucketConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BucketError::ConfigError(format!("读取配置文件失败 {}: {}", path.display(), e))
        })?;

        if path.extension().is_some_and(|ext| ext == "toml") {
            Ok(toml::from_str(&content)?)
        } else {
            serde_json::from_str(&content)
                .map_err(|e| BucketError::ConfigError(format!("解析JSON配置失败: {}", e)))
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        match dotenv::dotenv() {
            Ok(path) => tracing::debug!("已加载环境文件: {}", path.display()),
            Err(_) => tracing::trace!("未找到 .env 文件"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = BucketConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_refresh_interval(), Duration::from_secs(120));
        assert_eq!(config.max_response_wait(), Duration::from_millis(4096));
        assert_eq!(config.load_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_duplicate_locales_rejected() {
        let config = BucketConfig::with_server("http://localhost:1", &["en", "de", "en"], &[]);
        assert!(matches!(config.validate(), Err(BucketError::ConfigError(_))));
    }

    #[test]
    fn test_invalid_urls_rejected() {
        let mut config = BucketConfig::default();
        config.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_wait_rejected() {
        let mut config = BucketConfig::default();
        config.max_response_wait_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_url_joining() {
        let config = BucketConfig::with_server("https://i18n.example.com/", &[], &[]);
        assert_eq!(
            config.endpoint_url(),
            "https://i18n.example.com/api/translations/fetch"
        );
        assert_eq!(config.probe_url(), "https://i18n.example.com/api/public-key");
    }

    #[test]
    fn test_load_partial_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
base_url = "https://i18n.example.com"
locales = ["en", "de"]
keys = ["greeting"]
min_refresh_interval_secs = 30
"#
        )
        .unwrap();

        let config = ConfigManager::load_from_file(file.path()).unwrap();
        assert_eq!(config.base_url, "https://i18n.example.com");
        assert_eq!(config.locales, vec!["en", "de"]);
        assert_eq!(config.min_refresh_interval_secs, 30);
        // 未给出的字段使用默认值
        assert_eq!(config.max_response_wait_ms, 4096);
        assert!(config.use_external_state);
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"base_url": "http://localhost:9000", "api_key": "secret"}}"#
        )
        .unwrap();

        let config = ConfigManager::load_from_file(file.path()).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "locales = [\"en\"").unwrap();

        let err = ConfigManager::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, BucketError::ConfigError(ref msg) if msg.contains("TOML")));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_bucket_name_validation() {
        let mut config = BucketConfig::default();
        assert_eq!(config.identity_key(), "lingo_bucket.identity.default");

        config.bucket_name = "menu".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(config.identity_key(), "lingo_bucket.identity.menu");

        config.bucket_name = "a/b".to_string();
        assert!(config.validate().is_err());
        config.bucket_name = " ".to_string();
        assert!(config.validate().is_err());
    }
}
