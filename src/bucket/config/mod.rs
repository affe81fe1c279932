//! 翻译桶配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::{BucketConfig, ConfigManager};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 远端接口
    pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
    pub const DEFAULT_ENDPOINT_PATH: &str = "/api/translations/fetch";
    pub const DEFAULT_PROBE_PATH: &str = "/api/public-key";
    pub const API_KEY_HEADER: &str = "API-Key";

    // 刷新节流与超时
    pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(120);
    pub const DEFAULT_MAX_RESPONSE_WAIT: Duration = Duration::from_millis(4096);
    pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(2);

    // 本地文件
    pub const DEFAULT_BUCKET_NAME: &str = "default";
    pub const DEFAULT_CACHE_DIR: &str = "~/.cache/lingo-bucket";
    pub const CACHE_FILE_EXTENSION: &str = "cache";
    pub const SETTINGS_FILE_NAME: &str = "settings.json";
    pub const ZSTD_LEVEL: i32 = 3;

    // 外部设置键
    pub const IDENTITY_SETTINGS_KEY: &str = "lingo_bucket.identity";
    pub const LAST_FETCH_SETTING: &str = "last_fetch_utc";
    pub const LOCALE_INDEX_SETTING: &str = "locale_index";

    // 事件广播通道容量
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "lingo-bucket.toml",
        ".lingo-bucket.toml",
        "lingo-bucket.json",
        "~/.config/lingo-bucket/config.toml",
        "/etc/lingo-bucket/config.toml",
    ];
}

/// 便利函数
pub fn config_file_exists() -> bool {
    constants::CONFIG_PATHS
        .iter()
        .any(|path| std::path::Path::new(shellexpand::tilde(path).as_ref()).exists())
}

/// 加载配置，失败时回退到默认配置
pub fn load_bucket_config() -> BucketConfig {
    match ConfigManager::new() {
        Ok(manager) => manager.into_config(),
        Err(e) => {
            tracing::warn!("配置加载失败，使用默认配置: {}", e);
            BucketConfig::default()
        }
    }
}
