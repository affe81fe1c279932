//! # 翻译桶
//!
//! 客户端翻译缓存：在本地保存并持久化 键 → 语言 → 文本 的映射，
//! 定期与远端翻译源增量同步，调用方读取翻译时从不等待网络。
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use lingo_bucket::bucket::{BucketConfig, TranslationBucket};
//!
//! # async fn demo() -> lingo_bucket::bucket::BucketResult<()> {
//! let config = BucketConfig::with_server("https://i18n.example.com", &["en", "de"], &["greeting"]);
//! let bucket = TranslationBucket::open(config).await?;
//!
//! let mut events = bucket.subscribe();
//! if let Ok(event) = events.recv().await {
//!     println!("{:?}: {:?}", event, bucket.translate("greeting"));
//! }
//! bucket.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;

pub use config::{BucketConfig, ConfigManager};
pub use core::{
    BucketBuilder, BucketEvent, Clock, RefreshDecision, RefreshOutcome, SystemClock,
    TranslationBucket,
};
pub use error::{BucketError, BucketResult, ErrorCategory};
pub use network::{HttpTranslationSource, TranslationSource};
pub use storage::{CachePersistence, FileSettings, MemorySettings, SettingsStore, TranslationStore};
