//! # Lingo Bucket
//!
//! 客户端翻译缓存库，把远端维护的翻译保存在本地并在后台增量刷新。
//!
//! ## 模块组织
//!
//! - `bucket` - 翻译桶：存储、持久化、远端拉取和刷新调度
//! - `env` - 环境变量定义与文档生成

pub mod bucket;
pub mod env;

// Re-export commonly used items for convenience
pub use bucket::{
    BucketConfig, BucketError, BucketEvent, BucketResult, RefreshOutcome, TranslationBucket,
};
