//! 存储模块
//!
//! 提供内存翻译存储、缓存文件持久化和外部设置存储。

pub mod persistence;
pub mod settings;
pub mod store;

pub use persistence::CachePersistence;
pub use settings::{namespaced_key, FileSettings, MemorySettings, SettingsStore};
pub use store::{LocaleMap, StoreSnapshot, StoreStats, TranslationStore};

#[cfg(test)]
pub(crate) use settings::recording;
