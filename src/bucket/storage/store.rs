//! 翻译存储
//!
//! 以"键 → 语言 → 文本"组织的并发安全嵌套映射。前台读取与后台合并可以
//! 同时进行：每个键的条目由 DashMap 分片锁保护，合并在单个条目内完成，
//! 读取不会看到写了一半的条目，也不需要锁住整个存储。

use std::collections::{BTreeMap, HashMap};

use dashmap::DashMap;

// ============================================================================
// 核心类型
// ============================================================================

/// 单个翻译键的语言映射
pub type LocaleMap = HashMap<String, String>;

/// 存储的时间点快照，键和语言均有序，便于稳定序列化
pub type StoreSnapshot = BTreeMap<String, BTreeMap<String, String>>;

/// 存储统计信息
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub total_keys: usize,
    pub total_translations: usize,
}

/// 翻译存储
#[derive(Debug, Default)]
pub struct TranslationStore {
    entries: DashMap<String, LocaleMap>,
}

// ============================================================================
// 实现
// ============================================================================

impl TranslationStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 从快照创建存储
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        store.replace(snapshot);
        store
    }

    /// 读取缓存的翻译；键或该键下的语言不存在时返回 `None`
    pub fn get(&self, key: &str, locale: &str) -> Option<String> {
        self.entries
            .get(key)
            .and_then(|entry| entry.value().get(locale).cloned())
    }

    /// 合并一个键的翻译
    ///
    /// 新键插入完整映射；已有键只覆盖给出的语言，其它已缓存的语言保持不变。
    pub fn merge<I, L, T>(&self, key: &str, translations: I)
    where
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        let mut entry = self.entries.entry(key.to_string()).or_default();
        for (locale, text) in translations {
            entry.insert(locale.into(), text.into());
        }
    }

    /// 用快照整体替换存储内容，仅用于从持久化恢复
    pub fn replace(&self, snapshot: StoreSnapshot) {
        self.entries.clear();
        for (key, locales) in snapshot {
            self.entries.insert(key, locales.into_iter().collect());
        }
    }

    /// 生成用于持久化的快照，逐条目复制，不阻塞其它读取
    pub fn snapshot(&self) -> StoreSnapshot {
        self.entries
            .iter()
            .map(|entry| {
                let locales = entry
                    .value()
                    .iter()
                    .map(|(l, t)| (l.clone(), t.clone()))
                    .collect();
                (entry.key().clone(), locales)
            })
            .collect()
    }

    /// 检查是否包含指定键
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// 某个键已翻译的语言
    pub fn locales_of(&self, key: &str) -> Vec<String> {
        let mut locales: Vec<String> = self
            .entries
            .get(key)
            .map(|entry| entry.value().keys().cloned().collect())
            .unwrap_or_default();
        locales.sort();
        locales
    }

    /// 获取所有缓存键
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 获取统计信息
    pub fn stats(&self) -> StoreStats {
        let total_translations = self.entries.iter().map(|e| e.value().len()).sum();
        StoreStats {
            total_keys: self.entries.len(),
            total_translations,
        }
    }

    /// 清空存储
    pub fn clear(&self) {
        self.entries.clear();
    }
}
