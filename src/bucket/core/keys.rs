//! 翻译键集合
//!
//! 桶负责拉取的有序键列表，决定请求内容。存储中的键不必是它的子集。

use std::sync::RwLock;

/// 有序、无重复的翻译键集合
#[derive(Debug, Default)]
pub struct KeySet {
    keys: RwLock<Vec<String>>,
}

impl KeySet {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = Self::default();
        for key in keys {
            let key: String = key.into();
            set.register(&key);
        }
        set
    }

    /// 添加翻译键，空键或重复键返回 false
    pub fn register(&self, key: &str) -> bool {
        if key.trim().is_empty() {
            return false;
        }
        let mut keys = self.keys.write().unwrap_or_else(|p| p.into_inner());
        if keys.iter().any(|k| k == key) {
            return false;
        }
        keys.push(key.to_string());
        true
    }

    /// 移除翻译键，返回是否确实移除
    pub fn unregister(&self, key: &str) -> bool {
        let mut keys = self.keys.write().unwrap_or_else(|p| p.into_inner());
        let before = keys.len();
        keys.retain(|k| k != key);
        keys.len() != before
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .any(|k| k == key)
    }

    pub fn list(&self) -> Vec<String> {
        self.keys.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
