//! 语言选择器
//!
//! 管理已注册语言列表和当前语言索引，与网络状态无关。切换语言只改变
//! 读取存储的哪一个语言切片，不会触发刷新。
//!
//! 移除语言时的索引策略：
//! - 移除当前语言之前的语言，索引前移，当前语言保持不变；
//! - 移除当前语言，回退到剩余列表的第一个语言并发出切换通知；
//! - 移除最后一个语言，清空选择。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::runtime::Handle;

use crate::bucket::core::events::{BucketEvent, EventBus};
use crate::bucket::storage::SettingsStore;

/// 外部保存当前语言索引的位置
///
/// 设置存储的写入会阻塞时，在 tokio 运行时内把写入交给阻塞线程池，
/// 切换语言的调用方不等待磁盘。每次写入带递增序号，晚到的旧值不会
/// 覆盖已经写入的新值。
#[derive(Clone)]
pub struct IndexSlot {
    settings: Arc<dyn SettingsStore>,
    key: String,
    sequence: Arc<AtomicU64>,
    /// 最近一次写入的序号，持有期间写入串行执行
    written: Arc<Mutex<u64>>,
}

impl IndexSlot {
    pub fn new(settings: Arc<dyn SettingsStore>, key: String) -> Self {
        Self {
            settings,
            key,
            sequence: Arc::new(AtomicU64::new(0)),
            written: Arc::new(Mutex::new(0)),
        }
    }

    fn load(&self) -> Option<usize> {
        self.settings.get(&self.key)?.parse().ok()
    }

    fn store(&self, index: Option<usize>) {
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        match Handle::try_current() {
            Ok(runtime) if self.settings.blocks_on_write() => {
                let slot = self.clone();
                runtime.spawn_blocking(move || slot.write(sequence, index));
            }
            _ => self.write(sequence, index),
        }
    }

    fn write(&self, sequence: u64, index: Option<usize>) {
        let mut written = self.written.lock().unwrap_or_else(|p| p.into_inner());
        if *written > sequence {
            return;
        }
        *written = sequence;

        let result = match index {
            Some(index) => self.settings.set(&self.key, &index.to_string()),
            None => self.settings.remove(&self.key),
        };
        if let Err(e) = result {
            tracing::warn!("保存语言索引失败 {}: {}", self.key, e);
        }
    }
}

#[derive(Debug, Default)]
struct LocaleState {
    locales: Vec<String>,
    /// 列表非空时总是有效索引
    active: Option<usize>,
}

impl LocaleState {
    fn active_locale(&self) -> Option<String> {
        self.active.and_then(|i| self.locales.get(i)).cloned()
    }
}

/// 语言选择器
pub struct LocaleSelector {
    state: RwLock<LocaleState>,
    events: EventBus,
    slot: Option<IndexSlot>,
}

impl std::fmt::Debug for LocaleSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        f.debug_struct("LocaleSelector")
            .field("locales", &state.locales)
            .field("active", &state.active)
            .finish()
    }
}

impl LocaleSelector {
    /// 创建语言选择器，重复语言被忽略；有外部索引且有效时恢复它
    pub fn new(locales: Vec<String>, events: EventBus, slot: Option<IndexSlot>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(locales.len());
        for locale in locales {
            if !locale.trim().is_empty() && !unique.contains(&locale) {
                unique.push(locale);
            }
        }

        let restored = slot
            .as_ref()
            .and_then(IndexSlot::load)
            .filter(|&i| i < unique.len());
        let active = match restored {
            Some(index) => Some(index),
            None if unique.is_empty() => None,
            None => Some(0),
        };

        Self {
            state: RwLock::new(LocaleState {
                locales: unique,
                active,
            }),
            events,
            slot,
        }
    }

    /// 注册语言，已存在或为空时返回 false
    pub fn register(&self, locale: &str) -> bool {
        if locale.trim().is_empty() {
            return false;
        }

        let became_active = {
            let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
            if state.locales.iter().any(|l| l == locale) {
                return false;
            }
            state.locales.push(locale.to_string());
            if state.active.is_none() {
                state.active = Some(0);
                true
            } else {
                false
            }
        };

        if became_active {
            self.persist(Some(0));
            self.events
                .emit(BucketEvent::LocaleChanged(locale.to_string()));
        }
        true
    }

    /// 移除语言，返回是否确实移除
    pub fn unregister(&self, locale: &str) -> bool {
        let (new_index, changed_to) = {
            let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
            let Some(position) = state.locales.iter().position(|l| l == locale) else {
                return false;
            };
            state.locales.remove(position);

            match state.active {
                Some(active) if position < active => {
                    state.active = Some(active - 1);
                    (state.active, None)
                }
                Some(active) if position == active => {
                    state.active = if state.locales.is_empty() { None } else { Some(0) };
                    (state.active, state.active_locale())
                }
                // 移除的是当前语言之后的语言，索引不变
                _ => return true,
            }
        };

        self.persist(new_index);
        if let Some(locale) = changed_to {
            tracing::info!("当前语言被移除，回退到 {}", locale);
            self.events.emit(BucketEvent::LocaleChanged(locale));
        }
        true
    }

    /// 切换当前语言；语言未注册时返回 false，状态不变且不发通知
    pub fn set_active(&self, locale: &str) -> bool {
        let index = {
            let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
            let Some(index) = state.locales.iter().position(|l| l == locale) else {
                tracing::debug!("拒绝切换到未注册的语言 {}", locale);
                return false;
            };
            state.active = Some(index);
            index
        };

        self.persist(Some(index));
        tracing::info!("当前语言切换为 {}", locale);
        self.events
            .emit(BucketEvent::LocaleChanged(locale.to_string()));
        true
    }

    pub fn active(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .active_locale()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.state.read().unwrap_or_else(|p| p.into_inner()).active
    }

    /// 已注册语言的只读副本
    pub fn list(&self) -> Vec<String> {
        self.state
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .locales
            .clone()
    }

    pub fn contains(&self, locale: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .locales
            .iter()
            .any(|l| l == locale)
    }

    fn persist(&self, index: Option<usize>) {
        if let Some(slot) = &self.slot {
            slot.store(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::storage::recording::RecordingSettings;
    use crate::bucket::storage::MemorySettings;
    use tokio::sync::broadcast::error::TryRecvError;

    fn selector(locales: &[&str]) -> (LocaleSelector, EventBus) {
        let bus = EventBus::new(16);
        let locales = locales.iter().map(|l| l.to_string()).collect();
        (LocaleSelector::new(locales, bus.clone(), None), bus)
    }

    #[test]
    fn test_first_locale_active_by_default() {
        let (selector, _) = selector(&["en", "de"]);
        assert_eq!(selector.active().as_deref(), Some("en"));
        assert_eq!(selector.list(), vec!["en", "de"]);
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let (selector, _) = selector(&["en"]);
        assert!(!selector.register("en"));
        assert!(selector.register("de"));
        assert_eq!(selector.list(), vec!["en", "de"]);
    }

    #[test]
    fn test_set_active_unregistered_locale() {
        let (selector, bus) = selector(&["en", "de"]);
        let mut events = bus.subscribe();

        assert!(!selector.set_active("fr"));
        assert_eq!(selector.active().as_deref(), Some("en"));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_set_active_emits_after_change() {
        let (selector, bus) = selector(&["en", "de"]);
        let mut events = bus.subscribe();

        assert!(selector.set_active("de"));
        assert_eq!(selector.active_index(), Some(1));
        assert_eq!(
            events.try_recv().unwrap(),
            BucketEvent::LocaleChanged("de".to_string())
        );
    }

    #[test]
    fn test_unregister_before_active_keeps_selection() {
        let (selector, bus) = selector(&["en", "de", "fr"]);
        selector.set_active("fr");
        let mut events = bus.subscribe();

        assert!(selector.unregister("en"));
        assert_eq!(selector.active().as_deref(), Some("fr"));
        assert_eq!(selector.active_index(), Some(1));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_unregister_active_falls_back_to_first() {
        let (selector, bus) = selector(&["en", "de", "fr"]);
        selector.set_active("de");
        let mut events = bus.subscribe();

        assert!(selector.unregister("de"));
        assert_eq!(selector.active().as_deref(), Some("en"));
        assert_eq!(
            events.try_recv().unwrap(),
            BucketEvent::LocaleChanged("en".to_string())
        );
    }

    #[test]
    fn test_unregister_last_locale_clears_selection() {
        let (selector, _) = selector(&["en"]);
        assert!(selector.unregister("en"));
        assert!(!selector.unregister("en"));
        assert_eq!(selector.active(), None);
        assert_eq!(selector.active_index(), None);

        // 重新注册后再次有当前语言
        assert!(selector.register("de"));
        assert_eq!(selector.active().as_deref(), Some("de"));
    }

    #[test]
    fn test_index_persisted_and_restored() {
        let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettings::new());
        let slot = IndexSlot::new(Arc::clone(&settings), "b.locale_index".to_string());
        let locales = vec!["en".to_string(), "de".to_string()];

        let first = LocaleSelector::new(locales.clone(), EventBus::new(4), Some(slot.clone()));
        first.set_active("de");
        assert_eq!(settings.get("b.locale_index").as_deref(), Some("1"));

        let second = LocaleSelector::new(locales, EventBus::new(4), Some(slot));
        assert_eq!(second.active().as_deref(), Some("de"));
    }

    #[test]
    fn test_out_of_range_persisted_index_ignored() {
        let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettings::new());
        settings.set("b.locale_index", "7").unwrap();
        let slot = IndexSlot::new(settings, "b.locale_index".to_string());

        let selector = LocaleSelector::new(vec!["en".to_string()], EventBus::new(4), Some(slot));
        assert_eq!(selector.active_index(), Some(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_index_writes_leave_caller_thread() {
        let settings = Arc::new(RecordingSettings::default());
        let slot = IndexSlot::new(settings.clone(), "b.locale_index".to_string());
        let locales = vec!["en".to_string(), "de".to_string(), "fr".to_string()];
        let selector = LocaleSelector::new(locales, EventBus::new(16), Some(slot));

        let caller = std::thread::current().id();
        for locale in ["de", "fr", "en", "fr"] {
            assert!(selector.set_active(locale));
        }

        for _ in 0..200 {
            if settings.get("b.locale_index").as_deref() == Some("2") && !settings.writers().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        // 等其余写入落定，旧值不能覆盖最后一次切换
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(settings.get("b.locale_index").as_deref(), Some("2"));
        let writers = settings.writers();
        assert!(!writers.is_empty());
        assert!(writers.iter().all(|id| *id != caller));
    }
}
