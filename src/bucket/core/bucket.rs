//! 翻译桶
//!
//! `TranslationBucket` 把存储、持久化、远端源、调度器和语言选择器组装成
//! 一个独立的缓存单元。读取只访问内存存储，从不等待网络。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::bucket::config::{constants, BucketConfig};
use crate::bucket::core::clock::{Clock, SystemClock};
use crate::bucket::core::events::{BucketEvent, EventBus};
use crate::bucket::core::keys::KeySet;
use crate::bucket::core::locale::{IndexSlot, LocaleSelector};
use crate::bucket::core::scheduler::{
    Credentials, FetchTimeSlot, RefreshDecision, RefreshOutcome, RefreshPolicy, RefreshScheduler,
    SchedulerParts,
};
use crate::bucket::error::BucketResult;
use crate::bucket::network::{HttpTranslationSource, TranslationSource};
use crate::bucket::storage::{
    namespaced_key, CachePersistence, FileSettings, SettingsStore, TranslationStore,
};

// ============================================================================
// 构建器
// ============================================================================

/// 翻译桶构建器
///
/// 未指定的组件使用默认实现：HTTP 翻译源、缓存目录下的 JSON 设置文件、系统时钟。
pub struct BucketBuilder {
    config: BucketConfig,
    source: Option<Arc<dyn TranslationSource>>,
    settings: Option<Arc<dyn SettingsStore>>,
    clock: Option<Arc<dyn Clock>>,
    auto_refresh: bool,
}

impl BucketBuilder {
    pub fn source(mut self, source: Arc<dyn TranslationSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 打开时不发起任何后台刷新，由调用方显式调用 `refresh`
    pub fn manual_refresh(mut self) -> Self {
        self.auto_refresh = false;
        self
    }

    /// 打开翻译桶
    ///
    /// 先在限定时间内从缓存文件恢复；没有缓存或恢复失败时立即请求网络刷新
    /// （`manual_refresh` 时除外）。必须在 tokio 运行时内调用。
    pub async fn open(self) -> BucketResult<TranslationBucket> {
        let config = self.config;
        config.validate()?;

        let cache_dir = config.cache_dir_path();
        let settings: Arc<dyn SettingsStore> = match self.settings {
            Some(settings) => settings,
            None => FileSettings::shared(cache_dir.join(constants::SETTINGS_FILE_NAME))?,
        };

        let id = resolve_identity(&config, settings.as_ref())?;
        tracing::debug!("翻译桶标识: {}", id);

        let source: Arc<dyn TranslationSource> = match self.source {
            Some(source) => source,
            None => Arc::new(HttpTranslationSource::new(&config)?),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let (index_slot, fetch_time) = if config.use_external_state {
            (
                Some(IndexSlot::new(
                    Arc::clone(&settings),
                    namespaced_key(&id, constants::LOCALE_INDEX_SETTING),
                )),
                Some(FetchTimeSlot::new(
                    Arc::clone(&settings),
                    namespaced_key(&id, constants::LAST_FETCH_SETTING),
                )),
            )
        } else {
            (None, None)
        };

        let events = EventBus::new(constants::EVENT_CHANNEL_CAPACITY);
        let store = Arc::new(TranslationStore::new());
        let keys = Arc::new(KeySet::new(config.keys.iter().cloned()));
        let locales = Arc::new(LocaleSelector::new(
            config.locales.clone(),
            events.clone(),
            index_slot,
        ));
        let persistence = CachePersistence::new(&cache_dir, &id, config.load_timeout());

        let scheduler = RefreshScheduler::new(SchedulerParts {
            policy: RefreshPolicy {
                min_interval: config.min_refresh_interval(),
                max_response_wait: config.max_response_wait(),
            },
            credentials: Credentials {
                user_id: config.user_id.clone(),
                read_access_password: config.read_access_password.clone(),
            },
            clock,
            store: Arc::clone(&store),
            keys: Arc::clone(&keys),
            locales: Arc::clone(&locales),
            source,
            events: events.clone(),
            persistence: Some(persistence.clone()),
            fetch_time,
        })?;

        let bucket = TranslationBucket {
            id,
            store,
            keys,
            locales,
            events,
            scheduler,
            persistence,
            closed: AtomicBool::new(false),
        };
        bucket
            .restore(self.auto_refresh, config.refresh_on_open)
            .await;
        Ok(bucket)
    }
}

/// 标识优先级：配置 > 设置存储 > 新生成（并写回设置存储）
///
/// 生成的标识按桶名保存，同一设置存储中的不同桶各有自己的标识。
fn resolve_identity(config: &BucketConfig, settings: &dyn SettingsStore) -> BucketResult<String> {
    if let Some(id) = &config.bucket_id {
        return Ok(id.clone());
    }
    let key = config.identity_key();
    if let Some(id) = settings.get(&key) {
        if !id.trim().is_empty() {
            return Ok(id);
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    settings.set(&key, &id)?;
    tracing::info!("生成新的翻译桶标识: {} ({})", id, config.bucket_name);
    Ok(id)
}

// ============================================================================
// 翻译桶
// ============================================================================

/// 翻译桶
///
/// 丢弃时中止进行中的刷新，并尽力把存储同步写回缓存文件。
pub struct TranslationBucket {
    id: String,
    store: Arc<TranslationStore>,
    keys: Arc<KeySet>,
    locales: Arc<LocaleSelector>,
    events: EventBus,
    scheduler: RefreshScheduler,
    persistence: CachePersistence,
    closed: AtomicBool,
}

impl TranslationBucket {
    pub fn builder(config: BucketConfig) -> BucketBuilder {
        BucketBuilder {
            config,
            source: None,
            settings: None,
            clock: None,
            auto_refresh: true,
        }
    }

    /// 使用默认组件打开翻译桶
    pub async fn open(config: BucketConfig) -> BucketResult<Self> {
        Self::builder(config).open().await
    }

    async fn restore(&self, auto_refresh: bool, refresh_on_open: bool) {
        let wants_refresh = match self.persistence.load().await {
            Ok(Some(snapshot)) => {
                self.store.replace(snapshot);
                let stats = self.store.stats();
                tracing::info!(
                    "从缓存恢复 {} 个键, {} 条翻译",
                    stats.total_keys,
                    stats.total_translations
                );
                refresh_on_open
            }
            Ok(None) => {
                tracing::info!("没有缓存文件，从远端拉取");
                true
            }
            Err(e) => {
                tracing::warn!(
                    "恢复缓存失败 ({:?})，改为从远端拉取: {}",
                    e.category(),
                    e
                );
                true
            }
        };

        if wants_refresh && auto_refresh {
            self.scheduler.request_refresh(false);
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    // 读取

    /// 按当前语言读取翻译
    pub fn translate(&self, key: &str) -> Option<String> {
        let locale = self.locales.active()?;
        self.store.get(key, &locale)
    }

    /// 按指定语言读取翻译
    pub fn translate_in(&self, key: &str, locale: &str) -> Option<String> {
        self.store.get(key, locale)
    }

    pub fn store(&self) -> &TranslationStore {
        &self.store
    }

    // 刷新

    pub fn request_refresh(&self, force: bool) -> RefreshDecision {
        self.scheduler.request_refresh(force)
    }

    pub async fn refresh(&self, force: bool) -> RefreshOutcome {
        self.scheduler.refresh(force).await
    }

    pub fn is_refreshing(&self) -> bool {
        self.scheduler.is_refreshing()
    }

    pub fn last_fetch_utc(&self) -> Option<i64> {
        self.scheduler.last_fetch_utc()
    }

    pub fn last_success_utc(&self) -> Option<i64> {
        self.scheduler.last_success_utc()
    }

    /// 检查远端是否可达
    pub async fn probe(&self) -> bool {
        self.scheduler.probe().await
    }

    /// 更换远端翻译源并强制刷新
    pub fn set_source(&self, source: Arc<dyn TranslationSource>) -> RefreshDecision {
        self.scheduler.set_source(source);
        self.scheduler.request_refresh(true)
    }

    // 语言

    pub fn register_locale(&self, locale: &str) -> bool {
        self.locales.register(locale)
    }

    pub fn unregister_locale(&self, locale: &str) -> bool {
        self.locales.unregister(locale)
    }

    pub fn set_active_locale(&self, locale: &str) -> bool {
        self.locales.set_active(locale)
    }

    pub fn active_locale(&self) -> Option<String> {
        self.locales.active()
    }

    pub fn locales(&self) -> Vec<String> {
        self.locales.list()
    }

    // 键

    pub fn register_key(&self, key: &str) -> bool {
        self.keys.register(key)
    }

    pub fn unregister_key(&self, key: &str) -> bool {
        self.keys.unregister(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.list()
    }

    /// 订阅刷新、语言切换和连接失败通知
    pub fn subscribe(&self) -> broadcast::Receiver<BucketEvent> {
        self.events.subscribe()
    }

    // 持久化

    /// 立即把当前存储写入缓存文件
    pub async fn save(&self) -> BucketResult<()> {
        self.persistence.save(self.store.snapshot()).await
    }

    pub fn cache_path(&self) -> &std::path::Path {
        self.persistence.path()
    }

    /// 关闭翻译桶：中止进行中的刷新并同步写回缓存文件
    pub fn close(self) -> BucketResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.scheduler.abort_in_flight();
        if self.store.is_empty() {
            return Ok(());
        }
        self.persistence.save_blocking(&self.store.snapshot())
    }
}

impl std::fmt::Debug for TranslationBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationBucket")
            .field("id", &self.id)
            .field("keys", &self.keys.len())
            .field("locales", &self.locales)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl Drop for TranslationBucket {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.scheduler.abort_in_flight();
        if self.store.is_empty() {
            return;
        }
        if let Err(e) = self.persistence.save_blocking(&self.store.snapshot()) {
            tracing::error!("关闭时写回缓存失败 {}: {}", self.id, e);
        }
    }
}
