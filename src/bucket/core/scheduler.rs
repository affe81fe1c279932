//! 刷新调度器
//!
//! 负责节流窗口、单飞保证和超时看门狗，并协调远端拉取：
//!
//! 1. 已有刷新在进行时，新的请求直接跳过（单飞）；
//! 2. 非强制刷新时，若存储非空且距上次拉取不足最小间隔，跳过（节流）；
//! 3. 否则在发出请求前就记录本次拉取时间（乐观打点），再调用远端；
//! 4. 拉取结果在最长等待时间内未返回时放弃等待，丢弃拉取 future
//!    （连带取消底层 HTTP 请求），发出连接失败通知并回到空闲；
//! 5. 成功时合并进存储、写缓存文件、发出刷新完成通知；
//!    服务端拒绝时不合并，也不通知。
//!
//! `refreshing` 标记由 `RefreshGuard` 持有，守卫在任何路径上被丢弃
//! （完成、失败、超时、任务被中止）都会把标记复位。

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::bucket::core::clock::Clock;
use crate::bucket::core::events::{BucketEvent, EventBus};
use crate::bucket::core::keys::KeySet;
use crate::bucket::core::locale::LocaleSelector;
use crate::bucket::error::{BucketError, BucketResult};
use crate::bucket::network::{FetchOutcome, FetchRequest, RemoteError, TranslationSource};
use crate::bucket::storage::{CachePersistence, SettingsStore, TranslationStore};

// ============================================================================
// 核心类型
// ============================================================================

/// 刷新策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// 两次刷新之间的最小间隔
    pub min_interval: Duration,
    /// 等待远端响应的最长时间
    pub max_response_wait: Duration,
}

/// 请求凭据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: String,
    pub read_access_password: Option<String>,
}

/// `request_refresh` 的即时决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    /// 已在后台开始刷新
    Started,
    /// 距上次拉取太近
    Throttled,
    /// 已有刷新在进行
    AlreadyRefreshing,
}

/// 一次刷新的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Throttled,
    AlreadyRefreshing,
    /// 合并了 `items` 个条目
    Updated { items: usize },
    /// 服务端可达但拒绝了请求
    Rejected { status: u16, errors: Vec<RemoteError> },
    /// 超过最长等待时间
    TimedOut,
    /// 无法连接服务端
    Unreachable(String),
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Updated { .. })
    }
}

/// 外部保存上次成功拉取时间的位置
#[derive(Clone)]
pub struct FetchTimeSlot {
    settings: Arc<dyn SettingsStore>,
    key: String,
}

impl FetchTimeSlot {
    pub fn new(settings: Arc<dyn SettingsStore>, key: String) -> Self {
        Self { settings, key }
    }

    fn load(&self) -> Option<i64> {
        self.settings.get(&self.key)?.parse().ok()
    }

    /// 写入会阻塞时在阻塞线程池执行，刷新任务只等待结果
    async fn store(&self, timestamp: i64) {
        let value = timestamp.to_string();
        let result = if self.settings.blocks_on_write() {
            let settings = Arc::clone(&self.settings);
            let key = self.key.clone();
            tokio::task::spawn_blocking(move || settings.set(&key, &value))
                .await
                .map_err(BucketError::from)
                .and_then(|written| written)
        } else {
            self.settings.set(&self.key, &value)
        };

        if let Err(e) = result {
            tracing::warn!("保存拉取时间失败 {}: {}", self.key, e);
        }
    }
}

/// 构造调度器所需的组件
pub struct SchedulerParts {
    pub policy: RefreshPolicy,
    pub credentials: Credentials,
    pub clock: Arc<dyn Clock>,
    pub store: Arc<TranslationStore>,
    pub keys: Arc<KeySet>,
    pub locales: Arc<LocaleSelector>,
    pub source: Arc<dyn TranslationSource>,
    pub events: EventBus,
    pub persistence: Option<CachePersistence>,
    pub fetch_time: Option<FetchTimeSlot>,
}

/// 刷新调度器
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    policy: RefreshPolicy,
    credentials: Credentials,
    clock: Arc<dyn Clock>,
    store: Arc<TranslationStore>,
    keys: Arc<KeySet>,
    locales: Arc<LocaleSelector>,
    source: RwLock<Arc<dyn TranslationSource>>,
    events: EventBus,
    persistence: Option<CachePersistence>,
    fetch_time: Option<FetchTimeSlot>,
    runtime: Handle,

    // 刷新状态
    refreshing: AtomicBool,
    /// 每次开始刷新递增，用来区分后台任务
    generation: AtomicU64,
    /// 最近一次开始拉取的时间（乐观打点），用于节流
    last_fetch: Mutex<Option<i64>>,
    /// 最近一次成功拉取的开始时间，作为增量拉取的起点
    last_success: Mutex<Option<i64>>,
    /// 最新一次后台刷新的代号和中止句柄
    in_flight: Mutex<Option<(u64, AbortHandle)>>,
}

/// 持有期间 `refreshing` 为 true，丢弃时复位
struct RefreshGuard {
    inner: Arc<SchedulerInner>,
    started_at: i64,
    generation: u64,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        {
            let mut in_flight = lock(&self.inner.in_flight);
            if matches!(*in_flight, Some((generation, _)) if generation == self.generation) {
                *in_flight = None;
            }
        }
        self.inner.refreshing.store(false, Ordering::Release);
    }
}

// ============================================================================
// 实现
// ============================================================================

impl RefreshScheduler {
    /// 创建调度器，必须在 tokio 运行时内调用
    pub fn new(parts: SchedulerParts) -> BucketResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| BucketError::RuntimeError(format!("需要在 tokio 运行时内创建: {}", e)))?;

        let restored = parts.fetch_time.as_ref().and_then(FetchTimeSlot::load);
        if let Some(ts) = restored {
            tracing::debug!("恢复上次成功拉取时间: {}", ts);
        }

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                policy: parts.policy,
                credentials: parts.credentials,
                clock: parts.clock,
                store: parts.store,
                keys: parts.keys,
                locales: parts.locales,
                source: RwLock::new(parts.source),
                events: parts.events,
                persistence: parts.persistence,
                fetch_time: parts.fetch_time,
                runtime,
                refreshing: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                last_fetch: Mutex::new(restored),
                last_success: Mutex::new(restored),
                in_flight: Mutex::new(None),
            }),
        })
    }

    /// 请求一次后台刷新，立即返回决定；可重复调用，不会叠加刷新
    pub fn request_refresh(&self, force: bool) -> RefreshDecision {
        let guard = match self.inner.begin(force) {
            Ok(guard) => guard,
            Err(decision) => return decision,
        };

        let generation = guard.generation;
        let inner = Arc::clone(&self.inner);
        let task = self.inner.runtime.spawn(async move {
            inner.run(guard).await;
        });
        self.inner.track(generation, task.abort_handle());
        RefreshDecision::Started
    }

    /// 执行一次刷新并等待结果，节流与单飞规则与 `request_refresh` 相同
    pub async fn refresh(&self, force: bool) -> RefreshOutcome {
        match self.inner.begin(force) {
            Ok(guard) => Arc::clone(&self.inner).run(guard).await,
            Err(RefreshDecision::Throttled) => RefreshOutcome::Throttled,
            Err(_) => RefreshOutcome::AlreadyRefreshing,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.refreshing.load(Ordering::Acquire)
    }

    /// 最近一次开始拉取的时间
    pub fn last_fetch_utc(&self) -> Option<i64> {
        *lock(&self.inner.last_fetch)
    }

    /// 最近一次成功拉取的时间
    pub fn last_success_utc(&self) -> Option<i64> {
        *lock(&self.inner.last_success)
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.inner.policy
    }

    /// 替换远端翻译源，之后的刷新使用新源
    pub fn set_source(&self, source: Arc<dyn TranslationSource>) {
        *self
            .inner
            .source
            .write()
            .unwrap_or_else(|p| p.into_inner()) = source;
    }

    /// 远端可达性探测，与刷新流程无关
    pub async fn probe(&self) -> bool {
        let source = self.inner.current_source();
        match tokio::time::timeout(self.inner.policy.max_response_wait, source.probe()).await {
            Ok(reachable) => reachable,
            Err(_) => false,
        }
    }

    /// 中止后台进行中的刷新，刷新状态随之复位
    pub fn abort_in_flight(&self) {
        let in_flight = lock(&self.inner.in_flight).take();
        if let Some((_, handle)) = in_flight {
            handle.abort();
        }
    }
}

impl fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("policy", &self.inner.policy)
            .field("refreshing", &self.is_refreshing())
            .field("last_fetch", &self.last_fetch_utc())
            .finish()
    }
}

impl SchedulerInner {
    /// 判断能否开始刷新；可以时返回持有 `refreshing` 标记的守卫
    fn begin(self: &Arc<Self>, force: bool) -> Result<RefreshGuard, RefreshDecision> {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("已有刷新在进行，跳过");
            return Err(RefreshDecision::AlreadyRefreshing);
        }

        let now = self.clock.now_unix();
        let guard = RefreshGuard {
            inner: Arc::clone(self),
            started_at: now,
            generation: self.generation.fetch_add(1, Ordering::AcqRel) + 1,
        };

        let mut last_fetch = lock(&self.last_fetch);
        if !force && !self.store.is_empty() {
            if let Some(last) = *last_fetch {
                let elapsed = now.saturating_sub(last);
                if elapsed < self.policy.min_interval.as_secs() as i64 {
                    tracing::debug!(
                        "距上次拉取仅 {}s（最小间隔 {}s），跳过",
                        elapsed,
                        self.policy.min_interval.as_secs()
                    );
                    drop(last_fetch);
                    drop(guard);
                    return Err(RefreshDecision::Throttled);
                }
            }
        }

        *last_fetch = Some(now);
        Ok(guard)
    }

    /// 记录后台任务的中止句柄
    ///
    /// 任务可能在句柄登记前就已结束并让位给更新的刷新，
    /// 只有代号更新的句柄才能替换已登记的句柄。
    fn track(&self, generation: u64, handle: AbortHandle) {
        let mut in_flight = lock(&self.in_flight);
        let superseded = matches!(*in_flight, Some((current, _)) if current > generation);
        if !superseded {
            *in_flight = Some((generation, handle));
        }
    }

    fn current_source(&self) -> Arc<dyn TranslationSource> {
        Arc::clone(&self.source.read().unwrap_or_else(|p| p.into_inner()))
    }

    fn build_request(&self) -> FetchRequest {
        // 存储为空时做全量拉取
        let last_fetch_utc = if self.store.is_empty() {
            None
        } else {
            *lock(&self.last_success)
        };

        FetchRequest {
            user_id: self.credentials.user_id.clone(),
            read_access_password: self.credentials.read_access_password.clone(),
            last_fetch_utc,
            keys: self.keys.list(),
            locales: self.locales.list(),
        }
    }

    async fn run(self: Arc<Self>, guard: RefreshGuard) -> RefreshOutcome {
        let request = self.build_request();
        let source = self.current_source();
        tracing::info!(
            "开始刷新: {} 个键, {} 种语言, 增量起点 {:?}",
            request.keys.len(),
            request.locales.len(),
            request.last_fetch_utc
        );

        let wait = self.policy.max_response_wait;
        let result = tokio::time::timeout(wait, source.fetch(&request)).await;

        match result {
            Err(_) => {
                drop(guard);
                tracing::warn!("超过 {}ms 未收到响应，放弃本次刷新", wait.as_millis());
                self.events.emit(BucketEvent::ConnectionFailed);
                RefreshOutcome::TimedOut
            }
            Ok(Err(e)) => {
                drop(guard);
                tracing::warn!(
                    "无法连接远端 ({:?}, 可重试: {}): {}",
                    e.category(),
                    e.is_retryable(),
                    e
                );
                self.events.emit(BucketEvent::ConnectionFailed);
                RefreshOutcome::Unreachable(e.to_string())
            }
            Ok(Ok(FetchOutcome::Rejected { status, errors })) => {
                drop(guard);
                tracing::warn!("远端拒绝了刷新请求: 状态 {}, 错误 {:?}", status, errors);
                RefreshOutcome::Rejected { status, errors }
            }
            Ok(Ok(FetchOutcome::Updated(items))) => {
                let count = items.len();
                for item in items {
                    self.store.merge(&item.key, item.translations);
                }
                self.record_success(guard.started_at).await;

                if let Some(persistence) = &self.persistence {
                    if let Err(e) = persistence.save(self.store.snapshot()).await {
                        tracing::warn!("保存缓存文件失败: {}", e);
                    }
                }

                drop(guard);
                tracing::info!("刷新完成: 合并 {} 个条目", count);
                self.events.emit(BucketEvent::Refreshed);
                RefreshOutcome::Updated { items: count }
            }
        }
    }

    async fn record_success(&self, started_at: i64) {
        *lock(&self.last_success) = Some(started_at);
        if let Some(slot) = &self.fetch_time {
            slot.store(started_at).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}
