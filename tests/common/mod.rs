// 集成测试公共模块
//
// 提供可编排的翻译源、临时缓存目录和等待辅助函数

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lingo_bucket::bucket::core::{ManualClock, TranslationBucket};
use lingo_bucket::bucket::network::{FetchOutcome, FetchRequest, TranslationItem, TranslationSource};
use lingo_bucket::bucket::{BucketConfig, BucketError, BucketResult, MemorySettings};

pub const START: i64 = 1_700_000_000;

/// 翻译源的一次响应
#[derive(Debug, Clone)]
pub enum Step {
    Respond(FetchOutcome),
    /// 永不返回
    Hang,
    Fail(String),
}

/// 按顺序返回预设响应的翻译源，响应用尽后重复最后一个
#[derive(Debug)]
pub struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<FetchRequest>>,
    reachable: bool,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            reachable: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_step(&self) -> Step {
        let mut last = self.last.lock().unwrap();
        match self.steps.lock().unwrap().pop_front() {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last.clone().unwrap_or(Step::Hang),
        }
    }
}

#[async_trait]
impl TranslationSource for ScriptedSource {
    async fn fetch(&self, request: &FetchRequest) -> BucketResult<FetchOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        match self.next_step() {
            Step::Respond(outcome) => Ok(outcome),
            Step::Hang => std::future::pending().await,
            Step::Fail(reason) => Err(BucketError::NetworkError(reason)),
        }
    }

    async fn probe(&self) -> bool {
        self.reachable
    }
}

pub fn entry(key: &str, translations: &[(&str, &str)]) -> TranslationItem {
    TranslationItem::new(key, translations.iter().copied())
}

pub fn updated(items: Vec<TranslationItem>) -> FetchOutcome {
    FetchOutcome::Updated(items)
}

pub fn greeting() -> FetchOutcome {
    updated(vec![entry("greeting", &[("en", "Hello"), ("de", "Hallo")])])
}

/// 临时缓存目录与测试配置
pub struct TestEnvironment {
    pub dir: tempfile::TempDir,
    pub settings: Arc<MemorySettings>,
    pub clock: Arc<ManualClock>,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
            settings: Arc::new(MemorySettings::new()),
            clock: Arc::new(ManualClock::new(START)),
        }
    }

    pub fn config(&self) -> BucketConfig {
        let mut config =
            BucketConfig::with_server("http://localhost:9", &["en", "de"], &["greeting"]);
        config.bucket_id = Some("test-bucket".to_string());
        config.cache_dir = self.dir.path().to_string_lossy().into_owned();
        config
    }

    /// 使用缓存目录下默认的设置文件打开
    pub async fn open_with_file_settings(
        &self,
        config: BucketConfig,
        source: Arc<ScriptedSource>,
    ) -> TranslationBucket {
        TranslationBucket::builder(config)
            .source(source)
            .clock(self.clock.clone())
            .open()
            .await
            .expect("Bucket should open")
    }

    pub async fn open(&self, config: BucketConfig, source: Arc<ScriptedSource>) -> TranslationBucket {
        TranslationBucket::builder(config)
            .source(source)
            .settings(self.settings.clone())
            .clock(self.clock.clone())
            .open()
            .await
            .expect("Bucket should open")
    }
}

/// 等待后台刷新结束
pub async fn wait_idle(bucket: &TranslationBucket) {
    for _ in 0..500 {
        tokio::task::yield_now().await;
        if !bucket.is_refreshing() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Refresh did not finish in time");
}

/// 等待翻译源被调用指定次数
pub async fn wait_calls(source: &ScriptedSource, expected: usize) {
    for _ in 0..500 {
        if source.calls() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("Source was not called {} times", expected);
}

/// 在指定路径创建命名管道，没有写端时读取会一直阻塞
#[cfg(unix)]
pub fn make_fifo(path: &std::path::Path) {
    let status = std::process::Command::new("mkfifo")
        .arg(path)
        .status()
        .expect("mkfifo should run");
    assert!(status.success());
}

/// 打开写端再关闭，让阻塞在管道上的读取结束
#[cfg(unix)]
pub fn release_fifo(path: &std::path::Path) {
    drop(
        std::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .expect("FIFO should open for writing"),
    );
}
