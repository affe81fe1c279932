//! 外部设置存储
//!
//! 保存少量标量状态（上次拉取时间、当前语言索引、桶标识）的键值能力。
//! 翻译桶在构造时注入该能力，不依赖具体平台的偏好设置接口。

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use dashmap::DashMap;

use crate::bucket::error::{BucketError, BucketResult};

/// 键值设置存储
pub trait SettingsStore: Send + Sync {
    /// 读取设置
    fn get(&self, key: &str) -> Option<String>;

    /// 写入设置
    fn set(&self, key: &str, value: &str) -> BucketResult<()>;

    /// 删除设置
    fn remove(&self, key: &str) -> BucketResult<()>;

    /// 写入是否会阻塞调用线程（文件、系统偏好设置等）
    ///
    /// 为 true 时，运行在 tokio 运行时内的写入会被移到阻塞线程池。
    fn blocks_on_write(&self) -> bool {
        true
    }
}

/// 生成带命名空间的设置键
pub fn namespaced_key(namespace: &str, name: &str) -> String {
    format!("{}.{}", namespace, name)
}

/// 内存设置存储
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: DashMap<String, String>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: &str) -> BucketResult<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> BucketResult<()> {
        self.values.remove(key);
        Ok(())
    }

    fn blocks_on_write(&self) -> bool {
        false
    }
}

/// 基于 JSON 文件的设置存储
///
/// 每次写入都会重新读取文件、应用修改后重写整个文件（先写临时文件再重命名），
/// 因此共用同一文件的多个实例不会互相抹掉对方的键。
pub struct FileSettings {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

/// 进程内按路径共享的设置实例
static SHARED: OnceLock<DashMap<PathBuf, Weak<FileSettings>>> = OnceLock::new();

impl fmt::Debug for FileSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSettings").field("path", &self.path).finish()
    }
}

impl FileSettings {
    /// 打开设置文件，文件不存在时从空设置开始
    pub fn open<P: AsRef<Path>>(path: P) -> BucketResult<Self> {
        let path = path.as_ref().to_path_buf();
        let values = read_values(&path)?;
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// 获取进程内共享的设置实例
    ///
    /// 同一路径只要还有存活的实例就复用它，写入在进程内串行。
    pub fn shared<P: AsRef<Path>>(path: P) -> BucketResult<Arc<Self>> {
        let path = path.as_ref().to_path_buf();
        let registry = SHARED.get_or_init(DashMap::new);
        let mut slot = registry.entry(path.clone()).or_default();
        if let Some(existing) = slot.upgrade() {
            return Ok(existing);
        }
        let settings = Arc::new(Self::open(&path)?);
        *slot = Arc::downgrade(&settings);
        Ok(settings)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> BucketResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(values)?;
        let tmp = self.path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
        std::fs::write(&tmp, body)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                let _ = std::fs::remove_file(&tmp);
                BucketError::SettingsError(format!(
                    "写入设置文件失败 {}: {}",
                    self.path.display(),
                    e
                ))
            })
    }

    fn update<F>(&self, change: F) -> BucketResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut values = self
            .values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // 以磁盘上的最新内容为底，保留其他实例写入的键
        let mut latest = read_values(&self.path)?;
        change(&mut latest);
        self.flush(&latest)?;
        *values = latest;
        Ok(())
    }
}

/// 读取设置文件；文件不存在或已损坏时返回空设置
fn read_values(path: &Path) -> BucketResult<BTreeMap<String, String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => {
            return Err(BucketError::SettingsError(format!(
                "读取设置文件失败 {}: {}",
                path.display(),
                e
            )))
        }
    };
    match serde_json::from_str(&content) {
        Ok(values) => Ok(values),
        Err(e) => {
            tracing::warn!("设置文件已损坏，忽略其内容 {}: {}", path.display(), e);
            Ok(BTreeMap::new())
        }
    }
}

impl SettingsStore for FileSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> BucketResult<()> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> BucketResult<()> {
        self.update(|values| {
            values.remove(key);
        })
    }
}

/// 记录写入线程的设置存储，供测试检查写入是否离开了调用线程
#[cfg(test)]
pub(crate) mod recording {
    use std::thread::ThreadId;

    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingSettings {
        inner: MemorySettings,
        writers: Mutex<Vec<ThreadId>>,
    }

    impl RecordingSettings {
        pub(crate) fn writers(&self) -> Vec<ThreadId> {
            self.writers
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .clone()
        }

        fn record(&self) {
            self.writers
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(std::thread::current().id());
        }
    }

    impl SettingsStore for RecordingSettings {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> BucketResult<()> {
            self.record();
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> BucketResult<()> {
            self.record();
            self.inner.remove(key)
        }
    }
}
