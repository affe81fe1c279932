//! 翻译存储持久化
//!
//! 每个桶一个缓存文件，文件名即桶标识。文件内容是整个存储的 JSON 表示，
//! 经 zstd 压缩后写入。文件没有版本头，格式变化时需要手动清除缓存。

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::bucket::config::constants;
use crate::bucket::error::{BucketError, BucketResult};
use crate::bucket::storage::store::StoreSnapshot;

/// 缓存文件持久化
#[derive(Debug, Clone)]
pub struct CachePersistence {
    path: PathBuf,
    load_timeout: Duration,
    /// 同一文件的写入串行执行
    write_lock: Arc<Mutex<()>>,
}

impl CachePersistence {
    /// 创建指向 `<cache_dir>/<bucket_id>.cache` 的持久化层
    pub fn new<P: AsRef<Path>>(cache_dir: P, bucket_id: &str, load_timeout: Duration) -> Self {
        let path = cache_dir
            .as_ref()
            .join(format!("{}.{}", bucket_id, constants::CACHE_FILE_EXTENSION));
        Self {
            path,
            load_timeout,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// 在后台线程保存快照，覆盖该桶之前的缓存文件
    pub async fn save(&self, snapshot: StoreSnapshot) -> BucketResult<()> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.save_blocking(&snapshot)).await?
    }

    /// 同步保存快照，用于关闭时的刷盘
    pub fn save_blocking(&self, snapshot: &StoreSnapshot) -> BucketResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let body = serde_json::to_vec(snapshot)?;
        let tmp = self
            .path
            .with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));

        let written = (|| -> BucketResult<()> {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            zstd::stream::copy_encode(body.as_slice(), &mut writer, constants::ZSTD_LEVEL)?;
            writer.flush()?;
            std::fs::rename(&tmp, &self.path)?;
            Ok(())
        })();

        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.with_context(self.path.display()));
        }

        tracing::debug!(
            "已保存缓存文件 {} ({} 个键, {} 字节未压缩)",
            self.path.display(),
            snapshot.len(),
            body.len()
        );
        Ok(())
    }

    /// 在限定时间内加载缓存文件
    ///
    /// 文件不存在时返回 `Ok(None)`。超过加载时限时返回超时错误，
    /// 已读取的部分数据被丢弃，由调用方回退到网络刷新。
    pub async fn load(&self) -> BucketResult<Option<StoreSnapshot>> {
        if !self.exists() {
            return Ok(None);
        }

        let this = self.clone();
        let task = tokio::task::spawn_blocking(move || this.load_blocking());
        let joined = tokio::time::timeout(self.load_timeout, task)
            .await
            .map_err(|e| {
                BucketError::from(e).with_context(format!(
                    "{} 超过 {}ms",
                    self.path.display(),
                    self.load_timeout.as_millis()
                ))
            })?;
        joined?
    }

    /// 同步加载缓存文件，不受时限约束
    pub fn load_blocking(&self) -> BucketResult<Option<StoreSnapshot>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let decoder = zstd::Decoder::new(BufReader::new(file))?;
        let snapshot: StoreSnapshot = serde_json::from_reader(decoder).map_err(|e| {
            BucketError::PersistenceError(format!(
                "缓存文件已损坏 {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(snapshot))
    }

    /// 删除缓存文件，返回文件此前是否存在
    pub fn clear(&self) -> BucketResult<bool> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
