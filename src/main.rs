//! lingo-bucket 命令行入口
//!
//! `get` 和 `dump` 只读取本地缓存文件，不访问网络；
//! `refresh` 打开翻译桶并只执行一次刷新。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use lingo_bucket::bucket::config::constants;
use lingo_bucket::bucket::storage::{CachePersistence, FileSettings, SettingsStore, StoreSnapshot};
use lingo_bucket::bucket::{
    BucketConfig, BucketResult, ConfigManager, HttpTranslationSource, RefreshOutcome,
    TranslationBucket, TranslationSource,
};
use lingo_bucket::env::{core::LogLevel, generate_env_docs, EnvVar};

#[derive(Parser)]
#[command(name = "lingo-bucket")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "客户端翻译缓存：拉取、查看和清除本地翻译")]
struct Cli {
    /// 配置文件路径，缺省时按默认路径搜索
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 日志级别：trace, debug, info, warn, error
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 从远端拉取翻译并写入缓存
    Refresh {
        /// 忽略节流窗口
        #[arg(short, long)]
        force: bool,
    },
    /// 从缓存读取一条翻译
    Get {
        key: String,
        /// 语言，缺省为配置中的第一个语言
        #[arg(short, long)]
        locale: Option<String>,
    },
    /// 以 JSON 输出整个缓存
    Dump,
    /// 检查远端是否可达
    Probe,
    /// 删除本地缓存文件
    Clear,
    /// 输出可用环境变量的 Markdown 文档
    EnvDocs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: Option<&str>) {
    let level = level
        .map(str::to_string)
        .unwrap_or_else(|| LogLevel::get_or_default("info".to_string()));
    let level = level.parse().unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> BucketResult<BucketConfig> {
    let manager = match path {
        Some(path) => ConfigManager::from_file(path)?,
        None => ConfigManager::new()?,
    };
    Ok(manager.into_config())
}

async fn run(cli: Cli) -> BucketResult<ExitCode> {
    if let Commands::EnvDocs = cli.command {
        print!("{}", generate_env_docs());
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Refresh { force } => {
            let bucket = TranslationBucket::builder(config)
                .manual_refresh()
                .open()
                .await?;

            let outcome = bucket.refresh(force).await;
            let stats = bucket.store().stats();
            let code = match &outcome {
                RefreshOutcome::Updated { items } => {
                    println!("更新了 {} 个条目", items);
                    ExitCode::SUCCESS
                }
                RefreshOutcome::Throttled => {
                    println!("缓存仍在节流窗口内，未拉取（使用 --force 强制刷新）");
                    ExitCode::SUCCESS
                }
                RefreshOutcome::AlreadyRefreshing => ExitCode::SUCCESS,
                RefreshOutcome::Rejected { status, errors } => {
                    eprintln!("远端拒绝了请求: HTTP {} {:?}", status, errors);
                    ExitCode::FAILURE
                }
                RefreshOutcome::TimedOut => {
                    eprintln!("等待远端响应超时");
                    ExitCode::FAILURE
                }
                RefreshOutcome::Unreachable(reason) => {
                    eprintln!("无法连接远端: {}", reason);
                    ExitCode::FAILURE
                }
            };
            println!(
                "缓存: {} 个键, {} 条翻译",
                stats.total_keys, stats.total_translations
            );
            bucket.close()?;
            Ok(code)
        }
        Commands::Get { key, locale } => {
            let Some(locale) = locale.or_else(|| config.locales.first().cloned()) else {
                eprintln!("未指定语言，且配置中没有注册语言");
                return Ok(ExitCode::FAILURE);
            };
            let snapshot = read_cache(&config)?.unwrap_or_default();
            match snapshot.get(&key).and_then(|locales| locales.get(&locale)) {
                Some(text) => {
                    println!("{}", text);
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("缓存中没有 {} [{}]", key, locale);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Dump => {
            let snapshot = read_cache(&config)?.unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Probe => {
            let source = HttpTranslationSource::new(&config)?;
            if source.probe().await {
                println!("{} 可达", config.probe_url());
                Ok(ExitCode::SUCCESS)
            } else {
                println!("{} 不可达", config.probe_url());
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Clear => {
            match cache_file(&config)? {
                Some(persistence) if persistence.clear()? => {
                    println!("已删除 {}", persistence.path().display());
                }
                _ => println!("没有缓存文件"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::EnvDocs => Ok(ExitCode::SUCCESS),
    }
}

/// 定位缓存文件，不生成新的桶标识
fn cache_file(config: &BucketConfig) -> BucketResult<Option<CachePersistence>> {
    let cache_dir = config.cache_dir_path();
    let id = match &config.bucket_id {
        Some(id) => Some(id.clone()),
        None => {
            let settings_path = cache_dir.join(constants::SETTINGS_FILE_NAME);
            if settings_path.exists() {
                FileSettings::open(settings_path)?.get(&config.identity_key())
            } else {
                None
            }
        }
    };

    Ok(id.map(|id| CachePersistence::new(&cache_dir, &id, config.load_timeout())))
}

fn read_cache(config: &BucketConfig) -> BucketResult<Option<StoreSnapshot>> {
    match cache_file(config)? {
        Some(persistence) => persistence.load_blocking(),
        None => Ok(None),
    }
}
