//! HTTP 翻译源集成测试
//!
//! 使用本地 axum 服务模拟远端翻译服务

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use lingo_bucket::bucket::network::{
    FetchOutcome, FetchRequest, HttpTranslationSource, TranslationSource,
};
use lingo_bucket::bucket::{BucketConfig, MemorySettings, RefreshOutcome, TranslationBucket};

#[derive(Clone)]
struct MockState {
    status: StatusCode,
    body: Value,
    probe_status: StatusCode,
    seen: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn handle_fetch(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let api_key = headers
        .get("api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.seen.lock().unwrap().push((api_key, body));
    (state.status, Json(state.body.clone()))
}

async fn handle_probe(State(state): State<MockState>) -> (StatusCode, &'static str) {
    (state.probe_status, "-----BEGIN PUBLIC KEY-----")
}

/// 启动模拟服务，返回基础地址和请求记录
async fn spawn_server(
    status: StatusCode,
    body: Value,
    probe_status: StatusCode,
) -> (String, Arc<Mutex<Vec<(Option<String>, Value)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        status,
        body,
        probe_status,
        seen: seen.clone(),
    };
    let app = Router::new()
        .route("/api/translations/fetch", post(handle_fetch))
        .route("/api/public-key", get(handle_probe))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock server");
    let addr = listener.local_addr().expect("Mock server address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{}", addr), seen)
}

fn request() -> FetchRequest {
    FetchRequest {
        user_id: "u1".to_string(),
        read_access_password: Some("pw".to_string()),
        last_fetch_utc: Some(1_700_000_000),
        keys: vec!["greeting".to_string()],
        locales: vec!["en".to_string(), "de".to_string()],
    }
}

#[tokio::test]
async fn test_fetch_success_sends_protocol_fields() {
    let body = json!({
        "type": "translations",
        "count": 1,
        "items": [{"key": "greeting", "translations": {"en": "Hello", "de": "Hallo"}}]
    });
    let (base_url, seen) = spawn_server(StatusCode::OK, body, StatusCode::OK).await;

    let mut config = BucketConfig::with_server(&base_url, &["en", "de"], &["greeting"]);
    config.api_key = Some("secret".to_string());
    let source = HttpTranslationSource::new(&config).unwrap();

    match source.fetch(&request()).await.unwrap() {
        FetchOutcome::Updated(items) => {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].key, "greeting");
            assert_eq!(items[0].translations["de"], "Hallo");
        }
        other => panic!("Unexpected outcome: {:?}", other),
    }

    let seen = seen.lock().unwrap();
    let (api_key, body) = &seen[0];
    assert_eq!(api_key.as_deref(), Some("secret"));
    assert_eq!(
        body,
        &json!({
            "userId": "u1",
            "readAccessPassword": "pw",
            "lastFetchUTC": 1_700_000_000,
            "keys": ["greeting"],
            "locales": ["en", "de"]
        })
    );

    println!("✅ HTTP 拉取成功测试通过");
}

#[tokio::test]
async fn test_failure_status_is_rejection() {
    let body = json!({"count": 0, "errors": [{"code": 500, "message": "boom"}]});
    let (base_url, seen) = spawn_server(StatusCode::INTERNAL_SERVER_ERROR, body, StatusCode::OK).await;

    let config = BucketConfig::with_server(&base_url, &["en"], &["greeting"]);
    let source = HttpTranslationSource::new(&config).unwrap();

    match source.fetch(&request()).await.unwrap() {
        FetchOutcome::Rejected { status, errors } => {
            assert_eq!(status, 500);
            assert_eq!(errors[0].message, "boom");
        }
        other => panic!("Unexpected outcome: {:?}", other),
    }
    // 未配置 API Key 时不带该请求头
    assert_eq!(seen.lock().unwrap()[0].0, None);

    println!("✅ HTTP 失败状态测试通过");
}

#[tokio::test]
async fn test_unparseable_body_is_rejection() {
    let (base_url, _) = spawn_server(StatusCode::OK, json!("not an envelope"), StatusCode::OK).await;
    let config = BucketConfig::with_server(&base_url, &["en"], &["greeting"]);
    let source = HttpTranslationSource::new(&config).unwrap();

    assert!(matches!(
        source.fetch(&request()).await.unwrap(),
        FetchOutcome::Rejected { status: 200, .. }
    ));

    println!("✅ 无法解析响应测试通过");
}

#[tokio::test]
async fn test_unreachable_server_is_error() {
    // 绑定后立即释放，得到一个没有服务监听的端口
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = BucketConfig::with_server(&format!("http://{}", addr), &["en"], &["greeting"]);
    let source = HttpTranslationSource::new(&config).unwrap();

    assert!(source.fetch(&request()).await.is_err());
    assert!(!source.probe().await);

    println!("✅ 无法连接测试通过");
}

#[tokio::test]
async fn test_probe_uses_status_only() {
    let (up, _) = spawn_server(StatusCode::OK, json!({}), StatusCode::OK).await;
    let (down, _) = spawn_server(StatusCode::OK, json!({}), StatusCode::SERVICE_UNAVAILABLE).await;

    let up = HttpTranslationSource::new(&BucketConfig::with_server(&up, &["en"], &[])).unwrap();
    let down = HttpTranslationSource::new(&BucketConfig::with_server(&down, &["en"], &[])).unwrap();

    assert!(up.probe().await);
    assert!(!down.probe().await);

    println!("✅ 可达性探测测试通过");
}

/// 默认组件打开翻译桶，经 HTTP 拉取并写入缓存文件
#[tokio::test]
async fn test_bucket_over_http() {
    let body = json!({
        "count": 1,
        "items": [{"key": "greeting", "translations": {"en": "Hello"}}]
    });
    let (base_url, seen) = spawn_server(StatusCode::OK, body, StatusCode::OK).await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = BucketConfig::with_server(&base_url, &["en"], &["greeting"]);
    config.cache_dir = dir.path().to_string_lossy().into_owned();
    config.refresh_on_open = false;
    config.user_id = "u1".to_string();

    let bucket = TranslationBucket::builder(config)
        .settings(Arc::new(MemorySettings::new()))
        .open()
        .await
        .unwrap();
    while bucket.is_refreshing() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(bucket.translate("greeting").as_deref(), Some("Hello"));
    assert!(bucket.cache_path().exists());
    assert!(bucket.probe().await);
    assert_eq!(bucket.refresh(false).await, RefreshOutcome::Throttled);
    assert_eq!(seen.lock().unwrap().len(), 1);

    println!("✅ 翻译桶 HTTP 集成测试通过");
}
