//! 网络模块
//!
//! - `types` - 增量拉取协议的请求与响应类型
//! - `source` - 远端翻译源接口及其 HTTP 实现

pub mod source;
pub mod types;

pub use source::{HttpTranslationSource, TranslationSource};
pub use types::{FetchOutcome, FetchRequest, FetchResponse, RemoteError, TranslationItem};
