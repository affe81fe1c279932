//! 核心模块
//!
//! - `bucket` - 翻译桶门面与构建器
//! - `scheduler` - 节流、单飞与超时控制
//! - `locale` - 语言列表与当前语言
//! - `keys` - 需要拉取的翻译键集合
//! - `events` - 事件总线
//! - `clock` - 时间源

pub mod bucket;
pub mod clock;
pub mod events;
pub mod keys;
pub mod locale;
pub mod scheduler;

pub use bucket::{BucketBuilder, TranslationBucket};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{BucketEvent, EventBus};
pub use keys::KeySet;
pub use locale::{IndexSlot, LocaleSelector};
pub use scheduler::{
    Credentials, FetchTimeSlot, RefreshDecision, RefreshOutcome, RefreshPolicy, RefreshScheduler,
    SchedulerParts,
};
