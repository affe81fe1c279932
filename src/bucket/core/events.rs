//! 事件总线
//!
//! 基于 tokio 广播通道向订阅者发送三种通知。订阅即持有一个接收端，
//! 丢弃接收端即取消订阅。事件总是在对应的状态变更完成之后发出。

use tokio::sync::broadcast;

/// 翻译桶事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketEvent {
    /// 一次刷新成功完成，新数据已合并进存储
    Refreshed,
    /// 当前语言已切换
    LocaleChanged(String),
    /// 在限定时间内无法连接远端
    ConnectionFailed,
}

/// 事件总线
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BucketEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<BucketEvent> {
        self.sender.subscribe()
    }

    /// 发送事件，返回收到事件的订阅者数量
    pub fn emit(&self, event: BucketEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!("没有订阅者，丢弃事件 {:?}", event);
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
