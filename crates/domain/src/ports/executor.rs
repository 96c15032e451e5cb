use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use crate::entities::JobCredentials;

/// 关闭信号的只读视图
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    receiver: watch::Receiver<bool>,
}

impl CancellationSignal {
    pub fn new(receiver: watch::Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// 永远不会被触发的信号，用于手动执行
    pub fn never() -> Self {
        let (tx, receiver) = watch::channel(false);
        // 发送端丢弃后接收端仍可读取最后的值
        drop(tx);
        Self { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    pub async fn cancelled(&mut self) {
        while !*self.receiver.borrow() {
            if self.receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// 触发上下文
#[derive(Debug, Clone)]
pub struct FireContext {
    pub job_id: Uuid,
    pub credentials: JobCredentials,
    /// 实际触发时间
    pub fire_time: DateTime<Utc>,
    /// 计划触发时间，错过触发合并时可能早于实际触发时间
    pub scheduled_fire_time: DateTime<Utc>,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub cancel: CancellationSignal,
}

/// 触发器到期时调用的执行器
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, context: FireContext);
}
