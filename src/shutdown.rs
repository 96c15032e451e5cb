use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info};

use broker_domain::CancellationSignal;

/// 关闭原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "SIGINT"),
            ShutdownReason::Terminate => write!(f, "SIGTERM"),
            ShutdownReason::Requested => write!(f, "手动请求"),
        }
    }
}

/// 优雅关闭管理器
///
/// 订阅方拿到的是与作业周期相同的 [`CancellationSignal`]，关闭只会生效一次，
/// 之后订阅的接收端立即处于已取消状态。
#[derive(Clone)]
pub struct ShutdownManager {
    tx: Arc<watch::Sender<bool>>,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            reason: Arc::new(OnceLock::new()),
        }
    }

    pub fn subscribe(&self) -> CancellationSignal {
        CancellationSignal::new(self.tx.subscribe())
    }

    /// 触发关闭，返回本次调用是否真正触发
    pub fn shutdown(&self, reason: ShutdownReason) -> bool {
        if self.reason.set(reason).is_err() {
            debug!("关闭已经触发过，忽略 {}", reason);
            return false;
        }

        info!("触发系统关闭: {}，订阅者 {} 个", reason, self.tx.receiver_count());
        self.tx.send_replace(true);
        true
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    pub async fn wait_for_shutdown(&self) {
        self.subscribe().cancelled().await;
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 等待操作系统的关闭信号。某个信号处理器安装失败时只等待另一路。
pub async fn wait_for_os_signal() -> ShutdownReason {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => ShutdownReason::Interrupt,
        _ = terminate => ShutdownReason::Terminate,
    }
}
