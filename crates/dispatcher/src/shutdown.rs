//! 协作式关闭信号
//!
//! `ShutdownCoordinator` 包装一个 `CancellationToken`，显式传给每个长生命周期的循环。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shutdown coordinator
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    signaled: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发出关闭信号
    ///
    /// 只有第一次调用返回 `true`。
    pub fn signal(&self) -> bool {
        let first = !self.signaled.swap(true, Ordering::SeqCst);
        self.token.cancel();
        first
    }

    pub fn is_signaled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待关闭信号
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// 为子组件派生 token (父级取消时子级也取消)
    pub fn child(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// 可取消的睡眠
    ///
    /// 睡满返回 `true`，被关闭信号打断返回 `false`。
    pub async fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_signaled();
        }
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// 将 Ctrl-C / SIGTERM 映射到 `signal()`
    pub fn listen_for_os_signals(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = coordinator.cancelled() => {}
                name = wait_for_os_signal() => {
                    if coordinator.signal() {
                        info!(signal = name, "shutdown requested");
                    }
                }
            }
        })
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        },
        Err(e) => {
            warn!(error = %e, "cannot install SIGTERM handler, listening for Ctrl-C only");
            ctrl_c_only().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() -> &'static str {
    ctrl_c_only().await
}

async fn ctrl_c_only() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
