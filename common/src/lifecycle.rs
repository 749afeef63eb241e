use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info};

/// 进程生命周期事件的订阅者
#[async_trait]
pub trait LifecycleListener: Send + Sync {
    /// 服务器开始监听之后调用
    async fn on_started(&self);

    /// 进程开始关闭、socket 尚未释放时调用
    async fn on_stopping(&self);
}

const IDLE: u8 = 0;
const STARTED: u8 = 1;
const STOPPING: u8 = 2;

/// 由宿主层显式持有并触发的生命周期事件源
///
/// 每个事件在进程生命周期内最多触发一次，重复调用会被忽略。
/// 一旦开始关闭，"启动完成"事件不会再触发。
#[derive(Default)]
pub struct ApplicationLifetime {
    listeners: Vec<Arc<dyn LifecycleListener>>,
    phase: AtomicU8,
}

impl ApplicationLifetime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.push(listener);
    }

    /// 触发"启动完成"，返回本次调用是否真正触发了事件
    pub async fn notify_started(&self) -> bool {
        if let Err(phase) =
            self.phase
                .compare_exchange(IDLE, STARTED, Ordering::SeqCst, Ordering::SeqCst)
        {
            if phase == STOPPING {
                info!("application already stopping, started event dropped");
            } else {
                debug!("application started event already fired");
            }
            return false;
        }
        info!(listeners = self.listeners.len(), "application started");
        join_all(self.listeners.iter().map(|l| l.on_started())).await;
        true
    }

    /// 触发"开始关闭"，等待所有订阅者处理完成后返回
    pub async fn notify_stopping(&self) -> bool {
        if self.phase.swap(STOPPING, Ordering::SeqCst) == STOPPING {
            debug!("application stopping event already fired");
            return false;
        }
        info!(listeners = self.listeners.len(), "application stopping");
        join_all(self.listeners.iter().map(|l| l.on_stopping())).await;
        true
    }
}
