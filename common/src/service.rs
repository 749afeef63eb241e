use tracing::{error, info};

/// 等待关闭信号 (Ctrl+C 或 SIGTERM)
///
/// 信号处理器安装失败时只记录日志，该分支永远不会完成。
pub async fn shutdown_signal() {
    use tokio::signal;

    // 监听 Ctrl+C 信号
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    // 在Unix系统上监听 SIGTERM 信号
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    // 在非Unix系统上创建一个永不返回的future
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    // 等待任一信号
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
