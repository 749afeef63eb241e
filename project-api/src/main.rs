use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use common::config::{AppConfig, DEFAULT_CONFIG_PATH};
use common::lifecycle::ApplicationLifetime;
use common::service::shutdown_signal;
use common::service_register_center::{
    service_register_center, RegistrationManager, RegistrationOptions, ServerAddresses,
};

mod health;
mod listener;

#[derive(Parser, Debug)]
#[command(name = "project-api", about = "Project API service with Consul registration")]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 加载配置并初始化日志
    let config = AppConfig::from_file(Some(&args.config))?;
    common::logging::init_from_config(&config.log)?;

    let discovery = &config.service_discovery;
    info!(service_name = %discovery.service_name, "正在启动项目服务...");

    // 绑定监听地址并发布给地址集合
    let addresses = ServerAddresses::new();
    let tcp = TcpListener::bind(config.server.server_url()).await?;
    let advertised = listener::publish(
        &tcp,
        &config.server.protocol,
        discovery.advertise_host.as_deref(),
        &addresses,
    )?;
    info!(address = %advertised, "服务监听地址: {}", tcp.local_addr()?);

    // 注册中心与注册生命周期
    let registry = service_register_center(discovery)?;
    let manager = RegistrationManager::new(
        RegistrationOptions::from_config(discovery),
        registry,
        Arc::new(addresses.clone()),
    )?;

    let mut lifetime = ApplicationLifetime::new();
    lifetime.subscribe(Arc::new(manager));
    let lifetime = Arc::new(lifetime);

    // 服务器开始监听后注册，不阻塞请求处理
    let started = {
        let lifetime = lifetime.clone();
        tokio::spawn(async move {
            lifetime.notify_started().await;
        })
    };

    // 收到关闭信号后先注销，再停止接收连接
    let stopping = lifetime.clone();
    let served = axum::serve(tcp, health::router(&discovery.health_check.base_path))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            stopping.notify_stopping().await;
        })
        .await;

    if let Err(e) = &served {
        error!("服务器错误: {}", e);
    }

    // 服务器异常退出时也要注销；已经触发过则忽略
    lifetime.notify_stopping().await;
    if let Err(e) = started.await {
        error!("注册任务异常退出: {}", e);
    }
    addresses.release_all();

    info!("项目服务已完全关闭");
    served.map_err(Into::into)
}
