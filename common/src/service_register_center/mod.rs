use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::configs::ServiceDiscoveryConfig;
use crate::{Error, RegistryError};

// 声明子模块
pub mod consul;
pub mod health_check;
pub mod identity;
pub mod manager;
pub mod resolver;
pub mod retry;
pub mod typos;

pub use consul::Consul;
pub use health_check::{HealthCheckOptions, HealthCheckSpec};
pub use identity::{compute_id, ServiceIdentity};
pub use manager::{LifecycleReport, RegistrationManager, RegistrationOptions, RegistrationState};
pub use resolver::{AddressResolver, ServerAddresses};
pub use retry::RetryPolicy;
pub use typos::{Registration, ServiceAddress};

/// 服务注册中心客户端
///
/// 实现必须可以被多个任务并发调用。
#[async_trait]
pub trait ServiceRegister: Send + Sync + Debug {
    /// 向注册中心注册服务，同ID的记录会被替换
    ///
    /// # 返回
    /// 成功返回注册ID
    async fn register(&self, registration: Registration) -> Result<String, RegistryError>;

    /// 从注册中心注销服务，ID不存在时视为成功
    async fn deregister(&self, service_id: &str) -> Result<(), RegistryError>;
}

/// 根据配置创建服务注册中心实例
pub fn service_register_center(config: &ServiceDiscoveryConfig) -> Result<Arc<dyn ServiceRegister>, Error> {
    let consul = Consul::from_config(config).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    Ok(Arc::new(consul))
}
