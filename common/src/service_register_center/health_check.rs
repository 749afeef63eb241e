use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::service_register_center::typos::ServiceAddress;
use crate::Error;

pub const DEFAULT_BASE_PATH: &str = "/HealthCheck";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_DEREGISTER_AFTER: Duration = Duration::from_secs(60);

/// 健康检查参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckOptions {
    pub base_path: String,
    /// 注册中心轮询间隔
    pub interval: Duration,
    /// 检查持续失败多久后注册中心清除该实例
    pub deregister_after: Duration,
    pub timeout: Option<Duration>,
}

impl Default for HealthCheckOptions {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            interval: DEFAULT_INTERVAL,
            deregister_after: DEFAULT_DEREGISTER_AFTER,
            timeout: None,
        }
    }
}

impl HealthCheckOptions {
    /// deregister_after 必须大于 interval，否则注册中心可能在第一次轮询前就清除实例
    pub fn validate(&self) -> Result<(), Error> {
        if self.base_path.trim().is_empty() {
            return Err(Error::InvalidConfig("health check base_path is empty".to_string()));
        }
        if self.interval.is_zero() {
            return Err(Error::InvalidConfig("health check interval must be positive".to_string()));
        }
        if self.deregister_after <= self.interval {
            return Err(Error::InvalidConfig(format!(
                "deregister_after ({:?}) must exceed interval ({:?})",
                self.deregister_after, self.interval
            )));
        }
        Ok(())
    }
}

/// 附加在一条注册记录上的 HTTP 健康检查
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckSpec {
    pub name: String,
    pub url: String,
    pub interval: Duration,
    pub deregister_after: Duration,
    pub timeout: Option<Duration>,
}

impl HealthCheckSpec {
    /// 将 base_path 相对于地址的 base URI 解析得到检查 URL
    pub fn build(address: &ServiceAddress, options: &HealthCheckOptions) -> Result<Self, Error> {
        options.validate()?;
        let url = address
            .base_uri()?
            .join(&options.base_path)
            .map_err(|e| Error::Resolution(format!("{} + {}: {}", address, options.base_path, e)))?;

        Ok(Self {
            name: format!("HTTP {} on {}", options.base_path, address),
            url: url.to_string(),
            interval: options.interval,
            deregister_after: options.deregister_after,
            timeout: options.timeout,
        })
    }
}

/// Consul 的时长格式，如 `10s`
pub fn consul_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
