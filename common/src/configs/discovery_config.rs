use serde::Deserialize;
use std::time::Duration;

use crate::service_register_center::health_check::HealthCheckOptions;
use crate::service_register_center::retry::RetryPolicy;
use crate::Error;

/// 服务发现配置
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceDiscoveryConfig {
    pub service_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// 监听在 0.0.0.0 / :: 时对外公布的主机名
    pub advertise_host: Option<String>,
    #[serde(default)]
    pub consul: ConsulConfig,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
}

impl ServiceDiscoveryConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.service_name.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "service_discovery.service_name must not be empty".to_string(),
            ));
        }
        self.health_check.options().validate()?;
        self.registration.retry_policy().validate()?;
        if self.registration.deregister_timeout == 0 {
            return Err(Error::InvalidConfig(
                "registration.deregister_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Consul 注册中心连接配置
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConsulConfig {
    /// 完整地址，如 `http://consul:8500`，设置后覆盖 protocol/host/port
    pub http_endpoint: Option<String>,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub timeout: u64,
    pub token: Option<String>,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            http_endpoint: None,
            protocol: "http".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8500,
            timeout: 5,
            token: None,
        }
    }
}

impl ConsulConfig {
    pub fn base_url(&self) -> String {
        match self.http_endpoint.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("{}://{}:{}", self.protocol, self.host, self.port),
        }
    }
}

/// 健康检查配置，时间单位为秒
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub base_path: String,
    pub interval: u64,
    pub deregister_after: u64,
    pub timeout: Option<u64>,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        let options = HealthCheckOptions::default();
        Self {
            base_path: options.base_path,
            interval: options.interval.as_secs(),
            deregister_after: options.deregister_after.as_secs(),
            timeout: None,
        }
    }
}

impl HealthCheckConfig {
    pub fn options(&self) -> HealthCheckOptions {
        HealthCheckOptions {
            base_path: self.base_path.clone(),
            interval: Duration::from_secs(self.interval),
            deregister_after: Duration::from_secs(self.deregister_after),
            timeout: self.timeout.map(Duration::from_secs),
        }
    }
}

/// 注册重试、心跳与注销超时配置
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RegistrationConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub heartbeat_interval: Option<u64>,
    pub deregister_timeout: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            max_attempts: retry.max_attempts,
            base_delay_ms: retry.base_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
            heartbeat_interval: None,
            deregister_timeout: 10,
        }
    }
}

impl RegistrationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn heartbeat(&self) -> Option<Duration> {
        self.heartbeat_interval
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn deregister_timeout(&self) -> Duration {
        Duration::from_secs(self.deregister_timeout)
    }
}
