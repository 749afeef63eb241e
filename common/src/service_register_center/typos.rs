use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::service_register_center::health_check::HealthCheckSpec;
use crate::Error;

/// 进程实际监听的一个网络端点
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceAddress {
    pub scheme: String,
    /// IPv6 地址带方括号，如 `[::1]`
    pub host: String,
    pub port: u16,
}

impl ServiceAddress {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self::new("http", host, port)
    }

    pub fn from_socket_addr(scheme: &str, addr: SocketAddr) -> Self {
        let host = match addr.ip() {
            IpAddr::V4(ip) => ip.to_string(),
            IpAddr::V6(ip) => format!("[{}]", ip),
        };
        Self::new(scheme, host, addr.port())
    }

    /// 解析监听层上报的 URI，如 `http://localhost:5000`
    pub fn parse(uri: &str) -> Result<Self, Error> {
        let url = Url::parse(uri).map_err(|e| Error::Resolution(format!("{}: {}", uri, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::Resolution(format!("{}: missing host", uri)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::Resolution(format!("{}: missing port", uri)))?;
        Ok(Self::new(url.scheme(), host, port))
    }

    /// 是否为通配地址 (0.0.0.0 / [::])
    pub fn is_unspecified(&self) -> bool {
        self.host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map(|ip| ip.is_unspecified())
            .unwrap_or(false)
    }

    pub fn with_host(&self, host: impl Into<String>) -> Self {
        Self::new(self.scheme.clone(), host, self.port)
    }

    /// `scheme://host:port/`
    pub fn base_uri(&self) -> Result<Url, Error> {
        let raw = format!("{}://{}:{}/", self.scheme, self.host, self.port);
        Url::parse(&raw).map_err(|e| Error::Resolution(format!("{}: {}", raw, e)))
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// 服务注册信息
///
/// 包含向服务注册中心注册服务所需的所有信息
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Registration {
    /// 服务实例的唯一标识
    pub id: String,
    /// 服务名称
    pub name: String,
    /// 服务主机地址
    pub host: String,
    /// 服务端口号
    pub port: u16,
    /// 服务标签，用于分类和过滤
    pub tags: Vec<String>,
    /// 健康检查配置
    pub check: Option<HealthCheckSpec>,
}
