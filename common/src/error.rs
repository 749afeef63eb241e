use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// 注册中心操作类型，用于错误与日志上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Register,
    Deregister,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Register => f.write_str("register"),
            Operation::Deregister => f.write_str("deregister"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("内部服务错误: {0}")]
    Internal(String),

    #[error("配置加载错误: {0}")]
    Config(#[from] config::ConfigError),

    #[error("配置无效: {0}")]
    InvalidConfig(String),

    /// 监听层没有暴露任何地址
    #[error("no listener addresses available: {0}")]
    Resolution(String),

    #[error("{operation} of {service_id} failed: {source}")]
    Registry {
        operation: Operation,
        service_id: String,
        #[source]
        source: RegistryError,
    },

    #[error("IO错误: {0}")]
    IO(#[from] std::io::Error),
}

impl Error {
    pub fn registry(operation: Operation, service_id: impl Into<String>, source: RegistryError) -> Self {
        Error::Registry {
            operation,
            service_id: service_id.into(),
            source,
        }
    }

    pub fn is_resolution(&self) -> bool {
        matches!(self, Error::Resolution(_))
    }

    pub fn is_registry(&self) -> bool {
        matches!(self, Error::Registry { .. })
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Internal(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Internal(err.to_string())
    }
}

/// 与注册中心通信时的失败
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("registry did not answer within {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid registry endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

impl RegistryError {
    /// 网络故障、超时和 5xx 可以重试，其余错误重试也不会成功
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Transport(e) => !e.is_builder() && !e.is_decode(),
            RegistryError::Timeout(_) | RegistryError::Unavailable(_) => true,
            RegistryError::Status { status, .. } => *status >= 500 || *status == 429,
            RegistryError::InvalidEndpoint(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
