use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

use crate::configs::{LogConfig, ServiceDiscoveryConfig};
use crate::Error;

pub const DEFAULT_CONFIG_PATH: &str = "./config/config.yaml";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub service_discovery: ServiceDiscoveryConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "0.0.0.0".to_string(),
            port: 59796,
        }
    }
}

impl ServerConfig {
    pub fn server_url(&self) -> String {
        format!("{}:{}", &self.host, self.port)
    }
}

impl AppConfig {
    // 从多个来源加载配置: 配置文件 < 环境变量
    pub fn from_file(file_path: Option<&str>) -> Result<Self, Error> {
        let path = file_path.unwrap_or(DEFAULT_CONFIG_PATH);

        let mut builder = Config::builder();
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).format(format_of(path)));
        } else {
            warn!("config file {} not found, relying on environment", path);
        }

        // APP__SERVICE_DISCOVERY__SERVICE_NAME=... 优先级最高
        builder = builder.add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.service_discovery.validate()?;
        Ok(config)
    }

    /// 从字符串内容加载，主要用于测试
    pub fn from_content(content: &str, format: FileFormat) -> Result<Self, Error> {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(content, format))
            .build()?
            .try_deserialize()?;
        config.service_discovery.validate()?;
        Ok(config)
    }
}

fn format_of(path: &str) -> FileFormat {
    if path.ends_with(".json") {
        FileFormat::Json
    } else if path.ends_with(".yaml") || path.ends_with(".yml") {
        FileFormat::Yaml
    } else {
        FileFormat::Toml
    }
}
