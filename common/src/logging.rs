use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::configs::LogConfig;

// 日志输出格式类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    // 普通文本格式
    Plain,
    // JSON格式，适合ELK等日志聚合系统
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Plain,
        }
    }
}

/// 从配置初始化日志系统
///
/// # 示例
/// ```no_run
/// use common::config::AppConfig;
/// use common::logging;
///
/// fn main() -> anyhow::Result<()> {
///     let config = AppConfig::from_file(None)?;
///     logging::init_from_config(&config.log)?;
///     tracing::info!("日志系统从配置初始化成功");
///     Ok(())
/// }
/// ```
pub fn init_from_config(log: &LogConfig) -> Result<()> {
    // 环境变量 RUST_LOG 覆盖配置文件的日志级别
    let from_env = std::env::var("RUST_LOG").ok();
    let env_filter = match &from_env {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_new(log.filter_directives())?,
    };

    let log_format = log
        .format
        .as_deref()
        .map(LogFormat::parse)
        .unwrap_or(LogFormat::Plain);

    // 根据配置的输出格式选择日志输出方式
    match log_format {
        LogFormat::Plain => {
            fmt()
                .with_env_filter(env_filter)
                .with_ansi(true)
                .with_thread_names(true)
                .try_init()
                .map_err(|e| anyhow::anyhow!(e))?;
        }
        LogFormat::Json => {
            fmt()
                .with_env_filter(env_filter)
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_thread_names(true)
                .try_init()
                .map_err(|e| anyhow::anyhow!(e))?;
        }
    }

    match from_env {
        Some(directives) => info!("log filter taken from RUST_LOG={}", directives),
        None => info!("log filter: {}", log.filter_directives()),
    }
    info!("log format: {:?}", log_format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_defaults_to_plain() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("plain"), LogFormat::Plain);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Plain);
    }
}
