use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: String,
    pub components: Option<HashMap<String, String>>, // 其他组件的日志级别
    pub format: Option<String>,                      // 日志输出格式: plain或json
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: None,
            format: None,
        }
    }
}

impl LogConfig {
    pub fn level(&self) -> tracing::Level {
        match self.level.as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }

    // 获取特定组件的日志级别
    pub fn component_level(&self, component: &str) -> Option<&str> {
        match &self.components {
            Some(components) => components.get(component).map(|s| s.as_str()),
            None => None,
        }
    }

    /// 拼出 EnvFilter 指令，如 `info,common=debug`
    pub fn filter_directives(&self) -> String {
        let mut parts = vec![self.level.clone()];
        if let Some(components) = &self.components {
            let mut sorted: Vec<_> = components.iter().collect();
            sorted.sort();
            for (component, level) in sorted {
                parts.push(format!("{}={}", component, level));
            }
        }
        parts.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_include_components() {
        let mut components = HashMap::new();
        components.insert("reqwest".to_string(), "warn".to_string());
        components.insert("common".to_string(), "debug".to_string());
        let log = LogConfig {
            level: "info".to_string(),
            components: Some(components),
            format: None,
        };
        assert_eq!(log.filter_directives(), "info,common=debug,reqwest=warn");
        assert_eq!(log.component_level("common"), Some("debug"));
        assert_eq!(log.level(), tracing::Level::INFO);
    }
}
