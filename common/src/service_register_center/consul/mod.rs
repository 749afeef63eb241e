use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

use crate::configs::ServiceDiscoveryConfig;
use crate::service_register_center::health_check::{consul_duration, HealthCheckSpec};
use crate::service_register_center::typos::Registration;
use crate::service_register_center::ServiceRegister;
use crate::RegistryError;

const TOKEN_HEADER: &str = "X-Consul-Token";

/// Consul client configuration options
#[derive(Debug, Clone)]
pub struct ConsulOptions {
    pub base_url: String,
    pub timeout: Duration,
    pub token: Option<String>,
}

impl ConsulOptions {
    pub fn from_config(config: &ServiceDiscoveryConfig) -> Self {
        Self {
            base_url: config.consul.base_url(),
            timeout: Duration::from_secs(config.consul.timeout),
            token: config.consul.token.clone().filter(|t| !t.is_empty()),
        }
    }
}

/// Consul agent HTTP API 客户端
#[derive(Debug, Clone)]
pub struct Consul {
    pub options: ConsulOptions,
    base: Url,
    client: Client,
}

impl Consul {
    pub fn new(options: ConsulOptions) -> Result<Self, RegistryError> {
        let base = Url::parse(&options.base_url)
            .map_err(|e| RegistryError::InvalidEndpoint(format!("{}: {}", options.base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(RegistryError::InvalidEndpoint(options.base_url.clone()));
        }

        let client = Client::builder().timeout(options.timeout).build()?;

        Ok(Self {
            options,
            base,
            client,
        })
    }

    /// Create a new Consul client from discovery config
    pub fn from_config(config: &ServiceDiscoveryConfig) -> Result<Self, RegistryError> {
        Self::new(ConsulOptions::from_config(config))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::InvalidEndpoint(self.options.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn put(&self, url: Url) -> RequestBuilder {
        let request = self.client.put(url);
        match &self.options.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RegistryError> {
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                RegistryError::Timeout(self.options.timeout)
            } else {
                RegistryError::Transport(e)
            }
        })
    }

    /// 构建服务注册JSON
    pub fn registration_payload(registration: &Registration) -> Value {
        let mut payload = json!({
            "ID": registration.id,
            "Name": registration.name,
            "Address": registration.host,
            "Port": registration.port,
            "Tags": registration.tags,
        });
        if let Some(check) = &registration.check {
            payload["Checks"] = json!([check_payload(check)]);
        }
        payload
    }
}

fn check_payload(check: &HealthCheckSpec) -> Value {
    let mut value = json!({
        "Name": check.name,
        "HTTP": check.url,
        "Interval": consul_duration(check.interval),
        "DeregisterCriticalServiceAfter": consul_duration(check.deregister_after),
    });
    if let Some(timeout) = check.timeout {
        value["Timeout"] = json!(consul_duration(timeout));
    }
    value
}

async fn status_error(response: Response) -> RegistryError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    RegistryError::Status { status, body }
}

#[async_trait]
impl ServiceRegister for Consul {
    async fn register(&self, registration: Registration) -> Result<String, RegistryError> {
        let url = self.endpoint(&["v1", "agent", "service", "register"])?;

        debug!(
            "Registering service: {} ({}:{})",
            registration.name, registration.host, registration.port
        );

        let payload = Self::registration_payload(&registration);
        let response = self.send(self.put(url).json(&payload)).await?;

        if response.status().is_success() {
            info!("Service registered successfully: {}", registration.id);
            Ok(registration.id)
        } else {
            let err = status_error(response).await;
            error!("Failed to register service {}: {}", registration.id, err);
            Err(err)
        }
    }

    async fn deregister(&self, service_id: &str) -> Result<(), RegistryError> {
        let url = self.endpoint(&["v1", "agent", "service", "deregister", service_id])?;

        debug!("Deregistering service: {}", service_id);

        let response = self.send(self.put(url)).await?;
        let status = response.status();

        if status.is_success() {
            info!("Service deregistered successfully: {}", service_id);
            Ok(())
        } else if status == reqwest::StatusCode::NOT_FOUND {
            // agent 不认识该ID，说明已经不存在
            debug!("Service {} was not registered, nothing to remove", service_id);
            Ok(())
        } else {
            let err = status_error(response).await;
            error!("Failed to deregister service {}: {}", service_id, err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service_register_center::health_check::HealthCheckOptions;
    use crate::service_register_center::typos::ServiceAddress;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::put;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// 内存中的 Consul agent 替身
    #[derive(Clone, Default)]
    struct Agent {
        services: Arc<Mutex<HashMap<String, Value>>>,
        tokens: Arc<Mutex<Vec<Option<String>>>>,
        fail_register: bool,
    }

    async fn agent_register(
        State(agent): State<Agent>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let token = headers
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        agent.tokens.lock().unwrap().push(token);
        if agent.fail_register {
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        let id = body["ID"].as_str().unwrap_or_default().to_string();
        agent.services.lock().unwrap().insert(id, body);
        StatusCode::OK
    }

    async fn agent_deregister(State(agent): State<Agent>, Path(id): Path<String>) -> StatusCode {
        match agent.services.lock().unwrap().remove(&id) {
            Some(_) => StatusCode::OK,
            None => StatusCode::NOT_FOUND,
        }
    }

    async fn spawn_agent(agent: Agent) -> String {
        let app = Router::new()
            .route("/v1/agent/service/register", put(agent_register))
            .route("/v1/agent/service/deregister/{id}", put(agent_deregister))
            .with_state(agent);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn consul(base_url: String, token: Option<&str>) -> Consul {
        Consul::new(ConsulOptions {
            base_url,
            timeout: Duration::from_secs(2),
            token: token.map(String::from),
        })
        .unwrap()
    }

    fn registration(host: &str, port: u16) -> Registration {
        let address = ServiceAddress::http(host, port);
        Registration {
            id: format!("gateway_projectapi_{}", address),
            name: "gateway_projectapi".to_string(),
            host: host.to_string(),
            port,
            tags: vec!["api".to_string()],
            check: Some(HealthCheckSpec::build(&address, &HealthCheckOptions::default()).unwrap()),
        }
    }

    #[test]
    fn payload_uses_consul_field_names() {
        let payload = Consul::registration_payload(&registration("10.0.0.5", 59796));
        assert_eq!(payload["ID"], "gateway_projectapi_10.0.0.5:59796");
        assert_eq!(payload["Name"], "gateway_projectapi");
        assert_eq!(payload["Address"], "10.0.0.5");
        assert_eq!(payload["Port"], 59796);
        let check = &payload["Checks"][0];
        assert_eq!(check["HTTP"], "http://10.0.0.5:59796/HealthCheck");
        assert_eq!(check["Interval"], "10s");
        assert_eq!(check["DeregisterCriticalServiceAfter"], "60s");
        assert!(check.get("Timeout").is_none());
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let err = Consul::new(ConsulOptions {
            base_url: "not a url".to_string(),
            timeout: Duration::from_secs(1),
            token: None,
        })
        .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidEndpoint(_)));
    }

    #[tokio::test]
    async fn register_then_deregister() {
        let agent = Agent::default();
        let consul = consul(spawn_agent(agent.clone()).await, Some("secret"));

        let id = consul.register(registration("10.0.0.5", 59796)).await.unwrap();
        assert_eq!(id, "gateway_projectapi_10.0.0.5:59796");
        assert!(agent.services.lock().unwrap().contains_key(&id));
        assert_eq!(
            agent.tokens.lock().unwrap().as_slice(),
            &[Some("secret".to_string())]
        );

        consul.deregister(&id).await.unwrap();
        assert!(agent.services.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_is_an_upsert() {
        let agent = Agent::default();
        let consul = consul(spawn_agent(agent.clone()).await, None);

        consul.register(registration("10.0.0.5", 80)).await.unwrap();
        consul.register(registration("10.0.0.5", 80)).await.unwrap();
        assert_eq!(agent.services.lock().unwrap().len(), 1);
        assert_eq!(agent.tokens.lock().unwrap().as_slice(), &[None, None]);
    }

    #[tokio::test]
    async fn deregister_unknown_id_is_a_noop() {
        let consul = consul(spawn_agent(Agent::default()).await, None);
        consul.deregister("gateway_projectapi_[::1]:80").await.unwrap();
    }

    #[tokio::test]
    async fn server_error_is_reported_with_status() {
        let agent = Agent {
            fail_register: true,
            ..Default::default()
        };
        let consul = consul(spawn_agent(agent).await, None);
        let err = consul.register(registration("10.0.0.5", 80)).await.unwrap_err();
        assert!(matches!(err, RegistryError::Status { status: 500, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn unreachable_agent_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = consul(base_url, None).deregister("svc_h:1").await.unwrap_err();
        assert!(err.is_transient());
    }
}
