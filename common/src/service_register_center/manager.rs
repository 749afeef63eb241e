//! Registration lifecycle of this process's listeners.
//!
//! ```text
//! Unregistered -> Registering -> Registered -> Deregistering -> Unregistered
//! ```
//!
//! Nothing about a registration is cached: ids and health checks are rebuilt
//! from the live listener addresses on every call, so register and
//! deregister agree on the same id for the same address.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::configs::ServiceDiscoveryConfig;
use crate::lifecycle::LifecycleListener;
use crate::service_register_center::health_check::{HealthCheckOptions, HealthCheckSpec};
use crate::service_register_center::identity::ServiceIdentity;
use crate::service_register_center::resolver::AddressResolver;
use crate::service_register_center::retry::{stopped, RetryPolicy};
use crate::service_register_center::typos::{Registration, ServiceAddress};
use crate::service_register_center::ServiceRegister;
use crate::{Error, Operation, RegistryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registering,
    Registered,
    Deregistering,
}

#[derive(Debug, Clone)]
pub struct RegistrationOptions {
    pub service_name: String,
    pub tags: Vec<String>,
    pub health_check: HealthCheckOptions,
    pub retry: RetryPolicy,
    /// 周期性重新注册，None 表示关闭
    pub heartbeat_interval: Option<Duration>,
    /// 整个注销过程的上限
    pub deregister_timeout: Duration,
}

impl RegistrationOptions {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            tags: Vec::new(),
            health_check: HealthCheckOptions::default(),
            retry: RetryPolicy::default(),
            heartbeat_interval: None,
            deregister_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &ServiceDiscoveryConfig) -> Self {
        Self {
            service_name: config.service_name.clone(),
            tags: config.tags.clone(),
            health_check: config.health_check.options(),
            retry: config.registration.retry_policy(),
            heartbeat_interval: config.registration.heartbeat(),
            deregister_timeout: config.registration.deregister_timeout(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.service_name.trim().is_empty() {
            return Err(Error::InvalidConfig("service name must not be empty".to_string()));
        }
        if self.deregister_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "deregister timeout must be greater than 0".to_string(),
            ));
        }
        self.health_check.validate()?;
        self.retry.validate()
    }
}

/// 一次 on_start / on_stop 的结果
///
/// 部分成功是合法状态：`completed` 与 `failures` 可以同时非空。
#[derive(Debug)]
pub struct LifecycleReport {
    pub operation: Operation,
    pub completed: Vec<String>,
    pub failures: Vec<Error>,
}

impl LifecycleReport {
    fn new(operation: Operation) -> Self {
        Self {
            operation,
            completed: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        !self.completed.is_empty() && !self.failures.is_empty()
    }
}

/// on_start、on_stop 与心跳任务共享的部分
#[derive(Debug)]
struct Shared {
    options: RegistrationOptions,
    registry: Arc<dyn ServiceRegister>,
    resolver: Arc<dyn AddressResolver>,
    state: Mutex<RegistrationState>,
    stopping: watch::Sender<bool>,
    /// 注册进行中持有；注销前先等它释放，保证注销请求晚于注册请求
    inflight: AsyncMutex<()>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, RegistrationState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn set_state(&self, next: RegistrationState) {
        let mut state = self.lock_state();
        debug!(from = ?*state, to = ?next, "registration state change");
        *state = next;
    }

    /// 只有仍处于 `expected` 时才切换，返回是否切换成功
    fn transition(&self, expected: RegistrationState, next: RegistrationState) -> bool {
        let mut state = self.lock_state();
        if *state != expected {
            return false;
        }
        debug!(from = ?*state, to = ?next, "registration state change");
        *state = next;
        true
    }

    /// 注销进行中拒绝开始注册；否则进入 Registering 并清除停止标记
    fn begin_start(&self) -> bool {
        let mut state = self.lock_state();
        if *state == RegistrationState::Deregistering {
            return false;
        }
        debug!(from = ?*state, to = ?RegistrationState::Registering, "registration state change");
        *state = RegistrationState::Registering;
        self.stopping.send_replace(false);
        true
    }

    fn begin_stop(&self) {
        let mut state = self.lock_state();
        debug!(from = ?*state, to = ?RegistrationState::Deregistering, "registration state change");
        *state = RegistrationState::Deregistering;
        self.stopping.send_replace(true);
    }

    fn is_stopping(&self) -> bool {
        *self.stopping.borrow()
    }

    fn resolve(&self, operation: Operation) -> Result<Vec<ServiceAddress>, Error> {
        self.resolver.resolve().inspect_err(|e| {
            warn!(
                service_name = %self.options.service_name,
                %operation,
                error = %e,
                "no listener addresses, skipping"
            );
        })
    }

    async fn register_all(&self) -> LifecycleReport {
        let _inflight = self.inflight.lock().await;
        let mut report = LifecycleReport::new(Operation::Register);
        let addresses = match self.resolve(Operation::Register) {
            Ok(addresses) => addresses,
            Err(e) => {
                report.failures.push(e);
                return report;
            }
        };

        let results = join_all(addresses.iter().map(|address| self.register_one(address))).await;
        for result in results {
            match result {
                Ok(id) => report.completed.push(id),
                Err(e) => report.failures.push(e),
            }
        }
        report
    }

    async fn register_one(&self, address: &ServiceAddress) -> Result<String, Error> {
        let service_name = &self.options.service_name;
        let id = ServiceIdentity::new(service_name, address).registration_id();

        let check = HealthCheckSpec::build(address, &self.options.health_check).inspect_err(|e| {
            error!(%service_name, %address, service_id = %id, error = %e, "cannot build health check");
        })?;

        let registration = Registration {
            id: id.clone(),
            name: service_name.clone(),
            host: address.host.clone(),
            port: address.port,
            tags: self.options.tags.clone(),
            check: Some(check),
        };

        let registry = &self.registry;
        self.options
            .retry
            .run(&id, self.stopping.subscribe(), move || registry.register(registration.clone()))
            .await
            .map_err(|source| {
                error!(
                    %service_name,
                    %address,
                    service_id = %id,
                    operation = %Operation::Register,
                    error = %source,
                    "registration failed"
                );
                Error::registry(Operation::Register, id.clone(), source)
            })
    }

    async fn deregister_all(&self, deadline: Instant) -> LifecycleReport {
        // 被打断的注册可能已经发出 PUT，等它落定再注销
        let _settled = match tokio::time::timeout_at(deadline, self.inflight.lock()).await {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!(
                    service_name = %self.options.service_name,
                    "registration still in flight at deregister deadline"
                );
                None
            }
        };

        let mut report = LifecycleReport::new(Operation::Deregister);
        let addresses = match self.resolve(Operation::Deregister) {
            Ok(addresses) => addresses,
            Err(e) => {
                report.failures.push(e);
                return report;
            }
        };

        let results = join_all(
            addresses
                .iter()
                .map(|address| self.deregister_one(address, deadline)),
        )
        .await;
        for result in results {
            match result {
                Ok(id) => report.completed.push(id),
                Err(e) => report.failures.push(e),
            }
        }
        report
    }

    async fn deregister_one(&self, address: &ServiceAddress, deadline: Instant) -> Result<String, Error> {
        let service_name = &self.options.service_name;
        let id = ServiceIdentity::new(service_name, address).registration_id();

        let result = match tokio::time::timeout_at(deadline, self.registry.deregister(&id)).await {
            Ok(result) => result,
            Err(_) => Err(RegistryError::Timeout(self.options.deregister_timeout)),
        };

        match result {
            Ok(()) => Ok(id),
            Err(source) => {
                error!(
                    %service_name,
                    %address,
                    service_id = %id,
                    operation = %Operation::Deregister,
                    error = %source,
                    "deregistration failed"
                );
                Err(Error::registry(Operation::Deregister, id, source))
            }
        }
    }
}

/// 注册生命周期管理器
///
/// 进程启动完成时调用 `on_start`，开始关闭时调用 `on_stop`。
/// 两者都不会返回错误：注册失败只影响可发现性，不影响服务本身。
#[derive(Debug)]
pub struct RegistrationManager {
    shared: Arc<Shared>,
    heartbeat: AsyncMutex<Option<JoinHandle<()>>>,
}

impl RegistrationManager {
    pub fn new(
        options: RegistrationOptions,
        registry: Arc<dyn ServiceRegister>,
        resolver: Arc<dyn AddressResolver>,
    ) -> Result<Self, Error> {
        options.validate()?;
        let (stopping, _) = watch::channel(false);
        Ok(Self {
            shared: Arc::new(Shared {
                options,
                registry,
                resolver,
                state: Mutex::new(RegistrationState::Unregistered),
                stopping,
                inflight: AsyncMutex::new(()),
            }),
            heartbeat: AsyncMutex::new(None),
        })
    }

    pub fn state(&self) -> RegistrationState {
        *self.shared.lock_state()
    }

    /// 为当前所有监听地址注册服务
    pub async fn on_start(&self) -> LifecycleReport {
        let shared = &self.shared;
        let service_name = shared.options.service_name.clone();
        if !shared.begin_start() {
            warn!(%service_name, "deregistration in progress, registration skipped");
            let mut report = LifecycleReport::new(Operation::Register);
            report
                .failures
                .push(Error::Internal("service is shutting down".to_string()));
            return report;
        }

        let report = shared.register_all().await;

        let next = if report.completed.is_empty() {
            RegistrationState::Unregistered
        } else {
            RegistrationState::Registered
        };
        if !shared.transition(RegistrationState::Registering, next) {
            debug!(%service_name, "shutdown started during registration");
        }
        // 首次注册失败也要启动心跳，注册中心恢复后由心跳补上
        self.start_heartbeat().await;

        if report.is_success() {
            info!(%service_name, registered = report.completed.len(), "service registered");
        } else {
            warn!(
                %service_name,
                registered = report.completed.len(),
                failed = report.failures.len(),
                "service registration incomplete"
            );
        }
        report
    }

    /// 注销当前所有监听地址，无论之前处于什么状态
    pub async fn on_stop(&self) -> LifecycleReport {
        let shared = &self.shared;
        let service_name = shared.options.service_name.clone();
        let deadline = Instant::now() + shared.options.deregister_timeout;
        shared.begin_stop();
        self.stop_heartbeat(deadline).await;

        let report = shared.deregister_all(deadline).await;

        shared.set_state(RegistrationState::Unregistered);
        if report.is_success() {
            info!(%service_name, deregistered = report.completed.len(), "service deregistered");
        } else {
            warn!(
                %service_name,
                deregistered = report.completed.len(),
                failed = report.failures.len(),
                "service deregistration incomplete, registry may keep stale entries until health checks expire"
            );
        }
        report
    }

    async fn start_heartbeat(&self) {
        let Some(interval) = self.shared.options.heartbeat_interval else {
            return;
        };

        let mut heartbeat = self.heartbeat.lock().await;
        if self.shared.is_stopping() {
            return;
        }
        if heartbeat.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let shared = self.shared.clone();
        let mut stop = shared.stopping.subscribe();
        *heartbeat = Some(tokio::spawn(async move {
            let service_name = shared.options.service_name.clone();
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stopped(&mut stop) => break,
                }
                let report = shared.register_all().await;
                if !report.completed.is_empty()
                    && shared.transition(RegistrationState::Unregistered, RegistrationState::Registered)
                {
                    info!(%service_name, registered = report.completed.len(), "service registered by heartbeat");
                }
                debug!(
                    %service_name,
                    registered = report.completed.len(),
                    failed = report.failures.len(),
                    "heartbeat re-registration"
                );
            }
        }));
        info!(
            service_name = %self.shared.options.service_name,
            interval_secs = interval.as_secs_f64(),
            "started registration heartbeat"
        );
    }

    /// 心跳任务看到停止信号后自行退出；截止时间内没退出才强制 abort
    async fn stop_heartbeat(&self, deadline: Instant) {
        let Some(mut handle) = self.heartbeat.lock().await.take() else {
            return;
        };
        let service_name = &self.shared.options.service_name;
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(())) => debug!(%service_name, "stopped registration heartbeat"),
            Ok(Err(e)) if e.is_cancelled() => {}
            Ok(Err(e)) => error!(%service_name, error = %e, "registration heartbeat panicked"),
            Err(_) => {
                handle.abort();
                warn!(%service_name, "registration heartbeat did not stop before the deadline, aborted");
            }
        }
    }
}

#[async_trait]
impl LifecycleListener for RegistrationManager {
    async fn on_started(&self) {
        self.on_start().await;
    }

    async fn on_stopping(&self) {
        self.on_stop().await;
    }
}
