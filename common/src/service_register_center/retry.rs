use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{Error, RegistryError};

/// 注册失败时的重试策略，指数退避加抖动
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数，包含第一次
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "registration.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// 第 `attempt` 次失败之后的等待时间，attempt 从 1 开始
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);

        // 0 ~ 10% 抖动
        let jitter_range = delay.as_millis() as u64 / 10;
        let jitter = if jitter_range > 0 {
            rand::rng().random_range(0..jitter_range)
        } else {
            0
        };
        delay + Duration::from_millis(jitter)
    }

    /// 执行 `op`，遇到可重试的错误时退避后再试
    ///
    /// `stop` 变为 true 后不再发起新的尝试，已发出的调用总是等它完成。
    pub async fn run<T, F, Fut>(
        &self,
        target: &str,
        mut stop: watch::Receiver<bool>,
        mut op: F,
    ) -> Result<T, RegistryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RegistryError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && e.is_transient() => {
                    if *stop.borrow() {
                        debug!(target_id = %target, attempt, "shutting down, retry abandoned");
                        return Err(e);
                    }
                    let delay = self.backoff(attempt);
                    warn!(
                        target_id = %target,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "registry call failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = stopped(&mut stop) => {
                            debug!(target_id = %target, attempt, "shutting down, retry abandoned");
                            return Err(e);
                        }
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// 等待停止信号；发送端被丢弃也视为停止
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopping| *stopping).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };
        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert!(policy.backoff(1) >= Duration::from_millis(100));
        assert!(policy.backoff(2) >= Duration::from_millis(200));
        let capped = policy.backoff(10);
        assert!(capped >= Duration::from_millis(1000));
        assert!(capped < Duration::from_millis(1100));
    }

    #[test]
    fn zero_attempts_is_invalid() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
        let single = RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        };
        assert!(single.validate().is_ok());
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let (idle, _) = watch::channel(false);
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = fast()
            .run("svc_h:1", idle.subscribe(), move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RegistryError::Unavailable("down".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let (idle, _) = watch::channel(false);
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = fast()
            .run("svc_h:1", idle.subscribe(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RegistryError::Unavailable("down".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_fast() {
        let (idle, _) = watch::channel(false);
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = fast()
            .run("svc_h:1", idle.subscribe(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RegistryError::Status {
                    status: 400,
                    body: "bad".into(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_signal_cuts_the_backoff_short() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
        };
        let (stop, _) = watch::channel(false);
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let stopper = &stop;
        let result: Result<(), _> = tokio::time::timeout(Duration::from_secs(2), async {
            let run = policy.run("svc_h:1", stop.subscribe(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RegistryError::Unavailable("down".into()))
            });
            let signal = async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                stopper.send_replace(true);
            };
            let (result, ()) = tokio::join!(run, signal);
            result
        })
        .await
        .expect("retry kept sleeping after the stop signal");

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_new_attempt_once_stopped() {
        let (stop, _) = watch::channel(true);
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = fast()
            .run("svc_h:1", stop.subscribe(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RegistryError::Unavailable("down".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
