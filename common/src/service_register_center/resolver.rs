use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use crate::service_register_center::typos::ServiceAddress;
use crate::Error;

/// 查询当前进程实际监听的地址
pub trait AddressResolver: Send + Sync + Debug {
    /// 每个已绑定端点返回一个地址，顺序无意义；没有地址时返回 `Error::Resolution`
    fn resolve(&self) -> Result<Vec<ServiceAddress>, Error>;
}

/// 监听层维护的已绑定地址集合
///
/// 服务器绑定 socket 后调用 `bind`，关闭时调用 `release_all`。
/// 克隆共享同一份集合。
#[derive(Debug, Clone, Default)]
pub struct ServerAddresses {
    inner: Arc<RwLock<BTreeSet<ServiceAddress>>>,
}

impl ServerAddresses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, address: ServiceAddress) {
        if let Ok(mut set) = self.inner.write() {
            set.insert(address);
        }
    }

    pub fn release_all(&self) {
        if let Ok(mut set) = self.inner.write() {
            set.clear();
        }
    }

    pub fn snapshot(&self) -> Vec<ServiceAddress> {
        match self.inner.read() {
            Ok(set) => set.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl AddressResolver for ServerAddresses {
    fn resolve(&self) -> Result<Vec<ServiceAddress>, Error> {
        let addresses = self.snapshot();
        if addresses.is_empty() {
            return Err(Error::Resolution(
                "server has not bound any socket".to_string(),
            ));
        }
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_listener_fails_resolution() {
        let addresses = ServerAddresses::new();
        assert!(addresses.resolve().unwrap_err().is_resolution());
    }

    #[test]
    fn multiple_endpoints_are_reported_once_each() {
        let addresses = ServerAddresses::new();
        addresses.bind(ServiceAddress::http("10.0.0.5", 80));
        addresses.bind(ServiceAddress::http("[::1]", 80));
        addresses.bind(ServiceAddress::http("10.0.0.5", 443));
        addresses.bind(ServiceAddress::http("10.0.0.5", 80));

        let resolved = addresses.resolve().unwrap();
        assert_eq!(resolved.len(), 3);
    }

    #[test]
    fn clones_share_state() {
        let addresses = ServerAddresses::new();
        let listener_side = addresses.clone();
        let addr = ServiceAddress::http("10.0.0.5", 80);

        listener_side.bind(addr.clone());
        assert_eq!(addresses.resolve().unwrap(), vec![addr.clone()]);

        listener_side.release_all();
        assert!(addresses.resolve().is_err());
        assert!(addresses.snapshot().is_empty());
    }
}
