use crate::service_register_center::typos::ServiceAddress;

/// 计算注册ID: `{service_name}_{host}:{port}`
///
/// 注册与注销都重新计算ID而不是缓存，保证两者对同一地址得到同一个ID。
pub fn compute_id(service_name: &str, address: &ServiceAddress) -> String {
    format!("{}_{}:{}", service_name, address.host, address.port)
}

/// 服务名与监听地址的组合
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceIdentity<'a> {
    pub service_name: &'a str,
    pub address: &'a ServiceAddress,
}

impl<'a> ServiceIdentity<'a> {
    pub fn new(service_name: &'a str, address: &'a ServiceAddress) -> Self {
        Self {
            service_name,
            address,
        }
    }

    pub fn registration_id(&self) -> String {
        compute_id(self.service_name, self.address)
    }
}
