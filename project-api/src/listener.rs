use std::io;

use common::service_register_center::{ServerAddresses, ServiceAddress};
use tokio::net::TcpListener;

/// 将已绑定的 socket 发布给地址集合，返回对外公布的地址
pub fn publish(
    listener: &TcpListener,
    scheme: &str,
    advertise_host: Option<&str>,
    addresses: &ServerAddresses,
) -> io::Result<ServiceAddress> {
    let local = listener.local_addr()?;
    let address = advertised(ServiceAddress::from_socket_addr(scheme, local), advertise_host);
    addresses.bind(address.clone());
    Ok(address)
}

/// 通配地址 (0.0.0.0 / [::]) 替换为 advertise_host
pub fn advertised(address: ServiceAddress, advertise_host: Option<&str>) -> ServiceAddress {
    match advertise_host.filter(|h| !h.trim().is_empty()) {
        Some(host) if address.is_unspecified() => address.with_host(host),
        _ => address,
    }
}
