//! Resolution of this node's own address, used to recognise our own
//! broadcasts when they loop back.

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("failed to enumerate local addresses: {0}")]
    Interfaces(#[from] local_ip_address::Error),
    #[error("no local interface address inside {0}")]
    NoAddressInNetwork(IpNetwork),
}

/// With `network`, the first non-loopback interface address inside it;
/// otherwise the host's primary local address.
pub fn resolve_local_ip(network: Option<&IpNetwork>) -> Result<IpAddr, NetError> {
    match network {
        Some(net) => {
            let interfaces = local_ip_address::list_afinet_netifas()?;
            select_in_network(&interfaces, net).ok_or(NetError::NoAddressInNetwork(*net))
        }
        None => Ok(local_ip_address::local_ip()?),
    }
}

fn select_in_network(interfaces: &[(String, IpAddr)], network: &IpNetwork) -> Option<IpAddr> {
    interfaces
        .iter()
        .map(|(_, ip)| *ip)
        .filter(|ip| !ip.is_loopback())
        .find(|ip| network.contains(*ip))
}
