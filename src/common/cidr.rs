//! Network construction and containment for address-based mechanisms.

use std::fmt;
use std::net::IpAddr;

use ipnet::IpNet;

/// Prefix lengths for `a` and `mx` mechanisms, written `/v4`, `//v6` or `/v4//v6`.
/// Unset lengths mean a host match (32 or 128).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DualCidr {
    pub v4: Option<u8>,
    pub v6: Option<u8>,
}

impl DualCidr {
    pub fn prefix_for(&self, addr: IpAddr) -> Option<u8> {
        match addr {
            IpAddr::V4(_) => self.v4,
            IpAddr::V6(_) => self.v6,
        }
    }
}

impl fmt::Display for DualCidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(v4) = self.v4 {
            write!(f, "/{v4}")?;
        }
        if let Some(v6) = self.v6 {
            write!(f, "//{v6}")?;
        }
        Ok(())
    }
}

pub fn max_prefix(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Network containing `addr` with the given prefix, truncated to its base
/// address. Returns None when the prefix is too long for the address family.
pub fn network_for(addr: IpAddr, prefix: Option<u8>) -> Option<IpNet> {
    let prefix = prefix.unwrap_or_else(|| max_prefix(addr));
    IpNet::new(addr, prefix).ok().map(|net| net.trunc())
}

/// One network per address. Addresses that cannot form a network are dropped.
pub fn build_networks<I>(addrs: I, cidr: DualCidr) -> Vec<IpNet>
where
    I: IntoIterator<Item = IpAddr>,
{
    addrs
        .into_iter()
        .filter_map(|addr| network_for(addr, cidr.prefix_for(addr)))
        .collect()
}

pub fn contains(networks: &[IpNet], ip: IpAddr) -> bool {
    networks.iter().any(|net| net.contains(&ip))
}

/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are treated as IPv4.
pub fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}
