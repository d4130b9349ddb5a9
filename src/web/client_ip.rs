//! Client address resolution for request logs.
//!
//! `X-Forwarded-For` is only believed when the socket peer sits inside a
//! trusted proxy range. With anonymization on, addresses are cut to their
//! /24 (IPv4) or /64 (IPv6) network before they reach the log.

use crate::config::WebConfig;
use crate::error::{AppError, AppResult};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IPv4 or IPv6 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpCidr {
    network: IpAddr,
    prefix: u8,
}

impl IpCidr {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => mask_v4(ip, self.prefix) == net,
            (IpAddr::V6(net), IpAddr::V6(ip)) => mask_v6(ip, self.prefix) == net,
            _ => false,
        }
    }
}

impl FromStr for IpCidr {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            AppError::Config(config::ConfigError::Message(format!(
                "invalid CIDR in trusted proxies: {s}"
            )))
        };

        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s.trim(), None),
        };
        let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().map_err(|_| invalid())?,
            None => max,
        };
        if prefix > max {
            return Err(invalid());
        }

        let network = match addr {
            IpAddr::V4(v4) => IpAddr::V4(mask_v4(v4, prefix)),
            IpAddr::V6(v6) => IpAddr::V6(mask_v6(v6, prefix)),
        };
        Ok(Self { network, prefix })
    }
}

fn mask_v4(ip: Ipv4Addr, prefix: u8) -> Ipv4Addr {
    let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
    Ipv4Addr::from(u32::from(ip) & mask)
}

fn mask_v6(ip: Ipv6Addr, prefix: u8) -> Ipv6Addr {
    let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
    Ipv6Addr::from(u128::from(ip) & mask)
}

/// Reduce an address to its /24 or /64 network.
pub fn anonymize(ip: IpAddr) -> IpAddr {
    match ip.to_canonical() {
        IpAddr::V4(v4) => IpAddr::V4(mask_v4(v4, 24)),
        IpAddr::V6(v6) => IpAddr::V6(mask_v6(v6, 64)),
    }
}

/// Decides which address a request is logged under.
#[derive(Debug, Clone, Default)]
pub struct ClientIpResolver {
    trusted_proxies: Vec<IpCidr>,
    anonymize: bool,
}

impl ClientIpResolver {
    pub fn new(trusted_proxies: Vec<IpCidr>, anonymize: bool) -> Self {
        Self {
            trusted_proxies,
            anonymize,
        }
    }

    /// Build from web settings. Any malformed CIDR is an error.
    pub fn from_config(web: &WebConfig) -> AppResult<Self> {
        let trusted_proxies = web
            .trusted_proxies
            .iter()
            .filter(|cidr| !cidr.trim().is_empty())
            .map(|cidr| cidr.parse())
            .collect::<AppResult<Vec<IpCidr>>>()?;
        Ok(Self::new(trusted_proxies, web.anonymize_ip))
    }

    fn is_trusted(&self, peer: IpAddr) -> bool {
        self.trusted_proxies.iter().any(|net| net.contains(peer))
    }

    /// Resolve the client address from the socket peer and `X-Forwarded-For`.
    pub fn resolve(&self, peer: Option<IpAddr>, forwarded_for: Option<&str>) -> String {
        let mut client = peer.map(|p| p.to_string());

        if let Some(peer) = peer.filter(|p| self.is_trusted(*p)) {
            let first_hop = forwarded_for
                .and_then(|xff| xff.split(',').next())
                .map(str::trim)
                .filter(|hop| !hop.is_empty());
            if let Some(hop) = first_hop {
                tracing::trace!(%peer, hop, "Using forwarded client address");
                client = Some(hop.to_string());
            }
        }

        if self.anonymize {
            return client
                .and_then(|c| c.parse::<IpAddr>().ok())
                .map(|ip| anonymize(ip).to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
        }

        client.unwrap_or_else(|| "unknown".to_string())
    }
}
