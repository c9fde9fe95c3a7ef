use core::net::IpAddr;

use ipnet::IpNet;

use crate::error::{ConfigurationError, InvalidNetwork};

/// Immutable set of trusted networks
///
/// Built once from textual specifications, then only queried. Each entry is either a CIDR
/// block (`10.0.0.0/8`, `fd00::/8`) or a single address, which is stored as a host network
/// (`/32` or `/128`).
///
/// # Example
/// ```
/// use trust_proxy::TrustTable;
///
/// let table = TrustTable::build(["10.0.0.0/8", "::1"]).unwrap();
///
/// assert!(table.contains(&"10.1.2.3".parse().unwrap()));
/// assert!(!table.contains(&"11.1.2.3".parse().unwrap()));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustTable {
    networks: Vec<IpNet>,
}

impl TrustTable {
    /// Parse every specification, in order
    ///
    /// Fails on the first entry that cannot be parsed and returns no table at all.
    pub fn build<I, S>(specs: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let networks = specs
            .into_iter()
            .map(|spec| parse_network(spec.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { networks })
    }

    /// Check if an address falls in any trusted network
    ///
    /// Address families never cross: an IPv4 address is not matched by an IPv6 network, even
    /// an IPv4-mapped one.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        for network in &self.networks {
            if network.contains(addr) {
                return true;
            }
        }

        false
    }

    /// Trusted networks, in configuration order
    pub fn networks(&self) -> &[IpNet] {
        &self.networks
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

fn parse_network(spec: &str) -> Result<IpNet, ConfigurationError> {
    let parsed = if spec.contains('/') {
        spec.parse::<IpNet>().map_err(InvalidNetwork::InvalidCidr)
    } else {
        spec.parse::<IpAddr>()
            .map(IpNet::from)
            .map_err(InvalidNetwork::InvalidAddress)
    };

    parsed.map_err(|reason| ConfigurationError {
        spec: spec.to_string(),
        reason,
    })
}
