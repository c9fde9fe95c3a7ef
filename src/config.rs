use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::table::TrustTable;

/// Networks trusted when none are configured
pub const DEFAULT_TRUSTED_NETWORKS: &[&str] = &[
    // IPV4 Loopback
    "127.0.0.0/8",
    // IPV4 Private Networks
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    // IPV4 Shared address space (carrier-grade NAT)
    "100.64.0.0/10",
    // IPV4 Link-local
    "169.254.0.0/16",
    // IPV6 Loopback
    "::1",
    // IPV6 Unique local
    "fc00::/7",
    // IPV6 Link-local
    "fe80::/10",
];

/// Headers carrying the client address, by priority
pub const DEFAULT_IP_HEADERS: &[&str] = &[
    "Fastly-Client-IP",
    "CF-Connecting-IP",
    "X-Envoy-External-Address",
    "X-Forwarded-For",
    "X-Real-IP",
    "True-Client-IP",
];

/// Headers carrying the original scheme, by priority
pub const DEFAULT_SCHEME_HEADERS: &[&str] = &["X-Forwarded-Proto", "X-Forwarded-Scheme"];

/// Headers carrying the original host, by priority
pub const DEFAULT_HOST_HEADERS: &[&str] = &["X-Forwarded-Host"];

/// Config for the trusted proxy resolver
///
/// By default, it trusts loopback, private, shared and link-local networks for both address
/// families, and reads the header conventions of the common CDNs and edge proxies.
///
/// Every list is ordered. Header lists are scanned in order and the first header present with
/// a non empty value wins. A list left empty is replaced by its default when the
/// [`Resolver`](crate::Resolver) is built.
///
/// # Example
/// ```
/// use trust_proxy::Config;
///
/// let mut config = Config::default();
/// config.trust_network("203.0.113.0/24");
/// config.set_ip_headers(["CF-Connecting-IP"]);
/// ```
///
/// Configuration can also be loaded from TOML:
///
/// ```toml
/// trusted_networks = ["10.0.0.0/8", "::1"]
/// ip_headers = ["X-Forwarded-For"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub trusted_networks: Vec<String>,
    pub ip_headers: Vec<String>,
    pub scheme_headers: Vec<String>,
    pub host_headers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trusted_networks: to_owned(DEFAULT_TRUSTED_NETWORKS),
            ip_headers: to_owned(DEFAULT_IP_HEADERS),
            scheme_headers: to_owned(DEFAULT_SCHEME_HEADERS),
            host_headers: to_owned(DEFAULT_HOST_HEADERS),
        }
    }
}

impl Config {
    /// Create a config with every list empty, so that defaults apply unless overridden
    pub fn new() -> Self {
        Self {
            trusted_networks: Vec::new(),
            ip_headers: Vec::new(),
            scheme_headers: Vec::new(),
            host_headers: Vec::new(),
        }
    }

    /// Parse a TOML document and check that every trusted network is valid
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;

        Ok(config)
    }

    /// Read and parse a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;

        Self::from_toml_str(&content)
    }

    /// Add a trusted network
    ///
    /// network can be an IP address or a CIDR, it is parsed when the resolver is built
    pub fn trust_network(&mut self, network: impl Into<String>) {
        self.trusted_networks.push(network.into());
    }

    /// Replace the client address headers
    pub fn set_ip_headers<I, S>(&mut self, headers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ip_headers = headers.into_iter().map(Into::into).collect();
    }

    /// Replace the scheme headers
    pub fn set_scheme_headers<I, S>(&mut self, headers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scheme_headers = headers.into_iter().map(Into::into).collect();
    }

    /// Replace the host headers
    pub fn set_host_headers<I, S>(&mut self, headers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.host_headers = headers.into_iter().map(Into::into).collect();
    }

    /// Replace every empty list by its default
    pub fn with_defaults(mut self) -> Self {
        fill(&mut self.trusted_networks, DEFAULT_TRUSTED_NETWORKS);
        fill(&mut self.ip_headers, DEFAULT_IP_HEADERS);
        fill(&mut self.scheme_headers, DEFAULT_SCHEME_HEADERS);
        fill(&mut self.host_headers, DEFAULT_HOST_HEADERS);

        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let networks = if self.trusted_networks.is_empty() {
            to_owned(DEFAULT_TRUSTED_NETWORKS)
        } else {
            self.trusted_networks.clone()
        };

        TrustTable::build(networks)?;

        Ok(())
    }
}

fn to_owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn fill(values: &mut Vec<String>, defaults: &[&str]) {
    if values.is_empty() {
        *values = to_owned(defaults);
    }
}
