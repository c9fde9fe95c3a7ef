use std::io;

use thiserror::Error;

/// A trusted network specification could not be parsed
///
/// Building a [`TrustTable`](crate::TrustTable) stops at the first entry that fails, so no
/// partially built table is ever observable.
#[derive(Debug, Error)]
#[error("invalid trusted network `{spec}`: {reason}")]
pub struct ConfigurationError {
    /// The offending entry, as configured
    pub spec: String,
    /// Why it was rejected
    #[source]
    pub reason: InvalidNetwork,
}

/// Reason a trusted network specification was rejected
#[derive(Debug, Error)]
pub enum InvalidNetwork {
    /// The entry contains a `/` but is not a valid address and prefix length
    #[error("invalid CIDR expression")]
    InvalidCidr(#[source] ipnet::AddrParseError),

    /// The entry is not a valid IPv4 or IPv6 address
    #[error("invalid IP address")]
    InvalidAddress(#[source] std::net::AddrParseError),
}

/// The peer address of a request is not a network address
#[derive(Debug, Error)]
#[error("unable to parse peer address `{addr}`")]
pub struct AddressParseError {
    /// The raw peer address, as delivered by the transport layer
    pub addr: String,
}

/// Errors raised while loading a [`Config`](crate::Config) from disk
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read configuration file")]
    Io(#[from] io::Error),

    /// The file is not valid TOML or does not match the configuration schema
    #[error("failed to parse configuration as TOML")]
    Toml(#[from] toml::de::Error),

    /// A trusted network entry is neither a CIDR prefix nor an IP address
    #[error(transparent)]
    Trust(#[from] ConfigurationError),
}
