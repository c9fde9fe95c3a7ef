//! # Trust proxy
//!
//! This crate decides, per request, whether the immediate network peer is a trusted reverse
//! proxy and, only if so, promotes the client address, host and scheme it forwarded.
//!
//! ## Usage
//!
//! ```rust
//! use trust_proxy::{Config, Resolver};
//!
//! let resolver = Resolver::new(Config::default()).expect("invalid trusted networks");
//!
//! let mut request = http::Request::get("/").body(()).unwrap();
//! request.headers_mut().insert("x-forwarded-for", "70.41.3.18, 150.172.238.178".parse().unwrap());
//! request.headers_mut().insert("x-forwarded-host", "mydomain.com".parse().unwrap());
//! request.headers_mut().insert("x-forwarded-proto", "HTTPS".parse().unwrap());
//!
//! let resolution = resolver.resolve("127.0.0.1:51000", &request).unwrap();
//!
//! assert!(resolution.is_trusted());
//! assert_eq!(resolution.remote_addr(), "150.172.238.178");
//! assert_eq!(resolution.host(), Some("mydomain.com"));
//! assert_eq!(resolution.scheme(), Some("https"));
//!
//! // headers sent by anyone else are ignored
//! let resolution = resolver.resolve("203.0.113.5:443", &request).unwrap();
//!
//! assert!(!resolution.is_trusted());
//! assert_eq!(resolution.remote_addr(), "203.0.113.5:443");
//! ```
//!
//! ## Features
//!
//!  * Trusted peers are matched against IPv4 and IPv6 networks, loopback and private ranges by default.
//!  * Client address, host and scheme headers are each an ordered list, the first header present wins.
//!  * Chained `X-Forwarded-For` style values resolve to the last entry, the one appended by the trusted peer.
//!  * A [`tower`](https://docs.rs/tower) middleware, [`TrustProxyLayer`], rewrites the [`RequestAddress`] of requests.
//!
//! ## Failures
//!
//! An invalid trusted network makes [`Resolver::new`] fail: a server should refuse to start
//! rather than run with a partial allow-list. A peer address that cannot be parsed fails the
//! request with [`AddressParseError`], it is never downgraded to an untrusted peer.

mod config;
mod error;
mod extract;
mod resolver;
mod table;

#[cfg(feature = "http")]
mod address;
#[cfg(feature = "tower")]
mod layer;

pub use config::{
    Config, DEFAULT_HOST_HEADERS, DEFAULT_IP_HEADERS, DEFAULT_SCHEME_HEADERS,
    DEFAULT_TRUSTED_NETWORKS,
};
pub use error::{AddressParseError, ConfigError, ConfigurationError, InvalidNetwork};
pub use extract::RequestHeaders;
pub use resolver::{Resolution, Resolver};
pub use table::TrustTable;

#[cfg(feature = "http")]
pub use address::RequestAddress;
#[cfg(feature = "tower")]
pub use layer::{ResponseFuture, TrustProxy, TrustProxyLayer};
