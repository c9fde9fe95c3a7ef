use std::borrow::Cow;
use std::net::IpAddr;

use tracing::{debug, error};

use crate::error::{AddressParseError, ConfigurationError};
use crate::extract::RequestHeaders;
use crate::table::TrustTable;
use crate::Config;

/// Resolves client address, host and scheme from the headers of trusted proxies
///
/// The resolver is immutable once built and can be shared between threads.
///
/// # Example
/// ```
/// use trust_proxy::{Config, Resolver};
///
/// let resolver = Resolver::new(Config::default()).unwrap();
/// let headers: &[(&str, &str)] = &[
///     ("X-Forwarded-For", "70.41.3.18, 150.172.238.178"),
///     ("X-Forwarded-Proto", "HTTPS"),
/// ];
///
/// let resolution = resolver.resolve("127.0.0.1:51000", headers).unwrap();
///
/// assert!(resolution.is_trusted());
/// assert_eq!(resolution.remote_addr(), "150.172.238.178");
/// assert_eq!(resolution.scheme(), Some("https"));
/// ```
#[derive(Debug, Clone)]
pub struct Resolver {
    table: TrustTable,
    config: Config,
}

/// Outcome of resolving a single request
///
/// Fields that were not resolved are `None`, and callers keep their existing value for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<'a> {
    pub peer: &'a str,
    pub peer_ip: IpAddr,
    pub trusted: bool,
    pub client: Option<&'a str>,
    pub host: Option<&'a str>,
    pub scheme: Option<Cow<'a, str>>,
}

impl<'a> Resolution<'a> {
    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    /// Address of the client, or the peer address as received when no proxy header applied
    pub fn remote_addr(&self) -> &'a str {
        self.client.unwrap_or(self.peer)
    }

    pub fn peer_ip(&self) -> IpAddr {
        self.peer_ip
    }

    pub fn client(&self) -> Option<&'a str> {
        self.client
    }

    pub fn host(&self) -> Option<&'a str> {
        self.host
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// Whether any field differs from what the transport delivered
    pub fn is_rewritten(&self) -> bool {
        self.client.is_some() || self.host.is_some() || self.scheme.is_some()
    }
}

/// Remove the port and IPv6 square brackets from a transport peer address
///
/// When no port can be split off, the raw value is returned and left to address parsing.
fn bare_address(peer: &str) -> &str {
    if let Some(rest) = peer.strip_prefix('[') {
        return match rest.split_once("]:") {
            Some((host, port)) if !port.contains([':', '[', ']']) => host,
            _ => peer,
        };
    }

    match peer.rsplit_once(':') {
        // more than one colon is a bare IPv6 address, not a host and port
        Some((host, _)) if !host.contains(':') => host,
        _ => peer,
    }
}

/// Transport peer address, with whether it carried an IPv6 zone
struct Peer {
    ip: IpAddr,
    zoned: bool,
}

fn parse_peer(peer: &str) -> Result<Peer, AddressParseError> {
    let err = || AddressParseError {
        addr: peer.to_string(),
    };

    let bare = bare_address(peer);
    let (addr, zone) = match bare.split_once('%') {
        Some((addr, zone)) => (addr, Some(zone)),
        None => (bare, None),
    };

    let ip = addr.parse::<IpAddr>().map_err(|_| err())?;

    match zone {
        None => Ok(Peer { ip, zoned: false }),
        // zones only qualify IPv6 addresses and cannot be empty
        Some(zone) if ip.is_ipv6() && !zone.is_empty() => Ok(Peer { ip, zoned: true }),
        Some(_) => Err(err()),
    }
}

impl Resolver {
    /// Build a resolver, replacing empty lists by their default
    ///
    /// Fails if any trusted network cannot be parsed. The error is logged here, aborting
    /// startup is up to the caller.
    pub fn new(config: Config) -> Result<Self, ConfigurationError> {
        let config = config.with_defaults();

        let table = TrustTable::build(&config.trusted_networks).inspect_err(|err| {
            error!(spec = %err.spec, error = %err, "failed to build trusted networks table");
        })?;

        debug!(
            networks = table.len(),
            ip_headers = ?config.ip_headers,
            scheme_headers = ?config.scheme_headers,
            host_headers = ?config.host_headers,
            "trusted proxy resolver ready"
        );

        Ok(Self { table, config })
    }

    pub fn table(&self) -> &TrustTable {
        &self.table
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check if a transport peer address belongs to a trusted proxy
    ///
    /// An address qualified by an IPv6 zone (`fe80::1%eth0`) is never trusted, networks carry
    /// no zone to match it against.
    pub fn is_trusted(&self, peer: &str) -> Result<bool, AddressParseError> {
        parse_peer(peer).map(|peer| self.is_peer_trusted(&peer))
    }

    fn is_peer_trusted(&self, peer: &Peer) -> bool {
        !peer.zoned && self.table.contains(&peer.ip)
    }

    /// Resolve the client address, host and scheme of a request
    ///
    /// `peer` is the address of the immediate peer as delivered by the transport, with or
    /// without a port. Headers are only read when this peer is trusted.
    pub fn resolve<'a, H>(
        &self,
        peer: &'a str,
        headers: &'a H,
    ) -> Result<Resolution<'a>, AddressParseError>
    where
        H: RequestHeaders + ?Sized,
    {
        let parsed = parse_peer(peer)?;
        let peer_ip = parsed.ip;

        if !self.is_peer_trusted(&parsed) {
            // if the peer address is not trusted, we can't trust the headers
            debug!(peer = %peer_ip, "peer is not a trusted proxy, ignoring forwarded headers");

            return Ok(Resolution {
                peer,
                peer_ip,
                trusted: false,
                client: None,
                host: None,
                scheme: None,
            });
        }

        // each proxy appends the address it received the request from, so the last entry
        // was written by the trusted peer itself
        let client = headers
            .first_header(&self.config.ip_headers)
            .and_then(|value| value.rsplit(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        let host = headers.first_header(&self.config.host_headers);

        let scheme = headers
            .first_header(&self.config.scheme_headers)
            .map(lowercase);

        debug!(
            peer = %peer_ip,
            client = ?client,
            host = ?host,
            scheme = ?scheme,
            "peer is a trusted proxy"
        );

        Ok(Resolution {
            peer,
            peer_ip,
            trusted: true,
            client,
            host,
            scheme,
        })
    }
}

fn lowercase(value: &str) -> Cow<'_, str> {
    if value.bytes().any(|b| b.is_ascii_uppercase()) {
        Cow::Owned(value.to_ascii_lowercase())
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> Resolver {
        Resolver::new(Config::default()).unwrap()
    }

    #[test]
    fn bare_address_strips_port() {
        assert_eq!(bare_address("127.0.0.1:51000"), "127.0.0.1");
        assert_eq!(bare_address("[::1]:8080"), "::1");
        assert_eq!(bare_address("::1"), "::1");
        assert_eq!(bare_address("fe80::1:80"), "fe80::1:80");
        assert_eq!(bare_address("10.0.0.1"), "10.0.0.1");
        assert_eq!(bare_address("[::1]"), "[::1]");
        assert_eq!(bare_address(""), "");
    }

    #[test]
    fn bare_address_keeps_unchecked_port() {
        // like a split of host and port, the port itself is not validated
        assert_eq!(bare_address("127.0.0.1:notaport"), "127.0.0.1");
        assert!(resolver().is_trusted("127.0.0.1:notaport").unwrap());
        assert!(resolver().is_trusted("127.0.0.1:").unwrap());
    }

    #[test]
    fn zoned_peer_is_never_trusted() {
        let headers: &[(&str, &str)] = &[("X-Forwarded-For", "9.9.9.9")];

        // fe80::/10 is trusted by default, but not once a zone qualifies the address
        for peer in ["[fe80::1%2]:8080", "fe80::1%eth0", "[fe80::1%eth0]:443"] {
            let resolution = resolver().resolve(peer, headers).unwrap();

            assert!(!resolution.is_trusted(), "{peer}");
            assert_eq!(resolution.peer_ip(), "fe80::1".parse::<IpAddr>().unwrap());
            assert_eq!(resolution.remote_addr(), peer);
        }

        let resolution = resolver().resolve("[fe80::1]:8080", headers).unwrap();
        assert!(resolution.is_trusted());
    }

    #[test]
    fn invalid_zone_is_an_error() {
        let headers: &[(&str, &str)] = &[];

        for peer in ["[fe80::1%]:8080", "127.0.0.1%eth0", "10.0.0.1%2:80"] {
            let err = resolver().resolve(peer, headers).unwrap_err();
            assert_eq!(err.addr, peer);
        }
    }

    #[test]
    fn untrusted_peer_ignores_headers() {
        let headers: &[(&str, &str)] = &[
            ("X-Forwarded-For", "9.9.9.9"),
            ("X-Forwarded-Host", "evil.example"),
            ("X-Forwarded-Proto", "https"),
        ];

        let resolution = resolver().resolve("203.0.113.5:443", headers).unwrap();

        assert!(!resolution.is_trusted());
        assert!(!resolution.is_rewritten());
        assert_eq!(resolution.remote_addr(), "203.0.113.5:443");
        assert_eq!(resolution.host(), None);
        assert_eq!(resolution.scheme(), None);
    }

    #[test]
    fn chained_forwarded_for_takes_last() {
        let headers: &[(&str, &str)] = &[("X-Forwarded-For", "70.41.3.18, 150.172.238.178")];

        let resolution = resolver().resolve("127.0.0.1:51000", headers).unwrap();

        assert!(resolution.is_trusted());
        assert_eq!(resolution.client(), Some("150.172.238.178"));
        assert_eq!(resolution.remote_addr(), "150.172.238.178");
    }

    #[test]
    fn trusted_peer_without_headers_keeps_peer() {
        let headers: &[(&str, &str)] = &[];

        let resolution = resolver().resolve("10.1.1.1:3000", headers).unwrap();

        assert!(resolution.is_trusted());
        assert!(!resolution.is_rewritten());
        assert_eq!(resolution.remote_addr(), "10.1.1.1:3000");
    }

    #[test]
    fn scheme_is_lowercased() {
        let headers: &[(&str, &str)] = &[("X-Forwarded-Proto", "HTTPS")];

        let resolution = resolver().resolve("[::1]:443", headers).unwrap();

        assert_eq!(resolution.scheme(), Some("https"));
        assert!(matches!(resolution.scheme, Some(Cow::Owned(_))));

        let headers: &[(&str, &str)] = &[("X-Forwarded-Scheme", "http")];
        let resolution = resolver().resolve("[::1]:443", headers).unwrap();

        assert!(matches!(resolution.scheme, Some(Cow::Borrowed("http"))));
    }

    #[test]
    fn host_is_taken_verbatim() {
        let headers: &[(&str, &str)] = &[("X-Forwarded-Host", "a.example, b.example")];

        let resolution = resolver().resolve("192.168.2.60:80", headers).unwrap();

        assert_eq!(resolution.host(), Some("a.example, b.example"));
    }

    #[test]
    fn header_priority_follows_config() {
        let headers: &[(&str, &str)] = &[
            ("X-Forwarded-For", "1.1.1.1"),
            ("CF-Connecting-IP", "2.2.2.2"),
            ("X-Real-IP", "3.3.3.3"),
        ];

        let resolution = resolver().resolve("127.0.0.1:1", headers).unwrap();
        assert_eq!(resolution.client(), Some("2.2.2.2"));

        let mut config = Config::default();
        config.set_ip_headers(["X-Real-IP", "X-Forwarded-For"]);
        let resolver = Resolver::new(config).unwrap();

        let resolution = resolver.resolve("127.0.0.1:1", headers).unwrap();
        assert_eq!(resolution.client(), Some("3.3.3.3"));
    }

    #[test]
    fn empty_header_value_falls_through() {
        let headers: &[(&str, &str)] = &[("CF-Connecting-IP", ""), ("X-Real-IP", "3.3.3.3")];

        let resolution = resolver().resolve("127.0.0.1:1", headers).unwrap();

        assert_eq!(resolution.client(), Some("3.3.3.3"));
    }

    #[test]
    fn empty_last_hop_keeps_peer() {
        let headers: &[(&str, &str)] = &[("X-Forwarded-For", "1.1.1.1, "), ("X-Real-IP", "3.3.3.3")];

        let resolution = resolver().resolve("127.0.0.1:1", headers).unwrap();

        assert_eq!(resolution.client(), None);
        assert_eq!(resolution.remote_addr(), "127.0.0.1:1");
    }

    #[test]
    fn unparseable_peer_is_an_error() {
        let headers: &[(&str, &str)] = &[("X-Forwarded-For", "1.1.1.1")];

        for peer in ["", ":", "localhost:80", "[::1]", "1.2.3.4:80:90"] {
            let err = resolver().resolve(peer, headers).unwrap_err();
            assert_eq!(err.addr, peer);
        }

        // fails even when nothing would be trusted
        let mut config = Config::new();
        config.trust_network("203.0.113.1");
        let err = Resolver::new(config).unwrap().resolve("nope", headers).unwrap_err();
        assert_eq!(err.addr, "nope");
    }

    #[test]
    fn peer_without_port() {
        let headers: &[(&str, &str)] = &[("X-Real-IP", "8.8.8.8")];

        let resolution = resolver().resolve("::1", headers).unwrap();
        assert_eq!(resolution.client(), Some("8.8.8.8"));

        let resolution = resolver().resolve("172.16.5.4", headers).unwrap();
        assert_eq!(resolution.client(), Some("8.8.8.8"));
    }

    #[test]
    fn invalid_network_fails_construction() {
        let mut config = Config::default();
        config.trust_network("10.0.0.0/99");

        let err = Resolver::new(config).unwrap_err();
        assert_eq!(err.spec, "10.0.0.0/99");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let resolver = Resolver::new(Config::new()).unwrap();

        assert_eq!(resolver.config(), &Config::default());
        assert!(resolver.is_trusted("127.0.0.1:80").unwrap());
        assert!(!resolver.is_trusted("8.8.8.8:80").unwrap());
    }

    #[test]
    fn idempotent() {
        let resolver = resolver();
        let headers: &[(&str, &str)] = &[
            ("X-Forwarded-For", "70.41.3.18, 150.172.238.178"),
            ("X-Forwarded-Host", "example.com"),
            ("X-Forwarded-Proto", "HTTPS"),
        ];

        let first = resolver.resolve("127.0.0.1:51000", headers).unwrap();
        let second = resolver.resolve("127.0.0.1:51000", headers).unwrap();

        assert_eq!(first, second);
    }

    #[cfg(feature = "http")]
    #[test]
    fn http_request() {
        let mut request = ::http::Request::get("/").body(()).unwrap();
        request.headers_mut().append(
            ::http::header::HeaderName::from_static("x-forwarded-for"),
            "1.1.1.1".parse().unwrap(),
        );
        request.headers_mut().append(
            ::http::header::HeaderName::from_static("x-forwarded-for"),
            "8.8.8.8".parse().unwrap(),
        );

        // 192.168.2.60 is a local ip address, so it should be trusted by default
        let resolution = resolver().resolve("192.168.2.60:4711", &request).unwrap();

        // repeated headers are not merged, the first value wins
        assert_eq!(resolution.client(), Some("1.1.1.1"));
    }
}
