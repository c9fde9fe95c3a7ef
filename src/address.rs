use std::net::SocketAddr;

use crate::resolver::Resolution;

/// Client address, host and scheme of a request, as handlers should see them
///
/// The server inserts it into the request extensions with the values received from the
/// transport; [`TrustProxy`](crate::TrustProxy) overwrites the fields it resolved when the peer
/// is a trusted proxy. Handlers and access logs read it without knowing whether a proxy was
/// involved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestAddress {
    /// Remote address, `ip:port` as received or the client address given by a proxy
    pub remote_addr: String,
    pub host: Option<String>,
    pub scheme: Option<String>,
}

impl RequestAddress {
    pub fn new(remote_addr: impl Into<String>) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            host: None,
            scheme: None,
        }
    }

    /// Capture the values a request carries before any proxy header is considered
    ///
    /// The host comes from the `Host` header, except for HTTP/2 and later where the authority
    /// of the URI is used.
    pub fn for_request<B>(peer: SocketAddr, request: &http::Request<B>) -> Self {
        let host = request
            .headers()
            .get(http::header::HOST)
            .and_then(|value| value.to_str().ok())
            // skip host header if HTTP/2, we should use :authority instead
            .filter(|_| request.version() < http::Version::HTTP_2)
            .or_else(|| request.uri().authority().map(|auth| auth.as_str()));

        Self {
            remote_addr: peer.to_string(),
            host: host.map(str::to_string),
            scheme: request.uri().scheme_str().map(str::to_string),
        }
    }

    /// Overwrite the fields a resolution provided, keep the others
    pub fn promote(&mut self, resolution: &Resolution<'_>) {
        if let Some(client) = resolution.client() {
            self.remote_addr = client.to_string();
        }

        if let Some(host) = resolution.host() {
            self.host = Some(host.to_string());
        }

        if let Some(scheme) = resolution.scheme() {
            self.scheme = Some(scheme.to_string());
        }
    }
}
