use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::sync::Arc;

use http::header::{HeaderValue, HOST};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{Request, Response, StatusCode, Uri};
use pin_project_lite::pin_project;
use tower_layer::Layer;
use tower_service::Service;
use tracing::warn;

use crate::error::{AddressParseError, ConfigurationError};
use crate::{Config, RequestAddress, Resolver};

/// Layer applying [`TrustProxy`] to a service
///
/// All services created by the layer share a single [`Resolver`].
///
/// # Example
/// ```
/// use trust_proxy::{Config, TrustProxyLayer};
///
/// let layer = TrustProxyLayer::new(Config::default()).expect("invalid trusted networks");
/// ```
#[derive(Debug, Clone)]
pub struct TrustProxyLayer {
    resolver: Arc<Resolver>,
}

impl TrustProxyLayer {
    pub fn new(config: Config) -> Result<Self, ConfigurationError> {
        Ok(Self::from_resolver(Resolver::new(config)?))
    }

    pub fn from_resolver(resolver: Resolver) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }
}

impl<S> Layer<S> for TrustProxyLayer {
    type Service = TrustProxy<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TrustProxy {
            inner,
            resolver: Arc::clone(&self.resolver),
        }
    }
}

/// Middleware promoting proxy headers into the [`RequestAddress`] of requests
///
/// The peer is read from the [`RequestAddress`] extension. When it is a trusted proxy, the
/// resolved client address, host and scheme overwrite that extension. The resolved host also
/// replaces the `Host` header, and the resolved scheme is set on the request URI, which becomes
/// absolute. The extension stays the canonical place to read all three: a URI can only carry a
/// scheme together with an authority, so it keeps its original form when the request has no
/// host to build one from. Requests from other peers pass through untouched.
///
/// A request whose peer address cannot be parsed, or that carries no [`RequestAddress`], is
/// answered with `500 Internal Server Error` and never reaches the inner service.
#[derive(Debug, Clone)]
pub struct TrustProxy<S> {
    inner: S,
    resolver: Arc<Resolver>,
}

impl<S> TrustProxy<S> {
    pub fn new(inner: S, resolver: Arc<Resolver>) -> Self {
        Self { inner, resolver }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn promote<B>(&self, request: &mut Request<B>) -> Result<(), AddressParseError> {
        let mut address = request
            .extensions()
            .get::<RequestAddress>()
            .cloned()
            .unwrap_or_default();
        let peer = address.remote_addr.clone();

        let resolution = self.resolver.resolve(&peer, request.headers())?;

        if !resolution.is_rewritten() {
            return Ok(());
        }

        let host = resolution
            .host()
            .and_then(|host| HeaderValue::from_str(host).ok());
        let scheme = resolution
            .scheme()
            .and_then(|scheme| scheme.parse::<Scheme>().ok());
        address.promote(&resolution);

        if let Some(host) = host {
            request.headers_mut().insert(HOST, host);
        }

        if let Some(scheme) = scheme {
            if let Some(uri) = with_scheme(request.uri(), scheme, address.host.as_deref()) {
                *request.uri_mut() = uri;
            }
        }

        request.extensions_mut().insert(address);

        Ok(())
    }
}

/// Rebuild a request URI with a new scheme
///
/// The request host becomes the authority, the existing one is kept when the host is not a
/// valid authority. Returns `None` when no absolute URI can be built.
fn with_scheme(uri: &Uri, scheme: Scheme, host: Option<&str>) -> Option<Uri> {
    let mut parts = uri.clone().into_parts();

    if let Some(authority) = host.and_then(|host| host.parse::<Authority>().ok()) {
        parts.authority = Some(authority);
    }

    if parts.authority.is_none() {
        return None;
    }

    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }

    parts.scheme = Some(scheme);

    Uri::from_parts(parts).ok()
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TrustProxy<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Default,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, ResBody>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        if let Err(err) = self.promote(&mut request) {
            warn!(ip = %err.addr, error = %err, "rejecting request from unparseable peer address");

            let mut response = Response::new(ResBody::default());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;

            return ResponseFuture::Rejected {
                response: Some(response),
            };
        }

        ResponseFuture::Inner {
            future: self.inner.call(request),
        }
    }
}

pin_project! {
    /// Response future of [`TrustProxy`]
    #[project = ResponseFutureProj]
    pub enum ResponseFuture<F, B> {
        Inner {
            #[pin]
            future: F,
        },
        Rejected {
            response: Option<Response<B>>,
        },
    }
}

impl<F, B, E> Future for ResponseFuture<F, B>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<B>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            ResponseFutureProj::Inner { future } => future.poll(cx),
            ResponseFutureProj::Rejected { response } => {
                Poll::Ready(Ok(response.take().expect("future polled after completion")))
            }
        }
    }
}
