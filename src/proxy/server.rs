//! HTTP reverse-proxy server.
//!
//! One `ProxyServer` per advertised service: it accepts HTTP/1 connections on
//! its listen address and forwards each request to the route target through a
//! shared HTTP client. Shutdown is a oneshot signal into the accept loop.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use url::Url;

use crate::config::ServiceConfig;
use crate::proxy::error::{ProxyError, Result};
use crate::proxy::{ProxyFactory, ProxyHandle};

/// State shared across proxy connections.
struct ProxyState {
    service: ServiceConfig,
    /// Target with any trailing slash removed, validated at start.
    target_base: String,
    /// Shared HTTP client for forwarding requests.
    http_client: reqwest::Client,
}

/// Reverse proxy for a single service.
pub struct ProxyServer {
    service: ServiceConfig,
    listen_host: String,
    addr: RwLock<Option<SocketAddr>>,
    shutdown_tx: RwLock<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl ProxyServer {
    /// Create a proxy for a service. Nothing is bound until [`ProxyHandle::start`].
    pub fn new(service: ServiceConfig, listen_host: impl Into<String>) -> Self {
        Self {
            service,
            listen_host: listen_host.into(),
            addr: RwLock::new(None),
            shutdown_tx: RwLock::new(None),
        }
    }

    /// The bound listen address, once started.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.addr.read().await
    }
}

#[async_trait::async_trait]
impl ProxyHandle for ProxyServer {
    async fn start(&self) -> Result<()> {
        // Validate the target before acquiring anything.
        Url::parse(&self.service.target).map_err(|e| ProxyError::InvalidTarget {
            target: self.service.target.clone(),
            reason: e.to_string(),
        })?;

        let bind_addr = self
            .service
            .listen_addr
            .clone()
            .unwrap_or_else(|| format!("{}:0", self.listen_host));

        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ProxyError::Bind {
                addr: bind_addr.clone(),
                reason: e.to_string(),
            })?;
        let addr = listener.local_addr().map_err(ProxyError::Io)?;
        *self.addr.write().await = Some(addr);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        *self.shutdown_tx.write().await = Some(shutdown_tx);

        let state = Arc::new(ProxyState {
            target_base: self.service.target.trim_end_matches('/').to_string(),
            service: self.service.clone(),
            http_client: reqwest::Client::new(),
        });

        let node_name = self.service.node_name.clone();
        let loop_state = state.clone();
        tokio::spawn(async move {
            tracing::info!(
                "Proxy '{}' listening on {} -> {}",
                node_name,
                addr,
                loop_state.target_base
            );

            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, peer)) => {
                                let io = TokioIo::new(stream);
                                let state = loop_state.clone();

                                tokio::spawn(async move {
                                    let service = service_fn(move |req| {
                                        let state = state.clone();
                                        async move { forward_request(req, peer, state).await }
                                    });

                                    if let Err(e) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        tracing::debug!("Proxy connection error: {}", e);
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::error!("Proxy accept error on {}: {}", addr, e);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::info!("Proxy '{}' on {} shutting down", node_name, addr);
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        // A handle that was never started, or was already stopped, has no
        // sender here; stopping it is a no-op.
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
        }
        Ok(())
    }

    fn node_name(&self) -> &str {
        &self.service.node_name
    }

    fn target(&self) -> &str {
        &self.service.target
    }
}

/// Builds [`ProxyServer`] handles that bind on a fixed listen host.
pub struct HttpProxyFactory {
    listen_host: String,
}

impl HttpProxyFactory {
    /// Create a factory binding proxies on `listen_host`.
    pub fn new(listen_host: impl Into<String>) -> Self {
        Self {
            listen_host: listen_host.into(),
        }
    }
}

impl ProxyFactory for HttpProxyFactory {
    fn create(&self, service: ServiceConfig) -> Arc<dyn ProxyHandle> {
        Arc::new(ProxyServer::new(service, self.listen_host.clone()))
    }
}

/// Forward one request to the route target.
async fn forward_request(
    req: Request<hyper::body::Incoming>,
    peer: SocketAddr,
    state: Arc<ProxyState>,
) -> std::result::Result<Response<BoxBody<Bytes, Infallible>>, Infallible> {
    let method = req.method().clone();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let upstream_url = format!("{}{}", state.target_base, path_and_query);

    let mut builder = state.http_client.request(
        reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET),
        &upstream_url,
    );

    // Copy headers, except hop-by-hop and the ones we rewrite below.
    let incoming_host = req
        .headers()
        .get(hyper::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let incoming_xff = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    for (name, value) in req.headers() {
        let lower = name.as_str().to_ascii_lowercase();
        if is_hop_by_hop_header(&lower)
            || lower == "host"
            || lower == "x-forwarded-for"
            || lower == "x-forwarded-proto"
        {
            continue;
        }
        if let Ok(v) = value.to_str() {
            builder = builder.header(name.as_str(), v);
        }
    }

    if state.service.pass_host_header {
        if let Some(host) = incoming_host {
            builder = builder.header("Host", host);
        }
    }

    // Fail safe: inbound forwarding headers are only honored when the service
    // opted in; otherwise the chain restarts at this proxy.
    let forwarded_for = match (state.service.trust_forward_header, incoming_xff) {
        (true, Some(existing)) => format!("{}, {}", existing, peer.ip()),
        _ => peer.ip().to_string(),
    };
    builder = builder
        .header("X-Forwarded-For", forwarded_for)
        .header("X-Forwarded-Proto", "http");

    let body_bytes = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::error!("Proxy: failed to read request body: {}", e);
            return Ok(error_response(
                StatusCode::BAD_REQUEST,
                "Failed to read body".to_string(),
            ));
        }
    };
    if !body_bytes.is_empty() {
        builder = builder.body(body_bytes.to_vec());
    }

    match builder.send().await {
        Ok(response) => {
            let status = response.status();
            let headers = response.headers().clone();

            match response.bytes().await {
                Ok(body) => {
                    let mut resp_builder = Response::builder().status(status.as_u16());
                    for (name, value) in headers.iter() {
                        if !is_hop_by_hop_header(name.as_str()) {
                            resp_builder = resp_builder.header(name.as_str(), value.as_bytes());
                        }
                    }
                    Ok(make_response_from_builder(resp_builder, full_body(body)))
                }
                Err(e) => {
                    tracing::error!("Proxy: failed to read upstream body: {}", e);
                    Ok(error_response(
                        StatusCode::BAD_GATEWAY,
                        "Failed to read upstream response".to_string(),
                    ))
                }
            }
        }
        Err(e) => {
            tracing::error!("Proxy: upstream request to {} failed: {}", upstream_url, e);
            Ok(error_response(
                StatusCode::BAD_GATEWAY,
                format!("Upstream request failed: {e}"),
            ))
        }
    }
}

/// Check if a header is hop-by-hop (should not be forwarded).
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Finalize a partially-built response, falling back to 500 on builder error.
fn make_response_from_builder(
    builder: hyper::http::response::Builder,
    body: BoxBody<Bytes, Infallible>,
) -> Response<BoxBody<Bytes, Infallible>> {
    builder.body(body).unwrap_or_else(|_| {
        let mut resp = Response::new(full_body(Bytes::from("Internal error")));
        *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        resp
    })
}

/// Create an error response.
fn error_response(status: StatusCode, message: String) -> Response<BoxBody<Bytes, Infallible>> {
    make_response_from_builder(
        Response::builder()
            .status(status)
            .header("Content-Type", "text/plain"),
        full_body(Bytes::from(message)),
    )
}

/// Create a body from bytes.
fn full_body(bytes: Bytes) -> BoxBody<Bytes, Infallible> {
    Full::new(bytes).map_err(|_| unreachable!()).boxed()
}
