//! HTTP/1.1 transport built on hyper.
//!
//! Routes are matched segment by segment; `{name}` segments capture path
//! parameters, percent-decoded before they reach the renders. A path that
//! matches no route yields 404, a path that matches only under other verbs
//! yields 405, and a captured segment that does not decode to UTF-8 yields
//! 400.
//!
//! # Example
//!
//! ```rust,ignore
//! use janus_server::{HyperTransport, TransportAdapter};
//!
//! let mut transport = HyperTransport::new();
//! transport.add_route(HttpVerb::Get, "/users/{id}", handler)?;
//! transport.start("127.0.0.1", 0).await?;
//! println!("listening on {:?}", transport.local_addr());
//! transport.stop().await;
//! ```

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::string::FromUtf8Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use janus_core::{HttpRequest, HttpVerb, JanusError, JanusResult, Params, Reply};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::error::{ServerError, ServerResult};
use crate::shutdown::{InFlightTracker, ShutdownSignal};
use crate::transport::{RouteHandler, TransportAdapter};

/// A segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

fn parse_segments(pattern: &str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(s.to_string()),
        })
        .collect()
}

struct Route {
    verb: HttpVerb,
    pattern: String,
    segments: Vec<Segment>,
    handler: RouteHandler,
}

impl Route {
    fn match_path(&self, path: &str) -> Option<Params> {
        let actual: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if actual.len() != self.segments.len() {
            return None;
        }

        let mut params = Params::new();
        for (segment, value) in self.segments.iter().zip(actual) {
            match segment {
                Segment::Literal(expected) if expected == value => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.push(name.clone(), value),
            }
        }
        Some(params)
    }
}

fn decode_params(raw: &Params) -> Result<Params, FromUtf8Error> {
    raw.iter()
        .map(|(name, value)| Ok((name.to_string(), urlencoding::decode(value)?.into_owned())))
        .collect()
}

enum Lookup<'a> {
    Found(&'a RouteHandler, Params),
    MethodNotAllowed,
    NotFound,
}

#[derive(Default)]
struct Router {
    routes: Vec<Route>,
}

impl Router {
    fn add(&mut self, verb: HttpVerb, pattern: &str, handler: RouteHandler) -> JanusResult<()> {
        let segments = parse_segments(pattern);
        if let Some(existing) = self
            .routes
            .iter()
            .find(|r| r.verb == verb && r.segments == segments)
        {
            return Err(JanusError::config(format!(
                "route {verb} {pattern} conflicts with {}",
                existing.pattern
            )));
        }
        self.routes.push(Route {
            verb,
            pattern: pattern.to_string(),
            segments,
            handler,
        });
        Ok(())
    }

    fn lookup(&self, verb: Option<HttpVerb>, path: &str) -> Lookup<'_> {
        let mut path_matched = false;
        for route in &self.routes {
            if let Some(params) = route.match_path(path) {
                if Some(route.verb) == verb {
                    return Lookup::Found(&route.handler, params);
                }
                path_matched = true;
            }
        }
        if path_matched {
            Lookup::MethodNotAllowed
        } else {
            Lookup::NotFound
        }
    }

    async fn respond(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        let (parts, body) = request.into_parts();
        let verb = HttpVerb::from_method(&parts.method);

        let (handler, params) = match self.lookup(verb, parts.uri.path()) {
            Lookup::Found(handler, params) => (Arc::clone(handler), params),
            Lookup::MethodNotAllowed => {
                return plain_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
            }
            Lookup::NotFound => return plain_error(StatusCode::NOT_FOUND, "not found"),
        };
        let Ok(params) = decode_params(&params) else {
            return plain_error(StatusCode::BAD_REQUEST, "invalid path encoding");
        };

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read request body");
                return plain_error(StatusCode::BAD_REQUEST, "failed to read request body");
            }
        };

        let request = HttpRequest::new(parts.method, parts.uri, parts.headers, body, params);
        into_response(handler(request).await)
    }
}

fn into_response(reply: Reply) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(reply.body));
    *response.status_mut() = reply.status;
    *response.headers_mut() = reply.headers;
    response
}

fn plain_error(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    into_response(Reply::json(
        status,
        &json!({"code": status.as_u16(), "msg": message}),
    ))
}

struct Running {
    addr: SocketAddr,
    shutdown: ShutdownSignal,
    connections: InFlightTracker,
    accept_loop: JoinHandle<()>,
}

/// HTTP/1.1 transport adapter.
pub struct HyperTransport {
    router: Router,
    live: Option<Arc<Router>>,
    shutdown_timeout: Duration,
    running: Option<Running>,
}

impl HyperTransport {
    /// Creates a transport with a 30 second drain timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            router: Router::default(),
            live: None,
            shutdown_timeout: Duration::from_secs(30),
            running: None,
        }
    }

    /// Sets how long [`stop`](TransportAdapter::stop) waits for open
    /// connections.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.live
            .as_ref()
            .map_or(self.router.routes.len(), |live| live.routes.len())
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport")
            .field("routes", &self.route_count())
            .field("local_addr", &self.local_addr())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

#[async_trait]
impl TransportAdapter for HyperTransport {
    fn add_route(&mut self, verb: HttpVerb, path: &str, handler: RouteHandler) -> JanusResult<()> {
        if self.live.is_some() {
            return Err(JanusError::config("cannot add routes to a started transport"));
        }
        self.router.add(verb, path, handler)
    }

    async fn start(&mut self, host: &str, port: u16) -> ServerResult<()> {
        if self.running.is_some() {
            return Err(ServerError::InvalidState {
                operation: "start",
                state: "running".to_string(),
            });
        }

        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: format!("{host}:{port}"),
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: format!("{host}:{port}"),
            source,
        })?;

        let router = Arc::new(std::mem::take(&mut self.router));
        self.live = Some(Arc::clone(&router));

        let shutdown = ShutdownSignal::new();
        let connections = InFlightTracker::new();
        let accept_loop = tokio::spawn(accept_loop(
            listener,
            router,
            shutdown.clone(),
            connections.clone(),
        ));

        tracing::info!(%addr, "http transport listening");
        self.running = Some(Running {
            addr,
            shutdown,
            connections,
            accept_loop,
        });
        Ok(())
    }

    async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.shutdown.trigger();
        if let Err(e) = running.accept_loop.await {
            tracing::error!(error = %e, "accept loop failed");
        }

        tracing::info!(
            connections = running.connections.active(),
            timeout = ?self.shutdown_timeout,
            "draining http connections"
        );
        if tokio::time::timeout(self.shutdown_timeout, running.connections.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                connections = running.connections.active(),
                "shutdown timeout reached with connections still open"
            );
        }
        tracing::info!(addr = %running.addr, "http transport stopped");
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }
}

async fn accept_loop(
    listener: TcpListener,
    router: Arc<Router>,
    shutdown: ShutdownSignal,
    connections: InFlightTracker,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, remote)) => {
                    let guard = connections.acquire();
                    let router = Arc::clone(&router);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        serve_connection(stream, remote, router, shutdown).await;
                        drop(guard);
                    });
                }
                Err(e) => tracing::error!(error = %e, "failed to accept connection"),
            },
            () = shutdown.recv() => {
                tracing::debug!("accept loop stopping");
                break;
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    router: Arc<Router>,
    shutdown: ShutdownSignal,
) {
    let service = service_fn(move |request: Request<Incoming>| {
        let router = Arc::clone(&router);
        async move { Ok::<_, Infallible>(router.respond(request).await) }
    });

    let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        () = shutdown.recv() => {
            tracing::debug!(%remote, "closing connection for shutdown");
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };
    if let Err(e) = result {
        tracing::debug!(%remote, error = %e, "connection error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    fn handler(tag: &'static str) -> RouteHandler {
        Arc::new(move |request: HttpRequest| {
            let id = request.path_params().get("id").map(ToString::to_string);
            async move { Reply::json(StatusCode::OK, &json!({"tag": tag, "id": id})) }.boxed()
        })
    }

    #[test]
    fn test_parse_segments() {
        assert_eq!(
            parse_segments("/users/{id}/"),
            vec![
                Segment::Literal("users".into()),
                Segment::Param("id".into())
            ]
        );
        assert!(parse_segments("/").is_empty());
    }

    #[test]
    fn test_lookup() {
        let mut router = Router::default();
        router.add(HttpVerb::Get, "/users/{id}", handler("get")).unwrap();
        router.add(HttpVerb::Post, "/users", handler("post")).unwrap();

        match router.lookup(Some(HttpVerb::Get), "/users/42") {
            Lookup::Found(_, params) => assert_eq!(params.get("id"), Some("42")),
            _ => panic!("expected a match"),
        }
        assert!(matches!(
            router.lookup(Some(HttpVerb::Delete), "/users/42"),
            Lookup::MethodNotAllowed
        ));
        assert!(matches!(router.lookup(Some(HttpVerb::Get), "/orders"), Lookup::NotFound));
        assert!(matches!(router.lookup(None, "/users"), Lookup::MethodNotAllowed));
    }

    #[test]
    fn test_decode_params() {
        let mut raw = Params::new();
        raw.push("id", "a%20b");
        raw.push("tag", "caf%C3%A9+x");
        let decoded = decode_params(&raw).unwrap();
        assert_eq!(decoded.get("id"), Some("a b"));
        assert_eq!(decoded.get("tag"), Some("café+x"));

        let mut bad = Params::new();
        bad.push("id", "%FF");
        assert!(decode_params(&bad).is_err());
    }

    #[test]
    fn test_conflicting_patterns_rejected() {
        let mut router = Router::default();
        router.add(HttpVerb::Get, "/users/{id}", handler("a")).unwrap();
        assert!(router.add(HttpVerb::Get, "/users/{id}/", handler("b")).is_err());
        assert!(router.add(HttpVerb::Put, "/users/{id}", handler("c")).is_ok());
    }

    #[tokio::test]
    async fn test_start_stop_ephemeral_port() {
        let mut transport = HyperTransport::new().with_shutdown_timeout(Duration::from_secs(1));
        transport.add_route(HttpVerb::Get, "/ping", handler("ping")).unwrap();
        transport.start("127.0.0.1", 0).await.unwrap();

        let addr = transport.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(transport.add_route(HttpVerb::Get, "/late", handler("late")).is_err());

        transport.stop().await;
        assert!(transport.local_addr().is_none());
    }
}
