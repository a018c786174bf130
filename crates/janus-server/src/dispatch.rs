//! Request dispatch.
//!
//! One [`Endpoint`] is built per `(verb, uri)` pair. Handling a request:
//!
//! 1. builds a [`TraceContext`] from the inbound trace headers,
//! 2. runs the request render to obtain raw kwargs,
//! 3. coerces them with the method's cached plan,
//! 4. invokes the target, awaited inline or offloaded to the worker pool,
//! 5. runs the response render on the return value.
//!
//! Any failure in steps 2 to 5 is handed to the error render, which is the
//! single place errors are translated into replies. Steps 2 to 5 run inside
//! the context's task-local scope, which ends with the request whatever the
//! outcome.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use http::HeaderValue;
use janus_core::{HttpRequest, HttpVerb, JanusError, JanusResult, Reply, TraceContext, REQUEST_ID_HEADER};
use janus_render::{ErrorRender, Renders, RequestRender, ResponseRender};
use janus_telemetry::logging::fields;
use serde_json::Value;
use tracing::Instrument;

use crate::pool::WorkerPool;
use crate::service::Method;
use crate::transport::{RouteHandler, RpcHandler, RpcRequest};

/// Dispatches HTTP requests to one method.
pub struct Endpoint {
    method: Arc<Method>,
    request: RequestRender,
    response: ResponseRender,
    error: ErrorRender,
    pool: WorkerPool,
    trace_headers: Arc<[String]>,
}

impl Endpoint {
    /// Resolves the method's renders and binds it to `pool`.
    ///
    /// Fails with `UnknownRender` if a render key is not registered.
    pub fn new(
        method: Arc<Method>,
        renders: &Renders,
        pool: WorkerPool,
        trace_headers: Arc<[String]>,
    ) -> JanusResult<Self> {
        let route = method.route();
        Ok(Self {
            request: Arc::clone(renders.request.get(&route.request_render)?),
            response: Arc::clone(renders.response.get(&route.response_render)?),
            error: Arc::clone(renders.error.get(&route.error_render)?),
            method,
            pool,
            trace_headers,
        })
    }

    /// Returns the bound method.
    #[must_use]
    pub fn method(&self) -> &Arc<Method> {
        &self.method
    }

    /// Handles one request. Never fails: errors become error replies.
    pub async fn handle(&self, request: HttpRequest) -> Reply {
        let started = Instant::now();
        let context = TraceContext::from_headers(request.headers(), &self.trace_headers[..]);
        let request_id = context.request_id().to_string();
        let route = self.method.qualified_name();

        let span = tracing::info_span!(
            "dispatch",
            { fields::REQUEST_ID } = %request_id,
            { fields::ROUTE } = %route,
            { fields::HTTP_METHOD } = %request.method(),
            { fields::HTTP_PATH } = %request.path(),
        );

        let mut reply = context
            .scope(async {
                match self.dispatch(request).await {
                    Ok(reply) => reply,
                    Err(err) => (self.error)(&err),
                }
            })
            .instrument(span)
            .await;

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            reply.headers.insert(REQUEST_ID_HEADER, value);
        }

        let elapsed = started.elapsed();
        tracing::debug!(
            { fields::REQUEST_ID } = %request_id,
            { fields::ROUTE } = %route,
            { fields::HTTP_STATUS } = reply.status.as_u16(),
            { fields::DURATION_MS } = elapsed.as_secs_f64() * 1000.0,
            "request dispatched"
        );
        janus_telemetry::record_request(route, reply.status.as_u16(), elapsed);
        reply
    }

    async fn dispatch(&self, request: HttpRequest) -> JanusResult<Reply> {
        let raw = (self.request)(Arc::new(request)).await?;
        let value = self.method.invoke(raw, &self.pool).await?;
        (self.response)(value)
    }

    /// Wraps this endpoint as a transport route handler.
    #[must_use]
    pub fn into_handler(self: Arc<Self>) -> RouteHandler {
        Arc::new(move |request| {
            let endpoint = Arc::clone(&self);
            async move { endpoint.handle(request).await }.boxed()
        })
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("method", &self.method.qualified_name())
            .field("route", self.method.route())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// Builds the RPC handler of `method`.
///
/// RPC calls skip the HTTP renders: kwargs are coerced and the target is
/// invoked inside a trace scope built from the call metadata.
#[must_use]
pub fn rpc_handler(method: Arc<Method>, pool: WorkerPool, trace_headers: Arc<[String]>) -> RpcHandler {
    Arc::new(move |call: RpcRequest| {
        let method = Arc::clone(&method);
        let pool = pool.clone();
        let context = TraceContext::from_headers(&call.metadata, &trace_headers[..]);
        async move {
            let span = tracing::info_span!(
                "rpc",
                { fields::REQUEST_ID } = %context.request_id(),
                { fields::ROUTE } = %method.qualified_name(),
            );
            let result: JanusResult<Value> = context
                .scope(async { method.invoke(call.kwargs, &pool).await })
                .instrument(span)
                .await;
            if let Err(err) = &result {
                if !err.kind().is_public() {
                    tracing::error!({ fields::ROUTE } = %method.qualified_name(), error = %err.chain_text(), "rpc call failed");
                }
            }
            result
        }
        .boxed()
    })
}

/// Introspection record of one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// HTTP verb.
    pub verb: HttpVerb,
    /// URI path.
    pub uri: String,
    /// Qualified method name.
    pub method: String,
    /// Request render key.
    pub request_render: String,
    /// Response render key.
    pub response_render: String,
    /// Error render key.
    pub error_render: String,
}

/// One bound route.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    /// The route's description.
    pub info: RouteInfo,
    /// The endpoint serving it.
    pub endpoint: Arc<Endpoint>,
}

/// The immutable set of bound routes, in binding order.
#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
    index: HashMap<(HttpVerb, String), usize>,
}

impl RouteTable {
    /// Binds every HTTP-enabled method, one entry per verb.
    ///
    /// Fails with `DuplicateRoute` if two methods claim the same
    /// `(verb, uri)` pair, and with `UnknownRender` if a method selects a
    /// render that is not registered.
    pub fn build<'a>(
        methods: impl IntoIterator<Item = &'a Arc<Method>>,
        renders: &Renders,
        pool: &WorkerPool,
        trace_headers: &Arc<[String]>,
    ) -> JanusResult<Self> {
        let mut table = Self::default();
        for method in methods.into_iter().filter(|m| m.http_enabled()) {
            let endpoint = Arc::new(Endpoint::new(
                Arc::clone(method),
                renders,
                pool.clone(),
                Arc::clone(trace_headers),
            )?);
            let route = method.route();
            for verb in &route.verbs {
                table.insert(RouteEntry {
                    info: RouteInfo {
                        verb: *verb,
                        uri: route.uri.clone(),
                        method: method.qualified_name().to_string(),
                        request_render: route.request_render.clone(),
                        response_render: route.response_render.clone(),
                        error_render: route.error_render.clone(),
                    },
                    endpoint: Arc::clone(&endpoint),
                })?;
            }
        }
        Ok(table)
    }

    fn insert(&mut self, entry: RouteEntry) -> JanusResult<()> {
        let key = (entry.info.verb, entry.info.uri.clone());
        if let Some(&existing) = self.index.get(&key) {
            return Err(JanusError::DuplicateRoute {
                verb: entry.info.verb.to_string(),
                uri: entry.info.uri,
                existing: self.entries[existing].info.method.clone(),
                duplicate: entry.info.method,
            });
        }
        tracing::debug!(
            verb = %entry.info.verb,
            uri = %entry.info.uri,
            method = %entry.info.method,
            "route bound"
        );
        self.index.insert(key, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Returns the endpoint bound to `verb` on `uri`.
    #[must_use]
    pub fn get(&self, verb: HttpVerb, uri: &str) -> Option<&Arc<Endpoint>> {
        self.index
            .get(&(verb, uri.to_string()))
            .map(|&i| &self.entries[i].endpoint)
    }

    /// Iterates over the bound routes.
    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter()
    }

    /// Returns the route descriptions, in binding order.
    #[must_use]
    pub fn infos(&self) -> Vec<RouteInfo> {
        self.entries.iter().map(|e| e.info.clone()).collect()
    }

    /// Returns the number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no route is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{MethodDef, ServiceRegistry};
    use janus_coerce::{ParamType, PlanCache, Signature, TypeRegistry};
    use janus_core::{Kwargs, KwargsExt};
    use serde_json::json;

    fn registry(defs: Vec<MethodDef>) -> ServiceRegistry {
        let mut registry = ServiceRegistry::new();
        for def in defs {
            registry.register_function(def).unwrap();
        }
        registry
            .build(&TypeRegistry::new(), &PlanCache::new(), &Kwargs::new())
            .unwrap();
        registry
    }

    fn headers() -> Arc<[String]> {
        Arc::from(vec!["x-request-id".to_string()])
    }

    fn echo() -> MethodDef {
        MethodDef::asynchronous("echo", Signature::new().param("q", ParamType::Str), |kwargs: Kwargs| async move {
            Ok::<_, JanusError>(kwargs.arg::<String>("q")?)
        })
    }

    #[tokio::test]
    async fn test_reply_carries_request_id() {
        let registry = registry(vec![echo()]);
        let table = RouteTable::build(registry.methods(), &Renders::builtin(), &WorkerPool::inline(), &headers()).unwrap();
        let endpoint = table.get(HttpVerb::Get, "/echo").unwrap();

        let request = HttpRequest::builder()
            .uri("/echo?q=hi")
            .header("x-request-id", "abc-123")
            .build();
        let reply = endpoint.handle(request).await;
        assert_eq!(reply.header("x-request-id"), Some("abc-123"));
        assert_eq!(
            reply.json_body().unwrap(),
            json!({"code": 0, "msg": "ok", "data": {"data": "hi"}})
        );
    }

    #[tokio::test]
    async fn test_generated_request_id() {
        let registry = registry(vec![echo()]);
        let table = RouteTable::build(registry.methods(), &Renders::builtin(), &WorkerPool::inline(), &headers()).unwrap();
        let reply = table
            .get(HttpVerb::Get, "/echo")
            .unwrap()
            .handle(HttpRequest::builder().uri("/echo?q=x").build())
            .await;
        let id = reply.header("x-request-id").unwrap();
        assert!(!id.is_empty());
    }

    #[test]
    fn test_duplicate_route_fails() {
        let registry = registry(vec![
            echo(),
            MethodDef::blocking("other", Signature::new(), |_| Ok::<_, JanusError>(1)).uri("/echo"),
        ]);
        let err = RouteTable::build(registry.methods(), &Renders::builtin(), &WorkerPool::inline(), &headers())
            .unwrap_err();
        match err {
            JanusError::DuplicateRoute { verb, uri, existing, duplicate } => {
                assert_eq!(verb, "GET");
                assert_eq!(uri, "/echo");
                assert_eq!(existing, "echo");
                assert_eq!(duplicate, "other");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_render_fails_at_build() {
        let registry = registry(vec![echo().request_render("yaml")]);
        let err = RouteTable::build(registry.methods(), &Renders::builtin(), &WorkerPool::inline(), &headers())
            .unwrap_err();
        assert!(matches!(err, JanusError::UnknownRender { role: "request", .. }));
    }

    #[test]
    fn test_one_entry_per_verb() {
        let registry = registry(vec![echo().verbs(["get", "POST"])]);
        let table = RouteTable::build(registry.methods(), &Renders::builtin(), &WorkerPool::inline(), &headers()).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.get(HttpVerb::Post, "/echo").is_some());
        assert!(table.get(HttpVerb::Put, "/echo").is_none());
        assert!(Arc::ptr_eq(
            table.get(HttpVerb::Get, "/echo").unwrap(),
            table.get(HttpVerb::Post, "/echo").unwrap()
        ));
    }

    #[tokio::test]
    async fn test_rpc_handler_coerces_and_scopes() {
        let registry = registry(vec![MethodDef::asynchronous(
            "whoami",
            Signature::new().param("n", ParamType::Int),
            |kwargs: Kwargs| async move {
                let id = TraceContext::current().map(|c| c.request_id().to_string());
                Ok::<_, JanusError>(json!({"n": kwargs.arg::<i64>("n")?, "id": id}))
            },
        )]);
        let method = Arc::clone(registry.method("whoami").unwrap());
        let handler = rpc_handler(method, WorkerPool::inline(), headers());

        let mut call = RpcRequest::new(Kwargs::from_iter([("n".to_string(), json!("7"))]));
        call.metadata.insert("x-request-id", HeaderValue::from_static("rpc-1"));
        let out = handler(call).await.unwrap();
        assert_eq!(out, json!({"n": 7, "id": "rpc-1"}));
    }

    #[derive(Clone, Default)]
    struct SpanFields(Arc<std::sync::Mutex<Vec<(String, Vec<String>)>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SpanFields {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let names = attrs.metadata().fields().iter().map(|f| f.name().to_string()).collect();
            self.0
                .lock()
                .unwrap()
                .push((attrs.metadata().name().to_string(), names));
        }
    }

    #[tokio::test]
    async fn test_dispatch_span_uses_standard_fields() {
        use tracing_subscriber::layer::SubscriberExt;

        let layer = SpanFields::default();
        let subscriber = tracing_subscriber::registry().with(layer.clone());
        let _default = tracing::subscriber::set_default(subscriber);

        let registry = registry(vec![echo()]);
        let table = RouteTable::build(registry.methods(), &Renders::builtin(), &WorkerPool::inline(), &headers()).unwrap();
        table
            .get(HttpVerb::Get, "/echo")
            .unwrap()
            .handle(HttpRequest::builder().uri("/echo?q=x").build())
            .await;

        let spans = layer.0.lock().unwrap().clone();
        let (_, names) = spans.iter().find(|(name, _)| name == "dispatch").unwrap();
        for field in [fields::REQUEST_ID, fields::ROUTE, fields::HTTP_METHOD, fields::HTTP_PATH] {
            assert!(names.iter().any(|n| n == field), "missing {field}");
        }
    }
}
