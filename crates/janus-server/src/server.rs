//! The lifecycle manager.
//!
//! [`Server`] owns the registries and drives
//! `Idle -> Starting -> Serving -> Stopping -> Stopped`:
//!
//! - `start` builds the registry and route table, binds every route on the
//!   HTTP transport, offers RPC-enabled methods to the RPC transport, then
//!   runs every service's `enter` hook concurrently.
//! - `stop` stops the transports, runs every service's `exit` hook
//!   concurrently (one failing hook does not prevent the others), and drains
//!   the worker pool.
//!
//! # Example
//!
//! ```rust,no_run
//! use janus_coerce::{ParamType, Signature};
//! use janus_core::{JanusError, Kwargs, KwargsExt};
//! use janus_server::{MethodDef, Server, ServerSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerSettings::default());
//!     server.register_function(
//!         MethodDef::blocking(
//!             "add",
//!             Signature::new().param("a", ParamType::Int).param("b", ParamType::Int),
//!             |kwargs: Kwargs| Ok::<_, JanusError>(kwargs.arg::<i64>("a")? + kwargs.arg::<i64>("b")?),
//!         )
//!         .doc("HTTP: /math/add get"),
//!     )?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use janus_coerce::{PlanCache, TypeRegistry};
use janus_core::{HttpVerb, JanusError, JanusResult, Kwargs, DEFAULT_TRACE_HEADERS};
use janus_render::Renders;
use serde_json::Value;

use crate::dispatch::{rpc_handler, Endpoint, RouteInfo, RouteTable};
use crate::error::{ServerError, ServerResult};
use crate::hyper_transport::HyperTransport;
use crate::pool::WorkerPool;
use crate::service::{BoundService, MethodDef, RegistryState, Service, ServiceRegistry};
use crate::shutdown::ShutdownSignal;
use crate::transport::{RpcTransport, TransportAdapter};

/// Settings supplied by the configuration loader.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    /// Listen host.
    pub host: String,
    /// Listen port; `0` picks an ephemeral port.
    pub port: u16,
    /// Worker pool size; `0` runs blocking targets inline.
    pub worker_count: usize,
    /// Kwargs passed to service factories that need arguments.
    pub init_kwargs: Kwargs,
    /// How long to wait for open connections on stop.
    pub shutdown_timeout: Duration,
    /// Inbound headers copied into each request's trace context.
    pub trace_headers: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            worker_count: 4,
            init_kwargs: Kwargs::new(),
            shutdown_timeout: Duration::from_secs(30),
            trace_headers: DEFAULT_TRACE_HEADERS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Lifecycle state of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not started.
    Idle,
    /// Building and binding.
    Starting,
    /// Serving requests.
    Serving,
    /// Tearing down.
    Stopping,
    /// Stopped.
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Serving => "serving",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        })
    }
}

/// Registers services and runs them over HTTP and RPC.
pub struct Server {
    settings: ServerSettings,
    registry: ServiceRegistry,
    renders: Renders,
    types: TypeRegistry,
    plans: PlanCache,
    routes: RouteTable,
    pool: WorkerPool,
    http: Option<Box<dyn TransportAdapter>>,
    rpc: Option<Box<dyn RpcTransport>>,
    state: LifecycleState,
    built: bool,
    shutdown: ShutdownSignal,
}

impl Server {
    /// Creates a server with the built-in renders and a [`HyperTransport`].
    #[must_use]
    pub fn new(settings: ServerSettings) -> Self {
        let http = HyperTransport::new().with_shutdown_timeout(settings.shutdown_timeout);
        Self {
            settings,
            registry: ServiceRegistry::new(),
            renders: Renders::builtin(),
            types: TypeRegistry::new(),
            plans: PlanCache::new(),
            routes: RouteTable::default(),
            pool: WorkerPool::inline(),
            http: Some(Box::new(http)),
            rpc: None,
            state: LifecycleState::Idle,
            built: false,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Replaces the HTTP transport.
    #[must_use]
    pub fn with_transport(mut self, transport: impl TransportAdapter + 'static) -> Self {
        self.http = Some(Box::new(transport));
        self
    }

    /// Serves RPC only.
    #[must_use]
    pub fn without_http(mut self) -> Self {
        self.http = None;
        self
    }

    /// Installs an RPC transport.
    #[must_use]
    pub fn with_rpc_transport(mut self, transport: impl RpcTransport + 'static) -> Self {
        self.rpc = Some(Box::new(transport));
        self
    }

    fn check_unbuilt(&self, what: &str) -> JanusResult<()> {
        if self.built {
            return Err(JanusError::config(format!("cannot {what} after the server is built")));
        }
        Ok(())
    }

    /// Registers a bare function.
    pub fn register_function(&mut self, method: MethodDef) -> JanusResult<()> {
        self.registry.register_function(method)
    }

    /// Registers a service instance.
    pub fn register_service(&mut self, service: impl Service) -> JanusResult<()> {
        self.registry.register_service(Arc::new(service))
    }

    /// Registers a shared service instance.
    pub fn register_shared(&mut self, service: Arc<dyn Service>) -> JanusResult<()> {
        self.registry.register_service(service)
    }

    /// Registers a service built at startup, see
    /// [`ServiceRegistry::register_factory`].
    pub fn register_factory<F>(&mut self, name: impl Into<String>, factory: F) -> JanusResult<()>
    where
        F: Fn(Option<&Kwargs>) -> anyhow::Result<Arc<dyn Service>> + Send + Sync + 'static,
    {
        self.registry.register_factory(name, factory)
    }

    /// Returns the render collections for registration.
    pub fn renders_mut(&mut self) -> JanusResult<&mut Renders> {
        self.check_unbuilt("register renders")?;
        Ok(&mut self.renders)
    }

    /// Registers a caster for a custom parameter type.
    pub fn register_type<F>(&mut self, name: impl Into<String>, caster: F) -> JanusResult<()>
    where
        F: Fn(&str) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.check_unbuilt("register types")?;
        self.types.register_type(name, caster);
        Ok(())
    }

    /// Builds the registry and route table. Idempotent.
    pub fn build(&mut self) -> JanusResult<()> {
        if self.built {
            return Ok(());
        }

        self.renders.ensure_defaults()?;
        self.registry
            .build(&self.types, &self.plans, &self.settings.init_kwargs)?;

        let pool = WorkerPool::new(self.settings.worker_count);
        let trace_headers: Arc<[String]> = Arc::from(self.settings.trace_headers.clone());
        self.routes = RouteTable::build(self.registry.methods(), &self.renders, &pool, &trace_headers)?;
        self.pool = pool;
        self.built = true;

        for info in self.routes.infos() {
            tracing::debug!(
                verb = %info.verb,
                uri = %info.uri,
                method = %info.method,
                request = %info.request_render,
                response = %info.response_render,
                error = %info.error_render,
                "route"
            );
        }
        tracing::info!(
            routes = self.routes.len(),
            workers = self.pool.size(),
            "server built"
        );
        Ok(())
    }

    /// Returns the route table. Empty until built.
    #[must_use]
    pub const fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Returns the route descriptions. Empty until built.
    #[must_use]
    pub fn route_infos(&self) -> Vec<RouteInfo> {
        self.routes.infos()
    }

    /// Returns the endpoint bound to `verb` on `uri`.
    #[must_use]
    pub fn endpoint(&self, verb: HttpVerb, uri: &str) -> Option<&Arc<Endpoint>> {
        self.routes.get(verb, uri)
    }

    /// Returns the service registry.
    #[must_use]
    pub const fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Returns the worker pool.
    #[must_use]
    pub const fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Returns the settings.
    #[must_use]
    pub const fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns the HTTP transport's bound address while serving.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().and_then(|http| http.local_addr())
    }

    /// Returns a handle that stops [`run`](Self::run) when triggered.
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    fn transition(&mut self, state: LifecycleState) {
        tracing::info!(from = %self.state, to = %state, "lifecycle transition");
        self.state = state;
    }

    /// Builds, binds the transports and runs `enter` hooks.
    pub async fn start(&mut self) -> ServerResult<()> {
        if self.state != LifecycleState::Idle {
            return Err(ServerError::InvalidState {
                operation: "start",
                state: self.state.to_string(),
            });
        }
        self.transition(LifecycleState::Starting);

        if let Err(e) = self.bind().await {
            self.teardown().await;
            return Err(e);
        }

        let services: Vec<Arc<dyn Service>> = self
            .registry
            .services()
            .iter()
            .map(|bound| Arc::clone(bound.service()))
            .collect();
        let entered = run_hooks(&services, Phase::Enter).await;
        if entered.iter().any(Result::is_err) {
            // services that did enter are exited before the transports go down
            let rollback = services
                .iter()
                .zip(&entered)
                .filter(|(_, outcome)| outcome.is_ok())
                .map(|(service, _)| service);
            run_hooks(rollback, Phase::Exit).await;
            self.teardown().await;
            return Err(ServerError::Hooks {
                phase: "enter",
                failures: failures(entered),
            });
        }

        self.registry.set_state(RegistryState::Serving);
        self.transition(LifecycleState::Serving);
        Ok(())
    }

    async fn bind(&mut self) -> ServerResult<()> {
        self.build()?;

        if let Some(http) = self.http.as_mut() {
            for entry in self.routes.iter() {
                let handler = Arc::clone(&entry.endpoint).into_handler();
                http.add_route(entry.info.verb, &entry.info.uri, handler)?;
            }
            http.start(&self.settings.host, self.settings.port).await?;
        }

        if let Some(rpc) = self.rpc.as_mut() {
            let trace_headers: Arc<[String]> = Arc::from(self.settings.trace_headers.clone());
            let mut names = HashSet::new();
            for method in self.registry.methods().filter(|m| m.rpc_enabled()) {
                if !names.insert(method.qualified_name()) {
                    return Err(JanusError::config(format!(
                        "rpc method `{}` is exposed by more than one service",
                        method.qualified_name()
                    ))
                    .into());
                }
                let handler = rpc_handler(Arc::clone(method), self.pool.clone(), Arc::clone(&trace_headers));
                rpc.add_method(method.qualified_name(), handler)?;
            }
            rpc.start().await?;
        }
        Ok(())
    }

    /// Stops the transports, runs `exit` hooks and drains the worker pool.
    ///
    /// Every hook runs even if others fail; all failures are reported
    /// together.
    pub async fn stop(&mut self) -> ServerResult<()> {
        match self.state {
            LifecycleState::Serving => {}
            LifecycleState::Stopped => return Ok(()),
            state => {
                return Err(ServerError::InvalidState {
                    operation: "stop",
                    state: state.to_string(),
                })
            }
        }

        self.transition(LifecycleState::Stopping);
        self.registry.set_state(RegistryState::ShuttingDown);
        if let Some(http) = self.http.as_mut() {
            http.stop().await;
        }
        if let Some(rpc) = self.rpc.as_mut() {
            rpc.stop().await;
        }

        let services = self.registry.services().iter().map(BoundService::service);
        let failures = failures(run_hooks(services, Phase::Exit).await);
        self.pool.shutdown().await;
        self.registry.set_state(RegistryState::Stopped);
        self.transition(LifecycleState::Stopped);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ServerError::Hooks {
                phase: "exit",
                failures,
            })
        }
    }

    /// Stops whatever a failed start brought up.
    async fn teardown(&mut self) {
        if let Some(http) = self.http.as_mut() {
            http.stop().await;
        }
        if let Some(rpc) = self.rpc.as_mut() {
            rpc.stop().await;
        }
        self.pool.shutdown().await;
        self.transition(LifecycleState::Stopped);
    }

    /// Serves until SIGTERM or SIGINT, or until the
    /// [`shutdown_signal`](Self::shutdown_signal) is triggered.
    pub async fn run(&mut self) -> ServerResult<()> {
        let shutdown = self.shutdown.clone();
        shutdown.listen_for_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Serves until `shutdown` is triggered.
    pub async fn run_with_shutdown(&mut self, shutdown: ShutdownSignal) -> ServerResult<()> {
        self.start().await?;
        shutdown.recv().await;
        self.stop().await
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("settings", &self.settings)
            .field("state", &self.state)
            .field("routes", &self.routes.len())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy)]
enum Phase {
    Enter,
    Exit,
}

/// Runs `phase` on every service concurrently. Outcomes are in service
/// order.
async fn run_hooks<'a>(
    services: impl IntoIterator<Item = &'a Arc<dyn Service>>,
    phase: Phase,
) -> Vec<Result<(), String>> {
    let hooks = services.into_iter().map(|service| {
        let service = Arc::clone(service);
        async move {
            let result = match phase {
                Phase::Enter => service.enter().await,
                Phase::Exit => service.exit().await,
            };
            result.map_err(|e| format!("{}: {e:#}", service.name()))
        }
    });

    let outcomes = join_all(hooks).await;
    for failure in outcomes.iter().filter_map(|outcome| outcome.as_ref().err()) {
        tracing::error!(error = %failure, "lifecycle hook failed");
    }
    outcomes
}

fn failures(outcomes: Vec<Result<(), String>>) -> Vec<String> {
    outcomes.into_iter().filter_map(Result::err).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_coerce::{ParamType, Signature};
    use crate::transport::{RpcHandler, RpcRequest};
    use janus_core::KwargsExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings() -> ServerSettings {
        ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            worker_count: 1,
            ..ServerSettings::default()
        }
    }

    fn add() -> MethodDef {
        MethodDef::blocking(
            "add",
            Signature::new().param("a", ParamType::Int).param("b", ParamType::Int),
            |kwargs: Kwargs| Ok::<_, JanusError>(kwargs.arg::<i64>("a")? + kwargs.arg::<i64>("b")?),
        )
        .doc("HTTP: /math/add get")
    }

    struct Hooked {
        name: &'static str,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Service for Hooked {
        fn name(&self) -> &str {
            self.name
        }

        fn methods(self: Arc<Self>) -> Vec<MethodDef> {
            Vec::new()
        }

        async fn enter(&self) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn exit(&self) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("teardown failed");
            }
            Ok(())
        }
    }

    #[test]
    fn test_build_twice_is_identical() {
        let mut server = Server::new(settings());
        server.register_function(add()).unwrap();
        server.build().unwrap();
        let first = server.route_infos();
        server.build().unwrap();
        assert_eq!(server.route_infos(), first);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].uri, "/math/add");
    }

    #[test]
    fn test_registration_closed_after_build() {
        let mut server = Server::new(settings());
        server.register_function(add()).unwrap();
        server.build().unwrap();
        assert!(server.register_function(add()).is_err());
        assert!(server.renders_mut().is_err());
        assert!(server.register_type("cents", |s| Ok(Value::from(s.len()))).is_err());
    }

    #[tokio::test]
    async fn test_start_stop_runs_all_hooks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut server = Server::new(settings());
        for (name, fail) in [("a", true), ("b", false), ("c", true)] {
            server
                .register_service(Hooked {
                    name,
                    fail,
                    calls: Arc::clone(&calls),
                })
                .unwrap();
        }

        server.start().await.unwrap();
        assert_eq!(server.state(), LifecycleState::Serving);
        assert!(server.local_addr().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let err = server.stop().await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        match err {
            ServerError::Hooks { phase, failures } => {
                assert_eq!(phase, "exit");
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().any(|f| f.starts_with("a:")));
                assert!(failures.iter().any(|f| f.starts_with("c:")));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(server.state(), LifecycleState::Stopped);
        assert_eq!(server.registry().state(), RegistryState::Stopped);
    }

    struct Staged {
        name: &'static str,
        fail_enter: bool,
        exited: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    #[async_trait::async_trait]
    impl Service for Staged {
        fn name(&self) -> &str {
            self.name
        }

        fn methods(self: Arc<Self>) -> Vec<MethodDef> {
            Vec::new()
        }

        async fn enter(&self) -> anyhow::Result<()> {
            if self.fail_enter {
                anyhow::bail!("cannot connect");
            }
            Ok(())
        }

        async fn exit(&self) -> anyhow::Result<()> {
            self.exited.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_enter_exits_entered_services() {
        let exited = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut server = Server::new(settings());
        for (name, fail_enter) in [("db", false), ("cache", true), ("queue", false)] {
            server
                .register_service(Staged {
                    name,
                    fail_enter,
                    exited: Arc::clone(&exited),
                })
                .unwrap();
        }

        let err = server.start().await.unwrap_err();
        match err {
            ServerError::Hooks { phase, failures } => {
                assert_eq!(phase, "enter");
                assert_eq!(failures, vec!["cache: cannot connect".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut exited = exited.lock().unwrap().clone();
        exited.sort_unstable();
        assert_eq!(exited, vec!["db", "queue"]);
        assert_eq!(server.state(), LifecycleState::Stopped);
        assert!(server.local_addr().is_none());
    }

    struct Rendezvous {
        name: &'static str,
        barrier: Arc<tokio::sync::Barrier>,
    }

    #[async_trait::async_trait]
    impl Service for Rendezvous {
        fn name(&self) -> &str {
            self.name
        }

        fn methods(self: Arc<Self>) -> Vec<MethodDef> {
            Vec::new()
        }

        async fn enter(&self) -> anyhow::Result<()> {
            self.barrier.wait().await;
            Ok(())
        }

        async fn exit(&self) -> anyhow::Result<()> {
            self.barrier.wait().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_hooks_run_concurrently() {
        // each hook only returns once all three are waiting
        let barrier = Arc::new(tokio::sync::Barrier::new(3));
        let mut server = Server::new(settings());
        for name in ["a", "b", "c"] {
            server
                .register_service(Rendezvous {
                    name,
                    barrier: Arc::clone(&barrier),
                })
                .unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), server.start())
            .await
            .expect("enter hooks should run concurrently")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), server.stop())
            .await
            .expect("exit hooks should run concurrently")
            .unwrap();
        assert_eq!(server.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let mut server = Server::new(settings());
        server.start().await.unwrap();
        assert!(matches!(
            server.start().await,
            Err(ServerError::InvalidState { operation: "start", .. })
        ));
        server.stop().await.unwrap();
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_build_error_aborts_start() {
        let mut server = Server::new(settings());
        server.register_function(add().verbs(["FETCH"])).unwrap();
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, ServerError::Build(JanusError::InvalidVerb { .. })));
        assert_eq!(server.state(), LifecycleState::Stopped);
    }

    #[derive(Clone, Default)]
    struct MemoryRpc {
        methods: Arc<std::sync::Mutex<Vec<(String, RpcHandler)>>>,
        started: Arc<AtomicUsize>,
    }

    impl MemoryRpc {
        fn handler(&self, name: &str) -> Option<RpcHandler> {
            let methods = self.methods.lock().unwrap();
            methods.iter().find(|(n, _)| n == name).map(|(_, h)| Arc::clone(h))
        }
    }

    #[async_trait::async_trait]
    impl RpcTransport for MemoryRpc {
        fn add_method(&mut self, name: &str, handler: RpcHandler) -> JanusResult<()> {
            self.methods.lock().unwrap().push((name.to_string(), handler));
            Ok(())
        }

        async fn start(&mut self) -> ServerResult<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&mut self) {}
    }

    #[tokio::test]
    async fn test_rpc_transport_receives_enabled_methods() {
        let rpc = MemoryRpc::default();
        let mut server = Server::new(settings()).without_http().with_rpc_transport(rpc.clone());
        server.register_function(add()).unwrap();
        server
            .register_function(
                MethodDef::asynchronous("hidden", Signature::new(), |_: Kwargs| async {
                    Ok::<_, JanusError>(Value::Null)
                })
                .rpc(false),
            )
            .unwrap();
        server.start().await.unwrap();
        assert_eq!(rpc.started.load(Ordering::SeqCst), 1);
        assert!(server.local_addr().is_none());
        assert!(rpc.handler("hidden").is_none());

        let handler = rpc.handler("add").unwrap();
        let mut kwargs = Kwargs::new();
        kwargs.insert("a".into(), Value::from("2"));
        kwargs.insert("b".into(), Value::from(3));
        assert_eq!(handler(RpcRequest::new(kwargs.clone())).await.unwrap(), Value::from(5));

        kwargs.remove("b");
        let err = handler(RpcRequest::new(kwargs)).await.unwrap_err();
        assert_eq!(err.code(), janus_core::CODE_PARAM_LACK);

        server.stop().await.unwrap();
    }

    struct Twin(&'static str);

    impl Service for Twin {
        fn name(&self) -> &str {
            "twin"
        }

        fn methods(self: Arc<Self>) -> Vec<MethodDef> {
            vec![add()]
        }

        fn uri_prefix(&self) -> Option<&str> {
            Some(self.0)
        }
    }

    #[tokio::test]
    async fn test_rpc_name_collision_aborts_start() {
        let rpc = MemoryRpc::default();
        let mut server = Server::new(settings()).without_http().with_rpc_transport(rpc.clone());
        server.register_service(Twin("v1")).unwrap();
        server.register_service(Twin("v2")).unwrap();

        let err = server.start().await.unwrap_err();
        assert!(matches!(err, ServerError::Build(JanusError::Config { .. })));
        assert!(err.to_string().contains("twin.add"));
        assert_eq!(rpc.started.load(Ordering::SeqCst), 0);
        assert_eq!(server.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_run_with_shutdown() {
        let mut server = Server::new(settings());
        server.register_function(add()).unwrap();
        let signal = ShutdownSignal::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });
        tokio::time::timeout(Duration::from_secs(5), server.run_with_shutdown(signal))
            .await
            .expect("server should stop")
            .unwrap();
        assert_eq!(server.state(), LifecycleState::Stopped);
    }
}
