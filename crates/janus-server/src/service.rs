//! Services, methods and the service registry.
//!
//! A [`Service`] exposes an explicit method table through
//! [`Service::methods`]. Bare functions are collected into one implicit
//! default service whose methods are addressed by their own name; methods of
//! every other service are addressed as `service.method`.
//!
//! The registry moves through
//! `Created -> Registering -> Built -> Serving -> ShuttingDown -> Stopped`.
//! Registration is only possible before the build, and the build runs once:
//! afterwards the bound [`Method`]s are immutable and shared read-only.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use janus_coerce::{CoercionPlan, MethodId, PlanCache, Signature, TypeRegistry};
use janus_core::{JanusError, JanusResult, Kwargs};
use janus_telemetry::logging::fields;
use serde::Serialize;
use serde_json::Value;

use crate::pool::{panic_error, WorkerPool};
use crate::route::{build_descriptor, RouteDescriptor, RouteOverrides};

/// An asynchronous target. Runs on the dispatching task.
pub type AsyncTarget = Arc<dyn Fn(Kwargs) -> BoxFuture<'static, JanusResult<Value>> + Send + Sync>;

/// A blocking target. Runs on the worker pool.
pub type BlockingTarget = Arc<dyn Fn(Kwargs) -> JanusResult<Value> + Send + Sync>;

/// Builds a service from optional init kwargs.
pub type ServiceFactory =
    Arc<dyn Fn(Option<&Kwargs>) -> anyhow::Result<Arc<dyn Service>> + Send + Sync>;

/// The function behind a method.
#[derive(Clone)]
pub enum Callable {
    /// Awaited directly on the dispatching task.
    Async(AsyncTarget),
    /// Offloaded to the worker pool.
    Blocking(BlockingTarget),
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Async(_) => f.write_str("Callable::Async"),
            Self::Blocking(_) => f.write_str("Callable::Blocking"),
        }
    }
}

/// Definition of one dispatchable method.
///
/// # Example
///
/// ```rust
/// use janus_coerce::{ParamType, Signature};
/// use janus_core::{JanusError, Kwargs, KwargsExt};
/// use janus_server::MethodDef;
///
/// let add = MethodDef::blocking(
///     "add",
///     Signature::new().param("a", ParamType::Int).param("b", ParamType::Int),
///     |kwargs: Kwargs| Ok::<_, JanusError>(kwargs.arg::<i64>("a")? + kwargs.arg::<i64>("b")?),
/// )
/// .doc("Adds two numbers.\n\nHTTP: /math/add get");
///
/// assert_eq!(add.name(), "add");
/// assert!(!add.is_coroutine());
/// ```
#[derive(Debug, Clone)]
pub struct MethodDef {
    name: String,
    signature: Signature,
    callable: Callable,
    doc: Option<String>,
    overrides: RouteOverrides,
    http: Option<bool>,
    rpc: Option<bool>,
}

impl MethodDef {
    /// Defines a method backed by an async function.
    pub fn asynchronous<F, Fut, R, E>(name: impl Into<String>, signature: Signature, f: F) -> Self
    where
        F: Fn(Kwargs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Serialize,
        E: Into<JanusError>,
    {
        let target: AsyncTarget = Arc::new(move |kwargs| {
            let fut = f(kwargs);
            async move { to_value(fut.await.map_err(Into::into)?) }.boxed()
        });
        Self::new(name.into(), signature, Callable::Async(target))
    }

    /// Defines a method backed by a blocking function.
    pub fn blocking<F, R, E>(name: impl Into<String>, signature: Signature, f: F) -> Self
    where
        F: Fn(Kwargs) -> Result<R, E> + Send + Sync + 'static,
        R: Serialize,
        E: Into<JanusError>,
    {
        let target: BlockingTarget = Arc::new(move |kwargs| to_value(f(kwargs).map_err(Into::into)?));
        Self::new(name.into(), signature, Callable::Blocking(target))
    }

    fn new(name: String, signature: Signature, callable: Callable) -> Self {
        Self {
            name,
            signature,
            callable,
            doc: None,
            overrides: RouteOverrides::default(),
            http: None,
            rpc: None,
        }
    }

    /// Sets the docstring. An `HTTP:` line in it describes the route.
    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Sets the URI explicitly.
    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.overrides.uri = Some(uri.into());
        self
    }

    /// Sets the verbs explicitly. Validated when the registry builds.
    #[must_use]
    pub fn verbs<I, S>(mut self, verbs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.overrides.verbs = Some(verbs.into_iter().map(Into::into).collect());
        self
    }

    /// Selects the request render.
    #[must_use]
    pub fn request_render(mut self, key: impl Into<String>) -> Self {
        self.overrides.request = Some(key.into());
        self
    }

    /// Selects the response render.
    #[must_use]
    pub fn response_render(mut self, key: impl Into<String>) -> Self {
        self.overrides.response = Some(key.into());
        self
    }

    /// Selects the error render.
    #[must_use]
    pub fn error_render(mut self, key: impl Into<String>) -> Self {
        self.overrides.error = Some(key.into());
        self
    }

    /// Enables or disables the HTTP route of this method.
    #[must_use]
    pub const fn http(mut self, enabled: bool) -> Self {
        self.http = Some(enabled);
        self
    }

    /// Enables or disables the RPC method of this method.
    #[must_use]
    pub const fn rpc(mut self, enabled: bool) -> Self {
        self.rpc = Some(enabled);
        self
    }

    /// Returns the method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` for async targets.
    #[must_use]
    pub const fn is_coroutine(&self) -> bool {
        matches!(self.callable, Callable::Async(_))
    }
}

fn to_value<R: Serialize>(value: R) -> JanusResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| JanusError::internal_with_source("failed to serialize return value", e))
}

/// A registered unit exposing one or more methods.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use janus_coerce::{ParamType, Signature};
/// use janus_core::{JanusError, Kwargs, KwargsExt};
/// use janus_server::{MethodDef, Service};
///
/// struct Greeter {
///     greeting: String,
/// }
///
/// #[async_trait::async_trait]
/// impl Service for Greeter {
///     fn name(&self) -> &str {
///         "greeter"
///     }
///
///     fn methods(self: Arc<Self>) -> Vec<MethodDef> {
///         let this = Arc::clone(&self);
///         vec![MethodDef::asynchronous(
///             "hello",
///             Signature::new().param("who", ParamType::Str),
///             move |kwargs: Kwargs| {
///                 let this = Arc::clone(&this);
///                 async move {
///                     let who: String = kwargs.arg("who")?;
///                     Ok::<_, JanusError>(format!("{} {who}", this.greeting))
///                 }
///             },
///         )]
///     }
/// }
/// ```
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Service name, the first part of qualified method names.
    fn name(&self) -> &str;

    /// The method table. Names starting with `_` are skipped.
    fn methods(self: Arc<Self>) -> Vec<MethodDef>;

    /// Whether the service's methods are exposed as HTTP routes.
    fn http_enabled(&self) -> bool {
        true
    }

    /// Whether the service's methods are exposed as RPC methods.
    fn rpc_enabled(&self) -> bool {
        true
    }

    /// Prefix prepended to every route of the service.
    fn uri_prefix(&self) -> Option<&str> {
        None
    }

    /// Called once the server starts serving.
    async fn enter(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when the server stops.
    async fn exit(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// The implicit service holding bare functions.
struct DefaultService {
    methods: Vec<MethodDef>,
}

impl Service for DefaultService {
    fn name(&self) -> &str {
        "default"
    }

    fn methods(self: Arc<Self>) -> Vec<MethodDef> {
        self.methods.clone()
    }
}

/// A method bound to its service, route and coercion plan.
pub struct Method {
    service: String,
    name: String,
    qualified_name: String,
    http_enabled: bool,
    rpc_enabled: bool,
    route: RouteDescriptor,
    callable: Callable,
    plan: Arc<CoercionPlan>,
}

impl Method {
    /// Returns the owning service's name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name the method is addressed by.
    #[must_use]
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Returns `true` for async targets.
    #[must_use]
    pub const fn is_coroutine(&self) -> bool {
        matches!(self.callable, Callable::Async(_))
    }

    /// Returns `true` if the method is exposed over HTTP.
    #[must_use]
    pub const fn http_enabled(&self) -> bool {
        self.http_enabled
    }

    /// Returns `true` if the method is exposed over RPC.
    #[must_use]
    pub const fn rpc_enabled(&self) -> bool {
        self.rpc_enabled
    }

    /// Returns the route descriptor.
    #[must_use]
    pub const fn route(&self) -> &RouteDescriptor {
        &self.route
    }

    /// Returns the cached coercion plan.
    #[must_use]
    pub fn plan(&self) -> &Arc<CoercionPlan> {
        &self.plan
    }

    /// Coerces `kwargs` and calls the target.
    ///
    /// Async targets are awaited on the current task. Blocking targets run on
    /// `pool`, or inline if the pool has no workers.
    pub async fn invoke(&self, kwargs: Kwargs, pool: &WorkerPool) -> JanusResult<Value> {
        let kwargs = self.plan.format(kwargs)?;
        match &self.callable {
            Callable::Async(target) => {
                let target = Arc::clone(target);
                std::panic::AssertUnwindSafe(async move { target(kwargs).await })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(panic_error(payload)))
            }
            Callable::Blocking(target) => pool.run(Arc::clone(target), kwargs).await,
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("qualified_name", &self.qualified_name)
            .field("route", &self.route)
            .field("callable", &self.callable)
            .field("http_enabled", &self.http_enabled)
            .field("rpc_enabled", &self.rpc_enabled)
            .finish_non_exhaustive()
    }
}

/// Registry lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RegistryState {
    /// Nothing registered yet.
    Created,
    /// At least one registration.
    Registering,
    /// Methods are bound.
    Built,
    /// The server is serving.
    Serving,
    /// The server is stopping.
    ShuttingDown,
    /// The server has stopped.
    Stopped,
}

enum Pending {
    Instance(Arc<dyn Service>),
    Factory { name: String, factory: ServiceFactory },
}

/// A service together with its bound methods.
#[derive(Clone)]
pub struct BoundService {
    service: Arc<dyn Service>,
    methods: Vec<Arc<Method>>,
}

impl BoundService {
    /// Returns the service.
    #[must_use]
    pub fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }

    /// Returns the bound methods, in table order.
    #[must_use]
    pub fn methods(&self) -> &[Arc<Method>] {
        &self.methods
    }
}

impl fmt::Debug for BoundService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundService")
            .field("name", &self.service.name())
            .field("methods", &self.methods)
            .finish()
    }
}

/// Collects services and bare functions and binds their methods.
pub struct ServiceRegistry {
    state: RegistryState,
    functions: Vec<MethodDef>,
    pending: Vec<Pending>,
    services: Vec<BoundService>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RegistryState::Created,
            functions: Vec::new(),
            pending: Vec::new(),
            services: Vec::new(),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> RegistryState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: RegistryState) {
        self.state = state;
    }

    fn check_open(&mut self) -> JanusResult<()> {
        if self.state >= RegistryState::Built {
            return Err(JanusError::config("cannot register after the registry is built"));
        }
        self.state = RegistryState::Registering;
        Ok(())
    }

    /// Registers a bare function into the default service.
    pub fn register_function(&mut self, method: MethodDef) -> JanusResult<()> {
        self.check_open()?;
        self.functions.push(method);
        Ok(())
    }

    /// Registers a service instance.
    pub fn register_service(&mut self, service: Arc<dyn Service>) -> JanusResult<()> {
        self.check_open()?;
        self.pending.push(Pending::Instance(service));
        Ok(())
    }

    /// Registers a service built at build time.
    ///
    /// The factory is first called without arguments; if that fails and
    /// init kwargs are configured, it is called again with them. If neither
    /// succeeds the build fails with a configuration error naming `name`.
    pub fn register_factory<F>(&mut self, name: impl Into<String>, factory: F) -> JanusResult<()>
    where
        F: Fn(Option<&Kwargs>) -> anyhow::Result<Arc<dyn Service>> + Send + Sync + 'static,
    {
        self.check_open()?;
        self.pending.push(Pending::Factory {
            name: name.into(),
            factory: Arc::new(factory),
        });
        Ok(())
    }

    /// Instantiates services and binds every method. Runs once.
    pub fn build(
        &mut self,
        types: &TypeRegistry,
        plans: &PlanCache,
        init_kwargs: &Kwargs,
    ) -> JanusResult<()> {
        if self.state >= RegistryState::Built {
            return Ok(());
        }

        let mut services = Vec::new();
        if !self.functions.is_empty() {
            let default: Arc<dyn Service> = Arc::new(DefaultService {
                methods: std::mem::take(&mut self.functions),
            });
            services.push(bind_service(default, 0, true, types, plans)?);
        }

        for pending in std::mem::take(&mut self.pending) {
            let service = match pending {
                Pending::Instance(service) => service,
                Pending::Factory { name, factory } => instantiate(&name, &factory, init_kwargs)?,
            };
            let slot = services.len();
            services.push(bind_service(service, slot, false, types, plans)?);
        }

        self.services = services;
        self.state = RegistryState::Built;
        tracing::debug!(
            services = self.services.len(),
            methods = self.methods().count(),
            "service registry built"
        );
        Ok(())
    }

    /// Returns the bound services, in registration order.
    #[must_use]
    pub fn services(&self) -> &[BoundService] {
        &self.services
    }

    /// Iterates over every bound method.
    pub fn methods(&self) -> impl Iterator<Item = &Arc<Method>> {
        self.services.iter().flat_map(|bound| bound.methods.iter())
    }

    /// Looks up a bound method by qualified name.
    ///
    /// Services may share a name under different URI prefixes; the first
    /// match in registration order is returned. Use
    /// [`methods_named`](Self::methods_named) to see all of them.
    #[must_use]
    pub fn method(&self, qualified_name: &str) -> Option<&Arc<Method>> {
        self.methods_named(qualified_name).next()
    }

    /// Iterates over every bound method with the given qualified name.
    pub fn methods_named<'a: 'b, 'b>(
        &'a self,
        qualified_name: &'b str,
    ) -> impl Iterator<Item = &'a Arc<Method>> + 'b {
        self.methods().filter(move |m| m.qualified_name == qualified_name)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("state", &self.state)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

fn instantiate(
    name: &str,
    factory: &ServiceFactory,
    init_kwargs: &Kwargs,
) -> JanusResult<Arc<dyn Service>> {
    let bare = match factory(None) {
        Ok(service) => return Ok(service),
        Err(e) => e,
    };
    if init_kwargs.is_empty() {
        return Err(JanusError::config(format!(
            "cannot build service `{name}`: {bare:#}"
        )));
    }
    tracing::debug!({ fields::SERVICE } = name, error = %bare, "retrying service with init kwargs");
    factory(Some(init_kwargs)).map_err(|e| {
        JanusError::config(format!("cannot build service `{name}` with init kwargs: {e:#}"))
    })
}

fn bind_service(
    service: Arc<dyn Service>,
    slot: usize,
    is_default: bool,
    types: &TypeRegistry,
    plans: &PlanCache,
) -> JanusResult<BoundService> {
    let service_name = service.name().to_string();
    let service_http = service.http_enabled();
    let service_rpc = service.rpc_enabled();
    let prefix = service.uri_prefix().map(ToString::to_string);

    let mut seen = HashSet::new();
    let mut methods = Vec::new();
    for def in Arc::clone(&service).methods() {
        if def.name.starts_with('_') {
            continue;
        }
        if !seen.insert(def.name.clone()) {
            return Err(JanusError::config(format!(
                "method `{}` is defined twice in service `{service_name}`",
                def.name
            )));
        }

        let qualified_name = if is_default {
            def.name.clone()
        } else {
            format!("{service_name}.{}", def.name)
        };
        let route = build_descriptor(
            &qualified_name,
            def.doc.as_deref(),
            &def.overrides,
            prefix.as_deref(),
        )?;
        let plan = plans.get_or_build(&MethodId::new(slot, def.name.as_str()), || {
            CoercionPlan::build(&def.signature, types)
        });
        tracing::debug!({ fields::ROUTE } = %qualified_name, uri = %route, "bound method");

        methods.push(Arc::new(Method {
            service: service_name.clone(),
            http_enabled: service_http && def.http.unwrap_or(true),
            rpc_enabled: service_rpc && def.rpc.unwrap_or(true),
            name: def.name,
            qualified_name,
            route,
            callable: def.callable,
            plan,
        }));
    }

    Ok(BoundService { service, methods })
}
