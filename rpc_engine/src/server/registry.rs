//! Service registry: maps `service` + `method` names to invocable handlers.
//!
//! Every concrete method is adapted once, at registration time, into the
//! uniform [`MethodHandler`] shape. Binding the generic params produces a lazy
//! invocation future, so the dispatcher can run hooks between binding and
//! invocation without any type introspection on the request path.

use std::{collections::HashMap, future::Future, marker::PhantomData, sync::Arc};

use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::{BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::errors::RegistryError;

/// A bound, not yet started, method invocation.
pub type BoundCall = BoxFuture<'static, anyhow::Result<Value>>;

pub trait MethodHandler: Send + Sync {
    /// Coerces generic params into the method's typed params.
    fn bind(&self, params: Value) -> Result<BoundCall, serde_json::Error>;
}

pub struct Method {
    name: String,
    params_type: &'static str,
    result_type: &'static str,
    handler: Arc<dyn MethodHandler>,
}

impl Method {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params_type(&self) -> &'static str {
        self.params_type
    }

    pub fn result_type(&self) -> &'static str {
        self.result_type
    }

    pub fn bind(&self, params: Value) -> Result<BoundCall, serde_json::Error> {
        self.handler.bind(params)
    }
}

pub struct Service {
    name: String,
    methods: HashMap<String, Arc<Method>>,
}

impl Service {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Option<Arc<Method>> {
        self.methods.get(name).cloned()
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }
}

struct SyncMethod<S, P, R, F> {
    instance: Arc<S>,
    func: Arc<F>,
    _shape: PhantomData<fn(P) -> R>,
}

impl<S, P, R, F> MethodHandler for SyncMethod<S, P, R, F>
where
    S: Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Default + Serialize + Send + 'static,
    F: Fn(&S, P, &mut R) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn bind(&self, params: Value) -> Result<BoundCall, serde_json::Error> {
        let params: P = serde_json::from_value(params)?;
        let instance = Arc::clone(&self.instance);
        let func = Arc::clone(&self.func);
        Ok(async move {
            let mut result = R::default();
            (*func)(&instance, params, &mut result)?;
            Ok::<_, anyhow::Error>(serde_json::to_value(result)?)
        }
        .boxed())
    }
}

struct AsyncMethod<S, P, R, F> {
    instance: Arc<S>,
    func: Arc<F>,
    _shape: PhantomData<fn(P) -> R>,
}

impl<S, P, R, F, Fut> MethodHandler for AsyncMethod<S, P, R, F>
where
    S: Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(Arc<S>, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    fn bind(&self, params: Value) -> Result<BoundCall, serde_json::Error> {
        let params: P = serde_json::from_value(params)?;
        let instance = Arc::clone(&self.instance);
        let func = Arc::clone(&self.func);
        Ok(async move {
            let result = (*func)(instance, params).await?;
            Ok::<_, anyhow::Error>(serde_json::to_value(result)?)
        }
        .boxed())
    }
}

/// Collects the methods of one service instance before registration.
///
/// Method names are stored in PascalCase, so `add_two` is reachable as
/// `AddTwo` (and therefore as `svc.add_two` on the wire). Names that cannot be
/// addressed through `svc.method` are skipped rather than rejected; the
/// registry reports them when running in strict mode.
pub struct ServiceBuilder<S> {
    instance: Arc<S>,
    name: String,
    methods: HashMap<String, Arc<Method>>,
    skipped: Vec<String>,
}

impl<S> ServiceBuilder<S>
where
    S: Send + Sync + 'static,
{
    /// Starts a service named after the instance's type, e.g. `Calc`.
    pub fn new(instance: S) -> Self {
        Self::from_arc(Arc::new(instance))
    }

    pub fn from_arc(instance: Arc<S>) -> Self {
        Self {
            instance,
            name: type_base_name::<S>(),
            methods: HashMap::new(),
            skipped: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Adds a method shaped `fn(&S, params, &mut result) -> Result<()>`.
    pub fn method<P, R, F>(self, name: &str, func: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Default + Serialize + Send + 'static,
        F: Fn(&S, P, &mut R) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler = SyncMethod {
            instance: Arc::clone(&self.instance),
            func: Arc::new(func),
            _shape: PhantomData,
        };
        self.insert(
            name,
            std::any::type_name::<P>(),
            std::any::type_name::<R>(),
            Arc::new(handler),
        )
    }

    /// Adds a method that resolves its result asynchronously.
    pub fn method_async<P, R, F, Fut>(self, name: &str, func: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Arc<S>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let handler = AsyncMethod {
            instance: Arc::clone(&self.instance),
            func: Arc::new(func),
            _shape: PhantomData,
        };
        self.insert(
            name,
            std::any::type_name::<P>(),
            std::any::type_name::<R>(),
            Arc::new(handler),
        )
    }

    fn insert(
        mut self,
        name: &str,
        params_type: &'static str,
        result_type: &'static str,
        handler: Arc<dyn MethodHandler>,
    ) -> Self {
        if !is_addressable(name) {
            tracing::debug!(service = %self.name, "skipping method {name:?}: not addressable");
            self.skipped.push(name.to_string());
            return self;
        }

        let exported = to_pascal_case(name);
        if self.methods.contains_key(&exported) {
            tracing::debug!(
                service = %self.name,
                "skipping method {name:?}: duplicate of {exported}"
            );
            self.skipped.push(name.to_string());
            return self;
        }

        let method = Method {
            name: exported.clone(),
            params_type,
            result_type,
            handler,
        };
        self.methods.insert(exported, Arc::new(method));
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryConfig {
    /// Fail registration when a service skipped any member.
    pub strict: bool,
}

#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<DashMap<String, Arc<Service>>>,
    config: RegistryConfig,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            services: Arc::default(),
            config,
        }
    }

    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Inserts a service under its derived name. Never overwrites.
    pub fn register<S>(&self, builder: ServiceBuilder<S>) -> Result<(), RegistryError>
    where
        S: Send + Sync + 'static,
    {
        let ServiceBuilder {
            name,
            methods,
            skipped,
            ..
        } = builder;

        if self.config.strict && !skipped.is_empty() {
            return Err(RegistryError::SkippedMembers {
                service: name,
                members: skipped,
            });
        }

        match self.services.entry(name.clone()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered(name)),
            Entry::Vacant(slot) => {
                tracing::debug!(service = %name, methods = methods.len(), "registered service");
                slot.insert(Arc::new(Service { name, methods }));
                Ok(())
            }
        }
    }

    /// Finds a method, retrying the service name in PascalCase on a miss.
    pub fn lookup(&self, service: &str, method: &str) -> Option<Arc<Method>> {
        let found = match self.services.get(service) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                let fallback = to_pascal_case(service);
                Arc::clone(self.services.get(&fallback)?.value())
            }
        };
        found.method(method)
    }

    pub fn contains(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    pub fn service(&self, name: &str) -> Option<Arc<Service>> {
        self.services.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.services.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}

/// Splits `svc.method` or `svc/method` into the service name and the
/// PascalCase method name. One leading separator is ignored.
pub fn resolve_method_name(raw: &str) -> Result<(String, String), RegistryError> {
    let trimmed = raw
        .strip_prefix('.')
        .or_else(|| raw.strip_prefix('/'))
        .unwrap_or(raw);

    let dots = trimmed.matches('.').count();
    let slashes = trimmed.matches('/').count();
    let separator = if dots == 1 {
        '.'
    } else if slashes == 1 {
        '/'
    } else {
        return Err(RegistryError::MalformedMethod(raw.to_string()));
    };

    match trimmed.rsplit_once(separator) {
        Some((service, method)) => Ok((service.to_string(), to_pascal_case(method))),
        None => Err(RegistryError::MalformedMethod(raw.to_string())),
    }
}

/// `user_service` -> `UserService`; segments not starting with `a-z` are kept.
pub fn to_pascal_case(raw: &str) -> String {
    raw.split('_').map(capitalize).collect()
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {
            first.to_ascii_uppercase().to_string() + chars.as_str()
        }
        _ => segment.to_string(),
    }
}

fn is_addressable(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn type_base_name<S>() -> String {
    let full = std::any::type_name::<S>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .to_string()
}
