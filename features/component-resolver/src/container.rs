use std::{
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use crate::{
    builder::{ResolverBuilder, ResolverConfig},
    cache::Cache,
    component::Component,
    dependency_graph::{self, DependencyMap},
    errors::ResolveError,
    types::{Injectable, Instance},
};

/// Resolves components and caches their instances
///
/// Cloning a resolver is cheap - clones share one cache.
#[derive(Clone)]
pub struct Resolver(Arc<ResolverInner>);
struct ResolverInner {
    config: ResolverConfig,
    /// Swapped whole on clear - running resolutions keep the cache they started with
    cache: Mutex<Arc<Cache>>,
}
impl Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_struct("Resolver");
        for (name, resolved) in self.cache().entries() {
            let val = if resolved { "resolved" } else { "resolving" };
            map.field(&name, &val);
        }
        map.finish()
    }
}
impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self::with_config(ResolverConfig::default())
    }

    pub fn with_config(config: ResolverConfig) -> Self {
        Resolver(Arc::new(ResolverInner {
            config,
            cache: Mutex::new(Arc::new(Cache::new())),
        }))
    }

    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.0.config
    }

    /// How long a single factory may take to settle
    pub fn resolve_timeout(&self) -> Duration {
        self.0.config.resolve_timeout
    }

    fn cache(&self) -> Arc<Cache> {
        self.0
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolves one component, or several at once
    ///
    /// Uncached dependencies are discovered recursively, instantiated one after another with
    /// every dependency before its dependents, and cached. The output has the shape of the
    /// request: an [Instance] for a single component, instances in request order for many.
    ///
    /// ```rust
    /// use std::convert::Infallible;
    /// use component_resolver::{Component, Resolver};
    ///
    /// struct Database;
    /// struct Repository {
    ///     db: std::sync::Arc<Database>,
    /// }
    ///
    /// let db = Component::factory(|_| Ok::<_, Infallible>(Database)).label("Database").build();
    /// let repository = Component::factory(|injected| {
    ///     Ok::<_, component_resolver::RequireError>(Repository { db: injected.get(0)? })
    /// })
    /// .label("Repository")
    /// .depends_on(&db)
    /// .build();
    ///
    /// let resolver = Resolver::new();
    /// let [repository, db] = futures::executor::block_on(resolver.get(&[repository, db])).unwrap();
    ///
    /// let repository = repository.downcast::<Repository>().unwrap();
    /// assert!(std::sync::Arc::ptr_eq(&repository.db, &db.downcast::<Database>().unwrap()));
    /// ```
    pub async fn get<R: Request>(&self, request: R) -> Result<R::Output, ResolveError> {
        let roots = request.roots();
        let resolved = self.resolve(&roots).await?;

        R::assemble(resolved).ok_or_else(|| ResolveError::MissingDependency {
            missing: roots
                .iter()
                .map(|root| root.display_name().to_string())
                .collect(),
        })
    }

    /// Resolves a single component and downcasts its instance
    pub async fn get_as<T: Injectable>(&self, component: &Component) -> Result<Arc<T>, ResolveError> {
        let instance = self.get(component).await?;
        instance.downcast().map_err(|source| ResolveError::Downcast {
            component: component.display_name().to_string(),
            source,
        })
    }

    async fn resolve(&self, roots: &[Component]) -> Result<Vec<Instance>, ResolveError> {
        let cache = self.cache();
        let timeout = self.resolve_timeout();

        let map = discover(&cache, roots)?;
        let sequence = dependency_graph::sequence(&map, roots);

        if let Some(cycle) = sequence.cycles.first() {
            let chain: Vec<String> = cycle
                .iter()
                .map(|component| component.display_name().to_string())
                .collect();
            tracing::warn!("Refusing to resolve recursive dependencies: {chain:?}");
            return Err(ResolveError::CyclicDependency { chain });
        }

        // Discovery maps every component it reaches, so this means the graph changed under us
        if !sequence.missing.is_empty() {
            tracing::error!("Dependency map is missing {} components", sequence.missing.len());
            return Err(ResolveError::MissingDependency {
                missing: sequence
                    .missing
                    .iter()
                    .map(|component| component.display_name().to_string())
                    .collect(),
            });
        }

        tracing::debug!(
            "Resolving {} requested components through {} components",
            roots.len(),
            sequence.order.len()
        );

        // Strictly one after another - factories may be asynchronous
        for component in &sequence.order {
            cache.instantiate(component, timeout).await?;
        }

        let mut resolved = Vec::with_capacity(roots.len());
        for root in roots {
            resolved.push(cache.instantiate(root, timeout).await?);
        }

        Ok(resolved)
    }

    /// Registers `value` as the instance of `component`, e.g. for mocking
    ///
    /// Overwrites any cached instance. Everything resolved afterwards which depends on the
    /// component receives `value` - the component's own factory is not invoked.
    pub fn provide<T: Injectable>(&self, component: &Component, value: T) {
        self.provide_instance(component, Instance::new(value));
    }

    /// Like [Resolver::provide], keeping the identity of an existing instance
    pub fn provide_instance(&self, component: &Component, instance: Instance) {
        tracing::debug!("Providing instance for {}", component.display_name());
        self.cache().insert(component, instance);
    }

    /// Forgets every cached instance
    ///
    /// Instances already handed out stay valid, and resolutions which are still running finish
    /// against the cache they started with.
    pub fn clear(&self) {
        tracing::debug!("Clearing resolved components");
        *self.0.cache.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(Cache::new());
    }

    /// True if an instance of the component is cached
    pub fn contains(&self, component: &Component) -> bool {
        self.cache().get(component).is_some()
    }

    /// Number of cached instances
    pub fn len(&self) -> usize {
        self.cache().resolved_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Maps every component reachable from `roots` to its direct dependencies
fn discover(cache: &Cache, roots: &[Component]) -> Result<DependencyMap, ResolveError> {
    let mut map = DependencyMap::new();
    for root in roots {
        discover_recurse(cache, &mut map, root)?;
    }

    return Ok(map);

    fn discover_recurse(
        cache: &Cache,
        map: &mut DependencyMap,
        component: &Component,
    ) -> Result<(), ResolveError> {
        // Shared dependency - already mapped
        if map.contains_key(component) {
            return Ok(());
        }

        // Cached components had all their dependencies cached first, values have none
        if cache.is_known(component) || !component.is_factory() {
            map.insert(component.clone(), Vec::new());
            return Ok(());
        }

        let declared = component.dependencies();
        let mut dependencies = Vec::with_capacity(declared.len());
        for (slot, dependency) in declared.iter() {
            let Some(dependency) = dependency else {
                return Err(ResolveError::UndefinedDependency {
                    component: component.display_name().to_string(),
                    slot,
                });
            };
            dependencies.push(dependency.clone());
        }

        // Insert before recursing so cycles terminate
        map.insert(component.clone(), dependencies.clone());
        for dependency in &dependencies {
            discover_recurse(cache, map, dependency)?;
        }

        Ok(())
    }
}

/// What [Resolver::get] accepts - a single component or an ordered collection of them
pub trait Request {
    type Output;

    /// The requested components in order
    fn roots(&self) -> Vec<Component>;

    /// Shapes the resolved roots into the output, None if their count doesn't fit
    fn assemble(resolved: Vec<Instance>) -> Option<Self::Output>;
}

impl Request for &Component {
    type Output = Instance;

    fn roots(&self) -> Vec<Component> {
        vec![(*self).clone()]
    }

    fn assemble(resolved: Vec<Instance>) -> Option<Self::Output> {
        resolved.into_iter().next()
    }
}
impl Request for Component {
    type Output = Instance;

    fn roots(&self) -> Vec<Component> {
        vec![self.clone()]
    }

    fn assemble(resolved: Vec<Instance>) -> Option<Self::Output> {
        resolved.into_iter().next()
    }
}
impl Request for &[Component] {
    type Output = Vec<Instance>;

    fn roots(&self) -> Vec<Component> {
        self.to_vec()
    }

    fn assemble(resolved: Vec<Instance>) -> Option<Self::Output> {
        Some(resolved)
    }
}
impl Request for Vec<Component> {
    type Output = Vec<Instance>;

    fn roots(&self) -> Vec<Component> {
        self.clone()
    }

    fn assemble(resolved: Vec<Instance>) -> Option<Self::Output> {
        Some(resolved)
    }
}
impl Request for &Vec<Component> {
    type Output = Vec<Instance>;

    fn roots(&self) -> Vec<Component> {
        self.to_vec()
    }

    fn assemble(resolved: Vec<Instance>) -> Option<Self::Output> {
        Some(resolved)
    }
}
impl<const N: usize> Request for [Component; N] {
    type Output = [Instance; N];

    fn roots(&self) -> Vec<Component> {
        self.to_vec()
    }

    fn assemble(resolved: Vec<Instance>) -> Option<Self::Output> {
        resolved.try_into().ok()
    }
}
impl<const N: usize> Request for &[Component; N] {
    type Output = [Instance; N];

    fn roots(&self) -> Vec<Component> {
        self.to_vec()
    }

    fn assemble(resolved: Vec<Instance>) -> Option<Self::Output> {
        resolved.try_into().ok()
    }
}
