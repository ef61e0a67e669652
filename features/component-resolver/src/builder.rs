use std::time::Duration;

use crate::{
    component::Component,
    container::Resolver,
    types::{Injectable, Instance},
};

/// Time a single factory gets to settle before its instantiation fails
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_millis(2500);

/// Settings of a [Resolver]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Applies to each factory on its own, not to a whole resolution
    pub resolve_timeout: Duration,
}
impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }
}

/// Configures a [Resolver] and seeds its cache
///
/// ```rust
/// use std::time::Duration;
/// use component_resolver::{Component, Resolver};
///
/// let database_url = Component::labeled_value("DatabaseUrl", "postgres://prod".to_string());
///
/// let resolver = Resolver::builder()
///     .resolve_timeout(Duration::from_secs(1))
///     .provide(&database_url, "sqlite::memory:".to_string())
///     .build();
///
/// assert!(resolver.contains(&database_url));
/// ```
#[must_use]
#[derive(Default)]
pub struct ResolverBuilder {
    config: ResolverConfig,
    /// Instances placed in the cache on build
    provided: Vec<(Component, Instance)>,
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve_timeout(mut self, timeout: Duration) -> Self {
        self.config.resolve_timeout = timeout;
        self
    }

    /// Pre-resolves a component, same as [Resolver::provide] after building
    pub fn provide<T: Injectable>(self, component: &Component, value: T) -> Self {
        self.provide_instance(component, Instance::new(value))
    }

    pub fn provide_instance(mut self, component: &Component, instance: Instance) -> Self {
        self.provided.push((component.clone(), instance));
        self
    }

    pub fn build(self) -> Resolver {
        let ResolverBuilder { config, provided } = self;

        tracing::debug!(
            "Building resolver with {} provided instances, resolve timeout {:?}",
            provided.len(),
            config.resolve_timeout
        );

        let resolver = Resolver::with_config(config);
        for (component, instance) in provided {
            resolver.provide_instance(&component, instance);
        }
        resolver
    }
}
