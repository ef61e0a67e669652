use std::{
    fmt::Debug,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock,
    },
};

use crate::{
    factories::{
        construct_async, construct_sync, ConstructFn, Dependencies, FactoryBuilder, Injected,
    },
    types::{DynError, Injectable, Instance},
};

/// Display name used for components without a label
pub const UNNAMED_COMPONENT: &str = "UnnamedComponent";

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(0);

/// Something the resolver can hand out - a factory or a plain value
///
/// Components compare by identity: two components built from identical parts are still
/// different components. Cloning a component clones the handle.
#[derive(Clone)]
pub struct Component(Arc<ComponentInner>);

struct ComponentInner {
    id: u64,
    label: Option<String>,
    kind: ComponentKind,
}

pub(crate) enum ComponentKind {
    /// Pre-resolved - resolves to itself
    Value(Instance),
    Factory(Factory),
}

pub(crate) struct Factory {
    dependencies: RwLock<Dependencies>,
    construct: ConstructFn,
}

impl Component {
    /// A factory producing its instance synchronously
    ///
    /// ```rust
    /// use std::convert::Infallible;
    /// use component_resolver::Component;
    ///
    /// struct Config {
    ///     url: String,
    /// }
    ///
    /// let config = Component::factory(|_| {
    ///     Ok::<_, Infallible>(Config {
    ///         url: "sqlite::memory:".into(),
    ///     })
    /// })
    /// .label("Config")
    /// .build();
    /// ```
    pub fn factory<T, E, F>(factory: F) -> FactoryBuilder
    where
        T: Injectable,
        E: Into<DynError>,
        F: Fn(Injected) -> Result<T, E> + Send + Sync + 'static,
    {
        FactoryBuilder::new(construct_sync(factory))
    }

    /// A factory producing its instance through a future
    pub fn async_factory<T, E, F, Fut>(factory: F) -> FactoryBuilder
    where
        T: Injectable,
        E: Into<DynError>,
        F: Fn(Injected) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, E>> + Send + 'static,
    {
        FactoryBuilder::new(construct_async(factory))
    }

    /// A pre-resolved value - requesting it returns the value itself
    pub fn value<T: Injectable>(value: T) -> Component {
        Component::from_instance(None, Instance::new(value))
    }

    pub fn labeled_value<T: Injectable>(label: impl Into<String>, value: T) -> Component {
        Component::from_instance(Some(label.into()), Instance::new(value))
    }

    /// A value component resolving to an already existing instance
    pub fn from_instance(label: Option<String>, instance: Instance) -> Component {
        Component::new(label, ComponentKind::Value(instance))
    }

    pub(crate) fn new_factory(
        label: Option<String>,
        dependencies: Dependencies,
        construct: ConstructFn,
    ) -> Component {
        Component::new(
            label,
            ComponentKind::Factory(Factory {
                dependencies: RwLock::new(dependencies),
                construct,
            }),
        )
    }

    fn new(label: Option<String>, kind: ComponentKind) -> Component {
        Component(Arc::new(ComponentInner {
            id: NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed),
            label,
            kind,
        }))
    }

    /// Process-unique identity of this component
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn label(&self) -> Option<&str> {
        self.0.label.as_deref()
    }

    /// Name used in diagnostics
    pub fn display_name(&self) -> &str {
        self.label().unwrap_or(UNNAMED_COMPONENT)
    }

    pub fn is_factory(&self) -> bool {
        matches!(self.0.kind, ComponentKind::Factory(_))
    }

    /// Snapshot of the declared dependencies - values declare none
    pub fn dependencies(&self) -> Dependencies {
        match &self.0.kind {
            ComponentKind::Value(_) => Dependencies::default(),
            ComponentKind::Factory(factory) => factory
                .dependencies
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Replaces the dependency declaration of a factory
    ///
    /// Allows wiring components which refer to each other after both exist.
    /// Returns false, and changes nothing, for value components.
    pub fn declare(&self, dependencies: impl Into<Dependencies>) -> bool {
        match &self.0.kind {
            ComponentKind::Value(_) => false,
            ComponentKind::Factory(factory) => {
                *factory
                    .dependencies
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = dependencies.into();
                true
            }
        }
    }

    pub(crate) fn kind(&self) -> &ComponentKind {
        &self.0.kind
    }
}

impl Factory {
    pub(crate) fn construct(&self) -> &ConstructFn {
        &self.construct
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}
impl Eq for Component {}
impl Hash for Component {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.0.kind {
            ComponentKind::Value(_) => "value",
            ComponentKind::Factory(_) => "factory",
        };
        f.debug_struct("Component")
            .field("id", &self.0.id)
            .field("name", &self.display_name())
            .field("kind", &kind)
            .finish()
    }
}
