use std::{any::type_name, collections::BTreeMap, future::Future, sync::Arc};

use futures::{
    future::{self, BoxFuture},
    FutureExt,
};

use crate::{
    component::Component,
    errors::{DependencySlot, RequireError},
    types::{DynError, Injectable, Instance},
};

/// Type erased factory invocation
pub(crate) type ConstructFn =
    Arc<dyn Fn(Injected) -> BoxFuture<'static, Result<Instance, DynError>> + Send + Sync>;

/// A Factory providing instances of a given type
///
/// The trait based counterpart to [Component::factory] - for factories carrying their own state.
pub trait InstanceFactory: Send + Sync + 'static {
    type Provides: Injectable;

    /// Name used in diagnostics, the provided type's name by default
    fn label(&self) -> String {
        type_name::<Self::Provides>().to_string()
    }

    /// Returns the components the factory requires to supply its type
    fn dependencies(&self) -> Dependencies;

    /// Constructs a new instance of the factory's provided type from its resolved dependencies
    fn construct(
        &self,
        injected: Injected,
    ) -> impl Future<Output = Result<Self::Provides, impl Into<DynError>>> + Send + '_;
}

/// Declared dependencies of a factory
///
/// Either positional or named. A slot holding `None` is an undefined dependency, which fails
/// resolution before anything is instantiated.
#[derive(Clone, Debug)]
pub enum Dependencies {
    List(Vec<Option<Component>>),
    Named(BTreeMap<String, Option<Component>>),
}
impl Default for Dependencies {
    fn default() -> Self {
        Dependencies::List(Vec::new())
    }
}

impl Dependencies {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn list<'a>(components: impl IntoIterator<Item = &'a Component>) -> Self {
        Dependencies::List(components.into_iter().cloned().map(Some).collect())
    }

    /// Positional declaration which may contain undefined slots
    pub fn slots(slots: impl IntoIterator<Item = Option<Component>>) -> Self {
        Dependencies::List(slots.into_iter().collect())
    }

    pub fn named<'a, K: Into<String>>(
        components: impl IntoIterator<Item = (K, &'a Component)>,
    ) -> Self {
        Dependencies::Named(
            components
                .into_iter()
                .map(|(name, component)| (name.into(), Some(component.clone())))
                .collect(),
        )
    }

    /// Named declaration which may contain undefined slots
    pub fn named_slots<K: Into<String>>(
        slots: impl IntoIterator<Item = (K, Option<Component>)>,
    ) -> Self {
        Dependencies::Named(
            slots
                .into_iter()
                .map(|(name, component)| (name.into(), component))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            Dependencies::List(list) => list.len(),
            Dependencies::Named(named) => named.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Dependencies::Named(_))
    }

    /// All slots in a stable order - declaration order for lists, key order for named maps
    pub fn iter(&self) -> Box<dyn Iterator<Item = (DependencySlot, Option<&Component>)> + '_> {
        match self {
            Dependencies::List(list) => Box::new(
                list.iter()
                    .enumerate()
                    .map(|(index, slot)| (DependencySlot::Index(index), slot.as_ref())),
            ),
            Dependencies::Named(named) => Box::new(
                named
                    .iter()
                    .map(|(name, slot)| (DependencySlot::Name(name.clone()), slot.as_ref())),
            ),
        }
    }

    /// All defined components, skipping undefined slots
    pub fn components(&self) -> impl Iterator<Item = &Component> + '_ {
        self.iter().filter_map(|(_, component)| component)
    }
}

impl From<&Component> for Dependencies {
    /// A single dependency is a one element list
    fn from(component: &Component) -> Self {
        Dependencies::List(vec![Some(component.clone())])
    }
}
impl From<Component> for Dependencies {
    fn from(component: Component) -> Self {
        Dependencies::List(vec![Some(component)])
    }
}
impl From<Vec<Component>> for Dependencies {
    fn from(components: Vec<Component>) -> Self {
        Dependencies::List(components.into_iter().map(Some).collect())
    }
}
impl From<&[Component]> for Dependencies {
    fn from(components: &[Component]) -> Self {
        Dependencies::list(components)
    }
}
impl<const N: usize> From<[&Component; N]> for Dependencies {
    fn from(components: [&Component; N]) -> Self {
        Dependencies::list(components)
    }
}
impl From<Vec<Option<Component>>> for Dependencies {
    fn from(slots: Vec<Option<Component>>) -> Self {
        Dependencies::List(slots)
    }
}

/// Resolved dependencies handed to a factory, in the shape they were declared
#[derive(Clone, Debug)]
pub enum Injected {
    List(Vec<Instance>),
    Named(BTreeMap<String, Instance>),
}
impl Injected {
    pub fn len(&self) -> usize {
        match self {
            Injected::List(list) => list.len(),
            Injected::Named(named) => named.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Positional access - only for list declarations
    pub fn instance(&self, index: usize) -> Option<&Instance> {
        match self {
            Injected::List(list) => list.get(index),
            Injected::Named(_) => None,
        }
    }

    /// Named access - only for named declarations
    pub fn named_instance(&self, name: &str) -> Option<&Instance> {
        match self {
            Injected::List(_) => None,
            Injected::Named(named) => named.get(name),
        }
    }

    /// Typed access to the dependency at `index`
    pub fn get<T: Injectable>(&self, index: usize) -> Result<Arc<T>, RequireError> {
        self.instance(index)
            .ok_or(RequireError::MissingPosition(index))?
            .downcast()
    }

    /// Typed access to the dependency declared as `name`
    pub fn named<T: Injectable>(&self, name: &str) -> Result<Arc<T>, RequireError> {
        self.named_instance(name)
            .ok_or_else(|| RequireError::MissingName(name.to_string()))?
            .downcast()
    }

    /// All injected instances in declaration order (key order for named declarations)
    pub fn instances(&self) -> Vec<&Instance> {
        match self {
            Injected::List(list) => list.iter().collect(),
            Injected::Named(named) => named.values().collect(),
        }
    }
}

/// Assembles a factory component
#[must_use]
pub struct FactoryBuilder {
    label: Option<String>,
    dependencies: Dependencies,
    construct: ConstructFn,
}
impl FactoryBuilder {
    pub(crate) fn new(construct: ConstructFn) -> Self {
        FactoryBuilder {
            label: None,
            dependencies: Dependencies::default(),
            construct,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn depends_on(mut self, dependencies: impl Into<Dependencies>) -> Self {
        self.dependencies = dependencies.into();
        self
    }

    pub fn build(self) -> Component {
        Component::new_factory(self.label, self.dependencies, self.construct)
    }
}
impl From<FactoryBuilder> for Component {
    fn from(builder: FactoryBuilder) -> Self {
        builder.build()
    }
}

impl Component {
    /// Wraps an [InstanceFactory] as a component
    pub fn instance_factory<F: InstanceFactory>(factory: F) -> Component {
        let label = factory.label();
        let dependencies = factory.dependencies();
        let factory = Arc::new(factory);

        let construct: ConstructFn = Arc::new(move |injected| {
            let factory = factory.clone();
            async move {
                // Forward the call to the specific implementation
                factory
                    .construct(injected)
                    .await
                    .map(Instance::new)
                    .map_err(|e| -> DynError { e.into() })
            }
            .boxed()
        });

        Component::new_factory(Some(label), dependencies, construct)
    }
}

pub(crate) fn construct_sync<T, E, F>(factory: F) -> ConstructFn
where
    T: Injectable,
    E: Into<DynError>,
    F: Fn(Injected) -> Result<T, E> + Send + Sync + 'static,
{
    Arc::new(move |injected| {
        let result: Result<Instance, DynError> =
            factory(injected).map(Instance::new).map_err(|e| e.into());
        future::ready(result).boxed()
    })
}

pub(crate) fn construct_async<T, E, F, Fut>(factory: F) -> ConstructFn
where
    T: Injectable,
    E: Into<DynError>,
    F: Fn(Injected) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Arc::new(move |injected| {
        let construction = factory(injected);
        async move {
            construction
                .await
                .map(Instance::new)
                .map_err(|e| -> DynError { e.into() })
        }
        .boxed()
    })
}
