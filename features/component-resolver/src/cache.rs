use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::{
    future::{self, BoxFuture, Either, Shared},
    FutureExt,
};

use crate::{
    component::{Component, ComponentKind},
    errors::{DependencySlot, ResolveError},
    factories::{ConstructFn, Dependencies, Injected},
    timeout::{run_detached, Elapsed, Timer},
    types::Instance,
};

/// An instantiation every interested caller can await
type PendingInstance = Shared<BoxFuture<'static, Result<Instance, ResolveError>>>;

/// Identity keyed store of resolved instances
///
/// Also tracks instantiations which are currently running, so a factory is never invoked twice
/// for the same cache.
#[derive(Default)]
pub(crate) struct Cache {
    slots: Mutex<HashMap<u64, Entry>>,
}

struct Entry {
    name: String,
    slot: Slot,
}

enum Slot {
    Resolved(Instance),
    /// The factory is running - settled by the first caller to see it finish
    Pending(PendingInstance),
}

impl Cache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        // Entries are replaced whole, so a panicking holder can't leave one half written
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The resolved instance, if any
    pub(crate) fn get(&self, component: &Component) -> Option<Instance> {
        match self.lock().get(&component.id()) {
            Some(Entry {
                slot: Slot::Resolved(instance),
                ..
            }) => Some(instance.clone()),
            _ => None,
        }
    }

    /// True if the component is resolved or being resolved
    pub(crate) fn is_known(&self, component: &Component) -> bool {
        self.lock().contains_key(&component.id())
    }

    /// Unconditionally stores an instance for the component
    pub(crate) fn insert(&self, component: &Component, instance: Instance) {
        self.lock().insert(
            component.id(),
            Entry {
                name: component.display_name().to_string(),
                slot: Slot::Resolved(instance),
            },
        );
    }

    pub(crate) fn resolved_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|entry| matches!(entry.slot, Slot::Resolved(_)))
            .count()
    }

    /// Names of all entries, and whether they are resolved yet
    pub(crate) fn entries(&self) -> Vec<(String, bool)> {
        self.lock()
            .values()
            .map(|entry| (entry.name.clone(), matches!(entry.slot, Slot::Resolved(_))))
            .collect()
    }

    /// Returns the instance of a component, creating and caching it if necessary
    ///
    /// All declared dependencies of the component must already be resolved.
    pub(crate) async fn instantiate(
        &self,
        component: &Component,
        timeout: Duration,
    ) -> Result<Instance, ResolveError> {
        let id = component.id();

        let mut started = None;
        let pending = {
            let mut slots = self.lock();

            match slots.get(&id).map(|entry| &entry.slot) {
                Some(Slot::Resolved(instance)) => return Ok(instance.clone()),
                Some(Slot::Pending(pending)) => {
                    tracing::trace!(
                        "Waiting on running instantiation of {}",
                        component.display_name()
                    );
                    pending.clone()
                }
                None => match component.kind() {
                    ComponentKind::Value(instance) => {
                        slots.insert(
                            id,
                            Entry {
                                name: component.display_name().to_string(),
                                slot: Slot::Resolved(instance.clone()),
                            },
                        );
                        return Ok(instance.clone());
                    }
                    ComponentKind::Factory(factory) => {
                        let injected = inject(&slots, component)?;
                        let pending = start_instantiation(
                            component,
                            factory.construct().clone(),
                            injected,
                            timeout,
                        );

                        slots.insert(
                            id,
                            Entry {
                                name: component.display_name().to_string(),
                                slot: Slot::Pending(pending.clone()),
                            },
                        );
                        started = Some(Abandoned {
                            cache: self,
                            id,
                            pending: Some(pending.clone()),
                        });
                        pending
                    }
                },
            }
        };

        let result = pending.clone().await;
        if let Some(mut started) = started {
            started.pending = None;
        }

        // Settle the slot - unless it was replaced while the factory ran
        let mut slots = self.lock();
        let settle = match slots.get(&id) {
            Some(Entry {
                slot: Slot::Pending(current),
                ..
            }) => current.ptr_eq(&pending),
            // Its starter gave up on it while we were still waiting
            None => true,
            Some(_) => false,
        };
        if settle {
            match &result {
                Ok(instance) => {
                    slots.insert(
                        id,
                        Entry {
                            name: component.display_name().to_string(),
                            slot: Slot::Resolved(instance.clone()),
                        },
                    );
                }
                Err(_) => {
                    // Failures are not cached - a later call may try again
                    slots.remove(&id);
                }
            }
        }

        result
    }
}

/// Removes the pending slot of an instantiation whose starter was dropped before it settled
///
/// Callers already waiting on it keep driving it and settle the slot themselves. Without
/// waiters the slot would otherwise stay pending forever.
struct Abandoned<'a> {
    cache: &'a Cache,
    id: u64,
    /// None once the instantiation settled
    pending: Option<PendingInstance>,
}
impl Drop for Abandoned<'_> {
    fn drop(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        let mut slots = self.cache.lock();
        if let Some(Entry {
            name,
            slot: Slot::Pending(current),
        }) = slots.get(&self.id)
        {
            if current.ptr_eq(&pending) {
                tracing::debug!("Instantiation of {name} was abandoned");
                slots.remove(&self.id);
            }
        }
    }
}

/// Collects the cached instances of all dependencies, keeping the declared shape
fn inject(slots: &HashMap<u64, Entry>, component: &Component) -> Result<Injected, ResolveError> {
    let lookup = |slot: DependencySlot, dependency: Option<&Component>| {
        let Some(dependency) = dependency else {
            return Err(ResolveError::UndefinedDependency {
                component: component.display_name().to_string(),
                slot,
            });
        };

        match slots.get(&dependency.id()) {
            Some(Entry {
                slot: Slot::Resolved(instance),
                ..
            }) => Ok(instance.clone()),
            _ => Err(ResolveError::UnresolvedDependency {
                component: component.display_name().to_string(),
                dependency: dependency.display_name().to_string(),
            }),
        }
    };

    match component.dependencies() {
        Dependencies::List(list) => list
            .iter()
            .enumerate()
            .map(|(index, dependency)| lookup(DependencySlot::Index(index), dependency.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Injected::List),
        Dependencies::Named(named) => named
            .iter()
            .map(|(name, dependency)| {
                let instance = lookup(DependencySlot::Name(name.clone()), dependency.as_ref())?;
                Ok::<_, ResolveError>((name.clone(), instance))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Injected::Named),
    }
}

/// Invokes the factory once first polled, waiting at most `timeout` for it to settle
///
/// A factory which is still running when the timer fires is not cancelled. It keeps running on
/// a helper thread and whatever it eventually settles with is discarded.
fn start_instantiation(
    component: &Component,
    construct: ConstructFn,
    injected: Injected,
    timeout: Duration,
) -> PendingInstance {
    let name = component.display_name().to_string();

    async move {
        tracing::debug!("Instantiating {name}");

        let mut construction = construct(injected);
        // Synchronous factories are done on the first poll and never need a timer
        let outcome = match (&mut construction).now_or_never() {
            Some(result) => Ok(result),
            None => match future::select(construction, Timer::new(timeout)).await {
                Either::Left((result, _timer)) => Ok(result),
                Either::Right((elapsed, construction)) => {
                    run_detached(construction);
                    Err(elapsed)
                }
            },
        };

        match outcome {
            Ok(Ok(instance)) => {
                tracing::debug!("Constructed instance of {name}");
                Ok(instance)
            }
            Ok(Err(error)) => {
                tracing::warn!("Factory for {name} failed - error: {error}");
                Err(ResolveError::InstantiationFailure {
                    component: name,
                    error: Arc::new(error),
                })
            }
            Err(Elapsed(timeout)) => {
                tracing::warn!(
                    "Factory for {name} did not settle within {timeout:?} - its result will be ignored"
                );
                Err(ResolveError::InstantiationTimeout {
                    component: name,
                    timeout,
                })
            }
        }
    }
    .boxed()
    .shared()
}
