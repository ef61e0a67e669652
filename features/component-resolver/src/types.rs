use std::{
    any::{type_name, Any},
    fmt::Debug,
    sync::Arc,
};

use crate::errors::RequireError;

/// All errors must be Send + Sync so they can cross await points
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// We assume that we are using a multithreaded async runtime
/// So anything injectable needs to be Send + Sync + 'static
pub trait Injectable: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Injectable for T {}

/// A resolved value held by the cache
///
/// Cloning an instance clones the handle, not the value: every clone points at the same
/// allocation, which is what [Instance::ptr_eq] compares.
#[derive(Clone)]
pub struct Instance {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync + 'static>,
}
impl Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Instance").field(&self.type_name).finish()
    }
}

impl Instance {
    pub fn new<T: Injectable>(value: T) -> Self {
        Instance {
            type_name: type_name::<T>(),
            value: Arc::new(value),
        }
    }

    /// Wraps a value which is already shared, keeping its identity
    pub fn from_arc<T: Injectable>(value: Arc<T>) -> Self {
        Instance {
            type_name: type_name::<T>(),
            value,
        }
    }

    /// Name of the stored type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Injectable>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast<T: Injectable>(&self) -> Result<Arc<T>, RequireError> {
        Arc::downcast::<T>(self.value.clone()).map_err(|_| RequireError::DowncastFailed {
            required_type: type_name::<T>(),
            actual_type: self.type_name,
        })
    }

    /// True if both handles point at the same value
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}
