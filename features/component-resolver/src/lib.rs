//! Runtime dependency resolution for components which may be created asynchronously
//!
//! A [Component] is either a factory, which declares the components it depends on, or a plain
//! value. A [Resolver] discovers everything a requested component needs, orders the work so
//! that every dependency is created before its dependents, runs each factory at most once and
//! caches the result by component identity.
//!
//! ```rust
//! use component_resolver::{Component, RequireError, Resolver};
//!
//! let greeting = Component::labeled_value("Greeting", "Hello");
//! let greeter = Component::factory(|injected| {
//!     let greeting = injected.get::<&str>(0)?;
//!     Ok::<_, RequireError>(format!("{greeting} world"))
//! })
//! .label("Greeter")
//! .depends_on(&greeting)
//! .build();
//!
//! let resolver = Resolver::new();
//! let message = futures::executor::block_on(resolver.get_as::<String>(&greeter)).unwrap();
//! assert_eq!(*message, "Hello world");
//! ```

mod builder;
mod cache;
mod component;
mod container;
pub mod dependency_graph;
mod errors;
mod factories;
pub mod timeout;
mod types;

pub use builder::{ResolverBuilder, ResolverConfig, DEFAULT_RESOLVE_TIMEOUT};
pub use component::{Component, UNNAMED_COMPONENT};
pub use container::{Request, Resolver};
pub use errors::{DependencySlot, RequireError, ResolveError};
pub use factories::{Dependencies, FactoryBuilder, InstanceFactory, Injected};
pub use types::{DynError, Injectable, Instance};
