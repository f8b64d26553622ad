//! # Contexture - Contextual Dependency Injection for Rust
//!
//! A contextual DI container working over a reified type model: beans are
//! discovered by scanning directories and archives (or registered
//! programmatically), resolved by type *and* qualifier with invariant
//! generics, instantiated lazily under a scope discipline, wrapped in
//! interceptor and decorator chains, and destroyed orderly when their
//! scope ends.
//!
//! ## Features
//!
//! - 🔎 **Typed resolution** - injection points match on reflective types
//!   with invariant generic arguments: `List<String>` never satisfies
//!   `List<Object>`
//! - 🏷️ **Qualifiers** - binding-aware annotation matching with
//!   non-binding members and the built-in `Default` / `Any` / `Named`
//! - 🔄 **Scopes** - application, session, conversation, request and
//!   dependent contexts with exactly-once creation and client proxies
//! - 🧅 **Interceptors & decorators** - priority-ordered around-invoke
//!   chains and delegate-injected decorator stacks
//! - 🏭 **Producers** - method and field producers with disposer support
//! - 📊 **Observable** - optional tracing integration with JSON or pretty
//!   output
//!
//! ## Quick Start
//!
//! ```rust
//! use contexture::prelude::*;
//! use contexture::meta::{Annotation, ClassDef, vocab};
//!
//! let manager = ContainerBuilder::new()
//!     .with_class(
//!         ClassDef::builder("app.Greeter")
//!             .annotated(Annotation::marker(vocab::SINGLETON))
//!             .ctor(vec![], vec![], |this, _| {
//!                 this.set("name", Value::str("world"));
//!                 Ok(())
//!             })
//!             .method("greet", vec![], vec![], |this, _| {
//!                 let name = this.get("name");
//!                 Ok(Value::str(format!("hello, {}", name.as_str().unwrap_or("?"))))
//!             })
//!             .build(),
//!     )
//!     .boot()
//!     .unwrap();
//!
//! let greeter = manager
//!     .get_instance(&TypeRef::class("app.Greeter"), &[])
//!     .unwrap();
//! let reply = greeter.as_handle().unwrap().invoke("greet", vec![]).unwrap();
//! assert_eq!(reply.as_str(), Some("hello, world"));
//!
//! manager.shutdown();
//! ```
//!
//! ## Lifecycle
//!
//! `bootstrap → serve → shutdown`: [`ContainerBuilder::boot`] scans,
//! validates and registers beans, runs extension hooks, verifies every
//! injection point (raising an aggregate deployment error on problems) and
//! publishes the registry. There is no ambient singleton: the
//! [`BeanManager`] is passed explicitly.

pub mod assignable;
pub mod bean;
pub mod context;
pub mod creational;
pub mod decorator;
pub mod error;
pub mod injection;
pub mod instantiate;
pub mod interceptor;
pub mod knowledge;
#[cfg(feature = "logging")]
pub mod logging;
pub mod manager;
pub mod meta;
pub mod object;
pub mod proxy;
pub mod qualifier;
pub mod registrar;
pub mod resolver;
pub mod scan;
pub mod spi;

pub use assignable::Assignability;
pub use bean::{Bean, BeanKind, ScopeKind};
pub use error::{ContainerError, Result};
pub use injection::{InjectionPoint, MemberKind};
pub use manager::{
    BEAN_MANAGER_CLASS, BeanManager, ContainerBuilder, ContainerState, ManagerHandle,
    SyntheticBean,
};
pub use meta::{Annotation, AnnotationValue, ClassDef, TypeRef, TypeSpace};
pub use object::{Handle, Invocable, Object, Value};
pub use qualifier::{Qualifier, QualifierSchemas};
pub use scan::{DiscoveryMode, ParallelScanner, ScanRoot, ScanSink, Scanner};

// Re-export tracing macros for convenience when logging is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error as error_log, info, trace, warn};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bean::{Bean, ScopeKind};
    pub use crate::error::{ContainerError, Result};
    pub use crate::manager::{BeanManager, ContainerBuilder, SyntheticBean};
    pub use crate::meta::TypeRef;
    pub use crate::object::{Handle, Invocable, Value};
    pub use crate::qualifier::Qualifier;
    pub use crate::scan::{DiscoveryMode, ScanRoot};
    pub use std::sync::Arc;
}
