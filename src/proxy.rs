//! Client proxies for normal scopes
//!
//! A client proxy is a small record holding a weak bean key and a weak
//! reference to the injection machinery. Every call resolves the current
//! contextual instance and forwards, so one proxy stays valid across scope
//! rotations and a long-lived holder never pins a shorter-lived instance.
//! One proxy is minted per bean and cached on the descriptor, which keeps
//! repeated resolution identity-stable.

use crate::bean::Bean;
use crate::error::{ContainerError, Result};
use crate::instantiate::InjectionTarget;
use crate::object::{Handle, Invocable, Value, next_instance_id};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::trace;

pub struct ClientProxy {
    id: u64,
    class_name: Arc<str>,
    bean: Weak<Bean>,
    target: Weak<InjectionTarget>,
}

impl ClientProxy {
    /// The cached proxy for a normal-scoped bean, created on first use
    pub fn obtain(bean: &Arc<Bean>, target: &Arc<InjectionTarget>) -> Result<Handle> {
        let handle = bean.proxy.get_or_init(|| {
            #[cfg(feature = "logging")]
            trace!(
                target: "contexture",
                bean = %bean.class.name,
                scope = %bean.scope,
                "Minting client proxy"
            );

            Arc::new(ClientProxy {
                id: next_instance_id(),
                class_name: Arc::clone(&bean.class.name),
                bean: Arc::downgrade(bean),
                target: Arc::downgrade(target),
            }) as Handle
        });
        Ok(Arc::clone(handle))
    }

    fn resolve(&self) -> Result<Handle> {
        let bean = self
            .bean
            .upgrade()
            .ok_or_else(|| ContainerError::internal("proxied bean no longer registered"))?;
        let target = self
            .target
            .upgrade()
            .ok_or_else(|| ContainerError::internal("container no longer running"))?;
        target.contextual_instance(&bean)
    }
}

impl Invocable for ClientProxy {
    fn type_name(&self) -> &str {
        &self.class_name
    }

    fn instance_id(&self) -> u64 {
        self.id
    }

    /// Resolve the contextual instance for the current scope and forward
    fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.resolve()?.invoke(method, args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for ClientProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientProxy")
            .field("class", &self.class_name)
            .field("id", &self.id)
            .finish()
    }
}
