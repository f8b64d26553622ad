//! Interceptor descriptors and the invocation chain
//!
//! Interceptors are ordered by priority (smaller values outermost) and
//! driven as a chain of responsibility: each around-invoke method receives
//! the invocation context and decides when to `proceed`. The chain itself
//! is an immutable, built-once structure reused across invocations; every
//! call gets a fresh context. Lifecycle callbacks ride the same primitive
//! with a parameter-less terminal.

use crate::error::{ContainerError, Result};
use crate::meta::{Annotated, ClassDef, vocab};
use crate::object::{Handle, Invocable, Value, next_instance_id};
use crate::qualifier::Qualifier;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Descriptor for an interceptor class
pub struct InterceptorInfo {
    pub class: Arc<ClassDef>,
    pub bindings: Vec<Qualifier>,
    pub priority: i64,
    pub around_invoke: Option<Arc<str>>,
    pub around_construct: Option<Arc<str>>,
    pub post_construct: Option<Arc<str>>,
    pub pre_destroy: Option<Arc<str>>,
}

impl InterceptorInfo {
    /// Read the interceptor shape off an annotated class
    pub fn from_class(class: Arc<ClassDef>, bindings: Vec<Qualifier>) -> Self {
        let callback = |annotation: &str| {
            class
                .methods_with(annotation)
                .next()
                .map(|m| Arc::clone(&m.name))
        };
        let priority = class
            .annotation(vocab::PRIORITY)
            .and_then(|a| a.int_value())
            .unwrap_or(i64::MAX);
        Self {
            around_invoke: callback(vocab::AROUND_INVOKE),
            around_construct: callback(vocab::AROUND_CONSTRUCT),
            post_construct: callback(vocab::POST_CONSTRUCT),
            pre_destroy: callback(vocab::PRE_DESTROY),
            class,
            bindings,
            priority,
        }
    }

    /// Does this interceptor bind to a bean with the given bindings?
    /// Every interceptor binding must be present on the bean side.
    pub fn binds_to(&self, bean_bindings: &[Qualifier]) -> bool {
        !self.bindings.is_empty()
            && self
                .bindings
                .iter()
                .all(|b| bean_bindings.iter().any(|bb| bb == b))
    }
}

impl fmt::Debug for InterceptorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorInfo")
            .field("class", &self.class.name)
            .field("priority", &self.priority)
            .field("bindings", &self.bindings)
            .finish()
    }
}

/// One `(interceptor instance, interceptor method)` pair in a chain
#[derive(Clone)]
pub struct ChainLink {
    pub instance: Handle,
    pub method: Arc<str>,
}

/// Immutable, reusable interceptor chain for one target
#[derive(Clone, Default)]
pub struct InterceptorChain {
    links: Arc<[ChainLink]>,
}

impl InterceptorChain {
    /// Build from links already ordered outermost-first
    pub fn new(links: Vec<ChainLink>) -> Self {
        Self {
            links: Arc::from(links),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Drive a business-method invocation through the chain
    pub fn invoke(&self, target: Handle, method: Arc<str>, args: Vec<Value>) -> Result<Value> {
        InvocationContext::begin(
            Arc::clone(&self.links),
            Terminal::Method { target, method },
            args,
        )
    }

    /// Drive a parameter-less lifecycle invocation through the chain
    pub fn invoke_lifecycle(
        &self,
        terminal: impl Fn() -> Result<Value> + Send + Sync + 'static,
    ) -> Result<Value> {
        InvocationContext::begin(
            Arc::clone(&self.links),
            Terminal::Callback(Arc::new(terminal)),
            Vec::new(),
        )
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("links", &self.links.len())
            .finish()
    }
}

/// What runs past the end of the chain
enum Terminal {
    Method { target: Handle, method: Arc<str> },
    Callback(Arc<dyn Fn() -> Result<Value> + Send + Sync>),
}

/// The mutable per-call state handed to each interceptor.
///
/// Interceptor method bodies receive the context as their single argument
/// and talk to it by name: `proceed`, `getMethod`, `getTarget`,
/// `getParameters`, `setParameters`.
pub struct InvocationContext {
    id: u64,
    this: std::sync::Weak<InvocationContext>,
    links: Arc<[ChainLink]>,
    terminal: Terminal,
    args: Mutex<Vec<Value>>,
    index: AtomicUsize,
}

impl InvocationContext {
    fn begin(links: Arc<[ChainLink]>, terminal: Terminal, args: Vec<Value>) -> Result<Value> {
        let ctx = Arc::new_cyclic(|this| Self {
            id: next_instance_id(),
            this: this.clone(),
            links,
            terminal,
            args: Mutex::new(args),
            index: AtomicUsize::new(0),
        });
        ctx.proceed()
    }

    /// Advance the chain: the next interceptor, or the terminal invocation
    pub fn proceed(&self) -> Result<Value> {
        let position = self.index.fetch_add(1, Ordering::SeqCst);
        if let Some(link) = self.links.get(position) {
            let this = self
                .this
                .upgrade()
                .ok_or_else(|| ContainerError::internal("invocation context dropped mid-chain"))?;
            link.instance
                .invoke(&link.method, vec![Value::Ref(this as Handle)])
        } else {
            match &self.terminal {
                Terminal::Method { target, method } => {
                    let args = self.args.lock().clone();
                    target.invoke(method, args)
                }
                Terminal::Callback(callback) => callback(),
            }
        }
    }

    pub fn parameters(&self) -> Vec<Value> {
        self.args.lock().clone()
    }

    pub fn set_parameters(&self, args: Vec<Value>) {
        *self.args.lock() = args;
    }
}

impl Invocable for InvocationContext {
    fn type_name(&self) -> &str {
        "container.InvocationContext"
    }

    fn instance_id(&self) -> u64 {
        self.id
    }

    fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        match method {
            "proceed" => self.proceed(),
            "getMethod" => Ok(match &self.terminal {
                Terminal::Method { method, .. } => Value::str(&**method),
                Terminal::Callback(_) => Value::Null,
            }),
            "getTarget" => Ok(match &self.terminal {
                Terminal::Method { target, .. } => Value::Ref(Arc::clone(target)),
                Terminal::Callback(_) => Value::Null,
            }),
            "getParameters" => Ok(Value::List(self.parameters())),
            "setParameters" => {
                match args.into_iter().next() {
                    Some(Value::List(new_args)) => self.set_parameters(new_args),
                    Some(other) => self.set_parameters(vec![other]),
                    None => self.set_parameters(Vec::new()),
                }
                Ok(Value::Null)
            }
            other => Err(ContainerError::internal(format!(
                "unknown invocation-context operation {other}"
            ))),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An instance wrapped with its interceptor chain.
///
/// Business calls flow through the chain; the wrapped inner handle is the
/// decorator stack (or the raw instance when no decorators apply), so
/// interceptors run outermost.
pub struct InterceptedInstance {
    id: u64,
    inner: Handle,
    chain: InterceptorChain,
}

impl InterceptedInstance {
    pub fn new(inner: Handle, chain: InterceptorChain) -> Self {
        Self {
            id: next_instance_id(),
            inner,
            chain,
        }
    }

    #[inline]
    pub fn inner(&self) -> &Handle {
        &self.inner
    }
}

impl Invocable for InterceptedInstance {
    fn type_name(&self) -> &str {
        self.inner.type_name()
    }

    fn instance_id(&self) -> u64 {
        self.id
    }

    fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.chain
            .invoke(Arc::clone(&self.inner), Arc::from(method), args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for InterceptedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptedInstance")
            .field("class", &self.inner.type_name())
            .field("chain", &self.chain.len())
            .finish()
    }
}
