//! Dynamic instances over the reified class model
//!
//! Every value a bean produces or receives is a [`Value`]; contextual
//! instances, intercepted wrappers and client proxies all present the same
//! [`Invocable`] surface, so callers never care which layer they hold.

use crate::error::{ContainerError, Result};
use crate::meta::{ClassDef, TypeSpace};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared handle to an invokable instance
pub type Handle = Arc<dyn Invocable>;

/// The dynamic value type flowing through constructors, fields and methods
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Ref(Handle),
}

impl Value {
    #[inline]
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    #[inline]
    pub fn reference(handle: Handle) -> Self {
        Self::Ref(handle)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[inline]
    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            Self::Ref(handle) => Some(handle),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Identity comparison: references are equal only when they point at
    /// the same instance.
    pub fn same(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Ref(x), Value::Ref(y)) => x.instance_id() == y.instance_id(),
            _ => a == b,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::List(v) => f.debug_list().entries(v).finish(),
            Self::Ref(handle) => write!(f, "ref({}#{})", handle.type_name(), handle.instance_id()),
        }
    }
}

/// Uniform instance surface: concrete objects, interceptor wrappers and
/// client proxies all dispatch through `invoke`.
pub trait Invocable: Send + Sync {
    /// The class name the handle presents
    fn type_name(&self) -> &str;

    /// Stable identity of the underlying instance (proxies mint their own)
    fn instance_id(&self) -> u64;

    /// Dispatch a method call by name
    fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value>;

    /// The concrete object, when the handle is one
    fn as_object(&self) -> Option<&Object> {
        None
    }

    /// Downcast support for host-service handles
    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn Invocable + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name(), self.instance_id())
    }
}

static INSTANCE_IDS: AtomicU64 = AtomicU64::new(1);

/// Mint a fresh instance id (shared with wrapper and proxy handles)
#[inline]
pub(crate) fn next_instance_id() -> u64 {
    INSTANCE_IDS.fetch_add(1, Ordering::Relaxed)
}

/// A concrete instance of a registered class: an identity, a field table
/// and method dispatch along the superclass chain.
pub struct Object {
    id: u64,
    class: Arc<ClassDef>,
    space: Arc<TypeSpace>,
    fields: RwLock<HashMap<String, Value>>,
}

impl Object {
    pub fn new(class: Arc<ClassDef>, space: Arc<TypeSpace>) -> Self {
        Self {
            id: next_instance_id(),
            class,
            space,
            fields: RwLock::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn class(&self) -> &Arc<ClassDef> {
        &self.class
    }

    #[inline]
    pub fn space(&self) -> &Arc<TypeSpace> {
        &self.space
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Read a field; unset fields read as `Null`
    pub fn get(&self, field: &str) -> Value {
        self.fields.read().get(field).cloned().unwrap_or(Value::Null)
    }

    /// Write a field (reflective write; also used for delegate injection)
    pub fn set(&self, field: impl Into<String>, value: Value) {
        self.fields.write().insert(field.into(), value);
    }

    /// Invoke a method declared on this class or a superclass
    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        let (declaring, meta) = self
            .space
            .find_method(&self.class, method)
            .ok_or_else(|| {
                ContainerError::internal(format!(
                    "no method {method} on {}",
                    self.class.name
                ))
            })?;
        let body = meta.body.as_ref().ok_or_else(|| {
            ContainerError::internal(format!(
                "method {}.{method} has no body",
                declaring.name
            ))
        })?;
        body(self, args)
    }
}

impl Invocable for Object {
    #[inline]
    fn type_name(&self) -> &str {
        &self.class.name
    }

    #[inline]
    fn instance_id(&self) -> u64 {
        self.id
    }

    fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.call(method, &args)
    }

    fn as_object(&self) -> Option<&Object> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class.name)
            .field("id", &self.id)
            .field("fields", &self.fields.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::ClassDef;

    fn space_with_greeter() -> Arc<TypeSpace> {
        let space = Arc::new(TypeSpace::new());
        space.register(
            ClassDef::builder("acme.Greeter")
                .field("name", crate::meta::TypeRef::class("lang.String"), vec![])
                .method("greet", vec![], vec![], |this, _| {
                    let name = this.get("name");
                    Ok(Value::str(format!(
                        "hello, {}",
                        name.as_str().unwrap_or("world")
                    )))
                })
                .build(),
        );
        space
    }

    #[test]
    fn fields_default_to_null() {
        let space = space_with_greeter();
        let class = space.load("acme.Greeter").unwrap();
        let obj = Object::new(class, Arc::clone(&space));
        assert!(obj.get("name").is_null());
    }

    #[test]
    fn method_dispatch_reads_fields() {
        let space = space_with_greeter();
        let class = space.load("acme.Greeter").unwrap();
        let obj = Object::new(class, Arc::clone(&space));
        obj.set("name", Value::str("container"));
        let out = obj.call("greet", &[]).unwrap();
        assert_eq!(out.as_str(), Some("hello, container"));
    }

    #[test]
    fn instance_ids_are_unique() {
        let space = space_with_greeter();
        let class = space.load("acme.Greeter").unwrap();
        let a = Object::new(Arc::clone(&class), Arc::clone(&space));
        let b = Object::new(class, space);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn ref_equality_is_identity() {
        let space = space_with_greeter();
        let class = space.load("acme.Greeter").unwrap();
        let a: Handle = Arc::new(Object::new(Arc::clone(&class), Arc::clone(&space)));
        let b: Handle = Arc::new(Object::new(class, space));
        assert!(Value::same(&Value::Ref(Arc::clone(&a)), &Value::Ref(a.clone())));
        assert!(!Value::same(&Value::Ref(a), &Value::Ref(b)));
    }
}
