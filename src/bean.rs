//! Bean descriptors
//!
//! A bean is an immutable component descriptor: a class, the type closure
//! it exposes, its qualifiers, a scope, and a factory variant describing
//! how instances come to be. Descriptors are built during registration and
//! never mutated afterwards.

use crate::injection::InjectionPoint;
use crate::meta::{ClassDef, TypeRef, vocab};
use crate::object::{Handle, Value};
use crate::qualifier::Qualifier;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Scope tags. `Dependent` is the only pseudo-scope; every other scope is
/// normal and hands out client proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScopeKind {
    Application,
    Session,
    Conversation,
    Request,
    #[default]
    Dependent,
}

impl ScopeKind {
    /// Map a scope annotation name to its tag.
    ///
    /// `Singleton` is an alias for the application scope.
    pub fn from_annotation(name: &str) -> Option<Self> {
        match name {
            vocab::APPLICATION_SCOPED | vocab::SINGLETON => Some(Self::Application),
            vocab::SESSION_SCOPED => Some(Self::Session),
            vocab::CONVERSATION_SCOPED => Some(Self::Conversation),
            vocab::REQUEST_SCOPED => Some(Self::Request),
            vocab::DEPENDENT => Some(Self::Dependent),
            _ => None,
        }
    }

    /// Normal scopes require a client proxy; pseudo-scopes do not
    #[inline]
    pub fn is_normal(&self) -> bool {
        !matches!(self, Self::Dependent)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Application => "Application",
            Self::Session => "Session",
            Self::Conversation => "Conversation",
            Self::Request => "Request",
            Self::Dependent => "Dependent",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Closure creating a synthetic bean instance
pub type SyntheticCreate =
    Arc<dyn Fn(&crate::creational::CreationalContext) -> crate::error::Result<Handle> + Send + Sync>;

/// Closure destroying a synthetic bean instance
pub type SyntheticDestroy = Arc<dyn Fn(&Handle) -> crate::error::Result<()> + Send + Sync>;

/// How instances of a bean come to be
#[derive(Clone)]
pub enum BeanKind {
    /// Instantiated through the designated injection constructor
    Managed {
        /// Index into the class's constructor list
        ctor_index: usize,
    },
    /// Created by invoking a producer method on its declaring bean
    ProducerMethod {
        declaring: Arc<str>,
        method: Arc<str>,
        /// Matching `Disposes` method, invoked on destroy
        disposer: Option<Arc<str>>,
    },
    /// Read from a producer field on the declaring bean
    ProducerField { declaring: Arc<str>, field: Arc<str> },
    /// Closure-backed bean registered programmatically
    Synthetic {
        create: SyntheticCreate,
        destroy: Option<SyntheticDestroy>,
    },
    /// Exposes a container service (the bean manager itself)
    BuiltIn,
}

impl fmt::Debug for BeanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed { ctor_index } => {
                f.debug_struct("Managed").field("ctor_index", ctor_index).finish()
            }
            Self::ProducerMethod { declaring, method, .. } => f
                .debug_struct("ProducerMethod")
                .field("declaring", declaring)
                .field("method", method)
                .finish(),
            Self::ProducerField { declaring, field } => f
                .debug_struct("ProducerField")
                .field("declaring", declaring)
                .field("field", field)
                .finish(),
            Self::Synthetic { .. } => f.write_str("Synthetic"),
            Self::BuiltIn => f.write_str("BuiltIn"),
        }
    }
}

static BEAN_IDS: AtomicU64 = AtomicU64::new(1);

/// An immutable bean descriptor
pub struct Bean {
    id: u64,
    pub class: Arc<ClassDef>,
    /// Exposed type set: the bean class plus every assignable supertype
    pub types: Vec<TypeRef>,
    pub qualifiers: Vec<Qualifier>,
    pub scope: ScopeKind,
    pub name: Option<String>,
    pub stereotypes: Vec<Arc<str>>,
    pub alternative: bool,
    /// Only meaningful for alternatives
    pub priority: Option<i64>,
    pub injection_points: Vec<InjectionPoint>,
    pub interceptor_bindings: Vec<Qualifier>,
    /// Beans with validation errors are invisible to the resolver
    pub has_errors: bool,
    pub kind: BeanKind,
    /// One client proxy per normal-scoped bean, created on first reference
    pub(crate) proxy: OnceCell<Handle>,
}

impl Bean {
    pub(crate) fn next_id() -> u64 {
        BEAN_IDS.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn bean_class(&self) -> &Arc<str> {
        &self.class.name
    }

    /// The injection constructor, for managed beans
    pub fn injection_ctor(&self) -> Option<&crate::meta::CtorMeta> {
        match &self.kind {
            BeanKind::Managed { ctor_index } => self.class.ctors.get(*ctor_index),
            _ => None,
        }
    }

    /// Delegate injection point, for decorator classes
    pub fn delegate_point(&self) -> Option<&InjectionPoint> {
        self.injection_points.iter().find(|p| p.delegate)
    }

    /// Dependent instances are handed back raw; normal scopes proxy
    #[inline]
    pub fn needs_proxy(&self) -> bool {
        self.scope.is_normal()
    }
}

impl fmt::Debug for Bean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bean")
            .field("class", &self.class.name)
            .field("scope", &self.scope)
            .field("qualifiers", &self.qualifiers)
            .field("alternative", &self.alternative)
            .field("has_errors", &self.has_errors)
            .field("kind", &self.kind)
            .finish()
    }
}

impl fmt::Display for Bean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.class.name, self.scope)
    }
}

/// Builder used by the registrar and the synthetic registration API
pub struct BeanBuilder {
    class: Arc<ClassDef>,
    types: Vec<TypeRef>,
    qualifiers: Vec<Qualifier>,
    scope: ScopeKind,
    name: Option<String>,
    stereotypes: Vec<Arc<str>>,
    alternative: bool,
    priority: Option<i64>,
    injection_points: Vec<InjectionPoint>,
    interceptor_bindings: Vec<Qualifier>,
    has_errors: bool,
    kind: BeanKind,
}

impl BeanBuilder {
    pub fn new(class: Arc<ClassDef>, kind: BeanKind) -> Self {
        Self {
            class,
            types: Vec::new(),
            qualifiers: Vec::new(),
            scope: ScopeKind::Dependent,
            name: None,
            stereotypes: Vec::new(),
            alternative: false,
            priority: None,
            injection_points: Vec::new(),
            interceptor_bindings: Vec::new(),
            has_errors: false,
            kind,
        }
    }

    pub fn types(mut self, types: Vec<TypeRef>) -> Self {
        self.types = types;
        self
    }

    pub fn qualifiers(mut self, qualifiers: Vec<Qualifier>) -> Self {
        self.qualifiers = qualifiers;
        self
    }

    pub fn scope(mut self, scope: ScopeKind) -> Self {
        self.scope = scope;
        self
    }

    pub fn name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn stereotypes(mut self, stereotypes: Vec<Arc<str>>) -> Self {
        self.stereotypes = stereotypes;
        self
    }

    pub fn alternative(mut self, alternative: bool) -> Self {
        self.alternative = alternative;
        self
    }

    pub fn priority(mut self, priority: Option<i64>) -> Self {
        self.priority = priority;
        self
    }

    pub fn injection_points(mut self, points: Vec<InjectionPoint>) -> Self {
        self.injection_points = points;
        self
    }

    pub fn interceptor_bindings(mut self, bindings: Vec<Qualifier>) -> Self {
        self.interceptor_bindings = bindings;
        self
    }

    pub fn mark_errors(mut self) -> Self {
        self.has_errors = true;
        self
    }

    pub fn build(self) -> Bean {
        Bean {
            id: Bean::next_id(),
            class: self.class,
            types: self.types,
            qualifiers: self.qualifiers,
            scope: self.scope,
            name: self.name,
            stereotypes: self.stereotypes,
            alternative: self.alternative,
            priority: self.priority,
            injection_points: self.injection_points,
            interceptor_bindings: self.interceptor_bindings,
            has_errors: self.has_errors,
            kind: self.kind,
            proxy: OnceCell::new(),
        }
    }
}

/// A live `(bean, instance, creational context)` triple held by a scope map
pub struct ScopeInstance {
    pub bean: Arc<Bean>,
    pub instance: Handle,
    pub creational: Arc<crate::creational::CreationalContext>,
}

impl ScopeInstance {
    pub fn value(&self) -> Value {
        Value::Ref(Arc::clone(&self.instance))
    }
}

impl fmt::Debug for ScopeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeInstance")
            .field("bean", &self.bean.class.name)
            .field("instance", &self.instance.instance_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::ClassDef;

    #[test]
    fn scope_annotation_mapping() {
        assert_eq!(
            ScopeKind::from_annotation(vocab::SINGLETON),
            Some(ScopeKind::Application)
        );
        assert_eq!(
            ScopeKind::from_annotation(vocab::REQUEST_SCOPED),
            Some(ScopeKind::Request)
        );
        assert_eq!(ScopeKind::from_annotation("NotAScope"), None);
    }

    #[test]
    fn dependent_is_the_only_pseudo_scope() {
        assert!(!ScopeKind::Dependent.is_normal());
        for scope in [
            ScopeKind::Application,
            ScopeKind::Session,
            ScopeKind::Conversation,
            ScopeKind::Request,
        ] {
            assert!(scope.is_normal());
        }
    }

    #[test]
    fn bean_ids_are_unique() {
        let class = Arc::new(ClassDef::builder("acme.Svc").build());
        let a = BeanBuilder::new(Arc::clone(&class), BeanKind::Managed { ctor_index: 0 }).build();
        let b = BeanBuilder::new(class, BeanKind::Managed { ctor_index: 0 }).build();
        assert_ne!(a.id(), b.id());
    }
}
