//! Reified type and annotation model
//!
//! The container resolves beans against reflective types, not Rust types:
//! a `TypeRef` can carry generic arguments (`List<String>`), a `ClassDef`
//! describes a component class with its hierarchy, annotations and members,
//! and a [`TypeSpace`] is the registry the scanner and the resolver share.
//!
//! Method and constructor bodies are native closures attached to the
//! metadata, so a registered class is directly instantiable and invokable
//! through [`crate::object::Object`].

use crate::error::Result;
use crate::object::{Object, Value};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Names of the host annotation vocabulary recognised by the container.
pub mod vocab {
    pub const INJECT: &str = "Inject";
    pub const SINGLETON: &str = "Singleton";
    pub const NAMED: &str = "Named";
    pub const DEFAULT: &str = "Default";
    pub const ANY: &str = "Any";
    pub const ALTERNATIVE: &str = "Alternative";
    pub const INTERCEPTOR: &str = "Interceptor";
    pub const DECORATOR: &str = "Decorator";
    pub const AROUND_INVOKE: &str = "AroundInvoke";
    pub const AROUND_CONSTRUCT: &str = "AroundConstruct";
    pub const POST_CONSTRUCT: &str = "PostConstruct";
    pub const PRE_DESTROY: &str = "PreDestroy";
    pub const DELEGATE: &str = "Delegate";
    pub const PRODUCES: &str = "Produces";
    pub const DISPOSES: &str = "Disposes";
    pub const PRIORITY: &str = "Priority";
    pub const APPLICATION_SCOPED: &str = "ApplicationScoped";
    pub const SESSION_SCOPED: &str = "SessionScoped";
    pub const CONVERSATION_SCOPED: &str = "ConversationScoped";
    pub const REQUEST_SCOPED: &str = "RequestScoped";
    pub const DEPENDENT: &str = "Dependent";
}

// =============================================================================
// Annotations
// =============================================================================

/// A single annotation member value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationValue {
    Bool(bool),
    Int(i64),
    Str(String),
    /// A reference to an enum constant, by constant name
    EnumConst(String),
    /// Array member; compared elementwise
    List(Vec<AnnotationValue>),
}

impl AnnotationValue {
    #[inline]
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    #[inline]
    pub fn enum_const(value: impl Into<String>) -> Self {
        Self::EnumConst(value.into())
    }
}

/// An annotation instance: a type name plus member values.
///
/// Whether a member participates in equality is not stored here; the
/// binding/non-binding schema lives in [`crate::qualifier::QualifierSchemas`]
/// and is consulted by the binding-aware comparator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Annotation {
    pub name: Arc<str>,
    pub members: BTreeMap<String, AnnotationValue>,
}

impl Annotation {
    /// A marker annotation with no members
    #[inline]
    pub fn marker(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            members: BTreeMap::new(),
        }
    }

    /// Add a member value (builder style)
    #[inline]
    pub fn with(mut self, member: impl Into<String>, value: AnnotationValue) -> Self {
        self.members.insert(member.into(), value);
        self
    }

    /// The built-in `Named(value)` qualifier
    #[inline]
    pub fn named(value: impl Into<String>) -> Self {
        Self::marker(vocab::NAMED).with("value", AnnotationValue::str(value))
    }

    /// A `Priority(value)` annotation
    #[inline]
    pub fn priority(value: i64) -> Self {
        Self::marker(vocab::PRIORITY).with("value", AnnotationValue::Int(value))
    }

    #[inline]
    pub fn member(&self, name: &str) -> Option<&AnnotationValue> {
        self.members.get(name)
    }

    /// Integer `value` member, if present
    pub fn int_value(&self) -> Option<i64> {
        match self.members.get("value") {
            Some(AnnotationValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// String `value` member, if present
    pub fn str_value(&self) -> Option<&str> {
        match self.members.get("value") {
            Some(AnnotationValue::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// Lookup helpers shared by every annotated element
pub trait Annotated {
    fn annotations(&self) -> &[Annotation];

    #[inline]
    fn annotation(&self, name: &str) -> Option<&Annotation> {
        self.annotations().iter().find(|a| &*a.name == name)
    }

    #[inline]
    fn has_annotation(&self, name: &str) -> bool {
        self.annotation(name).is_some()
    }
}

// =============================================================================
// Type references
// =============================================================================

/// A reflective type reference.
///
/// `Class` is a raw (unparameterised) class or interface; `Parameterized`
/// carries concrete or variable arguments; `Variable` and `Wildcard` only
/// occur inside declarations, never at a legal injection point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeRef {
    Class(Arc<str>),
    Parameterized { raw: Arc<str>, args: Vec<TypeRef> },
    Variable(Arc<str>),
    Wildcard,
    Array(Box<TypeRef>),
}

impl TypeRef {
    #[inline]
    pub fn class(name: impl AsRef<str>) -> Self {
        Self::Class(Arc::from(name.as_ref()))
    }

    #[inline]
    pub fn parameterized(raw: impl AsRef<str>, args: Vec<TypeRef>) -> Self {
        Self::Parameterized {
            raw: Arc::from(raw.as_ref()),
            args,
        }
    }

    #[inline]
    pub fn variable(name: impl AsRef<str>) -> Self {
        Self::Variable(Arc::from(name.as_ref()))
    }

    #[inline]
    pub fn array(component: TypeRef) -> Self {
        Self::Array(Box::new(component))
    }

    /// The raw class name, for class and parameterised types
    #[inline]
    pub fn raw_name(&self) -> Option<&Arc<str>> {
        match self {
            Self::Class(name) => Some(name),
            Self::Parameterized { raw, .. } => Some(raw),
            _ => None,
        }
    }

    /// True for wildcard and type-variable references
    #[inline]
    pub fn is_abstract_argument(&self) -> bool {
        matches!(self, Self::Variable(_) | Self::Wildcard)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(name) => write!(f, "{name}"),
            Self::Parameterized { raw, args } => {
                write!(f, "{raw}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
            Self::Variable(name) => write!(f, "{name}"),
            Self::Wildcard => write!(f, "?"),
            Self::Array(component) => write!(f, "{component}[]"),
        }
    }
}

// =============================================================================
// Class members
// =============================================================================

/// Native body of a method: receives the instance and the call arguments
pub type MethodBody = Arc<dyn Fn(&Object, &[Value]) -> Result<Value> + Send + Sync>;

/// Native body of a constructor: initialises a blank instance from arguments
pub type CtorBody = Arc<dyn Fn(&Object, &[Value]) -> Result<()> + Send + Sync>;

/// A constructor or method parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
    pub name: Arc<str>,
    pub ty: TypeRef,
    pub annotations: Vec<Annotation>,
}

impl ParamMeta {
    pub fn new(name: impl AsRef<str>, ty: TypeRef) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            ty,
            annotations: Vec::new(),
        }
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }
}

impl Annotated for ParamMeta {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

/// A field declaration
#[derive(Clone)]
pub struct FieldMeta {
    pub name: Arc<str>,
    pub ty: TypeRef,
    pub annotations: Vec<Annotation>,
    pub transient: bool,
}

impl Annotated for FieldMeta {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

impl fmt::Debug for FieldMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMeta")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("transient", &self.transient)
            .finish()
    }
}

/// A method declaration, optionally carrying a native body
#[derive(Clone)]
pub struct MethodMeta {
    pub name: Arc<str>,
    pub params: Vec<ParamMeta>,
    /// Declared return type; `None` reads as void
    pub ret: Option<TypeRef>,
    pub annotations: Vec<Annotation>,
    pub body: Option<MethodBody>,
}

impl Annotated for MethodMeta {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

impl fmt::Debug for MethodMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodMeta")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// A constructor declaration
#[derive(Clone)]
pub struct CtorMeta {
    pub params: Vec<ParamMeta>,
    pub annotations: Vec<Annotation>,
    pub body: Option<CtorBody>,
}

impl Annotated for CtorMeta {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

impl fmt::Debug for CtorMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CtorMeta")
            .field("params", &self.params.len())
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

// =============================================================================
// Class definitions
// =============================================================================

/// Structural flags that affect bean candidacy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassFlags {
    pub interface: bool,
    pub abstract_class: bool,
    pub enumeration: bool,
    pub primitive: bool,
    pub synthetic: bool,
    pub local: bool,
    pub anonymous: bool,
    pub inner_non_static: bool,
}

/// An immutable class definition.
///
/// Built through [`ClassBuilder`]; once registered in a [`TypeSpace`] it is
/// shared behind an `Arc` and never mutated.
#[derive(Clone)]
pub struct ClassDef {
    pub name: Arc<str>,
    pub flags: ClassFlags,
    /// Declared type parameters, e.g. `["E"]` for a list class
    pub type_params: Vec<Arc<str>>,
    /// Generic superclass edge; `None` ends the hierarchy
    pub superclass: Option<TypeRef>,
    /// Generic interface edges
    pub interfaces: Vec<TypeRef>,
    pub annotations: Vec<Annotation>,
    pub ctors: Vec<CtorMeta>,
    pub fields: Vec<FieldMeta>,
    pub methods: Vec<MethodMeta>,
}

impl Annotated for ClassDef {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("superclass", &self.superclass)
            .field("interfaces", &self.interfaces)
            .field("fields", &self.fields.len())
            .field("methods", &self.methods.len())
            .finish()
    }
}

impl ClassDef {
    /// Start building a class definition
    pub fn builder(name: impl AsRef<str>) -> ClassBuilder {
        ClassBuilder::new(name)
    }

    /// This class as a type reference: parameterised over its own variables
    /// when it declares type parameters, raw otherwise.
    pub fn as_type(&self) -> TypeRef {
        if self.type_params.is_empty() {
            TypeRef::Class(Arc::clone(&self.name))
        } else {
            TypeRef::Parameterized {
                raw: Arc::clone(&self.name),
                args: self
                    .type_params
                    .iter()
                    .map(|p| TypeRef::Variable(Arc::clone(p)))
                    .collect(),
            }
        }
    }

    #[inline]
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| &*f.name == name)
    }

    #[inline]
    pub fn method(&self, name: &str) -> Option<&MethodMeta> {
        self.methods.iter().find(|m| &*m.name == name)
    }

    /// Methods carrying a given annotation, in declaration order
    pub fn methods_with(&self, annotation: &str) -> impl Iterator<Item = &MethodMeta> {
        self.methods.iter().filter(move |m| m.has_annotation(annotation))
    }
}

/// Fluent builder for [`ClassDef`]
pub struct ClassBuilder {
    def: ClassDef,
}

impl ClassBuilder {
    fn new(name: impl AsRef<str>) -> Self {
        Self {
            def: ClassDef {
                name: Arc::from(name.as_ref()),
                flags: ClassFlags::default(),
                type_params: Vec::new(),
                superclass: None,
                interfaces: Vec::new(),
                annotations: Vec::new(),
                ctors: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
            },
        }
    }

    pub fn interface(mut self) -> Self {
        self.def.flags.interface = true;
        self
    }

    pub fn flags(mut self, flags: ClassFlags) -> Self {
        self.def.flags = flags;
        self
    }

    pub fn type_param(mut self, name: impl AsRef<str>) -> Self {
        self.def.type_params.push(Arc::from(name.as_ref()));
        self
    }

    pub fn extends(mut self, superclass: TypeRef) -> Self {
        self.def.superclass = Some(superclass);
        self
    }

    pub fn implements(mut self, interface: TypeRef) -> Self {
        self.def.interfaces.push(interface);
        self
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.def.annotations.push(annotation);
        self
    }

    /// A no-argument constructor with no body
    pub fn default_ctor(mut self) -> Self {
        self.def.ctors.push(CtorMeta {
            params: Vec::new(),
            annotations: Vec::new(),
            body: None,
        });
        self
    }

    pub fn ctor(
        mut self,
        params: Vec<ParamMeta>,
        annotations: Vec<Annotation>,
        body: impl Fn(&Object, &[Value]) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.def.ctors.push(CtorMeta {
            params,
            annotations,
            body: Some(Arc::new(body)),
        });
        self
    }

    pub fn field(mut self, name: impl AsRef<str>, ty: TypeRef, annotations: Vec<Annotation>) -> Self {
        self.def.fields.push(FieldMeta {
            name: Arc::from(name.as_ref()),
            ty,
            annotations,
            transient: false,
        });
        self
    }

    pub fn transient_field(
        mut self,
        name: impl AsRef<str>,
        ty: TypeRef,
        annotations: Vec<Annotation>,
    ) -> Self {
        self.def.fields.push(FieldMeta {
            name: Arc::from(name.as_ref()),
            ty,
            annotations,
            transient: true,
        });
        self
    }

    /// A method without a native body (interface method, producer metadata)
    pub fn abstract_method(
        mut self,
        name: impl AsRef<str>,
        params: Vec<ParamMeta>,
        annotations: Vec<Annotation>,
    ) -> Self {
        self.def.methods.push(MethodMeta {
            name: Arc::from(name.as_ref()),
            params,
            ret: None,
            annotations,
            body: None,
        });
        self
    }

    pub fn method(
        mut self,
        name: impl AsRef<str>,
        params: Vec<ParamMeta>,
        annotations: Vec<Annotation>,
        body: impl Fn(&Object, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.def.methods.push(MethodMeta {
            name: Arc::from(name.as_ref()),
            params,
            ret: None,
            annotations,
            body: Some(Arc::new(body)),
        });
        self
    }

    /// A method with a declared return type (producer methods need one)
    pub fn method_returning(
        mut self,
        name: impl AsRef<str>,
        ret: TypeRef,
        params: Vec<ParamMeta>,
        annotations: Vec<Annotation>,
        body: impl Fn(&Object, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.def.methods.push(MethodMeta {
            name: Arc::from(name.as_ref()),
            params,
            ret: Some(ret),
            annotations,
            body: Some(Arc::new(body)),
        });
        self
    }

    pub fn build(self) -> ClassDef {
        self.def
    }
}

// =============================================================================
// TypeSpace
// =============================================================================

/// The class registry shared by scanner, validator and resolver.
///
/// Registration is concurrent (the parallel scanner feeds it from a worker
/// pool) and idempotent: re-registering a name keeps the first definition.
pub struct TypeSpace {
    classes: DashMap<Arc<str>, Arc<ClassDef>, ahash::RandomState>,
}

impl TypeSpace {
    #[inline]
    pub fn new() -> Self {
        Self {
            classes: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Register a class definition. Returns the shared handle; on duplicate
    /// names the already-registered definition wins.
    pub fn register(&self, def: ClassDef) -> Arc<ClassDef> {
        let name = Arc::clone(&def.name);
        let entry = self.classes.entry(name).or_insert_with(|| Arc::new(def));
        Arc::clone(entry.value())
    }

    #[inline]
    pub fn load(&self, name: &str) -> Option<Arc<ClassDef>> {
        self.classes.get(name).map(|r| Arc::clone(r.value()))
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Resolved superclass definition, if the edge names a registered class
    pub fn superclass_def(&self, def: &ClassDef) -> Option<Arc<ClassDef>> {
        def.superclass
            .as_ref()
            .and_then(|s| s.raw_name())
            .and_then(|raw| self.load(raw))
    }

    /// The class chain from the given class up to the hierarchy root
    pub fn hierarchy(&self, def: &Arc<ClassDef>) -> Vec<Arc<ClassDef>> {
        let mut chain = vec![Arc::clone(def)];
        let mut current = Arc::clone(def);
        while let Some(superclass) = self.superclass_def(&current) {
            chain.push(Arc::clone(&superclass));
            current = superclass;
        }
        chain
    }

    /// Find a method by name on the class or its superclass chain
    pub fn find_method(&self, def: &Arc<ClassDef>, name: &str) -> Option<(Arc<ClassDef>, MethodMeta)> {
        for class in self.hierarchy(def) {
            if let Some(method) = class.method(name) {
                return Some((Arc::clone(&class), method.clone()));
            }
        }
        None
    }
}

impl Default for TypeSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSpace")
            .field("classes", &self.classes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_ref_display() {
        let list_of_string = TypeRef::parameterized("collections.List", vec![TypeRef::class("lang.String")]);
        assert_eq!(list_of_string.to_string(), "collections.List<lang.String>");
        assert_eq!(TypeRef::array(TypeRef::class("lang.Int")).to_string(), "lang.Int[]");
        assert_eq!(TypeRef::Wildcard.to_string(), "?");
    }

    #[test]
    fn as_type_uses_declared_variables() {
        let def = ClassDef::builder("collections.List")
            .interface()
            .type_param("E")
            .build();
        assert_eq!(
            def.as_type(),
            TypeRef::parameterized("collections.List", vec![TypeRef::variable("E")])
        );
    }

    #[test]
    fn register_is_idempotent() {
        let space = TypeSpace::new();
        let first = space.register(ClassDef::builder("acme.Svc").default_ctor().build());
        let second = space.register(ClassDef::builder("acme.Svc").build());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.ctors.len(), 1);
    }

    #[test]
    fn hierarchy_walk_and_method_lookup() {
        let space = TypeSpace::new();
        space.register(
            ClassDef::builder("acme.Base")
                .method("ping", vec![], vec![], |_, _| Ok(Value::Str("pong".into())))
                .build(),
        );
        let sub = space.register(
            ClassDef::builder("acme.Sub")
                .extends(TypeRef::class("acme.Base"))
                .build(),
        );

        let chain = space.hierarchy(&sub);
        assert_eq!(chain.len(), 2);
        assert_eq!(&*chain[1].name, "acme.Base");

        let (declaring, method) = space.find_method(&sub, "ping").unwrap();
        assert_eq!(&*declaring.name, "acme.Base");
        assert_eq!(&*method.name, "ping");
    }

    #[test]
    fn annotation_member_access() {
        let named = Annotation::named("greeter");
        assert_eq!(named.str_value(), Some("greeter"));
        assert_eq!(Annotation::priority(100).int_value(), Some(100));
    }
}
