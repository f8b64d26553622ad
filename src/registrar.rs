//! Bean validation and registration
//!
//! For every discovered class the registrar decides its role — interceptor,
//! decorator, producer host, alternative, plain managed bean — extracts
//! qualifiers, stereotypes, scope and name, enumerates injection points,
//! and appends a descriptor to the knowledge base. Rule violations mark
//! the bean and append to the definition-error log; registration never
//! aborts on a bad class.

use crate::assignable::Assignability;
use crate::bean::{BeanBuilder, BeanKind, ScopeKind};
use crate::decorator::DecoratorInfo;
use crate::injection::{InjectionPoint, MemberKind, extract_qualifiers};
use crate::interceptor::InterceptorInfo;
use crate::knowledge::KnowledgeBase;
use crate::meta::{Annotated, Annotation, ClassDef, TypeRef, vocab};
use crate::qualifier::{Qualifier, QualifierSchemas, augment};
use crate::scan::DiscoveryMode;
use dashmap::DashMap;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// A stereotype bundles a default scope and the alternative flag
#[derive(Debug, Clone, Copy, Default)]
pub struct StereotypeDef {
    pub scope: Option<ScopeKind>,
    pub alternative: bool,
}

/// Registry of the annotation vocabulary: qualifier schemas, interceptor
/// binding schemas and stereotype definitions. Populated before discovery.
pub struct AnnotationRegistry {
    pub qualifiers: QualifierSchemas,
    pub bindings: QualifierSchemas,
    stereotypes: DashMap<Arc<str>, StereotypeDef, ahash::RandomState>,
}

impl AnnotationRegistry {
    pub fn new() -> Self {
        Self {
            qualifiers: QualifierSchemas::with_builtins(),
            bindings: QualifierSchemas::new(),
            stereotypes: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Declare an interceptor-binding annotation type
    pub fn register_binding<I, S>(&self, name: &str, nonbinding: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bindings.register(name, nonbinding);
    }

    /// Declare a stereotype annotation type
    pub fn register_stereotype(&self, name: &str, def: StereotypeDef) {
        self.stereotypes.insert(Arc::from(name), def);
    }

    pub fn stereotype(&self, name: &str) -> Option<StereotypeDef> {
        self.stereotypes.get(name).map(|r| *r.value())
    }

    /// Annotations that make a type a bean candidate in `Annotated` mode
    pub fn is_bean_defining(&self, annotation: &Annotation) -> bool {
        ScopeKind::from_annotation(&annotation.name).is_some()
            || self.stereotypes.contains_key(&annotation.name)
            || &*annotation.name == vocab::INTERCEPTOR
            || &*annotation.name == vocab::DECORATOR
    }
}

impl Default for AnnotationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AnnotationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationRegistry")
            .field("stereotypes", &self.stereotypes.len())
            .finish()
    }
}

/// The class processor feeding the knowledge base
pub struct BeanRegistrar {
    kb: Arc<KnowledgeBase>,
    assignability: Arc<Assignability>,
    registry: Arc<AnnotationRegistry>,
}

impl BeanRegistrar {
    pub fn new(
        kb: Arc<KnowledgeBase>,
        assignability: Arc<Assignability>,
        registry: Arc<AnnotationRegistry>,
    ) -> Self {
        Self {
            kb,
            assignability,
            registry,
        }
    }

    /// Process one discovered class. Thread-safe; the parallel scanner may
    /// call this from worker threads.
    pub fn process(&self, class: Arc<ClassDef>, mode: DiscoveryMode) {
        self.kb.add_class(Arc::clone(&class));

        if !self.is_candidate(&class) {
            #[cfg(feature = "logging")]
            trace!(target: "contexture", class = %class.name, "Not a bean candidate");
            return;
        }

        if mode == DiscoveryMode::Annotated
            && !class
                .annotations()
                .iter()
                .any(|a| self.registry.is_bean_defining(a))
        {
            #[cfg(feature = "logging")]
            trace!(
                target: "contexture",
                class = %class.name,
                "No bean-defining annotation in annotated mode"
            );
            return;
        }

        if class.has_annotation(vocab::INTERCEPTOR) {
            self.register_interceptor(class);
        } else if class.has_annotation(vocab::DECORATOR) {
            self.register_decorator(class);
        } else {
            self.register_managed(class);
        }
    }

    /// Structural exclusions: these kinds of types are never beans
    fn is_candidate(&self, class: &ClassDef) -> bool {
        let flags = class.flags;
        !(flags.synthetic
            || flags.local
            || flags.anonymous
            || flags.inner_non_static
            || flags.enumeration
            || flags.primitive
            || flags.interface
            || flags.abstract_class)
    }

    // =========================================================================
    // Interceptors
    // =========================================================================

    fn register_interceptor(&self, class: Arc<ClassDef>) {
        let bindings = self.binding_qualifiers(class.annotations());
        if bindings.is_empty() {
            self.kb.definition_error(format!(
                "interceptor {} declares no interceptor binding",
                class.name
            ));
        }
        let info = InterceptorInfo::from_class(Arc::clone(&class), bindings);
        if info.around_invoke.is_none()
            && info.around_construct.is_none()
            && info.post_construct.is_none()
            && info.pre_destroy.is_none()
        {
            self.kb.warning(format!(
                "interceptor {} has no interception methods",
                class.name
            ));
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "contexture",
            class = %class.name,
            priority = info.priority,
            "Registering interceptor"
        );

        self.kb.add_interceptor(Arc::new(info));
    }

    // =========================================================================
    // Decorators
    // =========================================================================

    fn register_decorator(&self, class: Arc<ClassDef>) {
        if class.interfaces.is_empty() {
            self.kb.definition_error(format!(
                "decorator {} implements no interface",
                class.name
            ));
            return;
        }

        let (delegate, delegate_type) = match DecoratorInfo::locate_delegate(&class) {
            Ok(found) => found,
            Err(err) => {
                self.kb.definition_error(err.to_string());
                return;
            }
        };

        // the decorated types are the decorator's interface closure
        let mut decorated_types = Vec::new();
        for interface in &class.interfaces {
            for ty in self.assignability.type_closure(interface) {
                if !decorated_types.contains(&ty) {
                    decorated_types.push(ty);
                }
            }
        }

        let priority = class
            .annotation(vocab::PRIORITY)
            .and_then(|a| a.int_value())
            .unwrap_or(i64::MAX);
        let qualifiers = extract_qualifiers(class.annotations(), &self.registry.qualifiers);

        #[cfg(feature = "logging")]
        debug!(
            target: "contexture",
            class = %class.name,
            priority,
            decorated = decorated_types.len(),
            "Registering decorator"
        );

        self.kb.add_decorator(Arc::new(DecoratorInfo {
            class,
            decorated_types,
            qualifiers,
            priority,
            delegate,
            delegate_type,
        }));
    }

    // =========================================================================
    // Managed beans and producers
    // =========================================================================

    fn register_managed(&self, class: Arc<ClassDef>) {
        let mut has_errors = false;

        // scope: at most one direct scope annotation
        let direct_scopes: Vec<ScopeKind> = class
            .annotations()
            .iter()
            .filter_map(|a| ScopeKind::from_annotation(&a.name))
            .collect();
        if direct_scopes.len() > 1 {
            self.kb.definition_error(format!(
                "bean {} declares {} scopes, exactly one is allowed",
                class.name,
                direct_scopes.len()
            ));
            has_errors = true;
        }

        // stereotypes contribute a default scope and the alternative flag
        let stereotypes: Vec<Arc<str>> = class
            .annotations()
            .iter()
            .filter(|a| self.registry.stereotype(&a.name).is_some())
            .map(|a| Arc::clone(&a.name))
            .collect();
        let stereotype_defaults: Vec<StereotypeDef> = stereotypes
            .iter()
            .filter_map(|name| self.registry.stereotype(name))
            .collect();

        let scope = direct_scopes
            .first()
            .copied()
            .or_else(|| stereotype_defaults.iter().find_map(|s| s.scope))
            .unwrap_or(ScopeKind::Dependent);

        let alternative = class.has_annotation(vocab::ALTERNATIVE)
            || stereotype_defaults.iter().any(|s| s.alternative);
        let priority = class
            .annotation(vocab::PRIORITY)
            .and_then(|a| a.int_value());

        let qualifiers = augment(extract_qualifiers(
            class.annotations(),
            &self.registry.qualifiers,
        ));
        let name = self.bean_name(&class);
        let types = self.assignability.type_closure(&TypeRef::Class(Arc::clone(&class.name)));

        // injection constructor and points
        let (ctor_index, mut points, ctor_ok) = self.select_ctor(&class);
        if !ctor_ok {
            has_errors = true;
        }
        points.extend(self.member_points(&class));

        let interceptor_bindings = self.binding_qualifiers(class.annotations());

        let mut builder = BeanBuilder::new(Arc::clone(&class), BeanKind::Managed { ctor_index })
            .types(types)
            .qualifiers(qualifiers)
            .scope(scope)
            .name(name)
            .stereotypes(stereotypes)
            .alternative(alternative)
            .priority(priority)
            .injection_points(points)
            .interceptor_bindings(interceptor_bindings);
        if has_errors {
            builder = builder.mark_errors();
        }
        let bean = Arc::new(builder.build());
        self.kb.add_bean(Arc::clone(&bean));

        self.register_producers(&class);
    }

    /// Exactly one `Inject` constructor, or the no-arg constructor.
    /// Returns (index, ctor parameter points, ok).
    fn select_ctor(&self, class: &Arc<ClassDef>) -> (usize, Vec<InjectionPoint>, bool) {
        let marked: Vec<usize> = class
            .ctors
            .iter()
            .enumerate()
            .filter(|(_, c)| c.has_annotation(vocab::INJECT))
            .map(|(i, _)| i)
            .collect();

        let (index, ok) = match marked.len() {
            1 => (marked[0], true),
            0 => match class.ctors.iter().position(|c| c.params.is_empty()) {
                Some(i) => (i, true),
                None => {
                    self.kb.definition_error(format!(
                        "bean {} has no injection constructor and no no-arg constructor",
                        class.name
                    ));
                    (0, false)
                }
            },
            n => {
                self.kb.definition_error(format!(
                    "bean {} declares {n} injection constructors, at most one is allowed",
                    class.name
                ));
                (marked[0], false)
            }
        };

        let member: Arc<str> = Arc::from("<init>");
        let points = class
            .ctors
            .get(index)
            .map(|ctor| {
                ctor.params
                    .iter()
                    .enumerate()
                    .map(|(position, param)| {
                        InjectionPoint::for_param(
                            MemberKind::CtorParam,
                            &class.name,
                            &member,
                            position,
                            param,
                            &self.registry.qualifiers,
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        (index, points, ok)
    }

    /// Field and initializer-method injection points, declaration order
    fn member_points(&self, class: &ClassDef) -> Vec<InjectionPoint> {
        let mut points = Vec::new();
        for field in &class.fields {
            if field.has_annotation(vocab::INJECT) || field.has_annotation(vocab::DELEGATE) {
                points.push(InjectionPoint::for_field(
                    &class.name,
                    field,
                    &self.registry.qualifiers,
                ));
            }
        }
        for method in &class.methods {
            if method.has_annotation(vocab::INJECT) {
                for (position, param) in method.params.iter().enumerate() {
                    points.push(InjectionPoint::for_param(
                        MemberKind::MethodParam,
                        &class.name,
                        &method.name,
                        position,
                        param,
                        &self.registry.qualifiers,
                    ));
                }
            }
        }
        points
    }

    /// Producer methods and fields hosted by a managed bean
    fn register_producers(&self, class: &Arc<ClassDef>) {
        for method in class.methods_with(vocab::PRODUCES) {
            let Some(produced) = method.ret.clone() else {
                self.kb.definition_error(format!(
                    "producer method {}.{} declares no return type",
                    class.name, method.name
                ));
                continue;
            };
            let disposer = self.find_disposer(class, &produced);
            let kind = BeanKind::ProducerMethod {
                declaring: Arc::clone(&class.name),
                method: Arc::clone(&method.name),
                disposer,
            };
            // producer-method parameters are injection points of the
            // producer bean, resolved when the method is invoked
            let points = method
                .params
                .iter()
                .enumerate()
                .map(|(position, param)| {
                    InjectionPoint::for_param(
                        MemberKind::MethodParam,
                        &class.name,
                        &method.name,
                        position,
                        param,
                        &self.registry.qualifiers,
                    )
                })
                .collect();
            self.register_producer_bean(class, kind, produced, method.annotations(), points);
        }

        for field in &class.fields {
            if field.has_annotation(vocab::PRODUCES) {
                let kind = BeanKind::ProducerField {
                    declaring: Arc::clone(&class.name),
                    field: Arc::clone(&field.name),
                };
                self.register_producer_bean(
                    class,
                    kind,
                    field.ty.clone(),
                    field.annotations(),
                    Vec::new(),
                );
            }
        }
    }

    fn register_producer_bean(
        &self,
        class: &Arc<ClassDef>,
        kind: BeanKind,
        produced: TypeRef,
        annotations: &[Annotation],
        points: Vec<InjectionPoint>,
    ) {
        let scope = annotations
            .iter()
            .filter_map(|a| ScopeKind::from_annotation(&a.name))
            .next()
            .unwrap_or(ScopeKind::Dependent);
        let qualifiers = augment(extract_qualifiers(annotations, &self.registry.qualifiers));
        let name = annotations
            .iter()
            .find(|a| &*a.name == vocab::NAMED)
            .and_then(|a| a.str_value())
            .map(str::to_string);
        let types = self.assignability.type_closure(&produced);

        #[cfg(feature = "logging")]
        debug!(
            target: "contexture",
            declaring = %class.name,
            produced = %produced,
            scope = %scope,
            "Registering producer bean"
        );

        let bean = BeanBuilder::new(Arc::clone(class), kind)
            .types(types)
            .qualifiers(qualifiers)
            .scope(scope)
            .name(name)
            .injection_points(points)
            .build();
        self.kb.add_producer(Arc::new(bean));
    }

    /// A matching disposer: a method whose first parameter carries
    /// `Disposes` and accepts the produced type
    fn find_disposer(&self, class: &ClassDef, produced: &TypeRef) -> Option<Arc<str>> {
        for method in &class.methods {
            let Some(first) = method.params.first() else { continue };
            if !first.has_annotation(vocab::DISPOSES) {
                continue;
            }
            if self
                .assignability
                .is_assignable(&first.ty, produced)
                .unwrap_or(false)
            {
                return Some(Arc::clone(&method.name));
            }
        }
        None
    }

    /// Annotations that are registered interceptor-binding types
    fn binding_qualifiers(&self, annotations: &[Annotation]) -> Vec<Qualifier> {
        annotations
            .iter()
            .filter(|a| self.registry.bindings.is_qualifier(&a.name))
            .map(|a| Qualifier::from_annotation(a, &self.registry.bindings))
            .collect()
    }

    /// `Named` value, defaulting to the decapitalised simple class name
    fn bean_name(&self, class: &ClassDef) -> Option<String> {
        let named = class.annotation(vocab::NAMED)?;
        if let Some(value) = named.str_value() {
            return Some(value.to_string());
        }
        let simple = class.name.rsplit('.').next().unwrap_or(&class.name);
        let mut chars = simple.chars();
        chars
            .next()
            .map(|first| format!("{}{}", first.to_lowercase(), chars.as_str()))
    }
}

impl std::fmt::Debug for BeanRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanRegistrar").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{ClassFlags, ParamMeta, TypeSpace};
    use crate::object::Value;

    struct Fixture {
        space: Arc<TypeSpace>,
        kb: Arc<KnowledgeBase>,
        registrar: BeanRegistrar,
    }

    fn fixture() -> Fixture {
        let space = Arc::new(TypeSpace::new());
        let kb = Arc::new(KnowledgeBase::new());
        let assignability = Arc::new(Assignability::new(Arc::clone(&space)));
        let registry = Arc::new(AnnotationRegistry::new());
        let registrar = BeanRegistrar::new(Arc::clone(&kb), assignability, registry);
        Fixture {
            space,
            kb,
            registrar,
        }
    }

    #[test]
    fn plain_class_becomes_dependent_bean() {
        let f = fixture();
        let class = f
            .space
            .register(ClassDef::builder("acme.Plain").default_ctor().build());
        f.registrar.process(class, DiscoveryMode::All);

        let beans = f.kb.beans();
        assert_eq!(beans.len(), 1);
        assert_eq!(beans[0].scope, ScopeKind::Dependent);
        assert!(!beans[0].has_errors);
        assert!(beans[0].qualifiers.iter().any(Qualifier::is_default));
    }

    #[test]
    fn interfaces_and_enums_are_excluded() {
        let f = fixture();
        let iface = f
            .space
            .register(ClassDef::builder("acme.Svc").interface().build());
        let enumeration = f.space.register(
            ClassDef::builder("acme.Color")
                .flags(ClassFlags {
                    enumeration: true,
                    ..ClassFlags::default()
                })
                .build(),
        );
        f.registrar.process(iface, DiscoveryMode::All);
        f.registrar.process(enumeration, DiscoveryMode::All);

        assert!(f.kb.beans().is_empty());
        assert_eq!(f.kb.class_count(), 2);
    }

    #[test]
    fn annotated_mode_requires_bean_defining_annotation() {
        let f = fixture();
        let plain = f
            .space
            .register(ClassDef::builder("acme.Plain").default_ctor().build());
        let scoped = f.space.register(
            ClassDef::builder("acme.Scoped")
                .annotated(Annotation::marker(vocab::REQUEST_SCOPED))
                .default_ctor()
                .build(),
        );
        f.registrar.process(plain, DiscoveryMode::Annotated);
        f.registrar.process(scoped, DiscoveryMode::Annotated);

        let beans = f.kb.beans();
        assert_eq!(beans.len(), 1);
        assert_eq!(&**beans[0].bean_class(), "acme.Scoped");
        assert_eq!(beans[0].scope, ScopeKind::Request);
    }

    #[test]
    fn two_scopes_is_a_definition_error() {
        let f = fixture();
        let class = f.space.register(
            ClassDef::builder("acme.TwoScopes")
                .annotated(Annotation::marker(vocab::REQUEST_SCOPED))
                .annotated(Annotation::marker(vocab::SESSION_SCOPED))
                .default_ctor()
                .build(),
        );
        f.registrar.process(class, DiscoveryMode::All);

        let beans = f.kb.beans();
        assert_eq!(beans.len(), 1);
        assert!(beans[0].has_errors);
        assert!(f.kb.valid_beans().is_empty());
        assert_eq!(f.kb.definition_errors().len(), 1);
    }

    #[test]
    fn two_inject_ctors_is_a_definition_error() {
        let f = fixture();
        let class = f.space.register(
            ClassDef::builder("acme.TwoCtors")
                .ctor(vec![], vec![Annotation::marker(vocab::INJECT)], |_, _| Ok(()))
                .ctor(
                    vec![ParamMeta::new("dep", TypeRef::class("acme.Dep"))],
                    vec![Annotation::marker(vocab::INJECT)],
                    |_, _| Ok(()),
                )
                .build(),
        );
        f.registrar.process(class, DiscoveryMode::All);
        assert!(f.kb.beans()[0].has_errors);
    }

    #[test]
    fn interceptor_class_goes_to_interceptor_queue() {
        let f = fixture();
        f.registrar
            .registry
            .register_binding("Logged", None::<String>);
        let class = f.space.register(
            ClassDef::builder("acme.LoggingInterceptor")
                .annotated(Annotation::marker(vocab::INTERCEPTOR))
                .annotated(Annotation::marker("Logged"))
                .annotated(Annotation::priority(100))
                .method(
                    "log",
                    vec![],
                    vec![Annotation::marker(vocab::AROUND_INVOKE)],
                    |_, args| args[0].as_handle().unwrap().invoke("proceed", vec![]),
                )
                .build(),
        );
        f.registrar.process(class, DiscoveryMode::All);

        assert!(f.kb.beans().is_empty());
        let interceptors = f.kb.interceptors();
        assert_eq!(interceptors.len(), 1);
        assert_eq!(interceptors[0].priority, 100);
        assert_eq!(interceptors[0].around_invoke.as_deref(), Some("log"));
    }

    #[test]
    fn decorator_class_goes_to_decorator_queue() {
        let f = fixture();
        f.space
            .register(ClassDef::builder("acme.Svc").interface().build());
        let class = f.space.register(
            ClassDef::builder("acme.LoggingDec")
                .annotated(Annotation::marker(vocab::DECORATOR))
                .annotated(Annotation::priority(100))
                .implements(TypeRef::class("acme.Svc"))
                .field(
                    "delegate",
                    TypeRef::class("acme.Svc"),
                    vec![
                        Annotation::marker(vocab::INJECT),
                        Annotation::marker(vocab::DELEGATE),
                    ],
                )
                .build(),
        );
        f.registrar.process(class, DiscoveryMode::All);

        let decorators = f.kb.decorators();
        assert_eq!(decorators.len(), 1);
        assert!(decorators[0]
            .decorated_types
            .contains(&TypeRef::class("acme.Svc")));
    }

    #[test]
    fn producer_method_emits_a_producer_bean() {
        let f = fixture();
        f.space.register(ClassDef::builder("acme.Conn").build());
        let class = f.space.register(
            ClassDef::builder("acme.ConnFactory")
                .default_ctor()
                .method_returning(
                    "open",
                    TypeRef::class("acme.Conn"),
                    vec![],
                    vec![Annotation::marker(vocab::PRODUCES)],
                    |_, _| Ok(Value::Null),
                )
                .method(
                    "close",
                    vec![ParamMeta::new("conn", TypeRef::class("acme.Conn"))
                        .annotated(Annotation::marker(vocab::DISPOSES))],
                    vec![],
                    |_, _| Ok(Value::Null),
                )
                .build(),
        );
        f.registrar.process(class, DiscoveryMode::All);

        // declaring bean + producer bean on the main queue
        assert_eq!(f.kb.beans().len(), 2);
        let producers = f.kb.producers();
        assert_eq!(producers.len(), 1);
        assert!(producers[0].types.contains(&TypeRef::class("acme.Conn")));
        match &producers[0].kind {
            BeanKind::ProducerMethod { method, disposer, .. } => {
                assert_eq!(&**method, "open");
                assert_eq!(disposer.as_deref(), Some("close"));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn producer_method_parameters_become_injection_points() {
        let f = fixture();
        f.space.register(ClassDef::builder("acme.Conn").build());
        f.space.register(ClassDef::builder("acme.Cfg").build());
        let class = f.space.register(
            ClassDef::builder("acme.ConnFactory")
                .default_ctor()
                .method_returning(
                    "open",
                    TypeRef::class("acme.Conn"),
                    vec![ParamMeta::new("cfg", TypeRef::class("acme.Cfg"))],
                    vec![Annotation::marker(vocab::PRODUCES)],
                    |_, _| Ok(Value::Null),
                )
                .build(),
        );
        f.registrar.process(class, DiscoveryMode::All);

        let producers = f.kb.producers();
        assert_eq!(producers.len(), 1);
        let points = &producers[0].injection_points;
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].kind, MemberKind::MethodParam);
        assert_eq!(&*points[0].member, "open");
        assert_eq!(points[0].position, Some(0));
        assert_eq!(points[0].required_type, TypeRef::class("acme.Cfg"));
        assert!(points[0].qualifiers.iter().any(Qualifier::is_default));
    }

    #[test]
    fn named_without_value_defaults_to_simple_name() {
        let f = fixture();
        let class = f.space.register(
            ClassDef::builder("acme.app.GreeterImpl")
                .annotated(Annotation::marker(vocab::NAMED))
                .default_ctor()
                .build(),
        );
        f.registrar.process(class, DiscoveryMode::All);
        assert_eq!(f.kb.beans()[0].name.as_deref(), Some("greeterImpl"));
    }

    #[test]
    fn alternative_with_priority() {
        let f = fixture();
        let class = f.space.register(
            ClassDef::builder("acme.Backup")
                .annotated(Annotation::marker(vocab::ALTERNATIVE))
                .annotated(Annotation::priority(200))
                .default_ctor()
                .build(),
        );
        f.registrar.process(class, DiscoveryMode::All);
        let bean = &f.kb.beans()[0];
        assert!(bean.alternative);
        assert_eq!(bean.priority, Some(200));
    }

    #[test]
    fn stereotype_contributes_scope_and_alternative() {
        let f = fixture();
        f.registrar.registry.register_stereotype(
            "Model",
            StereotypeDef {
                scope: Some(ScopeKind::Request),
                alternative: false,
            },
        );
        let class = f.space.register(
            ClassDef::builder("acme.Page")
                .annotated(Annotation::marker("Model"))
                .default_ctor()
                .build(),
        );
        f.registrar.process(class, DiscoveryMode::All);
        let bean = &f.kb.beans()[0];
        assert_eq!(bean.scope, ScopeKind::Request);
        assert_eq!(bean.stereotypes.len(), 1);
    }
}
