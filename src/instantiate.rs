//! Instance production and injection
//!
//! The injection target drives a bean from constructor selection through
//! recursive argument resolution, field and method injection in
//! superclass-first order, lifecycle callbacks, and finally decorator and
//! interceptor wrapping. It is also the [`InstanceLifecycle`] the scope
//! contexts call back into, which closes the loop between resolution and
//! contexts without either side owning the other.

use crate::assignable::Assignability;
use crate::bean::{Bean, BeanKind};
use crate::context::{ContextManager, InstanceLifecycle, swallow_destroy_error};
use crate::creational::CreationalContext;
use crate::decorator::{DecoratorInfo, DelegatePoint};
use crate::error::{ContainerError, Result};
use crate::injection::{InjectionPoint, MemberKind};
use crate::interceptor::{ChainLink, InterceptorChain, InterceptorInfo};
use crate::knowledge::KnowledgeBase;
use crate::meta::{Annotated, ClassDef, TypeSpace, vocab};
use crate::object::{Handle, Object, Value};
use crate::proxy::ClientProxy;
use crate::registrar::AnnotationRegistry;
use crate::resolver::BeanResolver;
use once_cell::sync::OnceCell;
use std::cell::RefCell;
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::debug;

thread_local! {
    /// Bean ids currently under construction on this thread, for circular
    /// dependency detection between non-proxied scopes
    static UNDER_CONSTRUCTION: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Pops the construction stack even on the error path
struct ConstructionFrame(u64);

impl ConstructionFrame {
    fn enter(bean: &Bean) -> Result<Self> {
        UNDER_CONSTRUCTION.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&bean.id()) {
                return Err(ContainerError::circular(bean.class.name.to_string()));
            }
            stack.push(bean.id());
            Ok(Self(bean.id()))
        })
    }
}

impl Drop for ConstructionFrame {
    fn drop(&mut self) {
        UNDER_CONSTRUCTION.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(position) = stack.iter().rposition(|id| *id == self.0) {
                stack.remove(position);
            }
        });
    }
}

/// Creates, injects and destroys contextual instances
pub struct InjectionTarget {
    space: Arc<TypeSpace>,
    kb: Arc<KnowledgeBase>,
    assignability: Arc<Assignability>,
    resolver: Arc<BeanResolver>,
    contexts: Arc<ContextManager>,
    registry: Arc<AnnotationRegistry>,
    /// Handle served for the built-in bean (the bean manager)
    builtin: OnceCell<Handle>,
    /// Back-reference installed right after construction
    this: OnceCell<Weak<InjectionTarget>>,
}

impl InjectionTarget {
    pub fn new(
        space: Arc<TypeSpace>,
        kb: Arc<KnowledgeBase>,
        assignability: Arc<Assignability>,
        resolver: Arc<BeanResolver>,
        contexts: Arc<ContextManager>,
        registry: Arc<AnnotationRegistry>,
    ) -> Arc<Self> {
        let target = Arc::new(Self {
            space,
            kb,
            assignability,
            resolver,
            contexts,
            registry,
            builtin: OnceCell::new(),
            this: OnceCell::new(),
        });
        let _ = target.this.set(Arc::downgrade(&target));
        target
    }

    /// Install the handle the built-in bean hands out
    pub fn set_builtin_handle(&self, handle: Handle) {
        let _ = self.builtin.set(handle);
    }

    fn this(&self) -> Result<Arc<Self>> {
        self.this
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| ContainerError::internal("injection target detached"))
    }

    // =========================================================================
    // Injectable references
    // =========================================================================

    /// The hot-path API: produce the value to plug into one injection
    /// point. Normal-scoped beans yield their cached client proxy;
    /// dependent beans yield a fresh instance registered with the caller's
    /// creational context.
    pub fn get_injectable_reference(
        &self,
        point: &InjectionPoint,
        creational: &Arc<CreationalContext>,
    ) -> Result<Value> {
        let bean = self
            .resolver
            .resolve_bean(&point.required_type, &point.qualifiers)?;
        Ok(Value::Ref(self.reference_for(&bean, creational)?))
    }

    /// A reference to a resolved bean: proxy for normal scopes, direct
    /// instance otherwise
    pub fn reference_for(
        &self,
        bean: &Arc<Bean>,
        creational: &Arc<CreationalContext>,
    ) -> Result<Handle> {
        if bean.needs_proxy() {
            ClientProxy::obtain(bean, &self.this()?)
        } else {
            self.contexts.get_dependent(bean, creational, self)
        }
    }

    /// The live contextual instance behind a bean, creating on demand.
    /// Client proxies call this on every business-method invocation.
    pub fn contextual_instance(&self, bean: &Arc<Bean>) -> Result<Handle> {
        self.contexts.get(bean, self)
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Produce a fully injected, wrapped instance of a bean
    pub fn produce(&self, bean: &Arc<Bean>, creational: &Arc<CreationalContext>) -> Result<Handle> {
        let _frame = ConstructionFrame::enter(bean)?;

        // nested bean_create spans show the dependency chain being walked
        #[cfg(feature = "logging")]
        let _span = crate::logging::create_span(bean).entered();

        match &bean.kind {
            BeanKind::Managed { .. } => self.produce_managed(bean, creational),
            BeanKind::ProducerMethod { declaring, method, .. } => {
                self.produce_from_method(bean, declaring, method, creational)
            }
            BeanKind::ProducerField { declaring, field } => {
                self.produce_from_field(bean, declaring, field, creational)
            }
            BeanKind::Synthetic { create, .. } => create(creational),
            BeanKind::BuiltIn => self
                .builtin
                .get()
                .cloned()
                .ok_or_else(|| ContainerError::internal("built-in bean handle not installed")),
        }
    }

    fn produce_managed(
        &self,
        bean: &Arc<Bean>,
        creational: &Arc<CreationalContext>,
    ) -> Result<Handle> {
        let interceptors = self.interceptors_for(bean);

        // AroundConstruct interceptors wrap the actual construction
        let construct_links = self.lifecycle_links(&interceptors, |i| i.around_construct.clone(), creational)?;
        let raw = if construct_links.is_empty() {
            self.construct_and_inject(bean, creational)?
        } else {
            let this = self.this()?;
            let bean = Arc::clone(bean);
            let creational_for_terminal = Arc::clone(creational);
            let chain = InterceptorChain::new(construct_links);
            let produced = chain.invoke_lifecycle(move || {
                this.construct_and_inject(&bean, &creational_for_terminal)
                    .map(Value::Ref)
            })?;
            match produced {
                Value::Ref(handle) => handle,
                _ => {
                    return Err(ContainerError::internal(
                        "around-construct chain dropped the instance",
                    ));
                }
            }
        };

        // PostConstruct: interceptor callbacks wrap the bean's own
        let post_links = self.lifecycle_links(&interceptors, |i| i.post_construct.clone(), creational)?;
        self.fire_lifecycle(&raw, post_links, vocab::POST_CONSTRUCT)?;

        // decorators innermost-to-outer, then the interceptor wrapper
        let decorated = self.apply_decorators(bean, raw, creational)?;
        self.apply_interceptors(bean, decorated, &interceptors, creational)
    }

    /// Construct the raw object and run field then method injection,
    /// superclass-first
    fn construct_and_inject(
        &self,
        bean: &Arc<Bean>,
        creational: &Arc<CreationalContext>,
    ) -> Result<Handle> {
        let ctor = bean.injection_ctor().ok_or_else(|| {
            ContainerError::creation(bean.class.name.to_string(), "no usable constructor")
        })?;

        let member: Arc<str> = Arc::from("<init>");
        let mut args = Vec::with_capacity(ctor.params.len());
        for (position, param) in ctor.params.iter().enumerate() {
            let point = InjectionPoint::for_param(
                MemberKind::CtorParam,
                &bean.class.name,
                &member,
                position,
                param,
                &self.registry.qualifiers,
            );
            args.push(self.get_injectable_reference(&point, creational)?);
        }

        let object = Arc::new(Object::new(Arc::clone(&bean.class), Arc::clone(&self.space)));
        if let Some(body) = &ctor.body {
            body(&object, &args)?;
        }

        self.inject_members(&object, creational)?;
        Ok(object as Handle)
    }

    /// Field injection for every marked field, then method injection for
    /// every marked method, walking the hierarchy superclass-first
    fn inject_members(&self, object: &Arc<Object>, creational: &Arc<CreationalContext>) -> Result<()> {
        let hierarchy = self.space.hierarchy(object.class());

        for class in hierarchy.iter().rev() {
            for field in &class.fields {
                if !field.has_annotation(vocab::INJECT) || field.has_annotation(vocab::DELEGATE) {
                    continue;
                }
                let point = InjectionPoint::for_field(&class.name, field, &self.registry.qualifiers);
                let value = self.get_injectable_reference(&point, creational)?;
                object.set(field.name.to_string(), value);
            }
        }

        for class in hierarchy.iter().rev() {
            for method in &class.methods {
                if !method.has_annotation(vocab::INJECT) {
                    continue;
                }
                let mut args = Vec::with_capacity(method.params.len());
                for (position, param) in method.params.iter().enumerate() {
                    let point = InjectionPoint::for_param(
                        MemberKind::MethodParam,
                        &class.name,
                        &method.name,
                        position,
                        param,
                        &self.registry.qualifiers,
                    );
                    args.push(self.get_injectable_reference(&point, creational)?);
                }
                object.call(&method.name, &args)?;
            }
        }
        Ok(())
    }

    /// Invoke lifecycle callbacks superclass-first, each at most once,
    /// wrapped by any matching interceptor links
    fn fire_lifecycle(
        &self,
        instance: &Handle,
        links: Vec<ChainLink>,
        annotation: &'static str,
    ) -> Result<()> {
        let Some(object) = unwrap_object(instance) else {
            return Ok(());
        };
        let callbacks = self.lifecycle_callbacks(object.class(), annotation);
        if links.is_empty() && callbacks.is_empty() {
            return Ok(());
        }

        if links.is_empty() {
            for method in callbacks {
                object.call(&method, &[])?;
            }
            return Ok(());
        }

        let chain = InterceptorChain::new(links);
        let instance = Arc::clone(instance);
        chain.invoke_lifecycle(move || {
            if let Some(object) = unwrap_object(&instance) {
                for method in &callbacks {
                    object.call(method, &[])?;
                }
            }
            Ok(Value::Null)
        })?;
        Ok(())
    }

    /// Callback method names for a lifecycle annotation, superclass-first
    /// and deduplicated by name
    fn lifecycle_callbacks(&self, class: &Arc<ClassDef>, annotation: &str) -> Vec<Arc<str>> {
        let mut callbacks: Vec<Arc<str>> = Vec::new();
        for level in self.space.hierarchy(class).iter().rev() {
            for method in level.methods_with(annotation) {
                if !callbacks.iter().any(|name| *name == method.name) {
                    callbacks.push(Arc::clone(&method.name));
                }
            }
        }
        callbacks
    }

    // =========================================================================
    // Producers
    // =========================================================================

    fn produce_from_method(
        &self,
        bean: &Arc<Bean>,
        declaring: &Arc<str>,
        method: &Arc<str>,
        creational: &Arc<CreationalContext>,
    ) -> Result<Handle> {
        let host = self.declaring_instance(declaring, creational)?;

        // the descriptor's injection points are the producer parameters,
        // in declaration order
        let mut args = Vec::with_capacity(bean.injection_points.len());
        for point in &bean.injection_points {
            args.push(self.get_injectable_reference(point, creational)?);
        }

        let produced = host.invoke(method, args)?;
        self.check_product(bean, produced, || format!("{declaring}.{method}"))
    }

    fn produce_from_field(
        &self,
        bean: &Arc<Bean>,
        declaring: &Arc<str>,
        field: &Arc<str>,
        creational: &Arc<CreationalContext>,
    ) -> Result<Handle> {
        let host = self.declaring_instance(declaring, creational)?;
        let object = host.as_object().ok_or_else(|| {
            ContainerError::internal(format!("producer host {declaring} is not a plain instance"))
        })?;
        let produced = object.get(field);
        self.check_product(bean, produced, || format!("{declaring}.{field}"))
    }

    /// Resolve the single bean for the declaring class and obtain its
    /// contextual instance
    fn declaring_instance(
        &self,
        declaring: &Arc<str>,
        creational: &Arc<CreationalContext>,
    ) -> Result<Handle> {
        let declaring_bean = self.resolver.resolve_declaring_bean(declaring)?;
        if declaring_bean.needs_proxy() {
            self.contexts.get(&declaring_bean, self)
        } else {
            self.contexts.get_dependent(&declaring_bean, creational, self)
        }
    }

    /// A producer must not return null for a scope that caches a value
    fn check_product(
        &self,
        bean: &Arc<Bean>,
        produced: Value,
        producer: impl Fn() -> String,
    ) -> Result<Handle> {
        match produced {
            Value::Ref(handle) => Ok(handle),
            Value::Null => Err(ContainerError::IllegalProduct {
                producer: producer(),
                reason: format!("null product for {} scope", bean.scope),
            }),
            other => Err(ContainerError::IllegalProduct {
                producer: producer(),
                reason: format!("non-reference product {other:?}"),
            }),
        }
    }

    // =========================================================================
    // Wrapping
    // =========================================================================

    /// Interceptors bound to the bean, ordered outermost-first
    fn interceptors_for(&self, bean: &Arc<Bean>) -> Vec<Arc<InterceptorInfo>> {
        if bean.interceptor_bindings.is_empty() {
            return Vec::new();
        }
        let mut matched: Vec<Arc<InterceptorInfo>> = self
            .kb
            .interceptors()
            .into_iter()
            .filter(|i| i.binds_to(&bean.interceptor_bindings))
            .collect();
        matched.sort_by_key(|i| i.priority);
        matched
    }

    /// Build lifecycle chain links for one callback kind
    fn lifecycle_links(
        &self,
        interceptors: &[Arc<InterceptorInfo>],
        callback: impl Fn(&InterceptorInfo) -> Option<Arc<str>>,
        creational: &Arc<CreationalContext>,
    ) -> Result<Vec<ChainLink>> {
        let mut links = Vec::new();
        for info in interceptors {
            if let Some(method) = callback(info) {
                links.push(ChainLink {
                    instance: self.support_instance(&info.class, creational)?,
                    method,
                });
            }
        }
        Ok(links)
    }

    /// Wrap the instance in its decorator chain, inner to outer. Each
    /// decorator is created through the full injection machinery; the
    /// delegate point is satisfied by direct assignment.
    fn apply_decorators(
        &self,
        bean: &Arc<Bean>,
        target: Handle,
        creational: &Arc<CreationalContext>,
    ) -> Result<Handle> {
        let mut applicable: Vec<Arc<DecoratorInfo>> = Vec::new();
        for decorator in self.kb.decorators() {
            if decorator.applies_to(&bean.types, &bean.qualifiers, &self.assignability)? {
                applicable.push(decorator);
            }
        }
        if applicable.is_empty() {
            return Ok(target);
        }
        // outermost-first by priority, then built starting from the inside
        applicable.sort_by_key(|d| d.priority);

        #[cfg(feature = "logging")]
        debug!(
            target: "contexture",
            bean = %bean.class.name,
            decorators = applicable.len(),
            "Building decorator chain"
        );

        let mut current = target;
        for decorator in applicable.iter().rev() {
            current = self.build_decorator(decorator, current, creational)?;
        }
        Ok(current)
    }

    fn build_decorator(
        &self,
        decorator: &DecoratorInfo,
        delegate: Handle,
        creational: &Arc<CreationalContext>,
    ) -> Result<Handle> {
        let delegate_value = Value::Ref(delegate);
        let ctor_override = match &decorator.delegate {
            DelegatePoint::CtorParam { ctor_index, position } => {
                Some((*ctor_index, *position, delegate_value.clone()))
            }
            _ => None,
        };
        let instance = self.construct_support(
            &decorator.class,
            creational,
            ctor_override.as_ref(),
        )?;
        if let Some(object) = instance.as_object() {
            decorator.inject_delegate(object, delegate_value)?;
        }
        Ok(instance)
    }

    /// Wrap the (possibly decorated) instance with its around-invoke
    /// interceptor chain; interceptors run outermost
    fn apply_interceptors(
        &self,
        bean: &Arc<Bean>,
        inner: Handle,
        interceptors: &[Arc<InterceptorInfo>],
        creational: &Arc<CreationalContext>,
    ) -> Result<Handle> {
        let mut links = Vec::new();
        for info in interceptors {
            if let Some(method) = &info.around_invoke {
                links.push(ChainLink {
                    instance: self.support_instance(&info.class, creational)?,
                    method: Arc::clone(method),
                });
            }
        }
        if links.is_empty() {
            return Ok(inner);
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "contexture",
            bean = %bean.class.name,
            interceptors = links.len(),
            "Wrapping with interceptor chain"
        );
        let _ = bean;

        Ok(Arc::new(crate::interceptor::InterceptedInstance::new(
            inner,
            InterceptorChain::new(links),
        )))
    }

    /// Create an interceptor or decorator instance: injection constructor,
    /// member injection, no wrapping
    fn support_instance(
        &self,
        class: &Arc<ClassDef>,
        creational: &Arc<CreationalContext>,
    ) -> Result<Handle> {
        self.construct_support(class, creational, None)
    }

    fn construct_support(
        &self,
        class: &Arc<ClassDef>,
        creational: &Arc<CreationalContext>,
        ctor_override: Option<&(usize, usize, Value)>,
    ) -> Result<Handle> {
        let ctor_index = match ctor_override {
            Some((index, _, _)) => *index,
            None => class
                .ctors
                .iter()
                .position(|c| c.has_annotation(vocab::INJECT))
                .or_else(|| class.ctors.iter().position(|c| c.params.is_empty()))
                .unwrap_or(0),
        };

        let object = Arc::new(Object::new(Arc::clone(class), Arc::clone(&self.space)));
        if let Some(ctor) = class.ctors.get(ctor_index) {
            let member: Arc<str> = Arc::from("<init>");
            let mut args = Vec::with_capacity(ctor.params.len());
            for (position, param) in ctor.params.iter().enumerate() {
                if let Some((_, delegate_position, delegate_value)) = ctor_override {
                    if position == *delegate_position {
                        args.push(delegate_value.clone());
                        continue;
                    }
                }
                let point = InjectionPoint::for_param(
                    MemberKind::CtorParam,
                    &class.name,
                    &member,
                    position,
                    param,
                    &self.registry.qualifiers,
                );
                args.push(self.get_injectable_reference(&point, creational)?);
            }
            if let Some(body) = &ctor.body {
                body(&object, &args)?;
            }
        }

        self.inject_members(&object, creational)?;
        Ok(object as Handle)
    }

    // =========================================================================
    // Destruction
    // =========================================================================

    /// Destroy one instance: interceptor and bean `PreDestroy` callbacks,
    /// disposer invocation for producers, synthetic destroy closures, then
    /// LIFO release of the creational context. Every failure is logged and
    /// swallowed so the rest of the scope still goes down.
    pub fn dispose(&self, bean: &Arc<Bean>, instance: &Handle, creational: &Arc<CreationalContext>) {
        if let Err(err) = self.dispose_inner(bean, instance) {
            swallow_destroy_error(&bean.class.name, &err);
        }
        creational.release_with(&|dependent| {
            self.dispose(&dependent.bean, &dependent.instance, &dependent.creational);
        });
    }

    fn dispose_inner(&self, bean: &Arc<Bean>, instance: &Handle) -> Result<()> {
        match &bean.kind {
            BeanKind::Managed { .. } => {
                let interceptors = self.interceptors_for(bean);
                let creational = CreationalContext::new();
                let links =
                    self.lifecycle_links(&interceptors, |i| i.pre_destroy.clone(), &creational)?;
                self.fire_lifecycle(instance, links, vocab::PRE_DESTROY)
            }
            BeanKind::ProducerMethod { declaring, disposer: Some(disposer), .. } => {
                let creational = CreationalContext::new();
                let host = self.declaring_instance(declaring, &creational)?;
                host.invoke(disposer, vec![Value::Ref(Arc::clone(instance))])?;
                Ok(())
            }
            BeanKind::Synthetic { destroy: Some(destroy), .. } => destroy(instance),
            _ => Ok(()),
        }
    }
}

/// Reach through interceptor wrappers to the underlying object
fn unwrap_object(instance: &Handle) -> Option<&Object> {
    if let Some(object) = instance.as_object() {
        return Some(object);
    }
    instance
        .as_any()
        .downcast_ref::<crate::interceptor::InterceptedInstance>()
        .and_then(|wrapped| unwrap_object(wrapped.inner()))
}

impl InstanceLifecycle for InjectionTarget {
    fn create(&self, bean: &Arc<Bean>, creational: &Arc<CreationalContext>) -> Result<Handle> {
        self.produce(bean, creational)
    }

    fn destroy(&self, bean: &Arc<Bean>, instance: &Handle, creational: &Arc<CreationalContext>) {
        self.dispose(bean, instance, creational);
    }
}

impl std::fmt::Debug for InjectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectionTarget").finish()
    }
}
