//! The bean manager and the container lifecycle
//!
//! `bootstrap → serve → shutdown`: the builder collects discovery roots,
//! programmatic classes and synthetic beans, boot scans and registers
//! everything, runs extension hooks, verifies every injection point, and
//! publishes the knowledge base. The resulting [`BeanManager`] is the
//! programmatic surface; there is no ambient singleton — pass it around.

use crate::assignable::Assignability;
use crate::bean::{Bean, BeanBuilder, BeanKind, ScopeKind, SyntheticCreate, SyntheticDestroy};
use crate::context::ContextManager;
use crate::creational::CreationalContext;
use crate::error::{ContainerError, Result};
use crate::injection::InjectionPoint;
use crate::instantiate::InjectionTarget;
use crate::knowledge::KnowledgeBase;
use crate::meta::{ClassDef, TypeRef, TypeSpace};
use crate::object::{Handle, Invocable, Value, next_instance_id};
use crate::qualifier::{Qualifier, augment};
use crate::registrar::{AnnotationRegistry, BeanRegistrar};
use crate::resolver::BeanResolver;
use crate::scan::{DiscoveryMode, ParallelScanner, ScanRoot, ScanSink, Scanner};
use crate::spi::{ConversationCarrier, Extension, TransactionServices};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, info, trace};

/// Class name the built-in bean exposes
pub const BEAN_MANAGER_CLASS: &str = "container.BeanManager";

/// Explicit container lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Serving,
    Shutdown,
}

// =============================================================================
// Synthetic bean registration
// =============================================================================

/// Closure-backed bean definition registered through the builder
pub struct SyntheticBean {
    class_name: String,
    types: Vec<TypeRef>,
    scope: ScopeKind,
    qualifiers: Vec<Qualifier>,
    create: SyntheticCreate,
    destroy: Option<SyntheticDestroy>,
}

impl SyntheticBean {
    pub fn new(
        class_name: impl Into<String>,
        create: impl Fn(&CreationalContext) -> Result<Handle> + Send + Sync + 'static,
    ) -> Self {
        let class_name = class_name.into();
        Self {
            types: vec![TypeRef::class(&class_name)],
            class_name,
            scope: ScopeKind::Dependent,
            qualifiers: Vec::new(),
            create: Arc::new(create),
            destroy: None,
        }
    }

    pub fn types(mut self, types: Vec<TypeRef>) -> Self {
        self.types = types;
        self
    }

    pub fn scope(mut self, scope: ScopeKind) -> Self {
        self.scope = scope;
        self
    }

    pub fn qualifiers(mut self, qualifiers: Vec<Qualifier>) -> Self {
        self.qualifiers = qualifiers;
        self
    }

    pub fn on_destroy(
        mut self,
        destroy: impl Fn(&Handle) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.destroy = Some(Arc::new(destroy));
        self
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Collects everything boot needs
pub struct ContainerBuilder {
    space: Arc<TypeSpace>,
    registry: Arc<AnnotationRegistry>,
    roots: Vec<(ScanRoot, DiscoveryMode)>,
    prefixes: Vec<String>,
    classes: Vec<(Arc<ClassDef>, DiscoveryMode)>,
    synthetics: Vec<SyntheticBean>,
    extensions: Vec<Arc<dyn Extension>>,
    transaction_services: Option<Arc<dyn TransactionServices>>,
    parallel_scan: bool,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            space: Arc::new(TypeSpace::new()),
            registry: Arc::new(AnnotationRegistry::new()),
            roots: Vec::new(),
            prefixes: Vec::new(),
            classes: Vec::new(),
            synthetics: Vec::new(),
            extensions: Vec::new(),
            transaction_services: None,
            parallel_scan: false,
        }
    }

    /// The class registry types are loaded from
    pub fn types(&self) -> &Arc<TypeSpace> {
        &self.space
    }

    /// The annotation vocabulary (qualifier schemas, bindings, stereotypes)
    pub fn annotations(&self) -> &Arc<AnnotationRegistry> {
        &self.registry
    }

    /// Add a discovery root
    pub fn with_root(mut self, root: ScanRoot, mode: DiscoveryMode) -> Self {
        self.roots.push((root, mode));
        self
    }

    /// Restrict scanning to package prefixes (validated at boot)
    pub fn with_packages<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Fan discovery out on the worker pool
    pub fn parallel_scan(mut self) -> Self {
        self.parallel_scan = true;
        self
    }

    /// Register a class programmatically (bypasses scanning)
    pub fn with_class(mut self, def: ClassDef) -> Self {
        let class = self.space.register(def);
        self.classes.push((class, DiscoveryMode::All));
        self
    }

    /// Register a closure-backed bean
    pub fn with_synthetic(mut self, synthetic: SyntheticBean) -> Self {
        self.synthetics.push(synthetic);
        self
    }

    /// Register a boot-time extension hook
    pub fn with_extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Plug in the host transaction service
    pub fn with_transaction_services(mut self, services: Arc<dyn TransactionServices>) -> Self {
        self.transaction_services = Some(services);
        self
    }

    /// Boot the container: scan, validate and register, run extension
    /// hooks, verify, publish. Fails with an aggregate deployment error
    /// when problems accumulated.
    pub fn boot(self) -> Result<Arc<BeanManager>> {
        #[cfg(feature = "logging")]
        let _span = crate::logging::boot_span().entered();

        let kb = Arc::new(KnowledgeBase::new());
        let assignability = Arc::new(Assignability::new(Arc::clone(&self.space)));
        let resolver = Arc::new(BeanResolver::new(Arc::clone(&kb), Arc::clone(&assignability)));
        let contexts = Arc::new(ContextManager::new());
        let registrar = Arc::new(BeanRegistrar::new(
            Arc::clone(&kb),
            Arc::clone(&assignability),
            Arc::clone(&self.registry),
        ));

        // discovery: scanned roots feed the registrar through the sink
        let sink = DiscoverySink {
            space: Arc::clone(&self.space),
            registrar: Arc::clone(&registrar),
        };
        if !self.roots.is_empty() {
            if self.parallel_scan {
                ParallelScanner::with_prefixes(self.roots.clone(), self.prefixes.clone())?
                    .scan(&sink)?;
            } else {
                Scanner::with_prefixes(self.roots.clone(), self.prefixes.clone())?.scan(&sink)?;
            }
        }
        for (class, mode) in &self.classes {
            registrar.process(Arc::clone(class), *mode);
        }

        // extension hooks run between registration and verification
        for extension in &self.extensions {
            extension.types_discovered(&self.space, &kb);
            extension.after_bean_registration(&kb);
        }

        // synthetic beans and the built-in bean join the registry
        for synthetic in self.synthetics {
            let class = self
                .space
                .register(ClassDef::builder(&synthetic.class_name).build());
            let bean = BeanBuilder::new(
                class,
                BeanKind::Synthetic {
                    create: synthetic.create,
                    destroy: synthetic.destroy,
                },
            )
            .types(synthetic.types)
            .scope(synthetic.scope)
            .qualifiers(augment(synthetic.qualifiers))
            .build();
            kb.add_bean(Arc::new(bean));
        }
        let builtin_class = self
            .space
            .register(ClassDef::builder(BEAN_MANAGER_CLASS).build());
        let builtin = Arc::new(
            BeanBuilder::new(builtin_class, BeanKind::BuiltIn)
                .types(vec![TypeRef::class(BEAN_MANAGER_CLASS)])
                .qualifiers(augment(Vec::new()))
                .scope(ScopeKind::Dependent)
                .build(),
        );
        kb.add_bean(Arc::clone(&builtin));

        let target = InjectionTarget::new(
            Arc::clone(&self.space),
            Arc::clone(&kb),
            Arc::clone(&assignability),
            Arc::clone(&resolver),
            Arc::clone(&contexts),
            Arc::clone(&self.registry),
        );

        // boot verification: every injection point must resolve, and
        // non-proxied scopes must not form cycles
        verify_injection_points(&kb, &resolver);
        verify_dependent_cycles(&kb, &resolver);
        let problems = kb.deployment_problems();
        if !problems.is_empty() {
            return Err(ContainerError::Deployment { problems });
        }

        kb.freeze();
        let manager = Arc::new(BeanManager {
            space: self.space,
            kb,
            registry: self.registry,
            resolver,
            contexts,
            target: Arc::clone(&target),
            transaction_services: self.transaction_services,
            state: AtomicU8::new(STATE_SERVING),
        });
        target.set_builtin_handle(Arc::new(ManagerHandle {
            id: next_instance_id(),
            manager: Arc::downgrade(&manager),
        }));

        #[cfg(feature = "logging")]
        info!(
            target: "contexture",
            classes = manager.kb.class_count(),
            beans = manager.kb.beans().len(),
            "Container serving"
        );

        Ok(manager)
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Sink wiring the scanner to the registrar. Missing classes are not valid
/// candidates and are skipped silently.
struct DiscoverySink {
    space: Arc<TypeSpace>,
    registrar: Arc<BeanRegistrar>,
}

impl ScanSink for DiscoverySink {
    fn add(&self, class_name: &str, mode: DiscoveryMode) {
        match self.space.load(class_name) {
            Some(class) => self.registrar.process(class, mode),
            None => {
                #[cfg(feature = "logging")]
                trace!(target: "contexture", class = class_name, "Discovered name has no loadable class");
            }
        }
    }
}

fn verify_injection_points(kb: &KnowledgeBase, resolver: &BeanResolver) {
    for bean in kb.valid_beans() {
        for point in &bean.injection_points {
            if point.delegate {
                continue;
            }
            if let Err(err) = resolver.resolve_bean(&point.required_type, &point.qualifiers) {
                kb.injection_error(format!("{point}: {err}"));
            }
        }
    }
}

/// Cycles are only fatal when no client proxy can break them: every edge
/// in the cycle targets a non-proxied (dependent) bean.
fn verify_dependent_cycles(kb: &KnowledgeBase, resolver: &BeanResolver) {
    let beans = kb.valid_beans();
    let mut edges: HashMap<u64, Vec<(u64, String)>> = HashMap::new();
    for bean in &beans {
        let mut targets = Vec::new();
        for point in &bean.injection_points {
            if point.delegate {
                continue;
            }
            if let Ok(dependency) =
                resolver.resolve_bean(&point.required_type, &point.qualifiers)
            {
                if !dependency.scope.is_normal() {
                    targets.push((dependency.id(), dependency.class.name.to_string()));
                }
            }
        }
        edges.insert(bean.id(), targets);
    }

    let mut done: Vec<u64> = Vec::new();
    for bean in &beans {
        let mut path: Vec<(u64, String)> = vec![(bean.id(), bean.class.name.to_string())];
        if walk(bean.id(), &edges, &mut path, &mut done) {
            let cycle: Vec<String> = path.iter().map(|(_, name)| name.clone()).collect();
            kb.error(format!(
                "circular dependency between non-proxied beans: {}",
                cycle.join(" -> ")
            ));
            return;
        }
    }

    fn walk(
        node: u64,
        edges: &HashMap<u64, Vec<(u64, String)>>,
        path: &mut Vec<(u64, String)>,
        done: &mut Vec<u64>,
    ) -> bool {
        if done.contains(&node) {
            return false;
        }
        for (next, name) in edges.get(&node).map(Vec::as_slice).unwrap_or_default() {
            if path.iter().any(|(id, _)| id == next) {
                path.push((*next, name.clone()));
                return true;
            }
            path.push((*next, name.clone()));
            if walk(*next, edges, path, done) {
                return true;
            }
            path.pop();
        }
        done.push(node);
        false
    }
}

// =============================================================================
// BeanManager
// =============================================================================

const STATE_SERVING: u8 = 0;
const STATE_SHUTDOWN: u8 = 1;

/// The programmatic container surface
pub struct BeanManager {
    space: Arc<TypeSpace>,
    kb: Arc<KnowledgeBase>,
    registry: Arc<AnnotationRegistry>,
    resolver: Arc<BeanResolver>,
    contexts: Arc<ContextManager>,
    target: Arc<InjectionTarget>,
    transaction_services: Option<Arc<dyn TransactionServices>>,
    state: AtomicU8,
}

impl BeanManager {
    /// Pure lookup: matching beans without instantiating anything
    pub fn get_beans(&self, required: &TypeRef, qualifiers: &[Qualifier]) -> Result<Vec<Arc<Bean>>> {
        self.resolver.get_beans(required, qualifiers)
    }

    /// Alternative resolution over a candidate set
    pub fn resolve(&self, candidates: Vec<Arc<Bean>>) -> Result<Arc<Bean>> {
        let required = candidates
            .first()
            .and_then(|b| b.types.first().cloned())
            .unwrap_or_else(|| TypeRef::class("<programmatic>"));
        self.resolver.resolve(candidates, &required, &[])
    }

    /// A reference to a bean: a client proxy for normal scopes, a direct
    /// instance otherwise
    pub fn get_reference(
        &self,
        bean: &Arc<Bean>,
        creational: &Arc<CreationalContext>,
    ) -> Result<Value> {
        self.check_serving()?;
        Ok(Value::Ref(self.target.reference_for(bean, creational)?))
    }

    /// The primary hot-path API: the value for one injection point
    pub fn get_injectable_reference(
        &self,
        point: &InjectionPoint,
        creational: &Arc<CreationalContext>,
    ) -> Result<Value> {
        self.check_serving()?;
        self.target.get_injectable_reference(point, creational)
    }

    pub fn create_creational_context(&self) -> Arc<CreationalContext> {
        CreationalContext::new()
    }

    /// Release a creational context: every dependent instance it tracked
    /// is destroyed, LIFO
    pub fn release(&self, creational: &Arc<CreationalContext>) {
        creational.release_with(&|dependent| {
            self.target
                .dispose(&dependent.bean, &dependent.instance, &dependent.creational);
        });
    }

    /// Resolve and instantiate in one step: lookup, alternative selection,
    /// then a contextual reference
    pub fn get_instance(&self, required: &TypeRef, qualifiers: &[Qualifier]) -> Result<Value> {
        self.check_serving()?;
        let point = InjectionPoint::synthetic(required.clone(), qualifiers.to_vec());
        self.target
            .get_injectable_reference(&point, &self.create_creational_context())
    }

    /// Resolve by bean name (the `Named` qualifier shortcut)
    pub fn get_named(&self, name: &str) -> Result<Value> {
        let beans: Vec<Arc<Bean>> = self
            .kb
            .valid_beans()
            .into_iter()
            .filter(|b| b.name.as_deref() == Some(name))
            .collect();
        let bean = self.resolve(beans).map_err(|err| match err {
            ContainerError::Unsatisfied { .. } => ContainerError::unsatisfied(
                TypeRef::class(format!("<named:{name}>")),
                vec![Qualifier::named(name)],
            ),
            other => other,
        })?;
        self.get_reference(&bean, &self.create_creational_context())
    }

    // =========================================================================
    // Scope lifecycle
    // =========================================================================

    pub fn activate_request(&self) -> String {
        self.contexts.activate_request()
    }

    pub fn deactivate_request(&self) {
        self.contexts.deactivate_request(&*self.target);
    }

    pub fn activate_session(&self, id: impl Into<String>) {
        self.contexts.activate_session(id);
    }

    pub fn release_session(&self) {
        self.contexts.release_session();
    }

    pub fn invalidate_session(&self, id: &str) {
        self.contexts.invalidate_session(id, &*self.target);
    }

    pub fn begin_conversation(&self, id: impl Into<String>) {
        self.contexts.begin_conversation(id);
    }

    pub fn end_conversation(&self, id: &str) {
        self.contexts.end_conversation(id, &*self.target);
    }

    /// Propagate the conversation id through a host carrier: attach to the
    /// incoming id, then either end the conversation or write the current
    /// id back.
    pub fn sync_conversation(&self, carrier: &dyn ConversationCarrier) {
        if let Some(id) = carrier.read_id() {
            self.begin_conversation(id);
        }
        if carrier.should_end() {
            if let Some(current) = self.contexts.current_conversation() {
                self.end_conversation(&current);
            }
        } else if let Some(current) = self.contexts.current_conversation() {
            carrier.write_id(&current);
        }
    }

    // =========================================================================
    // Introspection and teardown
    // =========================================================================

    pub fn state(&self) -> ContainerState {
        match self.state.load(Ordering::Acquire) {
            STATE_SERVING => ContainerState::Serving,
            _ => ContainerState::Shutdown,
        }
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    pub fn types(&self) -> &Arc<TypeSpace> {
        &self.space
    }

    pub fn annotations(&self) -> &Arc<AnnotationRegistry> {
        &self.registry
    }

    pub fn transaction_services(&self) -> Option<&Arc<dyn TransactionServices>> {
        self.transaction_services.as_ref()
    }

    fn check_serving(&self) -> Result<()> {
        match self.state() {
            ContainerState::Serving => Ok(()),
            ContainerState::Shutdown => Err(ContainerError::ContextNotActive {
                scope: "Application",
            }),
        }
    }

    /// Destroy every scope context in reverse dependency order and leave
    /// the serving state. Idempotent.
    pub fn shutdown(&self) {
        if self
            .state
            .compare_exchange(
                STATE_SERVING,
                STATE_SHUTDOWN,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        #[cfg(feature = "logging")]
        debug!(target: "contexture", "Container shutting down");

        self.contexts.shutdown(&*self.target);
    }
}

impl fmt::Debug for BeanManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanManager")
            .field("beans", &self.kb.beans().len())
            .field("state", &self.state())
            .finish()
    }
}

/// Handle handed out for the built-in bean. Downcast through `as_any` to
/// reach the typed manager API.
pub struct ManagerHandle {
    id: u64,
    manager: Weak<BeanManager>,
}

impl ManagerHandle {
    pub fn manager(&self) -> Option<Arc<BeanManager>> {
        self.manager.upgrade()
    }
}

impl Invocable for ManagerHandle {
    fn type_name(&self) -> &str {
        BEAN_MANAGER_CLASS
    }

    fn instance_id(&self) -> u64 {
        self.id
    }

    fn invoke(&self, method: &str, _args: Vec<Value>) -> Result<Value> {
        Err(ContainerError::internal(format!(
            "the bean manager is not reflectively invokable (method {method}); downcast the handle instead"
        )))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for ManagerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerHandle").finish()
    }
}
