//! Scope contexts
//!
//! One context per scope tag. Application is a process-lifetime singleton
//! map; session, conversation and request maps are keyed by an id with
//! thread-affine activation; dependent instances are never cached and ride
//! the creational context of their enclosing `create`.
//!
//! Each scope instance owns its map behind a creation lock: two concurrent
//! `get` calls observe the same instance and exactly one of them creates
//! it. Destruction swallows per-bean failures so the rest of the scope
//! still goes down, then marks the scope inactive; later access raises
//! `ContextNotActive`.

use crate::bean::{Bean, ScopeInstance, ScopeKind};
use crate::creational::CreationalContext;
use crate::error::{ContainerError, Result};
use crate::object::Handle;
use dashmap::DashMap;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ThreadId};

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// Instance creation and destruction, supplied by the container core so
/// scope contexts stay free of instantiation detail.
pub trait InstanceLifecycle: Send + Sync {
    fn create(&self, bean: &Arc<Bean>, creational: &Arc<CreationalContext>) -> Result<Handle>;

    /// Must not fail: destruction errors are logged and swallowed
    fn destroy(&self, bean: &Arc<Bean>, instance: &Handle, creational: &Arc<CreationalContext>);
}

/// The instance store of one scope instance.
///
/// The creation lock is re-entrant: producing an instance may legitimately
/// pull another bean out of the same scope on the same thread (a producer
/// resolving its declaring bean, a constructor going through a client
/// proxy). Concurrent threads still serialize, which keeps creation
/// exactly-once per bean.
pub struct ScopeMap {
    scope: ScopeKind,
    instances: ReentrantMutex<RefCell<HashMap<u64, ScopeInstance, ahash::RandomState>>>,
    active: AtomicBool,
}

impl ScopeMap {
    pub fn new(scope: ScopeKind) -> Self {
        Self {
            scope,
            instances: ReentrantMutex::new(RefCell::new(HashMap::with_hasher(
                ahash::RandomState::new(),
            ))),
            active: AtomicBool::new(true),
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instances.lock().borrow().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instances.lock().borrow().is_empty()
    }

    /// Return the live instance, or create it exactly once under the
    /// scope's creation lock.
    pub fn get_or_create(
        &self,
        bean: &Arc<Bean>,
        lifecycle: &dyn InstanceLifecycle,
    ) -> Result<Handle> {
        let instances = self.instances.lock();
        if !self.is_active() {
            return Err(ContainerError::ContextNotActive {
                scope: self.scope.name(),
            });
        }
        if let Some(existing) = instances.borrow().get(&bean.id()) {
            return Ok(Arc::clone(&existing.instance));
        }

        // the map borrow is released while creating: creation may re-enter
        // this scope on the same thread
        let creational = CreationalContext::new();
        let instance = lifecycle.create(bean, &creational)?;
        instances.borrow_mut().insert(
            bean.id(),
            ScopeInstance {
                bean: Arc::clone(bean),
                instance: Arc::clone(&instance),
                creational,
            },
        );
        Ok(instance)
    }

    /// The live instance, if any, without creating
    pub fn peek(&self, bean: &Arc<Bean>) -> Option<Handle> {
        self.instances
            .lock()
            .borrow()
            .get(&bean.id())
            .map(|si| Arc::clone(&si.instance))
    }

    /// Destroy every live instance and mark the scope inactive.
    /// Per-bean destruction failures are logged and swallowed.
    pub fn destroy(&self, lifecycle: &dyn InstanceLifecycle) {
        self.active.store(false, Ordering::Release);
        let drained: Vec<ScopeInstance> = {
            let instances = self.instances.lock();
            let mut map = instances.borrow_mut();
            map.drain().map(|(_, si)| si).collect()
        };

        #[cfg(feature = "logging")]
        let _span = crate::logging::scope_destroy_span(self.scope).entered();
        #[cfg(feature = "logging")]
        debug!(
            target: "contexture",
            instances = drained.len(),
            "Destroying scope"
        );

        for si in drained {
            lifecycle.destroy(&si.bean, &si.instance, &si.creational);
        }
    }
}

impl fmt::Debug for ScopeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeMap")
            .field("scope", &self.scope)
            .field("instances", &self.len())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Per-thread scope affinity: which session / conversation / request the
/// calling thread currently serves
#[derive(Debug, Clone, Default)]
struct Affinity {
    request: Option<String>,
    session: Option<String>,
    conversation: Option<String>,
}

/// Holds one context per supported scope and the id-keyed maps behind the
/// session, conversation and request scopes.
pub struct ContextManager {
    application: Arc<ScopeMap>,
    sessions: DashMap<String, Arc<ScopeMap>, ahash::RandomState>,
    conversations: DashMap<String, Arc<ScopeMap>, ahash::RandomState>,
    requests: DashMap<String, Arc<ScopeMap>, ahash::RandomState>,
    affinity: DashMap<ThreadId, Affinity, ahash::RandomState>,
    request_tokens: AtomicU64,
}

impl ContextManager {
    pub fn new() -> Self {
        Self {
            application: Arc::new(ScopeMap::new(ScopeKind::Application)),
            sessions: DashMap::with_hasher(ahash::RandomState::new()),
            conversations: DashMap::with_hasher(ahash::RandomState::new()),
            requests: DashMap::with_hasher(ahash::RandomState::new()),
            affinity: DashMap::with_hasher(ahash::RandomState::new()),
            request_tokens: AtomicU64::new(1),
        }
    }

    fn with_affinity<R>(&self, f: impl FnOnce(&mut Affinity) -> R) -> R {
        let mut entry = self.affinity.entry(thread::current().id()).or_default();
        f(entry.value_mut())
    }

    // =========================================================================
    // Activation API
    // =========================================================================

    /// Begin serving a request on the calling thread. Returns the request
    /// token for diagnostics.
    pub fn activate_request(&self) -> String {
        let token = format!("req-{}", self.request_tokens.fetch_add(1, Ordering::Relaxed));
        self.requests
            .insert(token.clone(), Arc::new(ScopeMap::new(ScopeKind::Request)));
        self.with_affinity(|a| a.request = Some(token.clone()));

        #[cfg(feature = "logging")]
        debug!(target: "contexture", %token, "Request scope activated");

        token
    }

    /// End the calling thread's current request, destroying its instances
    pub fn deactivate_request(&self, lifecycle: &dyn InstanceLifecycle) {
        let token = self.with_affinity(|a| a.request.take());
        if let Some(token) = token {
            if let Some((_, map)) = self.requests.remove(&token) {
                map.destroy(lifecycle);
            }

            #[cfg(feature = "logging")]
            debug!(target: "contexture", %token, "Request scope deactivated");
        }
    }

    /// Attach the calling thread to a session, creating its map on first
    /// activation
    pub fn activate_session(&self, id: impl Into<String>) {
        let id = id.into();
        self.sessions
            .entry(id.clone())
            .or_insert_with(|| Arc::new(ScopeMap::new(ScopeKind::Session)));
        self.with_affinity(|a| a.session = Some(id));
    }

    /// Detach the calling thread from its session without destroying it
    pub fn release_session(&self) {
        self.with_affinity(|a| a.session = None);
    }

    /// Destroy a session and every instance it holds
    pub fn invalidate_session(&self, id: &str, lifecycle: &dyn InstanceLifecycle) {
        self.with_affinity(|a| {
            if a.session.as_deref() == Some(id) {
                a.session = None;
            }
        });
        if let Some((_, map)) = self.sessions.remove(id) {
            map.destroy(lifecycle);
        }
    }

    /// Begin (or re-attach to) a conversation with an explicit id
    pub fn begin_conversation(&self, id: impl Into<String>) {
        let id = id.into();
        self.conversations
            .entry(id.clone())
            .or_insert_with(|| Arc::new(ScopeMap::new(ScopeKind::Conversation)));
        self.with_affinity(|a| a.conversation = Some(id));
    }

    /// End a conversation, destroying its instances
    pub fn end_conversation(&self, id: &str, lifecycle: &dyn InstanceLifecycle) {
        self.with_affinity(|a| {
            if a.conversation.as_deref() == Some(id) {
                a.conversation = None;
            }
        });
        if let Some((_, map)) = self.conversations.remove(id) {
            map.destroy(lifecycle);
        }
    }

    /// The calling thread's current conversation id, if any
    pub fn current_conversation(&self) -> Option<String> {
        self.with_affinity(|a| a.conversation.clone())
    }

    /// The calling thread's current session id, if any
    pub fn current_session(&self) -> Option<String> {
        self.with_affinity(|a| a.session.clone())
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// The scope map serving the given normal scope on this thread
    pub fn scope_map(&self, scope: ScopeKind) -> Result<Arc<ScopeMap>> {
        let not_active = || ContainerError::ContextNotActive { scope: scope.name() };
        match scope {
            ScopeKind::Application => {
                if self.application.is_active() {
                    Ok(Arc::clone(&self.application))
                } else {
                    Err(not_active())
                }
            }
            ScopeKind::Session => {
                let id = self.with_affinity(|a| a.session.clone()).ok_or_else(not_active)?;
                self.sessions
                    .get(&id)
                    .map(|m| Arc::clone(m.value()))
                    .filter(|m| m.is_active())
                    .ok_or_else(not_active)
            }
            ScopeKind::Conversation => {
                let id = self
                    .with_affinity(|a| a.conversation.clone())
                    .ok_or_else(not_active)?;
                self.conversations
                    .get(&id)
                    .map(|m| Arc::clone(m.value()))
                    .filter(|m| m.is_active())
                    .ok_or_else(not_active)
            }
            ScopeKind::Request => {
                let id = self.with_affinity(|a| a.request.clone()).ok_or_else(not_active)?;
                self.requests
                    .get(&id)
                    .map(|m| Arc::clone(m.value()))
                    .filter(|m| m.is_active())
                    .ok_or_else(not_active)
            }
            ScopeKind::Dependent => Err(ContainerError::internal(
                "dependent scope holds no context map",
            )),
        }
    }

    /// Contextual instance for a normal-scoped bean: the live one, or a
    /// fresh one created exactly once
    pub fn get(&self, bean: &Arc<Bean>, lifecycle: &dyn InstanceLifecycle) -> Result<Handle> {
        let map = self.scope_map(bean.scope)?;
        map.get_or_create(bean, lifecycle)
    }

    /// Fresh dependent instance, registered with the enclosing creational
    /// context for destruction alongside its owner
    pub fn get_dependent(
        &self,
        bean: &Arc<Bean>,
        parent: &Arc<CreationalContext>,
        lifecycle: &dyn InstanceLifecycle,
    ) -> Result<Handle> {
        let creational = CreationalContext::new();
        let instance = lifecycle.create(bean, &creational)?;
        parent.push(Arc::clone(bean), Arc::clone(&instance), creational);
        Ok(instance)
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Destroy every context in reverse dependency order: requests first,
    /// then conversations, sessions, and finally the application scope.
    pub fn shutdown(&self, lifecycle: &dyn InstanceLifecycle) {
        for entry in self.requests.iter() {
            entry.value().destroy(lifecycle);
        }
        self.requests.clear();
        for entry in self.conversations.iter() {
            entry.value().destroy(lifecycle);
        }
        self.conversations.clear();
        for entry in self.sessions.iter() {
            entry.value().destroy(lifecycle);
        }
        self.sessions.clear();
        self.application.destroy(lifecycle);
        self.affinity.clear();

        #[cfg(feature = "logging")]
        debug!(target: "contexture", "All scope contexts destroyed");
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextManager")
            .field("sessions", &self.sessions.len())
            .field("conversations", &self.conversations.len())
            .field("requests", &self.requests.len())
            .finish()
    }
}

/// Log-and-swallow helper for destruction callbacks
pub(crate) fn swallow_destroy_error(bean_class: &str, err: &ContainerError) {
    #[cfg(feature = "logging")]
    warn!(
        target: "contexture",
        bean = bean_class,
        error = %err,
        "Error destroying instance; continuing with the rest of the scope"
    );
    #[cfg(not(feature = "logging"))]
    {
        let _ = (bean_class, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::{BeanBuilder, BeanKind};
    use crate::meta::{ClassDef, TypeSpace};
    use crate::object::Object;
    use std::sync::atomic::AtomicUsize;

    /// Lifecycle that counts creations and destructions
    struct CountingLifecycle {
        space: Arc<TypeSpace>,
        created: AtomicUsize,
        destroyed: AtomicUsize,
    }

    impl CountingLifecycle {
        fn new() -> Self {
            let space = Arc::new(TypeSpace::new());
            space.register(ClassDef::builder("acme.R").build());
            Self {
                space,
                created: AtomicUsize::new(0),
                destroyed: AtomicUsize::new(0),
            }
        }
    }

    impl InstanceLifecycle for CountingLifecycle {
        fn create(&self, bean: &Arc<Bean>, _: &Arc<CreationalContext>) -> Result<Handle> {
            self.created.fetch_add(1, Ordering::SeqCst);
            let class = self.space.load("acme.R").unwrap();
            let _ = bean;
            Ok(Arc::new(Object::new(class, Arc::clone(&self.space))))
        }

        fn destroy(&self, _: &Arc<Bean>, _: &Handle, _: &Arc<CreationalContext>) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn bean(scope: ScopeKind) -> Arc<Bean> {
        let class = Arc::new(ClassDef::builder("acme.R").default_ctor().build());
        Arc::new(
            BeanBuilder::new(class, BeanKind::Managed { ctor_index: 0 })
                .scope(scope)
                .build(),
        )
    }

    #[test]
    fn application_scope_creates_exactly_once() {
        let manager = ContextManager::new();
        let lifecycle = CountingLifecycle::new();
        let b = bean(ScopeKind::Application);

        let first = manager.get(&b, &lifecycle).unwrap();
        let second = manager.get(&b, &lifecycle).unwrap();

        assert_eq!(first.instance_id(), second.instance_id());
        assert_eq!(lifecycle.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_get_creates_once() {
        let manager = Arc::new(ContextManager::new());
        let lifecycle = Arc::new(CountingLifecycle::new());
        let b = bean(ScopeKind::Application);

        thread::scope(|scope| {
            for _ in 0..8 {
                let manager = Arc::clone(&manager);
                let lifecycle = Arc::clone(&lifecycle);
                let b = Arc::clone(&b);
                scope.spawn(move || {
                    manager.get(&b, &*lifecycle).unwrap();
                });
            }
        });

        assert_eq!(lifecycle.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_rotation_produces_fresh_instances() {
        let manager = ContextManager::new();
        let lifecycle = CountingLifecycle::new();
        let b = bean(ScopeKind::Request);

        manager.activate_request();
        let first = manager.get(&b, &lifecycle).unwrap();
        manager.deactivate_request(&lifecycle);

        manager.activate_request();
        let second = manager.get(&b, &lifecycle).unwrap();
        manager.deactivate_request(&lifecycle);

        assert_ne!(first.instance_id(), second.instance_id());
        assert_eq!(lifecycle.created.load(Ordering::SeqCst), 2);
        assert_eq!(lifecycle.destroyed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn inactive_request_scope_raises() {
        let manager = ContextManager::new();
        let lifecycle = CountingLifecycle::new();
        let b = bean(ScopeKind::Request);

        let err = manager.get(&b, &lifecycle).unwrap_err();
        assert!(matches!(err, ContainerError::ContextNotActive { scope: "Request" }));
    }

    #[test]
    fn sessions_are_isolated_by_id() {
        let manager = ContextManager::new();
        let lifecycle = CountingLifecycle::new();
        let b = bean(ScopeKind::Session);

        manager.activate_session("alice");
        let alice = manager.get(&b, &lifecycle).unwrap();

        manager.activate_session("bob");
        let bob = manager.get(&b, &lifecycle).unwrap();

        assert_ne!(alice.instance_id(), bob.instance_id());

        // re-attaching to alice finds her instance again
        manager.activate_session("alice");
        let again = manager.get(&b, &lifecycle).unwrap();
        assert_eq!(alice.instance_id(), again.instance_id());
    }

    #[test]
    fn invalidate_session_destroys_instances() {
        let manager = ContextManager::new();
        let lifecycle = CountingLifecycle::new();
        let b = bean(ScopeKind::Session);

        manager.activate_session("alice");
        manager.get(&b, &lifecycle).unwrap();
        manager.invalidate_session("alice", &lifecycle);

        assert_eq!(lifecycle.destroyed.load(Ordering::SeqCst), 1);
        assert!(matches!(
            manager.get(&b, &lifecycle),
            Err(ContainerError::ContextNotActive { .. })
        ));
    }

    #[test]
    fn conversations_begin_and_end() {
        let manager = ContextManager::new();
        let lifecycle = CountingLifecycle::new();
        let b = bean(ScopeKind::Conversation);

        manager.begin_conversation("c1");
        assert_eq!(manager.current_conversation().as_deref(), Some("c1"));
        let first = manager.get(&b, &lifecycle).unwrap();
        let second = manager.get(&b, &lifecycle).unwrap();
        assert_eq!(first.instance_id(), second.instance_id());

        manager.end_conversation("c1", &lifecycle);
        assert_eq!(manager.current_conversation(), None);
        assert_eq!(lifecycle.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dependent_instances_ride_the_parent_creational() {
        let manager = ContextManager::new();
        let lifecycle = CountingLifecycle::new();
        let b = bean(ScopeKind::Dependent);
        let parent = CreationalContext::new();

        let first = manager.get_dependent(&b, &parent, &lifecycle).unwrap();
        let second = manager.get_dependent(&b, &parent, &lifecycle).unwrap();

        assert_ne!(first.instance_id(), second.instance_id());
        assert_eq!(parent.dependent_count(), 2);

        parent.release_with(&|dependent| {
            lifecycle.destroy(&dependent.bean, &dependent.instance, &dependent.creational);
        });
        assert_eq!(lifecycle.destroyed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shutdown_destroys_everything_in_reverse_order() {
        let manager = ContextManager::new();
        let lifecycle = CountingLifecycle::new();

        manager.activate_session("s");
        manager.begin_conversation("c");
        manager.activate_request();
        manager.get(&bean(ScopeKind::Application), &lifecycle).unwrap();
        manager.get(&bean(ScopeKind::Session), &lifecycle).unwrap();
        manager.get(&bean(ScopeKind::Conversation), &lifecycle).unwrap();
        manager.get(&bean(ScopeKind::Request), &lifecycle).unwrap();

        manager.shutdown(&lifecycle);
        assert_eq!(lifecycle.destroyed.load(Ordering::SeqCst), 4);
        assert!(matches!(
            manager.get(&bean(ScopeKind::Application), &lifecycle),
            Err(ContainerError::ContextNotActive { .. })
        ));
    }
}
