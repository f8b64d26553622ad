//! The container knowledge base
//!
//! Process-wide state built once during boot: discovered classes, the bean
//! queue, separate producer/interceptor/decorator queues, and the four
//! diagnostic logs. Everything is concurrent-safe and append-only during
//! discovery; `freeze()` publishes the structure for lock-free concurrent
//! reads while serving.

use crate::bean::Bean;
use crate::decorator::DecoratorInfo;
use crate::interceptor::InterceptorInfo;
use crate::meta::ClassDef;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "logging")]
use tracing::debug;

/// Append-only registry of everything discovery produced
pub struct KnowledgeBase {
    classes: DashMap<Arc<str>, Arc<ClassDef>, ahash::RandomState>,
    beans: Mutex<Vec<Arc<Bean>>>,
    producers: Mutex<Vec<Arc<Bean>>>,
    interceptors: Mutex<Vec<Arc<InterceptorInfo>>>,
    decorators: Mutex<Vec<Arc<DecoratorInfo>>>,
    warnings: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    definition_errors: Mutex<Vec<String>>,
    injection_errors: Mutex<Vec<String>>,
    frozen: AtomicBool,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self {
            classes: DashMap::with_hasher(ahash::RandomState::new()),
            beans: Mutex::new(Vec::new()),
            producers: Mutex::new(Vec::new()),
            interceptors: Mutex::new(Vec::new()),
            decorators: Mutex::new(Vec::new()),
            warnings: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            definition_errors: Mutex::new(Vec::new()),
            injection_errors: Mutex::new(Vec::new()),
            frozen: AtomicBool::new(false),
        }
    }

    // =========================================================================
    // Discovery-time mutation
    // =========================================================================

    pub fn add_class(&self, class: Arc<ClassDef>) {
        debug_assert!(!self.is_frozen());
        self.classes.insert(Arc::clone(&class.name), class);
    }

    pub fn add_bean(&self, bean: Arc<Bean>) {
        debug_assert!(!self.is_frozen());

        #[cfg(feature = "logging")]
        debug!(
            target: "contexture",
            bean = %bean.class.name,
            scope = %bean.scope,
            has_errors = bean.has_errors,
            "Registering bean"
        );

        self.beans.lock().push(bean);
    }

    /// Producer beans go on the main queue and the producer queue
    pub fn add_producer(&self, bean: Arc<Bean>) {
        debug_assert!(!self.is_frozen());
        self.producers.lock().push(Arc::clone(&bean));
        self.beans.lock().push(bean);
    }

    pub fn add_interceptor(&self, interceptor: Arc<InterceptorInfo>) {
        debug_assert!(!self.is_frozen());
        self.interceptors.lock().push(interceptor);
    }

    pub fn add_decorator(&self, decorator: Arc<DecoratorInfo>) {
        debug_assert!(!self.is_frozen());
        self.decorators.lock().push(decorator);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.warnings.lock().push(message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.errors.lock().push(message.into());
    }

    pub fn definition_error(&self, message: impl Into<String>) {
        let message = message.into();

        #[cfg(feature = "logging")]
        debug!(target: "contexture", %message, "Definition error recorded");

        self.definition_errors.lock().push(message);
    }

    pub fn injection_error(&self, message: impl Into<String>) {
        self.injection_errors.lock().push(message.into());
    }

    // =========================================================================
    // Publication
    // =========================================================================

    /// Publish the knowledge base for the serving phase. The Release store
    /// pairs with the Acquire load in `is_frozen` to give readers a stable
    /// snapshot.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);

        #[cfg(feature = "logging")]
        debug!(
            target: "contexture",
            classes = self.classes.len(),
            beans = self.beans.lock().len(),
            interceptors = self.interceptors.lock().len(),
            decorators = self.decorators.lock().len(),
            "Knowledge base frozen"
        );
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn class(&self, name: &str) -> Option<Arc<ClassDef>> {
        self.classes.get(name).map(|r| Arc::clone(r.value()))
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Snapshot of the bean queue, in registration order
    pub fn beans(&self) -> Vec<Arc<Bean>> {
        self.beans.lock().clone()
    }

    /// Beans visible to the resolver: registered without validation errors
    pub fn valid_beans(&self) -> Vec<Arc<Bean>> {
        self.beans
            .lock()
            .iter()
            .filter(|b| !b.has_errors)
            .cloned()
            .collect()
    }

    pub fn producers(&self) -> Vec<Arc<Bean>> {
        self.producers.lock().clone()
    }

    pub fn interceptors(&self) -> Vec<Arc<InterceptorInfo>> {
        self.interceptors.lock().clone()
    }

    pub fn decorators(&self) -> Vec<Arc<DecoratorInfo>> {
        self.decorators.lock().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn definition_errors(&self) -> Vec<String> {
        self.definition_errors.lock().clone()
    }

    pub fn injection_errors(&self) -> Vec<String> {
        self.injection_errors.lock().clone()
    }

    /// All accumulated deployment problems, for boot verification
    pub fn deployment_problems(&self) -> Vec<String> {
        let mut problems = self.definition_errors();
        problems.extend(self.injection_errors());
        problems.extend(self.errors());
        problems
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("classes", &self.classes.len())
            .field("beans", &self.beans.lock().len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::{BeanBuilder, BeanKind};

    fn bean(name: &str, with_errors: bool) -> Arc<Bean> {
        let class = Arc::new(ClassDef::builder(name).build());
        let mut builder = BeanBuilder::new(class, BeanKind::Managed { ctor_index: 0 });
        if with_errors {
            builder = builder.mark_errors();
        }
        Arc::new(builder.build())
    }

    #[test]
    fn beans_with_errors_are_invisible_to_valid_set() {
        let kb = KnowledgeBase::new();
        kb.add_bean(bean("acme.Good", false));
        kb.add_bean(bean("acme.Bad", true));

        assert_eq!(kb.beans().len(), 2);
        let valid = kb.valid_beans();
        assert_eq!(valid.len(), 1);
        assert_eq!(&*valid[0].class.name, "acme.Good");
    }

    #[test]
    fn producers_appear_on_both_queues() {
        let kb = KnowledgeBase::new();
        kb.add_producer(bean("acme.Produced", false));
        assert_eq!(kb.beans().len(), 1);
        assert_eq!(kb.producers().len(), 1);
    }

    #[test]
    fn deployment_problems_aggregate_all_logs() {
        let kb = KnowledgeBase::new();
        kb.definition_error("bad bean");
        kb.injection_error("bad point");
        kb.error("structural");
        kb.warning("just a warning");

        let problems = kb.deployment_problems();
        assert_eq!(problems.len(), 3);
        assert!(!problems.iter().any(|p| p.contains("warning")));
    }

    #[test]
    fn freeze_publishes() {
        let kb = KnowledgeBase::new();
        assert!(!kb.is_frozen());
        kb.freeze();
        assert!(kb.is_frozen());
    }
}
