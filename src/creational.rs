//! Creational contexts
//!
//! A creational context is the bag of dependent instances accrued while
//! servicing a single `create` request. When the owning instance is
//! destroyed, the bag is released in LIFO order so later dependents go
//! first.

use crate::bean::Bean;
use crate::object::Handle;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// One tracked dependent instance
pub struct Dependent {
    pub bean: Arc<Bean>,
    pub instance: Handle,
    /// The dependent's own creational context, released after it
    pub creational: Arc<CreationalContext>,
}

/// Per-create dependent tracking
#[derive(Default)]
pub struct CreationalContext {
    dependents: Mutex<Vec<Dependent>>,
}

impl CreationalContext {
    #[inline]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a dependent-scoped instance created under this context
    pub fn push(&self, bean: Arc<Bean>, instance: Handle, creational: Arc<CreationalContext>) {
        self.dependents.lock().push(Dependent {
            bean,
            instance,
            creational,
        });
    }

    #[inline]
    pub fn dependent_count(&self) -> usize {
        self.dependents.lock().len()
    }

    /// Release every tracked dependent, LIFO. The callback performs the
    /// actual bean destruction; it must not panic.
    pub fn release_with(&self, destroy: &dyn Fn(&Dependent)) {
        let mut drained = {
            let mut guard = self.dependents.lock();
            std::mem::take(&mut *guard)
        };
        while let Some(dependent) = drained.pop() {
            destroy(&dependent);
            dependent.creational.release_with(destroy);
        }
    }
}

impl fmt::Debug for CreationalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreationalContext")
            .field("dependents", &self.dependent_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::{BeanBuilder, BeanKind};
    use crate::meta::{ClassDef, TypeSpace};
    use crate::object::Object;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dummy(name: &str) -> (Arc<Bean>, Handle) {
        let space = Arc::new(TypeSpace::new());
        let class = space.register(ClassDef::builder(name).build());
        let bean = Arc::new(
            BeanBuilder::new(Arc::clone(&class), BeanKind::Managed { ctor_index: 0 }).build(),
        );
        let handle: Handle = Arc::new(Object::new(class, space));
        (bean, handle)
    }

    #[test]
    fn release_is_lifo() {
        let ctx = CreationalContext::new();
        let (bean_a, a) = dummy("acme.A");
        let (bean_b, b) = dummy("acme.B");
        ctx.push(bean_a, a, CreationalContext::new());
        ctx.push(bean_b, b, CreationalContext::new());

        let order = Mutex::new(Vec::new());
        ctx.release_with(&|dependent| {
            order.lock().push(dependent.bean.class.name.to_string());
        });

        assert_eq!(*order.lock(), vec!["acme.B".to_string(), "acme.A".to_string()]);
        assert_eq!(ctx.dependent_count(), 0);
    }

    #[test]
    fn nested_contexts_release_transitively() {
        let outer = CreationalContext::new();
        let inner = CreationalContext::new();
        let (bean_a, a) = dummy("acme.A");
        let (bean_b, b) = dummy("acme.B");
        inner.push(bean_b, b, CreationalContext::new());
        outer.push(bean_a, a, inner);

        let released = AtomicUsize::new(0);
        outer.release_with(&|_| {
            released.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }
}
