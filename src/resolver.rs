//! Typed, qualified bean resolution
//!
//! A candidate bean matches when some type in its exposed type set is
//! assignable to the required type and its qualifier set satisfies the
//! required qualifiers. Zero candidates is an unsatisfied dependency; more
//! than one goes through alternative selection, where the highest-priority
//! enabled alternative wins and anything else is ambiguous.

use crate::assignable::Assignability;
use crate::bean::{Bean, BeanKind};
use crate::error::{ContainerError, Result};
use crate::knowledge::KnowledgeBase;
use crate::meta::TypeRef;
use crate::qualifier::{Qualifier, satisfies};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

pub struct BeanResolver {
    kb: Arc<KnowledgeBase>,
    assignability: Arc<Assignability>,
}

impl BeanResolver {
    pub fn new(kb: Arc<KnowledgeBase>, assignability: Arc<Assignability>) -> Self {
        Self { kb, assignability }
    }

    /// Pure lookup: every valid bean matching the required type and
    /// qualifiers, in registration order. Does not instantiate.
    pub fn get_beans(
        &self,
        required: &TypeRef,
        qualifiers: &[Qualifier],
    ) -> Result<Vec<Arc<Bean>>> {
        #[cfg(feature = "logging")]
        let _span = crate::logging::resolve_span(required).entered();

        let mut candidates = Vec::new();
        for bean in self.kb.valid_beans() {
            if !satisfies(qualifiers, &bean.qualifiers) {
                continue;
            }
            let mut type_match = false;
            for bean_type in &bean.types {
                if self.assignability.is_assignable(required, bean_type)? {
                    type_match = true;
                    break;
                }
            }
            if type_match {
                candidates.push(bean);
            }
        }

        #[cfg(feature = "logging")]
        trace!(
            target: "contexture",
            required = %required,
            candidates = candidates.len(),
            "Candidate lookup"
        );

        Ok(candidates)
    }

    /// Alternative selection over an ambiguous candidate set
    pub fn resolve(
        &self,
        candidates: Vec<Arc<Bean>>,
        required: &TypeRef,
        qualifiers: &[Qualifier],
    ) -> Result<Arc<Bean>> {
        match candidates.len() {
            0 => Err(ContainerError::unsatisfied(
                required.clone(),
                qualifiers.to_vec(),
            )),
            1 => Ok(candidates.into_iter().next().expect("length checked")),
            _ => {
                let alternatives: Vec<&Arc<Bean>> =
                    candidates.iter().filter(|b| b.alternative).collect();
                if !alternatives.is_empty() {
                    let top = alternatives
                        .iter()
                        .map(|b| b.priority.unwrap_or(i64::MIN))
                        .max()
                        .expect("non-empty");
                    let mut winners = alternatives
                        .iter()
                        .filter(|b| b.priority.unwrap_or(i64::MIN) == top);
                    if let (Some(winner), None) = (winners.next(), winners.next()) {
                        #[cfg(feature = "logging")]
                        trace!(
                            target: "contexture",
                            required = %required,
                            winner = %winner.class.name,
                            priority = top,
                            "Alternative selected"
                        );
                        return Ok(Arc::clone(winner));
                    }
                }
                Err(ContainerError::ambiguous(
                    required.clone(),
                    candidates
                        .iter()
                        .map(|b| b.class.name.to_string())
                        .collect(),
                ))
            }
        }
    }

    /// Lookup plus alternative selection
    pub fn resolve_bean(
        &self,
        required: &TypeRef,
        qualifiers: &[Qualifier],
    ) -> Result<Arc<Bean>> {
        let candidates = self.get_beans(required, qualifiers)?;
        self.resolve(candidates, required, qualifiers)
    }

    /// The single managed bean whose bean class equals the given class
    pub fn resolve_declaring_bean(&self, class: &str) -> Result<Arc<Bean>> {
        self.kb
            .valid_beans()
            .into_iter()
            .find(|b| {
                matches!(b.kind, BeanKind::Managed { .. }) && &**b.bean_class() == class
            })
            .ok_or_else(|| {
                ContainerError::unsatisfied(TypeRef::class(class), Vec::new())
            })
    }
}

impl std::fmt::Debug for BeanResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanResolver").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::{BeanBuilder, ScopeKind};
    use crate::meta::{ClassDef, TypeSpace};
    use crate::qualifier::augment;

    struct Fixture {
        space: Arc<TypeSpace>,
        kb: Arc<KnowledgeBase>,
        resolver: BeanResolver,
    }

    fn fixture() -> Fixture {
        let space = Arc::new(TypeSpace::new());
        space.register(ClassDef::builder("acme.Svc").interface().build());
        let kb = Arc::new(KnowledgeBase::new());
        let assignability = Arc::new(Assignability::new(Arc::clone(&space)));
        let resolver = BeanResolver::new(Arc::clone(&kb), assignability);
        Fixture {
            space,
            kb,
            resolver,
        }
    }

    fn svc_bean(f: &Fixture, name: &str, alternative: bool, priority: Option<i64>) -> Arc<Bean> {
        let class = f.space.register(
            ClassDef::builder(name)
                .implements(TypeRef::class("acme.Svc"))
                .default_ctor()
                .build(),
        );
        let bean = Arc::new(
            BeanBuilder::new(class, BeanKind::Managed { ctor_index: 0 })
                .types(vec![TypeRef::class(name), TypeRef::class("acme.Svc")])
                .qualifiers(augment(vec![]))
                .scope(ScopeKind::Dependent)
                .alternative(alternative)
                .priority(priority)
                .build(),
        );
        f.kb.add_bean(Arc::clone(&bean));
        bean
    }

    #[test]
    fn single_candidate_resolves() {
        let f = fixture();
        let bean = svc_bean(&f, "acme.Impl", false, None);
        let resolved = f
            .resolver
            .resolve_bean(&TypeRef::class("acme.Svc"), &[])
            .unwrap();
        assert_eq!(resolved.id(), bean.id());
    }

    #[test]
    fn no_candidate_is_unsatisfied() {
        let f = fixture();
        let err = f
            .resolver
            .resolve_bean(&TypeRef::class("acme.Svc"), &[])
            .unwrap_err();
        assert!(matches!(err, ContainerError::Unsatisfied { .. }));
    }

    #[test]
    fn two_candidates_are_ambiguous_and_listed() {
        let f = fixture();
        svc_bean(&f, "acme.A1", false, None);
        svc_bean(&f, "acme.A2", false, None);
        let err = f
            .resolver
            .resolve_bean(&TypeRef::class("acme.Svc"), &[])
            .unwrap_err();
        match err {
            ContainerError::Ambiguous { candidates, .. } => {
                assert_eq!(candidates, vec!["acme.A1".to_string(), "acme.A2".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn highest_priority_alternative_wins() {
        let f = fixture();
        svc_bean(&f, "acme.A1", true, Some(100));
        let high = svc_bean(&f, "acme.A2", true, Some(200));
        let resolved = f
            .resolver
            .resolve_bean(&TypeRef::class("acme.Svc"), &[])
            .unwrap();
        assert_eq!(resolved.id(), high.id());
    }

    #[test]
    fn tied_alternatives_stay_ambiguous() {
        let f = fixture();
        svc_bean(&f, "acme.A1", true, Some(100));
        svc_bean(&f, "acme.A2", true, Some(100));
        assert!(matches!(
            f.resolver.resolve_bean(&TypeRef::class("acme.Svc"), &[]),
            Err(ContainerError::Ambiguous { .. })
        ));
    }

    #[test]
    fn qualifier_filter_narrows_candidates() {
        let f = fixture();
        svc_bean(&f, "acme.Plain", false, None);
        // a bean with a user qualifier
        let class = f.space.register(
            ClassDef::builder("acme.Special")
                .implements(TypeRef::class("acme.Svc"))
                .default_ctor()
                .build(),
        );
        let special = Arc::new(
            BeanBuilder::new(class, BeanKind::Managed { ctor_index: 0 })
                .types(vec![TypeRef::class("acme.Special"), TypeRef::class("acme.Svc")])
                .qualifiers(augment(vec![Qualifier::simple("Fast")]))
                .build(),
        );
        f.kb.add_bean(Arc::clone(&special));

        let resolved = f
            .resolver
            .resolve_bean(&TypeRef::class("acme.Svc"), &[Qualifier::simple("Fast")])
            .unwrap();
        assert_eq!(resolved.id(), special.id());
    }

    #[test]
    fn error_beans_are_invisible() {
        let f = fixture();
        let class = f.space.register(
            ClassDef::builder("acme.Broken")
                .implements(TypeRef::class("acme.Svc"))
                .build(),
        );
        f.kb.add_bean(Arc::new(
            BeanBuilder::new(class, BeanKind::Managed { ctor_index: 0 })
                .types(vec![TypeRef::class("acme.Broken"), TypeRef::class("acme.Svc")])
                .qualifiers(augment(vec![]))
                .mark_errors()
                .build(),
        ));
        assert!(matches!(
            f.resolver.resolve_bean(&TypeRef::class("acme.Svc"), &[]),
            Err(ContainerError::Unsatisfied { .. })
        ));
    }

    #[test]
    fn declaring_bean_lookup_matches_class() {
        let f = fixture();
        let bean = svc_bean(&f, "acme.Impl", false, None);
        let found = f.resolver.resolve_declaring_bean("acme.Impl").unwrap();
        assert_eq!(found.id(), bean.id());
        assert!(f.resolver.resolve_declaring_bean("acme.Missing").is_err());
    }
}
