//! Parameterised-type assignability
//!
//! Decides whether a candidate reflective type satisfies a required type at
//! an injection point. Generic arguments match invariantly: `List<String>`
//! never satisfies `List<Object>`. Candidate hierarchies are navigated with
//! type-variable substitution, so `ArrayList<String>` is seen as
//! `List<String>` when the required type asks for the interface.
//!
//! Decisions are memoised in a capacity-bounded LRU; correctness never
//! depends on the cache.

use crate::error::{ContainerError, Result};
use crate::meta::{TypeRef, TypeSpace};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Memo key: (target, candidate)
type TypePair = (TypeRef, TypeRef);

const MEMO_CAPACITY: usize = 4096;

/// Bounded LRU memo for assignability decisions
struct Memo {
    entries: HashMap<TypePair, (bool, u64), ahash::RandomState>,
    tick: u64,
}

impl Memo {
    fn new() -> Self {
        Self {
            entries: HashMap::with_hasher(ahash::RandomState::new()),
            tick: 0,
        }
    }

    fn get(&mut self, key: &TypePair) -> Option<bool> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(key).map(|entry| {
            entry.1 = tick;
            entry.0
        })
    }

    fn insert(&mut self, key: TypePair, value: bool) {
        self.tick += 1;
        if self.entries.len() >= MEMO_CAPACITY {
            // evict the least recently touched entry
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (_, tick))| *tick)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, (value, self.tick));
    }
}

/// The assignability engine over a shared [`TypeSpace`]
pub struct Assignability {
    space: Arc<TypeSpace>,
    memo: Mutex<Memo>,
}

impl Assignability {
    pub fn new(space: Arc<TypeSpace>) -> Self {
        Self {
            space,
            memo: Mutex::new(Memo::new()),
        }
    }

    /// Reject types that may not appear at an injection point: wildcards,
    /// free type variables, and either of those nested inside parameterised
    /// components or arrays.
    pub fn check_legal_injection_point(ty: &TypeRef) -> Result<()> {
        fn check(root: &TypeRef, ty: &TypeRef, nested: bool) -> Result<()> {
            match ty {
                TypeRef::Wildcard => Err(ContainerError::InvalidInjectionPointType {
                    ty: root.clone(),
                    reason: if nested {
                        "wildcard type argument".into()
                    } else {
                        "wildcard type".into()
                    },
                }),
                TypeRef::Variable(name) => Err(ContainerError::InvalidInjectionPointType {
                    ty: root.clone(),
                    reason: format!("free type variable {name}"),
                }),
                TypeRef::Parameterized { args, .. } => {
                    for arg in args {
                        check(root, arg, true)?;
                    }
                    Ok(())
                }
                TypeRef::Array(component) => check(root, component, nested),
                TypeRef::Class(_) => Ok(()),
            }
        }
        check(ty, ty, false)
    }

    /// Is `candidate` assignable to the required `target`?
    pub fn is_assignable(&self, target: &TypeRef, candidate: &TypeRef) -> Result<bool> {
        Self::check_legal_injection_point(target)?;

        if target == candidate {
            return Ok(true);
        }

        let key = (target.clone(), candidate.clone());
        if let Some(hit) = self.memo.lock().get(&key) {
            return Ok(hit);
        }

        let decision = self.decide(target, candidate)?;
        self.memo.lock().insert(key, decision);
        Ok(decision)
    }

    fn decide(&self, target: &TypeRef, candidate: &TypeRef) -> Result<bool> {
        // generic arrays recurse on components
        if let (TypeRef::Array(target_component), TypeRef::Array(candidate_component)) =
            (target, candidate)
        {
            return self.is_assignable(target_component, candidate_component);
        }

        let (Some(target_raw), Some(candidate_raw)) = (target.raw_name(), candidate.raw_name())
        else {
            return Ok(false);
        };

        if !self.raw_is_subtype(candidate_raw, target_raw)? {
            return Ok(false);
        }

        match target {
            // unparameterised target: raw subtyping suffices
            TypeRef::Class(_) => Ok(true),
            TypeRef::Parameterized { args: target_args, .. } => {
                let Some(supertype) = self.supertype_at(candidate, target_raw) else {
                    return Ok(false);
                };
                match supertype {
                    TypeRef::Parameterized { args, .. } if args.len() == target_args.len() => {
                        Ok(target_args
                            .iter()
                            .zip(args.iter())
                            .all(|(t, c)| Self::argument_matches(t, c)))
                    }
                    // candidate reaches the raw class without arguments
                    _ => Ok(false),
                }
            }
            _ => Ok(false),
        }
    }

    /// Invariant match of one type argument
    fn argument_matches(target: &TypeRef, candidate: &TypeRef) -> bool {
        if target == candidate {
            return true;
        }
        // raw-compatibility fallback for unresolved candidate arguments
        if candidate.is_abstract_argument() {
            return true;
        }
        match (target, candidate) {
            (
                TypeRef::Parameterized { raw: target_raw, args: target_args },
                TypeRef::Parameterized { raw: candidate_raw, args: candidate_args },
            ) => {
                target_raw == candidate_raw
                    && target_args.len() == candidate_args.len()
                    && target_args
                        .iter()
                        .zip(candidate_args.iter())
                        .all(|(t, c)| Self::argument_matches(t, c))
            }
            _ => false,
        }
    }

    /// Raw subtype test: walk the candidate's class/interface graph
    fn raw_is_subtype(&self, candidate_raw: &Arc<str>, target_raw: &Arc<str>) -> Result<bool> {
        if candidate_raw == target_raw {
            return Ok(true);
        }
        let Some(start) = self.space.load(candidate_raw) else {
            return Err(ContainerError::internal(format!(
                "raw class lookup failed for {candidate_raw}"
            )));
        };

        let mut queue: VecDeque<Arc<str>> = VecDeque::new();
        let push_edges = |def: &crate::meta::ClassDef, queue: &mut VecDeque<Arc<str>>| {
            if let Some(raw) = def.superclass.as_ref().and_then(|s| s.raw_name()) {
                queue.push_back(Arc::clone(raw));
            }
            for interface in &def.interfaces {
                if let Some(raw) = interface.raw_name() {
                    queue.push_back(Arc::clone(raw));
                }
            }
        };
        push_edges(&start, &mut queue);

        let mut seen: Vec<Arc<str>> = Vec::new();
        while let Some(raw) = queue.pop_front() {
            if raw == *target_raw {
                return Ok(true);
            }
            if seen.iter().any(|s| *s == raw) {
                continue;
            }
            seen.push(Arc::clone(&raw));
            // edges into unregistered classes end the walk silently
            if let Some(def) = self.space.load(&raw) {
                push_edges(&def, &mut queue);
            }
        }
        Ok(false)
    }

    /// Navigate the candidate's hierarchy to its supertype with the given
    /// raw class, substituting type variables along every edge.
    fn supertype_at(&self, candidate: &TypeRef, raw: &Arc<str>) -> Option<TypeRef> {
        let mut queue: VecDeque<TypeRef> = VecDeque::new();
        queue.push_back(candidate.clone());
        let mut seen: Vec<TypeRef> = Vec::new();

        while let Some(node) = queue.pop_front() {
            if node.raw_name() == Some(raw) {
                return Some(node);
            }
            if seen.contains(&node) {
                continue;
            }
            seen.push(node.clone());

            let Some(node_raw) = node.raw_name() else { continue };
            let Some(def) = self.space.load(node_raw) else { continue };

            let substitution = Self::substitution_for(&def, &node);
            if let Some(superclass) = &def.superclass {
                queue.push_back(Self::substitute(superclass, &substitution));
            }
            for interface in &def.interfaces {
                queue.push_back(Self::substitute(interface, &substitution));
            }
        }
        None
    }

    /// Map a class's declared type parameters to the arguments it was used
    /// with; unparameterised use leaves the variables free.
    fn substitution_for(
        def: &crate::meta::ClassDef,
        usage: &TypeRef,
    ) -> HashMap<Arc<str>, TypeRef> {
        let mut map = HashMap::new();
        if let TypeRef::Parameterized { args, .. } = usage {
            for (param, arg) in def.type_params.iter().zip(args.iter()) {
                map.insert(Arc::clone(param), arg.clone());
            }
        }
        map
    }

    fn substitute(ty: &TypeRef, map: &HashMap<Arc<str>, TypeRef>) -> TypeRef {
        match ty {
            TypeRef::Variable(name) => map.get(name).cloned().unwrap_or_else(|| ty.clone()),
            TypeRef::Parameterized { raw, args } => TypeRef::Parameterized {
                raw: Arc::clone(raw),
                args: args.iter().map(|a| Self::substitute(a, map)).collect(),
            },
            TypeRef::Array(component) => TypeRef::array(Self::substitute(component, map)),
            _ => ty.clone(),
        }
    }

    /// The full type set a class exposes: the class itself plus every
    /// superclass and interface, with type variables substituted along the
    /// way. Used to compute bean type closures.
    pub fn type_closure(&self, ty: &TypeRef) -> Vec<TypeRef> {
        let mut closure: Vec<TypeRef> = Vec::new();
        let mut queue: VecDeque<TypeRef> = VecDeque::new();
        queue.push_back(ty.clone());

        while let Some(node) = queue.pop_front() {
            if closure.contains(&node) {
                continue;
            }
            closure.push(node.clone());

            let Some(node_raw) = node.raw_name() else { continue };
            let Some(def) = self.space.load(node_raw) else { continue };

            let substitution = Self::substitution_for(&def, &node);
            if let Some(superclass) = &def.superclass {
                queue.push_back(Self::substitute(superclass, &substitution));
            }
            for interface in &def.interfaces {
                queue.push_back(Self::substitute(interface, &substitution));
            }
        }
        closure
    }
}

impl std::fmt::Debug for Assignability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assignability")
            .field("memoised", &self.memo.lock().entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::ClassDef;

    /// A miniature collections hierarchy:
    /// `StringList extends ArrayList<String>`,
    /// `ArrayList<E> extends AbstractList<E> implements List<E>`,
    /// `List<E> extends Collection<E>`.
    fn collections_space() -> Arc<TypeSpace> {
        let space = Arc::new(TypeSpace::new());
        space.register(ClassDef::builder("lang.String").build());
        space.register(ClassDef::builder("lang.Object").build());
        space.register(
            ClassDef::builder("collections.Collection")
                .interface()
                .type_param("E")
                .build(),
        );
        space.register(
            ClassDef::builder("collections.List")
                .interface()
                .type_param("E")
                .implements(TypeRef::parameterized(
                    "collections.Collection",
                    vec![TypeRef::variable("E")],
                ))
                .build(),
        );
        space.register(
            ClassDef::builder("collections.AbstractList")
                .type_param("E")
                .implements(TypeRef::parameterized(
                    "collections.List",
                    vec![TypeRef::variable("E")],
                ))
                .build(),
        );
        space.register(
            ClassDef::builder("collections.ArrayList")
                .type_param("E")
                .extends(TypeRef::parameterized(
                    "collections.AbstractList",
                    vec![TypeRef::variable("E")],
                ))
                .build(),
        );
        space.register(
            ClassDef::builder("demo.StringList")
                .extends(TypeRef::parameterized(
                    "collections.ArrayList",
                    vec![TypeRef::class("lang.String")],
                ))
                .build(),
        );
        space
    }

    fn list_of(arg: &str) -> TypeRef {
        TypeRef::parameterized("collections.List", vec![TypeRef::class(arg)])
    }

    #[test]
    fn equal_types_fast_path() {
        let engine = Assignability::new(collections_space());
        assert!(engine.is_assignable(&list_of("lang.String"), &list_of("lang.String")).unwrap());
    }

    #[test]
    fn subtype_with_substitution() {
        let engine = Assignability::new(collections_space());
        let string_list = TypeRef::class("demo.StringList");
        assert!(engine.is_assignable(&list_of("lang.String"), &string_list).unwrap());
    }

    #[test]
    fn generic_arguments_are_invariant() {
        let engine = Assignability::new(collections_space());
        let string_list = TypeRef::class("demo.StringList");
        assert!(!engine.is_assignable(&list_of("lang.Object"), &string_list).unwrap());
        assert!(!engine
            .is_assignable(&list_of("lang.Object"), &list_of("lang.String"))
            .unwrap());
    }

    #[test]
    fn raw_target_accepts_any_parameterisation() {
        let engine = Assignability::new(collections_space());
        let raw_list = TypeRef::class("collections.List");
        assert!(engine.is_assignable(&raw_list, &list_of("lang.String")).unwrap());
        assert!(engine
            .is_assignable(&raw_list, &TypeRef::class("demo.StringList"))
            .unwrap());
    }

    #[test]
    fn unrelated_types_do_not_match() {
        let engine = Assignability::new(collections_space());
        assert!(!engine
            .is_assignable(&TypeRef::class("lang.String"), &TypeRef::class("demo.StringList"))
            .unwrap());
    }

    #[test]
    fn wildcard_candidate_argument_falls_back_to_raw() {
        let engine = Assignability::new(collections_space());
        let wild = TypeRef::parameterized("collections.List", vec![TypeRef::Wildcard]);
        assert!(engine.is_assignable(&list_of("lang.String"), &wild).unwrap());
    }

    #[test]
    fn wildcard_target_is_rejected() {
        let engine = Assignability::new(collections_space());
        let wild = TypeRef::parameterized("collections.List", vec![TypeRef::Wildcard]);
        let err = engine.is_assignable(&wild, &list_of("lang.String")).unwrap_err();
        assert!(matches!(err, ContainerError::InvalidInjectionPointType { .. }));
    }

    #[test]
    fn free_variable_target_is_rejected() {
        let engine = Assignability::new(collections_space());
        let err = engine
            .is_assignable(&TypeRef::variable("T"), &list_of("lang.String"))
            .unwrap_err();
        assert!(matches!(err, ContainerError::InvalidInjectionPointType { .. }));
    }

    #[test]
    fn arrays_recurse_on_components() {
        let engine = Assignability::new(collections_space());
        let strings = TypeRef::array(TypeRef::class("lang.String"));
        let string_lists = TypeRef::array(TypeRef::class("demo.StringList"));
        assert!(engine.is_assignable(&strings, &strings).unwrap());
        assert!(engine
            .is_assignable(&TypeRef::array(list_of("lang.String")), &string_lists)
            .unwrap());
        assert!(!engine.is_assignable(&strings, &string_lists).unwrap());
    }

    #[test]
    fn nested_parameterised_arguments_match_recursively() {
        let engine = Assignability::new(collections_space());
        let list_of_lists = TypeRef::parameterized("collections.List", vec![list_of("lang.String")]);
        assert!(engine.is_assignable(&list_of_lists, &list_of_lists).unwrap());
        let list_of_object_lists =
            TypeRef::parameterized("collections.List", vec![list_of("lang.Object")]);
        assert!(!engine.is_assignable(&list_of_object_lists, &list_of_lists).unwrap());
    }

    #[test]
    fn decisions_are_memoised() {
        let engine = Assignability::new(collections_space());
        let target = list_of("lang.String");
        let candidate = TypeRef::class("demo.StringList");
        assert!(engine.is_assignable(&target, &candidate).unwrap());
        assert!(engine.is_assignable(&target, &candidate).unwrap());
        assert!(engine.memo.lock().entries.len() >= 1);
    }

    #[test]
    fn closure_contains_substituted_supertypes() {
        let engine = Assignability::new(collections_space());
        let closure = engine.type_closure(&TypeRef::class("demo.StringList"));
        assert!(closure.contains(&TypeRef::class("demo.StringList")));
        assert!(closure.contains(&TypeRef::parameterized(
            "collections.ArrayList",
            vec![TypeRef::class("lang.String")]
        )));
        assert!(closure.contains(&list_of("lang.String")));
        assert!(closure.contains(&TypeRef::parameterized(
            "collections.Collection",
            vec![TypeRef::class("lang.String")]
        )));
    }
}
