#![no_main]

//! Fuzz target for qualifier equality and hashing
//!
//! Checks that binding-aware equality implies hash equality and that
//! non-binding members never influence either.

use arbitrary::Arbitrary;
use contexture::meta::{Annotation, AnnotationValue};
use contexture::qualifier::{Qualifier, QualifierSchemas, satisfies};
use libfuzzer_sys::fuzz_target;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Arbitrary)]
struct Member {
    name: String,
    value: i64,
    nonbinding: bool,
}

#[derive(Debug, Arbitrary)]
struct Input {
    type_name: String,
    members: Vec<Member>,
    noise: Vec<(String, String)>,
}

fn hash_of(q: &Qualifier) -> u64 {
    let mut hasher = DefaultHasher::new();
    q.hash(&mut hasher);
    hasher.finish()
}

fuzz_target!(|input: Input| {
    if input.type_name.is_empty() || input.members.len() > 16 {
        return;
    }

    let schemas = QualifierSchemas::with_builtins();
    let nonbinding: Vec<String> = input
        .members
        .iter()
        .filter(|m| m.nonbinding)
        .map(|m| m.name.clone())
        .collect();
    schemas.register(&input.type_name, nonbinding);

    let mut base = Annotation::marker(&input.type_name);
    for member in &input.members {
        base = base.with(member.name.clone(), AnnotationValue::Int(member.value));
    }

    // perturb only non-binding members
    let mut perturbed = base.clone();
    for member in &input.members {
        if member.nonbinding {
            perturbed = perturbed.with(
                member.name.clone(),
                AnnotationValue::Int(member.value.wrapping_add(1)),
            );
        }
    }
    for (name, value) in input.noise.iter().take(4) {
        if input.members.iter().any(|m| &m.name == name && m.nonbinding) {
            perturbed = perturbed.with(name.clone(), AnnotationValue::Str(value.clone()));
        }
    }

    let original = Qualifier::from_annotation(&base, &schemas);
    let shifted = Qualifier::from_annotation(&perturbed, &schemas);

    // non-binding members are inert for equality and hashing
    assert_eq!(original, shifted);
    assert_eq!(hash_of(&original), hash_of(&shifted));

    // equality implies satisfaction both ways
    assert!(satisfies(
        std::slice::from_ref(&original),
        std::slice::from_ref(&shifted)
    ));
    assert!(satisfies(
        std::slice::from_ref(&shifted),
        std::slice::from_ref(&original)
    ));

    // perturbing a binding member breaks equality; skip names that are
    // also declared non-binding by another member entry
    let binding_name = input
        .members
        .iter()
        .filter(|m| !m.nonbinding)
        .map(|m| &m.name)
        .find(|name| !input.members.iter().any(|o| o.nonbinding && &o.name == *name));
    if let Some(name) = binding_name {
        if let Some(AnnotationValue::Int(current)) = base.member(name) {
            let changed = base
                .clone()
                .with(name.clone(), AnnotationValue::Int(current.wrapping_add(1)));
            let changed = Qualifier::from_annotation(&changed, &schemas);
            assert_ne!(original, changed);
        }
    }
});
