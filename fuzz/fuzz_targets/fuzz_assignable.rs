#![no_main]

//! Fuzz target for the assignability engine
//!
//! Builds a random single-parameter class chain and checks reflexivity,
//! raw-target acceptance, invariance of generic arguments, and that the
//! memo cache never changes a decision.

use arbitrary::Arbitrary;
use contexture::meta::{ClassDef, TypeSpace};
use contexture::{Assignability, TypeRef};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

#[derive(Debug, Arbitrary)]
struct Input {
    chain_len: u8,
    arg_a: bool,
    query_depth: u8,
}

fuzz_target!(|input: Input| {
    let depth = (input.chain_len % 6) as usize + 1;

    let space = Arc::new(TypeSpace::new());
    space.register(ClassDef::builder("lang.A").build());
    space.register(ClassDef::builder("lang.B").build());

    // base0<E> <- base1<E> <- ... <- leaf extends base(depth-1)<arg>
    space.register(ClassDef::builder("gen.Base0").type_param("E").build());
    for level in 1..depth {
        space.register(
            ClassDef::builder(format!("gen.Base{level}"))
                .type_param("E")
                .extends(TypeRef::parameterized(
                    format!("gen.Base{}", level - 1),
                    vec![TypeRef::variable("E")],
                ))
                .build(),
        );
    }
    let arg = if input.arg_a { "lang.A" } else { "lang.B" };
    space.register(
        ClassDef::builder("gen.Leaf")
            .extends(TypeRef::parameterized(
                format!("gen.Base{}", depth - 1),
                vec![TypeRef::class(arg)],
            ))
            .build(),
    );

    let engine = Assignability::new(Arc::clone(&space));
    let leaf = TypeRef::class("gen.Leaf");
    let query_level = (input.query_depth as usize) % depth;
    let raw_base = TypeRef::class(format!("gen.Base{query_level}"));

    // reflexivity
    assert!(engine.is_assignable(&leaf, &leaf).unwrap());

    // raw targets accept the whole chain
    assert!(engine.is_assignable(&raw_base, &leaf).unwrap());

    // the substituted argument matches, the other never does
    let with_arg = TypeRef::parameterized(
        format!("gen.Base{query_level}"),
        vec![TypeRef::class(arg)],
    );
    let with_other = TypeRef::parameterized(
        format!("gen.Base{query_level}"),
        vec![TypeRef::class(if input.arg_a { "lang.B" } else { "lang.A" })],
    );
    assert!(engine.is_assignable(&with_arg, &leaf).unwrap());
    assert!(!engine.is_assignable(&with_other, &leaf).unwrap());

    // memoised decisions are stable
    assert!(engine.is_assignable(&with_arg, &leaf).unwrap());
    assert!(!engine.is_assignable(&with_other, &leaf).unwrap());
});
