//! Injection-point model
//!
//! An injection point is a field or parameter the container must supply.
//! Its qualifier set always contains `Any`, and `Default` is added iff no
//! other user qualifier was declared.

use crate::meta::{Annotated, FieldMeta, ParamMeta, TypeRef, vocab};
use crate::qualifier::{Qualifier, QualifierSchemas, augment};
use std::fmt;
use std::sync::Arc;

/// Which member the point lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    CtorParam,
    MethodParam,
}

/// A single location where a bean is to be supplied
#[derive(Debug, Clone)]
pub struct InjectionPoint {
    pub kind: MemberKind,
    /// Field name, or the owning method name for parameters
    pub member: Arc<str>,
    /// Parameter index for parameter points
    pub position: Option<usize>,
    pub required_type: TypeRef,
    pub qualifiers: Vec<Qualifier>,
    /// Decorator delegate point: satisfied by direct assignment, not lookup
    pub delegate: bool,
    pub transient: bool,
    /// Owning bean class, when known
    pub owner: Option<Arc<str>>,
}

impl InjectionPoint {
    /// Build a field injection point
    pub fn for_field(owner: &Arc<str>, field: &FieldMeta, schemas: &QualifierSchemas) -> Self {
        Self {
            kind: MemberKind::Field,
            member: Arc::clone(&field.name),
            position: None,
            required_type: field.ty.clone(),
            qualifiers: augment(extract_qualifiers(field.annotations(), schemas)),
            delegate: field.has_annotation(vocab::DELEGATE),
            transient: field.transient,
            owner: Some(Arc::clone(owner)),
        }
    }

    /// Build a constructor- or method-parameter injection point
    pub fn for_param(
        kind: MemberKind,
        owner: &Arc<str>,
        member: &Arc<str>,
        position: usize,
        param: &ParamMeta,
        schemas: &QualifierSchemas,
    ) -> Self {
        Self {
            kind,
            member: Arc::clone(member),
            position: Some(position),
            required_type: param.ty.clone(),
            qualifiers: augment(extract_qualifiers(param.annotations(), schemas)),
            delegate: param.has_annotation(vocab::DELEGATE),
            transient: false,
            owner: Some(Arc::clone(owner)),
        }
    }

    /// A free-standing point for programmatic lookup
    pub fn synthetic(required_type: TypeRef, qualifiers: Vec<Qualifier>) -> Self {
        Self {
            kind: MemberKind::Field,
            member: Arc::from("<lookup>"),
            position: None,
            required_type,
            qualifiers: augment(qualifiers),
            delegate: false,
            transient: false,
            owner: None,
        }
    }
}

impl fmt::Display for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let owner = self.owner.as_deref().unwrap_or("<none>");
        match self.position {
            Some(position) => write!(
                f,
                "{owner}.{}[{position}]: {}",
                self.member, self.required_type
            ),
            None => write!(f, "{owner}.{}: {}", self.member, self.required_type),
        }
    }
}

/// Pull the qualifier annotations off a member, per the schema registry
pub fn extract_qualifiers(
    annotations: &[crate::meta::Annotation],
    schemas: &QualifierSchemas,
) -> Vec<Qualifier> {
    annotations
        .iter()
        .filter(|a| schemas.is_qualifier(&a.name))
        .map(|a| Qualifier::from_annotation(a, schemas))
        .collect()
}
