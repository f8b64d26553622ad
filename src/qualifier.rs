//! Qualifier model and binding-aware matching
//!
//! A qualifier is an annotation whose identity is its type name plus the
//! values of its *binding* members. Non-binding members (declared through
//! the per-qualifier schema) influence neither equality nor hashing, so
//! qualifier sets can be used as hash keys without surprises.

use crate::meta::{Annotation, AnnotationValue, vocab};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Per-qualifier-type schema: which members do not bind
#[derive(Debug, Clone, Default)]
pub struct QualifierSchema {
    pub nonbinding: HashSet<String>,
}

/// Registry of qualifier types and their member schemas.
///
/// Computed once during boot; the comparator consults it when a
/// [`Qualifier`] is constructed, after which equality and hashing are
/// self-contained.
pub struct QualifierSchemas {
    schemas: DashMap<Arc<str>, QualifierSchema, ahash::RandomState>,
}

impl QualifierSchemas {
    /// Empty registry (no qualifier types known)
    pub fn new() -> Self {
        Self {
            schemas: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Registry pre-loaded with the built-in qualifiers
    /// `Default`, `Any` and `Named`.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(vocab::DEFAULT, None::<String>);
        registry.register(vocab::ANY, None::<String>);
        registry.register(vocab::NAMED, None::<String>);
        registry
    }

    /// Declare a qualifier type and its non-binding members
    pub fn register<I, S>(&self, name: &str, nonbinding: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let schema = QualifierSchema {
            nonbinding: nonbinding.into_iter().map(Into::into).collect(),
        };
        self.schemas.insert(Arc::from(name), schema);
    }

    #[inline]
    pub fn is_qualifier(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    fn nonbinding_members(&self, name: &str) -> HashSet<String> {
        self.schemas
            .get(name)
            .map(|s| s.nonbinding.clone())
            .unwrap_or_default()
    }
}

impl Default for QualifierSchemas {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for QualifierSchemas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualifierSchemas")
            .field("types", &self.schemas.len())
            .finish()
    }
}

/// A qualifier value with its binding-member view precomputed.
///
/// Two qualifiers are equal iff their type names match and every binding
/// member value is equal; array members compare elementwise through
/// [`AnnotationValue::List`].
#[derive(Clone)]
pub struct Qualifier {
    name: Arc<str>,
    members: BTreeMap<String, AnnotationValue>,
    binding: BTreeMap<String, AnnotationValue>,
}

impl Qualifier {
    /// Build from an annotation, splitting members per the schema
    pub fn from_annotation(annotation: &Annotation, schemas: &QualifierSchemas) -> Self {
        let nonbinding = schemas.nonbinding_members(&annotation.name);
        let binding = annotation
            .members
            .iter()
            .filter(|(member, _)| !nonbinding.contains(member.as_str()))
            .map(|(member, value)| (member.clone(), value.clone()))
            .collect();
        Self {
            name: Arc::clone(&annotation.name),
            members: annotation.members.clone(),
            binding,
        }
    }

    /// The built-in `Default` qualifier
    #[inline]
    pub fn default_qualifier() -> Self {
        Self::simple(vocab::DEFAULT)
    }

    /// The built-in `Any` qualifier
    #[inline]
    pub fn any() -> Self {
        Self::simple(vocab::ANY)
    }

    /// The built-in `Named(name)` qualifier
    pub fn named(name: impl Into<String>) -> Self {
        let value = AnnotationValue::Str(name.into());
        let mut members = BTreeMap::new();
        members.insert("value".to_string(), value);
        Self {
            name: Arc::from(vocab::NAMED),
            binding: members.clone(),
            members,
        }
    }

    /// A member-less qualifier of the given type
    pub fn simple(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            members: BTreeMap::new(),
            binding: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_any(&self) -> bool {
        &*self.name == vocab::ANY
    }

    #[inline]
    pub fn is_default(&self) -> bool {
        &*self.name == vocab::DEFAULT
    }

    #[inline]
    pub fn is_named(&self) -> bool {
        &*self.name == vocab::NAMED
    }

    /// All members, binding or not
    #[inline]
    pub fn member(&self, name: &str) -> Option<&AnnotationValue> {
        self.members.get(name)
    }

    /// The `Named` value, when this is a `Named` qualifier
    pub fn named_value(&self) -> Option<&str> {
        if !self.is_named() {
            return None;
        }
        match self.members.get("value") {
            Some(AnnotationValue::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl PartialEq for Qualifier {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.binding == other.binding
    }
}

impl Eq for Qualifier {}

impl Hash for Qualifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.binding.hash(state);
    }
}

impl fmt::Debug for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.members.is_empty() {
            write!(f, "@{}", self.name)
        } else {
            write!(f, "@{}(", self.name)?;
            for (i, (member, value)) in self.members.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{member}={value:?}")?;
            }
            write!(f, ")")
        }
    }
}

/// Does the declared qualifier set satisfy every required qualifier?
///
/// `Any` on the required side is ignored; everything else must have a
/// binding-equal counterpart on the declared side.
pub fn satisfies(required: &[Qualifier], declared: &[Qualifier]) -> bool {
    required
        .iter()
        .filter(|q| !q.is_any())
        .all(|q| declared.iter().any(|d| d == q))
}

/// Complete a user-declared qualifier set: `Any` is always present, and
/// `Default` is added iff no user qualifier other than `Any`/`Named` was
/// declared.
pub fn augment(user: Vec<Qualifier>) -> Vec<Qualifier> {
    let mut qualifiers = user;
    let has_user_qualifier = qualifiers
        .iter()
        .any(|q| !q.is_any() && !q.is_named());
    if !has_user_qualifier {
        qualifiers.push(Qualifier::default_qualifier());
    }
    if !qualifiers.iter().any(Qualifier::is_any) {
        qualifiers.push(Qualifier::any());
    }
    qualifiers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(q: &Qualifier) -> u64 {
        let mut hasher = DefaultHasher::new();
        q.hash(&mut hasher);
        hasher.finish()
    }

    fn pay_by_schemas() -> QualifierSchemas {
        let schemas = QualifierSchemas::with_builtins();
        schemas.register("PayBy", ["note"]);
        schemas
    }

    fn pay_by(value: &str, note: &str) -> Annotation {
        Annotation::marker("PayBy")
            .with("value", AnnotationValue::enum_const(value))
            .with("note", AnnotationValue::str(note))
    }

    #[test]
    fn nonbinding_members_are_inert() {
        let schemas = pay_by_schemas();
        let online = Qualifier::from_annotation(&pay_by("CARD", "online"), &schemas);
        let pos = Qualifier::from_annotation(&pay_by("CARD", "pos"), &schemas);

        assert_eq!(online, pos);
        assert_eq!(hash_of(&online), hash_of(&pos));
    }

    #[test]
    fn binding_members_discriminate() {
        let schemas = pay_by_schemas();
        let card = Qualifier::from_annotation(&pay_by("CARD", "x"), &schemas);
        let cash = Qualifier::from_annotation(&pay_by("CASH", "x"), &schemas);
        assert_ne!(card, cash);
    }

    #[test]
    fn named_requires_exact_value() {
        let declared = vec![Qualifier::named("left"), Qualifier::any()];
        assert!(satisfies(&[Qualifier::named("left")], &declared));
        assert!(!satisfies(&[Qualifier::named("right")], &declared));
    }

    #[test]
    fn any_is_ignored_on_the_required_side() {
        let declared = vec![Qualifier::default_qualifier(), Qualifier::any()];
        assert!(satisfies(&[Qualifier::any()], &declared));
        assert!(satisfies(&[], &declared));
    }

    #[test]
    fn augment_adds_default_only_without_user_qualifiers() {
        let augmented = augment(vec![]);
        assert!(augmented.iter().any(Qualifier::is_default));
        assert!(augmented.iter().any(Qualifier::is_any));

        let augmented = augment(vec![Qualifier::simple("PayBy")]);
        assert!(!augmented.iter().any(Qualifier::is_default));

        // Named alone does not suppress Default
        let augmented = augment(vec![Qualifier::named("svc")]);
        assert!(augmented.iter().any(Qualifier::is_default));
    }

    #[test]
    fn array_members_compare_elementwise() {
        let schemas = QualifierSchemas::with_builtins();
        schemas.register("Tags", None::<String>);
        let tags = |values: &[&str]| {
            Qualifier::from_annotation(
                &Annotation::marker("Tags").with(
                    "value",
                    AnnotationValue::List(
                        values.iter().map(|v| AnnotationValue::str(*v)).collect(),
                    ),
                ),
                &schemas,
            )
        };
        assert_eq!(tags(&["a", "b"]), tags(&["a", "b"]));
        assert_ne!(tags(&["a", "b"]), tags(&["b", "a"]));
    }
}
