//! Decorator descriptors
//!
//! A decorator implements the interfaces it decorates and holds a single
//! `Delegate` injection point pointing at the next layer. Chains are built
//! inner to outer: the innermost decorator receives the target instance,
//! each successive decorator receives the previous one, and the outermost
//! decorator is what clients see. The delegate is satisfied by direct
//! assignment, never by qualifier lookup.

use crate::assignable::Assignability;
use crate::error::{ContainerError, Result};
use crate::meta::{Annotated, ClassDef, TypeRef, vocab};
use crate::object::{Object, Value};
use crate::qualifier::Qualifier;
use std::fmt;
use std::sync::Arc;

/// Where a decorator's delegate injection point lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegatePoint {
    CtorParam { ctor_index: usize, position: usize },
    Field { name: Arc<str> },
    MethodParam { method: Arc<str>, position: usize },
}

/// Descriptor for a decorator class
pub struct DecoratorInfo {
    pub class: Arc<ClassDef>,
    /// The interfaces this decorator can wrap
    pub decorated_types: Vec<TypeRef>,
    pub qualifiers: Vec<Qualifier>,
    pub priority: i64,
    pub delegate: DelegatePoint,
    pub delegate_type: TypeRef,
}

impl DecoratorInfo {
    /// Locate the single delegate injection point on a decorator class.
    ///
    /// More than one delegate point (or none) is a definition error the
    /// registrar records.
    pub fn locate_delegate(class: &ClassDef) -> Result<(DelegatePoint, TypeRef)> {
        let mut found: Vec<(DelegatePoint, TypeRef)> = Vec::new();

        for (ctor_index, ctor) in class.ctors.iter().enumerate() {
            for (position, param) in ctor.params.iter().enumerate() {
                if param.has_annotation(vocab::DELEGATE) {
                    found.push((
                        DelegatePoint::CtorParam {
                            ctor_index,
                            position,
                        },
                        param.ty.clone(),
                    ));
                }
            }
        }
        for field in &class.fields {
            if field.has_annotation(vocab::DELEGATE) {
                found.push((
                    DelegatePoint::Field {
                        name: Arc::clone(&field.name),
                    },
                    field.ty.clone(),
                ));
            }
        }
        for method in &class.methods {
            for (position, param) in method.params.iter().enumerate() {
                if param.has_annotation(vocab::DELEGATE) {
                    found.push((
                        DelegatePoint::MethodParam {
                            method: Arc::clone(&method.name),
                            position,
                        },
                        param.ty.clone(),
                    ));
                }
            }
        }

        match found.len() {
            1 => Ok(found.pop().expect("length checked")),
            0 => Err(ContainerError::definition(format!(
                "decorator {} declares no delegate injection point",
                class.name
            ))),
            n => Err(ContainerError::definition(format!(
                "decorator {} declares {n} delegate injection points, exactly one is allowed",
                class.name
            ))),
        }
    }

    /// Chain membership rule: some decorated type accepts one of the
    /// bean's types, and the decorator's qualifiers are a subset of the
    /// bean's qualifiers.
    pub fn applies_to(
        &self,
        bean_types: &[TypeRef],
        bean_qualifiers: &[Qualifier],
        assignability: &Assignability,
    ) -> Result<bool> {
        let qualifiers_ok = self
            .qualifiers
            .iter()
            .filter(|q| !q.is_any() && !q.is_default())
            .all(|q| bean_qualifiers.iter().any(|bq| bq == q));
        if !qualifiers_ok {
            return Ok(false);
        }
        for decorated in &self.decorated_types {
            for bean_type in bean_types {
                if assignability.is_assignable(decorated, bean_type)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Wire the delegate into a constructed decorator instance.
    ///
    /// Constructor-parameter delegates are passed at construction and not
    /// handled here.
    pub fn inject_delegate(&self, instance: &Object, delegate: Value) -> Result<()> {
        match &self.delegate {
            DelegatePoint::CtorParam { .. } => Ok(()),
            DelegatePoint::Field { name } => {
                instance.set(name.to_string(), delegate);
                Ok(())
            }
            DelegatePoint::MethodParam { method, position } => {
                let mut args = vec![Value::Null; position + 1];
                args[*position] = delegate;
                instance.call(method, &args)?;
                Ok(())
            }
        }
    }
}

impl fmt::Debug for DecoratorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorInfo")
            .field("class", &self.class.name)
            .field("priority", &self.priority)
            .field("decorated_types", &self.decorated_types)
            .field("delegate", &self.delegate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{Annotation, ParamMeta, TypeSpace};

    fn svc_space() -> Arc<TypeSpace> {
        let space = Arc::new(TypeSpace::new());
        space.register(ClassDef::builder("acme.Svc").interface().build());
        space.register(
            ClassDef::builder("acme.SvcImpl")
                .implements(TypeRef::class("acme.Svc"))
                .build(),
        );
        space
    }

    #[test]
    fn single_field_delegate_is_located() {
        let class = ClassDef::builder("acme.LoggingDec")
            .implements(TypeRef::class("acme.Svc"))
            .field(
                "delegate",
                TypeRef::class("acme.Svc"),
                vec![
                    Annotation::marker(vocab::INJECT),
                    Annotation::marker(vocab::DELEGATE),
                ],
            )
            .build();
        let (point, ty) = DecoratorInfo::locate_delegate(&class).unwrap();
        assert_eq!(
            point,
            DelegatePoint::Field {
                name: Arc::from("delegate")
            }
        );
        assert_eq!(ty, TypeRef::class("acme.Svc"));
    }

    #[test]
    fn missing_delegate_is_a_definition_error() {
        let class = ClassDef::builder("acme.NoDelegate")
            .implements(TypeRef::class("acme.Svc"))
            .build();
        assert!(matches!(
            DecoratorInfo::locate_delegate(&class),
            Err(ContainerError::Definition(_))
        ));
    }

    #[test]
    fn two_delegates_are_a_definition_error() {
        let class = ClassDef::builder("acme.TwoDelegates")
            .field(
                "first",
                TypeRef::class("acme.Svc"),
                vec![Annotation::marker(vocab::DELEGATE)],
            )
            .field(
                "second",
                TypeRef::class("acme.Svc"),
                vec![Annotation::marker(vocab::DELEGATE)],
            )
            .build();
        assert!(DecoratorInfo::locate_delegate(&class).is_err());
    }

    #[test]
    fn ctor_param_delegate_is_located() {
        let class = ClassDef::builder("acme.CtorDec")
            .ctor(
                vec![
                    ParamMeta::new("delegate", TypeRef::class("acme.Svc"))
                        .annotated(Annotation::marker(vocab::DELEGATE)),
                ],
                vec![Annotation::marker(vocab::INJECT)],
                |this, args| {
                    this.set("delegate", args[0].clone());
                    Ok(())
                },
            )
            .build();
        let (point, _) = DecoratorInfo::locate_delegate(&class).unwrap();
        assert_eq!(
            point,
            DelegatePoint::CtorParam {
                ctor_index: 0,
                position: 0
            }
        );
    }

    #[test]
    fn applies_by_decorated_type_and_qualifiers() {
        let space = svc_space();
        let assignability = Assignability::new(Arc::clone(&space));
        let class = space.register(
            ClassDef::builder("acme.Dec")
                .implements(TypeRef::class("acme.Svc"))
                .field(
                    "delegate",
                    TypeRef::class("acme.Svc"),
                    vec![Annotation::marker(vocab::DELEGATE)],
                )
                .build(),
        );
        let (delegate, delegate_type) = DecoratorInfo::locate_delegate(&class).unwrap();
        let info = DecoratorInfo {
            class,
            decorated_types: vec![TypeRef::class("acme.Svc")],
            qualifiers: vec![],
            priority: 100,
            delegate,
            delegate_type,
        };

        let bean_types = vec![
            TypeRef::class("acme.SvcImpl"),
            TypeRef::class("acme.Svc"),
        ];
        assert!(info
            .applies_to(&bean_types, &[Qualifier::default_qualifier()], &assignability)
            .unwrap());

        // unrelated bean types do not match
        let other = vec![TypeRef::class("acme.Svc2")];
        let space2 = Arc::clone(&space);
        space2.register(ClassDef::builder("acme.Svc2").interface().build());
        assert!(!info
            .applies_to(&other, &[Qualifier::default_qualifier()], &assignability)
            .unwrap());
    }
}
