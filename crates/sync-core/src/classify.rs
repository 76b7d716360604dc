//! Reference field classification.
//!
//! Every reference field of a step is classified against the operation's
//! [`Scope`]:
//!
//! - **self**: one of the targets is the field's own object type
//! - **dependent**: one of the targets is another in-scope object type
//! - **descendent**: the reverse of a dependent edge, recorded on the
//!   target's step as `(referencing object type, field)`
//!
//! A polymorphic field can land in more than one category. Fields whose
//! targets all lie outside the scope are not classified at all: their
//! values are copied verbatim and never followed or remapped.

use std::collections::BTreeSet;

use crate::schema::FieldDescriptor;

/// Object types taking part in one operation, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    object_types: Vec<String>,
}

impl Scope {
    pub fn new<I, S>(object_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scope = Self::default();
        for object_type in object_types {
            scope.insert(object_type);
        }
        scope
    }

    /// Append `object_type`; returns false if it was already in scope.
    pub fn insert(&mut self, object_type: impl Into<String>) -> bool {
        let object_type = object_type.into();
        if self.contains(&object_type) {
            return false;
        }
        self.object_types.push(object_type);
        true
    }

    pub fn contains(&self, object_type: &str) -> bool {
        self.object_types.iter().any(|t| t == object_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.object_types.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.object_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object_types.is_empty()
    }
}

/// Reverse edge: `field` on `object_type` points into the step holding this.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DescendentRef {
    /// Object type declaring the field
    pub object_type: String,
    /// Reference field name
    pub field: String,
}

impl DescendentRef {
    pub fn new(object_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            field: field.into(),
        }
    }
}

/// Classification of one reference field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldClass {
    /// The owning object type is one of the targets
    pub is_self: bool,
    /// In-scope targets other than the owning object type
    pub dependent_targets: BTreeSet<String>,
}

impl FieldClass {
    pub fn is_dependent(&self) -> bool {
        !self.dependent_targets.is_empty()
    }

    /// Whether the field is followed/remapped at all.
    pub fn is_lookup(&self) -> bool {
        self.is_self || self.is_dependent()
    }
}

/// Classify one field owned by `owner` against `scope`.
///
/// Scalar fields and references leaving the scope yield an empty class.
pub fn classify_field(field: &FieldDescriptor, owner: &str, scope: &Scope) -> FieldClass {
    let mut class = FieldClass::default();
    if !field.is_reference() {
        return class;
    }

    for target in field.targets.iter().filter(|t| scope.contains(t.as_str())) {
        if target == owner {
            class.is_self = true;
        } else {
            class.dependent_targets.insert(target.clone());
        }
    }
    class
}

/// Classification sets for all fields of one object type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub self_lookups: BTreeSet<String>,
    pub dependent_lookups: BTreeSet<String>,
    pub all_lookups: BTreeSet<String>,
    /// `(target object type, reverse edge)` for every dependent target
    pub descendents: Vec<(String, DescendentRef)>,
}

/// Classify every field in `fields`, all owned by `owner`.
pub fn classify_fields<'a, I>(fields: I, owner: &str, scope: &Scope) -> Classification
where
    I: IntoIterator<Item = &'a FieldDescriptor>,
{
    let mut classification = Classification::default();

    for field in fields {
        let class = classify_field(field, owner, scope);
        if class.is_self {
            classification.self_lookups.insert(field.name.clone());
        }
        if class.is_dependent() {
            classification.dependent_lookups.insert(field.name.clone());
        }
        if class.is_lookup() {
            classification.all_lookups.insert(field.name.clone());
        }
        for target in class.dependent_targets {
            classification
                .descendents
                .push((target, DescendentRef::new(owner, field.name.clone())));
        }
    }

    classification
}
