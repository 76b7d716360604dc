//! Object type metadata.
//!
//! ## Types
//!
//! - `FieldKind` - Scalar or reference
//! - `FieldDescriptor` - One field, with its reference targets
//! - `ObjectTypeSchema` - An object type and its fields
//! - `SchemaCatalog` - Every object type known to the record store, loaded from YAML
//!
//! `SchemaCatalog` is the metadata provider used by the CLI: it implements
//! [`MetadataProvider`] so steps can look up their field maps during
//! initialization.
//!
//! ## File Format
//!
//! ```yaml
//! version: 1
//! object_types:
//!   - name: Account
//!     fields:
//!       - name: Name
//!       - name: ParentId
//!         type: reference
//!         targets: [Account]
//!   - name: Task
//!     fields:
//!       - name: WhatId
//!         type: reference
//!         targets: [Account, Opportunity]
//! ```
//!
//! Every object type implicitly has a scalar `Id` field.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use sobject_sync_file::ID_COLUMN;

// ============================================================================
// Error Types
// ============================================================================

/// Error type for schema operations.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Error reading schema file
    #[error("Failed to read schema file: {0}")]
    IoError(#[from] std::io::Error),

    /// Error parsing YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Object type not found in schema
    #[error("Object type not found: {0}")]
    ObjectTypeNotFound(String),

    /// Object type declared more than once
    #[error("Object type declared more than once: {0}")]
    DuplicateObjectType(String),

    /// Field not found on an object type
    #[error("Field '{field}' not found on object type '{object_type}'")]
    FieldNotFound { object_type: String, field: String },

    /// Field declaration that cannot be right
    #[error("Invalid field '{field}' on object type '{object_type}': {reason}")]
    InvalidField {
        object_type: String,
        field: String,
        reason: String,
    },
}

// ============================================================================
// Field Descriptors
// ============================================================================

/// Whether a field holds a plain value or identifies another record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Scalar,
    Reference,
}

/// A single field of an object type.
///
/// For reference fields `targets` holds every object type the field may
/// point to: one for an ordinary reference, several for a polymorphic one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,

    /// Field kind
    #[serde(rename = "type", default)]
    pub kind: FieldKind,

    /// Object types a reference field may point to
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub targets: BTreeSet<String>,
}

impl FieldDescriptor {
    /// Create a scalar field.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar,
            targets: BTreeSet::new(),
        }
    }

    /// Create a reference field pointing to `targets`.
    pub fn reference<I, S>(name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: FieldKind::Reference,
            targets: targets.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_reference(&self) -> bool {
        self.kind == FieldKind::Reference
    }

    /// Whether this field can point to more than one object type.
    pub fn is_polymorphic(&self) -> bool {
        self.is_reference() && self.targets.len() > 1
    }
}

/// Field name to field descriptor, for one object type.
pub type FieldMap = BTreeMap<String, FieldDescriptor>;

// ============================================================================
// Object Types
// ============================================================================

/// An object type and the fields it declares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectTypeSchema {
    /// Object type name
    pub name: String,

    /// Field declarations (the implicit `Id` field may be omitted)
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl ObjectTypeSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field map including the implicit `Id` field.
    pub fn field_map(&self) -> FieldMap {
        let mut map: FieldMap = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.clone()))
            .collect();
        map.entry(ID_COLUMN.to_string())
            .or_insert_with(|| FieldDescriptor::scalar(ID_COLUMN));
        map
    }

    fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            let invalid = |reason: &str| SchemaError::InvalidField {
                object_type: self.name.clone(),
                field: field.name.clone(),
                reason: reason.to_string(),
            };

            if !seen.insert(field.name.as_str()) {
                return Err(invalid("declared more than once"));
            }
            match field.kind {
                FieldKind::Reference if field.targets.is_empty() => {
                    return Err(invalid("reference field without targets"));
                }
                FieldKind::Scalar if !field.targets.is_empty() => {
                    return Err(invalid("scalar field with reference targets"));
                }
                _ => {}
            }
            if field.name == ID_COLUMN && field.is_reference() {
                return Err(invalid("the Id field cannot be a reference"));
            }
        }
        Ok(())
    }
}

fn default_version() -> u32 {
    1
}

/// Every object type known to the record store.
///
/// Object types keep their declaration order, which is what
/// [`MetadataProvider::get_sobject_list`] reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaCatalog {
    /// Schema version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Object type declarations
    pub object_types: Vec<ObjectTypeSchema>,

    /// Cached object type lookup (not serialized)
    #[serde(skip)]
    type_map: HashMap<String, usize>,
}

impl SchemaCatalog {
    /// Create a catalog from object type declarations.
    pub fn new(object_types: Vec<ObjectTypeSchema>) -> Result<Self, SchemaError> {
        let mut catalog = Self {
            version: default_version(),
            object_types,
            type_map: HashMap::new(),
        };
        catalog.build_type_map()?;
        Ok(catalog)
    }

    /// Load a catalog from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SchemaError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a catalog from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, SchemaError> {
        let mut catalog: SchemaCatalog = serde_yaml::from_str(yaml)?;
        catalog.build_type_map()?;
        Ok(catalog)
    }

    /// Validate declarations and build the internal lookup map.
    fn build_type_map(&mut self) -> Result<(), SchemaError> {
        self.type_map.clear();
        for (idx, object_type) in self.object_types.iter().enumerate() {
            object_type.validate()?;
            if self.type_map.insert(object_type.name.clone(), idx).is_some() {
                return Err(SchemaError::DuplicateObjectType(object_type.name.clone()));
            }
        }
        Ok(())
    }

    /// Get an object type by name.
    pub fn get_object_type(&self, name: &str) -> Option<&ObjectTypeSchema> {
        self.type_map
            .get(name)
            .and_then(|&idx| self.object_types.get(idx))
    }

    /// Get a field of an object type.
    pub fn get_field(&self, object_type: &str, field: &str) -> Result<&FieldDescriptor, SchemaError> {
        let schema = self
            .get_object_type(object_type)
            .ok_or_else(|| SchemaError::ObjectTypeNotFound(object_type.to_string()))?;

        schema
            .get_field(field)
            .ok_or_else(|| SchemaError::FieldNotFound {
                object_type: object_type.to_string(),
                field: field.to_string(),
            })
    }

    /// All object type names, in declaration order.
    pub fn object_type_names(&self) -> Vec<&str> {
        self.object_types.iter().map(|t| t.name.as_str()).collect()
    }
}

// ============================================================================
// Metadata Provider
// ============================================================================

/// Source of object type metadata.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Field map of `object_type`.
    ///
    /// Fails if the object type is unknown.
    async fn get_field_map(&self, object_type: &str) -> anyhow::Result<FieldMap>;

    /// Names of every object type known to the record store.
    async fn get_sobject_list(&self) -> anyhow::Result<Vec<String>>;
}

#[async_trait]
impl MetadataProvider for SchemaCatalog {
    async fn get_field_map(&self, object_type: &str) -> anyhow::Result<FieldMap> {
        let schema = self
            .get_object_type(object_type)
            .ok_or_else(|| SchemaError::ObjectTypeNotFound(object_type.to_string()))?;
        Ok(schema.field_map())
    }

    async fn get_sobject_list(&self) -> anyhow::Result<Vec<String>> {
        Ok(self
            .object_type_names()
            .into_iter()
            .map(String::from)
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
