//! Step contract and the field bookkeeping every step shares.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use async_trait::async_trait;
use sobject_sync_file::ID_COLUMN;
use tracing::debug;

use crate::classify::{classify_fields, DescendentRef, Scope};
use crate::context::OperationContext;
use crate::schema::{MetadataProvider, SchemaError};

/// Requested fields of one object type and their reference classification.
///
/// The lookup sets are empty until [`StepFields::initialize`] runs, and the
/// descendent set is filled in by the operation afterwards.
#[derive(Debug, Clone, Default)]
pub struct StepFields {
    object_type: String,
    fields: Vec<String>,
    pub self_lookups: BTreeSet<String>,
    pub dependent_lookups: BTreeSet<String>,
    pub all_lookups: BTreeSet<String>,
    pub descendent_lookups: BTreeSet<DescendentRef>,
    /// In-scope targets of every lookup field, the owner included
    pub lookup_targets: BTreeMap<String, BTreeSet<String>>,
}

impl StepFields {
    /// Fields are kept in requested order, duplicates dropped.
    pub fn new<I, S>(object_type: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut requested: Vec<String> = Vec::new();
        for field in fields {
            let field = field.into();
            if !requested.contains(&field) {
                requested.push(field);
            }
        }

        Self {
            object_type: object_type.into(),
            fields: requested,
            ..Default::default()
        }
    }

    /// Like [`StepFields::new`], with `Id` put first when it was left out.
    ///
    /// Extract and load steps need the record identifier in every row.
    pub fn with_id<I, S>(object_type: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut step_fields = Self::new(object_type, fields);
        if !step_fields.fields.iter().any(|f| f == ID_COLUMN) {
            step_fields.fields.insert(0, ID_COLUMN.to_string());
        }
        step_fields
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Requested field names, in requested order.
    pub fn field_names(&self) -> &[String] {
        &self.fields
    }

    /// Requested fields joined with `", "`.
    pub fn get_field_list(&self) -> String {
        self.fields.join(", ")
    }

    /// Reference fields resolved through the identifier map: self ∪ dependent.
    pub fn deferred_fields(&self) -> impl Iterator<Item = &String> {
        self.fields
            .iter()
            .filter(|f| self.self_lookups.contains(*f) || self.dependent_lookups.contains(*f))
    }

    /// Classify the requested fields against `scope`.
    ///
    /// Returns the reverse edges this step contributes, as
    /// `(target object type, edge)`, for the operation to distribute.
    /// Running it again replaces the previous classification.
    pub async fn initialize(
        &mut self,
        metadata: &dyn MetadataProvider,
        scope: &Scope,
    ) -> Result<Vec<(String, DescendentRef)>> {
        let field_map = metadata.get_field_map(&self.object_type).await?;

        let mut descriptors = Vec::with_capacity(self.fields.len());
        for name in &self.fields {
            let descriptor = field_map
                .get(name)
                .ok_or_else(|| SchemaError::FieldNotFound {
                    object_type: self.object_type.clone(),
                    field: name.clone(),
                })?;
            descriptors.push(descriptor);
        }

        let classification = classify_fields(descriptors.iter().copied(), &self.object_type, scope);

        self.lookup_targets = descriptors
            .iter()
            .filter(|d| classification.all_lookups.contains(&d.name))
            .map(|d| {
                let targets = d
                    .targets
                    .iter()
                    .filter(|t| scope.contains(t.as_str()))
                    .cloned()
                    .collect();
                (d.name.clone(), targets)
            })
            .collect();
        self.self_lookups = classification.self_lookups;
        self.dependent_lookups = classification.dependent_lookups;
        self.all_lookups = classification.all_lookups;

        debug!(
            "Classified {}: self={:?} dependent={:?}",
            self.object_type, self.self_lookups, self.dependent_lookups
        );

        Ok(classification.descendents)
    }
}

/// One object type's unit of work within an operation.
///
/// `execute` and `execute_dependent_updates` never fail outright: every
/// failure is registered on the context, and the operation checks the error
/// ledger after each step.
#[async_trait]
pub trait Step: Send {
    fn fields(&self) -> &StepFields;

    fn fields_mut(&mut self) -> &mut StepFields;

    fn object_type(&self) -> &str {
        self.fields().object_type()
    }

    fn get_field_list(&self) -> String {
        self.fields().get_field_list()
    }

    /// Classify this step's fields against the operation's scope.
    async fn initialize(
        &mut self,
        metadata: &dyn MetadataProvider,
        scope: &Scope,
    ) -> Result<Vec<(String, DescendentRef)>> {
        self.fields_mut().initialize(metadata, scope).await
    }

    /// Main pass work for this object type.
    async fn execute(&mut self, context: &mut OperationContext);

    /// Second pass work: resolve references deferred by the main pass.
    async fn execute_dependent_updates(&mut self, context: &mut OperationContext);
}
