//! Two-pass, fail-fast execution of an ordered list of steps.
//!
//! ```text
//!            ┌──────────── stage = INITIAL ───────────┐
//!   execute ─┤                                        ├─► dependent-update pass ─► outcome
//!            └─► main pass ─(no errors)───────────────┘
//!                      │
//!                      └─(error registered)─► Failed
//! ```
//!
//! A resumed run starts at `DEPENDENTS` and skips the main pass.

use std::sync::Arc;

use anyhow::Result;
use checkpoint::{LoadState, Stage, StateManager};
use sobject_sync_file::FileStore;
use tracing::{debug, error, info, warn};

use crate::context::{OperationContext, OperationError};
use crate::schema::{MetadataProvider, SchemaError};
use crate::step::Step;
use crate::store::RecordStore;

/// Terminal result of [`Operation::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOutcome {
    Success,
    Failed,
}

impl OperationOutcome {
    /// Conventional process-style code: 0 on success, -1 on failure.
    pub fn code(&self) -> i32 {
        match self {
            OperationOutcome::Success => 0,
            OperationOutcome::Failed => -1,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Success)
    }
}

/// Ordered steps sharing one [`OperationContext`].
pub struct Operation {
    steps: Vec<Box<dyn Step>>,
    context: OperationContext,
    stage: Stage,
    state: Option<StateManager>,
}

impl Operation {
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        store: Arc<dyn RecordStore>,
        files: Box<dyn FileStore>,
    ) -> Self {
        Self {
            steps: Vec::new(),
            context: OperationContext::new(metadata, store, files),
            stage: Stage::Initial,
            state: None,
        }
    }

    /// Persist stage and identifier map through `manager` while executing.
    pub fn with_state_manager(mut self, manager: StateManager) -> Self {
        self.state = Some(manager);
        self
    }

    /// Append `step`; registration order is execution order.
    pub fn add_step(&mut self, step: Box<dyn Step>) {
        if !self.context.scope_mut().insert(step.object_type()) {
            warn!("{} added more than once", step.object_type());
        }
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Box<dyn Step>] {
        &self.steps
    }

    pub fn get_step(&self, object_type: &str) -> Option<&dyn Step> {
        self.steps
            .iter()
            .find(|s| s.object_type() == object_type)
            .map(|s| s.as_ref())
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    pub(crate) fn context_mut(&mut self) -> &mut OperationContext {
        &mut self.context
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }

    pub fn register_new_id(&mut self, object_type: &str, original_id: &str, new_id: &str) {
        self.context.register_new_id(object_type, original_id, new_id);
    }

    pub fn get_new_id(&self, original_id: &str) -> Option<&str> {
        self.context.get_new_id(original_id)
    }

    pub fn register_error(&mut self, object_type: &str, original_id: Option<&str>, message: &str) {
        self.context.register_error(object_type, original_id, message);
    }

    pub fn errors(&self) -> &[OperationError] {
        self.context.errors()
    }

    /// Classify every step's fields and wire up descendent references.
    ///
    /// # Errors
    ///
    /// Fails on a duplicate object type, an unknown object type or an unknown
    /// field. No step runs in that case.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.context.scope().len() != self.steps.len() {
            let mut seen = std::collections::BTreeSet::new();
            for step in &self.steps {
                if !seen.insert(step.object_type().to_string()) {
                    return Err(SchemaError::DuplicateObjectType(step.object_type().to_string()).into());
                }
            }
        }

        for step in self.steps.iter_mut() {
            step.fields_mut().descendent_lookups.clear();
        }

        let mut edges = Vec::new();
        for step in self.steps.iter_mut() {
            let step_edges = step
                .initialize(self.context.metadata(), self.context.scope())
                .await?;
            edges.extend(step_edges);
        }

        for (target, edge) in edges {
            if let Some(step) = self.steps.iter_mut().find(|s| s.object_type() == target) {
                debug!("{target} has descendent {}.{}", edge.object_type, edge.field);
                step.fields_mut().descendent_lookups.insert(edge);
            }
        }

        info!(
            "Initialized operation with {} steps: {}",
            self.steps.len(),
            self.context.scope().iter().collect::<Vec<_>>().join(", ")
        );
        Ok(())
    }

    /// Restore stage and identifier map from an earlier run.
    ///
    /// Returns false when there is nothing to resume.
    pub async fn resume(&mut self) -> Result<bool> {
        let Some(manager) = &self.state else {
            return Ok(false);
        };
        let Some(LoadState { stage, id_map, .. }) = manager.load().await? else {
            info!("No saved state for {}; starting from scratch", manager.operation());
            return Ok(false);
        };

        info!(
            "Resuming {} at stage {stage} with {} mapped ids",
            manager.operation(),
            id_map.len()
        );
        self.stage = stage;
        self.context.restore_id_map(id_map);
        Ok(true)
    }

    /// Run the passes the current stage calls for.
    pub async fn execute(&mut self) -> OperationOutcome {
        let outcome = self.run_passes().await;
        self.context.flush_files();

        match outcome {
            OperationOutcome::Success => {
                self.clear_state().await;
                info!("Operation completed; {} ids mapped", self.context.id_count());
            }
            OperationOutcome::Failed => {
                error!(
                    "Operation failed with {} errors; see the result files",
                    self.context.error_count()
                );
            }
        }
        outcome
    }

    async fn run_passes(&mut self) -> OperationOutcome {
        if self.stage == Stage::Initial {
            let completed = self.run_main_pass().await;
            let next = if completed {
                Stage::Dependents
            } else {
                Stage::Initial
            };
            self.save_state(next).await;
            if !completed {
                return OperationOutcome::Failed;
            }
            self.stage = Stage::Dependents;
        } else {
            info!("Skipping main pass; resuming at stage {}", self.stage);
        }

        if !self.run_dependent_pass().await {
            self.save_state(Stage::Dependents).await;
            return OperationOutcome::Failed;
        }

        if self.context.has_errors() {
            OperationOutcome::Failed
        } else {
            OperationOutcome::Success
        }
    }

    /// Returns false when a step registered an error.
    async fn run_main_pass(&mut self) -> bool {
        let errors_before = self.context.error_count();
        for step in self.steps.iter_mut() {
            info!("Executing {}", step.object_type());
            step.execute(&mut self.context).await;
            if self.context.error_count() > errors_before {
                warn!(
                    "Errors registered while executing {}; stopping",
                    step.object_type()
                );
                return false;
            }
        }
        true
    }

    async fn run_dependent_pass(&mut self) -> bool {
        let errors_before = self.context.error_count();
        for step in self.steps.iter_mut() {
            debug!("Executing dependent updates for {}", step.object_type());
            step.execute_dependent_updates(&mut self.context).await;
            if self.context.error_count() > errors_before {
                warn!(
                    "Errors registered while updating dependents of {}; stopping",
                    step.object_type()
                );
                return false;
            }
        }
        true
    }

    async fn save_state(&self, stage: Stage) {
        let Some(manager) = &self.state else {
            return;
        };
        // A lost save only costs the ability to resume
        if let Err(e) = manager.save(stage, self.context.id_map()).await {
            error!("Failed to save state for {}: {e:#}", manager.operation());
        }
    }

    async fn clear_state(&self) {
        let Some(manager) = &self.state else {
            return;
        };
        if let Err(e) = manager.clear().await {
            error!("Failed to clear state for {}: {e:#}", manager.operation());
        }
    }
}
