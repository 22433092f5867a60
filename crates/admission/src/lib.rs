//! Satchel admission: defaulting and validation for ResourceSet objects.
//!
//! The external admission pipeline calls [`AdmissionHooks::apply_defaults`]
//! before first persistence and the two validate hooks on every create and
//! update. Everything in here is a synchronous pure decision; persistence
//! rollback on rejection is the pipeline's job.

#![forbid(unsafe_code)]

pub mod selector;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use satchel_core::{ResourceSet, ResourceSetSpec, Strategy};

/// Advisory messages returned alongside an accepted object. This core
/// never produces any; the slot exists for the pipeline's contract.
pub type Warnings = Vec<String>;

/// A single field-level violation, path plus message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self { path: path.to_string(), message: message.into() }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Aggregated rejection: every violation found in one pass, never empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("invalid ResourceSet: {}", join_errors(.0))]
pub struct InvalidSpec(pub Vec<FieldError>);

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Admission lifecycle hooks: defaulting, create validation, and update
/// validation against the previously persisted object.
pub trait AdmissionHooks {
    /// Fill in unset fields and normalize deprecated values. Idempotent,
    /// no error channel.
    fn apply_defaults(&mut self);

    /// Accept or reject a new object.
    fn validate_create(&self) -> Result<Warnings, InvalidSpec>;

    /// Accept or reject a changed object, given its persisted predecessor.
    fn validate_update(&self, old: &Self) -> Result<Warnings, InvalidSpec>;
}

impl AdmissionHooks for ResourceSet {
    fn apply_defaults(&mut self) {
        match self.spec.strategy {
            None => {
                debug!(strategy = Strategy::ApplyOnce.as_str(), "defaulting unset strategy");
                self.spec.strategy = Some(Strategy::ApplyOnce);
            }
            Some(Strategy::ApplyAlways) => {
                debug!("rewriting deprecated ApplyAlways strategy to Reconcile");
                self.spec.strategy = Some(Strategy::Reconcile);
            }
            Some(_) => {}
        }
    }

    fn validate_create(&self) -> Result<Warnings, InvalidSpec> {
        finish(selector_errors(&self.spec))
    }

    fn validate_update(&self, old: &Self) -> Result<Warnings, InvalidSpec> {
        let mut errors = selector_errors(&self.spec);
        if self.spec.cluster_selector != old.spec.cluster_selector {
            errors.push(FieldError::new("spec.clusterSelector", "selector is immutable"));
        }
        if self.spec.strategy != old.spec.strategy
            && !is_strategy_migration(old.spec.strategy, self.spec.strategy)
        {
            errors.push(FieldError::new("spec.strategy", "strategy is immutable"));
        }
        finish(errors)
    }
}

/// The single permitted strategy change: the one-way migration off the
/// deprecated ApplyAlways name.
fn is_strategy_migration(old: Option<Strategy>, new: Option<Strategy>) -> bool {
    old == Some(Strategy::ApplyAlways) && new == Some(Strategy::Reconcile)
}

fn selector_errors(spec: &ResourceSetSpec) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if let Err(reason) = selector::validate(&spec.cluster_selector) {
        errors.push(FieldError::new(
            "spec.clusterSelector",
            format!("selector must be a valid selector expression: {reason}"),
        ));
    }
    if selector::is_empty(&spec.cluster_selector) {
        errors.push(FieldError::new("spec.clusterSelector", "selector must not be empty"));
    }
    errors
}

fn finish(errors: Vec<FieldError>) -> Result<Warnings, InvalidSpec> {
    if errors.is_empty() {
        Ok(Warnings::new())
    } else {
        Err(InvalidSpec(errors))
    }
}
