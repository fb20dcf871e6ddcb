//! Per-phase autonomy flags and phase advancement.
//!
//! An autonomous phase is entered automatically once the previous phase
//! finishes; a non-autonomous one waits for the user to confirm.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::project::Project;
use crate::status::PhaseStatus;
use crate::types::PhaseId;

// ---------------------------------------------------------------------------
// AutonomyMap
// ---------------------------------------------------------------------------

/// Phase → autonomous flag. A phase without an entry is autonomous.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AutonomyMap(BTreeMap<PhaseId, bool>);

impl AutonomyMap {
    pub fn new(flags: BTreeMap<PhaseId, bool>) -> Self {
        Self(flags)
    }

    pub fn of(project: &Project) -> Self {
        Self(project.agent_autonomy.clone())
    }

    pub fn is_autonomous(&self, phase: &str) -> bool {
        self.0.get(phase).copied().unwrap_or(true)
    }

    pub fn set(&mut self, phase: impl Into<PhaseId>, autonomous: bool) {
        self.0.insert(phase.into(), autonomous);
    }

    /// Set every phase in `phases` to the same flag.
    pub fn set_all<'a>(&mut self, phases: impl IntoIterator<Item = &'a PhaseId>, autonomous: bool) {
        for phase in phases {
            self.0.insert(phase.clone(), autonomous);
        }
    }

    pub fn as_map(&self) -> &BTreeMap<PhaseId, bool> {
        &self.0
    }

    pub fn into_map(self) -> BTreeMap<PhaseId, bool> {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Advancement
// ---------------------------------------------------------------------------

/// Result of asking a project to move past its current phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseTransition {
    /// Moved from `from` to `to`; `to` is now in progress.
    Advanced { from: PhaseId, to: PhaseId },
    /// `to` is not autonomous. Nothing changed; call [`confirm_advance`].
    AwaitingConfirmation { from: PhaseId, to: PhaseId },
    /// `phase` was the last one and is now completed.
    Finished { phase: PhaseId },
}

/// Phase following `project.current_phase` in `phase_order`.
pub fn next_phase(project: &Project) -> Option<&PhaseId> {
    let idx = project.position_of(&project.current_phase)?;
    project.phase_order.get(idx + 1)
}

/// Advance if the next phase is autonomous, otherwise report that the user
/// must confirm.
pub fn advance(project: &mut Project) -> Result<PhaseTransition, CoreError> {
    let from = current_in_order(project)?;
    match next_phase(project).cloned() {
        None => Ok(finish(project, from)),
        Some(to) if !AutonomyMap::of(project).is_autonomous(&to) => {
            Ok(PhaseTransition::AwaitingConfirmation { from, to })
        }
        Some(to) => Ok(step(project, from, to)),
    }
}

/// Advance regardless of the next phase's autonomy flag.
pub fn confirm_advance(project: &mut Project) -> Result<PhaseTransition, CoreError> {
    let from = current_in_order(project)?;
    match next_phase(project).cloned() {
        None => Ok(finish(project, from)),
        Some(to) => Ok(step(project, from, to)),
    }
}

fn current_in_order(project: &Project) -> Result<PhaseId, CoreError> {
    if project.position_of(&project.current_phase).is_none() {
        return Err(CoreError::Validation(format!(
            "Current phase '{}' is not in the project's phase order",
            project.current_phase
        )));
    }
    Ok(project.current_phase.clone())
}

fn step(project: &mut Project, from: PhaseId, to: PhaseId) -> PhaseTransition {
    project.phase_status.insert(from.clone(), PhaseStatus::Completed);
    project.phase_status.insert(to.clone(), PhaseStatus::InProgress);
    project.current_phase = to.clone();
    PhaseTransition::Advanced { from, to }
}

fn finish(project: &mut Project, phase: PhaseId) -> PhaseTransition {
    project.phase_status.insert(phase.clone(), PhaseStatus::Completed);
    PhaseTransition::Finished { phase }
}
