//! Project model and the small pieces of project-level state the client
//! mutates locally (phase status and ordering).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::status::PhaseStatus;
use crate::types::{EntityId, PhaseId, Timestamp};

/// A content-production project as returned by `GET /api/projects/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: EntityId,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub version_note: Option<String>,
    #[serde(default)]
    pub current_phase: PhaseId,
    /// Ordered phase ids. Always `leading ++ middle ++ trailing` of the
    /// project's [`PhaseLayout`](crate::phase::PhaseLayout).
    #[serde(default)]
    pub phase_order: Vec<PhaseId>,
    #[serde(default)]
    pub phase_status: BTreeMap<PhaseId, PhaseStatus>,
    /// Absent key means autonomous; see [`AutonomyMap`](crate::autonomy::AutonomyMap).
    #[serde(default)]
    pub agent_autonomy: BTreeMap<PhaseId, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

fn default_version() -> u32 {
    1
}

impl Project {
    /// New project starting at the first phase of `phase_order`.
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>, phase_order: Vec<PhaseId>) -> Self {
        let current_phase = phase_order.first().cloned().unwrap_or_default();
        let phase_status = phase_order
            .iter()
            .map(|p| {
                let status = if *p == current_phase {
                    PhaseStatus::InProgress
                } else {
                    PhaseStatus::Pending
                };
                (p.clone(), status)
            })
            .collect();
        Self {
            id: id.into(),
            name: name.into(),
            version: 1,
            version_note: None,
            current_phase,
            phase_order,
            phase_status,
            agent_autonomy: BTreeMap::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Status of `phase`, `pending` when the backend has not recorded one.
    pub fn status_of(&self, phase: &str) -> PhaseStatus {
        self.phase_status.get(phase).copied().unwrap_or_default()
    }

    pub fn position_of(&self, phase: &str) -> Option<usize> {
        self.phase_order.iter().position(|p| p == phase)
    }
}

/// Partial update body for `PUT /api/projects/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<PhaseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_order: Option<Vec<PhaseId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_status: Option<BTreeMap<PhaseId, PhaseStatus>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_autonomy: Option<BTreeMap<PhaseId, bool>>,
}
