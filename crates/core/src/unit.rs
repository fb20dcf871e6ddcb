//! Content units: the generatable pieces of a phase.
//!
//! A [`ContentUnit`] models both the flat per-phase "field" and the
//! tree-shaped "content block". Blocks additionally carry `parent_id`,
//! `depth` and `order_index`; for fields those stay at their defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::status::{DependencyType, UnitStatus};
use crate::types::{EntityId, PhaseId, Timestamp};

/// Whether a unit is served by the flat field API or the block tree API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    #[default]
    Field,
    Block,
}

/// Declared generation dependencies of a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    /// Ids of the units this one depends on, in user-declared order.
    #[serde(default)]
    pub depends_on: Vec<EntityId>,
    #[serde(default)]
    pub dependency_type: DependencyType,
}

impl Dependencies {
    pub fn all(depends_on: impl IntoIterator<Item = impl Into<EntityId>>) -> Self {
        Self {
            depends_on: depends_on.into_iter().map(Into::into).collect(),
            dependency_type: DependencyType::All,
        }
    }

    pub fn any(depends_on: impl IntoIterator<Item = impl Into<EntityId>>) -> Self {
        Self {
            depends_on: depends_on.into_iter().map(Into::into).collect(),
            dependency_type: DependencyType::Any,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.depends_on.is_empty()
    }
}

/// Output constraints passed through to the generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    /// e.g. `"markdown"`, `"plain_text"`, `"json"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    /// Structural template the output should follow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

/// A field or content block as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentUnit {
    pub id: EntityId,
    pub project_id: EntityId,
    #[serde(default)]
    pub parent_id: Option<EntityId>,
    #[serde(default)]
    pub phase: PhaseId,
    pub name: String,
    /// Backend-defined type tag (`"text"`, `"section"`, ...).
    #[serde(default, alias = "field_type", alias = "block_type")]
    pub unit_type: String,
    #[serde(default)]
    pub kind: UnitKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: UnitStatus,
    #[serde(default)]
    pub ai_prompt: String,
    #[serde(default)]
    pub pre_questions: Vec<String>,
    #[serde(default)]
    pub pre_answers: BTreeMap<String, String>,
    #[serde(default)]
    pub dependencies: Dependencies,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub need_review: bool,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub order_index: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

impl ContentUnit {
    /// Minimal pending unit, mostly useful for fixtures and local drafts.
    pub fn new(
        id: impl Into<EntityId>,
        project_id: impl Into<EntityId>,
        phase: impl Into<PhaseId>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            parent_id: None,
            phase: phase.into(),
            name: name.into(),
            unit_type: String::new(),
            kind: UnitKind::Field,
            content: String::new(),
            status: UnitStatus::Pending,
            ai_prompt: String::new(),
            pre_questions: Vec::new(),
            pre_answers: BTreeMap::new(),
            dependencies: Dependencies::default(),
            constraints: Constraints::default(),
            need_review: false,
            depth: 0,
            order_index: 0,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_status(mut self, status: UnitStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Dependencies) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_kind(mut self, kind: UnitKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<EntityId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == UnitStatus::Completed
    }
}

/// Partial update body for `PUT /api/fields/{id}` and `PUT /api/blocks/{id}`.
///
/// Only `Some` members are serialized, so the backend leaves the rest alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnitUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<UnitStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_answers: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Dependencies>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub need_review: Option<bool>,
}

impl UnitUpdate {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Body for `POST /api/blocks/`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewBlock {
    pub project_id: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntityId>,
    pub name: String,
    pub block_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ai_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_index: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_field_with_defaults() {
        let json = r#"{"id":"f1","project_id":"p1","name":"Title","field_type":"text"}"#;
        let unit: ContentUnit = serde_json::from_str(json).unwrap();
        assert_eq!(unit.unit_type, "text");
        assert_eq!(unit.status, UnitStatus::Pending);
        assert_eq!(unit.kind, UnitKind::Field);
        assert!(unit.dependencies.is_empty());
        assert_eq!(unit.dependencies.dependency_type, DependencyType::All);
    }

    #[test]
    fn deserializes_block_dependencies() {
        let json = r#"{
            "id": "b2", "project_id": "p1", "parent_id": "b1", "name": "Body",
            "block_type": "section", "kind": "block", "status": "completed",
            "dependencies": {"depends_on": ["b0"], "dependency_type": "any"},
            "depth": 1, "order_index": 3
        }"#;
        let unit: ContentUnit = serde_json::from_str(json).unwrap();
        assert_eq!(unit.parent_id.as_deref(), Some("b1"));
        assert_eq!(unit.kind, UnitKind::Block);
        assert_eq!(unit.dependencies, Dependencies::any(["b0"]));
        assert_eq!(unit.order_index, 3);
        assert!(unit.is_completed());
    }

    #[test]
    fn unit_update_serializes_only_set_members() {
        let update = UnitUpdate::content("draft");
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({"content": "draft"}));
        assert!(!update.is_empty());
        assert!(UnitUpdate::default().is_empty());
    }
}
