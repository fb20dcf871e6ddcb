//! Project-level actions: loading, phase reordering, autonomy, advancement,
//! versioning and unit edits.
//!
//! Each action validates against the cached state first, then persists with
//! a single backend call and stores the backend's answer.

use std::sync::Arc;

use quill_core::autonomy::{self, AutonomyMap, PhaseTransition};
use quill_core::dependency::update_dependencies;
use quill_core::error::CoreError;
use quill_core::phase::{DragState, PhaseLayout};
use quill_core::project::{Project, ProjectUpdate};
use quill_core::status::DependencyType;
use quill_core::types::{EntityId, PhaseId};
use quill_core::unit::{ContentUnit, UnitKind, UnitUpdate};
use quill_events::{EventBus, WorkspaceEvent};

use crate::api::ApiClient;
use crate::error::ClientResult;
use crate::SharedWorkspace;

pub struct ProjectService {
    api: ApiClient,
    workspace: SharedWorkspace,
    bus: Arc<EventBus>,
    layout: PhaseLayout,
}

impl ProjectService {
    pub fn new(api: ApiClient, workspace: SharedWorkspace, bus: Arc<EventBus>) -> Self {
        Self {
            api,
            workspace,
            bus,
            layout: PhaseLayout::default(),
        }
    }

    pub fn with_layout(mut self, layout: PhaseLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn layout(&self) -> &PhaseLayout {
        &self.layout
    }

    /// Fetch a project with all its fields and blocks into the workspace.
    pub async fn load(&self, project_id: &str) -> ClientResult<Project> {
        let project = self.api.get_project(project_id).await?;
        let fields = self.api.list_fields(project_id, None).await?;
        let blocks = self.api.list_blocks(project_id).await?;
        let count = fields.len() + blocks.len();

        {
            let mut ws = self.workspace.write().await;
            ws.set_project(project.clone());
            ws.replace_units(UnitKind::Field, fields);
            ws.replace_units(UnitKind::Block, blocks);
        }
        tracing::info!(project_id = %project_id, units = count, "Project loaded");
        self.bus.publish(WorkspaceEvent::UnitsReconciled {
            project_id: project_id.to_string(),
            count,
        });
        Ok(project)
    }

    // ---- phase ordering ----

    /// Replace the middle phases with `new_middle`.
    ///
    /// Returns `Ok(None)` without calling the backend when `new_middle` is
    /// not a permutation of the current middle phases.
    pub async fn reorder_phases(&self, new_middle: &[PhaseId]) -> ClientResult<Option<Project>> {
        let project = self.current_project().await?;
        let Some(order) = self.layout.reorder(&project.phase_order, new_middle) else {
            tracing::debug!(project_id = %project.id, "Ignoring reorder that is not a permutation");
            return Ok(None);
        };
        self.persist_order(&project.id, order).await.map(Some)
    }

    /// Complete a drag: drop the dragged phase onto `target` and persist.
    pub async fn drop_phase(&self, drag: &mut DragState, target: &str) -> ClientResult<Option<Project>> {
        let project = self.current_project().await?;
        let Some(order) = drag.drop_on(&self.layout, &project.phase_order, target) else {
            return Ok(None);
        };
        self.persist_order(&project.id, order).await.map(Some)
    }

    async fn persist_order(&self, project_id: &str, order: Vec<PhaseId>) -> ClientResult<Project> {
        let update = ProjectUpdate {
            phase_order: Some(order),
            ..Default::default()
        };
        let project = self.api.update_project(project_id, &update).await?;
        tracing::info!(project_id = %project_id, order = ?project.phase_order, "Phase order saved");
        self.store(project.clone()).await;
        Ok(project)
    }

    // ---- autonomy ----

    pub async fn set_autonomy(&self, phase: &str, autonomous: bool) -> ClientResult<Project> {
        let project = self.current_project().await?;
        let mut map = AutonomyMap::of(&project);
        map.set(phase, autonomous);
        self.persist_autonomy(&project.id, map).await
    }

    /// Set every phase of the project to the same autonomy flag.
    pub async fn set_all_autonomy(&self, autonomous: bool) -> ClientResult<Project> {
        let project = self.current_project().await?;
        let mut map = AutonomyMap::of(&project);
        map.set_all(&project.phase_order, autonomous);
        self.persist_autonomy(&project.id, map).await
    }

    async fn persist_autonomy(&self, project_id: &str, map: AutonomyMap) -> ClientResult<Project> {
        let update = ProjectUpdate {
            agent_autonomy: Some(map.into_map()),
            ..Default::default()
        };
        let project = self.api.update_project(project_id, &update).await?;
        self.store(project.clone()).await;
        Ok(project)
    }

    // ---- advancement ----

    /// Move past the current phase if the next one is autonomous.
    /// `AwaitingConfirmation` changes nothing and calls nothing.
    pub async fn advance(&self) -> ClientResult<PhaseTransition> {
        let mut project = self.current_project().await?;
        let transition = autonomy::advance(&mut project)?;
        if !matches!(transition, PhaseTransition::AwaitingConfirmation { .. }) {
            self.persist_phase(project).await?;
        }
        Ok(transition)
    }

    /// Move past the current phase regardless of autonomy.
    pub async fn confirm_advance(&self) -> ClientResult<PhaseTransition> {
        let mut project = self.current_project().await?;
        let transition = autonomy::confirm_advance(&mut project)?;
        self.persist_phase(project).await?;
        Ok(transition)
    }

    async fn persist_phase(&self, project: Project) -> ClientResult<Project> {
        save_phase(&self.api, &self.workspace, &self.bus, project).await
    }

    // ---- versions ----

    /// Snapshot the current project as a new version. The workspace keeps
    /// the current project loaded.
    pub async fn create_version(&self, note: Option<&str>) -> ClientResult<Project> {
        let project = self.current_project().await?;
        let version = self.api.create_version(&project.id, note).await?;
        tracing::info!(
            project_id = %project.id,
            new_project_id = %version.id,
            version = version.version,
            "Project version created",
        );
        Ok(version)
    }

    // ---- unit edits ----

    /// Replace a unit's dependencies after local validation (self-reference,
    /// duplicates, cycles among the loaded units).
    pub async fn set_dependencies(
        &self,
        unit_id: &str,
        depends_on: Vec<EntityId>,
        dependency_type: DependencyType,
    ) -> ClientResult<ContentUnit> {
        let (unit, update) = {
            let ws = self.workspace.read().await;
            let unit = ws
                .unit(unit_id)
                .cloned()
                .ok_or_else(|| CoreError::unit_not_found(unit_id))?;
            let visible = ws.snapshot();
            let update = update_dependencies(&unit, depends_on, dependency_type, &visible)?;
            (unit, update)
        };
        self.save_unit(&unit, &update).await
    }

    /// Overwrite a unit's content by hand.
    pub async fn edit_content(&self, unit_id: &str, content: &str) -> ClientResult<ContentUnit> {
        let unit = {
            let ws = self.workspace.read().await;
            ws.unit(unit_id)
                .cloned()
                .ok_or_else(|| CoreError::unit_not_found(unit_id))?
        };
        self.save_unit(&unit, &UnitUpdate::content(content)).await
    }

    async fn save_unit(&self, unit: &ContentUnit, update: &UnitUpdate) -> ClientResult<ContentUnit> {
        let saved = match unit.kind {
            UnitKind::Field => self.api.update_field(&unit.id, update).await?,
            UnitKind::Block => self.api.update_block(&unit.id, update).await?,
        };
        self.workspace.write().await.apply_unit(saved.clone())?;
        Ok(saved)
    }

    // ---- helpers ----

    async fn current_project(&self) -> ClientResult<Project> {
        let ws = self.workspace.read().await;
        let project = ws
            .project()
            .cloned()
            .ok_or_else(|| CoreError::Validation("No project is loaded in the workspace".into()))?;
        Ok(project)
    }

    async fn store(&self, project: Project) {
        store_project(&self.workspace, &self.bus, project).await;
    }
}

/// Persist `project`'s current phase and phase statuses, then cache the
/// backend's answer.
pub(crate) async fn save_phase(
    api: &ApiClient,
    workspace: &SharedWorkspace,
    bus: &EventBus,
    project: Project,
) -> ClientResult<Project> {
    let update = ProjectUpdate {
        current_phase: Some(project.current_phase.clone()),
        phase_status: Some(project.phase_status.clone()),
        ..Default::default()
    };
    let saved = api.update_project(&project.id, &update).await?;
    tracing::info!(project_id = %saved.id, phase = %saved.current_phase, "Phase advanced");
    store_project(workspace, bus, saved.clone()).await;
    Ok(saved)
}

async fn store_project(workspace: &SharedWorkspace, bus: &EventBus, project: Project) {
    let event = WorkspaceEvent::ProjectUpdated {
        project_id: project.id.clone(),
        current_phase: project.current_phase.clone(),
    };
    workspace.write().await.set_project(project);
    bus.publish(event);
}
