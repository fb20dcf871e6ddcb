//! In-memory cache of one project's state.
//!
//! The backend is authoritative; everything here can be re-fetched. The
//! cache tracks the project, its fields (flat, in backend order), its
//! content blocks (as a [`BlockTree`]) and the partial text of generations
//! in progress.

use std::collections::HashMap;

use crate::dependency::UnitLookup;
use crate::error::CoreError;
use crate::project::Project;
use crate::status::UnitStatus;
use crate::tree::BlockTree;
use crate::types::EntityId;
use crate::unit::{ContentUnit, UnitKind};

#[derive(Debug, Default)]
pub struct Workspace {
    project: Option<Project>,
    fields: Vec<ContentUnit>,
    blocks: BlockTree,
    partial: HashMap<EntityId, String>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    // -- project --

    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    pub fn project_mut(&mut self) -> Option<&mut Project> {
        self.project.as_mut()
    }

    pub fn set_project(&mut self, project: Project) {
        self.project = Some(project);
    }

    // -- units --

    /// Replace all cached units of `kind` with a fresh backend listing.
    pub fn replace_units(&mut self, kind: UnitKind, units: Vec<ContentUnit>) {
        match kind {
            UnitKind::Field => self.fields = units,
            UnitKind::Block => self.blocks = BlockTree::from_units(units),
        }
    }

    pub fn fields(&self) -> &[ContentUnit] {
        &self.fields
    }

    pub fn blocks(&self) -> &BlockTree {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut BlockTree {
        &mut self.blocks
    }

    pub fn unit(&self, id: &str) -> Option<&ContentUnit> {
        self.fields
            .iter()
            .find(|u| u.id == id)
            .or_else(|| self.blocks.get(id))
    }

    pub fn unit_mut(&mut self, id: &str) -> Option<&mut ContentUnit> {
        match self.fields.iter_mut().find(|u| u.id == id) {
            Some(unit) => Some(unit),
            None => self.blocks.get_mut(id),
        }
    }

    fn require_mut(&mut self, id: &str) -> Result<&mut ContentUnit, CoreError> {
        self.unit_mut(id).ok_or_else(|| CoreError::unit_not_found(id))
    }

    /// Owned snapshot of every known unit: fields first, then blocks in
    /// pre-order.
    pub fn snapshot(&self) -> Vec<ContentUnit> {
        self.fields
            .iter()
            .cloned()
            .chain(self.blocks.flatten().into_iter().cloned())
            .collect()
    }

    pub fn units_in_phase(&self, phase: &str) -> Vec<&ContentUnit> {
        self.fields
            .iter()
            .chain(self.blocks.flatten())
            .filter(|u| u.phase == phase)
            .collect()
    }

    /// Overwrite a cached unit with a record returned by the backend. The
    /// unit's structural position in the block tree is kept.
    pub fn apply_unit(&mut self, unit: ContentUnit) -> Result<(), CoreError> {
        self.partial.remove(&unit.id);
        let slot = self.require_mut(&unit.id)?;
        let (parent_id, depth, order_index) = (slot.parent_id.clone(), slot.depth, slot.order_index);
        let kind = slot.kind;
        *slot = unit;
        if kind == UnitKind::Block {
            slot.parent_id = parent_id;
            slot.depth = depth;
            slot.order_index = order_index;
        }
        Ok(())
    }

    // -- generation --

    /// Mark `id` as generating and reset its partial output.
    pub fn begin_generation(&mut self, id: &str) -> Result<(), CoreError> {
        self.require_mut(id)?.status = UnitStatus::Generating;
        self.partial.insert(id.to_string(), String::new());
        Ok(())
    }

    /// Append a streamed chunk. Returns the accumulated text so far.
    pub fn append_chunk(&mut self, id: &str, chunk: &str) -> &str {
        let buf = self.partial.entry(id.to_string()).or_default();
        buf.push_str(chunk);
        buf
    }

    pub fn partial(&self, id: &str) -> Option<&str> {
        self.partial.get(id).map(String::as_str)
    }

    /// Finish a generation. `content` overrides the accumulated partial text
    /// when the backend supplies the final value. Returns the stored content.
    pub fn complete_generation(&mut self, id: &str, content: Option<String>) -> Result<String, CoreError> {
        let accumulated = self.partial.remove(id).unwrap_or_default();
        let content = content.unwrap_or(accumulated);
        let unit = self.require_mut(id)?;
        unit.status = UnitStatus::Completed;
        unit.content = content.clone();
        Ok(content)
    }

    pub fn fail_generation(&mut self, id: &str) -> Result<(), CoreError> {
        self.partial.remove(id);
        self.require_mut(id)?.status = UnitStatus::Failed;
        Ok(())
    }

    /// Drop partial text without touching status (cancel or interruption).
    pub fn clear_partial(&mut self, id: &str) -> Option<String> {
        self.partial.remove(id)
    }
}

impl UnitLookup for Workspace {
    fn get_unit(&self, id: &str) -> Option<&ContentUnit> {
        self.unit(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::is_eligible;
    use crate::unit::Dependencies;

    fn workspace() -> Workspace {
        let mut ws = Workspace::new();
        ws.replace_units(
            UnitKind::Field,
            vec![
                ContentUnit::new("y", "p1", "intent", "Y"),
                ContentUnit::new("x", "p1", "intent", "X").with_dependencies(Dependencies::all(["y"])),
            ],
        );
        ws
    }

    #[test]
    fn chunks_accumulate_in_order() {
        let mut ws = workspace();
        ws.begin_generation("y").unwrap();
        assert_eq!(ws.unit("y").unwrap().status, UnitStatus::Generating);
        ws.append_chunk("y", "Hel");
        assert_eq!(ws.append_chunk("y", "lo"), "Hello");

        let content = ws.complete_generation("y", None).unwrap();
        assert_eq!(content, "Hello");
        assert_eq!(ws.unit("y").unwrap().content, "Hello");
        assert!(ws.partial("y").is_none());
    }

    #[test]
    fn final_content_overrides_partial() {
        let mut ws = workspace();
        ws.begin_generation("y").unwrap();
        ws.append_chunk("y", "draft");
        let content = ws.complete_generation("y", Some("final".into())).unwrap();
        assert_eq!(content, "final");
    }

    #[test]
    fn restart_clears_partial() {
        let mut ws = workspace();
        ws.begin_generation("y").unwrap();
        ws.append_chunk("y", "old");
        ws.fail_generation("y").unwrap();
        assert_eq!(ws.unit("y").unwrap().status, UnitStatus::Failed);

        ws.begin_generation("y").unwrap();
        assert_eq!(ws.partial("y"), Some(""));
    }

    #[test]
    fn completion_unblocks_dependents() {
        let mut ws = workspace();
        let x = ws.unit("x").unwrap().clone();
        assert!(!is_eligible(&x, &ws));
        ws.begin_generation("y").unwrap();
        ws.complete_generation("y", Some("done".into())).unwrap();
        assert!(is_eligible(&x, &ws));
    }

    #[test]
    fn unknown_unit_is_not_found() {
        let mut ws = workspace();
        assert!(matches!(
            ws.begin_generation("nope"),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn apply_unit_keeps_block_position() {
        let mut ws = Workspace::new();
        let mut root = ContentUnit::new("r", "p1", "design_inner", "R").with_kind(UnitKind::Block);
        root.order_index = 0;
        let child = ContentUnit::new("c", "p1", "design_inner", "C")
            .with_kind(UnitKind::Block)
            .with_parent("r");
        ws.replace_units(UnitKind::Block, vec![root, child]);

        let mut fresh = ContentUnit::new("c", "p1", "design_inner", "C").with_kind(UnitKind::Block);
        fresh.content = "generated".into();
        fresh.status = UnitStatus::Completed;
        ws.apply_unit(fresh).unwrap();

        let c = ws.unit("c").unwrap();
        assert_eq!(c.content, "generated");
        assert_eq!(c.parent_id.as_deref(), Some("r"));
        assert_eq!(c.depth, 1);
    }
}
