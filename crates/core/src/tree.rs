//! Content block tree stored as an arena keyed by block id.
//!
//! Each node keeps its parent id and an ordered list of child ids. Every
//! structural edit renumbers `order_index` within the touched sibling lists
//! and recomputes `depth` for moved subtrees, so the units held in the arena
//! always agree with the tree shape.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::CoreError;
use crate::types::EntityId;
use crate::unit::ContentUnit;

#[derive(Debug, Clone)]
struct Node {
    unit: ContentUnit,
    children: Vec<EntityId>,
}

/// Body for `POST /api/blocks/{id}/move`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveBlock {
    #[serde(skip)]
    pub block_id: EntityId,
    pub new_parent_id: Option<EntityId>,
    pub new_order_index: i32,
}

/// A subtree removed from the tree, restorable with
/// [`BlockTree::restore_subtree`].
#[derive(Debug, Clone, PartialEq)]
pub struct DetachedSubtree {
    pub root_id: EntityId,
    pub parent_id: Option<EntityId>,
    /// Position the root held among its siblings.
    pub index: usize,
    /// Root first, then descendants in pre-order.
    pub units: Vec<ContentUnit>,
}

#[derive(Debug, Clone, Default)]
pub struct BlockTree {
    nodes: HashMap<EntityId, Node>,
    roots: Vec<EntityId>,
}

impl BlockTree {
    /// Build from a flat list. Siblings are ordered by `order_index`, ties by
    /// list position. Units whose parent is unknown become roots, as does the
    /// first unit (in list order) of any parent cycle.
    pub fn from_units(units: impl IntoIterator<Item = ContentUnit>) -> Self {
        let mut units: Vec<ContentUnit> = units.into_iter().collect();
        break_parent_cycles(&mut units);
        let mut tree = Self::default();
        for unit in &units {
            tree.nodes.insert(
                unit.id.clone(),
                Node {
                    unit: unit.clone(),
                    children: Vec::new(),
                },
            );
        }

        let mut ordered: Vec<&ContentUnit> = units.iter().collect();
        ordered.sort_by_key(|u| u.order_index);
        for unit in ordered {
            match unit.parent_id.as_deref().filter(|p| tree.nodes.contains_key(*p)) {
                Some(parent) => {
                    if let Some(node) = tree.nodes.get_mut(parent) {
                        node.children.push(unit.id.clone());
                    }
                }
                None => tree.roots.push(unit.id.clone()),
            }
        }

        let roots = tree.roots.clone();
        for id in &roots {
            if let Some(node) = tree.nodes.get_mut(id) {
                node.unit.parent_id = None;
            }
        }
        tree.renumber_all();
        for id in roots {
            tree.set_depth(&id, 0);
        }
        tree
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ContentUnit> {
        self.nodes.get(id).map(|n| &n.unit)
    }

    /// Mutable access to a block's data. Structural fields (`parent_id`,
    /// `depth`, `order_index`) are owned by the tree; edit them via
    /// [`move_block`](Self::move_block).
    pub fn get_mut(&mut self, id: &str) -> Option<&mut ContentUnit> {
        self.nodes.get_mut(id).map(|n| &mut n.unit)
    }

    pub fn roots(&self) -> &[EntityId] {
        &self.roots
    }

    /// Ordered child ids; empty for leaves and unknown ids.
    pub fn children(&self, id: &str) -> &[EntityId] {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Ancestor ids, nearest first. Stops at the first repeated id.
    pub fn ancestors(&self, id: &str) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut seen: HashSet<EntityId> = HashSet::from([id.to_string()]);
        let mut current = self.get(id).and_then(|u| u.parent_id.clone());
        while let Some(parent) = current {
            if !seen.insert(parent.clone()) {
                break;
            }
            current = self.get(&parent).and_then(|u| u.parent_id.clone());
            out.push(parent);
        }
        out
    }

    /// Whether `id` lies strictly below `ancestor`.
    pub fn is_descendant(&self, id: &str, ancestor: &str) -> bool {
        self.ancestors(id).iter().any(|a| a == ancestor)
    }

    /// Every block in pre-order; `depth` is set on each unit.
    pub fn flatten(&self) -> Vec<&ContentUnit> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for root in &self.roots {
            self.collect(root, &mut out);
        }
        out
    }

    fn collect<'a>(&'a self, id: &str, out: &mut Vec<&'a ContentUnit>) {
        if let Some(node) = self.nodes.get(id) {
            out.push(&node.unit);
            for child in &node.children {
                self.collect(child, out);
            }
        }
    }

    /// Add a new block under its `parent_id` at its `order_index` (clamped).
    pub fn insert(&mut self, unit: ContentUnit) -> Result<(), CoreError> {
        if self.nodes.contains_key(&unit.id) {
            return Err(CoreError::Conflict(format!("Block '{}' already exists", unit.id)));
        }
        let parent = unit.parent_id.clone();
        self.check_parent(parent.as_deref())?;
        let index = usize::try_from(unit.order_index).unwrap_or(0);
        let id = unit.id.clone();
        self.nodes.insert(
            id.clone(),
            Node {
                unit,
                children: Vec::new(),
            },
        );
        self.attach(&id, parent.as_deref(), index);
        Ok(())
    }

    /// Move `id` under `new_parent` (or to the root level) at `index` among
    /// its new siblings. `index` is clamped to the sibling count.
    pub fn move_block(
        &mut self,
        id: &str,
        new_parent: Option<&str>,
        index: usize,
    ) -> Result<MoveBlock, CoreError> {
        let old_parent = self
            .get(id)
            .ok_or_else(|| CoreError::NotFound {
                entity: "ContentBlock",
                id: id.to_string(),
            })?
            .parent_id
            .clone();
        if let Some(target) = new_parent {
            if target == id || self.is_descendant(target, id) {
                return Err(CoreError::Validation(format!(
                    "Cannot move block '{id}' under itself or its descendant"
                )));
            }
        }
        self.check_parent(new_parent)?;

        self.siblings_mut(old_parent.as_deref()).retain(|c| c != id);
        self.renumber(old_parent.as_deref());
        let new_order_index = self.attach(id, new_parent, index);

        Ok(MoveBlock {
            block_id: id.to_string(),
            new_parent_id: new_parent.map(str::to_string),
            new_order_index,
        })
    }

    /// Remove `id` and all its descendants.
    pub fn detach_subtree(&mut self, id: &str) -> Result<DetachedSubtree, CoreError> {
        let parent_id = self
            .get(id)
            .ok_or_else(|| CoreError::NotFound {
                entity: "ContentBlock",
                id: id.to_string(),
            })?
            .parent_id
            .clone();
        let index = self
            .siblings(parent_id.as_deref())
            .iter()
            .position(|c| c == id)
            .unwrap_or(0);

        let ids: Vec<EntityId> = {
            let mut units = Vec::new();
            self.collect(id, &mut units);
            units.into_iter().map(|u| u.id.clone()).collect()
        };
        let units = ids
            .iter()
            .filter_map(|i| self.nodes.remove(i))
            .map(|n| n.unit)
            .collect();

        self.siblings_mut(parent_id.as_deref()).retain(|c| c != id);
        self.renumber(parent_id.as_deref());

        Ok(DetachedSubtree {
            root_id: id.to_string(),
            parent_id,
            index,
            units,
        })
    }

    /// Put a detached subtree back at its former position.
    pub fn restore_subtree(&mut self, subtree: DetachedSubtree) -> Result<(), CoreError> {
        self.check_parent(subtree.parent_id.as_deref())?;
        if let Some(clash) = subtree.units.iter().find(|u| self.nodes.contains_key(&u.id)) {
            return Err(CoreError::Conflict(format!("Block '{}' already exists", clash.id)));
        }

        for unit in &subtree.units {
            self.nodes.insert(
                unit.id.clone(),
                Node {
                    unit: unit.clone(),
                    children: Vec::new(),
                },
            );
        }
        // Rebuild child lists below the root; units are in pre-order so
        // siblings are pushed in their original order.
        for unit in subtree.units.iter().skip(1) {
            if let Some(parent) = unit.parent_id.as_deref() {
                if let Some(node) = self.nodes.get_mut(parent) {
                    node.children.push(unit.id.clone());
                }
            }
        }
        self.attach(&subtree.root_id, subtree.parent_id.as_deref(), subtree.index);
        Ok(())
    }

    // -- internals --

    fn check_parent(&self, parent: Option<&str>) -> Result<(), CoreError> {
        match parent {
            Some(p) if !self.nodes.contains_key(p) => Err(CoreError::NotFound {
                entity: "ContentBlock",
                id: p.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn siblings(&self, parent: Option<&str>) -> &[EntityId] {
        match parent {
            Some(p) => self.children(p),
            None => &self.roots,
        }
    }

    fn siblings_mut(&mut self, parent: Option<&str>) -> &mut Vec<EntityId> {
        match parent.and_then(|p| self.nodes.get_mut(p)) {
            Some(node) => &mut node.children,
            None => &mut self.roots,
        }
    }

    /// Insert `id` into `parent`'s child list and fix up its fields.
    /// Returns the resulting `order_index`.
    fn attach(&mut self, id: &str, parent: Option<&str>, index: usize) -> i32 {
        let siblings = self.siblings_mut(parent);
        let index = index.min(siblings.len());
        siblings.insert(index, id.to_string());

        let depth = parent
            .and_then(|p| self.get(p))
            .map_or(0, |p| p.depth + 1);
        if let Some(node) = self.nodes.get_mut(id) {
            node.unit.parent_id = parent.map(str::to_string);
        }
        self.renumber(parent);
        self.set_depth(id, depth);
        i32::try_from(index).unwrap_or(i32::MAX)
    }

    /// Rewrite `order_index` of one sibling list to match list positions.
    fn renumber(&mut self, parent: Option<&str>) {
        let ids = self.siblings(parent).to_vec();
        for (i, child) in ids.iter().enumerate() {
            if let Some(node) = self.nodes.get_mut(child) {
                node.unit.order_index = i32::try_from(i).unwrap_or(i32::MAX);
            }
        }
    }

    fn renumber_all(&mut self) {
        self.renumber(None);
        let parents: Vec<EntityId> = self.nodes.keys().cloned().collect();
        for parent in parents {
            self.renumber(Some(&parent));
        }
    }

    fn set_depth(&mut self, id: &str, depth: u32) {
        let children = match self.nodes.get_mut(id) {
            Some(node) => {
                node.unit.depth = depth;
                node.children.clone()
            }
            None => return,
        };
        for child in children {
            self.set_depth(&child, depth + 1);
        }
    }
}

/// Clear `parent_id` on the first unit of every parent cycle so the rest of
/// the cycle hangs below it.
fn break_parent_cycles(units: &mut [ContentUnit]) {
    let known: HashSet<EntityId> = units.iter().map(|u| u.id.clone()).collect();
    let mut parents: HashMap<EntityId, EntityId> = units
        .iter()
        .filter_map(|u| {
            let parent = u.parent_id.as_ref().filter(|p| known.contains(*p))?;
            Some((u.id.clone(), parent.clone()))
        })
        .collect();

    for unit in units.iter_mut() {
        let loops = {
            let mut seen = HashSet::new();
            let mut current = parents.get(&unit.id);
            loop {
                match current {
                    None => break false,
                    Some(parent) if *parent == unit.id => break true,
                    Some(parent) if !seen.insert(parent.clone()) => break false,
                    Some(parent) => current = parents.get(parent),
                }
            }
        };
        if loops {
            parents.remove(&unit.id);
            unit.parent_id = None;
        }
    }
}
