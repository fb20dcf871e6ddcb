//! Dependency model: generation eligibility, blockers, and validation of
//! dependency edits.
//!
//! A unit is eligible when its declared dependencies are satisfied:
//!
//! - `all`: every listed unit is `completed`
//! - `any`: at least one listed unit is `completed`
//! - no dependencies: always eligible
//!
//! An id that does not resolve to a known unit counts as not completed.

use std::collections::{HashMap, HashSet};

use crate::error::CoreError;
use crate::status::DependencyType;
use crate::types::EntityId;
use crate::unit::{ContentUnit, Dependencies, UnitUpdate};

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Id-based access to a set of known units.
///
/// Implemented for plain slices (linear scan) and id-keyed maps, so callers
/// holding an index get O(|depends_on|) eligibility checks.
pub trait UnitLookup {
    fn get_unit(&self, id: &str) -> Option<&ContentUnit>;
}

impl UnitLookup for [ContentUnit] {
    fn get_unit(&self, id: &str) -> Option<&ContentUnit> {
        self.iter().find(|u| u.id == id)
    }
}

impl UnitLookup for Vec<ContentUnit> {
    fn get_unit(&self, id: &str) -> Option<&ContentUnit> {
        self.as_slice().get_unit(id)
    }
}

impl UnitLookup for HashMap<EntityId, ContentUnit> {
    fn get_unit(&self, id: &str) -> Option<&ContentUnit> {
        self.get(id)
    }
}

fn is_completed<L: UnitLookup + ?Sized>(units: &L, id: &str) -> bool {
    units.get_unit(id).is_some_and(ContentUnit::is_completed)
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

/// Whether `unit` may be generated given the current state of `units`.
pub fn is_eligible<L: UnitLookup + ?Sized>(unit: &ContentUnit, units: &L) -> bool {
    let deps = &unit.dependencies;
    if deps.is_empty() {
        return true;
    }
    match deps.dependency_type {
        DependencyType::All => deps.depends_on.iter().all(|id| is_completed(units, id)),
        DependencyType::Any => deps.depends_on.iter().any(|id| is_completed(units, id)),
    }
}

/// A declared dependency that is not yet completed.
#[derive(Debug, Clone, PartialEq)]
pub struct Blocker {
    pub id: EntityId,
    /// `None` when the id does not resolve to any known unit.
    pub unit: Option<ContentUnit>,
}

impl Blocker {
    /// Unit name when known, otherwise the raw id.
    pub fn display_name(&self) -> &str {
        self.unit.as_ref().map_or(self.id.as_str(), |u| u.name.as_str())
    }
}

/// Dependencies of `unit` that are not completed, in `depends_on` order.
///
/// Empty exactly when [`is_eligible`] holds for an `all` unit. For `any`
/// units the list is informational: eligibility needs only one completion.
pub fn unmet_dependencies<L: UnitLookup + ?Sized>(unit: &ContentUnit, units: &L) -> Vec<Blocker> {
    unit.dependencies
        .depends_on
        .iter()
        .filter(|id| !is_completed(units, id))
        .map(|id| Blocker {
            id: id.clone(),
            unit: units.get_unit(id).cloned(),
        })
        .collect()
}

/// Join blocker names for user-facing messages, e.g. `"Title, Outline"`.
pub fn describe_blockers(blockers: &[Blocker]) -> String {
    blockers
        .iter()
        .map(Blocker::display_name)
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Editing
// ---------------------------------------------------------------------------

/// Build the update request replacing `unit`'s dependencies.
///
/// Rejects self-dependency and any edit that would close a cycle among
/// `visible_units`. Duplicate ids are collapsed, keeping first occurrence.
/// The backend re-validates; this only catches what the client can see.
pub fn update_dependencies(
    unit: &ContentUnit,
    new_depends_on: Vec<EntityId>,
    dependency_type: DependencyType,
    visible_units: &[ContentUnit],
) -> Result<UnitUpdate, CoreError> {
    if new_depends_on.iter().any(|id| *id == unit.id) {
        return Err(CoreError::Validation(format!(
            "Unit '{}' cannot depend on itself",
            unit.name
        )));
    }

    let mut seen = HashSet::new();
    let depends_on: Vec<EntityId> = new_depends_on
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect();

    let mut edges = dependency_edges(visible_units);
    edges.insert(unit.id.as_str(), depends_on.iter().map(String::as_str).collect());
    if let Some(cycle) = cycle_from(&edges, &unit.id) {
        return Err(CoreError::Conflict(format!(
            "Dependency cycle: {}",
            cycle.join(" -> ")
        )));
    }

    Ok(UnitUpdate {
        dependencies: Some(Dependencies {
            depends_on,
            dependency_type,
        }),
        ..Default::default()
    })
}

/// Units `unit` may depend on: those listed before it in the same phase.
pub fn dependency_candidates<'a>(unit: &ContentUnit, units: &'a [ContentUnit]) -> Vec<&'a ContentUnit> {
    units
        .iter()
        .take_while(|u| u.id != unit.id)
        .filter(|u| u.phase == unit.phase)
        .collect()
}

/// Units that list `id` among their dependencies.
pub fn dependents_of<'a>(id: &str, units: &'a [ContentUnit]) -> Vec<&'a ContentUnit> {
    units
        .iter()
        .filter(|u| u.dependencies.depends_on.iter().any(|d| d == id))
        .collect()
}

/// First dependency cycle found among `units`, as a closed path of ids
/// (`[a, b, a]`). Edges to unknown ids are ignored.
pub fn find_cycle(units: &[ContentUnit]) -> Option<Vec<EntityId>> {
    let edges = dependency_edges(units);
    let mut state: HashMap<&str, Visit> = HashMap::new();
    for unit in units {
        let mut path = Vec::new();
        if let Some(cycle) = visit(&edges, &unit.id, &mut state, &mut path) {
            return Some(cycle);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Graph helpers
// ---------------------------------------------------------------------------

type Edges<'a> = HashMap<&'a str, Vec<&'a str>>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

fn dependency_edges(units: &[ContentUnit]) -> Edges<'_> {
    units
        .iter()
        .map(|u| {
            let deps = u.dependencies.depends_on.iter().map(String::as_str).collect();
            (u.id.as_str(), deps)
        })
        .collect()
}

/// Cycle passing through `start`, if any.
fn cycle_from(edges: &Edges<'_>, start: &str) -> Option<Vec<EntityId>> {
    let mut seen = HashSet::new();
    let mut path = vec![start];
    if walk_back_to(edges, start, start, &mut seen, &mut path) {
        Some(path.into_iter().map(str::to_string).collect())
    } else {
        None
    }
}

/// Depth-first search from `node` for an edge into `target`. On success
/// `path` holds the closed walk ending in `target`.
fn walk_back_to<'a>(
    edges: &Edges<'a>,
    node: &'a str,
    target: &str,
    seen: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> bool {
    let Some(next) = edges.get(node) else {
        return false;
    };
    for &dep in next {
        if dep == target {
            path.push(dep);
            return true;
        }
        if !seen.insert(dep) {
            continue;
        }
        path.push(dep);
        if walk_back_to(edges, dep, target, seen, path) {
            return true;
        }
        path.pop();
    }
    false
}

fn visit<'a>(
    edges: &Edges<'a>,
    node: &'a str,
    state: &mut HashMap<&'a str, Visit>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<EntityId>> {
    match state.get(node) {
        Some(Visit::Done) => return None,
        Some(Visit::InProgress) => {
            let from = path.iter().position(|n| *n == node).unwrap_or(0);
            let mut cycle: Vec<EntityId> = path[from..].iter().map(|n| n.to_string()).collect();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        None => {}
    }
    // Unknown ids have no outgoing edges.
    let next = edges.get(node)?;
    state.insert(node, Visit::InProgress);
    path.push(node);
    for &dep in next {
        if let Some(cycle) = visit(edges, dep, state, path) {
            return Some(cycle);
        }
    }
    path.pop();
    state.insert(node, Visit::Done);
    None
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::status::UnitStatus;

    fn unit(id: &str, status: UnitStatus) -> ContentUnit {
        ContentUnit::new(id, "p1", "intent", id.to_uppercase()).with_status(status)
    }

    // -- Eligibility --

    #[test]
    fn no_dependencies_is_eligible() {
        let units = vec![unit("a", UnitStatus::Pending)];
        assert!(is_eligible(&units[0], &units));
    }

    #[test]
    fn all_requires_every_dependency_completed() {
        let units = vec![
            unit("y", UnitStatus::Completed),
            unit("z", UnitStatus::Pending),
            unit("x", UnitStatus::Pending).with_dependencies(Dependencies::all(["y", "z"])),
        ];
        assert!(!is_eligible(&units[2], &units));

        let mut units = units;
        units[1].status = UnitStatus::Completed;
        assert!(is_eligible(&units[2], &units));
    }

    #[test]
    fn any_requires_one_completed() {
        let units = vec![
            unit("y", UnitStatus::Failed),
            unit("z", UnitStatus::Completed),
            unit("x", UnitStatus::Pending).with_dependencies(Dependencies::any(["y", "z"])),
        ];
        assert!(is_eligible(&units[2], &units));
    }

    #[test]
    fn any_with_nothing_completed_is_blocked() {
        let units = vec![
            unit("y", UnitStatus::Generating),
            unit("x", UnitStatus::Pending).with_dependencies(Dependencies::any(["y"])),
        ];
        assert!(!is_eligible(&units[1], &units));
    }

    #[test]
    fn missing_dependency_counts_as_unmet() {
        let units = vec![unit("x", UnitStatus::Pending).with_dependencies(Dependencies::all(["gone"]))];
        assert!(!is_eligible(&units[0], &units));

        let blockers = unmet_dependencies(&units[0], &units);
        assert_eq!(blockers.len(), 1);
        assert!(blockers[0].unit.is_none());
        assert_eq!(blockers[0].display_name(), "gone");
    }

    #[test]
    fn map_lookup_matches_slice_lookup() {
        let units = vec![
            unit("y", UnitStatus::Completed),
            unit("x", UnitStatus::Pending).with_dependencies(Dependencies::all(["y"])),
        ];
        let index: HashMap<EntityId, ContentUnit> =
            units.iter().map(|u| (u.id.clone(), u.clone())).collect();
        assert_eq!(is_eligible(&units[1], &units), is_eligible(&units[1], &index));
    }

    // -- Blockers --

    #[test]
    fn unmet_preserves_declared_order() {
        let units = vec![
            unit("a", UnitStatus::Pending),
            unit("b", UnitStatus::Completed),
            unit("c", UnitStatus::Failed),
            unit("x", UnitStatus::Pending).with_dependencies(Dependencies::all(["c", "b", "a"])),
        ];
        let ids: Vec<_> = unmet_dependencies(&units[3], &units)
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn describe_blockers_uses_names() {
        let units = vec![
            unit("a", UnitStatus::Pending),
            unit("x", UnitStatus::Pending).with_dependencies(Dependencies::all(["a", "zz"])),
        ];
        let blockers = unmet_dependencies(&units[1], &units);
        assert_eq!(describe_blockers(&blockers), "A, zz");
    }

    // -- Editing --

    #[test]
    fn self_dependency_rejected() {
        let units = vec![unit("x", UnitStatus::Pending)];
        let result = update_dependencies(&units[0], vec!["x".into()], DependencyType::All, &units);
        assert_matches!(result, Err(CoreError::Validation(_)));
    }

    #[test]
    fn duplicates_collapsed_in_order() {
        let units = vec![
            unit("a", UnitStatus::Pending),
            unit("b", UnitStatus::Pending),
            unit("x", UnitStatus::Pending),
        ];
        let update = update_dependencies(
            &units[2],
            vec!["b".into(), "a".into(), "b".into()],
            DependencyType::Any,
            &units,
        )
        .unwrap();
        assert_eq!(update.dependencies, Some(Dependencies::any(["b", "a"])));
    }

    #[test]
    fn cycle_rejected() {
        let units = vec![
            unit("a", UnitStatus::Pending).with_dependencies(Dependencies::all(["b"])),
            unit("b", UnitStatus::Pending).with_dependencies(Dependencies::all(["c"])),
            unit("c", UnitStatus::Pending),
        ];
        let err = update_dependencies(&units[2], vec!["a".into()], DependencyType::All, &units)
            .unwrap_err();
        assert_matches!(err, CoreError::Conflict(ref msg) if msg.contains("c -> a -> b -> c"));
    }

    #[test]
    fn depending_on_an_existing_cycle_is_not_this_units_conflict() {
        // a and b already depend on each other; c only points into that loop.
        let units = vec![
            unit("a", UnitStatus::Pending).with_dependencies(Dependencies::all(["b"])),
            unit("b", UnitStatus::Pending).with_dependencies(Dependencies::all(["a"])),
            unit("c", UnitStatus::Pending),
        ];
        let update = update_dependencies(&units[2], vec!["a".into()], DependencyType::All, &units)
            .unwrap();
        assert_eq!(update.dependencies, Some(Dependencies::all(["a"])));

        let err = update_dependencies(&units[0], vec!["b".into()], DependencyType::All, &units)
            .unwrap_err();
        assert_matches!(err, CoreError::Conflict(ref msg) if msg.contains("a -> b -> a"));
    }

    #[test]
    fn unknown_dependency_ids_are_allowed() {
        let units = vec![unit("x", UnitStatus::Pending)];
        let update =
            update_dependencies(&units[0], vec!["elsewhere".into()], DependencyType::All, &units);
        assert!(update.is_ok());
    }

    // -- Graph queries --

    #[test]
    fn candidates_are_earlier_units_in_same_phase() {
        let mut other = unit("o", UnitStatus::Pending);
        other.phase = "research".into();
        let units = vec![
            unit("a", UnitStatus::Pending),
            other,
            unit("b", UnitStatus::Pending),
            unit("x", UnitStatus::Pending),
            unit("later", UnitStatus::Pending),
        ];
        let ids: Vec<_> = dependency_candidates(&units[3], &units)
            .iter()
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn dependents_found() {
        let units = vec![
            unit("y", UnitStatus::Pending),
            unit("x", UnitStatus::Pending).with_dependencies(Dependencies::all(["y"])),
            unit("w", UnitStatus::Pending).with_dependencies(Dependencies::any(["q", "y"])),
        ];
        let ids: Vec<_> = dependents_of("y", &units).iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "w"]);
    }

    #[test]
    fn find_cycle_reports_closed_path() {
        let units = vec![
            unit("a", UnitStatus::Pending).with_dependencies(Dependencies::all(["b"])),
            unit("b", UnitStatus::Pending).with_dependencies(Dependencies::all(["a"])),
        ];
        assert_eq!(find_cycle(&units), Some(vec!["a".into(), "b".into(), "a".into()]));
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let units = vec![
            unit("a", UnitStatus::Pending),
            unit("b", UnitStatus::Pending).with_dependencies(Dependencies::all(["a"])),
            unit("c", UnitStatus::Pending).with_dependencies(Dependencies::all(["a", "b"])),
        ];
        assert_eq!(find_cycle(&units), None);
    }
}
