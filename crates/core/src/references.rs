//! `@name` references inside chat messages.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::unit::ContentUnit;

/// An `@` followed by one or more characters that are neither whitespace
/// nor another `@`.
static REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([^\s@]+)").expect("valid reference regex"));

/// Extract referenced names in left-to-right order, duplicates preserved.
pub fn parse_references(text: &str) -> Vec<String> {
    REFERENCE_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Drop repeated names, keeping the first occurrence's position.
pub fn dedupe_references(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|n| seen.insert(n.clone()))
        .collect()
}

/// Outcome of matching reference names against known units.
#[derive(Debug, Default)]
pub struct ResolvedReferences<'a> {
    pub units: Vec<&'a ContentUnit>,
    pub unresolved: Vec<String>,
}

/// Match each name against unit names exactly. Order follows `names`.
pub fn resolve_references<'a>(names: &[String], units: &'a [ContentUnit]) -> ResolvedReferences<'a> {
    let mut resolved = ResolvedReferences::default();
    for name in names {
        match units.iter().find(|u| u.name == *name) {
            Some(unit) => resolved.units.push(unit),
            None => resolved.unresolved.push(name.clone()),
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cjk_references() {
        assert_eq!(
            parse_references("请参考 @标题 和 @正文 生成"),
            vec!["标题".to_string(), "正文".to_string()]
        );
    }

    #[test]
    fn no_references_yields_empty() {
        assert!(parse_references("no refs").is_empty());
        assert!(parse_references("trailing @").is_empty());
    }

    #[test]
    fn adjacent_references_split_on_at() {
        assert_eq!(parse_references("@a@b"), vec!["a", "b"]);
    }

    #[test]
    fn duplicates_preserved_then_deduped() {
        let names = parse_references("@x then @y and @x again");
        assert_eq!(names, vec!["x", "y", "x"]);
        assert_eq!(dedupe_references(names), vec!["x", "y"]);
    }

    #[test]
    fn resolve_splits_known_and_unknown() {
        let units = vec![
            ContentUnit::new("u1", "p1", "intent", "Title"),
            ContentUnit::new("u2", "p1", "intent", "Body"),
        ];
        let names = vec!["Body".to_string(), "Missing".to_string()];
        let resolved = resolve_references(&names, &units);
        assert_eq!(resolved.units.len(), 1);
        assert_eq!(resolved.units[0].id, "u2");
        assert_eq!(resolved.unresolved, vec!["Missing"]);
    }
}
