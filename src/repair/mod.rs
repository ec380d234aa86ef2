//! GROUP BY repair
//!
//! A single-pass, pattern-based check that every non-aggregated SELECT item
//! also appears in GROUP BY. It is not a SQL parser: clause boundaries are
//! found with regular expressions, so keywords inside string literals can
//! still confuse it.
//!
//! When items are missing, two rewrites are tried in order:
//! - shrink SELECT to aggregates, literals and already-grouped items, when
//!   the query has an aggregate call and something would remain; ordinal
//!   GROUP BY entries follow their items to the new positions
//! - grow GROUP BY with the missing plain column references; missing
//!   expressions stay in place and are reported as unresolved
//!
//! Only one rewrite is applied per call.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, warn};

static SELECT_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bSELECT\s+(.*?)\s+FROM\b").unwrap());

static GROUP_BY_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\bGROUP\s+BY\s+(.*?)(?:\s+ORDER\s+BY\b|\s+HAVING\b|\s+LIMIT\b|\s*;|\s*$)")
        .unwrap()
});

static AGGREGATE_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(SUM|COUNT|AVG|MIN|MAX|FIRST|LAST)\s*\(").unwrap());

static SELECT_MODIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^(?:(?:DISTINCT|ALL)\s+|TOP\s*\(?\s*\d+\s*\)?(?:\s+PERCENT)?(?:\s+WITH\s+TIES)?\s+)+",
    )
    .unwrap()
});

static AS_ALIAS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)^(.*?)\s+AS\s+([\w\[\]"`]+|'[^']*')$"#).unwrap());

static IMPLICIT_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^([\w\[\]"`]+(?:\.[\w\[\]"`]+)*)\s+([\w\[\]"`]+)$"#).unwrap()
});

static QUALIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(?:[\w\[\]"`]+\.)+"#).unwrap());

static LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^(?:-?\d+(?:\.\d+)?|'(?:[^']|'')*'|NULL)$").unwrap());

static OPERATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[()+\-*/]").unwrap());

pub const PASSED_MESSAGE: &str = "SQL validation passed";
pub const SHRUNK_SELECT_MESSAGE: &str =
    "Fixed GROUP BY issue: Removed non-grouped columns from SELECT";
pub const GREW_GROUP_BY_MESSAGE: &str = "Fixed GROUP BY issue: Added missing columns to GROUP BY";

/// What the repair did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairAction {
    /// No mismatch found, or nothing to check
    Unchanged,
    /// Non-grouped items dropped from SELECT
    ShrunkSelect,
    /// Missing items appended to GROUP BY
    GrewGroupBy,
    /// Mismatch found but neither rewrite applied
    Unrepaired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairResult {
    pub sql: String,
    pub action: RepairAction,
    pub message: String,
    /// Bare SELECT items that were missing from GROUP BY
    pub missing: Vec<String>,
    /// Missing items the rewrite could not account for
    #[serde(default)]
    pub unresolved: Vec<String>,
}

impl RepairResult {
    fn unchanged(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            action: RepairAction::Unchanged,
            message: PASSED_MESSAGE.to_string(),
            missing: Vec::new(),
            unresolved: Vec::new(),
        }
    }

    /// True unless a mismatch was left in place
    pub fn is_valid(&self) -> bool {
        self.action != RepairAction::Unrepaired && self.unresolved.is_empty()
    }
}

/// One SELECT list entry
#[derive(Debug)]
struct SelectItem<'a> {
    /// Entry as written, alias included
    text: &'a str,
    /// Expression without its alias
    expr: &'a str,
    alias: Option<&'a str>,
    /// Expression without table qualifier
    bare: &'a str,
    aggregate: bool,
}

impl<'a> SelectItem<'a> {
    fn parse(text: &'a str) -> Self {
        let (expr, alias) = split_alias(text);
        Self {
            text,
            expr,
            alias,
            bare: strip_qualifier(expr),
            aggregate: AGGREGATE_CALL.is_match(text),
        }
    }

    /// Whether the item needs a GROUP BY entry at all
    fn needs_grouping(&self) -> bool {
        !self.aggregate && !self.bare.ends_with('*') && !LITERAL.is_match(self.expr)
    }

    fn is_grouped(&self, position: usize, group: &GroupKeys) -> bool {
        group.positions.contains(&position)
            || group.names.contains(&column_key(self.bare))
            || group.names.contains(&column_key(self.expr))
            || self
                .alias
                .is_some_and(|alias| group.names.contains(&column_key(alias)))
    }
}

/// Normalized GROUP BY entries
struct GroupKeys {
    names: HashSet<String>,
    /// 1-based SELECT positions referenced by ordinal
    positions: HashSet<usize>,
}

impl GroupKeys {
    fn parse(clause: &str) -> Self {
        let mut names = HashSet::new();
        let mut positions = HashSet::new();
        for item in split_top_level(clause) {
            if let Ok(position) = item.parse::<usize>() {
                positions.insert(position);
            } else {
                names.insert(column_key(strip_qualifier(item)));
            }
        }
        Self { names, positions }
    }
}

fn split_alias(item: &str) -> (&str, Option<&str>) {
    if let Some(caps) = AS_ALIAS.captures(item) {
        if let (Some(expr), Some(alias)) = (caps.get(1), caps.get(2)) {
            return (expr.as_str().trim(), Some(alias.as_str()));
        }
    }
    if let Some(caps) = IMPLICIT_ALIAS.captures(item) {
        if let (Some(expr), Some(alias)) = (caps.get(1), caps.get(2)) {
            return (expr.as_str(), Some(alias.as_str()));
        }
    }
    (item, None)
}

fn strip_qualifier(expr: &str) -> &str {
    match QUALIFIER.find(expr) {
        Some(m) if m.end() < expr.len() => &expr[m.end()..],
        _ => expr,
    }
}

/// Comparison key: delimiters dropped, whitespace collapsed, lowercased
fn column_key(expr: &str) -> String {
    expr.chars()
        .filter(|c| !matches!(c, '[' | ']' | '"' | '`'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Split on commas outside parentheses and quotes
fn split_top_level(list: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in list.char_indices() {
        match quote {
            Some(close) => {
                if c == close {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '[' => quote = Some(']'),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    items.push(list[start..i].trim());
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    items.push(list[start..].trim());
    items.retain(|item| !item.is_empty());
    items
}

/// GROUP BY with ordinal entries moved to their post-shrink positions
///
/// Returns `None` when no ordinal changes.
fn renumber_ordinals(clause: &str, renumbered: &HashMap<usize, usize>) -> Option<String> {
    let mut changed = false;
    let entries: Vec<String> = split_top_level(clause)
        .into_iter()
        .map(|entry| match entry.parse::<usize>() {
            Ok(old) => match renumbered.get(&old) {
                Some(&new) if new != old => {
                    changed = true;
                    new.to_string()
                }
                _ => entry.to_string(),
            },
            Err(_) => entry.to_string(),
        })
        .collect();
    changed.then(|| entries.join(", "))
}

fn splice(sql: &str, range: std::ops::Range<usize>, replacement: &str) -> String {
    let mut out = String::with_capacity(sql.len() + replacement.len());
    out.push_str(&sql[..range.start]);
    out.push_str(replacement);
    out.push_str(&sql[range.end..]);
    out
}

/// Check SELECT against GROUP BY and apply at most one rewrite
pub fn repair_group_by(sql: &str) -> RepairResult {
    let (Some(select_caps), Some(group_caps)) =
        (SELECT_CLAUSE.captures(sql), GROUP_BY_CLAUSE.captures(sql))
    else {
        return RepairResult::unchanged(sql);
    };
    let (Some(select_match), Some(group_match)) = (select_caps.get(1), group_caps.get(1)) else {
        return RepairResult::unchanged(sql);
    };

    let select_clause = select_match.as_str();
    let modifier = SELECT_MODIFIER
        .find(select_clause)
        .map_or("", |m| m.as_str());
    let items: Vec<SelectItem<'_>> = split_top_level(&select_clause[modifier.len()..])
        .into_iter()
        .map(SelectItem::parse)
        .collect();
    let group_clause = group_match.as_str().trim_end();
    let group = GroupKeys::parse(group_clause);

    let missing: Vec<&SelectItem<'_>> = items
        .iter()
        .enumerate()
        .filter(|(i, item)| item.needs_grouping() && !item.is_grouped(i + 1, &group))
        .map(|(_, item)| item)
        .collect();

    if missing.is_empty() {
        return RepairResult::unchanged(sql);
    }

    let missing_names: Vec<String> = missing.iter().map(|item| item.bare.to_string()).collect();
    warn!(missing = ?missing_names, "SELECT columns not in GROUP BY");

    if AGGREGATE_CALL.is_match(sql) {
        // Positions of the surviving items, 1-based, old to new
        let mut renumbered = HashMap::new();
        let mut kept: Vec<&str> = Vec::new();
        for (i, item) in items.iter().enumerate() {
            if item.aggregate || !item.needs_grouping() || item.is_grouped(i + 1, &group) {
                kept.push(item.text);
                renumbered.insert(i + 1, kept.len());
            }
        }

        if !kept.is_empty() {
            let new_select = format!("{}{}", modifier, kept.join(", "));
            debug!(select = %new_select, "Shrinking SELECT to grouped columns");
            let mut fixed = sql.to_string();
            let group_follows = group_match.start() >= select_match.end();
            if let Some(new_group) = renumber_ordinals(group_clause, &renumbered)
                .filter(|_| group_follows)
            {
                let range = group_match.start()..group_match.start() + group_clause.len();
                fixed = splice(&fixed, range, &new_group);
            }
            return RepairResult {
                sql: splice(&fixed, select_match.range(), &new_select),
                action: RepairAction::ShrunkSelect,
                message: SHRUNK_SELECT_MESSAGE.to_string(),
                missing: missing_names,
                unresolved: Vec::new(),
            };
        }
    }

    let (simple, complex): (Vec<&SelectItem<'_>>, Vec<&SelectItem<'_>>) = missing
        .iter()
        .copied()
        .partition(|item| !OPERATOR.is_match(item.bare));

    if !simple.is_empty() {
        let additions: Vec<&str> = simple
            .iter()
            .map(|item| {
                let key = column_key(item.bare);
                items
                    .iter()
                    .find(|other| other.expr.contains('.') && column_key(other.bare) == key)
                    .map_or(item.expr, |other| other.expr)
            })
            .collect();

        let new_group = format!("{}, {}", group_clause, additions.join(", "));
        debug!(group_by = %new_group, "Growing GROUP BY to match SELECT");
        let range = group_match.start()..group_match.start() + group_clause.len();
        let unresolved: Vec<String> = complex.iter().map(|item| item.bare.to_string()).collect();
        let message = if unresolved.is_empty() {
            GREW_GROUP_BY_MESSAGE.to_string()
        } else {
            format!(
                "{}; SELECT columns still not in GROUP BY: {}",
                GREW_GROUP_BY_MESSAGE,
                unresolved.join(", ")
            )
        };
        return RepairResult {
            sql: splice(sql, range, &new_group),
            action: RepairAction::GrewGroupBy,
            message,
            missing: missing_names,
            unresolved,
        };
    }

    RepairResult {
        sql: sql.to_string(),
        action: RepairAction::Unrepaired,
        message: format!(
            "SQL validation failed: SELECT columns not in GROUP BY: {}",
            missing_names.join(", ")
        ),
        unresolved: missing_names.clone(),
        missing: missing_names,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_fixed_point(sql: &str) {
        let again = repair_group_by(sql);
        assert_eq!(again.action, RepairAction::Unchanged, "not a fixed point: {}", sql);
        assert_eq!(again.sql, sql);
    }

    #[test]
    fn test_valid_query_unchanged() {
        let sql = "SELECT Year, SUM(Sales) FROM T GROUP BY Year";
        let result = repair_group_by(sql);
        assert_eq!(result.sql, sql);
        assert_eq!(result.action, RepairAction::Unchanged);
        assert_eq!(result.message, PASSED_MESSAGE);
        assert!(result.is_valid());
    }

    #[test]
    fn test_no_group_by_unchanged() {
        let sql = "SELECT Region, Sales FROM T WHERE Year = 2024";
        assert_eq!(repair_group_by(sql).action, RepairAction::Unchanged);
        assert_eq!(repair_group_by("not sql at all").action, RepairAction::Unchanged);
    }

    #[test]
    fn test_shrinks_select_when_aggregated() {
        let result = repair_group_by("SELECT Year, Region, SUM(Sales) FROM T GROUP BY Year");
        assert_eq!(result.sql, "SELECT Year, SUM(Sales) FROM T GROUP BY Year");
        assert_eq!(result.action, RepairAction::ShrunkSelect);
        assert_eq!(result.message, SHRUNK_SELECT_MESSAGE);
        assert_eq!(result.missing, vec!["Region"]);
        assert_fixed_point(&result.sql);
    }

    #[test]
    fn test_shrink_keeps_aliases_and_modifier() {
        let sql = "SELECT DISTINCT t.Year AS Yr, c.Name, COUNT(*) AS Orders \
                   FROM Orders t JOIN Customers c ON c.Id = t.CustomerId \
                   GROUP BY t.Year ORDER BY Yr";
        let result = repair_group_by(sql);
        assert_eq!(
            result.sql,
            "SELECT DISTINCT t.Year AS Yr, COUNT(*) AS Orders \
             FROM Orders t JOIN Customers c ON c.Id = t.CustomerId \
             GROUP BY t.Year ORDER BY Yr"
        );
        assert_fixed_point(&result.sql);
    }

    #[test]
    fn test_grows_group_by_without_aggregate() {
        let sql = "SELECT s.Region, o.Year FROM Sales s JOIN Orders o ON o.Id = s.OrderId GROUP BY o.Year";
        let result = repair_group_by(sql);
        assert_eq!(
            result.sql,
            "SELECT s.Region, o.Year FROM Sales s JOIN Orders o ON o.Id = s.OrderId GROUP BY o.Year, s.Region"
        );
        assert_eq!(result.action, RepairAction::GrewGroupBy);
        assert_eq!(result.message, GREW_GROUP_BY_MESSAGE);
        assert_fixed_point(&result.sql);
    }

    #[test]
    fn test_grow_preserves_trailing_clauses() {
        let sql = "SELECT Region, Year FROM T GROUP BY Year ORDER BY Year LIMIT 10;";
        let result = repair_group_by(sql);
        assert_eq!(
            result.sql,
            "SELECT Region, Year FROM T GROUP BY Year, Region ORDER BY Year LIMIT 10;"
        );
        assert_eq!(result.action, RepairAction::GrewGroupBy);
        assert_fixed_point(&result.sql);
    }

    #[test]
    fn test_aggregate_in_having_prefers_shrink() {
        let sql = "SELECT Region, Year FROM T GROUP BY Year HAVING COUNT(*) > 1";
        let result = repair_group_by(sql);
        assert_eq!(result.sql, "SELECT Year FROM T GROUP BY Year HAVING COUNT(*) > 1");
        assert_eq!(result.action, RepairAction::ShrunkSelect);
    }

    #[test]
    fn test_falls_back_to_grow_when_nothing_kept() {
        let sql = "SELECT Region FROM T GROUP BY Year HAVING COUNT(*) > 1";
        let result = repair_group_by(sql);
        assert_eq!(result.sql, "SELECT Region FROM T GROUP BY Year, Region HAVING COUNT(*) > 1");
        assert_eq!(result.action, RepairAction::GrewGroupBy);
    }

    #[test]
    fn test_unrepairable_expression() {
        let sql = "SELECT YEAR(OrderDate) FROM T GROUP BY Region";
        let result = repair_group_by(sql);
        assert_eq!(result.sql, sql);
        assert_eq!(result.action, RepairAction::Unrepaired);
        assert!(!result.is_valid());
        assert_eq!(
            result.message,
            "SQL validation failed: SELECT columns not in GROUP BY: YEAR(OrderDate)"
        );
    }

    #[test]
    fn test_nested_commas_do_not_split() {
        let sql = "SELECT ROUND(AVG(Price), 2), COALESCE(Region, 'n/a, none') FROM T \
                   GROUP BY COALESCE(Region, 'n/a, none')";
        assert_eq!(repair_group_by(sql).action, RepairAction::Unchanged);
    }

    #[test]
    fn test_group_by_alias_and_ordinal() {
        let by_alias = "SELECT YEAR(OrderDate) AS Yr, SUM(Total) FROM T GROUP BY Yr";
        assert_eq!(repair_group_by(by_alias).action, RepairAction::Unchanged);

        let by_position = "SELECT Region, Year, SUM(Total) FROM T GROUP BY 1, 2";
        assert_eq!(repair_group_by(by_position).action, RepairAction::Unchanged);
    }

    #[test]
    fn test_shrink_renumbers_ordinals() {
        let result = repair_group_by("SELECT Name, Region, SUM(x) FROM T GROUP BY 2");
        assert_eq!(result.sql, "SELECT Region, SUM(x) FROM T GROUP BY 1");
        assert_eq!(result.action, RepairAction::ShrunkSelect);
        assert_fixed_point(&result.sql);

        let result = repair_group_by("SELECT Name, Region, Year, COUNT(*) FROM T GROUP BY 3, Region");
        assert_eq!(
            result.sql,
            "SELECT Region, Year, COUNT(*) FROM T GROUP BY 2, Region"
        );
        assert_fixed_point(&result.sql);
    }

    #[test]
    fn test_grow_adds_simple_columns_and_reports_expressions() {
        let sql = "SELECT Region, YEAR(OrderDate) FROM T GROUP BY Year";
        let result = repair_group_by(sql);
        assert_eq!(
            result.sql,
            "SELECT Region, YEAR(OrderDate) FROM T GROUP BY Year, Region"
        );
        assert_eq!(result.action, RepairAction::GrewGroupBy);
        assert_eq!(result.missing, vec!["Region", "YEAR(OrderDate)"]);
        assert_eq!(result.unresolved, vec!["YEAR(OrderDate)"]);
        assert_eq!(
            result.message,
            "Fixed GROUP BY issue: Added missing columns to GROUP BY; \
             SELECT columns still not in GROUP BY: YEAR(OrderDate)"
        );
        assert!(!result.is_valid());

        let again = repair_group_by(&result.sql);
        assert_eq!(again.sql, result.sql);
        assert_eq!(again.action, RepairAction::Unrepaired);
    }

    #[test]
    fn test_shrink_keeps_literals() {
        let sql = "SELECT 'total' AS Label, Name, Region, SUM(x) FROM T GROUP BY Region";
        let result = repair_group_by(sql);
        assert_eq!(
            result.sql,
            "SELECT 'total' AS Label, Region, SUM(x) FROM T GROUP BY Region"
        );
        assert_eq!(result.missing, vec!["Name"]);
        assert!(result.is_valid());
        assert_fixed_point(&result.sql);
    }

    #[test]
    fn test_case_and_delimiters_ignored() {
        let sql = "SELECT [dbo].[Sales].[Region], SUM(Amount) FROM dbo.Sales GROUP BY region";
        assert_eq!(repair_group_by(sql).action, RepairAction::Unchanged);
    }

    #[test]
    fn test_star_and_literals_not_grouped() {
        let sql = "SELECT 'total' AS Label, 1, COUNT(*) FROM T GROUP BY Region";
        let result = repair_group_by(sql);
        assert_eq!(result.action, RepairAction::Unchanged);
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("a, f(b, c), 'x,y', [p,q]"),
            vec!["a", "f(b, c)", "'x,y'", "[p,q]"]
        );
    }
}
