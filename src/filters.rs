//! Filter compilation for the ranking query.
//!
//! Translates the request's filter parameters (comma-separated lists for the
//! multi-valued ones) into a single SQL predicate over the rating alias `r`,
//! plus its bind values. The predicate is ANDed across filter categories and
//! ORed within a category, and is designed to be embedded either inside an
//! EXISTS row filter or inside a conditional aggregate — the ranking engine
//! uses the aggregate form so the filter restricts which ratings are
//! averaged, not which supplements appear.

use std::collections::HashMap;

use rusqlite::types::Value;

use crate::storage::ConditionRole;

/// A compiled predicate: SQL fragment referencing the rating alias `r`, and
/// the bind values it consumes, in order.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    pub sql: String,
    pub binds: Vec<Value>,
}

impl CompiledFilter {
    /// A predicate matching every rating.
    pub fn match_all() -> Self {
        Self {
            sql: "1".to_string(),
            binds: Vec::new(),
        }
    }

    pub fn is_match_all(&self) -> bool {
        self.sql == "1"
    }
}

/// Compile a filter-parameter map into a single predicate. Unknown keys and
/// empty values are ignored; a malformed `frequency` value is a no-op rather
/// than an error. Bad filters must never make the ranking query fail.
pub fn compile(params: &HashMap<String, String>) -> CompiledFilter {
    let mut clauses: Vec<String> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();

    for (key, raw) in sorted(params) {
        match key {
            "conditions" => {
                push_condition_clause(&mut clauses, &mut binds, ConditionRole::Purpose, raw)
            }
            "benefits" => {
                push_condition_clause(&mut clauses, &mut binds, ConditionRole::Benefit, raw)
            }
            "side_effects" => {
                push_condition_clause(&mut clauses, &mut binds, ConditionRole::SideEffect, raw)
            }
            "brands" => push_brand_clause(&mut clauses, &mut binds, raw),
            "dosage" => {
                let value = raw.trim();
                if !value.is_empty() {
                    clauses.push("r.dosage = ?".to_string());
                    binds.push(Value::Text(value.to_string()));
                }
            }
            "frequency" => push_frequency_clause(&mut clauses, &mut binds, raw),
            _ => {}
        }
    }

    if clauses.is_empty() {
        CompiledFilter::match_all()
    } else {
        CompiledFilter {
            sql: clauses.join(" AND "),
            binds,
        }
    }
}

/// Deterministic clause order regardless of map iteration order, so the same
/// filter set always compiles to the same SQL (and the same prepared
/// statement cache entry).
fn sorted(params: &HashMap<String, String>) -> Vec<(&str, &str)> {
    let mut entries: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    entries.sort_by_key(|(k, _)| *k);
    entries
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Condition-set intersection for one role: the rating's linked condition
/// names (in that role) intersect the given list. Exact, case-sensitive name
/// match.
fn push_condition_clause(
    clauses: &mut Vec<String>,
    binds: &mut Vec<Value>,
    role: ConditionRole,
    raw: &str,
) {
    let names = split_list(raw);
    if names.is_empty() {
        return;
    }
    let placeholders = vec!["?"; names.len()].join(", ");
    clauses.push(format!(
        "EXISTS (SELECT 1 FROM rating_conditions rc
                 JOIN conditions c ON c.id = rc.condition_id
                 WHERE rc.rating_id = r.id AND rc.role = ?
                   AND c.name IN ({placeholders}))"
    ));
    binds.push(Value::Text(role.as_str().to_string()));
    for name in names {
        binds.push(Value::Text(name.to_string()));
    }
}

/// Brand filter over the denormalized comma-joined brand text:
/// case-insensitive substring match, OR across the given names. A rating
/// with brand text "Alpha, Beta" matches the filter value "alpha".
fn push_brand_clause(clauses: &mut Vec<String>, binds: &mut Vec<Value>, raw: &str) {
    let names = split_list(raw);
    if names.is_empty() {
        return;
    }
    let parts = vec!["LOWER(IFNULL(r.brands, '')) LIKE '%' || LOWER(?) || '%'"; names.len()];
    clauses.push(format!("({})", parts.join(" OR ")));
    for name in names {
        binds.push(Value::Text(name.to_string()));
    }
}

/// Composite `"<n>_<unit>"` frequency filter; both halves must match. Any
/// shape other than exactly two `_`-separated parts with a numeric first
/// half is ignored.
fn push_frequency_clause(clauses: &mut Vec<String>, binds: &mut Vec<Value>, raw: &str) {
    let parts: Vec<&str> = raw.trim().split('_').collect();
    let (n, unit) = match parts.as_slice() {
        [n, unit] if !n.is_empty() && !unit.is_empty() => (*n, *unit),
        _ => return,
    };
    let n: i64 = match n.parse() {
        Ok(n) => n,
        Err(_) => return,
    };
    clauses.push("r.dosage_frequency = ? AND r.frequency_unit = ?".to_string());
    binds.push(Value::Integer(n));
    binds.push(Value::Text(unit.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_map_matches_all() {
        let compiled = compile(&HashMap::new());
        assert!(compiled.is_match_all());
        assert!(compiled.binds.is_empty());
    }

    #[test]
    fn test_unknown_keys_and_empty_values_ignored() {
        let compiled = compile(&filters(&[
            ("sort_order", "desc"),
            ("conditions", ""),
            ("brands", " , , "),
        ]));
        assert!(compiled.is_match_all());
    }

    #[test]
    fn test_condition_filter_binds_role_and_names() {
        let compiled = compile(&filters(&[("conditions", "Sleep, Anxiety")]));
        assert!(compiled.sql.contains("rc.role = ?"));
        assert!(compiled.sql.contains("IN (?, ?)"));
        assert_eq!(
            compiled.binds,
            vec![
                Value::Text("purpose".to_string()),
                Value::Text("Sleep".to_string()),
                Value::Text("Anxiety".to_string()),
            ]
        );
    }

    #[test]
    fn test_categories_combine_with_and() {
        let compiled = compile(&filters(&[
            ("benefits", "Focus"),
            ("dosage", "200mg"),
        ]));
        assert!(compiled.sql.contains(" AND "));
        // benefits sorts before dosage: deterministic clause order
        assert_eq!(
            compiled.binds,
            vec![
                Value::Text("benefit".to_string()),
                Value::Text("Focus".to_string()),
                Value::Text("200mg".to_string()),
            ]
        );
    }

    #[test]
    fn test_brand_names_combine_with_or() {
        let compiled = compile(&filters(&[("brands", "Now, Thorne")]));
        assert!(compiled.sql.contains(" OR "));
        assert_eq!(compiled.binds.len(), 2);
    }

    #[test]
    fn test_frequency_composite() {
        let compiled = compile(&filters(&[("frequency", "2_daily")]));
        assert!(compiled.sql.contains("r.dosage_frequency = ?"));
        assert_eq!(
            compiled.binds,
            vec![Value::Integer(2), Value::Text("daily".to_string())]
        );
    }

    #[test]
    fn test_malformed_frequency_is_noop() {
        for raw in ["daily", "2_", "_daily", "x_daily", "2_daily_morning", ""] {
            let compiled = compile(&filters(&[("frequency", raw)]));
            assert!(compiled.is_match_all(), "expected no-op for {raw:?}");
        }
    }
}
