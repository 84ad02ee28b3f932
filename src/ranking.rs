//! Ranked supplement listing.
//!
//! Computes, per supplement, the average score and rating count over exactly
//! the ratings matching the compiled filter predicate, and returns a stable,
//! deterministically ordered page. The predicate lives *inside* the
//! conditional aggregates — it restricts which ratings are averaged, never
//! which supplements are returned, so a supplement whose ratings all miss
//! the filter still appears (with a null average) rather than vanishing.

use std::collections::HashMap;

use rusqlite::params_from_iter;
use rusqlite::types::Value;
use serde::Serialize;

use crate::filters::{self, CompiledFilter};
use crate::storage::{Storage, StorageError};

/// Columns a caller may sort by directly. Anything else falls back to the
/// default rating ordering; caller strings never reach ORDER BY verbatim.
const SORTABLE_COLUMNS: &[&str] = &["name", "category", "dosage_unit", "created_at"];

/// Requested ordering for the ranked listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    /// Average score, nulls last, count and name as tie-breaks. The default.
    HighestRating,
    /// Rating count first, then the null-aware average.
    MostRatings,
    /// A whitelisted supplement column, ascending or descending.
    Field { column: String, descending: bool },
}

impl SortKey {
    /// Parse a `sort_by` query value: `highest_rating`, `most_ratings`, or
    /// `<column>:<asc|desc>`. Unknown values mean the default ordering.
    pub fn parse(raw: Option<&str>) -> SortKey {
        let raw = match raw {
            Some(r) => r.trim(),
            None => return SortKey::HighestRating,
        };
        match raw {
            "" | "highest_rating" => SortKey::HighestRating,
            "most_ratings" => SortKey::MostRatings,
            other => {
                let (column, order) = match other.split_once(':') {
                    Some((c, o)) => (c, o),
                    None => (other, "asc"),
                };
                if SORTABLE_COLUMNS.contains(&column) {
                    SortKey::Field {
                        column: column.to_string(),
                        descending: order.eq_ignore_ascii_case("desc"),
                    }
                } else {
                    SortKey::HighestRating
                }
            }
        }
    }

    /// ORDER BY clause for this key. Every variant ends on `s.name ASC` (and
    /// then `s.id`) so the total ordering is stable and paging twice with
    /// the same query never skips or duplicates a row. Null averages sort
    /// last regardless of direction.
    fn order_clause(&self) -> String {
        match self {
            SortKey::HighestRating => {
                "(avg_rating IS NULL) ASC, avg_rating DESC, rating_count DESC, s.name ASC, s.id ASC"
                    .to_string()
            }
            SortKey::MostRatings => {
                "rating_count DESC, (avg_rating IS NULL) ASC, avg_rating DESC, s.name ASC, s.id ASC"
                    .to_string()
            }
            SortKey::Field { column, descending } => {
                let dir = if *descending { "DESC" } else { "ASC" };
                format!("(s.{column} IS NULL) ASC, s.{column} {dir}, s.name ASC, s.id ASC")
            }
        }
    }
}

/// One ranked supplement. `avg_rating` is `None` (never zero) when no rating
/// matched the filters, and is rounded to two decimals otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct SupplementSummary {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub dosage_unit: Option<String>,
    pub avg_rating: Option<f64>,
    pub rating_count: u32,
}

/// An offset/limit page with the total row count for the query.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u32,
    pub offset: u32,
    pub limit: u32,
}

/// Ranking request: rating-level filters, an optional supplement-name
/// substring search, ordering, and pagination. Offset and limit arrive
/// already bounded by the caller.
#[derive(Debug, Clone)]
pub struct RankQuery {
    pub filters: HashMap<String, String>,
    pub name_search: Option<String>,
    pub sort: SortKey,
    pub offset: u32,
    pub limit: u32,
}

impl Default for RankQuery {
    fn default() -> Self {
        Self {
            filters: HashMap::new(),
            name_search: None,
            sort: SortKey::HighestRating,
            offset: 0,
            limit: 50,
        }
    }
}

/// Run the ranking query and return one page of supplement summaries.
pub fn rank(storage: &Storage, query: &RankQuery) -> Result<Page<SupplementSummary>, StorageError> {
    let predicate = filters::compile(&query.filters);
    let (sql, binds) = build_sql(query, &predicate);

    let conn = storage.conn();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(binds), |row| {
        let avg: Option<f64> = row.get(5)?;
        Ok(SupplementSummary {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            dosage_unit: row.get(3)?,
            rating_count: row.get::<_, i64>(4)? as u32,
            avg_rating: avg.map(|a| (a * 100.0).round() / 100.0),
        })
    })?;

    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }

    let total = count_total(storage, query)?;
    Ok(Page {
        items,
        total,
        offset: query.offset,
        limit: query.limit,
    })
}

fn build_sql(query: &RankQuery, predicate: &CompiledFilter) -> (String, Vec<Value>) {
    let pred = &predicate.sql;
    let mut sql = format!(
        "SELECT s.id, s.name, s.category, s.dosage_unit,
                COUNT(DISTINCT CASE WHEN {pred} THEN r.id END) AS rating_count,
                AVG(CASE WHEN {pred} THEN CAST(r.score AS REAL) END) AS avg_rating
         FROM supplements s
         LEFT JOIN ratings r ON r.supplement_id = s.id"
    );

    // The predicate appears once per aggregate, so its binds do too.
    let mut binds: Vec<Value> = Vec::new();
    binds.extend(predicate.binds.iter().cloned());
    binds.extend(predicate.binds.iter().cloned());

    if let Some(name) = query.name_search.as_deref().map(str::trim) {
        if !name.is_empty() {
            sql.push_str(" WHERE LOWER(s.name) LIKE '%' || LOWER(?) || '%'");
            binds.push(Value::Text(name.to_string()));
        }
    }

    sql.push_str(" GROUP BY s.id ORDER BY ");
    sql.push_str(&query.sort.order_clause());
    sql.push_str(" LIMIT ? OFFSET ?");
    binds.push(Value::Integer(query.limit as i64));
    binds.push(Value::Integer(query.offset as i64));

    (sql, binds)
}

/// Total supplement count for the query. Rating filters restrict what gets
/// aggregated, not which supplements exist, so only the name search narrows
/// the total.
fn count_total(storage: &Storage, query: &RankQuery) -> Result<u32, StorageError> {
    let conn = storage.conn();
    let total: i64 = match query.name_search.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => conn.query_row(
            "SELECT COUNT(*) FROM supplements WHERE LOWER(name) LIKE '%' || LOWER(?1) || '%'",
            [name],
            |row| row.get(0),
        )?,
        _ => conn.query_row("SELECT COUNT(*) FROM supplements", [], |row| row.get(0))?,
    };
    Ok(total as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_parsing() {
        assert_eq!(SortKey::parse(None), SortKey::HighestRating);
        assert_eq!(SortKey::parse(Some("highest_rating")), SortKey::HighestRating);
        assert_eq!(SortKey::parse(Some("most_ratings")), SortKey::MostRatings);
        assert_eq!(
            SortKey::parse(Some("name:desc")),
            SortKey::Field {
                column: "name".to_string(),
                descending: true
            }
        );
        assert_eq!(
            SortKey::parse(Some("category")),
            SortKey::Field {
                column: "category".to_string(),
                descending: false
            }
        );
        // Unknown fields never reach ORDER BY
        assert_eq!(SortKey::parse(Some("upvote_count;--")), SortKey::HighestRating);
    }

    #[test]
    fn test_order_clause_always_ends_in_stable_tiebreak() {
        for key in [
            SortKey::HighestRating,
            SortKey::MostRatings,
            SortKey::Field {
                column: "category".to_string(),
                descending: true,
            },
        ] {
            let clause = key.order_clause();
            assert!(clause.ends_with("s.name ASC, s.id ASC"), "{clause}");
        }
    }
}
