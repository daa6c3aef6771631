//! Translates list query strings (`?price[gte]=500&sort=-price&fields=name&page=2`)
//! into SQL clauses over a whitelisted set of columns.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{MySql, QueryBuilder};

use crate::errors::{AppError, AppResult};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 100;
pub const DEFAULT_SORT: &str = "-createdAt";

const RESERVED: [&str; 4] = ["page", "sort", "limit", "fields"];

/// Keys allowed to repeat in a query string (`?duration=5&duration=9`).
/// Any other repeated key keeps only its last value.
const REPEATABLE: [&str; 6] = [
    "duration",
    "ratingsQuantity",
    "ratingsAverage",
    "maxGroupSize",
    "difficulty",
    "price",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Number,
    Text,
    Bool,
    Timestamp,
}

/// A column a client may filter or sort on, by its public (camelCase) name.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub api: &'static str,
    pub sql: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn new(api: &'static str, sql: &'static str, kind: ColumnKind) -> Self {
        Self { api, sql, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Op {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "gt" => Some(Op::Gt),
            "gte" => Some(Op::Gte),
            "lt" => Some(Op::Lt),
            "lte" => Some(Op::Lte),
            _ => None,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Op::Eq => " = ",
            Op::Gt => " > ",
            Op::Gte => " >= ",
            Op::Lt => " < ",
            Op::Lte => " <= ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Integer(i64),
    Number(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl FilterValue {
    fn parse(column: &Column, raw: &str) -> AppResult<Self> {
        let invalid = || AppError::bad_request(format!("Invalid {}: {}", column.api, raw));
        let trimmed = raw.trim();
        Ok(match column.kind {
            ColumnKind::Integer => FilterValue::Integer(trimmed.parse().map_err(|_| invalid())?),
            ColumnKind::Number => {
                let n: f64 = trimmed.parse().map_err(|_| invalid())?;
                if !n.is_finite() {
                    return Err(invalid());
                }
                FilterValue::Number(n)
            }
            ColumnKind::Text => FilterValue::Text(raw.to_string()),
            ColumnKind::Bool => match trimmed {
                "true" | "1" => FilterValue::Bool(true),
                "false" | "0" => FilterValue::Bool(false),
                _ => return Err(invalid()),
            },
            ColumnKind::Timestamp => FilterValue::Timestamp(parse_timestamp(trimmed).ok_or_else(invalid)?),
        })
    }

    fn push_bind(&self, qb: &mut QueryBuilder<'static, MySql>) {
        match self {
            FilterValue::Integer(v) => qb.push_bind(*v),
            FilterValue::Number(v) => qb.push_bind(*v),
            FilterValue::Text(v) => qb.push_bind(v.clone()),
            FilterValue::Bool(v) => qb.push_bind(*v),
            FilterValue::Timestamp(v) => qb.push_bind(*v),
        };
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        column: &'static str,
        op: Op,
        value: FilterValue,
    },
    In {
        column: &'static str,
        values: Vec<FilterValue>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: &'static str,
    pub descending: bool,
}

/// Parsed list features for one request.
#[derive(Debug, Clone)]
pub struct ApiFeatures {
    pub conditions: Vec<Condition>,
    pub sort: Vec<SortKey>,
    pub fields: Option<Vec<String>>,
    pub page: u64,
    pub limit: u64,
}

impl ApiFeatures {
    pub fn parse(pairs: &[(String, String)], columns: &[Column]) -> AppResult<Self> {
        // Group values per key, keeping first-seen key order.
        let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
        for (key, value) in pairs {
            match grouped.iter_mut().find(|(k, _)| *k == key.as_str()) {
                Some((_, values)) => values.push(value.as_str()),
                None => grouped.push((key.as_str(), vec![value.as_str()])),
            }
        }

        let last = |name: &str| {
            grouped
                .iter()
                .find(|(k, _)| *k == name)
                .and_then(|(_, values)| values.last().copied())
        };

        let mut conditions = Vec::new();
        for (key, values) in &grouped {
            if RESERVED.contains(key) {
                continue;
            }
            let (name, op) = split_operator(key)?;
            let column = lookup(columns, name)?;

            if op == Op::Eq && values.len() > 1 && REPEATABLE.contains(&name) {
                let values = values
                    .iter()
                    .map(|raw| FilterValue::parse(column, raw))
                    .collect::<AppResult<Vec<_>>>()?;
                conditions.push(Condition::In {
                    column: column.sql,
                    values,
                });
            } else if let Some(raw) = values.last() {
                conditions.push(Condition::Compare {
                    column: column.sql,
                    op,
                    value: FilterValue::parse(column, raw)?,
                });
            }
        }

        let sort = last("sort")
            .filter(|raw| raw.split(',').any(|item| !item.trim().is_empty()))
            .unwrap_or(DEFAULT_SORT);
        let sort = parse_sort(sort, columns)?;

        let fields = last("fields").map(|raw| {
            raw.split(',')
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect::<Vec<_>>()
        });

        Ok(Self {
            conditions,
            sort,
            fields: fields.filter(|f| !f.is_empty()),
            page: positive_or(last("page"), DEFAULT_PAGE),
            limit: positive_or(last("limit"), DEFAULT_LIMIT),
        })
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Starts `SELECT <select> FROM <table> WHERE 1=1` with an optional scope predicate
    /// and parent filter, then appends this request's filters, ordering and paging.
    pub fn build_select(
        &self,
        select: &str,
        table: &str,
        scope: Option<&str>,
        parent: Option<(&'static str, i64)>,
    ) -> QueryBuilder<'static, MySql> {
        let mut qb = QueryBuilder::new(format!("SELECT {} FROM {} WHERE 1=1", select, table));
        if let Some(scope) = scope {
            qb.push(" AND ").push(scope);
        }
        if let Some((column, id)) = parent {
            qb.push(" AND ").push(column).push(" = ").push_bind(id);
        }
        self.push_filters(&mut qb);
        self.push_order_and_page(&mut qb);
        qb
    }

    pub fn push_filters(&self, qb: &mut QueryBuilder<'static, MySql>) {
        for condition in &self.conditions {
            qb.push(" AND ");
            match condition {
                Condition::Compare { column, op, value } => {
                    qb.push(*column).push(op.sql());
                    value.push_bind(qb);
                }
                Condition::In { column, values } => {
                    qb.push(*column).push(" IN (");
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            qb.push(", ");
                        }
                        value.push_bind(qb);
                    }
                    qb.push(")");
                }
            }
        }
    }

    pub fn push_order_and_page(&self, qb: &mut QueryBuilder<'static, MySql>) {
        qb.push(" ORDER BY ");
        for (i, key) in self.sort.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(key.column).push(if key.descending { " DESC" } else { " ASC" });
        }
        if !self.sort.iter().any(|k| k.column == "id") {
            qb.push(if self.sort.is_empty() { "id ASC" } else { ", id ASC" });
        }
        qb.push(" LIMIT ").push_bind(self.limit).push(" OFFSET ").push_bind(self.skip());
    }

    /// Applies `fields=` to serialized documents. `id` is always kept.
    pub fn project(&self, docs: Vec<Value>) -> Vec<Value> {
        let Some(fields) = &self.fields else {
            return docs;
        };
        docs.into_iter()
            .map(|doc| match doc {
                Value::Object(map) => Value::Object(
                    map.into_iter()
                        .filter(|(k, _)| k == "id" || fields.iter().any(|f| f == k))
                        .collect(),
                ),
                other => other,
            })
            .collect()
    }
}

/// Replaces (or adds) query pairs, as an alias route does before listing.
pub fn override_pairs(pairs: &mut Vec<(String, String)>, overrides: &[(&str, &str)]) {
    for (key, value) in overrides {
        pairs.retain(|(k, _)| k != key);
        pairs.push((key.to_string(), value.to_string()));
    }
}

fn split_operator(key: &str) -> AppResult<(&str, Op)> {
    match key.split_once('[') {
        Some((name, rest)) => {
            let op = rest
                .strip_suffix(']')
                .and_then(Op::parse)
                .ok_or_else(|| AppError::bad_request(format!("Invalid filter operator: {}", key)))?;
            Ok((name, op))
        }
        None => Ok((key, Op::Eq)),
    }
}

fn lookup<'c>(columns: &'c [Column], name: &str) -> AppResult<&'c Column> {
    columns
        .iter()
        .find(|c| c.api == name)
        .ok_or_else(|| AppError::bad_request(format!("Invalid field: {}", name)))
}

fn parse_sort(raw: &str, columns: &[Column]) -> AppResult<Vec<SortKey>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| {
            let (name, descending) = match item.strip_prefix('-') {
                Some(name) => (name, true),
                None => (item, false),
            };
            let column = lookup(columns, name)?;
            Ok(SortKey {
                column: column.sql,
                descending,
            })
        })
        .collect()
}

fn positive_or(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[Column] = &[
        Column::new("id", "id", ColumnKind::Integer),
        Column::new("name", "name", ColumnKind::Text),
        Column::new("duration", "duration", ColumnKind::Integer),
        Column::new("price", "price", ColumnKind::Number),
        Column::new("ratingsAverage", "ratings_average", ColumnKind::Number),
        Column::new("difficulty", "difficulty", ColumnKind::Text),
        Column::new("secretTour", "secret_tour", ColumnKind::Bool),
        Column::new("createdAt", "created_at", ColumnKind::Timestamp),
    ];

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_sort_by_newest_and_first_page() {
        let features = ApiFeatures::parse(&[], COLUMNS).unwrap();
        assert!(features.conditions.is_empty());
        assert_eq!(
            features.sort,
            vec![SortKey {
                column: "created_at",
                descending: true
            }]
        );
        assert_eq!(features.page, 1);
        assert_eq!(features.limit, 100);
        assert_eq!(features.skip(), 0);
        assert!(features.fields.is_none());
    }

    #[test]
    fn blank_sort_keeps_the_default_order() {
        for raw in ["", " ", ","] {
            let features = ApiFeatures::parse(&pairs(&[("sort", raw)]), COLUMNS).unwrap();
            assert_eq!(
                features.sort,
                vec![SortKey {
                    column: "created_at",
                    descending: true
                }]
            );
        }

        let qb = ApiFeatures::parse(&pairs(&[("sort", "")]), COLUMNS)
            .unwrap()
            .build_select("id", "tours", None, None);
        assert!(qb.sql().contains("ORDER BY created_at DESC, id ASC"));
    }

    #[test]
    fn parses_comparison_operators() {
        let features = ApiFeatures::parse(
            &pairs(&[("price[gte]", "500"), ("duration[lt]", "10"), ("difficulty", "easy")]),
            COLUMNS,
        )
        .unwrap();
        assert_eq!(
            features.conditions,
            vec![
                Condition::Compare {
                    column: "price",
                    op: Op::Gte,
                    value: FilterValue::Number(500.0)
                },
                Condition::Compare {
                    column: "duration",
                    op: Op::Lt,
                    value: FilterValue::Integer(10)
                },
                Condition::Compare {
                    column: "difficulty",
                    op: Op::Eq,
                    value: FilterValue::Text("easy".into())
                },
            ]
        );
    }

    #[test]
    fn whitelisted_keys_may_repeat_others_keep_last() {
        let features = ApiFeatures::parse(
            &pairs(&[("duration", "5"), ("duration", "9"), ("name", "a"), ("name", "b"), ("sort", "price"), ("sort", "-duration")]),
            COLUMNS,
        )
        .unwrap();
        assert_eq!(
            features.conditions[0],
            Condition::In {
                column: "duration",
                values: vec![FilterValue::Integer(5), FilterValue::Integer(9)]
            }
        );
        assert_eq!(
            features.conditions[1],
            Condition::Compare {
                column: "name",
                op: Op::Eq,
                value: FilterValue::Text("b".into())
            }
        );
        assert_eq!(
            features.sort,
            vec![SortKey {
                column: "duration",
                descending: true
            }]
        );
    }

    #[test]
    fn rejects_unknown_fields_and_bad_values() {
        let err = ApiFeatures::parse(&pairs(&[("password", "x")]), COLUMNS).unwrap_err();
        assert_eq!(err.message, "Invalid field: password");

        let err = ApiFeatures::parse(&pairs(&[("price[gte]", "cheap")]), COLUMNS).unwrap_err();
        assert_eq!(err.message, "Invalid price: cheap");

        let err = ApiFeatures::parse(&pairs(&[("price[ne]", "1")]), COLUMNS).unwrap_err();
        assert_eq!(err.message, "Invalid filter operator: price[ne]");

        let err = ApiFeatures::parse(&pairs(&[("sort", "-bogus")]), COLUMNS).unwrap_err();
        assert_eq!(err.message, "Invalid field: bogus");
    }

    #[test]
    fn pagination_falls_back_on_garbage() {
        let features = ApiFeatures::parse(&pairs(&[("page", "3"), ("limit", "10")]), COLUMNS).unwrap();
        assert_eq!(features.skip(), 20);

        let features = ApiFeatures::parse(&pairs(&[("page", "zero"), ("limit", "0")]), COLUMNS).unwrap();
        assert_eq!(features.page, 1);
        assert_eq!(features.limit, 100);
    }

    #[test]
    fn parses_timestamps_and_bools() {
        let features = ApiFeatures::parse(
            &pairs(&[("createdAt[gte]", "2021-03-01"), ("secretTour", "false")]),
            COLUMNS,
        )
        .unwrap();
        match &features.conditions[0] {
            Condition::Compare {
                value: FilterValue::Timestamp(ts),
                ..
            } => assert_eq!(ts.to_rfc3339(), "2021-03-01T00:00:00+00:00"),
            other => panic!("unexpected condition {:?}", other),
        }
        assert_eq!(
            features.conditions[1],
            Condition::Compare {
                column: "secret_tour",
                op: Op::Eq,
                value: FilterValue::Bool(false)
            }
        );
    }

    #[test]
    fn builds_select_sql() {
        let features = ApiFeatures::parse(
            &pairs(&[("price[lte]", "1000"), ("difficulty", "easy"), ("difficulty", "medium"), ("sort", "-ratingsAverage,price"), ("page", "2"), ("limit", "5")]),
            COLUMNS,
        )
        .unwrap();
        let qb = features.build_select("*", "tours", Some("secret_tour = FALSE"), None);
        assert_eq!(
            qb.sql(),
            "SELECT * FROM tours WHERE 1=1 AND secret_tour = FALSE AND price <= ? AND difficulty IN (?, ?) \
             ORDER BY ratings_average DESC, price ASC, id ASC LIMIT ? OFFSET ?"
        );
    }

    #[test]
    fn parent_filter_is_bound() {
        let features = ApiFeatures::parse(&[], COLUMNS).unwrap();
        let qb = features.build_select("id", "reviews", None, Some(("tour_id", 3)));
        assert_eq!(
            qb.sql(),
            "SELECT id FROM reviews WHERE 1=1 AND tour_id = ? ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?"
        );
    }

    #[test]
    fn projects_requested_fields_and_id() {
        let features = ApiFeatures::parse(&pairs(&[("fields", "name,price")]), COLUMNS).unwrap();
        let docs = vec![json!({ "id": 1, "name": "The Forest Hiker", "price": 397, "duration": 5 })];
        assert_eq!(
            features.project(docs),
            vec![json!({ "id": 1, "name": "The Forest Hiker", "price": 397 })]
        );
    }

    #[test]
    fn overrides_replace_existing_pairs() {
        let mut p = pairs(&[("limit", "50"), ("difficulty", "easy")]);
        override_pairs(&mut p, &[("limit", "5"), ("sort", "-ratingsAverage,price")]);
        assert_eq!(
            p,
            pairs(&[("difficulty", "easy"), ("limit", "5"), ("sort", "-ratingsAverage,price")])
        );
    }
}
