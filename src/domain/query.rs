//! Live query constraints and their canonical identity.
//!
//! Two queries built independently from the same collection and constraint
//! list produce the same [`QueryKey`]. Subscribers compare keys, never the
//! constraint values themselves, when deciding whether to resubscribe.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use super::LiveRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "in")]
    In,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "==",
            FilterOp::NotEq => "!=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::In => "in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// One query constraint. Order within a query is significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    Where {
        field: String,
        op: FilterOp,
        value: Value,
    },
    OrderBy {
        field: String,
        direction: SortDirection,
    },
    Limit {
        count: usize,
    },
}

impl Constraint {
    pub fn where_eq(field: &str, value: impl Into<Value>) -> Self {
        Constraint::Where {
            field: field.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn filter(field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        Constraint::Where {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn order_by(field: &str, direction: SortDirection) -> Self {
        Constraint::OrderBy {
            field: field.to_string(),
            direction,
        }
    }

    pub fn limit(count: usize) -> Self {
        Constraint::Limit { count }
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Constraint::Where { field, op, value } => {
                out.push_str("where(");
                write_quoted(field, out);
                out.push(',');
                out.push_str(op.as_str());
                out.push(',');
                write_canonical_value(value, out);
                out.push(')');
            }
            Constraint::OrderBy { field, direction } => {
                out.push_str("orderBy(");
                write_quoted(field, out);
                out.push(',');
                out.push_str(direction.as_str());
                out.push(')');
            }
            Constraint::Limit { count } => {
                out.push_str("limit(");
                out.push_str(&count.to_string());
                out.push(')');
            }
        }
    }
}

/// Content-derived identity of a live query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collection name plus ordered constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionQuery {
    pub collection: String,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl CollectionQuery {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            constraints: Vec::new(),
        }
    }

    pub fn with(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(Constraint::where_eq(field, value))
    }

    pub fn order_by(self, field: &str, direction: SortDirection) -> Self {
        self.with(Constraint::order_by(field, direction))
    }

    pub fn limit(self, count: usize) -> Self {
        self.with(Constraint::limit(count))
    }

    /// Canonical identity: `collection?c1&c2&...`
    pub fn key(&self) -> QueryKey {
        let mut out = String::with_capacity(64);
        out.push_str(&self.collection);
        out.push('?');
        for (i, constraint) in self.constraints.iter().enumerate() {
            if i > 0 {
                out.push('&');
            }
            constraint.write_canonical(&mut out);
        }
        QueryKey(out)
    }

    pub fn matches(&self, record: &LiveRecord) -> bool {
        self.constraints.iter().all(|c| match c {
            Constraint::Where { field, op, value } => {
                record_matches(record.field(field), *op, value)
            }
            // A record without an ordering field is excluded from ordered results.
            Constraint::OrderBy { field, .. } => record.field(field).is_some(),
            Constraint::Limit { .. } => true,
        })
    }

    /// Evaluate the query against a full collection: filter, order, limit.
    pub fn apply<'a, I>(&self, records: I) -> Vec<LiveRecord>
    where
        I: IntoIterator<Item = &'a LiveRecord>,
    {
        let mut matched: Vec<LiveRecord> = records
            .into_iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();

        let sort_keys: Vec<(&str, SortDirection)> = self
            .constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::OrderBy { field, direction } => Some((field.as_str(), *direction)),
                _ => None,
            })
            .collect();

        if !sort_keys.is_empty() {
            matched.sort_by(|a, b| {
                for (field, direction) in &sort_keys {
                    let ord = total_order(a.field(field), b.field(field));
                    let ord = match direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let limit = self.constraints.iter().rev().find_map(|c| match c {
            Constraint::Limit { count } => Some(*count),
            _ => None,
        });
        if let Some(limit) = limit {
            matched.truncate(limit);
        }

        matched
    }
}

fn record_matches(actual: Option<&Value>, op: FilterOp, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return false;
    };

    match op {
        FilterOp::Eq => compare_values(actual, expected) == Some(Ordering::Equal),
        FilterOp::NotEq => compare_values(actual, expected) != Some(Ordering::Equal),
        FilterOp::Lt => compare_values(actual, expected) == Some(Ordering::Less),
        FilterOp::Lte => matches!(
            compare_values(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::Gt => compare_values(actual, expected) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(
            compare_values(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::In => match expected {
            Value::Array(options) => options
                .iter()
                .any(|o| compare_values(actual, o) == Some(Ordering::Equal)),
            _ => false,
        },
    }
}

/// Compare two values of the same JSON type. Mixed types are incomparable.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            (a == b).then_some(Ordering::Equal)
        }
        _ => None,
    }
}

fn type_rank(v: Option<&Value>) -> u8 {
    match v {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn total_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b))),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// JSON string literal, so separators inside names stay unambiguous.
fn write_quoted(text: &str, out: &mut String) {
    out.push_str(&Value::String(text.to_string()).to_string());
}

fn write_canonical_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_quoted(key, out);
                out.push(':');
                write_canonical_value(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_value(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
