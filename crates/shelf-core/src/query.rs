//! Collection queries.
//!
//! A [`Query`] names one collection of the user namespace and optionally a
//! single filter, an ordering field, and a limit, the same shape the live
//! views need (`status == X`, `createdAt >= T`, newest first, top 5).
//! Backends may push a query down into their own query language;
//! [`Query::apply`] is the reference evaluation used by the in-memory store.
//!
//! As with the hosted document store this models, documents that lack the
//! filtered or ordered field are excluded from the result.

use std::cmp::Ordering;

use serde_json::Value;

use crate::models::Document;

/// A single-field predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Gte(String, Value),
}

impl Filter {
    pub fn field(&self) -> &str {
        match self {
            Filter::Eq(f, _) | Filter::Gte(f, _) => f,
        }
    }

    pub fn matches(&self, data: &Value) -> bool {
        match self {
            Filter::Eq(field, expected) => data.get(field).map_or(false, |v| v == expected),
            Filter::Gte(field, bound) => data
                .get(field)
                .and_then(|v| compare_values(v, bound))
                .map_or(false, |ord| ord != Ordering::Less),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filter: Option<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filter: None,
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Some(Filter::Eq(field.into(), value.into()));
        self
    }

    pub fn where_gte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Some(Filter::Gte(field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Evaluate against `docs`. Unordered results keep their input order.
    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut out: Vec<Document> = docs
            .into_iter()
            .filter(|d| self.filter.as_ref().map_or(true, |f| f.matches(&d.data)))
            .collect();

        if let Some((field, direction)) = &self.order_by {
            out.retain(|d| d.data.get(field).map_or(false, |v| !v.is_null()));
            out.sort_by(|a, b| {
                let ord = compare_values(&a.data[field.as_str()], &b.data[field.as_str()])
                    .unwrap_or(Ordering::Equal);
                match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }

        if let Some(n) = self.limit {
            out.truncate(n);
        }
        out
    }
}

/// Order two JSON scalars of the same kind. Mixed kinds are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs() -> Vec<Document> {
        vec![
            Document { id: "a".into(), data: json!({ "status": "Leyendo", "createdAt": "2026-10-01T00:00:00.000Z", "n": 3 }) },
            Document { id: "b".into(), data: json!({ "status": "Por Leer", "createdAt": "2026-10-05T00:00:00.000Z", "n": 1 }) },
            Document { id: "c".into(), data: json!({ "status": "Leyendo", "n": 2 }) },
            Document { id: "d".into(), data: json!({ "status": "Leyendo", "createdAt": "2026-09-01T00:00:00.000Z", "n": 10 }) },
        ]
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn equality_filter() {
        let q = Query::collection("userBooks").where_eq("status", "Leyendo");
        assert_eq!(ids(&q.apply(docs())), vec!["a", "c", "d"]);
    }

    #[test]
    fn range_filter_excludes_missing_field() {
        let q = Query::collection("readingSessions").where_gte("createdAt", "2026-10-01T00:00:00.000Z");
        assert_eq!(ids(&q.apply(docs())), vec!["a", "b"]);
    }

    #[test]
    fn order_and_limit() {
        let q = Query::collection("readingSessions")
            .order_by("createdAt", Direction::Desc)
            .limit(2);
        assert_eq!(ids(&q.apply(docs())), vec!["b", "a"]);

        let q = Query::collection("x").order_by("n", Direction::Asc);
        assert_eq!(ids(&q.apply(docs())), vec!["b", "c", "a", "d"]);
    }

    #[test]
    fn mixed_kinds_do_not_compare() {
        assert_eq!(compare_values(&json!(1), &json!("1")), None);
        assert!(!Filter::Gte("n".into(), json!("0")).matches(&json!({ "n": 5 })));
    }
}
