//! Materialized filter expressions.
//!
//! A `FilterExpr` only ever holds fields that passed schema validation; the
//! parser in `application::use_cases::filter_parser` is the sole producer.

use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Scalar {
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Number(n) => n.as_f64().map(Scalar::Number),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            _ => None,
        }
    }

    fn equals_json(&self, value: &Value) -> bool {
        match (self, value) {
            (Scalar::Text(expected), Value::String(actual)) => expected == actual,
            (Scalar::Number(expected), Value::Number(actual)) => {
                actual.as_f64().map(|a| a == *expected).unwrap_or(false)
            }
            (Scalar::Bool(expected), Value::Bool(actual)) => expected == actual,
            _ => false,
        }
    }

    fn cmp_json(&self, value: &Value) -> Option<Ordering> {
        match (self, value) {
            (Scalar::Number(bound), Value::Number(actual)) => {
                actual.as_f64().and_then(|a| a.partial_cmp(bound))
            }
            // Canonical date strings order lexicographically.
            (Scalar::Text(bound), Value::String(actual)) => Some(actual.as_str().cmp(bound.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Gte,
    Gt,
    Lte,
    Lt,
}

impl CompareOp {
    pub fn from_operator(op: &str) -> Option<Self> {
        match op {
            "$gte" => Some(CompareOp::Gte),
            "$gt" => Some(CompareOp::Gt),
            "$lte" => Some(CompareOp::Lte),
            "$lt" => Some(CompareOp::Lt),
            _ => None,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            CompareOp::Gte => ">=",
            CompareOp::Gt => ">",
            CompareOp::Lte => "<=",
            CompareOp::Lt => "<",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Gte => ordering != Ordering::Less,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Lte => ordering != Ordering::Greater,
            CompareOp::Lt => ordering == Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Equals(Scalar),
    OneOf(Vec<Scalar>),
    /// Case-insensitive substring test.
    Contains(String),
    Compare { op: CompareOp, value: Scalar },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    pub field: String,
    pub condition: Condition,
}

impl Predicate {
    pub fn new(field: impl Into<String>, condition: Condition) -> Self {
        Self {
            field: field.into(),
            condition,
        }
    }

    /// Evaluate against a JSON document. Arrays match when any element does.
    pub fn matches(&self, document: &Value) -> bool {
        let Some(value) = lookup_path(document, &self.field) else {
            return false;
        };
        match value {
            Value::Array(items) => items.iter().any(|item| self.matches_value(item)),
            other => self.matches_value(other),
        }
    }

    fn matches_value(&self, value: &Value) -> bool {
        match &self.condition {
            Condition::Equals(expected) => expected.equals_json(value),
            Condition::OneOf(options) => options.iter().any(|o| o.equals_json(value)),
            Condition::Contains(needle) => value
                .as_str()
                .map(|text| text.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
            Condition::Compare { op, value: bound } => bound
                .cmp_json(value)
                .map(|ordering| op.accepts(ordering))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterExpr {
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Leaf(Predicate),
}

impl FilterExpr {
    /// The filter produced by `{}`.
    pub fn match_all() -> Self {
        FilterExpr::And(Vec::new())
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, FilterExpr::And(children) if children.is_empty())
    }

    pub fn leaf(field: impl Into<String>, condition: Condition) -> Self {
        FilterExpr::Leaf(Predicate::new(field, condition))
    }

    pub fn matches(&self, document: &Value) -> bool {
        match self {
            FilterExpr::And(children) => children.iter().all(|c| c.matches(document)),
            // An empty $or matches nothing, same as the document store.
            FilterExpr::Or(children) => children.iter().any(|c| c.matches(document)),
            FilterExpr::Leaf(predicate) => predicate.matches(document),
        }
    }

    /// Every leaf predicate in depth-first order.
    pub fn predicates(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        self.collect_predicates(&mut out);
        out
    }

    fn collect_predicates<'a>(&'a self, out: &mut Vec<&'a Predicate>) {
        match self {
            FilterExpr::And(children) | FilterExpr::Or(children) => {
                for child in children {
                    child.collect_predicates(out);
                }
            }
            FilterExpr::Leaf(predicate) => out.push(predicate),
        }
    }

    /// Drop single-child combinators so `{"$and":[x]}` and `x` compare equal.
    pub fn simplify(self) -> Self {
        match self {
            FilterExpr::And(children) => {
                let mut children: Vec<_> = children.into_iter().map(FilterExpr::simplify).collect();
                if children.len() == 1 {
                    children.remove(0)
                } else {
                    FilterExpr::And(children)
                }
            }
            FilterExpr::Or(children) => {
                let mut children: Vec<_> = children.into_iter().map(FilterExpr::simplify).collect();
                if children.len() == 1 {
                    children.remove(0)
                } else {
                    FilterExpr::Or(children)
                }
            }
            leaf => leaf,
        }
    }
}

/// Resolve a dotted path such as `location.district`.
pub fn lookup_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
        .filter(|value| !value.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wayanad_project() -> Value {
        json!({
            "project_name": "Coffee Plantation Rehabilitation",
            "project_type": "Renovation",
            "allocated_budget": 2500000,
            "location": { "district": "Wayanad", "block": "Kalpetta" },
            "timeline": { "approval_date": "2024-02-10" },
            "beneficiaries": { "beneficiary_categories": ["Small Farmers", "SC/ST"] }
        })
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let expr = FilterExpr::leaf("location.district", Condition::Contains("WAYANAD".into()));
        assert!(expr.matches(&wayanad_project()));
    }

    #[test]
    fn test_compare_numbers_and_dates() {
        let doc = wayanad_project();
        let budget = FilterExpr::leaf(
            "allocated_budget",
            Condition::Compare {
                op: CompareOp::Gte,
                value: Scalar::Number(1_000_000.0),
            },
        );
        let approved_before = FilterExpr::leaf(
            "timeline.approval_date",
            Condition::Compare {
                op: CompareOp::Lt,
                value: Scalar::Text("2024-01-01".into()),
            },
        );
        assert!(budget.matches(&doc));
        assert!(!approved_before.matches(&doc));
    }

    #[test]
    fn test_array_field_matches_any_element() {
        let expr = FilterExpr::leaf(
            "beneficiaries.beneficiary_categories",
            Condition::Contains("farmers".into()),
        );
        assert!(expr.matches(&wayanad_project()));
    }

    #[test]
    fn test_missing_field_never_matches() {
        let expr = FilterExpr::leaf("location.village", Condition::Contains("a".into()));
        assert!(!expr.matches(&wayanad_project()));
    }

    #[test]
    fn test_match_all_and_empty_or() {
        assert!(FilterExpr::match_all().matches(&wayanad_project()));
        assert!(!FilterExpr::Or(vec![]).matches(&wayanad_project()));
    }

    #[test]
    fn test_simplify_unwraps_single_child() {
        let leaf = FilterExpr::leaf("status", Condition::Equals(Scalar::Text("Ongoing".into())));
        let wrapped = FilterExpr::And(vec![FilterExpr::Or(vec![leaf.clone()])]);
        assert_eq!(wrapped.simplify(), leaf);
    }

    #[test]
    fn test_predicates_depth_first() {
        let expr = FilterExpr::And(vec![
            FilterExpr::leaf("status", Condition::Equals(Scalar::Text("Ongoing".into()))),
            FilterExpr::Or(vec![
                FilterExpr::leaf("location.district", Condition::Contains("x".into())),
                FilterExpr::leaf("location.block", Condition::Contains("x".into())),
            ]),
        ]);
        let fields: Vec<_> = expr.predicates().iter().map(|p| p.field.as_str()).collect();
        assert_eq!(fields, vec!["status", "location.district", "location.block"]);
    }
}
