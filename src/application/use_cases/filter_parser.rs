//! Turns raw model output into a validated `FilterExpr`.
//!
//! Accepted grammar (a small subset of the document-store query language):
//! implicit AND across keys, `$and` / `$or` arrays, scalar equality, `$eq`,
//! `$in`, `$gte` / `$gt` / `$lte` / `$lt`, `$regex` with optional `$options`,
//! and `{"$date": "..."}` wrappers. Anything else is a `MalformedFilter`;
//! field paths outside the schema are an `UnknownField`.

use crate::domain::error::{AppError, Result};
use crate::domain::filter::{CompareOp, Condition, FilterExpr, Scalar};
use crate::domain::project::canonical_date;
use crate::domain::schema::{FieldKind, FieldSpec, SchemaDescriptor};
use crate::infrastructure::response::extract_json_payload;
use serde_json::{Map, Value};
use tracing::debug;

pub struct FilterParser {
    schema: SchemaDescriptor,
}

impl FilterParser {
    pub fn new(schema: SchemaDescriptor) -> Self {
        Self { schema }
    }

    /// Sanitize, parse and validate model output.
    pub fn parse(&self, raw: &str) -> Result<FilterExpr> {
        let payload = extract_json_payload(raw);
        let value: Value = serde_json::from_str(&payload)
            .map_err(|e| AppError::MalformedFilter(format!("Response is not valid JSON: {}", e)))?;
        let filter = self.parse_value(&value)?;
        debug!(
            predicates = filter.predicates().len(),
            match_all = filter.is_match_all(),
            "Parsed filter"
        );
        Ok(filter)
    }

    pub fn parse_value(&self, value: &Value) -> Result<FilterExpr> {
        match value {
            Value::Object(map) => Ok(self.parse_document(map)?.simplify()),
            other => Err(AppError::MalformedFilter(format!(
                "Filter must be a JSON object, got {}",
                json_type(other)
            ))),
        }
    }

    fn parse_document(&self, map: &Map<String, Value>) -> Result<FilterExpr> {
        let mut clauses = Vec::with_capacity(map.len());
        for (key, value) in map {
            match key.as_str() {
                "$and" => clauses.push(FilterExpr::And(self.parse_branches(key, value)?)),
                "$or" => clauses.push(FilterExpr::Or(self.parse_branches(key, value)?)),
                op if op.starts_with('$') => {
                    return Err(AppError::MalformedFilter(format!("Unsupported operator: {}", op)))
                }
                field => clauses.extend(self.parse_field(field, value)?),
            }
        }

        if clauses.len() == 1 {
            Ok(clauses.remove(0))
        } else {
            Ok(FilterExpr::And(clauses))
        }
    }

    fn parse_branches(&self, op: &str, value: &Value) -> Result<Vec<FilterExpr>> {
        let items = value
            .as_array()
            .filter(|items| !items.is_empty())
            .ok_or_else(|| AppError::MalformedFilter(format!("{} must hold a non-empty array", op)))?;

        items
            .iter()
            .map(|item| match item {
                Value::Object(map) => self.parse_document(map),
                other => Err(AppError::MalformedFilter(format!(
                    "{} entries must be objects, got {}",
                    op,
                    json_type(other)
                ))),
            })
            .collect()
    }

    fn parse_field(&self, field: &str, value: &Value) -> Result<Vec<FilterExpr>> {
        let field_spec = self
            .schema
            .field(field)
            .ok_or_else(|| AppError::UnknownField(field.to_string()))?;

        match value {
            Value::Object(ops) if !is_date_wrapper(ops) => parse_operators(field_spec, ops),
            operand => Ok(vec![FilterExpr::leaf(
                field_spec.path,
                Condition::Equals(field_operand(field_spec, operand)?),
            )]),
        }
    }
}

impl Default for FilterParser {
    fn default() -> Self {
        Self::new(SchemaDescriptor::projects())
    }
}

fn parse_operators(field_spec: &FieldSpec, ops: &Map<String, Value>) -> Result<Vec<FilterExpr>> {
    if ops.is_empty() {
        return Err(AppError::MalformedFilter(format!(
            "Empty condition object for {}",
            field_spec.path
        )));
    }

    let path = field_spec.path;
    let mut clauses = Vec::new();
    let mut saw_regex = false;

    for (op, operand) in ops {
        match op.as_str() {
            "$regex" => {
                saw_regex = true;
                if !accepts_pattern(field_spec.kind) {
                    return Err(AppError::MalformedFilter(format!(
                        "$regex is not allowed on {} field {}",
                        field_spec.kind.type_name(),
                        path
                    )));
                }
                let mut alternatives: Vec<FilterExpr> = regex_alternatives(path, operand)?
                    .into_iter()
                    .map(|needle| FilterExpr::leaf(path, Condition::Contains(needle)))
                    .collect();
                clauses.push(if alternatives.len() == 1 {
                    alternatives.remove(0)
                } else {
                    FilterExpr::Or(alternatives)
                });
            }
            "$options" => {
                if !operand.is_string() {
                    return Err(AppError::MalformedFilter(format!(
                        "$options on {} must be a string",
                        path
                    )));
                }
            }
            "$eq" => clauses.push(FilterExpr::leaf(
                path,
                Condition::Equals(field_operand(field_spec, operand)?),
            )),
            "$in" => {
                let items = operand.as_array().ok_or_else(|| {
                    AppError::MalformedFilter(format!("$in on {} must hold an array", path))
                })?;
                let values = items
                    .iter()
                    .map(|item| field_operand(field_spec, item))
                    .collect::<Result<Vec<_>>>()?;
                clauses.push(FilterExpr::leaf(path, Condition::OneOf(values)));
            }
            other => {
                let op = CompareOp::from_operator(other).ok_or_else(|| {
                    AppError::MalformedFilter(format!("Unsupported operator {} on {}", other, path))
                })?;
                if !field_spec.kind.is_ordered() {
                    return Err(AppError::MalformedFilter(format!(
                        "{} is not allowed on {} field {}",
                        other,
                        field_spec.kind.type_name(),
                        path
                    )));
                }
                let value = field_operand(field_spec, operand)?;
                if field_spec.kind == FieldKind::Number && !matches!(value, Scalar::Number(_)) {
                    return Err(AppError::MalformedFilter(format!(
                        "Comparison value for {} must be a number",
                        path
                    )));
                }
                clauses.push(FilterExpr::leaf(path, Condition::Compare { op, value }));
            }
        }
    }

    if ops.contains_key("$options") && !saw_regex {
        return Err(AppError::MalformedFilter(format!(
            "$options without $regex on {}",
            path
        )));
    }
    Ok(clauses)
}

/// Substring matching only makes sense on text-valued fields.
fn accepts_pattern(kind: FieldKind) -> bool {
    matches!(kind, FieldKind::Text | FieldKind::Enum(_) | FieldKind::TextList)
}

/// Resolve an operand for `field_spec`. Date fields only take values that
/// parse as dates, rewritten into the canonical stored form.
fn field_operand(field_spec: &FieldSpec, value: &Value) -> Result<Scalar> {
    let scalar = operand_scalar(field_spec.path, value)?;
    if field_spec.kind != FieldKind::Date {
        return Ok(scalar);
    }
    match &scalar {
        Scalar::Text(raw) => canonical_date(raw).map(Scalar::Text).ok_or_else(|| {
            AppError::MalformedFilter(format!(
                "{} is not a date for {} (expected YYYY-MM-DD or RFC 3339)",
                raw, field_spec.path
            ))
        }),
        _ => Err(AppError::MalformedFilter(format!(
            "Comparison value for {} must be a date string",
            field_spec.path
        ))),
    }
}

/// `$regex` operands are matched as case-insensitive substrings. Top-level
/// `|` splits alternatives (`\|` is a literal bar); in each alternative
/// anchors and `.*` wrappers are dropped and escapes are taken literally.
fn regex_alternatives(field: &str, operand: &Value) -> Result<Vec<String>> {
    let pattern = operand
        .as_str()
        .ok_or_else(|| AppError::MalformedFilter(format!("$regex on {} must be a string", field)))?;

    let alternatives: Vec<String> = split_unescaped_bars(pattern)
        .into_iter()
        .map(literal_from_regex)
        .filter(|alt| !alt.trim().is_empty())
        .collect();

    if alternatives.is_empty() {
        return Err(AppError::MalformedFilter(format!("Empty $regex on {}", field)));
    }
    Ok(alternatives)
}

fn split_unescaped_bars(pattern: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (idx, c) in pattern.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '|' => {
                parts.push(&pattern[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&pattern[start..]);
    parts
}

fn literal_from_regex(alternative: &str) -> String {
    let mut literal = alternative.trim();
    literal = literal.strip_prefix('^').unwrap_or(literal);
    literal = literal.strip_suffix('$').unwrap_or(literal);
    literal = literal.strip_prefix(".*").unwrap_or(literal);
    literal = literal.strip_suffix(".*").unwrap_or(literal);

    let mut out = String::with_capacity(literal.len());
    let mut chars = literal.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out.trim().to_string()
}

fn is_date_wrapper(ops: &Map<String, Value>) -> bool {
    ops.len() == 1 && ops.contains_key("$date")
}

fn date_scalar(field: &str, ops: &Map<String, Value>) -> Result<Scalar> {
    match ops.get("$date") {
        Some(Value::String(s)) => Ok(Scalar::Text(s.clone())),
        _ => Err(AppError::MalformedFilter(format!(
            "$date on {} must hold a string",
            field
        ))),
    }
}

fn operand_scalar(field: &str, value: &Value) -> Result<Scalar> {
    match value {
        Value::Object(ops) if is_date_wrapper(ops) => date_scalar(field, ops),
        other => scalar_for(field, other),
    }
}

fn scalar_for(field: &str, value: &Value) -> Result<Scalar> {
    Scalar::from_json(value).ok_or_else(|| {
        AppError::MalformedFilter(format!(
            "Comparison value for {} must be a string, number or boolean, got {}",
            field,
            json_type(value)
        ))
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::filter_prompt_builder::FILTER_EXAMPLES;
    use pretty_assertions::assert_eq;

    fn parse(raw: &str) -> Result<FilterExpr> {
        FilterParser::default().parse(raw)
    }

    fn contains(field: &str, needle: &str) -> FilterExpr {
        FilterExpr::leaf(field, Condition::Contains(needle.to_string()))
    }

    fn equals(field: &str, value: &str) -> FilterExpr {
        FilterExpr::leaf(field, Condition::Equals(Scalar::Text(value.to_string())))
    }

    #[test]
    fn test_wayanad_canonical_candidate_accepted() {
        let filter = parse(FILTER_EXAMPLES[3].filter).unwrap();
        assert_eq!(
            filter,
            FilterExpr::And(vec![
                FilterExpr::Or(vec![
                    contains("project_name", "agriculture"),
                    contains("project_description", "agriculture"),
                    equals("sector", "Agriculture and Allied Services"),
                ]),
                equals("project_type", "Renovation"),
                FilterExpr::Or(vec![
                    contains("location.district", "wayanad"),
                    contains("location.block", "wayanad"),
                    contains("location.panchayat", "wayanad"),
                ]),
            ])
        );
    }

    #[test]
    fn test_wayanad_unknown_field_candidates_rejected() {
        for raw in [
            r#"{"district": {"$regex": "wayanad", "$options": "i"}}"#,
            r#"{"location": {"district": "Wayanad"}}"#,
            r#"{"$and": [{"project_type": "Renovation"}, {"work_type": "agriculture"}]}"#,
            r#"{"_id": "66b1f0"}"#,
        ] {
            assert!(matches!(parse(raw), Err(AppError::UnknownField(_))), "{}", raw);
        }
    }

    #[test]
    fn test_all_prompt_examples_parse() {
        for example in FILTER_EXAMPLES {
            assert!(parse(example.filter).is_ok(), "{}", example.question);
        }
    }

    #[test]
    fn test_regex_options_rewritten_to_contains() {
        let filter = parse(r#"{"location.district": {"$regex": "Ernakulam", "$options": "i"}}"#).unwrap();
        assert_eq!(filter, contains("location.district", "Ernakulam"));

        let serialized = serde_json::to_string(&filter).unwrap();
        assert!(!serialized.contains("$options"));
        assert!(!serialized.contains("$regex"));
    }

    #[test]
    fn test_regex_without_options_and_anchors() {
        assert_eq!(
            parse(r#"{"project_name": {"$regex": "^.*bridge.*$"}}"#).unwrap(),
            contains("project_name", "bridge")
        );
        assert_eq!(
            parse(r#"{"project_name": {"$regex": "st\\. mary"}}"#).unwrap(),
            contains("project_name", "st. mary")
        );
    }

    #[test]
    fn test_regex_alternation_becomes_or() {
        assert_eq!(
            parse(r#"{"project_name": {"$regex": "school|hospital", "$options": "i"}}"#).unwrap(),
            FilterExpr::Or(vec![
                contains("project_name", "school"),
                contains("project_name", "hospital"),
            ])
        );
    }

    #[test]
    fn test_empty_object_matches_all() {
        assert!(parse("{}").unwrap().is_match_all());
        assert!(parse("```json\n{}\n```").unwrap().is_match_all());
    }

    #[test]
    fn test_code_fence_and_think_tags_stripped() {
        let raw = "<think>budget means allocated_budget</think>\n```json\n{\"allocated_budget\":{\"$gte\":1000000}}\n```";
        assert_eq!(
            parse(raw).unwrap(),
            FilterExpr::leaf(
                "allocated_budget",
                Condition::Compare {
                    op: CompareOp::Gte,
                    value: Scalar::Number(1_000_000.0),
                }
            )
        );
    }

    #[test]
    fn test_range_pair_and_date_wrapper() {
        let filter = parse(
            r#"{"timeline.approval_date": {"$gte": {"$date": "2024-01-01"}, "$lte": "2024-12-31"}}"#,
        )
        .unwrap();
        assert_eq!(
            filter,
            FilterExpr::And(vec![
                FilterExpr::leaf(
                    "timeline.approval_date",
                    Condition::Compare {
                        op: CompareOp::Gte,
                        value: Scalar::Text("2024-01-01T00:00:00.000Z".into()),
                    }
                ),
                FilterExpr::leaf(
                    "timeline.approval_date",
                    Condition::Compare {
                        op: CompareOp::Lte,
                        value: Scalar::Text("2024-12-31T00:00:00.000Z".into()),
                    }
                ),
            ])
        );
    }

    #[test]
    fn test_date_operands_are_canonicalized() {
        assert_eq!(
            parse(r#"{"timeline.approval_date": "2024-02-10"}"#).unwrap(),
            FilterExpr::leaf(
                "timeline.approval_date",
                Condition::Equals(Scalar::Text("2024-02-10T00:00:00.000Z".into()))
            )
        );
        assert_eq!(
            parse(r#"{"created_at": {"$gt": {"$date": "2024-02-10T05:30:00+05:30"}}}"#).unwrap(),
            FilterExpr::leaf(
                "created_at",
                Condition::Compare {
                    op: CompareOp::Gt,
                    value: Scalar::Text("2024-02-10T00:00:00.000Z".into()),
                }
            )
        );
    }

    #[test]
    fn test_unparseable_dates_rejected() {
        for raw in [
            r#"{"timeline.approval_date": {"$lte": "last march"}}"#,
            r#"{"timeline.approval_date": {"$gte": 2024}}"#,
            r#"{"timeline.approval_date": "10/02/2024"}"#,
            r#"{"timeline.approval_date": {"$in": ["2024-02-10", "soon"]}}"#,
        ] {
            assert!(matches!(parse(raw), Err(AppError::MalformedFilter(_))), "{}", raw);
        }
    }

    #[test]
    fn test_regex_only_on_text_fields() {
        for raw in [
            r#"{"allocated_budget": {"$regex": "25"}}"#,
            r#"{"timeline.approval_date": {"$regex": "2024", "$options": "i"}}"#,
        ] {
            assert!(matches!(parse(raw), Err(AppError::MalformedFilter(_))), "{}", raw);
        }
        assert!(parse(r#"{"status": {"$regex": "ongo"}}"#).is_ok());
        assert!(parse(r#"{"beneficiaries.beneficiary_categories": {"$regex": "farm"}}"#).is_ok());
    }

    #[test]
    fn test_bare_alternation_is_empty_pattern() {
        for pattern in ["|", "||", " | ", "^|$"] {
            let raw = format!(r#"{{"project_name": {{"$regex": "{}", "$options": "i"}}}}"#, pattern);
            assert!(matches!(parse(&raw), Err(AppError::MalformedFilter(_))), "{}", pattern);
        }
        assert_eq!(
            parse(r#"{"project_name": {"$regex": "school||", "$options": "i"}}"#).unwrap(),
            contains("project_name", "school")
        );
    }

    #[test]
    fn test_escaped_bar_is_literal() {
        assert_eq!(
            parse(r#"{"project_name": {"$regex": "road\\|bridge"}}"#).unwrap(),
            contains("project_name", "road|bridge")
        );
        assert_eq!(
            parse(r#"{"project_name": {"$regex": "^school$|^hospital$"}}"#).unwrap(),
            FilterExpr::Or(vec![
                contains("project_name", "school"),
                contains("project_name", "hospital"),
            ])
        );
    }

    #[test]
    fn test_in_and_eq_operators() {
        assert_eq!(
            parse(r#"{"status": {"$in": ["Ongoing", "Tendering"]}}"#).unwrap(),
            FilterExpr::leaf(
                "status",
                Condition::OneOf(vec![Scalar::Text("Ongoing".into()), Scalar::Text("Tendering".into())])
            )
        );
        assert_eq!(parse(r#"{"status": {"$eq": "Completed"}}"#).unwrap(), equals("status", "Completed"));
    }

    #[test]
    fn test_malformed_inputs() {
        for raw in [
            "not json at all",
            "[1, 2, 3]",
            r#"{"$where": "this.allocated_budget > 0"}"#,
            r#"{"$and": {"status": "Ongoing"}}"#,
            r#"{"$or": []}"#,
            r#"{"$or": ["Ongoing"]}"#,
            r#"{"status": {"$ne": "Cancelled"}}"#,
            r#"{"project_name": {"$options": "i"}}"#,
            r#"{"sector": {"$gte": "Rural"}}"#,
            r#"{"allocated_budget": {"$gte": "ten lakh"}}"#,
            r#"{"status": ["Ongoing"]}"#,
            r#"{"status": null}"#,
            r#"{"project_name": {}}"#,
        ] {
            assert!(matches!(parse(raw), Err(AppError::MalformedFilter(_))), "{}", raw);
        }
    }

    #[test]
    fn test_every_leaf_is_a_schema_field() {
        let schema = SchemaDescriptor::projects();
        for example in FILTER_EXAMPLES {
            let filter = parse(example.filter).unwrap();
            assert!(filter.predicates().iter().all(|p| schema.contains(&p.field)));
        }
    }
}
