//! Declarative shape of the JSON document a job maintains.
//!
//! A [`Schema`] is parsed once from configuration and then shared by every
//! step of the job: [`validate`] checks agent output against it and
//! [`describe`] renders it into the prompt so the agent knows what to return.
//!
//! The configuration grammar is deliberately small:
//!
//! - a string is a type name (`string`, `number`, `integer`, `boolean`,
//!   `date`) or a date pattern such as `YYYY-MM-DD`;
//! - a one-element list `[X]` is an array of `X`;
//! - a mapping using only the keys `type`, `items`, `fields` and `format`
//!   is a tagged node (`type: array` + `items`, `type: object` + `fields`,
//!   `type: date` + optional `format`);
//! - any other mapping is an object whose keys are its fields, in order.

use std::fmt;

use chrono::NaiveDate;
use serde::Deserialize;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::Value;
use thiserror::Error;

const DEFAULT_DATE_PATTERN: &str = "YYYY-MM-DD";
const TAG_KEYS: &[&str] = &["type", "items", "fields", "format"];

/// Recursive shape description: scalar leaf, homogeneous array, or object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schema {
    Scalar(ScalarType),
    Array(Box<Schema>),
    Object(Vec<Field>),
}

/// A named member of an object schema. Declaration order is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
}

/// Primitive semantic types a leaf value can have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Number,
    Integer,
    Boolean,
    /// A string that must match a literal date pattern.
    Date(DatePattern),
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::String => write!(f, "string"),
            ScalarType::Number => write!(f, "number"),
            ScalarType::Integer => write!(f, "integer"),
            ScalarType::Boolean => write!(f, "boolean"),
            ScalarType::Date(pattern) => write!(f, "string ({pattern})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateToken {
    Year,
    Month,
    Day,
    Literal(char),
}

/// A literal date format built from `YYYY`, `MM` and `DD` tokens joined by
/// separator characters, e.g. `YYYY-MM-DD` or `YYYY/MM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePattern {
    pattern: String,
    tokens: Vec<DateToken>,
}

impl DatePattern {
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let mut tokens = Vec::new();
        let mut rest = pattern;
        while let Some(c) = rest.chars().next() {
            let (token, len) = if rest.starts_with("YYYY") {
                (DateToken::Year, 4)
            } else if rest.starts_with("MM") {
                (DateToken::Month, 2)
            } else if rest.starts_with("DD") {
                (DateToken::Day, 2)
            } else if c.is_alphanumeric() {
                return Err(format!("unexpected `{c}` in date pattern `{pattern}`"));
            } else {
                (DateToken::Literal(c), c.len_utf8())
            };
            if token != DateToken::Literal(c) && tokens.contains(&token) {
                return Err(format!("repeated component in date pattern `{pattern}`"));
            }
            tokens.push(token);
            rest = &rest[len..];
        }
        if !tokens.contains(&DateToken::Year) {
            return Err(format!("date pattern `{pattern}` must contain YYYY"));
        }
        Ok(Self {
            pattern: pattern.to_string(),
            tokens,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Exact structural match, plus a calendar check when the pattern names a
    /// full year-month-day.
    pub fn matches(&self, input: &str) -> bool {
        self.match_parts(input).is_some()
    }

    fn match_parts(&self, input: &str) -> Option<()> {
        let mut rest = input;
        let (mut year, mut month, mut day) = (None, None, None);
        for token in &self.tokens {
            match token {
                DateToken::Year => {
                    let (n, r) = take_digits(rest, 4)?;
                    year = Some(n);
                    rest = r;
                }
                DateToken::Month => {
                    let (n, r) = take_digits(rest, 2)?;
                    if !(1..=12).contains(&n) {
                        return None;
                    }
                    month = Some(n);
                    rest = r;
                }
                DateToken::Day => {
                    let (n, r) = take_digits(rest, 2)?;
                    if !(1..=31).contains(&n) {
                        return None;
                    }
                    day = Some(n);
                    rest = r;
                }
                DateToken::Literal(c) => rest = rest.strip_prefix(*c)?,
            }
        }
        if !rest.is_empty() {
            return None;
        }
        if let (Some(y), Some(m), Some(d)) = (year, month, day) {
            NaiveDate::from_ymd_opt(y as i32, m, d)?;
        }
        Some(())
    }
}

impl fmt::Display for DatePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

fn take_digits(input: &str, width: usize) -> Option<(u32, &str)> {
    let head = input.as_bytes().get(..width)?;
    if !head.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let value = input[..width].parse().ok()?;
    Some((value, &input[width..]))
}

impl Schema {
    /// Short label used in mismatch reports.
    pub fn label(&self) -> String {
        match self {
            Schema::Scalar(ty) => ty.to_string(),
            Schema::Array(_) => "array".to_string(),
            Schema::Object(_) => "object".to_string(),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Schema::Array(_))
    }

    fn from_tag(tag: &str) -> Result<Self, String> {
        let ty = match tag {
            "string" => ScalarType::String,
            "number" => ScalarType::Number,
            "integer" => ScalarType::Integer,
            "boolean" => ScalarType::Boolean,
            "date" => ScalarType::Date(DatePattern::parse(DEFAULT_DATE_PATTERN)?),
            other if other.contains("YYYY") => ScalarType::Date(DatePattern::parse(other)?),
            other => return Err(format!("unknown type `{other}`")),
        };
        Ok(Schema::Scalar(ty))
    }

    fn from_node(node: Node, path: &str) -> Result<Self, String> {
        match node {
            Node::Tag(tag) => Self::from_tag(&tag).map_err(|e| format!("{path}: {e}")),
            Node::List(mut items) => {
                if items.len() != 1 {
                    return Err(format!(
                        "{path}: list shorthand needs exactly one item shape, found {}",
                        items.len()
                    ));
                }
                let item = Self::from_node(items.remove(0), &format!("{path}[]"))?;
                Ok(Schema::Array(Box::new(item)))
            }
            Node::Map(entries) if is_tagged(&entries) => Self::from_tagged(entries, path),
            Node::Map(entries) => Self::object_from_entries(entries, path),
        }
    }

    fn from_tagged(entries: Vec<(String, Node)>, path: &str) -> Result<Self, String> {
        let mut kind = String::new();
        let (mut items, mut fields, mut format) = (None, None, None);
        for (key, node) in entries {
            match (key.as_str(), node) {
                ("type", Node::Tag(tag)) => kind = tag,
                ("items", node) => items = Some(node),
                ("fields", node) => fields = Some(node),
                ("format", node) => format = Some(node),
                _ => {}
            }
        }

        let extra = |name: &str, present: bool| -> Result<(), String> {
            if present {
                Err(format!("{path}: `{name}` is not allowed for type `{kind}`"))
            } else {
                Ok(())
            }
        };

        match kind.as_str() {
            "array" => {
                extra("fields", fields.is_some())?;
                extra("format", format.is_some())?;
                let items = items.ok_or_else(|| format!("{path}: array needs `items`"))?;
                let item = Self::from_node(items, &format!("{path}[]"))?;
                Ok(Schema::Array(Box::new(item)))
            }
            "object" => {
                extra("items", items.is_some())?;
                extra("format", format.is_some())?;
                match fields {
                    Some(Node::Map(entries)) => Self::object_from_entries(entries, path),
                    Some(_) => Err(format!("{path}: `fields` must be a mapping")),
                    None => Err(format!("{path}: object needs `fields`")),
                }
            }
            "date" => {
                extra("items", items.is_some())?;
                extra("fields", fields.is_some())?;
                let pattern = match format {
                    Some(Node::Tag(p)) => p,
                    Some(_) => return Err(format!("{path}: `format` must be a string")),
                    None => DEFAULT_DATE_PATTERN.to_string(),
                };
                let pattern = DatePattern::parse(&pattern).map_err(|e| format!("{path}: {e}"))?;
                Ok(Schema::Scalar(ScalarType::Date(pattern)))
            }
            other => {
                let scalar = Self::from_tag(other).map_err(|e| format!("{path}: {e}"))?;
                extra("items", items.is_some())?;
                extra("fields", fields.is_some())?;
                extra("format", format.is_some())?;
                Ok(scalar)
            }
        }
    }

    fn object_from_entries(entries: Vec<(String, Node)>, path: &str) -> Result<Self, String> {
        if entries.is_empty() {
            return Err(format!("{path}: object has no fields"));
        }
        let mut fields: Vec<Field> = Vec::with_capacity(entries.len());
        for (name, node) in entries {
            if fields.iter().any(|f| f.name == name) {
                return Err(format!("{path}: duplicate field `{name}`"));
            }
            let schema = Self::from_node(node, &format!("{path}.{name}"))?;
            fields.push(Field { name, schema });
        }
        Ok(Schema::Object(fields))
    }
}

fn is_tagged(entries: &[(String, Node)]) -> bool {
    entries
        .iter()
        .any(|(k, v)| k == "type" && matches!(v, Node::Tag(_)))
        && entries.iter().all(|(k, _)| TAG_KEYS.contains(&k.as_str()))
}

/// Untyped configuration tree, kept in document order.
enum Node {
    Tag(String),
    List(Vec<Node>),
    Map(Vec<(String, Node)>),
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a type name, a one-element list, or a mapping of fields")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Node, E> {
        Ok(Node::Tag(v.to_string()))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Node::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Node, A::Error> {
        let mut entries = Vec::new();
        while let Some(key) = map.next_key::<String>()? {
            let value = map.next_value()?;
            entries.push((key, value));
        }
        Ok(Node::Map(entries))
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let node = Node::deserialize(deserializer)?;
        Schema::from_node(node, "schema").map_err(de::Error::custom)
    }
}

/// First structural disagreement between a value and its schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema mismatch at {path}: expected {expected}, found {actual}")]
pub struct SchemaMismatch {
    /// Location of the failing value, e.g. `$[1].date`.
    pub path: String,
    pub expected: String,
    pub actual: String,
}

impl SchemaMismatch {
    fn new(path: &str, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

fn value_label(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

/// Validates `value` against `schema`. Extra object fields are accepted and
/// left untouched; nothing is coerced.
pub fn validate(schema: &Schema, value: &Value) -> Result<(), SchemaMismatch> {
    let mut path = String::from("$");
    check(schema, value, &mut path)
}

/// Checks only the top-level array/object framing of `value`.
pub fn check_shape(schema: &Schema, value: &Value) -> Result<(), SchemaMismatch> {
    let ok = match schema {
        Schema::Array(_) => value.is_array(),
        Schema::Object(_) => value.is_object(),
        Schema::Scalar(_) => !value.is_array() && !value.is_object(),
    };
    if ok {
        Ok(())
    } else {
        Err(SchemaMismatch::new("$", schema.label(), value_label(value)))
    }
}

fn check(schema: &Schema, value: &Value, path: &mut String) -> Result<(), SchemaMismatch> {
    match schema {
        Schema::Scalar(ty) => {
            if scalar_matches(ty, value) {
                Ok(())
            } else {
                Err(SchemaMismatch::new(path, ty.to_string(), value_label(value)))
            }
        }
        Schema::Array(item) => {
            let Value::Array(elements) = value else {
                return Err(SchemaMismatch::new(path, "array", value_label(value)));
            };
            for (i, element) in elements.iter().enumerate() {
                let len = path.len();
                path.push_str(&format!("[{i}]"));
                check(item, element, path)?;
                path.truncate(len);
            }
            Ok(())
        }
        Schema::Object(fields) => {
            let Value::Object(map) = value else {
                return Err(SchemaMismatch::new(path, "object", value_label(value)));
            };
            for field in fields {
                let len = path.len();
                path.push('.');
                path.push_str(&field.name);
                match map.get(&field.name) {
                    Some(member) => check(&field.schema, member, path)?,
                    None => return Err(SchemaMismatch::new(path, field.schema.label(), "missing")),
                }
                path.truncate(len);
            }
            Ok(())
        }
    }
}

fn scalar_matches(ty: &ScalarType, value: &Value) -> bool {
    match (ty, value) {
        (ScalarType::String, Value::String(_)) => true,
        (ScalarType::Number, Value::Number(_)) => true,
        (ScalarType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
        (ScalarType::Boolean, Value::Bool(_)) => true,
        (ScalarType::Date(pattern), Value::String(s)) => pattern.matches(s),
        _ => false,
    }
}

/// Textual shape description embedded in the agent prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptFragment(String);

impl PromptFragment {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PromptFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Renders `schema` as an indented JSON skeleton with type placeholders.
/// Output is deterministic: fields appear in declaration order.
pub fn describe(schema: &Schema) -> PromptFragment {
    let mut out = String::new();
    render(schema, 0, &mut out);
    PromptFragment(out)
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn render(schema: &Schema, depth: usize, out: &mut String) {
    match schema {
        Schema::Scalar(ty) => out.push_str(&ty.to_string()),
        Schema::Array(item) => {
            out.push_str("[\n");
            indent(out, depth + 1);
            render(item, depth + 1, out);
            out.push_str(",\n");
            indent(out, depth + 1);
            out.push_str("...\n");
            indent(out, depth);
            out.push(']');
        }
        Schema::Object(fields) => {
            out.push_str("{\n");
            for (i, field) in fields.iter().enumerate() {
                indent(out, depth + 1);
                out.push_str(&format!("\"{}\": ", field.name));
                render(&field.schema, depth + 1, out);
                if i + 1 < fields.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            indent(out, depth);
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn news_schema() -> Schema {
        serde_yaml::from_str(
            r#"
            type: array
            items:
              title: string
              url: string
              date: YYYY-MM-DD
            "#,
        )
        .unwrap()
    }

    #[test]
    fn parses_tagged_array_of_objects() {
        let schema = news_schema();
        let Schema::Array(item) = schema else {
            panic!("expected array schema");
        };
        let Schema::Object(fields) = *item else {
            panic!("expected object items");
        };
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["title", "url", "date"]);
        assert!(matches!(fields[2].schema, Schema::Scalar(ScalarType::Date(_))));
    }

    #[test]
    fn list_shorthand_and_tagged_form_are_equivalent() {
        let shorthand: Schema = serde_yaml::from_str("[{name: string, year: integer}]").unwrap();
        let tagged: Schema = serde_yaml::from_str(
            "{type: array, items: {type: object, fields: {name: string, year: integer}}}",
        )
        .unwrap();
        assert_eq!(shorthand, tagged);
    }

    #[test]
    fn parses_from_toml() {
        let schema: Schema = toml::from_str(
            r#"
            type = "array"
            [items]
            title = "string"
            awarded = { type = "date", format = "YYYY/MM" }
            "#,
        )
        .unwrap();
        assert_eq!(
            describe(&schema).as_str(),
            "[\n  {\n    \"title\": string,\n    \"awarded\": string (YYYY/MM)\n  },\n  ...\n]"
        );
    }

    #[test]
    fn rejects_unknown_type_tag() {
        let err = serde_yaml::from_str::<Schema>("{title: strng}").unwrap_err();
        assert!(err.to_string().contains("unknown type `strng`"), "{err}");

        let err = serde_yaml::from_str::<Schema>("{type: tuple, items: string}").unwrap_err();
        assert!(err.to_string().contains("unknown type `tuple`"), "{err}");
    }

    #[test]
    fn rejects_malformed_nodes() {
        assert!(serde_yaml::from_str::<Schema>("{type: array}").is_err());
        assert!(serde_yaml::from_str::<Schema>("{type: object, fields: string}").is_err());
        assert!(serde_yaml::from_str::<Schema>("[string, number]").is_err());
        assert!(serde_yaml::from_str::<Schema>("{}").is_err());
        assert!(serde_yaml::from_str::<Schema>("42").is_err());
        assert!(serde_yaml::from_str::<Schema>("{type: string, items: string}").is_err());
    }

    #[test]
    fn field_named_type_is_a_plain_field() {
        let schema: Schema = serde_yaml::from_str("{type: string, title: string}").unwrap();
        let Schema::Object(fields) = schema else {
            panic!("expected object");
        };
        assert_eq!(fields[0].name, "type");
        assert_eq!(fields[1].name, "title");
    }

    #[test]
    fn date_pattern_parsing() {
        assert!(DatePattern::parse("YYYY-MM-DD").is_ok());
        assert!(DatePattern::parse("YYYY").is_ok());
        assert!(DatePattern::parse("MM/DD").is_err());
        assert!(DatePattern::parse("YYYY-MM-DDTHH").is_err());
        assert!(DatePattern::parse("YYYY-YYYY").is_err());
    }

    #[test]
    fn date_pattern_matching() {
        let p = DatePattern::parse("YYYY-MM-DD").unwrap();
        assert!(p.matches("2024-01-01"));
        assert!(p.matches("2024-02-29"));
        assert!(!p.matches("2023-02-29"));
        assert!(!p.matches("2024-13-01"));
        assert!(!p.matches("2024-1-01"));
        assert!(!p.matches("2024/01/01"));
        assert!(!p.matches("2024-01-01 "));
        assert!(!p.matches("２０２４-01-01"));

        let month = DatePattern::parse("YYYY/MM").unwrap();
        assert!(month.matches("2024/12"));
        assert!(!month.matches("2024/00"));
    }

    #[test]
    fn validates_conforming_records() {
        let value = json!([
            {"title": "A", "url": "u1", "date": "2024-01-01"},
            {"title": "B", "url": "u2", "date": "2024-02-02", "summary": "extra"}
        ]);
        assert_eq!(validate(&news_schema(), &value), Ok(()));
        assert_eq!(validate(&news_schema(), &json!([])), Ok(()));
    }

    #[test]
    fn reports_first_failing_path() {
        let value = json!([
            {"title": "A", "url": "u1", "date": "2024-01-01"},
            {"title": "B", "url": "u2", "date": "2024/02/02"}
        ]);
        let err = validate(&news_schema(), &value).unwrap_err();
        assert_eq!(err.path, "$[1].date");
        assert_eq!(err.expected, "string (YYYY-MM-DD)");
        assert_eq!(err.actual, "string \"2024/02/02\"");
    }

    #[test]
    fn reports_missing_field_and_wrong_container() {
        let err = validate(&news_schema(), &json!([{"title": "A", "url": "u"}])).unwrap_err();
        assert_eq!(err.path, "$[0].date");
        assert_eq!(err.actual, "missing");

        let err = validate(&news_schema(), &json!({"title": "A"})).unwrap_err();
        assert_eq!(err.path, "$");
        assert_eq!(err.expected, "array");
        assert_eq!(err.actual, "object");
    }

    #[test]
    fn scalars_are_never_coerced() {
        let int = Schema::Scalar(ScalarType::Integer);
        assert!(validate(&int, &json!(3)).is_ok());
        assert!(validate(&int, &json!(3.5)).is_err());
        assert!(validate(&int, &json!("3")).is_err());

        let boolean = Schema::Scalar(ScalarType::Boolean);
        assert!(validate(&boolean, &json!("true")).is_err());

        let string = Schema::Scalar(ScalarType::String);
        assert!(validate(&string, &Value::Null).is_err());
        assert!(validate(&string, &json!(1)).is_err());
    }

    #[test]
    fn check_shape_looks_only_at_top_level() {
        let schema = news_schema();
        assert!(check_shape(&schema, &json!([1, 2])).is_ok());
        let err = check_shape(&schema, &json!({"title": "A"})).unwrap_err();
        assert_eq!(err.to_string(), "schema mismatch at $: expected array, found object");
    }

    #[test]
    fn describe_is_stable() {
        let expected = "[\n  {\n    \"title\": string,\n    \"url\": string,\n    \"date\": string (YYYY-MM-DD)\n  },\n  ...\n]";
        assert_eq!(describe(&news_schema()).as_str(), expected);
        assert_eq!(describe(&news_schema()), describe(&news_schema()));
    }

    #[test]
    fn describe_nested_object() {
        let schema: Schema =
            serde_yaml::from_str("{name: string, tags: [string], active: boolean}").unwrap();
        assert_eq!(
            describe(&schema).to_string(),
            "{\n  \"name\": string,\n  \"tags\": [\n    string,\n    ...\n  ],\n  \"active\": boolean\n}"
        );
    }
}
