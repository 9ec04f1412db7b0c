use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Storage types a plan column may declare. Values always travel as JSONB
/// parameters and are cast to the column type inside the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Uuid,
    Integer,
    BigInt,
    Boolean,
    Double,
    Numeric,
    Timestamptz,
    Date,
    Jsonb,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "text",
            SqlType::Uuid => "uuid",
            SqlType::Integer => "integer",
            SqlType::BigInt => "bigint",
            SqlType::Boolean => "boolean",
            SqlType::Double => "double precision",
            SqlType::Numeric => "numeric",
            SqlType::Timestamptz => "timestamptz",
            SqlType::Date => "date",
            SqlType::Jsonb => "jsonb",
        }
    }

    /// Whether a non-null JSON value survives the cast to this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            SqlType::Text => matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_)),
            SqlType::Uuid => value.as_str().is_some_and(|s| Uuid::parse_str(s).is_ok()),
            SqlType::Integer => value.as_i64().is_some_and(|n| i32::try_from(n).is_ok()),
            SqlType::BigInt => value.as_i64().is_some(),
            SqlType::Boolean => value.is_boolean(),
            SqlType::Double | SqlType::Numeric => value.is_number(),
            SqlType::Timestamptz => value
                .as_str()
                .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
            SqlType::Date => value.as_str().is_some_and(|s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() || DateTime::parse_from_rfc3339(s).is_ok()
            }),
            SqlType::Jsonb => true,
        }
    }

    /// SQL expression converting a JSONB expression into this type.
    pub fn cast(&self, jsonb_expr: &str) -> String {
        match self {
            SqlType::Jsonb => jsonb_expr.to_string(),
            other => format!("({} #>> '{{}}')::{}", jsonb_expr, other.as_sql()),
        }
    }
}

impl FromStr for SqlType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "text" | "varchar" => SqlType::Text,
            "uuid" => SqlType::Uuid,
            "integer" | "int" | "int4" => SqlType::Integer,
            "bigint" | "int8" => SqlType::BigInt,
            "boolean" | "bool" => SqlType::Boolean,
            "double precision" | "double" | "float8" => SqlType::Double,
            "numeric" | "decimal" => SqlType::Numeric,
            "timestamptz" | "timestamp with time zone" => SqlType::Timestamptz,
            "date" => SqlType::Date,
            "jsonb" | "json" => SqlType::Jsonb,
            other => return Err(other.to_string()),
        })
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Default applied to a column omitted on create. Thunks are evaluated once
/// per record, never once per batch.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Literal(Value),
    Uuid,
    Now,
}

impl DefaultValue {
    pub fn from_plan_value(value: Value) -> Self {
        match value.as_str() {
            Some("$uuid") => DefaultValue::Uuid,
            Some("$now") => DefaultValue::Now,
            _ => DefaultValue::Literal(value),
        }
    }

    pub fn evaluate(&self) -> Value {
        match self {
            DefaultValue::Literal(v) => v.clone(),
            DefaultValue::Uuid => Value::String(Uuid::new_v4().to_string()),
            DefaultValue::Now => Value::String(Utc::now().to_rfc3339()),
        }
    }
}

/// How a column is read and written.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    /// Stored verbatim in `column`.
    Literal,
    /// Rendered through `select_expr` (`{column}` placeholder) and stored
    /// through `modify_expr` (`{value}` placeholder, a JSONB parameter).
    Computed {
        select_expr: String,
        modify_expr: String,
    },
}

#[derive(Clone)]
pub struct ColumnDescriptor {
    /// Name exposed through the API.
    pub name: String,
    /// Physical column name.
    pub column: String,
    pub sql_type: SqlType,
    pub default: Option<DefaultValue>,
    pub kind: ColumnKind,
    pub schema: Value,
    /// Must be supplied, or defaulted, whenever a row is inserted.
    pub required: bool,
    validator: Arc<jsonschema::Validator>,
}

impl fmt::Debug for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("sql_type", &self.sql_type)
            .field("default", &self.default)
            .field("kind", &self.kind)
            .field("schema", &self.schema)
            .field("required", &self.required)
            .finish()
    }
}

impl ColumnDescriptor {
    pub fn new(
        name: impl Into<String>,
        column: impl Into<String>,
        sql_type: SqlType,
        default: Option<DefaultValue>,
        kind: ColumnKind,
        schema: Value,
    ) -> Result<Self, String> {
        let validator = jsonschema::validator_for(&schema).map_err(|e| e.to_string())?;
        Ok(Self {
            name: name.into(),
            column: column.into(),
            sql_type,
            default,
            kind,
            schema,
            required: false,
            validator: Arc::new(validator),
        })
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Read expression for this column on the table aliased `alias`.
    pub fn select_sql(&self, alias: &str) -> String {
        let qualified = format!("{}.{}", alias, quote_ident(&self.column));
        match &self.kind {
            ColumnKind::Literal => qualified,
            ColumnKind::Computed { select_expr, .. } => select_expr.replace("{column}", &qualified),
        }
    }

    /// Write expression for this column given the JSONB parameter placeholder.
    pub fn write_sql(&self, param: &str) -> String {
        match &self.kind {
            ColumnKind::Literal => self.sql_type.cast(param),
            ColumnKind::Computed { modify_expr, .. } => modify_expr.replace("{value}", param),
        }
    }

    /// Validate a value against the column schema, returning every message.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(value)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }

    pub fn default_value(&self) -> Option<Value> {
        self.default.as_ref().map(DefaultValue::evaluate)
    }
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn literal(name: &str, sql_type: SqlType, schema: Value) -> ColumnDescriptor {
        ColumnDescriptor::new(name, name, sql_type, None, ColumnKind::Literal, schema).unwrap()
    }

    #[test]
    fn casts_scalar_types_through_jsonb_text() {
        assert_eq!(SqlType::Uuid.cast("$1"), "($1 #>> '{}')::uuid");
        assert_eq!(SqlType::Jsonb.cast("$2"), "$2");
        assert_eq!(SqlType::Double.cast("e"), "(e #>> '{}')::double precision");
    }

    #[test]
    fn operands_must_fit_the_column_type() {
        assert!(SqlType::Uuid.accepts(&json!("6f1c2b8e-0d3a-4c55-9a55-1f0d2c7a9b10")));
        assert!(!SqlType::Uuid.accepts(&json!("not-a-uuid")));
        assert!(!SqlType::Uuid.accepts(&json!(7)));

        assert!(SqlType::Boolean.accepts(&json!(true)));
        assert!(!SqlType::Boolean.accepts(&json!("maybe")));

        assert!(SqlType::Integer.accepts(&json!(3)));
        assert!(!SqlType::Integer.accepts(&json!(3.5)));
        assert!(!SqlType::Integer.accepts(&json!(i64::MAX)));
        assert!(!SqlType::Integer.accepts(&json!("3")));
        assert!(SqlType::BigInt.accepts(&json!(i64::MAX)));
        assert!(!SqlType::BigInt.accepts(&json!(1.5)));

        assert!(SqlType::Double.accepts(&json!(0.25)));
        assert!(SqlType::Numeric.accepts(&json!(10)));
        assert!(!SqlType::Double.accepts(&json!("0.25")));

        assert!(SqlType::Timestamptz.accepts(&json!("2024-05-01T12:00:00Z")));
        assert!(!SqlType::Timestamptz.accepts(&json!(5)));
        assert!(!SqlType::Timestamptz.accepts(&json!("yesterday")));
        assert!(SqlType::Date.accepts(&json!("2024-05-01")));
        assert!(SqlType::Date.accepts(&json!("2024-05-01T00:00:00+02:00")));
        assert!(!SqlType::Date.accepts(&json!("05/01/2024")));

        assert!(SqlType::Text.accepts(&json!("x")));
        assert!(!SqlType::Text.accepts(&json!({"a": 1})));
        assert!(SqlType::Jsonb.accepts(&json!({"a": 1})));
    }

    #[test]
    fn parses_sql_type_aliases() {
        assert_eq!("INT".parse::<SqlType>(), Ok(SqlType::Integer));
        assert_eq!("timestamp with time zone".parse::<SqlType>(), Ok(SqlType::Timestamptz));
        assert!("geometry".parse::<SqlType>().is_err());
    }

    #[test]
    fn uuid_default_is_fresh_per_evaluation() {
        let d = DefaultValue::from_plan_value(json!("$uuid"));
        assert_ne!(d.evaluate(), d.evaluate());
        assert_eq!(
            DefaultValue::from_plan_value(json!(true)),
            DefaultValue::Literal(json!(true))
        );
    }

    #[test]
    fn computed_column_substitutes_placeholders() {
        let col = ColumnDescriptor::new(
            "bounds",
            "bounds",
            SqlType::Jsonb,
            None,
            ColumnKind::Computed {
                select_expr: "to_jsonb({column})".into(),
                modify_expr: "ARRAY(SELECT jsonb_array_elements_text({value})::double precision)".into(),
            },
            json!({"type": "array"}),
        )
        .unwrap();
        assert_eq!(col.select_sql("b"), "to_jsonb(b.\"bounds\")");
        assert!(col.write_sql("$3").contains("jsonb_array_elements_text($3)"));
    }

    #[test]
    fn validate_reports_schema_violations() {
        let col = literal("name", SqlType::Text, json!({"type": "string", "minLength": 1}));
        assert!(col.validate(&json!("ok")).is_ok());
        assert!(col.validate(&json!("")).is_err());
        assert!(col.validate(&json!(5)).is_err());
    }

    #[test]
    fn identifiers_reject_injection() {
        assert!(is_identifier("spatial_sources"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("users; DROP TABLE users"));
        assert!(!is_identifier(""));
    }
}
