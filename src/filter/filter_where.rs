use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo};
use crate::plan::ColumnDescriptor;

/// Compiles a filter object into a parameterized predicate. Only columns in
/// `columns` may be referenced; every value becomes a JSONB parameter.
pub struct FilterWhere<'a> {
    columns: &'a [&'a ColumnDescriptor],
    alias: &'a str,
    param_values: Vec<Value>,
    param_index: usize,
    conditions: Vec<FilterWhereInfo>,
}

impl<'a> FilterWhere<'a> {
    pub fn new(columns: &'a [&'a ColumnDescriptor], alias: &'a str, starting_param_index: usize) -> Self {
        Self {
            columns,
            alias,
            param_values: vec![],
            param_index: starting_param_index,
            conditions: vec![],
        }
    }

    pub fn generate(
        columns: &'a [&'a ColumnDescriptor],
        alias: &'a str,
        where_data: &Value,
        starting_param_index: usize,
    ) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self::new(columns, alias, starting_param_index);
        filter_where.build(where_data)
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(FilterError::InvalidWhereClause("filter must be an object".to_string())),
        }
    }

    fn build(&mut self, where_data: &Value) -> Result<(String, Vec<Value>), FilterError> {
        Self::validate(where_data)?;
        if let Value::Object(obj) = where_data {
            for (key, value) in obj {
                self.parse_field_condition(key, value)?;
            }
        }

        let mut sql_conditions = vec![];
        let conditions = std::mem::take(&mut self.conditions);
        for condition in &conditions {
            sql_conditions.push(self.build_sql_condition(condition)?);
        }
        let where_clause = if sql_conditions.is_empty() {
            "1=1".to_string()
        } else {
            sql_conditions.join(" AND ")
        };
        Ok((where_clause, std::mem::take(&mut self.param_values)))
    }

    fn parse_field_condition(&mut self, field: &str, value: &Value) -> Result<(), FilterError> {
        if !self.columns.iter().any(|c| c.name == field) {
            return Err(FilterError::InvalidFilterColumn(field.to_string()));
        }
        match value {
            Value::Object(obj) if !obj.is_empty() => {
                for (op_key, op_val) in obj {
                    let operator = FilterOp::from_key(op_key)?;
                    self.conditions.push(FilterWhereInfo {
                        column: field.to_string(),
                        operator,
                        data: op_val.clone(),
                    });
                }
            }
            Value::Object(_) => {
                return Err(FilterError::InvalidOperatorData(format!(
                    "empty operator object for '{}'",
                    field
                )));
            }
            // Implicit equality: { field: value }
            _ => self.conditions.push(FilterWhereInfo {
                column: field.to_string(),
                operator: FilterOp::Eq,
                data: value.clone(),
            }),
        }
        Ok(())
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        let descriptor = self
            .columns
            .iter()
            .find(|c| c.name == condition.column)
            .copied()
            .ok_or_else(|| FilterError::InvalidFilterColumn(condition.column.clone()))?;
        let lhs = descriptor.select_sql(self.alias);
        let sql_type = descriptor.sql_type;

        match condition.operator {
            FilterOp::Eq => {
                if condition.data.is_null() {
                    Ok(format!("{} IS NULL", lhs))
                } else {
                    check_operand(descriptor, &condition.data)?;
                    let param = self.param(condition.data.clone());
                    Ok(format!("{} = {}", lhs, sql_type.cast(&param)))
                }
            }
            FilterOp::Like => {
                if !condition.data.is_string() {
                    return Err(FilterError::InvalidOperatorData(format!(
                        "like on '{}' requires a string pattern",
                        condition.column
                    )));
                }
                let param = self.param(condition.data.clone());
                Ok(format!("({})::text LIKE ({} #>> '{{}}')", lhs, param))
            }
            FilterOp::In | FilterOp::NotIn => {
                let values = condition.data.as_array().ok_or_else(|| {
                    FilterError::InvalidOperatorData(format!(
                        "{:?} on '{}' requires an array",
                        condition.operator, condition.column
                    ))
                })?;
                for value in values.iter().filter(|v| !v.is_null()) {
                    check_operand(descriptor, value)?;
                }
                let negate = condition.operator == FilterOp::NotIn;
                if values.is_empty() {
                    return Ok(if negate { "1=1" } else { "1=0" }.to_string());
                }
                let param = self.param(condition.data.clone());
                let membership = format!(
                    "{} = ANY(ARRAY(SELECT {} FROM jsonb_array_elements({}) AS e))",
                    lhs,
                    sql_type.cast("e"),
                    param
                );
                if negate {
                    Ok(format!("NOT COALESCE({}, false)", membership))
                } else {
                    Ok(membership)
                }
            }
        }
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

fn check_operand(column: &ColumnDescriptor, value: &Value) -> Result<(), FilterError> {
    if column.sql_type.accepts(value) {
        Ok(())
    } else {
        Err(FilterError::InvalidOperatorData(format!(
            "'{}' expects a {} value, got {}",
            column.name, column.sql_type, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ColumnKind, SqlType};
    use serde_json::json;

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("nameInternal", "name_internal", SqlType::Text, None, ColumnKind::Literal, json!(true)).unwrap(),
            ColumnDescriptor::new("bandCount", "band_count", SqlType::Integer, None, ColumnKind::Literal, json!(true)).unwrap(),
            ColumnDescriptor::new("sourceTypeKey", "source_type_key", SqlType::Uuid, None, ColumnKind::Literal, json!(true)).unwrap(),
            ColumnDescriptor::new("isActive", "is_active", SqlType::Boolean, None, ColumnKind::Literal, json!(true)).unwrap(),
            ColumnDescriptor::new("resolution", "resolution", SqlType::Double, None, ColumnKind::Literal, json!(true)).unwrap(),
            ColumnDescriptor::new("createdAt", "created_at", SqlType::Timestamptz, None, ColumnKind::Literal, json!(true)).unwrap(),
        ]
    }

    fn generate(filter: Value) -> Result<(String, Vec<Value>), FilterError> {
        let owned = columns();
        let refs: Vec<&ColumnDescriptor> = owned.iter().collect();
        FilterWhere::generate(&refs, "b", &filter, 0)
    }

    #[test]
    fn literal_is_sugar_for_eq() {
        let (sql, params) = generate(json!({"nameInternal": "raster type"})).unwrap();
        assert_eq!(sql, "b.\"name_internal\" = ($1 #>> '{}')::text");
        assert_eq!(params, vec![json!("raster type")]);

        let (explicit, _) = generate(json!({"nameInternal": {"eq": "raster type"}})).unwrap();
        assert_eq!(sql, explicit);
    }

    #[test]
    fn null_literal_compiles_to_is_null() {
        let (sql, params) = generate(json!({"nameInternal": null})).unwrap();
        assert_eq!(sql, "b.\"name_internal\" IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn like_binds_the_pattern() {
        let (sql, params) = generate(json!({"nameInternal": {"like": "%type"}})).unwrap();
        assert_eq!(sql, "(b.\"name_internal\")::text LIKE ($1 #>> '{}')");
        assert_eq!(params, vec![json!("%type")]);
    }

    #[test]
    fn empty_in_matches_nothing_and_empty_notin_everything() {
        assert_eq!(generate(json!({"bandCount": {"in": []}})).unwrap().0, "1=0");
        assert_eq!(generate(json!({"bandCount": {"notin": []}})).unwrap().0, "1=1");
    }

    #[test]
    fn in_binds_whole_array_and_casts_elements() {
        let (sql, params) = generate(json!({"bandCount": {"in": [1, 3]}})).unwrap();
        assert_eq!(
            sql,
            "b.\"band_count\" = ANY(ARRAY(SELECT (e #>> '{}')::integer FROM jsonb_array_elements($1) AS e))"
        );
        assert_eq!(params, vec![json!([1, 3])]);

        let (not_sql, _) = generate(json!({"bandCount": {"notin": [1]}})).unwrap();
        assert!(not_sql.starts_with("NOT COALESCE("));
    }

    #[test]
    fn conditions_are_anded_with_sequential_params() {
        let (sql, params) = generate(json!({
            "nameInternal": {"like": "r%"},
            "bandCount": 3
        }))
        .unwrap();
        assert!(sql.contains(" AND "));
        assert!(sql.contains("$1") && sql.contains("$2"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn rejects_columns_outside_whitelist() {
        assert_eq!(
            generate(json!({"password": "x"})).unwrap_err(),
            FilterError::InvalidFilterColumn("password".into())
        );
    }

    #[test]
    fn rejects_unknown_operator_and_bad_operand() {
        assert_eq!(
            generate(json!({"nameInternal": {"gt": 1}})).unwrap_err(),
            FilterError::UnsupportedOperator("gt".into())
        );
        assert!(matches!(
            generate(json!({"bandCount": {"in": 3}})),
            Err(FilterError::InvalidOperatorData(_))
        ));
        assert!(matches!(generate(json!([1, 2])), Err(FilterError::InvalidWhereClause(_))));
    }

    fn rejected(filter: Value) -> bool {
        matches!(generate(filter), Err(FilterError::InvalidOperatorData(_)))
    }

    #[test]
    fn operands_are_checked_against_column_types() {
        assert!(rejected(json!({"sourceTypeKey": "not-a-uuid"})));
        assert!(generate(json!({"sourceTypeKey": "6f1c2b8e-0d3a-4c55-9a55-1f0d2c7a9b10"})).is_ok());

        assert!(rejected(json!({"isActive": "maybe"})));
        assert!(rejected(json!({"isActive": {"in": ["maybe"]}})));
        assert!(generate(json!({"isActive": {"in": [true, null]}})).is_ok());

        assert!(rejected(json!({"bandCount": {"eq": "three"}})));
        assert!(rejected(json!({"bandCount": {"notin": [1, 2.5]}})));

        assert!(rejected(json!({"resolution": "fine"})));
        assert!(generate(json!({"resolution": {"in": [0.5, 2]}})).is_ok());

        assert!(rejected(json!({"createdAt": {"eq": 5}})));
        assert!(generate(json!({"createdAt": "2024-05-01T12:00:00Z"})).is_ok());
    }
}
