use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOrderInfo, SortDirection};
use crate::plan::ColumnDescriptor;

pub struct FilterOrder;

impl FilterOrder {
    /// Parse `[[column, "ascending"|"descending"], ...]`, rejecting columns
    /// outside the whitelist.
    pub fn validate_and_parse(
        order: &Value,
        columns: &[&ColumnDescriptor],
    ) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let entries = match order {
            Value::Null => return Ok(vec![]),
            Value::Array(arr) => arr,
            _ => return Err(FilterError::InvalidOrder("order must be an array".to_string())),
        };

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let (column, direction) = match entry.as_array().map(Vec::as_slice) {
                Some([Value::String(column)]) => (column, SortDirection::Ascending),
                Some([Value::String(column), Value::String(dir)]) => (column, SortDirection::parse(dir)?),
                _ => {
                    return Err(FilterError::InvalidOrder(format!(
                        "expected [column, direction], got {}",
                        entry
                    )))
                }
            };
            if !columns.iter().any(|c| &c.name == column) {
                return Err(FilterError::InvalidSortColumn(column.clone()));
            }
            out.push(FilterOrderInfo { column: column.clone(), sort: direction });
        }
        Ok(out)
    }

    pub fn generate(infos: &[FilterOrderInfo], columns: &[&ColumnDescriptor], alias: &str) -> String {
        let parts: Vec<String> = infos
            .iter()
            .filter_map(|i| {
                columns
                    .iter()
                    .find(|c| c.name == i.column)
                    .map(|c| format!("{} {}", c.select_sql(alias), i.sort.to_sql()))
            })
            .collect();
        if parts.is_empty() {
            String::new()
        } else {
            format!("ORDER BY {}", parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ColumnKind, SqlType};
    use serde_json::json;

    fn columns() -> Vec<ColumnDescriptor> {
        ["nameInternal", "createdAt"]
            .iter()
            .map(|n| ColumnDescriptor::new(*n, *n, SqlType::Text, None, ColumnKind::Literal, json!(true)).unwrap())
            .collect()
    }

    #[test]
    fn composite_order_applies_left_to_right() {
        let owned = columns();
        let refs: Vec<&ColumnDescriptor> = owned.iter().collect();
        let infos = FilterOrder::validate_and_parse(
            &json!([["createdAt", "descending"], ["nameInternal", "ascending"]]),
            &refs,
        )
        .unwrap();
        assert_eq!(
            FilterOrder::generate(&infos, &refs, "b"),
            "ORDER BY b.\"createdAt\" DESC, b.\"nameInternal\" ASC"
        );
    }

    #[test]
    fn rejects_unknown_sort_column_and_direction() {
        let owned = columns();
        let refs: Vec<&ColumnDescriptor> = owned.iter().collect();
        assert_eq!(
            FilterOrder::validate_and_parse(&json!([["secret", "ascending"]]), &refs).unwrap_err(),
            FilterError::InvalidSortColumn("secret".into())
        );
        assert_eq!(
            FilterOrder::validate_and_parse(&json!([["nameInternal", "sideways"]]), &refs).unwrap_err(),
            FilterError::InvalidSortDirection("sideways".into())
        );
        assert!(matches!(
            FilterOrder::validate_and_parse(&json!("nameInternal"), &refs),
            Err(FilterError::InvalidOrder(_))
        ));
    }

    #[test]
    fn missing_order_yields_empty_clause() {
        let owned = columns();
        let refs: Vec<&ColumnDescriptor> = owned.iter().collect();
        let infos = FilterOrder::validate_and_parse(&Value::Null, &refs).unwrap();
        assert_eq!(FilterOrder::generate(&infos, &refs, "b"), "");
    }
}
