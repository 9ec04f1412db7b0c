use std::collections::HashMap;

use serde_json::{Map, Value};

use super::column::ColumnDescriptor;

/// A validated value paired with the column it will be written to.
pub type ColumnValue<'p> = (&'p ColumnDescriptor, Value);

/// Schema failures keyed by field path.
pub type FieldErrors = HashMap<String, String>;

/// Pick the supplied values for `columns`, falling back to column defaults
/// when `with_defaults` is set, and validate each one. Fields not named by
/// `columns` are ignored. `with_defaults` means a row is being inserted, so
/// required columns that end up without a value are reported too. Failures
/// are recorded under `prefix` + column name.
pub fn collect_values<'p>(
    columns: impl IntoIterator<Item = &'p ColumnDescriptor>,
    supplied: &Map<String, Value>,
    with_defaults: bool,
    prefix: &str,
    errors: &mut FieldErrors,
) -> Vec<ColumnValue<'p>> {
    let mut values = Vec::new();
    for column in columns {
        let value = match supplied.get(&column.name) {
            Some(v) => Some(v.clone()),
            None if with_defaults => column.default_value(),
            None => None,
        };
        let Some(value) = value else {
            if with_defaults && column.required {
                errors.insert(format!("{}{}", prefix, column.name), "This field is required".to_string());
            }
            continue;
        };
        match column.validate(&value) {
            Ok(()) => values.push((column, value)),
            Err(message) => {
                errors.insert(format!("{}{}", prefix, column.name), message);
            }
        }
    }
    values
}
