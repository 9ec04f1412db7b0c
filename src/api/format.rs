use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::database::Record;
use crate::permission::{Grants, RecordPermissions};

/// A record as returned to clients: `{ key, data, permissions }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordView {
    pub key: Uuid,
    pub data: Map<String, Value>,
    pub permissions: RecordPermissions,
}

/// Records grouped by type name.
pub type TypedRecords = BTreeMap<String, Vec<RecordView>>;

/// Body of a list response before the envelope is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListResult {
    pub data: TypedRecords,
    /// Largest per-type count of matching records, ignoring paging.
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Attach permission annotations to every record.
pub fn shape_records(records: Vec<Record>, grants: &Grants, resource_type: &str) -> Vec<RecordView> {
    records
        .into_iter()
        .map(|record| RecordView {
            permissions: grants.annotate(resource_type, record.key),
            key: record.key,
            data: record.data,
        })
        .collect()
}

/// Reorder records to follow `keys`; records not named are dropped.
pub fn in_key_order(records: Vec<RecordView>, keys: &[Uuid]) -> Vec<RecordView> {
    let mut by_key: HashMap<Uuid, RecordView> = records.into_iter().map(|r| (r.key, r)).collect();
    keys.iter().filter_map(|k| by_key.remove(k)).collect()
}

/// Fold per-type results into one list result. `total` is the maximum of
/// the per-type totals.
pub fn merge_results(parts: Vec<(String, Vec<RecordView>, i64)>, limit: i64, offset: i64) -> ListResult {
    let mut result = ListResult {
        limit,
        offset,
        ..Default::default()
    };
    for (type_name, records, total) in parts {
        result.total = result.total.max(total);
        result.data.insert(type_name, records);
    }
    result
}
