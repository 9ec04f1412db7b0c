use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{FilterData, FilterOrderInfo, SqlResult};
use crate::config::FilterConfig;
use crate::plan::ColumnDescriptor;

/// Validated list query for one type. Everything is checked on assignment,
/// so a `Filter` that exists can always be rendered.
#[derive(Debug)]
pub struct Filter<'p> {
    alias: String,
    columns: Vec<&'p ColumnDescriptor>,
    where_data: Option<Value>,
    order_data: Vec<FilterOrderInfo>,
    limit: i64,
    offset: i64,
}

impl<'p> Filter<'p> {
    pub fn new(columns: Vec<&'p ColumnDescriptor>, alias: impl Into<String>, config: &FilterConfig) -> Self {
        Self {
            alias: alias.into(),
            columns,
            where_data: None,
            order_data: vec![],
            limit: config.default_limit,
            offset: 0,
        }
    }

    pub fn assign(&mut self, data: &FilterData, config: &FilterConfig) -> Result<&mut Self, FilterError> {
        if let Some(where_clause) = &data.filter {
            self.where_clause(where_clause.clone())?;
        }
        if let Some(order) = &data.order {
            self.order(order)?;
        }
        self.limit(data.limit.unwrap_or(config.default_limit), data.offset, config)?;
        Ok(self)
    }

    pub fn where_clause(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::generate(&self.columns, &self.alias, &conditions, 0)?;
        self.where_data = Some(conditions);
        Ok(self)
    }

    pub fn order(&mut self, order_spec: &Value) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::validate_and_parse(order_spec, &self.columns)?;
        Ok(self)
    }

    pub fn limit(&mut self, limit: i64, offset: Option<i64>, config: &FilterConfig) -> Result<&mut Self, FilterError> {
        if limit < 0 {
            return Err(FilterError::InvalidLimit("Limit must be non-negative".to_string()));
        }
        let offset = offset.unwrap_or(0);
        if offset < 0 {
            return Err(FilterError::InvalidOffset("Offset must be non-negative".to_string()));
        }

        self.limit = match config.max_limit {
            Some(max) if limit > max => {
                tracing::warn!("Limit {} exceeds max {}, capping to max", limit, max);
                max
            }
            _ => limit,
        };
        self.offset = offset;
        Ok(self)
    }

    pub fn limit_value(&self) -> i64 {
        self.limit
    }

    pub fn offset_value(&self) -> i64 {
        self.offset
    }

    /// Predicate with parameters numbered from `starting_param_index + 1`.
    pub fn to_where_sql(&self, starting_param_index: usize) -> Result<SqlResult, FilterError> {
        let (query, params) = match &self.where_data {
            Some(where_data) => FilterWhere::generate(&self.columns, &self.alias, where_data, starting_param_index)?,
            None => ("1=1".to_string(), vec![]),
        };
        Ok(SqlResult { query, params })
    }

    pub fn to_order_sql(&self) -> String {
        FilterOrder::generate(&self.order_data, &self.columns, &self.alias)
    }

    pub fn to_limit_sql(&self) -> String {
        format!("LIMIT {} OFFSET {}", self.limit, self.offset)
    }
}
