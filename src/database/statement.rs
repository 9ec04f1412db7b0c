use std::time::Instant;

use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{PgConnection, Postgres};
use uuid::Uuid;

use super::manager::DatabaseError;
use crate::config::DatabaseConfig;

/// A bound statement parameter. Caller-supplied column values are always
/// `Json` and get cast to the column type inside the SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Json(Value),
    Text(String),
    Uuid(Uuid),
    OptionalUuid(Option<Uuid>),
    Uuids(Vec<Uuid>),
    Texts(Vec<String>),
}

/// SQL text plus its ordered parameters. Placeholders are handed out by
/// `push`, so fragments can be composed without renumbering.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter and return its `$n` placeholder.
    pub fn push(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Append JSONB parameters produced by a fragment that was numbered
    /// starting after the current parameter count.
    pub fn extend_json(&mut self, params: Vec<Value>) {
        self.params.extend(params.into_iter().map(SqlParam::Json));
    }

    fn query(&self) -> sqlx::query::Query<'_, Postgres, PgArguments> {
        let mut q = sqlx::query(&self.sql);
        for p in &self.params {
            q = match p {
                SqlParam::Json(v) => q.bind(v.clone()),
                SqlParam::Text(s) => q.bind(s.clone()),
                SqlParam::Uuid(u) => q.bind(*u),
                SqlParam::OptionalUuid(u) => q.bind(*u),
                SqlParam::Uuids(us) => q.bind(us.clone()),
                SqlParam::Texts(ts) => q.bind(ts.clone()),
            };
        }
        q
    }

    pub async fn fetch_all(&self, conn: &mut PgConnection, config: &DatabaseConfig) -> Result<Vec<PgRow>, DatabaseError> {
        let started = self.log_start(config);
        let rows = self.query().fetch_all(&mut *conn).await?;
        self.log_finish(config, started);
        Ok(rows)
    }

    pub async fn fetch_one(&self, conn: &mut PgConnection, config: &DatabaseConfig) -> Result<PgRow, DatabaseError> {
        let started = self.log_start(config);
        let row = self.query().fetch_one(&mut *conn).await?;
        self.log_finish(config, started);
        Ok(row)
    }

    pub async fn execute(&self, conn: &mut PgConnection, config: &DatabaseConfig) -> Result<u64, DatabaseError> {
        let started = self.log_start(config);
        let result = self.query().execute(&mut *conn).await?;
        self.log_finish(config, started);
        Ok(result.rows_affected())
    }

    fn log_start(&self, config: &DatabaseConfig) -> Instant {
        if config.enable_query_logging {
            tracing::debug!(sql = %self.sql, params = self.params.len(), "executing statement");
        }
        Instant::now()
    }

    fn log_finish(&self, config: &DatabaseConfig, started: Instant) {
        let elapsed = started.elapsed().as_millis() as u64;
        if elapsed > config.slow_query_threshold_ms {
            tracing::warn!(elapsed_ms = elapsed, sql = %self.sql, "slow statement");
        }
    }
}
