use std::collections::HashMap;

use serde_json::{Map, Value};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use super::manager::DatabaseError;
use super::record::Record;
use super::statement::{SqlParam, Statement};
use super::variant::VariantStore;
use crate::config::DatabaseConfig;
use crate::filter::Filter;
use crate::permission::Visibility;
use crate::plan::{quote_ident, ColumnValue, TypePlan};
use crate::types::Operation;

/// Alias of the base table in every generated statement.
pub const BASE_ALIAS: &str = "b";

/// `jsonb_build_object` accepts at most 100 arguments.
const PAIRS_PER_OBJECT: usize = 40;

/// Statement generation and execution for one plan type.
pub struct TypeRepository<'p> {
    plan: &'p TypePlan,
    db: &'p DatabaseConfig,
}

impl<'p> TypeRepository<'p> {
    pub fn new(plan: &'p TypePlan, db: &'p DatabaseConfig) -> Self {
        Self { plan, db }
    }

    pub fn variants(&self) -> Option<VariantStore<'p>> {
        self.plan.variants.as_ref().map(VariantStore::new)
    }

    fn table(&self) -> String {
        quote_ident(&self.plan.table)
    }

    /// Shared WHERE clause of list and count statements.
    fn where_sql(
        &self,
        stmt: &mut Statement,
        filter: Option<&Filter<'_>>,
        keys: Option<&[Uuid]>,
        visibility: &Visibility,
    ) -> Result<String, DatabaseError> {
        let mut clauses = Vec::new();
        if let Some(filter) = filter {
            let compiled = filter
                .to_where_sql(stmt.len())
                .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
            stmt.extend_json(compiled.params);
            clauses.push(compiled.query);
        }
        clauses.push(visibility.to_sql(stmt, BASE_ALIAS));
        if let Some(keys) = keys {
            let param = stmt.push(SqlParam::Uuids(keys.to_vec()));
            clauses.push(format!("{BASE_ALIAS}.\"key\" = ANY({param})"));
        }
        Ok(clauses
            .into_iter()
            .map(|c| format!("({})", c))
            .collect::<Vec<_>>()
            .join(" AND "))
    }

    fn select_list_sql(&self) -> String {
        let mut pairs = vec![("key".to_string(), format!("{BASE_ALIAS}.\"key\""))];
        for column in self.plan.columns_for(Operation::List) {
            pairs.push((column.name.clone(), column.select_sql(BASE_ALIAS)));
        }
        if let Some(variants) = self.variants() {
            pairs.extend(variants.select_pairs());
        }
        build_object(&pairs)
    }

    /// Read records visible under `visibility`. With a filter, its predicate,
    /// order and paging apply; `keys` restricts to the given records.
    pub async fn select(
        &self,
        conn: &mut PgConnection,
        filter: Option<&Filter<'_>>,
        keys: Option<&[Uuid]>,
        visibility: &Visibility,
    ) -> Result<Vec<Record>, DatabaseError> {
        let mut stmt = Statement::new();
        let where_sql = self.where_sql(&mut stmt, filter, keys, visibility)?;
        let joins = self.variants().map(|v| v.joins_sql(BASE_ALIAS)).unwrap_or_default();
        let tail = match filter {
            Some(f) => format!(" {} {}", f.to_order_sql(), f.to_limit_sql()),
            None => String::new(),
        };
        stmt.sql = format!(
            "SELECT {} AS row FROM {} {BASE_ALIAS}{joins} WHERE {where_sql}{tail}",
            self.select_list_sql(),
            self.table(),
        );

        let rows = stmt.fetch_all(conn, self.db).await?;
        rows.into_iter()
            .map(|row| {
                let joined: Value = row.try_get("row")?;
                self.decode(joined)
            })
            .collect()
    }

    /// Number of visible records matching the filter, ignoring paging.
    pub async fn count(
        &self,
        conn: &mut PgConnection,
        filter: Option<&Filter<'_>>,
        visibility: &Visibility,
    ) -> Result<i64, DatabaseError> {
        let mut stmt = Statement::new();
        let where_sql = self.where_sql(&mut stmt, filter, None, visibility)?;
        stmt.sql = format!(
            "SELECT COUNT(*) AS count FROM {} {BASE_ALIAS} WHERE {where_sql}",
            self.table()
        );
        let row = stmt.fetch_one(conn, self.db).await?;
        Ok(row.try_get("count")?)
    }

    fn decode(&self, joined: Value) -> Result<Record, DatabaseError> {
        let Value::Object(mut joined) = joined else {
            return Err(DatabaseError::QueryError("row is not an object".to_string()));
        };
        let key = joined
            .remove("key")
            .and_then(|k| k.as_str().and_then(|s| Uuid::parse_str(s).ok()))
            .ok_or_else(|| DatabaseError::QueryError("row has no key".to_string()))?;

        let mut data = Map::new();
        for column in self.plan.columns_for(Operation::List) {
            let value = joined.get(&column.name).cloned().unwrap_or(Value::Null);
            data.insert(column.name.clone(), value);
        }
        if let Some(variants) = self.variants() {
            variants.fold_row(&mut data, &joined);
        }
        Ok(Record { key, data })
    }

    /// Lock the existing rows among `keys`, returning each one's current
    /// discriminator (always `None` for plain types).
    pub async fn lock_existing(
        &self,
        conn: &mut PgConnection,
        keys: &[Uuid],
    ) -> Result<HashMap<Uuid, Option<String>>, DatabaseError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let discriminator = self
            .plan
            .variants
            .as_ref()
            .and_then(|v| self.plan.column(&v.discriminator));

        let mut stmt = Statement::new();
        let param = stmt.push(SqlParam::Uuids(keys.to_vec()));
        let disc_sql = match discriminator {
            Some(column) => format!(", {BASE_ALIAS}.{} AS discriminator", quote_ident(&column.column)),
            None => String::new(),
        };
        stmt.sql = format!(
            "SELECT {BASE_ALIAS}.\"key\" AS key{disc_sql} FROM {} {BASE_ALIAS} \
             WHERE {BASE_ALIAS}.\"key\" = ANY({param}) FOR UPDATE",
            self.table()
        );

        let rows = stmt.fetch_all(conn, self.db).await?;
        let mut existing = HashMap::with_capacity(rows.len());
        for row in rows {
            let key: Uuid = row.try_get("key")?;
            let disc: Option<String> = if discriminator.is_some() {
                row.try_get("discriminator")?
            } else {
                None
            };
            existing.insert(key, disc);
        }
        Ok(existing)
    }

    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        key: Uuid,
        values: &[ColumnValue<'p>],
    ) -> Result<(), DatabaseError> {
        let mut stmt = Statement::new();
        let mut columns = vec!["\"key\"".to_string()];
        let mut exprs = vec![stmt.push(SqlParam::Uuid(key))];
        for (column, value) in values {
            let param = stmt.push(SqlParam::Json(value.clone()));
            columns.push(quote_ident(&column.column));
            exprs.push(column.write_sql(&param));
        }
        stmt.sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table(),
            columns.join(", "),
            exprs.join(", ")
        );
        stmt.execute(conn, self.db).await?;
        Ok(())
    }

    pub async fn update(
        &self,
        conn: &mut PgConnection,
        key: Uuid,
        values: &[ColumnValue<'p>],
    ) -> Result<(), DatabaseError> {
        if values.is_empty() {
            return Ok(());
        }
        let mut stmt = Statement::new();
        let key_param = stmt.push(SqlParam::Uuid(key));
        let assignments: Vec<String> = values
            .iter()
            .map(|(column, value)| {
                let param = stmt.push(SqlParam::Json(value.clone()));
                format!("{} = {}", quote_ident(&column.column), column.write_sql(&param))
            })
            .collect();
        stmt.sql = format!(
            "UPDATE {} SET {} WHERE \"key\" = {key_param}",
            self.table(),
            assignments.join(", ")
        );
        stmt.execute(conn, self.db).await?;
        Ok(())
    }

    pub async fn delete(&self, conn: &mut PgConnection, keys: &[Uuid]) -> Result<u64, DatabaseError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut stmt = Statement::new();
        let param = stmt.push(SqlParam::Uuids(keys.to_vec()));
        stmt.sql = format!("DELETE FROM {} WHERE \"key\" = ANY({param})", self.table());
        stmt.execute(conn, self.db).await
    }
}

/// `jsonb_build_object(...) || ...` over `(name, expression)` pairs.
fn build_object(pairs: &[(String, String)]) -> String {
    pairs
        .chunks(PAIRS_PER_OBJECT)
        .map(|chunk| {
            let args: Vec<String> = chunk
                .iter()
                .map(|(name, expr)| format!("'{}', {}", name.replace('\'', "''"), expr))
                .collect();
            format!("jsonb_build_object({})", args.join(", "))
        })
        .collect::<Vec<_>>()
        .join(" || ")
}
