//! Side-table handling for variant entities.
//!
//! A variant entity is one base row plus at most one side-table row, chosen
//! by the discriminator column. Reads LEFT JOIN every side table; writes keep
//! the side row in lockstep with the discriminator.

use serde_json::{Map, Value};
use sqlx::PgConnection;
use uuid::Uuid;

use super::manager::DatabaseError;
use super::statement::{SqlParam, Statement};
use crate::config::DatabaseConfig;
use crate::plan::{collect_values, quote_ident, ColumnValue, FieldErrors, VariantPlan, VariantTable};

/// Side-table work for one record.
#[derive(Debug)]
pub enum SideWrite<'p> {
    Keep,
    /// Same variant as before; merge the supplied fields into its side row.
    Upsert {
        table: &'p VariantTable,
        values: Vec<ColumnValue<'p>>,
    },
    /// Variant changed: the old side row goes, the new one is inserted.
    Switch {
        from: Option<&'p VariantTable>,
        to: Option<(&'p VariantTable, Vec<ColumnValue<'p>>)>,
    },
}

pub struct VariantStore<'p> {
    plan: &'p VariantPlan,
}

impl<'p> VariantStore<'p> {
    pub fn new(plan: &'p VariantPlan) -> Self {
        Self { plan }
    }

    fn alias(variant: &VariantTable) -> String {
        format!("v_{}", variant.name)
    }

    /// Output name of a side-table column in the joined row.
    fn output_name(variant: &VariantTable, column: &str) -> String {
        format!("{}.{}", variant.name, column)
    }

    pub fn joins_sql(&self, base_alias: &str) -> String {
        let fk = quote_ident(&self.plan.foreign_key);
        self.plan
            .variants
            .values()
            .map(|v| {
                let alias = Self::alias(v);
                format!(
                    " LEFT JOIN {} {alias} ON {alias}.{fk} = {base_alias}.\"key\"",
                    quote_ident(&v.table)
                )
            })
            .collect()
    }

    /// `(output name, select expression)` for every side-table column.
    pub fn select_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for variant in self.plan.variants.values() {
            let alias = Self::alias(variant);
            for column in &variant.columns {
                pairs.push((Self::output_name(variant, &column.name), column.select_sql(&alias)));
            }
        }
        pairs
    }

    /// Copy the active variant's columns from the joined row into `data`.
    pub fn fold_row(&self, data: &mut Map<String, Value>, joined: &Map<String, Value>) {
        let active = data
            .get(&self.plan.discriminator)
            .and_then(Value::as_str)
            .and_then(|name| self.plan.variant(name));
        if let Some(variant) = active {
            for column in &variant.columns {
                let value = joined
                    .get(&Self::output_name(variant, &column.name))
                    .cloned()
                    .unwrap_or(Value::Null);
                data.insert(column.name.clone(), value);
            }
        }
    }

    /// Decide the side-table writes for a discriminator moving from `old` to
    /// `new`. Supplied fields outside the target variant are dropped; when a
    /// new side row is created, omitted fields take their defaults.
    pub fn plan_write(
        &self,
        old: Option<&str>,
        new: Option<&str>,
        supplied: &Map<String, Value>,
        prefix: &str,
        errors: &mut FieldErrors,
    ) -> SideWrite<'p> {
        let target = match new {
            Some(name) => match self.plan.variant(name) {
                Some(v) => Some(v),
                None => {
                    errors.insert(
                        format!("{}{}", prefix, self.plan.discriminator),
                        format!("Unknown variant '{}'", name),
                    );
                    return SideWrite::Keep;
                }
            },
            None => None,
        };

        if old == new {
            return match target {
                Some(table) => {
                    let values = collect_values(&table.columns, supplied, false, prefix, errors);
                    if values.is_empty() {
                        SideWrite::Keep
                    } else {
                        SideWrite::Upsert { table, values }
                    }
                }
                None => SideWrite::Keep,
            };
        }

        let from = old.and_then(|name| self.plan.variant(name));
        let to = target.map(|table| (table, collect_values(&table.columns, supplied, true, prefix, errors)));
        SideWrite::Switch { from, to }
    }

    pub async fn apply(
        &self,
        conn: &mut PgConnection,
        db: &DatabaseConfig,
        key: Uuid,
        write: &SideWrite<'p>,
    ) -> Result<(), DatabaseError> {
        match write {
            SideWrite::Keep => Ok(()),
            SideWrite::Upsert { table, values } => self.merge(conn, db, key, table, values).await,
            SideWrite::Switch { from, to } => {
                if let Some(from) = from {
                    self.delete_from(conn, db, from, &[key]).await?;
                }
                if let Some((table, values)) = to {
                    self.insert(conn, db, key, table, values).await?;
                }
                Ok(())
            }
        }
    }

    /// Update the existing side row in place; insert it when it is missing.
    async fn merge(
        &self,
        conn: &mut PgConnection,
        db: &DatabaseConfig,
        key: Uuid,
        table: &VariantTable,
        values: &[ColumnValue<'p>],
    ) -> Result<(), DatabaseError> {
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
            "UPDATE {} SET {} WHERE {} = {key_param}",
            quote_ident(&table.table),
            assignments.join(", "),
            quote_ident(&self.plan.foreign_key),
        );
        if stmt.execute(&mut *conn, db).await? == 0 {
            self.insert(conn, db, key, table, values).await?;
        }
        Ok(())
    }

    async fn insert(
        &self,
        conn: &mut PgConnection,
        db: &DatabaseConfig,
        key: Uuid,
        table: &VariantTable,
        values: &[ColumnValue<'p>],
    ) -> Result<(), DatabaseError> {
        let fk = quote_ident(&self.plan.foreign_key);
        let mut stmt = Statement::new();
        let key_param = stmt.push(SqlParam::Uuid(key));

        let mut columns = vec![fk.clone()];
        let mut exprs = vec![key_param];
        let mut updates = Vec::new();
        for (column, value) in values {
            let param = stmt.push(SqlParam::Json(value.clone()));
            let quoted = quote_ident(&column.column);
            exprs.push(column.write_sql(&param));
            updates.push(format!("{quoted} = EXCLUDED.{quoted}"));
            columns.push(quoted);
        }
        let on_conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        stmt.sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({fk}) {on_conflict}",
            quote_ident(&table.table),
            columns.join(", "),
            exprs.join(", "),
        );
        stmt.execute(conn, db).await?;
        Ok(())
    }

    async fn delete_from(
        &self,
        conn: &mut PgConnection,
        db: &DatabaseConfig,
        table: &VariantTable,
        keys: &[Uuid],
    ) -> Result<u64, DatabaseError> {
        let mut stmt = Statement::new();
        let keys = stmt.push(SqlParam::Uuids(keys.to_vec()));
        stmt.sql = format!(
            "DELETE FROM {} WHERE {} = ANY({keys})",
            quote_ident(&table.table),
            quote_ident(&self.plan.foreign_key)
        );
        stmt.execute(conn, db).await
    }

    /// Remove side rows of every variant for `keys`.
    pub async fn delete_all(
        &self,
        conn: &mut PgConnection,
        db: &DatabaseConfig,
        keys: &[Uuid],
    ) -> Result<(), DatabaseError> {
        for table in self.plan.variants.values() {
            self.delete_from(conn, db, table, keys).await?;
        }
        Ok(())
    }
}
