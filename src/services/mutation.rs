use std::collections::HashMap;

use sqlx::PgConnection;
use uuid::Uuid;

use super::prepare::{prepare_create, prepare_update, PreparedRecord};
use super::{RecordStore, StoreError};
use crate::api::format::TypedRecords;
use crate::database::{Batch, RecordInput, TypeRepository};
use crate::permission::{Identity, Permission};
use crate::plan::{FieldErrors, TypePlan};

type Prepared<'p> = Vec<(&'p TypePlan, Vec<PreparedRecord<'p>>)>;

impl RecordStore {
    fn resolve<'b>(&self, group: &str, batch: &'b Batch) -> Result<Vec<(&TypePlan, &'b [RecordInput])>, StoreError> {
        batch
            .iter()
            .map(|(type_name, records)| Ok((self.plan.type_plan(group, type_name)?, records.as_slice())))
            .collect()
    }

    /// Create every record of the batch in one transaction. Requires a
    /// type-level `create` grant on every type involved.
    pub async fn create(&self, identity: &Identity, group: &str, batch: &Batch) -> Result<TypedRecords, StoreError> {
        let plans = self.resolve(group, batch)?;

        let mut errors = FieldErrors::new();
        let mut prepared: Prepared<'_> = Vec::with_capacity(plans.len());
        for (plan, inputs) in &plans {
            let records = inputs
                .iter()
                .enumerate()
                .map(|(i, input)| prepare_create(*plan, input, i, &mut errors))
                .collect();
            prepared.push((*plan, records));
        }
        if !errors.is_empty() {
            return Err(StoreError::validation("Validation failed", errors));
        }

        let mut tx = self.pool.begin().await?;
        let required: Vec<(&str, Permission)> = plans
            .iter()
            .map(|(plan, _)| (plan.resource_type.as_str(), Permission::Create))
            .collect();
        if !self.permissions.authorize(&mut tx, self.db(), identity, &required).await? {
            tracing::warn!(identity = %identity, group, "create denied");
            return Err(StoreError::PermissionDenied);
        }

        self.write_all(&mut tx, &prepared).await?;
        let result = self.read_back(&mut tx, identity, &prepared).await?;
        tx.commit().await?;

        tracing::info!(identity = %identity, group, records = count(&prepared), "created records");
        Ok(result)
    }

    /// Upsert: existing keys are updated (needs `update` on the record),
    /// missing or unknown keys are created (needs type-level `create`).
    pub async fn update(&self, identity: &Identity, group: &str, batch: &Batch) -> Result<TypedRecords, StoreError> {
        let plans = self.resolve(group, batch)?;
        let mut tx = self.pool.begin().await?;

        let existing = self.lock_existing(&mut tx, &plans).await?;
        let grants = self
            .permissions
            .load_grants(
                &mut tx,
                self.db(),
                identity,
                &resource_types(&plans),
                &existing_keys(&existing),
            )
            .await?;

        for ((plan, inputs), rows) in plans.iter().zip(&existing) {
            for input in inputs.iter() {
                let allowed = match input.key.filter(|k| rows.contains_key(k)) {
                    Some(key) => grants.allows(&plan.resource_type, Permission::Update, key),
                    None => grants.allows_type(&plan.resource_type, Permission::Create),
                };
                if !allowed {
                    tracing::warn!(identity = %identity, group, resource_type = %plan.resource_type, "update denied");
                    return Err(StoreError::PermissionDenied);
                }
            }
        }

        let mut errors = FieldErrors::new();
        let mut prepared: Prepared<'_> = Vec::with_capacity(plans.len());
        for ((plan, inputs), rows) in plans.iter().zip(&existing) {
            let mut records = Vec::with_capacity(inputs.len());
            for (i, input) in inputs.iter().enumerate() {
                let record = match input.key.and_then(|k| rows.get(&k).map(|current| (k, current))) {
                    Some((key, current)) => prepare_update(*plan, input, key, current.as_deref(), i, &mut errors),
                    None => prepare_create(*plan, input, i, &mut errors),
                };
                records.push(record);
            }
            prepared.push((*plan, records));
        }
        if !errors.is_empty() {
            return Err(StoreError::validation("Validation failed", errors));
        }

        self.write_all(&mut tx, &prepared).await?;
        let result = self.read_back(&mut tx, identity, &prepared).await?;
        tx.commit().await?;

        tracing::info!(identity = %identity, group, records = count(&prepared), "updated records");
        Ok(result)
    }

    /// Physically delete existing records; unknown keys are ignored. Side
    /// rows and instance grants of the deleted records go with them.
    pub async fn delete(&self, identity: &Identity, group: &str, batch: &Batch) -> Result<(), StoreError> {
        let plans = self.resolve(group, batch)?;
        for (_, inputs) in &plans {
            for input in inputs.iter() {
                input.require_key()?;
            }
        }

        let mut tx = self.pool.begin().await?;
        let existing = self.lock_existing(&mut tx, &plans).await?;
        let grants = self
            .permissions
            .load_grants(
                &mut tx,
                self.db(),
                identity,
                &resource_types(&plans),
                &existing_keys(&existing),
            )
            .await?;

        for ((plan, _), rows) in plans.iter().zip(&existing) {
            if let Some(key) = rows
                .keys()
                .find(|k| !grants.allows(&plan.resource_type, Permission::Delete, **k))
            {
                tracing::warn!(identity = %identity, group, %key, "delete denied");
                return Err(StoreError::PermissionDenied);
            }
        }

        let mut deleted = 0;
        for ((plan, _), rows) in plans.iter().zip(&existing) {
            let keys: Vec<Uuid> = rows.keys().copied().collect();
            let repo = TypeRepository::new(plan, self.db());
            if let Some(variants) = repo.variants() {
                variants.delete_all(&mut tx, self.db(), &keys).await?;
            }
            deleted += repo.delete(&mut tx, &keys).await?;
            self.permissions
                .revoke_instances(&mut tx, self.db(), &plan.resource_type, &keys)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(identity = %identity, group, records = deleted, "deleted records");
        Ok(())
    }

    /// Lock the rows named by the batch, per type in batch order.
    async fn lock_existing(
        &self,
        conn: &mut PgConnection,
        plans: &[(&TypePlan, &[RecordInput])],
    ) -> Result<Vec<HashMap<Uuid, Option<String>>>, StoreError> {
        let mut existing = Vec::with_capacity(plans.len());
        for (plan, inputs) in plans {
            let keys: Vec<Uuid> = inputs.iter().filter_map(|i| i.key).collect();
            let repo = TypeRepository::new(plan, self.db());
            existing.push(repo.lock_existing(conn, &keys).await?);
        }
        Ok(existing)
    }

    /// Types are written one after another in batch (name) order.
    async fn write_all(&self, conn: &mut PgConnection, prepared: &Prepared<'_>) -> Result<(), StoreError> {
        for (plan, records) in prepared {
            let repo = TypeRepository::new(plan, self.db());
            let variants = repo.variants();
            for record in records {
                if record.exists {
                    repo.update(conn, record.key, &record.base).await?;
                } else {
                    repo.insert(conn, record.key, &record.base).await?;
                }
                if let Some(variants) = &variants {
                    variants.apply(conn, self.db(), record.key, &record.side).await?;
                }
            }
        }
        Ok(())
    }

    async fn read_back(
        &self,
        conn: &mut PgConnection,
        identity: &Identity,
        prepared: &Prepared<'_>,
    ) -> Result<TypedRecords, StoreError> {
        let mut result = TypedRecords::new();
        for (plan, records) in prepared {
            let keys: Vec<Uuid> = records.iter().map(|r| r.key).collect();
            let views = self.read_keys(conn, identity, plan, &keys).await?;
            if views.len() < keys.len() {
                tracing::debug!(
                    identity = %identity,
                    resource_type = %plan.resource_type,
                    written = keys.len(),
                    visible = views.len(),
                    "written records hidden from response; caller lacks view"
                );
            }
            result.insert(plan.name.clone(), views);
        }
        Ok(result)
    }
}

fn resource_types<'p>(plans: &[(&'p TypePlan, &[RecordInput])]) -> Vec<&'p str> {
    plans.iter().map(|(plan, _)| plan.resource_type.as_str()).collect()
}

fn existing_keys(existing: &[HashMap<Uuid, Option<String>>]) -> Vec<Uuid> {
    existing.iter().flat_map(|rows| rows.keys().copied()).collect()
}

fn count(prepared: &Prepared<'_>) -> usize {
    prepared.iter().map(|(_, records)| records.len()).sum()
}
