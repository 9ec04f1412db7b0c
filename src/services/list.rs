use futures::future::try_join_all;
use sqlx::PgConnection;
use uuid::Uuid;

use super::{RecordStore, StoreError};
use crate::api::format::{in_key_order, merge_results, shape_records, ListResult, RecordView};
use crate::database::repository::BASE_ALIAS;
use crate::database::{Record, TypeRepository};
use crate::filter::{Filter, FilterData};
use crate::permission::{Identity, Visibility};
use crate::plan::{FieldErrors, TypePlan};
use crate::types::Operation;

impl RecordStore {
    /// List one or more types of `group`. Every filter is validated against
    /// every type before any statement runs; the types are then read in
    /// parallel on separate pool connections.
    pub async fn list(
        &self,
        identity: &Identity,
        group: &str,
        types: &[String],
        data: &FilterData,
    ) -> Result<ListResult, StoreError> {
        if types.is_empty() {
            return Err(StoreError::validation("At least one type must be requested", FieldErrors::new()));
        }

        let mut prepared = Vec::with_capacity(types.len());
        for type_name in types {
            let plan = self.plan.type_plan(group, type_name)?;
            let mut filter = Filter::new(plan.columns_for(Operation::List), BASE_ALIAS, &self.config.filter);
            filter.assign(data, &self.config.filter)?;
            prepared.push((type_name, plan, filter));
        }
        let (limit, offset) = prepared
            .first()
            .map(|(_, _, f)| (f.limit_value(), f.offset_value()))
            .unwrap_or_default();

        let parts = try_join_all(prepared.into_iter().map(|(type_name, plan, filter)| async move {
            let mut conn = self.pool.acquire().await?;
            let (records, total) = self.list_type(&mut conn, identity, plan, &filter).await?;
            Ok::<_, StoreError>((type_name.clone(), records, total))
        }))
        .await?;

        tracing::debug!(group, types = ?types, identity = %identity, "listed records");
        Ok(merge_results(parts, limit, offset))
    }

    async fn list_type(
        &self,
        conn: &mut PgConnection,
        identity: &Identity,
        plan: &TypePlan,
        filter: &Filter<'_>,
    ) -> Result<(Vec<RecordView>, i64), StoreError> {
        let visibility = self.visibility(conn, identity, plan).await?;
        if visibility == Visibility::Nothing {
            return Ok((Vec::new(), 0));
        }

        let repo = TypeRepository::new(plan, self.db());
        let total = repo.count(conn, Some(filter), &visibility).await?;
        let records = repo.select(conn, Some(filter), None, &visibility).await?;
        let views = self.annotate(conn, identity, plan, records).await?;
        Ok((views, total))
    }

    /// Read records back by key, in key order, through the same visibility
    /// and annotation as a list.
    pub(crate) async fn read_keys(
        &self,
        conn: &mut PgConnection,
        identity: &Identity,
        plan: &TypePlan,
        keys: &[Uuid],
    ) -> Result<Vec<RecordView>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let visibility = self.visibility(conn, identity, plan).await?;
        if visibility == Visibility::Nothing {
            return Ok(Vec::new());
        }

        let repo = TypeRepository::new(plan, self.db());
        let records = repo.select(conn, None, Some(keys), &visibility).await?;
        let views = self.annotate(conn, identity, plan, records).await?;
        Ok(in_key_order(views, keys))
    }

    async fn visibility(
        &self,
        conn: &mut PgConnection,
        identity: &Identity,
        plan: &TypePlan,
    ) -> Result<Visibility, StoreError> {
        let grants = self
            .permissions
            .load_grants(conn, self.db(), identity, &[plan.resource_type.as_str()], &[])
            .await?;
        Ok(self.permissions.visibility(&grants, identity, &plan.resource_type))
    }

    async fn annotate(
        &self,
        conn: &mut PgConnection,
        identity: &Identity,
        plan: &TypePlan,
        records: Vec<Record>,
    ) -> Result<Vec<RecordView>, StoreError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<Uuid> = records.iter().map(|r| r.key).collect();
        let grants = self
            .permissions
            .load_grants(conn, self.db(), identity, &[plan.resource_type.as_str()], &keys)
            .await?;
        Ok(shape_records(records, &grants, &plan.resource_type))
    }
}
