use sqlx::{PgConnection, Row};
use uuid::Uuid;

use super::{GrantRow, Grants, Identity, Permission};
use crate::config::DatabaseConfig;
use crate::database::statement::{SqlParam, Statement};
use crate::database::DatabaseError;

/// Which rows of a type the caller may read.
#[derive(Debug, Clone, PartialEq)]
pub enum Visibility {
    /// Type-level `view` grant.
    All,
    /// Only rows carrying an instance-level `view` grant for this user.
    Instances {
        resource_type: String,
        user_key: Uuid,
        guest_group: String,
    },
    Nothing,
}

impl Visibility {
    /// Predicate over the `key` column of the base table aliased `alias`.
    pub fn to_sql(&self, stmt: &mut Statement, alias: &str) -> String {
        match self {
            Visibility::All => "1=1".to_string(),
            Visibility::Nothing => "1=0".to_string(),
            Visibility::Instances {
                resource_type,
                user_key,
                guest_group,
            } => {
                let rt = stmt.push(SqlParam::Text(resource_type.clone()));
                let user = stmt.push(SqlParam::Uuid(*user_key));
                let guest = stmt.push(SqlParam::Text(guest_group.clone()));
                format!(
                    "{alias}.\"key\" IN (SELECT p.resource_key FROM permissions p \
                     JOIN user_groups ug ON ug.group_key = p.group_key \
                     JOIN groups g ON g.key = p.group_key \
                     WHERE ug.user_key = {user} AND p.resource_type = {rt} \
                     AND p.permission = 'view' AND p.resource_key IS NOT NULL AND g.name <> {guest})"
                )
            }
        }
    }
}

/// Loads grants for an identity and turns them into decisions.
#[derive(Debug, Clone)]
pub struct PermissionEngine {
    guest_group: String,
}

impl PermissionEngine {
    pub fn new(guest_group: impl Into<String>) -> Self {
        Self {
            guest_group: guest_group.into(),
        }
    }

    pub fn guest_group(&self) -> &str {
        &self.guest_group
    }

    /// Type-level grants for `resource_types`, plus instance grants for `keys`.
    pub async fn load_grants(
        &self,
        conn: &mut PgConnection,
        db: &DatabaseConfig,
        identity: &Identity,
        resource_types: &[&str],
        keys: &[Uuid],
    ) -> Result<Grants, DatabaseError> {
        if resource_types.is_empty() {
            return Ok(Grants::default());
        }

        let mut stmt = Statement::new();
        let guest = stmt.push(SqlParam::Text(self.guest_group.clone()));
        let types = stmt.push(SqlParam::Texts(resource_types.iter().map(|s| s.to_string()).collect()));
        let key_list = stmt.push(SqlParam::Uuids(keys.to_vec()));
        let user = stmt.push(SqlParam::OptionalUuid(identity.user_key()));
        stmt.sql = format!(
            "SELECT p.resource_key, p.resource_type, p.permission, (g.name = {guest}) AS is_guest \
             FROM permissions p JOIN groups g ON g.key = p.group_key \
             WHERE p.resource_type = ANY({types}) \
             AND (p.resource_key IS NULL OR p.resource_key = ANY({key_list})) \
             AND (g.name = {guest} OR EXISTS (SELECT 1 FROM user_groups ug \
                  WHERE ug.group_key = p.group_key AND ug.user_key = {user}))"
        );

        let rows = stmt.fetch_all(conn, db).await?;
        let mut grants = Vec::with_capacity(rows.len());
        for row in rows {
            let permission: String = row.try_get("permission")?;
            let Ok(permission) = permission.parse::<Permission>() else {
                tracing::warn!("Ignoring grant with unknown permission '{}'", permission);
                continue;
            };
            grants.push(GrantRow {
                resource_key: row.try_get("resource_key")?,
                resource_type: row.try_get("resource_type")?,
                permission,
                guest: row.try_get("is_guest")?,
            });
        }
        Ok(Grants::from_rows(grants))
    }

    /// Whether the caller holds every `(resource_type, permission)` pair at type level.
    pub async fn authorize(
        &self,
        conn: &mut PgConnection,
        db: &DatabaseConfig,
        identity: &Identity,
        required: &[(&str, Permission)],
    ) -> Result<bool, DatabaseError> {
        let types: Vec<&str> = required.iter().map(|(rt, _)| *rt).collect();
        let grants = self.load_grants(conn, db, identity, &types, &[]).await?;
        Ok(grants.authorize(required.iter().copied()))
    }

    pub fn visibility(&self, grants: &Grants, identity: &Identity, resource_type: &str) -> Visibility {
        if grants.allows_type(resource_type, Permission::View) {
            return Visibility::All;
        }
        match identity.user_key() {
            Some(user_key) => Visibility::Instances {
                resource_type: resource_type.to_string(),
                user_key,
                guest_group: self.guest_group.clone(),
            },
            None => Visibility::Nothing,
        }
    }

    /// Drop instance grants that point at deleted records.
    pub async fn revoke_instances(
        &self,
        conn: &mut PgConnection,
        db: &DatabaseConfig,
        resource_type: &str,
        keys: &[Uuid],
    ) -> Result<u64, DatabaseError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut stmt = Statement::new();
        let rt = stmt.push(SqlParam::Text(resource_type.to_string()));
        let key_list = stmt.push(SqlParam::Uuids(keys.to_vec()));
        stmt.sql = format!("DELETE FROM permissions WHERE resource_type = {rt} AND resource_key = ANY({key_list})");
        stmt.execute(conn, db).await
    }
}
