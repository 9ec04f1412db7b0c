//! Record operations over the plan: the list path and the mutation
//! coordinator. Handlers only parse requests and shape responses; all
//! permission checks and transactions live here.

pub mod error;
pub mod list;
pub mod mutation;
pub mod prepare;

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::{AppConfig, DatabaseConfig};
use crate::permission::PermissionEngine;
use crate::plan::PlanRegistry;

pub use error::StoreError;

/// Shared handle to the plan, the pool and the permission engine.
#[derive(Debug, Clone)]
pub struct RecordStore {
    plan: Arc<PlanRegistry>,
    config: Arc<AppConfig>,
    permissions: PermissionEngine,
    pool: PgPool,
}

impl RecordStore {
    pub fn new(plan: Arc<PlanRegistry>, config: Arc<AppConfig>, pool: PgPool) -> Self {
        let permissions = PermissionEngine::new(config.security.guest_group.clone());
        Self {
            plan,
            config,
            permissions,
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn db(&self) -> &DatabaseConfig {
        &self.config.database
    }
}
