use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::plan::PlanRegistry;
use crate::services::RecordStore;

/// Everything a handler needs, built once at startup and cloned per request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub plan: Arc<PlanRegistry>,
    pub store: Arc<RecordStore>,
}

impl AppState {
    pub fn new(config: AppConfig, plan: PlanRegistry, pool: PgPool) -> Self {
        let config = Arc::new(config);
        let plan = Arc::new(plan);
        let store = Arc::new(RecordStore::new(plan.clone(), config.clone(), pool));
        Self { config, plan, store }
    }

    pub fn pool(&self) -> &PgPool {
        self.store.pool()
    }
}
