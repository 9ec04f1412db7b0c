#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use plan_store_api::config::AppConfig;
use plan_store_api::database::DatabaseManager;
use plan_store_api::middleware::Claims;
use plan_store_api::plan::PlanRegistry;
use plan_store_api::state::AppState;

/// In-process application wired to the database named by `DATABASE_URL`.
pub struct TestApp {
    pub app: Router,
    pub pool: PgPool,
    secret: String,
}

/// A user with a private group, ready to receive grants.
pub struct TestUser {
    pub key: Uuid,
    pub group: Uuid,
    pub token: String,
}

/// Build the app, or `None` when no database is configured so the calling
/// test can return early.
pub async fn setup() -> Result<Option<TestApp>> {
    let _ = dotenvy::dotenv();
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping database test");
        return Ok(None);
    };

    let mut config = AppConfig::development();
    config.database.url = Some(url);
    config.database.max_connections = 5;

    let pool = DatabaseManager::connect(&config.database).await?;
    DatabaseManager::migrate(&pool).await?;

    let secret = config.security.jwt_secret.clone();
    let state = AppState::new(config, PlanRegistry::builtin()?, pool.clone());
    Ok(Some(TestApp {
        app: plan_store_api::app(state),
        pool,
        secret,
    }))
}

/// A name that will not collide with rows left behind by other tests.
pub fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => Body::from(serde_json::to_vec(&value)?),
            None => Body::empty(),
        };

        let response = self.app.clone().oneshot(builder.body(body)?).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, json))
    }

    pub fn token_for(&self, user: Uuid) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user,
            exp: now + 3600,
            iat: Some(now),
        };
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }

    /// Insert a user, a group of their own and the membership row.
    pub async fn create_user(&self) -> Result<TestUser> {
        let key: Uuid = sqlx::query_scalar("INSERT INTO users (name) VALUES ($1) RETURNING key")
            .bind(unique("user"))
            .fetch_one(&self.pool)
            .await?;
        let group: Uuid = sqlx::query_scalar("INSERT INTO groups (name) VALUES ($1) RETURNING key")
            .bind(unique("group"))
            .fetch_one(&self.pool)
            .await?;
        sqlx::query("INSERT INTO user_groups (user_key, group_key) VALUES ($1, $2)")
            .bind(key)
            .bind(group)
            .execute(&self.pool)
            .await?;
        let token = self.token_for(key)?;
        Ok(TestUser { key, group, token })
    }

    /// Type-level grants for `user` on `resource_type`.
    pub async fn grant(&self, user: &TestUser, resource_type: &str, permissions: &[&str]) -> Result<()> {
        for permission in permissions {
            sqlx::query("INSERT INTO permissions (group_key, resource_type, permission) VALUES ($1, $2, $3)")
                .bind(user.group)
                .bind(resource_type)
                .bind(*permission)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Instance-level grant for `user` on a single record.
    pub async fn grant_instance(
        &self,
        user: &TestUser,
        resource_type: &str,
        resource_key: Uuid,
        permission: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO permissions (group_key, resource_key, resource_type, permission) VALUES ($1, $2, $3, $4)",
        )
        .bind(user.group)
        .bind(resource_key)
        .bind(resource_type)
        .bind(permission)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_rows(&self, table: &str, column: &str, key: Uuid) -> Result<i64> {
        let sql = format!("SELECT count(*) FROM {} WHERE {} = $1", table, column);
        Ok(sqlx::query_scalar(&sql).bind(key).fetch_one(&self.pool).await?)
    }
}
