use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::AppConfig;
use crate::database::DatabaseManager;
use crate::plan::PlanRegistry;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "plan-store")]
#[command(about = "Plan-driven, permission-aware record store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Port to listen on; overrides PLAN_STORE_PORT/PORT")]
        port: Option<u16>,
    },

    #[command(about = "Load and validate a plan file, then list its groups and types")]
    CheckPlan {
        #[arg(help = "Plan YAML file; the built-in plan when omitted")]
        path: Option<PathBuf>,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            let mut config = AppConfig::from_env();
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Commands::CheckPlan { path } => check_plan(path.as_deref()),
    }
}

/// Load the configured plan, or the built-in one.
pub fn load_plan(path: Option<&std::path::Path>) -> anyhow::Result<PlanRegistry> {
    let plan = match path {
        Some(path) => PlanRegistry::from_path(path).with_context(|| format!("loading plan {}", path.display()))?,
        None => PlanRegistry::builtin().context("loading built-in plan")?,
    };
    Ok(plan)
}

pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting Plan Store API in {:?} mode", config.environment);
    if config.security.jwt_secret.is_empty() {
        if config.is_production() {
            anyhow::bail!("JWT_SECRET must be set in production");
        }
        tracing::warn!("JWT_SECRET is not set; every bearer token will be rejected");
    }

    let plan = load_plan(config.plan.path.as_deref())?;
    tracing::info!("Loaded plan with {} groups", plan.groups().count());

    let pool = DatabaseManager::connect(&config.database).await?;
    if config.database.run_migrations {
        DatabaseManager::migrate(&pool).await?;
    }

    let cors = cors_layer(&config);
    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let state = AppState::new(config, plan, pool);
    let app = crate::app(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Plan Store API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if !config.security.enable_cors {
        return CorsLayer::new();
    }
    let origins: Vec<axum::http::HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

pub fn check_plan(path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let plan = load_plan(path)?;
    for group in plan.groups() {
        println!("{}", group.name);
        for (name, type_plan) in &group.types {
            let variants = type_plan
                .variants
                .as_ref()
                .map(|v| format!(" variants: {}", v.variants.keys().cloned().collect::<Vec<_>>().join(", ")))
                .unwrap_or_default();
            println!(
                "  {} -> {} ({} columns){}",
                name,
                type_plan.table,
                type_plan.columns.len(),
                variants
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve() {
        let cli = Cli::parse_from(["plan-store"]);
        assert!(cli.command.is_none());
        let cli = Cli::parse_from(["plan-store", "check-plan", "plan.yaml"]);
        assert!(matches!(cli.command, Some(Commands::CheckPlan { path: Some(_) })));
    }

    #[test]
    fn check_plan_accepts_builtin_and_rejects_missing_file() {
        assert!(check_plan(None).is_ok());
        assert!(check_plan(Some(std::path::Path::new("/nonexistent/plan.yaml"))).is_err());
    }
}
