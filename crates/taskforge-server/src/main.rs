//! Taskforge Server — maintenance entry point.
//!
//! Bootstraps the credential store (connection + migrations) and runs
//! the periodic retention sweep: refresh tokens expired past their
//! grace window and audit entries past their retention period. The
//! HTTP API layer is hosted separately and is not part of this binary.

use std::time::Duration;

use chrono::Utc;
use taskforge_auth::{AnomalyThresholds, AuditService};
use taskforge_core::repository::RefreshTokenRepository;
use taskforge_db::repository::{SurrealAuthAuditRepository, SurrealRefreshTokenRepository};
use taskforge_db::{DbConfig, DbManager};
use tracing_subscriber::EnvFilter;

fn db_config_from_env() -> DbConfig {
    let defaults = DbConfig::default();
    DbConfig {
        url: std::env::var("TASKFORGE_DB_URL").unwrap_or(defaults.url),
        namespace: std::env::var("TASKFORGE_DB_NAMESPACE").unwrap_or(defaults.namespace),
        database: std::env::var("TASKFORGE_DB_DATABASE").unwrap_or(defaults.database),
        username: std::env::var("TASKFORGE_DB_USERNAME").unwrap_or(defaults.username),
        password: std::env::var("TASKFORGE_DB_PASSWORD").unwrap_or(defaults.password),
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("taskforge=info".parse().unwrap()),
        )
        .json()
        .init();

    tracing::info!("Starting Taskforge maintenance server...");

    let db_config = db_config_from_env();
    let manager = match DbManager::connect(&db_config).await {
        Ok(m) => m,
        Err(err) => {
            tracing::error!(error = %err, "Failed to connect to SurrealDB");
            std::process::exit(1);
        }
    };

    if let Err(err) = taskforge_db::run_migrations(manager.client()).await {
        tracing::error!(error = %err, "Migrations failed");
        std::process::exit(1);
    }

    let tokens = SurrealRefreshTokenRepository::new(manager.client().clone());
    let audit = AuditService::new(
        SurrealAuthAuditRepository::new(manager.client().clone()),
        AnomalyThresholds::default(),
    );

    let token_retention_days = env_i64("TASKFORGE_TOKEN_RETENTION_DAYS", 30);
    let sweep_interval_secs = env_u64("TASKFORGE_SWEEP_INTERVAL_SECS", 3600);

    let mut interval = tokio::time::interval(Duration::from_secs(sweep_interval_secs));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let cutoff = Utc::now() - chrono::Duration::days(token_retention_days);
                match tokens.purge_expired_before(cutoff).await {
                    Ok(purged) if purged > 0 => {
                        tracing::info!(purged, "Removed expired refresh tokens");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "Refresh token sweep failed"),
                }

                match audit.purge_expired().await {
                    Ok(purged) if purged > 0 => {
                        tracing::info!(purged, "Removed audit entries past retention");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "Audit retention sweep failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    tracing::info!("Taskforge maintenance server stopped.");
}
