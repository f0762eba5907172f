//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! UUIDs are stored as strings. Enums are stored as strings with
//! ASSERT constraints for validation.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1 — initial table definitions
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Users
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD name ON TABLE user TYPE string;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD password_hash ON TABLE user TYPE string;
DEFINE FIELD mfa_enabled ON TABLE user TYPE bool DEFAULT false;
DEFINE FIELD mfa_secret ON TABLE user TYPE option<string>;
DEFINE FIELD mfa_confirmed ON TABLE user TYPE bool DEFAULT false;
DEFINE FIELD backup_code_hashes ON TABLE user TYPE array<string> \
    DEFAULT [];
DEFINE FIELD password_changed_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_email ON TABLE user COLUMNS email UNIQUE;

-- =======================================================================
-- Refresh tokens (rotation chain links)
-- =======================================================================
DEFINE TABLE refresh_token SCHEMAFULL;
DEFINE FIELD user_id ON TABLE refresh_token TYPE string;
DEFINE FIELD token_hash ON TABLE refresh_token TYPE string;
DEFINE FIELD ip_address ON TABLE refresh_token TYPE option<string>;
DEFINE FIELD user_agent ON TABLE refresh_token TYPE option<string>;
DEFINE FIELD issued_at ON TABLE refresh_token TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD expires_at ON TABLE refresh_token TYPE datetime;
DEFINE FIELD revoked_at ON TABLE refresh_token TYPE option<datetime>;
DEFINE FIELD replaced_by ON TABLE refresh_token TYPE option<string>;
DEFINE INDEX idx_refresh_token_hash ON TABLE refresh_token \
    COLUMNS token_hash UNIQUE;
DEFINE INDEX idx_refresh_token_user ON TABLE refresh_token \
    COLUMNS user_id;
DEFINE INDEX idx_refresh_token_expiry ON TABLE refresh_token \
    COLUMNS expires_at;

-- =======================================================================
-- Auth audit log (append-only)
-- =======================================================================
DEFINE TABLE auth_audit SCHEMAFULL;
DEFINE FIELD event ON TABLE auth_audit TYPE string \
    ASSERT $value IN ['Login', 'LoginFailed', 'Logout', 'TokenRefresh', \
    'TokenReuseDetected', 'MfaEnabled', 'MfaDisabled', 'MfaVerified', \
    'MfaFailed', 'BackupCodesRegenerated', 'PasswordChanged', \
    'SuspiciousActivity'];
DEFINE FIELD success ON TABLE auth_audit TYPE bool;
DEFINE FIELD user_id ON TABLE auth_audit TYPE option<string>;
DEFINE FIELD email ON TABLE auth_audit TYPE option<string>;
DEFINE FIELD failure_reason ON TABLE auth_audit TYPE option<string>;
DEFINE FIELD ip_address ON TABLE auth_audit TYPE option<string>;
DEFINE FIELD user_agent ON TABLE auth_audit TYPE option<string>;
DEFINE FIELD metadata ON TABLE auth_audit TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD location ON TABLE auth_audit TYPE option<string>;
DEFINE FIELD created_at ON TABLE auth_audit TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_auth_audit_user_created ON TABLE auth_audit \
    COLUMNS user_id, created_at;
DEFINE INDEX idx_auth_audit_email_event_created ON TABLE auth_audit \
    COLUMNS email, event, created_at;
DEFINE INDEX idx_auth_audit_ip_created ON TABLE auth_audit \
    COLUMNS ip_address, created_at;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
/// All DEFINE statements are idempotent so re-running is safe.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    // Ensure migration tracking table exists (idempotent).
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    // Determine current schema version.
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            // Record the applied migration.
            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
///
/// Exposed for testing with in-memory SurrealDB instances that
/// bypass the migration runner.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_v1_is_nonempty() {
        assert!(!SCHEMA_V1.is_empty());
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }
}
