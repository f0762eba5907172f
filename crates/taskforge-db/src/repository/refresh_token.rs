//! SurrealDB implementation of [`RefreshTokenRepository`].
//!
//! Rotation relies on SurrealDB's per-record atomicity: the
//! `Active → Rotated` transition is a single conditional update, so only
//! one of two concurrent callers presenting the same token can win.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use taskforge_core::error::TaskforgeResult;
use taskforge_core::models::refresh_token::{CreateRefreshToken, RefreshToken};
use taskforge_core::repository::RefreshTokenRepository;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct TokenRow {
    user_id: String,
    token_hash: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    replaced_by: Option<String>,
}

#[derive(Debug, SurrealValue)]
struct TokenRowWithId {
    record_id: String,
    user_id: String,
    token_hash: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    replaced_by: Option<String>,
}

fn parse_replaced_by(raw: Option<String>) -> Result<Option<Uuid>, DbError> {
    raw.map(|s| {
        Uuid::parse_str(&s).map_err(|e| DbError::Migration(format!("invalid successor UUID: {e}")))
    })
    .transpose()
}

impl TokenRow {
    fn into_token(self, id: Uuid) -> Result<RefreshToken, DbError> {
        let user_id = Uuid::parse_str(&self.user_id)
            .map_err(|e| DbError::Migration(format!("invalid user UUID: {e}")))?;
        Ok(RefreshToken {
            id,
            user_id,
            token_hash: self.token_hash,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            revoked_at: self.revoked_at,
            replaced_by: parse_replaced_by(self.replaced_by)?,
        })
    }
}

impl TokenRowWithId {
    fn try_into_token(self) -> Result<RefreshToken, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Migration(format!("invalid UUID: {e}")))?;
        let user_id = Uuid::parse_str(&self.user_id)
            .map_err(|e| DbError::Migration(format!("invalid user UUID: {e}")))?;
        Ok(RefreshToken {
            id,
            user_id,
            token_hash: self.token_hash,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            revoked_at: self.revoked_at,
            replaced_by: parse_replaced_by(self.replaced_by)?,
        })
    }
}

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// SurrealDB implementation of the RefreshToken repository.
#[derive(Clone)]
pub struct SurrealRefreshTokenRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRefreshTokenRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> RefreshTokenRepository for SurrealRefreshTokenRepository<C> {
    async fn create(&self, input: CreateRefreshToken) -> TaskforgeResult<RefreshToken> {
        let id = input.id;
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('refresh_token', $id) SET \
                 user_id = $user_id, \
                 token_hash = $token_hash, \
                 ip_address = $ip_address, \
                 user_agent = $user_agent, \
                 expires_at = $expires_at, \
                 revoked_at = NONE, \
                 replaced_by = NONE",
            )
            .bind(("id", id_str.clone()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("token_hash", input.token_hash))
            .bind(("ip_address", input.ip_address))
            .bind(("user_agent", input.user_agent))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<TokenRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "refresh_token".into(),
            id: id_str,
        })?;

        Ok(row.into_token(id)?)
    }

    async fn get_by_hash(&self, token_hash: &str) -> TaskforgeResult<RefreshToken> {
        let token_hash_owned = token_hash.to_string();

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM refresh_token \
                 WHERE token_hash = $token_hash",
            )
            .bind(("token_hash", token_hash_owned.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TokenRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "refresh_token".into(),
            id: format!("token_hash={token_hash_owned}"),
        })?;

        Ok(row.try_into_token()?)
    }

    async fn mark_rotated(&self, id: Uuid, replaced_by: Uuid) -> TaskforgeResult<bool> {
        // Single conditional update: succeeds only while the token is
        // still unrevoked. A concurrent rival sees an empty result.
        let mut result = self
            .db
            .query(
                "UPDATE type::record('refresh_token', $id) SET \
                 revoked_at = time::now(), \
                 replaced_by = $replaced_by \
                 WHERE revoked_at = NONE",
            )
            .bind(("id", id.to_string()))
            .bind(("replaced_by", replaced_by.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TokenRow> = result.take(0).map_err(DbError::from)?;
        Ok(!rows.is_empty())
    }

    async fn revoke_by_hash(&self, token_hash: &str) -> TaskforgeResult<Option<RefreshToken>> {
        let token_hash_owned = token_hash.to_string();

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM refresh_token \
                 WHERE token_hash = $token_hash",
            )
            .bind(("token_hash", token_hash_owned))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TokenRowWithId> = result.take(0).map_err(DbError::from)?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let token = row.try_into_token()?;

        if token.revoked_at.is_none() {
            self.db
                .query(
                    "UPDATE type::record('refresh_token', $id) SET \
                     revoked_at = time::now() \
                     WHERE revoked_at = NONE",
                )
                .bind(("id", token.id.to_string()))
                .await
                .map_err(DbError::from)?;
        }

        Ok(Some(token))
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> TaskforgeResult<u64> {
        let mut result = self
            .db
            .query(
                "UPDATE refresh_token SET revoked_at = time::now() \
                 WHERE user_id = $user_id AND revoked_at = NONE \
                 AND expires_at > time::now()",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TokenRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.len() as u64)
    }

    async fn purge_expired_before(&self, cutoff: DateTime<Utc>) -> TaskforgeResult<u64> {
        // Count matching tokens first, then delete.
        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM refresh_token \
                 WHERE expires_at < $cutoff GROUP ALL",
            )
            .bind(("cutoff", cutoff))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        self.db
            .query("DELETE refresh_token WHERE expires_at < $cutoff")
            .bind(("cutoff", cutoff))
            .await
            .map_err(DbError::from)?;

        Ok(total)
    }
}
