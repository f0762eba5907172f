//! SurrealDB repository implementations.

mod audit;
mod refresh_token;
mod user;

pub use audit::SurrealAuthAuditRepository;
pub use refresh_token::SurrealRefreshTokenRepository;
pub use user::{SurrealUserRepository, verify_password};
