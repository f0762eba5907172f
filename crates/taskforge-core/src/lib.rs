//! Taskforge Core — domain models, repository traits, and shared error
//! types for the authentication and session-security core.

pub mod error;
pub mod models;
pub mod repository;

pub use error::{TaskforgeError, TaskforgeResult};
