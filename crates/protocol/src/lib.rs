//! DAO shell protocol
//!
//! Shared types between the session orchestrator, organization clients and
//! whatever renders the shell. Everything here is plain data and serializes
//! as JSON.

use uuid::Uuid;

pub mod routing;
pub mod snapshot;
pub mod types;

pub use routing::{app_path, parse_path, preferences_search};
pub use snapshot::{IdentityIntentView, SessionSnapshot};
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
