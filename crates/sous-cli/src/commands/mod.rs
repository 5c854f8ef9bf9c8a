pub mod api;
pub mod auth;
pub mod bridge;
pub mod config;
pub mod timer;

use std::sync::Arc;

use sous_core::{Database, TokenStore};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Token store backed by the default database.
pub fn token_store() -> Result<TokenStore, Box<dyn std::error::Error>> {
    let db = Database::open()?;
    Ok(TokenStore::new(Arc::new(db)))
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
