//! Lost & Found API routes
//!
//! Wires the lost_found domain to MongoDB and JWT authentication.

use axum::Router;
use axum_helpers::JwtAuth;
use domain_lost_found::{
    AdminService, LifecycleEngine, LostFoundState, MongoAdminRepository, MongoItemRepository,
    handlers,
};
use mongodb::Database;
use tracing::info;

use crate::state::AppState;

pub fn router(state: &AppState) -> Router {
    let engine = LifecycleEngine::with_config(
        MongoItemRepository::new(state.db.clone()),
        state.config.lifecycle.clone(),
    );
    let admins = AdminService::new(MongoAdminRepository::new(state.db.clone()));
    let auth = JwtAuth::new(&state.config.jwt);

    handlers::router(LostFoundState::new(engine, admins), auth)
}

/// Create the item collection indexes
pub async fn init_indexes(db: &Database) -> eyre::Result<()> {
    MongoItemRepository::new(db.clone())
        .ensure_indexes()
        .await
        .map_err(|e| eyre::eyre!("Failed to create item indexes: {}", e))
}

/// Grant admin rights to the configured bootstrap emails
pub async fn bootstrap_admins(db: &Database, emails: &[String]) -> eyre::Result<()> {
    if emails.is_empty() {
        return Ok(());
    }
    let granted = AdminService::new(MongoAdminRepository::new(db.clone()))
        .bootstrap(emails)
        .await
        .map_err(|e| eyre::eyre!("Failed to bootstrap admins: {}", e))?;
    info!(granted, configured = emails.len(), "Admin bootstrap finished");
    Ok(())
}
