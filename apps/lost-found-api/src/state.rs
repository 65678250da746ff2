//! Application state management.
//!
//! Shared by the route builders at start-up; request handlers get their
//! own domain state from `domain_lost_found::handlers::router`.

use mongodb::{Client, Database};

#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded from environment variables
    pub config: crate::config::Config,
    /// MongoDB client (cloneable, shares underlying connection pool)
    pub mongo_client: Client,
    pub db: Database,
}
