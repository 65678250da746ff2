//! Lost & Found Domain
//!
//! Reporting, approval, status transitions and linking of lost and found
//! items, plus admin privilege management.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  ← HTTP endpoints, JWT + admin guard, notifications
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Engine    │  ← Transition table, linking, statistics, consistency
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │ Repository  │  ← Data access (traits + MongoDB / in-memory)
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Models    │  ← Entities, DTOs
//! └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use axum_helpers::{JwtAuth, JwtConfig};
//! use domain_lost_found::{
//!     AdminService, LifecycleEngine, LostFoundState, MongoAdminRepository, MongoItemRepository,
//!     handlers,
//! };
//! use mongodb::Client;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::with_uri_str("mongodb://localhost:27017").await?;
//! let db = client.database("lost_found");
//!
//! let engine = LifecycleEngine::new(MongoItemRepository::new(db.clone()));
//! let admins = AdminService::new(MongoAdminRepository::new(db));
//! let auth = JwtAuth::new(&JwtConfig::new("a-secret-that-is-at-least-32-characters"));
//!
//! let router = handlers::router(LostFoundState::new(engine, admins), auth);
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod consistency;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod mongodb;
pub mod notifications;
pub mod repository;
pub mod service;
pub mod snapshot;
pub mod stats;

// Re-export commonly used types
pub use admin::{AdminContext, AdminService};
pub use consistency::{ConsistencyIssue, ConsistencyReport, IssueKind};
pub use error::{ErrorKind, LifecycleError, LifecycleResult};
pub use handlers::{ApiDoc, LostFoundState};
pub use models::{
    AdminPrincipal, Category, CreateItem, Item, ItemFilter, ItemStatus, ItemUpdate, NewItem,
    Principal,
};
pub use mongodb::{MongoAdminRepository, MongoItemRepository};
pub use notifications::{Notification, NotificationCenter, Severity};
pub use repository::{
    AdminRepository, InMemoryAdminRepository, InMemoryItemRepository, ItemRepository,
};
pub use service::{LifecycleConfig, LifecycleEngine, RepairOutcome, StatusChange, TransitionMenu};
pub use snapshot::{ItemSnapshot, Outcome, View};
pub use stats::ItemStats;
