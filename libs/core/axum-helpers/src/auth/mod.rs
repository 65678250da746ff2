//! Authentication module.
//!
//! Identity is established by an external provider that issues HS256 JWTs;
//! this module only verifies them and exposes the claims to handlers.
//!
//! - [`JwtConfig`]: signing secret loaded from `JWT_SECRET`
//! - [`JwtAuth`]: token verification (and issuing, for tooling and tests)
//! - [`jwt_auth_middleware`]: rejects requests without a valid token and
//!   inserts [`JwtClaims`] into request extensions
//!
//! ```ignore
//! use axum_helpers::auth::{JwtAuth, JwtConfig, jwt_auth_middleware};
//! use core_config::FromEnv;
//!
//! let auth = JwtAuth::new(&JwtConfig::from_env()?);
//!
//! let protected = Router::new()
//!     .route("/me", get(handler))
//!     .layer(axum::middleware::from_fn_with_state(auth, jwt_auth_middleware));
//! ```

pub mod config;
pub mod jwt;
pub mod middleware;

pub use config::JwtConfig;
pub use jwt::{ACCESS_TOKEN_TTL, JwtAuth, JwtClaims};
pub use middleware::jwt_auth_middleware;
