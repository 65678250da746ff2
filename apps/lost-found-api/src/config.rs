use axum_helpers::JwtConfig;
use chrono::NaiveDate;
use core_config::{AppInfo, ConfigError, FromEnv, app_info, env_list, env_parse_or, server::ServerConfig};
use database::mongodb::MongoConfig;
use domain_lost_found::LifecycleConfig;

pub use core_config::Environment;

/// Application-specific configuration
/// Composes shared config components from the `config` library
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub mongodb: MongoConfig,
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    pub lifecycle: LifecycleConfig,
    /// Granted admin rights at start-up when not yet admins
    pub bootstrap_admins: Vec<String>,
    pub environment: Environment,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let mongodb = MongoConfig::from_env()?;
        let server = ServerConfig::from_env()?;
        let jwt = JwtConfig::from_env()?;

        Ok(Self {
            app: app_info!(),
            mongodb,
            server,
            jwt,
            lifecycle: lifecycle_from_env()?,
            bootstrap_admins: env_list("BOOTSTRAP_ADMIN_EMAILS"),
            environment,
        })
    }
}

/// - ITEMS_EARLIEST_OCCURRENCE_DATE: `YYYY-MM-DD`, defaults to 2025-01-01
fn lifecycle_from_env() -> Result<LifecycleConfig, ConfigError> {
    let defaults = LifecycleConfig::default();
    let earliest_occurrence_date: NaiveDate = env_parse_or(
        "ITEMS_EARLIEST_OCCURRENCE_DATE",
        defaults.earliest_occurrence_date,
    )?;

    Ok(LifecycleConfig {
        earliest_occurrence_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_defaults() {
        temp_env::with_var_unset("ITEMS_EARLIEST_OCCURRENCE_DATE", || {
            let config = lifecycle_from_env().unwrap();
            assert_eq!(
                config.earliest_occurrence_date,
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
            );
        });
    }

    #[test]
    fn test_lifecycle_custom_date() {
        temp_env::with_var("ITEMS_EARLIEST_OCCURRENCE_DATE", Some("2024-09-01"), || {
            let config = lifecycle_from_env().unwrap();
            assert_eq!(
                config.earliest_occurrence_date,
                NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()
            );
        });
    }

    #[test]
    fn test_lifecycle_invalid_date() {
        temp_env::with_var("ITEMS_EARLIEST_OCCURRENCE_DATE", Some("01/09/2024"), || {
            let err = lifecycle_from_env().unwrap_err();
            assert!(err.to_string().contains("ITEMS_EARLIEST_OCCURRENCE_DATE"));
        });
    }

    #[test]
    fn test_full_config_from_env() {
        temp_env::with_vars(
            [
                ("MONGODB_URL", Some("mongodb://localhost:27017")),
                ("MONGODB_DATABASE", Some("lost_found")),
                ("JWT_SECRET", Some("a-test-secret-with-at-least-32-characters")),
                ("BOOTSTRAP_ADMIN_EMAILS", Some("head@school.test, deputy@school.test")),
                ("ITEMS_EARLIEST_OCCURRENCE_DATE", None),
                ("PORT", None),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.mongodb.database(), "lost_found");
                assert_eq!(config.server.port, 8080);
                assert_eq!(
                    config.bootstrap_admins,
                    vec!["head@school.test", "deputy@school.test"]
                );
                assert_eq!(config.app.name, "lost_found_api");
            },
        );
    }

    #[test]
    fn test_missing_jwt_secret() {
        temp_env::with_vars(
            [
                ("MONGODB_URL", Some("mongodb://localhost:27017")),
                ("MONGODB_DATABASE", Some("lost_found")),
                ("JWT_SECRET", None),
            ],
            || {
                assert!(Config::from_env().is_err());
            },
        );
    }
}
