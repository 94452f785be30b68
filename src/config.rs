use crate::error::AppError;

/// Process configuration, loaded once at startup and managed as Rocket state.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// HMAC secret for session tokens. Must be supplied explicitly; there is
    /// deliberately no fallback value, so an unconfigured deployment refuses
    /// to start instead of signing tokens with a known secret.
    pub session_secret: String,
    /// Controls the `Secure` attribute on the session cookie.
    pub production: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, AppError> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:behaviour_journal.db?mode=rwc".to_string());

        let session_secret = std::env::var("SESSION_SECRET")
            .ok()
            .filter(|secret| !secret.trim().is_empty())
            .ok_or_else(|| {
                AppError::Internal(
                    "SESSION_SECRET must be set to a non-empty value".to_string(),
                )
            })?;

        let production = std::env::var("APP_PRODUCTION")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            session_secret,
            production,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_missing_secret_refused() {
        temp_env::with_vars(
            [
                ("SESSION_SECRET", None::<&str>),
                ("DATABASE_URL", Some("sqlite::memory:")),
            ],
            || {
                assert!(AppConfig::load().is_err());
            },
        );
    }

    #[test]
    #[serial]
    fn test_blank_secret_refused() {
        temp_env::with_vars([("SESSION_SECRET", Some("   "))], || {
            assert!(AppConfig::load().is_err());
        });
    }

    #[test]
    #[serial]
    fn test_load_with_secret() {
        temp_env::with_vars(
            [
                ("SESSION_SECRET", Some("a-real-secret")),
                ("DATABASE_URL", Some("sqlite:test.db")),
                ("APP_PRODUCTION", Some("true")),
            ],
            || {
                let config = AppConfig::load().expect("Config should load");
                assert_eq!(config.database_url, "sqlite:test.db");
                assert_eq!(config.session_secret, "a-real-secret");
                assert!(config.production);
            },
        );
    }

    #[test]
    #[serial]
    fn test_production_defaults_off() {
        temp_env::with_vars(
            [
                ("SESSION_SECRET", Some("a-real-secret")),
                ("APP_PRODUCTION", None::<&str>),
            ],
            || {
                let config = AppConfig::load().expect("Config should load");
                assert!(!config.production);
            },
        );
    }
}
