use std::env;
use std::str::FromStr;

use config::ConfigError;
use jsonwebtoken::Algorithm;

use crate::error::AppError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Token signing settings, injected into the codec and handlers at
/// construction. Never read from ambient globals after startup.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    /// Signing algorithm name, e.g. "HS256"
    pub algorithm: String,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,
}

impl JwtSettings {
    pub fn signing_algorithm(&self) -> Result<Algorithm, AppError> {
        Algorithm::from_str(&self.algorithm).map_err(|_| {
            AppError::Config(crate::error::ConfigError::InvalidValue(format!(
                "unsupported JWT algorithm: {}",
                self.algorithm
            )))
        })
    }

    pub fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.access_token_expire_minutes)
    }

    pub fn refresh_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.refresh_token_expire_days)
    }
}

/// Load settings from the optional `configuration` file, then apply
/// environment overrides (`JWT_SECRET`, `JWT_ALGORITHM`,
/// `ACCESS_TOKEN_EXPIRE_MINUTES`, `REFRESH_TOKEN_EXPIRE_DAYS`).
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .build()?;
    let mut settings = settings.try_deserialize::<Settings>()?;

    if let Ok(secret) = env::var("JWT_SECRET") {
        settings.jwt.secret = secret;
    }
    if let Ok(algorithm) = env::var("JWT_ALGORITHM") {
        settings.jwt.algorithm = algorithm;
    }
    if let Ok(minutes) = env::var("ACCESS_TOKEN_EXPIRE_MINUTES") {
        settings.jwt.access_token_expire_minutes = minutes
            .parse()
            .map_err(|_| ConfigError::Message("invalid ACCESS_TOKEN_EXPIRE_MINUTES".into()))?;
    }
    if let Ok(days) = env::var("REFRESH_TOKEN_EXPIRE_DAYS") {
        settings.jwt.refresh_token_expire_days = days
            .parse()
            .map_err(|_| ConfigError::Message("invalid REFRESH_TOKEN_EXPIRE_DAYS".into()))?;
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            algorithm: "HS256".to_string(),
            access_token_expire_minutes: 15,
            refresh_token_expire_days: 7,
        }
    }

    #[test]
    fn hs256_parses() {
        let settings = test_settings();
        assert_eq!(settings.signing_algorithm().unwrap(), Algorithm::HS256);
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let mut settings = test_settings();
        settings.algorithm = "ROT13".to_string();
        assert!(settings.signing_algorithm().is_err());
    }

    #[test]
    fn ttls_follow_configuration() {
        let settings = test_settings();
        assert_eq!(settings.access_token_ttl(), chrono::Duration::minutes(15));
        assert_eq!(settings.refresh_token_ttl(), chrono::Duration::days(7));
    }
}
