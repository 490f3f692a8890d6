use chrono::{FixedOffset, Offset, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    /// Largest body the response unifier will buffer before giving up and
    /// passing the response through untouched.
    pub max_body_bytes: usize,
    /// Hours east of UTC used to decide "today" for leave and eating status.
    pub tz_offset_hours: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub access_token_hours: i64,
    pub refresh_token_days: i64,
    /// Access tokens with less than this many minutes left are re-minted
    /// after the request and handed back in a response header.
    pub refresh_if_expires_in_minutes: i64,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // API overrides
        if let Some(port) = env::var("API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("API_MAX_BODY_BYTES") {
            self.api.max_body_bytes = v.parse().unwrap_or(self.api.max_body_bytes);
        }
        if let Ok(v) = env::var("APP_TZ_OFFSET_HOURS") {
            self.api.tz_offset_hours = v.parse().unwrap_or(self.api.tz_offset_hours);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_JWT_SECRET").or_else(|_| env::var("JWT_SECRET_KEY")) {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_ACCESS_HOURS") {
            self.security.access_token_hours = v.parse().unwrap_or(self.security.access_token_hours);
        }
        if let Ok(v) = env::var("JWT_REFRESH_DAYS") {
            self.security.refresh_token_days = v.parse().unwrap_or(self.security.refresh_token_days);
        }
        if let Ok(v) = env::var("JWT_REFRESH_IF_EXPIRES_IN") {
            self.security.refresh_if_expires_in_minutes =
                v.parse().unwrap_or(self.security.refresh_if_expires_in_minutes);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: "sqlite://school_meal.db?mode=rwc".to_string(),
                max_connections: 5,
                connection_timeout: 30,
            },
            api: ApiConfig {
                port: 5000,
                max_body_bytes: 10 * 1024 * 1024, // 10MB
                tz_offset_hours: 8,
            },
            security: SecurityConfig {
                jwt_secret: "jwt-secret".to_string(),
                access_token_hours: 6,
                refresh_token_days: 7,
                refresh_if_expires_in_minutes: 30,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
        }
    }

    fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.database.max_connections = 10;
        config.database.connection_timeout = 10;
        config.api.max_body_bytes = 5 * 1024 * 1024;
        config.security.cors_origins = vec!["https://staging.example.com".to_string()];
        config
    }

    fn production() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Production;
        config.database.max_connections = 20;
        config.database.connection_timeout = 5;
        config.api.max_body_bytes = 2 * 1024 * 1024;
        // Must be supplied through SECURITY_JWT_SECRET / JWT_SECRET_KEY
        config.security.jwt_secret = String::new();
        config.security.cors_origins = vec!["https://app.example.com".to_string()];
        config
    }

    /// The fixed offset used for local calendar decisions.
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.api.tz_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix())
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
