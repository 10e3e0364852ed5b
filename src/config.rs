use std::path::PathBuf;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("JWT_SECRET must be at least 32 characters long")]
    WeakSecret,
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

pub const MIN_SECRET_LEN: usize = 32;

/// Runtime settings read from the environment.
#[derive(Clone, Debug)]
pub struct Settings {
    pub jwt_secret: String,
    pub data_dir: PathBuf,
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub session_ttl_days: i64,
    pub cookie_secure: bool,
    pub frontend_url: String,
    pub bootstrap_admin_username: String,
    pub bootstrap_admin_password: String,
    pub seed_demo_data: bool,
    pub login_limit: usize,
    pub login_window: Duration,
}

fn flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(v) => v.parse().map_err(|_| ConfigError::Invalid(name, v)),
        Err(_) => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        let settings = Self {
            jwt_secret,
            data_dir: std::env::var("CAMPUS_DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("data")),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            database_url: std::env::var("DATABASE_URL").ok(),
            session_ttl_days: parsed("SESSION_TTL_DAYS", 7)?,
            cookie_secure: flag("COOKIE_SECURE"),
            frontend_url: std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".into()),
            bootstrap_admin_username: std::env::var("BOOTSTRAP_ADMIN_USERNAME").unwrap_or_else(|_| "admin".into()),
            bootstrap_admin_password: std::env::var("BOOTSTRAP_ADMIN_PASSWORD")
                .map_err(|_| ConfigError::Missing("BOOTSTRAP_ADMIN_PASSWORD"))?,
            seed_demo_data: flag("SEED_DEMO_DATA"),
            login_limit: parsed("LOGIN_LIMIT", 5)?,
            login_window: Duration::from_secs(parsed("LOGIN_WINDOW", 300)?),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }
        if self.session_ttl_days <= 0 {
            return Err(ConfigError::Invalid("SESSION_TTL_DAYS", self.session_ttl_days.to_string()));
        }
        Ok(())
    }

    /// Settings for tests and local tooling; nothing is read from the environment.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            jwt_secret: jwt_secret.to_string(),
            data_dir: std::env::temp_dir(),
            bind_addr: "127.0.0.1:0".into(),
            database_url: None,
            session_ttl_days: 7,
            cookie_secure: false,
            frontend_url: "http://localhost:5173".into(),
            bootstrap_admin_username: "admin".into(),
            bootstrap_admin_password: "admin-password".into(),
            seed_demo_data: false,
            login_limit: 5,
            login_window: Duration::from_secs(300),
        }
    }
}
