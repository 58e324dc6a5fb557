use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: usize = 12;
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    // Populated from the .env file
    pub database_path: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub admin_url_prefix: String,
    pub use_secure_cookies: bool,
    /// Comma-separated addresses allowed to reach the admin login, or `*`. Empty denies all.
    pub admin_login_accept_ip: String,
    /// Read the client address from `X-Forwarded-For`. Only enable behind a proxy that sets it.
    pub trust_forwarded_for: bool,
    pub page_size: usize,
    pub search_debounce_ms: u64,
}

fn required_var(name: &str) -> Result<String, config::ConfigError> {
    env::var(name).map_err(|_| {
        config::ConfigError::Message(format!(
            "FATAL: Environment variable '{}' is not set in your .env file.",
            name
        ))
    })
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, config::ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse::<T>().map_err(|_| {
            config::ConfigError::Message(format!("FATAL: '{}' has an invalid value ('{}').", name, raw))
        }),
        _ => Ok(default),
    }
}

/// Checks the values that have a fixed shape.
pub fn validate_settings(
    database_path: &str,
    session_secret_key: &str,
    admin_url_prefix: &str,
    page_size: usize,
) -> Result<(), config::ConfigError> {
    // 128 hex characters = 64 bytes, the minimum cookie key length.
    if session_secret_key.len() != 128 || !session_secret_key.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(config::ConfigError::Message(
            "FATAL: 'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes).".to_string(),
        ));
    }

    if admin_url_prefix.is_empty()
        || !admin_url_prefix.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        return Err(config::ConfigError::Message(
            "FATAL: 'ADMIN_URL_PREFIX' must not be empty and can only contain letters, numbers, underscores, and hyphens.".to_string(),
        ));
    }

    if Path::new(database_path).is_relative() {
        return Err(config::ConfigError::Message(format!(
            "FATAL: The 'DATABASE_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
            database_path
        )));
    }

    if page_size == 0 {
        return Err(config::ConfigError::Message("FATAL: 'PAGE_SIZE' must be at least 1.".to_string()));
    }
    Ok(())
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path).map_err(|e| {
            config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}",
                env_path.display(),
                e
            ))
        })?;

        let database_path = required_var("DATABASE_PATH")?;
        let session_secret_key = required_var("SESSION_SECRET_KEY")?;
        let admin_url_prefix = required_var("ADMIN_URL_PREFIX")?;

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_default();
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let use_secure_cookies = env::var("USE_SECURE_COOKIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);
        let admin_login_accept_ip = env::var("ADMIN_LOGIN_ACCEPT_IP").unwrap_or_default();
        let trust_forwarded_for = parsed_var("TRUST_PROXY_HEADERS", false)?;
        let page_size = parsed_var("PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        let search_debounce_ms = parsed_var("SEARCH_DEBOUNCE_MS", DEFAULT_SEARCH_DEBOUNCE_MS)?;

        validate_settings(&database_path, &session_secret_key, &admin_url_prefix, page_size)?;

        if admin_login_accept_ip.trim().is_empty() {
            log::warn!("ADMIN_LOGIN_ACCEPT_IP is not set. All admin login attempts will be denied.");
        }

        let builder = config::Config::builder()
            // Base settings (web host/port) from the TOML file.
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .set_override("admin_url_prefix", admin_url_prefix)?
            .set_override("admin_login_accept_ip", admin_login_accept_ip)?
            .set_override("trust_forwarded_for", trust_forwarded_for)?
            .set_override("page_size", page_size as u64)?
            .set_override("search_debounce_ms", search_debounce_ms)?
            .build()?;

        builder.try_deserialize()
    }

    /// Returns the full path to the users/comments database file inside its own folder.
    pub fn users_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("users").join("users.db")
    }

    /// Returns the full path to the articles database file inside its own folder.
    pub fn articles_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("articles").join("articles.db")
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    /// Whether `ip` may reach the admin login.
    pub fn admin_ip_allowed(&self, ip: &str) -> bool {
        let allowed = self.admin_login_accept_ip.trim();
        if allowed == "*" {
            return true;
        }
        allowed.split(',').map(|entry| entry.trim()).any(|entry| !entry.is_empty() && entry == ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> String {
        "ab".repeat(64)
    }

    fn sample_config(accept_ip: &str) -> Config {
        Config {
            web: WebConfig { host: "127.0.0.1".into(), port: 8080 },
            database_path: "/tmp/newsroom".into(),
            allowed_origins: String::new(),
            log_level: "info".into(),
            session_secret_key: key(),
            admin_url_prefix: "desk".into(),
            use_secure_cookies: false,
            admin_login_accept_ip: accept_ip.into(),
            trust_forwarded_for: false,
            page_size: DEFAULT_PAGE_SIZE,
            search_debounce_ms: DEFAULT_SEARCH_DEBOUNCE_MS,
        }
    }

    #[test]
    fn accepts_valid_settings() {
        assert!(validate_settings("/var/lib/newsroom", &key(), "desk-01", 12).is_ok());
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(validate_settings("relative/path", &key(), "desk", 12).is_err());
        assert!(validate_settings("/abs", "abc", "desk", 12).is_err());
        assert!(validate_settings("/abs", &key(), "bad prefix!", 12).is_err());
        assert!(validate_settings("/abs", &key(), "", 12).is_err());
        assert!(validate_settings("/abs", &key(), "desk", 0).is_err());
    }

    #[test]
    fn admin_ip_allow_list() {
        assert!(sample_config("*").admin_ip_allowed("10.0.0.9"));
        let config = sample_config("127.0.0.1, 10.0.0.2");
        assert!(config.admin_ip_allowed("10.0.0.2"));
        assert!(!config.admin_ip_allowed("10.0.0.3"));
        assert!(!sample_config("").admin_ip_allowed("127.0.0.1"));
    }

    #[test]
    fn database_paths_are_separate() {
        let config = sample_config("*");
        assert_ne!(config.users_db_path(), config.articles_db_path());
        assert!(config.articles_db_path().starts_with("/tmp/newsroom"));
    }
}
