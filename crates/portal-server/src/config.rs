//! Server configuration loaded from environment variables.
//!
//! Everything except the JWT secret has a default suitable for local
//! development.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use portal_api::uploads::MatchRule;

/// Secrets that ship in sample configs. The server refuses to sign tokens with them.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me", "changeme", "secret"];

#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `PORTAL_HOST`
    /// Default: `0.0.0.0`
    pub host: String,

    /// Env: `PORTAL_PORT`
    /// Default: `3000`
    pub port: u16,

    /// Env: `PORTAL_DB_PATH`
    /// Default: `portal.db`
    pub db_path: PathBuf,

    /// Root of all per-feature upload directories.
    /// Env: `PORTAL_UPLOAD_DIR`
    /// Default: `./uploads`
    pub upload_dir: PathBuf,

    /// Env: `PORTAL_JWT_SECRET` (required)
    pub jwt_secret: String,

    /// How declared MIME type and file extension are combined when
    /// validating uploads.
    /// Env: `PORTAL_UPLOAD_MATCH` (`strict` | `either`)
    /// Default: `strict`
    pub upload_match: MatchRule,

    /// Created at startup if no user with that name exists.
    /// Env: `PORTAL_ADMIN_USERNAME`, `PORTAL_ADMIN_PASSWORD`
    pub admin: Option<AdminBootstrap>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            db_path: PathBuf::from("portal.db"),
            upload_dir: PathBuf::from("./uploads"),
            jwt_secret: String::new(),
            upload_match: MatchRule::default(),
            admin: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(host) = get("PORTAL_HOST") {
            config.host = host;
        }
        if let Some(port) = get("PORTAL_PORT") {
            config.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORTAL_PORT is not a port number: {:?}", port))?;
        }
        if let Some(path) = get("PORTAL_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(dir) = get("PORTAL_UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Some(secret) = get("PORTAL_JWT_SECRET") {
            config.jwt_secret = secret;
        }
        if let Some(rule) = get("PORTAL_UPLOAD_MATCH") {
            config.upload_match = rule.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        }

        config.admin = match (get("PORTAL_ADMIN_USERNAME"), get("PORTAL_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) if !username.trim().is_empty() && !password.is_empty() => {
                Some(AdminBootstrap {
                    username: username.trim().to_string(),
                    password,
                })
            }
            (None, None) => None,
            _ => bail!("PORTAL_ADMIN_USERNAME and PORTAL_ADMIN_PASSWORD must be set together"),
        };

        config.check_secret()?;
        Ok(config)
    }

    fn check_secret(&self) -> anyhow::Result<()> {
        let secret = self.jwt_secret.trim();
        if secret.is_empty() {
            bail!("PORTAL_JWT_SECRET must be set");
        }
        if PLACEHOLDER_SECRETS.contains(&secret) {
            bail!("PORTAL_JWT_SECRET is still a placeholder value; refusing to start");
        }
        Ok(())
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
