//! Configuration module for environment variables and application settings

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use url::Url;

/// Global application configuration loaded from environment variables
pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    Config::from_env().expect("Failed to load configuration from environment")
});

#[derive(Debug, Clone)]
pub struct Config {
    /// Gateway (Supabase project) configuration
    pub gateway: GatewayConfig,

    /// OAuth sign-in configuration
    pub oauth: OAuthConfig,

    /// Where the current session is persisted between runs
    pub session_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: Url,
    pub anon_key: String,
    /// Bucket that booking attachments are uploaded to
    pub storage_bucket: String,
    /// Lifetime of signed attachment URLs
    pub signed_url_ttl: Duration,
    pub http_timeout: Duration,
    pub heartbeat_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub provider: String,
    pub redirect_scheme: String,
    pub callback_path: String,
    /// When set, the redirect goes to a local HTTP listener on this port
    pub loopback_port: Option<u16>,
    /// How long the browser round-trip may take before it counts as dismissed
    pub timeout: Duration,
}

impl OAuthConfig {
    /// Use the loopback redirect, on `port` unless one is configured
    pub fn loopback_or(mut self, port: u16) -> Self {
        self.loopback_port.get_or_insert(port);
        self
    }

    /// Redirect URI registered with the identity provider for this app.
    pub fn redirect_uri(&self) -> String {
        let path = self.callback_path.trim_start_matches('/');
        match self.loopback_port {
            Some(port) => format!("http://127.0.0.1:{}/{}", port, path),
            None => format!("{}://{}", self.redirect_scheme, path),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            redirect_scheme: "chamonix".to_string(),
            callback_path: "auth/callback".to_string(),
            loopback_port: None,
            timeout: Duration::from_secs(300),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup("SUPABASE_URL")
            .ok_or_else(|| anyhow!("SUPABASE_URL environment variable is required"))?;
        let url = Url::parse(&raw_url).context("Failed to parse SUPABASE_URL")?;

        let anon_key = lookup("SUPABASE_ANON_KEY")
            .ok_or_else(|| anyhow!("SUPABASE_ANON_KEY environment variable is required"))?;

        let defaults = OAuthConfig::default();

        Ok(Self {
            gateway: GatewayConfig {
                url,
                anon_key,
                storage_bucket: lookup("STORAGE_BUCKET").unwrap_or_else(|| "bookings".to_string()),
                signed_url_ttl: Duration::from_secs(parse_or(&lookup, "SIGNED_URL_TTL_SECS", 60 * 60 * 24 * 7)),
                http_timeout: Duration::from_secs(parse_or(&lookup, "HTTP_TIMEOUT_SECS", 30)),
                heartbeat_interval: Duration::from_secs(parse_or(&lookup, "REALTIME_HEARTBEAT_SECS", 25)),
            },

            oauth: OAuthConfig {
                provider: lookup("OAUTH_PROVIDER").unwrap_or(defaults.provider),
                redirect_scheme: lookup("OAUTH_REDIRECT_SCHEME").unwrap_or(defaults.redirect_scheme),
                callback_path: lookup("OAUTH_CALLBACK_PATH").unwrap_or(defaults.callback_path),
                loopback_port: lookup("OAUTH_LOOPBACK_PORT").and_then(|p| p.parse().ok()),
                timeout: Duration::from_secs(parse_or(&lookup, "OAUTH_TIMEOUT_SECS", 300)),
            },

            session_file: lookup("SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".chamonix/session.json")),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
