//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the application server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listening socket.
    pub server: ServerConfig,

    /// Multipart upload handling.
    pub upload: UploadConfig,

    /// JSON / URL-encoded body parsing.
    pub body: BodyConfig,

    /// Session cookie and store settings.
    pub session: SessionConfig,

    /// Static assets and preload headers.
    pub assets: AssetConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// `host:port` string handed to the socket bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1337,
        }
    }
}

/// Upload destination and limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory accepted files are written to.
    pub dest: String,

    /// Maximum size of a single uploaded file in bytes.
    pub limit_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dest: "/tmp".to_string(),
            limit_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Body parser limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BodyConfig {
    /// Maximum JSON / URL-encoded body size in bytes.
    pub limit_bytes: usize,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            limit_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Session settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie name carrying the session id.
    pub key: String,

    /// Secret used to sign cookies.
    pub secret: String,

    pub cookie: CookieConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key: "eden.session.id".to_string(),
            // WARNING: This is a placeholder! Change this in production.
            secret: "CHANGE_ME_IN_PRODUCTION".to_string(),
            cookie: CookieConfig::default(),
        }
    }
}

/// Session cookie policy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CookieConfig {
    pub secure: bool,
    pub http_only: bool,
}

/// Static assets and preload link settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Base URL the bundled assets are served from.
    pub cdn_url: Option<String>,

    /// Cache-busting value appended as `?v=`.
    pub version: Option<String>,

    /// Directory served as static files.
    pub static_dir: String,
}

impl AssetConfig {
    /// `Link` header value preloading the bundled stylesheet and script.
    pub fn preload_link(&self) -> String {
        let base = self.cdn_url.as_deref().unwrap_or("/");
        let version = self
            .version
            .as_deref()
            .map(|v| format!("?v={v}"))
            .unwrap_or_default();

        format!(
            "<{base}public/css/app.min.css{version}>; rel=preload; as=style,\
             <{base}public/js/app.min.js{version}>; rel=preload; as=script"
        )
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            cdn_url: None,
            version: None,
            static_dir: "www".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}
