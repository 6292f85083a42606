//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ComponentError, ComponentResult};
use crate::ui::Browser;

/// Prefix of environment variables that override file configuration
pub const ENV_PREFIX: &str = "COMPONENT_TEST_";

/// Configuration shared by the component test features
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub api: ApiConfig,
    pub redis: RedisConfig,
    pub mongo: MongoConfig,
    pub ui: UiConfig,
}

/// In-process API request configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Scheme and authority prefixed to request paths
    pub base_url: String,

    /// Authorization value sent by the admin user step
    pub admin_token: Option<String>,

    /// Authorization value sent by the publisher user step
    pub publisher_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://foo".to_string(),
            admin_token: None,
            publisher_token: None,
        }
    }
}

/// Ephemeral Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Path to the redis-server binary
    pub binary_path: PathBuf,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    /// How long to wait for the server to answer PING
    pub startup_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("redis-server"),
            port: None,
            startup_timeout_ms: 10_000,
        }
    }
}

/// Ephemeral MongoDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    /// Path to the mongod binary
    pub binary_path: PathBuf,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    /// Database the steps operate on (None = random name)
    pub database: Option<String>,

    /// How long to wait for the server to answer ping
    pub startup_timeout_ms: u64,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("mongod"),
            port: None,
            database: None,
            startup_timeout_ms: 20_000,
        }
    }
}

/// Browser automation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Base URL of the UI under test
    pub base_url: String,

    pub browser: Browser,

    pub headless: bool,

    /// Per-element wait timeout
    pub wait_timeout_ms: u64,

    /// Upper bound for a whole Playwright script run
    pub script_timeout_ms: u64,

    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Directory whose `node_modules` provides `playwright`
    pub node_project_dir: Option<PathBuf>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            browser: Browser::Chromium,
            headless: true,
            wait_timeout_ms: 10_000,
            script_timeout_ms: 60_000,
            viewport_width: 1280,
            viewport_height: 720,
            node_project_dir: None,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist
    pub fn load(path: &Path) -> ComponentResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> ComponentResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `COMPONENT_TEST_*` environment overrides
    pub fn apply_env(&mut self) -> ComponentResult<()> {
        self.apply_overrides(|name| std::env::var(format!("{ENV_PREFIX}{name}")).ok())
    }

    /// Apply overrides from `lookup`, keyed by the variable name without prefix
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ComponentResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("API_BASE_URL") {
            self.api.base_url = v;
        }
        if let Some(v) = lookup("API_ADMIN_TOKEN") {
            self.api.admin_token = Some(v);
        }
        if let Some(v) = lookup("API_PUBLISHER_TOKEN") {
            self.api.publisher_token = Some(v);
        }
        if let Some(v) = lookup("REDIS_BINARY") {
            self.redis.binary_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("REDIS_PORT") {
            self.redis.port = Some(parse_number("REDIS_PORT", &v)?);
        }
        if let Some(v) = lookup("MONGO_BINARY") {
            self.mongo.binary_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("MONGO_PORT") {
            self.mongo.port = Some(parse_number("MONGO_PORT", &v)?);
        }
        if let Some(v) = lookup("MONGO_DATABASE") {
            self.mongo.database = Some(v);
        }
        if let Some(v) = lookup("UI_BASE_URL") {
            self.ui.base_url = v;
        }
        if let Some(v) = lookup("UI_BROWSER") {
            self.ui.browser = v.parse()?;
        }
        if let Some(v) = lookup("UI_HEADLESS") {
            self.ui.headless = !matches!(v.as_str(), "0" | "false" | "no");
        }
        if let Some(v) = lookup("UI_WAIT_TIMEOUT_MS") {
            self.ui.wait_timeout_ms = parse_number("UI_WAIT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("UI_NODE_PROJECT_DIR") {
            self.ui.node_project_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> ComponentResult<T> {
    value.parse().map_err(|_| {
        ComponentError::InvalidConfig(format!("{ENV_PREFIX}{name}={value:?} is not a number"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.api.base_url, "http://foo");
        assert_eq!(config.redis.startup_timeout_ms, 10_000);
        assert_eq!(config.mongo.binary_path, PathBuf::from("mongod"));
        assert!(config.mongo.database.is_none());
        assert!(config.ui.headless);
    }

    #[test]
    fn test_partial_toml() {
        let config = HarnessConfig::from_toml(
            r#"
[redis]
binary_path = "/opt/redis/bin/redis-server"

[ui]
browser = "firefox"
wait_timeout_ms = 2500
"#,
        )
        .unwrap();
        assert_eq!(config.redis.binary_path, PathBuf::from("/opt/redis/bin/redis-server"));
        assert!(matches!(config.ui.browser, Browser::Firefox));
        assert_eq!(config.ui.wait_timeout_ms, 2500);
        assert_eq!(config.ui.viewport_width, 1280);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("REDIS_PORT", "6390"),
            ("UI_BROWSER", "webkit"),
            ("UI_HEADLESS", "false"),
            ("API_ADMIN_TOKEN", "Bearer admin.jwt"),
            ("MONGO_PORT", "27018"),
            ("MONGO_DATABASE", "recipes"),
        ]
        .into_iter()
        .collect();

        let mut config = HarnessConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.redis.port, Some(6390));
        assert!(matches!(config.ui.browser, Browser::Webkit));
        assert!(!config.ui.headless);
        assert_eq!(config.api.admin_token.as_deref(), Some("Bearer admin.jwt"));
        assert_eq!(config.api.publisher_token, None);
        assert_eq!(config.mongo.port, Some(27018));
        assert_eq!(config.mongo.database.as_deref(), Some("recipes"));
    }

    #[test]
    fn test_user_tokens_from_toml() {
        let config = HarnessConfig::from_toml(
            r#"
[api]
admin_token = "Bearer a.b.c"
publisher_token = "Bearer d.e.f"
"#,
        )
        .unwrap();
        assert_eq!(config.api.base_url, "http://foo");
        assert_eq!(config.api.admin_token.as_deref(), Some("Bearer a.b.c"));
        assert_eq!(config.api.publisher_token.as_deref(), Some("Bearer d.e.f"));
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut config = HarnessConfig::default();
        let err = config
            .apply_overrides(|name| (name == "REDIS_PORT").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("COMPONENT_TEST_REDIS_PORT"));
    }
}
