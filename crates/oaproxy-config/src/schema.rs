use oaproxy_types::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variables recognized as overrides. Names map onto the
/// lowercase field names of [`Config`].
const ENV_KEYS: &[&str] = &[
    "port",
    "log_level",
    "anthropic_version",
    "anthropic_beta",
    "api_base",
    "auth_base",
    "client_id",
    "redirect_uri",
    "scope",
    "token_file",
    "default_model",
    "default_max_tokens",
    "connect_timeout_secs",
];

fn default_port() -> u16 {
    8081
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_anthropic_version() -> String {
    "2023-06-01".to_string()
}
fn default_anthropic_beta() -> String {
    "oauth-2025-04-20,claude-code-20250219,interleaved-thinking-2025-05-14,fine-grained-tool-streaming-2025-05-14".to_string()
}
fn default_api_base() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_auth_base() -> String {
    "https://claude.ai".to_string()
}
fn default_client_id() -> String {
    "9d1c250a-e61b-44d9-88ed-5944d1962f5e".to_string()
}
fn default_redirect_uri() -> String {
    "https://console.anthropic.com/oauth/code/callback".to_string()
}
fn default_scope() -> String {
    "org:create_api_key user:profile user:inference".to_string()
}
fn default_token_file() -> String {
    "~/.anthropic-oauth-proxy/tokens.json".to_string()
}
fn default_model() -> String {
    "claude-3-7-sonnet-latest".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_connect_timeout_secs() -> u64 {
    60
}
fn default_models() -> Vec<String> {
    [
        "claude-sonnet-4-0",
        "claude-opus-4-1",
        "claude-3-7-sonnet-latest",
        "claude-3-5-haiku-latest",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Loopback listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Minimum severity surfaced to stderr.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Value of the `anthropic-version` request header.
    #[serde(default = "default_anthropic_version")]
    pub anthropic_version: String,
    /// Comma-joined value of the `anthropic-beta` request header.
    #[serde(default = "default_anthropic_beta")]
    pub anthropic_beta: String,
    /// Base URL for the Messages API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Base URL for both OAuth endpoints (`/oauth/authorize` and
    /// `/v1/oauth/token`).
    #[serde(default = "default_auth_base")]
    pub auth_base: String,
    /// Public OAuth client identifier. Not a secret.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Redirect URI registered to the client id.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Space-joined OAuth scope string.
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Path to the persisted credential; `~` expands to `$HOME`.
    #[serde(default = "default_token_file")]
    pub token_file: String,
    /// Fallback model id when the caller omits one.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Applied when the caller supplies no token ceiling.
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
    /// Upstream connect timeout. Streaming reads have no deadline; idle
    /// streams are ended by client disconnect instead.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Catalogue served by `GET /v1/models`.
    #[serde(default = "default_models")]
    pub models: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            log_level: default_log_level(),
            anthropic_version: default_anthropic_version(),
            anthropic_beta: default_anthropic_beta(),
            api_base: default_api_base(),
            auth_base: default_auth_base(),
            client_id: default_client_id(),
            redirect_uri: default_redirect_uri(),
            scope: default_scope(),
            token_file: default_token_file(),
            default_model: default_model(),
            default_max_tokens: default_max_tokens(),
            connect_timeout_secs: default_connect_timeout_secs(),
            models: default_models(),
        }
    }
}

impl Config {
    /// Load configuration, layering defaults, an optional JSON file, and
    /// environment variables (highest precedence).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a source cannot be read or a value fails
    /// to convert.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Json, Serialized},
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Json::file(path));
        }
        figment
            .merge(Env::raw().only(ENV_KEYS))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.port, 8081);
        assert_eq!(c.anthropic_version, "2023-06-01");
        assert!(c.anthropic_beta.contains("oauth-2025-04-20"));
        assert_eq!(c.api_base, "https://api.anthropic.com");
        assert!(c.token_file.starts_with("~/"));
        assert_eq!(c.default_max_tokens, 4096);
        assert!(!c.models.is_empty());
    }

    #[test]
    fn test_load_without_file_matches_defaults() {
        figment::Jail::expect_with(|_| {
            let c = Config::load(None).unwrap();
            assert_eq!(c.port, 8081);
            assert_eq!(c.scope, "org:create_api_key user:profile user:inference");
            Ok(())
        });
    }

    #[test]
    fn test_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.json",
                r#"{"port": 9000, "default_model": "claude-opus-4-1"}"#,
            )?;
            let c = Config::load(Some(Path::new("config.json"))).unwrap();
            assert_eq!(c.port, 9000);
            assert_eq!(c.default_model, "claude-opus-4-1");
            // Untouched keys keep their defaults.
            assert_eq!(c.anthropic_version, "2023-06-01");
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.json", r#"{"port": 9000}"#)?;
            jail.set_env("PORT", "9001");
            jail.set_env("LOG_LEVEL", "debug");
            let c = Config::load(Some(Path::new("config.json"))).unwrap();
            assert_eq!(c.port, 9001);
            assert_eq!(c.log_level, "debug");
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_is_ignored() {
        figment::Jail::expect_with(|_| {
            let c = Config::load(Some(Path::new("does-not-exist.json"))).unwrap();
            assert_eq!(c.port, 8081);
            Ok(())
        });
    }
}
