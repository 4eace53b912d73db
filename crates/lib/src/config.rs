//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.veth/config.json`) and environment.
//! The only secret is the Gemini API key; everything else has a working default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Persona sent as the system instruction on every chat call.
pub const DEFAULT_PERSONA: &str = "You are 'Veth AI', the advanced assistant for Veth Analytics. You are professional, concise, and knowledgeable about IT, Government projects, and AI. Tone: Premium, helpful, futuristic.";

/// Seed greeting every conversation starts with.
pub const DEFAULT_GREETING: &str =
    "Greetings. I am Veth AI. How can I assist with your digital transformation goals today?";

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_COPY_MODEL: &str = "gemini-2.5-flash";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Remote model settings (credential, endpoint, model names).
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Chat widget settings (persona, greeting, history cap).
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP and WebSocket (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiConfig {
    /// API key. Overridden by GEMINI_API_KEY or API_KEY env when set.
    pub api_key: Option<String>,
    /// API root, without trailing slash (default is the public v1beta endpoint).
    pub base_url: Option<String>,
    /// Model for the chat widget and taglines.
    pub chat_model: Option<String>,
    /// Model for the short copy blurbs (bios, insights, summaries).
    pub copy_model: Option<String>,
    /// Give up on a reply when no fragment arrives within this many seconds. Unset waits forever.
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// System persona; defaults to [`DEFAULT_PERSONA`].
    pub persona: Option<String>,
    /// Seed greeting; defaults to [`DEFAULT_GREETING`].
    pub greeting: Option<String>,
    /// Send at most this many prior turns back to the model. Unset sends the whole conversation.
    pub history_limit: Option<usize>,
}

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Resolve the API key: env GEMINI_API_KEY, then API_KEY, then config. Blank values count as unset.
pub fn resolve_api_key(config: &Config) -> Option<String> {
    resolve_api_key_with(config, |name| std::env::var(name).ok())
}

/// [`resolve_api_key`] with an explicit environment lookup.
pub fn resolve_api_key_with(
    config: &Config,
    env: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    ["GEMINI_API_KEY", "API_KEY"]
        .iter()
        .find_map(|name| env(name).and_then(|s| non_blank(&s)))
        .or_else(|| config.gemini.api_key.as_deref().and_then(non_blank))
}

pub fn resolve_base_url(config: &Config) -> String {
    config
        .gemini
        .base_url
        .as_deref()
        .and_then(non_blank)
        .map(|u| u.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string())
}

pub fn resolve_chat_model(config: &Config) -> String {
    config
        .gemini
        .chat_model
        .as_deref()
        .and_then(non_blank)
        .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string())
}

pub fn resolve_copy_model(config: &Config) -> String {
    config
        .gemini
        .copy_model
        .as_deref()
        .and_then(non_blank)
        .unwrap_or_else(|| DEFAULT_COPY_MODEL.to_string())
}

pub fn resolve_persona(config: &Config) -> String {
    config
        .chat
        .persona
        .as_deref()
        .and_then(non_blank)
        .unwrap_or_else(|| DEFAULT_PERSONA.to_string())
}

pub fn resolve_greeting(config: &Config) -> String {
    config
        .chat
        .greeting
        .as_deref()
        .and_then(non_blank)
        .unwrap_or_else(|| DEFAULT_GREETING.to_string())
}

/// Per-fragment timeout; zero is treated as unset.
pub fn resolve_request_timeout(config: &Config) -> Option<Duration> {
    config
        .gemini
        .request_timeout_secs
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("VETH_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".veth").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or VETH_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 15152);
        assert_eq!(g.bind, "127.0.0.1");
    }

    #[test]
    fn parses_camel_case_sections() {
        let config: Config = serde_json::from_str(
            r#"{
                "gateway": { "port": 8080 },
                "gemini": { "chatModel": "gemini-x", "requestTimeoutSecs": 30 },
                "chat": { "historyLimit": 12, "greeting": "Hi." }
            }"#,
        )
        .unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.bind, "127.0.0.1");
        assert_eq!(resolve_chat_model(&config), "gemini-x");
        assert_eq!(resolve_copy_model(&config), DEFAULT_COPY_MODEL);
        assert_eq!(resolve_request_timeout(&config), Some(Duration::from_secs(30)));
        assert_eq!(config.chat.history_limit, Some(12));
        assert_eq!(resolve_greeting(&config), "Hi.");
        assert_eq!(resolve_persona(&config), DEFAULT_PERSONA);
    }

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn api_key_precedence_env_then_config() {
        let mut config = Config::default();
        config.gemini.api_key = Some("from-config".to_string());

        assert_eq!(
            resolve_api_key_with(&config, env_of(&[("GEMINI_API_KEY", "g"), ("API_KEY", "a")])),
            Some("g".to_string())
        );
        assert_eq!(
            resolve_api_key_with(&config, env_of(&[("API_KEY", "a")])),
            Some("a".to_string())
        );
        assert_eq!(
            resolve_api_key_with(&config, env_of(&[])),
            Some("from-config".to_string())
        );
    }

    #[test]
    fn blank_api_keys_count_as_unset() {
        let mut config = Config::default();
        config.gemini.api_key = Some("  ".to_string());
        assert_eq!(resolve_api_key_with(&config, env_of(&[])), None);
        assert_eq!(
            resolve_api_key_with(&config, env_of(&[("GEMINI_API_KEY", " "), ("API_KEY", "")])),
            None
        );

        config.gemini.api_key = Some(" key \n".to_string());
        assert_eq!(
            resolve_api_key_with(&config, env_of(&[("GEMINI_API_KEY", "\t")])),
            Some("key".to_string())
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let mut config = Config::default();
        assert_eq!(resolve_base_url(&config), DEFAULT_GEMINI_BASE_URL);
        config.gemini.base_url = Some("http://127.0.0.1:9000/v1beta/".to_string());
        assert_eq!(resolve_base_url(&config), "http://127.0.0.1:9000/v1beta");
    }

    #[test]
    fn zero_timeout_means_no_timeout() {
        let mut config = Config::default();
        config.gemini.request_timeout_secs = Some(0);
        assert_eq!(resolve_request_timeout(&config), None);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir()
            .join(format!("veth-missing-{}", uuid::Uuid::new_v4()))
            .join("config.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert!(config.gemini.api_key.is_none());
        assert_eq!(resolve_greeting(&config), DEFAULT_GREETING);
    }
}
