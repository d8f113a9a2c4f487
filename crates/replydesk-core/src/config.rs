//! Service configuration.
//!
//! Loaded from a JSON file (by default `<config dir>/replydesk/config.json`),
//! then overridden by `REPLYDESK_*` environment variables. Every field has a
//! default so a partial file is fine; [`Config::validate`] checks that the
//! secrets needed at runtime are present.

use std::path::{Path, PathBuf};
use std::time::Duration;

use replydesk_oauth::provider::GMAIL_SEND_SCOPE;
use replydesk_oauth::{AuthorizationCodeFlow, OAuthClient, Provider};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::inference::{DEFAULT_MODEL, InferenceLimits, OPENAI_API_BASE};
use crate::mail::GMAIL_API_BASE;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `SQLite` database file.
    pub database_path: PathBuf,
    /// Google `OAuth2` client.
    pub google: GoogleConfig,
    /// Gmail REST API.
    pub gmail: GmailConfig,
    /// Chat-completion API.
    pub inference: InferenceConfig,
    /// Upper bound for any single outbound call, in seconds.
    pub request_timeout_secs: u64,
}

/// Google `OAuth2` client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    /// Client ID.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Registered redirect URI.
    pub redirect_uri: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Authorization endpoint.
    pub auth_url: String,
    /// Token endpoint.
    pub token_url: String,
}

/// Gmail API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmailConfig {
    /// API base URL.
    pub api_base: String,
    /// Messages returned by a list call.
    pub max_results: u32,
}

/// Chat-completion settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// API base URL.
    pub api_base: String,
    /// Bearer API key.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Completion limit for classification.
    pub classify_max_tokens: u32,
    /// Completion limit for sentiment.
    pub sentiment_max_tokens: u32,
    /// Completion limit for drafted replies.
    pub reply_max_tokens: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_data_dir().join("replydesk.db"),
            google: GoogleConfig::default(),
            gmail: GmailConfig::default(),
            inference: InferenceConfig::default(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            scopes: vec![replydesk_oauth::provider::GMAIL_READONLY_SCOPE.to_string()],
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
        }
    }
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_base: GMAIL_API_BASE.to_string(),
            max_results: 20,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        let limits = InferenceLimits::default();
        Self {
            api_base: OPENAI_API_BASE.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            classify_max_tokens: limits.classify,
            sentiment_max_tokens: limits.sentiment,
            reply_max_tokens: limits.reply,
        }
    }
}

impl Config {
    /// Default config file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("replydesk")
            .join("config.json")
    }

    /// Loads the config file (if it exists) and applies environment overrides.
    ///
    /// With `path == None` the default location is used; a missing default
    /// file yields defaults. An explicitly named file must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        let mut config = if required || path.exists() {
            let contents = tokio::fs::read_to_string(&path).await?;
            debug!("Loaded configuration from {:?}", path);
            serde_json::from_str(&contents)?
        } else {
            debug!("No configuration file at {:?}, using defaults", path);
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Writes the config as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;
        info!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Applies overrides from `lookup` (normally the process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("REPLYDESK_DATABASE") {
            self.database_path = PathBuf::from(value);
        }
        if let Some(value) = get("REPLYDESK_GOOGLE_CLIENT_ID") {
            self.google.client_id = value;
        }
        if let Some(value) = get("REPLYDESK_GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = value;
        }
        if let Some(value) = get("REPLYDESK_GOOGLE_REDIRECT_URI") {
            self.google.redirect_uri = value;
        }
        if let Some(value) = get("REPLYDESK_OPENAI_API_KEY").or_else(|| get("OPENAI_API_KEY")) {
            self.inference.api_key = value;
        }
    }

    /// Checks that everything needed to talk to the providers is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing or invalid field.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("google.client_id", &self.google.client_id),
            ("google.client_secret", &self.google.client_secret),
            ("google.redirect_uri", &self.google.redirect_uri),
            ("inference.api_key", &self.inference.api_key),
            ("inference.model", &self.inference.model),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(Error::Config(format!("{name} is not set")));
        }

        url::Url::parse(&self.google.redirect_uri)
            .map_err(|e| Error::Config(format!("google.redirect_uri is invalid: {e}")))?;
        for (name, base) in [
            ("gmail.api_base", &self.gmail.api_base),
            ("inference.api_base", &self.inference.api_base),
        ] {
            url::Url::parse(base).map_err(|e| Error::Config(format!("{name} is invalid: {e}")))?;
        }
        self.provider()?
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        if self.gmail.max_results == 0 {
            return Err(Error::Config("gmail.max_results must be positive".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// Timeout for a single outbound call.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Completion limits per operation.
    #[must_use]
    pub const fn inference_limits(&self) -> InferenceLimits {
        InferenceLimits {
            classify: self.inference.classify_max_tokens,
            sentiment: self.inference.sentiment_max_tokens,
            reply: self.inference.reply_max_tokens,
        }
    }

    /// Google provider endpoints and scopes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an endpoint URL is invalid.
    pub fn provider(&self) -> Result<Provider> {
        Provider::new("Google", &self.google.auth_url, &self.google.token_url)
            .map(|provider| provider.with_default_scopes(self.google.scopes.clone()))
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Whether the configured scopes include Gmail send. Without it Gmail
    /// rejects `send_message` with a provider error.
    #[must_use]
    pub fn grants_send(&self) -> bool {
        self.google
            .scopes
            .iter()
            .any(|scope| scope.trim() == GMAIL_SEND_SCOPE)
    }

    /// Authorization-code flow for the configured client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an endpoint URL is invalid.
    pub fn oauth_flow(&self) -> Result<AuthorizationCodeFlow> {
        let client = OAuthClient::new(&self.google.client_id, self.provider()?)
            .with_client_secret(&self.google.client_secret)
            .with_redirect_uri(&self.google.redirect_uri)
            .with_timeout(self.request_timeout());
        Ok(AuthorizationCodeFlow::new(client))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("replydesk")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn configured() -> Config {
        let mut config = Config::default();
        config.google.client_id = "client".into();
        config.google.client_secret = "secret".into();
        config.google.redirect_uri = "http://localhost:5000/auth/callback".into();
        config.inference.api_key = "sk-test".into();
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.gmail.max_results, 20);
        assert_eq!(config.inference.model, "gpt-3.5-turbo");
        assert_eq!(config.inference_limits(), InferenceLimits::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.database_path.ends_with("replydesk.db"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"gmail":{"max_results":5},"google":{"client_id":"abc"}}"#)
                .unwrap();
        assert_eq!(config.gmail.max_results, 5);
        assert_eq!(config.gmail.api_base, GMAIL_API_BASE);
        assert_eq!(config.google.client_id, "abc");
        assert_eq!(config.google.scopes.len(), 1);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("REPLYDESK_GOOGLE_CLIENT_ID", "env-client"),
            ("REPLYDESK_DATABASE", "/tmp/rd.db"),
            ("REPLYDESK_GOOGLE_CLIENT_SECRET", "  "),
            ("OPENAI_API_KEY", "sk-fallback"),
        ]
        .into_iter()
        .collect();

        let mut config = configured();
        config.apply_env(|key| env.get(key).map(ToString::to_string));
        assert_eq!(config.google.client_id, "env-client");
        assert_eq!(config.google.client_secret, "secret");
        assert_eq!(config.database_path, PathBuf::from("/tmp/rd.db"));
        assert_eq!(config.inference.api_key, "sk-fallback");
    }

    #[test]
    fn test_prefixed_api_key_wins() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            "REPLYDESK_OPENAI_API_KEY" => Some("sk-primary".into()),
            "OPENAI_API_KEY" => Some("sk-fallback".into()),
            _ => None,
        });
        assert_eq!(config.inference.api_key, "sk-primary");
    }

    #[test]
    fn test_validate() {
        assert!(configured().validate().is_ok());

        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("google.client_id")));

        let mut config = configured();
        config.google.redirect_uri = "not a url".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = configured();
        config.google.scopes.clear();
        assert!(matches!(config.validate(), Err(Error::Config(msg)) if msg.contains("scopes")));

        let mut config = configured();
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oauth_flow_uses_config() {
        let config = configured();
        let flow = config.oauth_flow().unwrap();
        assert_eq!(flow.client().client_id, "client");
        assert_eq!(flow.client().timeout, Duration::from_secs(30));
        let url = flow.authorization_url(None, Some("7")).unwrap();
        assert!(url.as_str().contains("gmail.readonly"));
    }

    #[test]
    fn test_send_scope_is_opt_in() {
        let mut config = configured();
        assert!(!config.grants_send());

        config.google.scopes.push(GMAIL_SEND_SCOPE.to_string());
        assert!(config.grants_send());
        let url = config.oauth_flow().unwrap().authorization_url(None, None).unwrap();
        assert!(url.as_str().contains("gmail.send"));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = std::env::temp_dir().join(format!("replydesk-config-{}", std::process::id()));
        let path = dir.join("config.json");
        let config = configured();
        config.save(&path).await.unwrap();

        let loaded = Config::load(Some(path.as_path())).await.unwrap();
        assert_eq!(loaded.gmail, config.gmail);
        assert_eq!(loaded.google.scopes, config.google.scopes);
        assert_eq!(loaded.request_timeout_secs, config.request_timeout_secs);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_explicit_file_is_error() {
        let path = std::env::temp_dir().join("replydesk-does-not-exist.json");
        assert!(matches!(Config::load(Some(path.as_path())).await, Err(Error::Io(_))));
    }
}
