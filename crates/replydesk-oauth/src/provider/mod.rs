//! `OAuth2` provider configurations.

use crate::error::{Error, Result};
use url::Url;

/// Read-only Gmail scope requested by default.
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Gmail send scope, needed when replies are delivered through the API.
pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

/// `OAuth2` provider configuration.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Provider name (e.g., "Google").
    pub name: String,
    /// Authorization endpoint URL.
    pub auth_url: Url,
    /// Token endpoint URL.
    pub token_url: Url,
    /// Default scopes.
    pub default_scopes: Vec<String>,
}

impl Provider {
    /// Creates a new provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if URLs are invalid.
    pub fn new(
        name: impl Into<String>,
        auth_url: impl AsRef<str>,
        token_url: impl AsRef<str>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            auth_url: Url::parse(auth_url.as_ref())?,
            token_url: Url::parse(token_url.as_ref())?,
            default_scopes: Vec::new(),
        })
    }

    /// Sets the default scopes.
    #[must_use]
    pub fn with_default_scopes(mut self, scopes: Vec<String>) -> Self {
        self.default_scopes = scopes;
        self
    }

    /// Google `OAuth2` provider configuration.
    ///
    /// Scopes:
    /// - `gmail.readonly` - Read-only Gmail API access
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn google() -> Result<Self> {
        Ok(Self::new(
            "Google",
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
        )?
        .with_default_scopes(vec![GMAIL_READONLY_SCOPE.to_string()]))
    }

    /// Validates that required URLs and scopes are set.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.auth_url.scheme(), "https" | "http") {
            return Err(Error::InvalidConfig(format!(
                "auth_url must be http(s): {}",
                self.auth_url
            )));
        }
        if !matches!(self.token_url.scheme(), "https" | "http") {
            return Err(Error::InvalidConfig(format!(
                "token_url must be http(s): {}",
                self.token_url
            )));
        }
        if self.default_scopes.is_empty() {
            return Err(Error::InvalidConfig("no scopes configured".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_google_provider() {
        let provider = Provider::google().unwrap();
        assert_eq!(provider.name, "Google");
        assert_eq!(provider.default_scopes, vec![GMAIL_READONLY_SCOPE]);
        provider.validate().unwrap();
    }

    #[test]
    fn test_custom_provider() {
        let provider = Provider::new(
            "Custom",
            "https://auth.example.com/authorize",
            "https://auth.example.com/token",
        )
        .unwrap()
        .with_default_scopes(vec!["email".to_string()]);

        assert_eq!(provider.name, "Custom");
        provider.validate().unwrap();
    }

    #[test]
    fn test_provider_without_scopes_is_invalid() {
        let provider = Provider::new(
            "Custom",
            "https://auth.example.com/authorize",
            "https://auth.example.com/token",
        )
        .unwrap();
        assert!(matches!(provider.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            Provider::new("Bad", "not a url", "https://auth.example.com/token"),
            Err(Error::UrlError(_))
        ));
    }
}
