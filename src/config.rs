//! Configuration management for the Zendesk MCP server.
//!
//! This module handles loading configuration from environment variables,
//! with validation to ensure all required values are present.

use crate::error::ZendeskError;
use std::env;
use std::path::PathBuf;

/// How requests to the Zendesk API are authenticated.
///
/// Secrets held here must never be logged or included in error messages.
#[derive(Clone)]
pub enum Credentials {
    /// OAuth access token sent as a bearer token.
    OAuth {
        /// The access token.
        token: String,
    },
    /// API token authentication (`email/token:api_token`).
    ApiToken {
        /// Agent email address.
        email: String,
        /// API token.
        token: String,
    },
    /// Password authentication (`email:password`).
    Password {
        /// Agent email address.
        email: String,
        /// Account password.
        password: String,
    },
}

impl Credentials {
    /// Returns the secret part of the credentials for sanitization purposes.
    pub fn secret(&self) -> &str {
        match self {
            Credentials::OAuth { token } => token,
            Credentials::ApiToken { token, .. } => token,
            Credentials::Password { password, .. } => password,
        }
    }
}

/// Configuration for connecting to Zendesk and caching attachments.
#[derive(Clone)]
pub struct Config {
    /// Base URL for the Zendesk instance (e.g., `https://acme.zendesk.com`).
    pub base_url: String,

    /// API credentials.
    pub credentials: Credentials,

    /// Override for the attachment cache root. `None` uses the platform
    /// temp directory.
    pub attachment_cache_dir: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ZENDESK_SUBDOMAIN` or `ZENDESK_DOMAIN` (one is required)
    /// - `ZENDESK_OAUTH_TOKEN`, or `ZENDESK_EMAIL` with `ZENDESK_API_TOKEN`
    ///   or `ZENDESK_PASSWORD`
    /// - `ZENDESK_ATTACHMENT_CACHE_DIR` (optional)
    ///
    /// # Errors
    ///
    /// Returns `ZendeskError::Config` if any required variable is missing
    /// or if values fail validation.
    pub fn from_env() -> Result<Self, ZendeskError> {
        let base_url = match Self::get_optional_env("ZENDESK_DOMAIN") {
            Some(domain) => Self::base_url_from_domain(&domain)?,
            None => {
                let subdomain = Self::get_optional_env("ZENDESK_SUBDOMAIN").ok_or_else(|| {
                    ZendeskError::missing_env("ZENDESK_SUBDOMAIN (or ZENDESK_DOMAIN)")
                })?;
                Self::base_url_from_subdomain(&subdomain)?
            }
        };

        let credentials = Self::credentials_from_env()?;
        Self::validate_secret(credentials.secret())?;

        let attachment_cache_dir =
            Self::get_optional_env("ZENDESK_ATTACHMENT_CACHE_DIR").map(PathBuf::from);

        Ok(Config {
            base_url,
            credentials,
            attachment_cache_dir,
        })
    }

    /// Gets an environment variable, treating blank values as unset.
    fn get_optional_env(name: &str) -> Option<String> {
        env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn credentials_from_env() -> Result<Credentials, ZendeskError> {
        if let Some(token) = Self::get_optional_env("ZENDESK_OAUTH_TOKEN") {
            return Ok(Credentials::OAuth { token });
        }

        let email = Self::get_optional_env("ZENDESK_EMAIL")
            .ok_or_else(|| ZendeskError::missing_env("ZENDESK_EMAIL (or ZENDESK_OAUTH_TOKEN)"))?;

        if let Some(token) = Self::get_optional_env("ZENDESK_API_TOKEN") {
            return Ok(Credentials::ApiToken { email, token });
        }
        if let Some(password) = Self::get_optional_env("ZENDESK_PASSWORD") {
            return Ok(Credentials::Password { email, password });
        }

        Err(ZendeskError::missing_env(
            "ZENDESK_API_TOKEN (or ZENDESK_PASSWORD)",
        ))
    }

    /// Normalizes a full domain into a base URL.
    ///
    /// A bare host gets `https://`. An explicit `http://` scheme is kept so
    /// a local mock server can stand in for Zendesk.
    fn base_url_from_domain(domain: &str) -> Result<String, ZendeskError> {
        let domain = domain.trim().trim_end_matches('/');

        let url = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{}", domain)
        };

        let host = url.split("://").nth(1).unwrap_or_default();
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(ZendeskError::invalid_config(
                "ZENDESK_DOMAIN must be a host name such as support.example.com",
            ));
        }

        Ok(url)
    }

    /// Builds the base URL for a `<subdomain>.zendesk.com` instance.
    fn base_url_from_subdomain(subdomain: &str) -> Result<String, ZendeskError> {
        let subdomain = subdomain.trim();
        if !subdomain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ZendeskError::invalid_config(
                "ZENDESK_SUBDOMAIN may only contain letters, digits and '-'",
            ));
        }
        Ok(format!("https://{}.zendesk.com", subdomain))
    }

    /// Validates the secret is not a placeholder value.
    fn validate_secret(secret: &str) -> Result<(), ZendeskError> {
        let secret_lower = secret.to_lowercase();
        let placeholder_patterns = [
            "your_api_token",
            "your_token",
            "your_password",
            "placeholder",
            "xxx",
            "changeme",
        ];

        for pattern in placeholder_patterns {
            if secret_lower.contains(pattern) {
                return Err(ZendeskError::invalid_config(
                    "Zendesk credentials appear to be a placeholder value",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests here avoid touching process environment variables so they can
    // run in parallel.

    #[test]
    fn test_base_url_from_domain_adds_scheme() {
        let result = Config::base_url_from_domain("support.example.com/").unwrap();
        assert_eq!(result, "https://support.example.com");
    }

    #[test]
    fn test_base_url_from_domain_keeps_http_scheme() {
        let result = Config::base_url_from_domain("http://127.0.0.1:8080").unwrap();
        assert_eq!(result, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_base_url_from_domain_rejects_empty_host() {
        assert!(Config::base_url_from_domain("https://").is_err());
    }

    #[test]
    fn test_base_url_from_subdomain() {
        let result = Config::base_url_from_subdomain("acme").unwrap();
        assert_eq!(result, "https://acme.zendesk.com");
    }

    #[test]
    fn test_base_url_from_subdomain_rejects_path_characters() {
        assert!(Config::base_url_from_subdomain("acme.evil.com/x").is_err());
    }

    #[test]
    fn test_validate_secret_rejects_placeholder() {
        assert!(Config::validate_secret("your_api_token_here").is_err());
        assert!(Config::validate_secret("CHANGEME").is_err());
    }

    #[test]
    fn test_validate_secret_accepts_real_token() {
        assert!(Config::validate_secret("abc123def456").is_ok());
    }

    #[test]
    fn test_credentials_secret() {
        let creds = Credentials::ApiToken {
            email: "agent@example.com".to_string(),
            token: "tok".to_string(),
        };
        assert_eq!(creds.secret(), "tok");
    }
}
