//! OIDC connector configuration.
//!
//! One immutable record, constructed once by the embedding application's
//! configuration layer. `OidcConfig::new` fills the deployment defaults
//! (1 s HTTP timeouts, RS256, PKCE enabled); everything else is plain field
//! assignment. Validation happens when the connector is built and is always
//! fatal; `dont_fail_at_startup` only softens metadata loading, never
//! parameter validation.

use std::time::Duration;

use url::Url;

use crate::error::{OidcError, Result};
use crate::validator;

/// Configuration for one OIDC provider connection.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// OAuth2/OIDC client identifier registered at the provider.
    pub client_id: String,

    /// Client secret. Optional: public clients (PKCE-only) have none.
    pub client_secret: Option<String>,

    /// Provider base URL; this is the issuer value ID tokens are expected to
    /// carry.
    pub provider_url: String,

    /// Alternate URL to fetch the discovery document from, for providers
    /// reachable via an internal hostname that report their external issuer.
    /// The document's issuer must still equal `provider_url`.
    pub discovery_url_override: Option<String>,

    /// HTTP connect timeout for metadata, JWKS, and token calls.
    pub connect_timeout: Duration,

    /// HTTP read timeout for metadata, JWKS, and token calls.
    pub read_timeout: Duration,

    /// Scopes requested on every login, in addition to the mandatory
    /// `openid`.
    pub scopes: Vec<String>,

    /// Symbolic resource path of a local provider-metadata document. When
    /// set, it is tried before remote discovery; parse failures fall through
    /// to discovery.
    pub local_metadata_path: Option<String>,

    /// JWS algorithm the provider signs ID tokens with (e.g. "RS256",
    /// "HS256").
    pub jws_algorithm: String,

    /// Skip ID-token validation entirely after the code exchange.
    pub skip_id_token_validation: bool,

    /// Skip the discovery-document issuer equality check.
    pub skip_issuer_validation: bool,

    /// Send a PKCE S256 challenge with every login and the matching verifier
    /// on the code exchange.
    pub use_pkce: bool,

    /// Tolerate a failing metadata load at startup (logged, retried on the
    /// first login attempt). Parameter validation stays fatal regardless.
    pub dont_fail_at_startup: bool,

    /// Symbolic resource path of a PEM certificate bundle used as the TLS
    /// trust anchor for all provider calls. Default OS roots otherwise.
    pub trust_store_path: Option<String>,

    /// Name of the provider's locale query parameter (e.g. Keycloak's
    /// `ui_locales`). When unset, no locale is forwarded.
    pub locale_param: Option<String>,

    /// Name of the provider's post-logout redirect parameter. When unset,
    /// logout URLs carry no redirect.
    pub logout_redirect_param: Option<String>,

    /// Name of the provider's id-token-hint logout parameter. When unset, or
    /// when no login happened in the session, logout URLs carry no hint.
    pub logout_id_token_param: Option<String>,
}

impl OidcConfig {
    /// Create a configuration with deployment defaults for the given client
    /// and provider.
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider_url: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            provider_url: provider_url.into(),
            discovery_url_override: None,
            connect_timeout: Duration::from_millis(1000),
            read_timeout: Duration::from_millis(1000),
            scopes: Vec::new(),
            local_metadata_path: None,
            jws_algorithm: "RS256".to_string(),
            skip_id_token_validation: false,
            skip_issuer_validation: false,
            use_pkce: true,
            dont_fail_at_startup: false,
            trust_store_path: None,
            locale_param: None,
            logout_redirect_param: None,
            logout_id_token_param: None,
        }
    }

    /// Check all construction-time invariants.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(OidcError::Configuration("client id must not be blank".to_string()));
        }
        if self.provider_url.trim().is_empty() {
            return Err(OidcError::Configuration("provider URL must not be blank".to_string()));
        }
        Url::parse(&self.provider_url).map_err(|err| {
            OidcError::Configuration(format!("invalid provider URL '{}': {err}", self.provider_url))
        })?;
        if let Some(override_url) = &self.discovery_url_override {
            Url::parse(override_url).map_err(|err| {
                OidcError::Configuration(format!("invalid discovery URL '{override_url}': {err}"))
            })?;
        }

        let algorithm = validator::parse_algorithm(&self.jws_algorithm)?;
        if validator::is_hmac(algorithm) && !self.has_client_secret() {
            return Err(OidcError::Configuration(
                "an HMAC JWS algorithm requires a client secret".to_string(),
            ));
        }

        if self.connect_timeout.is_zero() || self.read_timeout.is_zero() {
            return Err(OidcError::Configuration(
                "HTTP timeouts must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether a usable (non-blank) client secret is configured.
    pub(crate) fn has_client_secret(&self) -> bool {
        self.client_secret.as_deref().is_some_and(|secret| !secret.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> OidcConfig {
        OidcConfig::new("test-client", "https://sso.example.com/realms/test")
    }

    #[test]
    fn defaults_match_deployment_expectations() {
        let config = base_config();

        assert_eq!(config.connect_timeout, Duration::from_millis(1000));
        assert_eq!(config.read_timeout, Duration::from_millis(1000));
        assert_eq!(config.jws_algorithm, "RS256");
        assert!(config.use_pkce);
        assert!(!config.skip_id_token_validation);
        assert!(!config.dont_fail_at_startup);
        assert!(config.scopes.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn blank_client_id_is_rejected() {
        let mut config = base_config();
        config.client_id = "  ".to_string();

        assert!(matches!(config.validate(), Err(OidcError::Configuration(_))));
    }

    #[test]
    fn malformed_provider_url_is_rejected() {
        let mut config = base_config();
        config.provider_url = "not a url".to_string();

        assert!(matches!(config.validate(), Err(OidcError::Configuration(_))));
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let mut config = base_config();
        config.jws_algorithm = "XX999".to_string();

        assert!(matches!(config.validate(), Err(OidcError::Configuration(_))));
    }

    #[test]
    fn hmac_without_secret_is_rejected() {
        let mut config = base_config();
        config.jws_algorithm = "HS256".to_string();
        assert!(matches!(config.validate(), Err(OidcError::Configuration(_))));

        config.client_secret = Some(" ".to_string());
        assert!(matches!(config.validate(), Err(OidcError::Configuration(_))));

        config.client_secret = Some("a-real-secret".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn algorithm_name_is_case_insensitive() {
        let mut config = base_config();
        config.jws_algorithm = "rs256".to_string();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = base_config();
        config.read_timeout = Duration::ZERO;

        assert!(matches!(config.validate(), Err(OidcError::Configuration(_))));
    }
}
