//! Authorization-code flow controller.
//!
//! Orchestrates the whole login round-trip against one provider: composes
//! the authorization redirect, consumes the callback, exchanges the code at
//! the token endpoint, validates the ID token, and composes the logout
//! redirect. All network calls go through one shared HTTP client bounded by
//! the configured timeouts and trust anchor.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::OidcConfig;
use crate::error::{OidcError, Result};
use crate::metadata::{MetadataResolver, ProviderMetadata};
use crate::pkce;
use crate::resource::{FsResourceResolver, ResourceResolver};
use crate::session::SessionStore;
use crate::state::{self, StateStore};

/// Additional-info key under which the originally requested URI is stored.
pub const REDIRECT_URI_INFO: &str = "redirectUri";

/// Locale forwarded to the provider when the caller supplies none.
const DEFAULT_LOCALE: &str = "fr";

/// Token set returned by a successful callback: the raw ID token plus the
/// access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcTokens {
    /// Raw ID-token string (also kept in the session for logout).
    pub id_token: String,
    /// Access token issued alongside it.
    pub access_token: String,
}

/// Standard OAuth 2.0 token response (RFC 6749) with the OIDC `id_token`.
/// Remaining response fields (token_type, expires_in, refresh_token) are not
/// consumed by this flow.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    id_token: String,
}

/// Standard OAuth 2.0 error response (RFC 6749 §5.2).
#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Parsed successful authorization response.
#[derive(Debug)]
struct AuthorizationResponse {
    state: String,
    code: String,
}

/// OIDC authorization-code client for one configured provider.
pub struct OidcClient {
    config: Arc<OidcConfig>,
    http: reqwest::Client,
    resolver: MetadataResolver,
}

impl OidcClient {
    /// Build a client resolving resources from the filesystem.
    ///
    /// # Errors
    /// `Configuration` on invalid parameters; `MetadataUnavailable` when the
    /// startup metadata load fails and `dont_fail_at_startup` is not set.
    pub async fn connect(config: OidcConfig) -> Result<Self> {
        Self::connect_with(config, Arc::new(FsResourceResolver)).await
    }

    /// Build a client with a caller-supplied resource resolver.
    ///
    /// Validates the configuration (always fatal on error), builds the
    /// shared HTTP client, and pre-loads provider metadata: silently when
    /// `dont_fail_at_startup` is set, strictly otherwise.
    ///
    /// # Errors
    /// See [`OidcClient::connect`].
    pub async fn connect_with(
        config: OidcConfig,
        resources: Arc<dyn ResourceResolver>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let http = build_http_client(&config, resources.as_ref())?;
        let resolver = MetadataResolver::new(Arc::clone(&config), http.clone(), resources);

        let client = Self { config, http, resolver };
        if client.config.dont_fail_at_startup {
            client.resolver.preload().await;
        } else {
            client.resolver.ensure_loaded().await?;
        }
        Ok(client)
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    /// Compose the authorization-request URL for a new login attempt.
    ///
    /// Generates fresh state/nonce (and a PKCE verifier when enabled),
    /// stores them in the session paired with `redirect_uri` (the URI the
    /// user originally asked for), and returns the provider URL to redirect
    /// the browser to. No network call is made beyond an initial metadata
    /// load.
    ///
    /// # Errors
    /// `MetadataUnavailable` when provider metadata cannot be loaded.
    pub async fn login_url(
        &self,
        redirect_uri: &Url,
        callback_uri: &Url,
        session: &mut dyn SessionStore,
        locale: Option<&str>,
        requested_scopes: &[&str],
    ) -> Result<Url> {
        let provider = self.resolver.ensure_loaded().await?;

        let state = pkce::generate_state();
        let nonce = pkce::generate_nonce();
        let code_verifier = self.config.use_pkce.then(pkce::generate_code_verifier);

        let mut additional_infos = HashMap::new();
        additional_infos.insert(REDIRECT_URI_INFO.to_string(), redirect_uri.to_string());
        StateStore::new(session).store(&state, &nonce, code_verifier.clone(), additional_infos);

        let mut url = provider.metadata.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", callback_uri.as_str());
            query.append_pair("scope", &login_scopes(&self.config.scopes, requested_scopes));
            query.append_pair("state", &state);
            query.append_pair("nonce", &nonce);
            if let Some(verifier) = &code_verifier {
                query.append_pair("code_challenge", &pkce::code_challenge(verifier));
                query.append_pair("code_challenge_method", "S256");
            }
            if let Some(param) = &self.config.locale_param {
                query.append_pair(param, locale.unwrap_or(DEFAULT_LOCALE));
            }
        }
        Ok(url)
    }

    /// Process the provider's callback and return the issued tokens.
    ///
    /// Validates the callback against the pending login stored for its
    /// state (a destructive read, so a state never validates twice), exchanges
    /// the authorization code, validates the ID token unless disabled, and
    /// keeps the raw ID-token string in the session for a later logout.
    ///
    /// # Errors
    /// - `Provider` when the callback or the token endpoint reports an
    ///   upstream error;
    /// - `AuthenticationFailed` when the state is unknown, expired, or
    ///   already consumed;
    /// - `MetadataUnavailable` when provider metadata cannot be loaded;
    /// - `TokenValidation` when the ID token does not check out.
    pub async fn handle_callback(
        &self,
        response_uri: &Url,
        callback_uri: &Url,
        session: &mut dyn SessionStore,
    ) -> Result<OidcTokens> {
        let response = parse_authorization_response(response_uri)?;
        let pending = StateStore::new(session).retrieve(&response.state)?;
        let provider = self.resolver.ensure_loaded().await?;

        let tokens = self
            .exchange_code(
                &provider.metadata,
                &response.code,
                pending.pkce_verifier.as_deref(),
                callback_uri,
            )
            .await?;

        if !self.config.skip_id_token_validation {
            provider.validator.validate(&tokens.id_token, &pending.nonce).await?;
        }

        // Kept for logout: some providers end the session without
        // confirmation only when the logout URL presents the ID token.
        session.save_id_token(tokens.id_token.clone());

        Ok(tokens)
    }

    /// Compose the provider logout URL.
    ///
    /// Starts from `<end_session_endpoint>?client_id=<id>` and appends the
    /// post-logout redirect, the ID-token hint from the session, and the
    /// locale, each only when the matching parameter name is configured.
    /// A session without a stored ID token simply omits the hint.
    ///
    /// # Errors
    /// `MetadataUnavailable` when provider metadata cannot be loaded;
    /// `Configuration` when the provider advertises no end-session endpoint.
    pub async fn logout_url(
        &self,
        redirect_uri: Option<&Url>,
        session: Option<&dyn SessionStore>,
        locale: Option<&str>,
    ) -> Result<Url> {
        let provider = self.resolver.ensure_loaded().await?;
        let mut url = provider.metadata.end_session_endpoint.clone().ok_or_else(|| {
            OidcError::Configuration(
                "provider metadata advertises no end_session_endpoint".to_string(),
            )
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            if let (Some(param), Some(redirect)) =
                (&self.config.logout_redirect_param, redirect_uri)
            {
                query.append_pair(param, redirect.as_str());
            }
            if let (Some(param), Some(session)) = (&self.config.logout_id_token_param, session) {
                if let Some(id_token) =
                    session.load_id_token().filter(|token| !token.trim().is_empty())
                {
                    query.append_pair(param, &id_token);
                }
            }
            if let Some(param) = &self.config.locale_param {
                query.append_pair(param, locale.unwrap_or(DEFAULT_LOCALE));
            }
        }
        Ok(url)
    }

    /// Look up the URI the user originally asked for, from the state carried
    /// by the provider's callback.
    ///
    /// Non-destructive, and deliberately tolerant: a consumed or unknown
    /// state yields `None` rather than an error, so a browser navigating
    /// back through a stale callback does not surface as an attack.
    ///
    /// # Errors
    /// `Provider` when the callback itself reports an upstream error;
    /// `AuthenticationFailed` when it is not a parseable authorization
    /// response.
    pub fn requested_uri(
        &self,
        response_uri: &Url,
        session: &dyn SessionStore,
    ) -> Result<Option<String>> {
        let response = parse_authorization_response(response_uri)?;
        let infos = state::additional_infos(session, &response.state);
        Ok(infos.get(REDIRECT_URI_INFO).cloned())
    }

    async fn exchange_code(
        &self,
        metadata: &ProviderMetadata,
        code: &str,
        pkce_verifier: Option<&str>,
        callback_uri: &Url,
    ) -> Result<OidcTokens> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", callback_uri.as_str()),
        ];
        if let Some(verifier) = pkce_verifier {
            form.push(("code_verifier", verifier));
        }

        // Confidential clients authenticate with HTTP Basic; public clients
        // identify themselves in the form body instead.
        let secret = self.config.client_secret.as_deref().filter(|s| !s.trim().is_empty());
        if secret.is_none() {
            form.push(("client_id", self.config.client_id.as_str()));
        }

        debug!(endpoint = %metadata.token_endpoint, "exchanging authorization code");
        let mut request = self.http.post(metadata.token_endpoint.clone()).form(&form);
        if let Some(secret) = secret {
            request = request.basic_auth(&self.config.client_id, Some(secret));
        }

        let response = request.send().await.map_err(|err| OidcError::Provider {
            code: "token_request_failed".to_string(),
            description: err.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body: ProviderErrorBody = serde_json::from_str(&text).unwrap_or_default();
            return Err(OidcError::Provider {
                code: body.error.unwrap_or_else(|| format!("http_{}", status.as_u16())),
                description: body.error_description.unwrap_or_default(),
            });
        }

        let token_response: TokenResponse =
            response.json().await.map_err(|err| OidcError::Provider {
                code: "invalid_token_response".to_string(),
                description: err.to_string(),
            })?;

        Ok(OidcTokens {
            id_token: token_response.id_token,
            access_token: token_response.access_token,
        })
    }
}

/// Parse the provider's redirect back to the application.
fn parse_authorization_response(response_uri: &Url) -> Result<AuthorizationResponse> {
    let mut state = None;
    let mut code = None;
    let mut error = None;
    let mut error_description = None;

    for (key, value) in response_uri.query_pairs() {
        match key.as_ref() {
            "state" => state = Some(value.into_owned()),
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(OidcError::Provider {
            code: error,
            description: error_description.unwrap_or_default(),
        });
    }

    match (state, code) {
        (Some(state), Some(code)) => Ok(AuthorizationResponse { state, code }),
        _ => Err(OidcError::AuthenticationFailed(
            "callback is missing the state or code parameter".to_string(),
        )),
    }
}

fn login_scopes(configured: &[String], requested: &[&str]) -> String {
    let mut scopes: Vec<&str> = Vec::new();
    for scope in requested.iter().copied().chain(configured.iter().map(String::as_str)) {
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }
    // mandatory scope
    if !scopes.contains(&"openid") {
        scopes.push("openid");
    }
    scopes.join(" ")
}

fn build_http_client(
    config: &OidcConfig,
    resources: &dyn ResourceResolver,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.read_timeout);

    if let Some(path) = &config.trust_store_path {
        let bundle = resources.resolve(path).map_err(|err| {
            OidcError::Configuration(format!("unable to read trust store '{path}': {err}"))
        })?;
        let certificates = reqwest::Certificate::from_pem_bundle(&bundle).map_err(|err| {
            OidcError::Configuration(format!("invalid trust store '{path}': {err}"))
        })?;
        for certificate in certificates {
            builder = builder.add_root_certificate(certificate);
        }
    }

    builder
        .build()
        .map_err(|err| OidcError::Configuration(format!("unable to build HTTP client: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_scopes_always_include_openid() {
        assert_eq!(login_scopes(&[], &[]), "openid");
        assert_eq!(login_scopes(&[], &["profile"]), "profile openid");
    }

    #[test]
    fn login_scopes_merge_configured_and_requested_without_duplicates() {
        let configured = vec!["email".to_string(), "profile".to_string()];
        assert_eq!(login_scopes(&configured, &["profile", "roles"]), "profile roles email openid");
    }

    #[test]
    fn login_scopes_do_not_duplicate_openid() {
        assert_eq!(login_scopes(&["openid".to_string()], &[]), "openid");
    }

    #[test]
    fn callback_with_error_maps_to_provider_error() {
        let uri = Url::parse(
            "https://app.example.com/callback?error=access_denied&error_description=user+cancelled",
        )
        .expect("url");

        match parse_authorization_response(&uri) {
            Err(OidcError::Provider { code, description }) => {
                assert_eq!(code, "access_denied");
                assert_eq!(description, "user cancelled");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[test]
    fn callback_error_without_description_yields_empty_description() {
        let uri =
            Url::parse("https://app.example.com/callback?error=server_error").expect("url");

        match parse_authorization_response(&uri) {
            Err(OidcError::Provider { code, description }) => {
                assert_eq!(code, "server_error");
                assert_eq!(description, "");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[test]
    fn callback_without_state_or_code_fails() {
        let uri = Url::parse("https://app.example.com/callback?code=abc").expect("url");
        assert!(matches!(
            parse_authorization_response(&uri),
            Err(OidcError::AuthenticationFailed(_))
        ));

        let uri = Url::parse("https://app.example.com/callback?state=xyz").expect("url");
        assert!(matches!(
            parse_authorization_response(&uri),
            Err(OidcError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn successful_callback_parses_state_and_code() {
        let uri = Url::parse("https://app.example.com/callback?code=abc&state=xyz&session_state=s")
            .expect("url");
        let response = parse_authorization_response(&uri).expect("response");
        assert_eq!(response.state, "xyz");
        assert_eq!(response.code, "abc");
    }
}
