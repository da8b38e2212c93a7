//! Provider metadata discovery and caching.
//!
//! Metadata is loaded lazily, at most once successfully, and kept for the
//! connector's lifetime (no live refresh). A failed attempt opens a shared
//! 60 s cooldown during which every caller fails fast instead of hammering
//! an unreachable provider.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use url::Url;

use crate::config::OidcConfig;
use crate::error::{OidcError, Result};
use crate::resource::ResourceResolver;
use crate::validator::{self, IdTokenValidator};

/// Minimum delay between two load attempts once one has failed.
const METADATA_RETRY_INTERVAL: Duration = Duration::from_secs(60);

/// Endpoint metadata published by the provider's discovery document.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    /// Issuer identifier, as ID tokens will carry it.
    pub issuer: String,
    /// Authorization endpoint login URLs point at.
    pub authorization_endpoint: Url,
    /// Token endpoint for the code exchange.
    pub token_endpoint: Url,
    /// End-session endpoint logout URLs point at, when the provider has one.
    #[serde(default)]
    pub end_session_endpoint: Option<Url>,
    /// JWKS endpoint; absent for symmetric-only providers.
    #[serde(default)]
    pub jwks_uri: Option<Url>,
}

/// A successfully loaded provider: endpoints plus the matching ID-token
/// validator, immutable for the rest of the process lifetime.
pub struct LoadedProvider {
    /// The provider's endpoint metadata.
    pub metadata: ProviderMetadata,
    /// Validator matching the configured signing algorithm.
    pub validator: IdTokenValidator,
}

struct ResolverState {
    loaded: Option<Arc<LoadedProvider>>,
    last_attempt: Option<Instant>,
}

/// Lazy, rate-limited loader of provider metadata.
///
/// The cache and the last-attempt timestamp sit behind one async mutex, so
/// concurrent first requests trigger at most one fetch; callers that lose
/// the race observe the now-cached metadata.
pub struct MetadataResolver {
    config: Arc<OidcConfig>,
    http: reqwest::Client,
    resources: Arc<dyn ResourceResolver>,
    inner: Mutex<ResolverState>,
}

impl MetadataResolver {
    /// Create a resolver; no network activity happens here.
    pub fn new(
        config: Arc<OidcConfig>,
        http: reqwest::Client,
        resources: Arc<dyn ResourceResolver>,
    ) -> Self {
        Self {
            config,
            http,
            resources,
            inner: Mutex::new(ResolverState { loaded: None, last_attempt: None }),
        }
    }

    /// Return the loaded provider, loading it first if needed.
    ///
    /// # Errors
    /// `MetadataUnavailable` when the load fails or a recent attempt already
    /// failed and the retry window has not elapsed.
    pub async fn ensure_loaded(&self) -> Result<Arc<LoadedProvider>> {
        match self.load_if_needed(false).await? {
            Some(loaded) => Ok(loaded),
            // silent=false never yields Ok(None)
            None => Err(OidcError::MetadataUnavailable("provider metadata not loaded".to_string())),
        }
    }

    /// Startup variant: attempt the load but only log on failure, leaving
    /// later calls to retry within the usual rate limit.
    pub async fn preload(&self) {
        match self.load_if_needed(true).await {
            Ok(_) => {}
            Err(err) => warn!(error = %err, "provider metadata not loaded, will retry later"),
        }
    }

    async fn load_if_needed(&self, silent: bool) -> Result<Option<Arc<LoadedProvider>>> {
        let mut state = self.inner.lock().await;
        if let Some(loaded) = &state.loaded {
            return Ok(Some(Arc::clone(loaded)));
        }

        if let Some(last_attempt) = state.last_attempt {
            if last_attempt.elapsed() < METADATA_RETRY_INTERVAL {
                return Err(OidcError::MetadataUnavailable(
                    "a recent discovery attempt failed, holding off before retrying".to_string(),
                ));
            }
        }
        // The attempt counts from now, whatever its outcome.
        state.last_attempt = Some(Instant::now());

        match self.load_provider().await {
            Ok(loaded) => {
                let loaded = Arc::new(loaded);
                state.loaded = Some(Arc::clone(&loaded));
                Ok(Some(loaded))
            }
            Err(err) if silent => {
                warn!(error = %err, "unable to load provider metadata, login temporarily disabled");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn load_provider(&self) -> Result<LoadedProvider> {
        let metadata = self.load_metadata().await?;
        let validator = self.build_validator(&metadata)?;
        info!(issuer = %metadata.issuer, "provider metadata loaded");
        Ok(LoadedProvider { metadata, validator })
    }

    async fn load_metadata(&self) -> Result<ProviderMetadata> {
        if let Some(path) = &self.config.local_metadata_path {
            match self.load_local_metadata(path) {
                Ok(metadata) => return Ok(metadata),
                Err(err) => warn!(
                    path = %path,
                    error = %err,
                    "unable to read local provider metadata, falling back to discovery"
                ),
            }
        }
        self.fetch_discovery().await
    }

    fn load_local_metadata(&self, path: &str) -> Result<ProviderMetadata> {
        let bytes = self
            .resources
            .resolve(path)
            .map_err(|err| OidcError::MetadataUnavailable(err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|err| OidcError::MetadataUnavailable(err.to_string()))
    }

    async fn fetch_discovery(&self) -> Result<ProviderMetadata> {
        let base =
            self.config.discovery_url_override.as_deref().unwrap_or(&self.config.provider_url);
        let url = discovery_url(base)?;

        let response = self.http.get(url.clone()).send().await.map_err(|err| {
            OidcError::MetadataUnavailable(format!("discovery request to '{url}' failed: {err}"))
        })?;
        if !response.status().is_success() {
            return Err(OidcError::MetadataUnavailable(format!(
                "discovery request to '{url}' returned status {}",
                response.status()
            )));
        }
        let metadata: ProviderMetadata = response.json().await.map_err(|err| {
            OidcError::MetadataUnavailable(format!("invalid discovery document at '{url}': {err}"))
        })?;

        // The document may come from an internal hostname, but it must still
        // name the issuer the connector was configured for.
        if !self.config.skip_issuer_validation
            && !issuer_matches(&metadata.issuer, &self.config.provider_url)
        {
            return Err(OidcError::MetadataUnavailable(format!(
                "discovery document issuer '{}' does not match expected issuer '{}'",
                metadata.issuer, self.config.provider_url
            )));
        }

        Ok(metadata)
    }

    fn build_validator(&self, metadata: &ProviderMetadata) -> Result<IdTokenValidator> {
        let algorithm = validator::parse_algorithm(&self.config.jws_algorithm)?;
        let issuer = metadata.issuer.clone();
        let audience = self.config.client_id.clone();

        if validator::is_hmac(algorithm) {
            let secret = self
                .config
                .client_secret
                .as_deref()
                .filter(|secret| !secret.trim().is_empty())
                .ok_or_else(|| {
                    OidcError::Configuration(
                        "an HMAC JWS algorithm requires a client secret".to_string(),
                    )
                })?;
            Ok(IdTokenValidator::hmac(secret, algorithm, issuer, audience))
        } else {
            let jwks_uri = metadata.jwks_uri.clone().ok_or_else(|| {
                OidcError::MetadataUnavailable(
                    "provider metadata advertises no jwks_uri".to_string(),
                )
            })?;
            Ok(IdTokenValidator::jwks(jwks_uri, self.http.clone(), algorithm, issuer, audience))
        }
    }
}

fn discovery_url(base: &str) -> Result<Url> {
    let joined = format!("{}/.well-known/openid-configuration", base.trim_end_matches('/'));
    Url::parse(&joined)
        .map_err(|err| OidcError::Configuration(format!("invalid discovery URL '{joined}': {err}")))
}

fn issuer_matches(returned: &str, expected: &str) -> bool {
    returned.trim_end_matches('/') == expected.trim_end_matches('/')
}
