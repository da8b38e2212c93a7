//! Error types for the OIDC engine.

use thiserror::Error;

/// Main error type for the OIDC engine
///
/// Every failure raised by this crate belongs to one of these variants; the
/// embedding web layer decides what HTTP status or redirect each one maps to.
#[derive(Error, Debug)]
pub enum OidcError {
    /// Invalid or missing configuration parameter. Fatal at construction;
    /// `dont_fail_at_startup` never softens these.
    #[error("invalid OIDC configuration: {0}")]
    Configuration(String),

    /// Provider metadata could not be loaded (or a recent attempt failed and
    /// the retry window has not elapsed). Transient; a later request retries.
    #[error("authentication temporarily unavailable: {0}")]
    MetadataUnavailable(String),

    /// The callback could not be tied to a pending login (state missing,
    /// expired, or already consumed). The user must restart the login.
    #[error("failed to validate data received from authorization service - {0}")]
    AuthenticationFailed(String),

    /// The identity provider itself answered with an error; code and
    /// description are surfaced verbatim for diagnosis.
    #[error("identity provider returned '{code}: {description}'")]
    Provider { code: String, description: String },

    /// ID token validation failed (signature, issuer, audience, or nonce).
    /// Always fatal to the attempt, never retried silently.
    #[error("error validating ID token: {0}")]
    TokenValidation(String),
}

/// Result type alias for OIDC operations
pub type Result<T> = std::result::Result<T, OidcError>;
