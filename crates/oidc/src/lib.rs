//! OpenID Connect authorization-code engine.
//!
//! Connects an application to one OIDC provider and drives the full login
//! round-trip: authorization redirect, callback validation, code-for-token
//! exchange, ID-token validation, and logout redirect. Per-session login
//! state (state/nonce/PKCE verifier) lives behind a small session
//! abstraction with one-time use and TTL expiry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │    OidcClient    │  Flow controller (login/callback/logout URLs)
//! └────────┬─────────┘
//!          │
//!          ├──► MetadataResolver   (lazy discovery, 60 s retry cooldown)
//!          │         │
//!          │         └──► IdTokenValidator  (HMAC secret or remote JWKS)
//!          │
//!          └──► StateStore          (pending logins in the user session)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use authgate_oidc::{MemorySession, OidcClient, OidcConfig};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = OidcConfig::new("my-client", "https://sso.example.com/realms/demo");
//!     config.client_secret = Some("the-client-secret".to_string());
//!
//!     let client = OidcClient::connect(config).await?;
//!     let mut session = MemorySession::new();
//!
//!     // Redirect the user's browser here.
//!     let callback = Url::parse("https://app.example.com/callback")?;
//!     let requested = Url::parse("https://app.example.com/reports/42")?;
//!     let login = client.login_url(&requested, &callback, &mut session, None, &[]).await?;
//!     println!("redirect to: {login}");
//!
//!     // ... the provider redirects back with ?code=...&state=... ...
//!     let response = Url::parse("https://app.example.com/callback?code=abc&state=xyz")?;
//!     let tokens = client.handle_callback(&response, &callback, &mut session).await?;
//!     println!("access token: {}", tokens.access_token);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod error;
pub mod metadata;
pub mod pkce;
pub mod resource;
pub mod session;
pub mod state;
pub mod validator;

// Re-export commonly used types
pub use client::{OidcClient, OidcTokens, REDIRECT_URI_INFO};
pub use config::OidcConfig;
pub use error::{OidcError, Result};
pub use metadata::{LoadedProvider, MetadataResolver, ProviderMetadata};
pub use resource::{FsResourceResolver, ResourceResolver};
pub use session::{MemorySession, SessionStore, StateMap, ID_TOKEN_ATTRIBUTE, STATES_ATTRIBUTE};
pub use state::{PendingLogin, StateStore};
pub use validator::{Audience, IdTokenClaims, IdTokenValidator};
