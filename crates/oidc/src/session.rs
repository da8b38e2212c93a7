//! Session abstraction for authentication state.
//!
//! The engine never owns an HTTP session; it reads and writes two attributes
//! of whatever session container the embedding application uses. The
//! contract is deliberately save-explicit: clustered session containers
//! detect replication by attribute assignment, not by in-place mutation of
//! an already-stored object, so every change to the state map must flow back
//! through [`SessionStore::save_states`].

use std::collections::HashMap;

use crate::state::PendingLogin;

/// Recommended session attribute name for the pending-login map, for
/// implementations bridging to a keyed session container.
pub const STATES_ATTRIBUTE: &str = "states";

/// Recommended session attribute name for the last-issued ID-token string.
pub const ID_TOKEN_ATTRIBUTE: &str = "OIDC_ID_TOKEN";

/// Map of pending logins, keyed by state token.
pub type StateMap = HashMap<String, PendingLogin>;

/// Trait for the two session attributes the engine relies on.
///
/// Implementations wrap one user's session. Mutual exclusion for a single
/// session is enforced by the `&mut` receiver; different sessions never
/// contend.
pub trait SessionStore: Send {
    /// Load the pending-login map, or `None` when no login was started yet.
    fn load_states(&self) -> Option<StateMap>;

    /// Persist the pending-login map, replacing the stored attribute.
    fn save_states(&mut self, states: StateMap);

    /// Load the ID-token string kept from the last successful login.
    fn load_id_token(&self) -> Option<String>;

    /// Persist the raw ID-token string for later logout use.
    fn save_id_token(&mut self, id_token: String);
}

/// In-memory session, for tests and embedding contexts without an external
/// session container.
#[derive(Debug, Default)]
pub struct MemorySession {
    states: Option<StateMap>,
    id_token: Option<String>,
}

impl MemorySession {
    /// Create an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySession {
    fn load_states(&self) -> Option<StateMap> {
        self.states.clone()
    }

    fn save_states(&mut self, states: StateMap) {
        self.states = Some(states);
    }

    fn load_id_token(&self) -> Option<String> {
        self.id_token.clone()
    }

    fn save_id_token(&mut self, id_token: String) {
        self.id_token = Some(id_token);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn fresh_session_has_no_attributes() {
        let session = MemorySession::new();
        assert!(session.load_states().is_none());
        assert!(session.load_id_token().is_none());
    }

    #[test]
    fn saved_attributes_round_trip() {
        let mut session = MemorySession::new();

        let mut states = StateMap::new();
        states.insert(
            "abc".to_string(),
            PendingLogin {
                nonce: "nonce".to_string(),
                pkce_verifier: None,
                created_at: Utc::now(),
                additional_infos: HashMap::new(),
            },
        );
        session.save_states(states);
        session.save_id_token("header.payload.sig".to_string());

        let loaded = session.load_states().expect("states");
        assert!(loaded.contains_key("abc"));
        assert_eq!(session.load_id_token().as_deref(), Some("header.payload.sig"));
    }
}
