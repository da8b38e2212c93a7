//! Pending-login records and their one-time-use, TTL-bounded store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{OidcError, Result};
use crate::session::{SessionStore, StateMap};

/// Maximum age of a pending login before it is garbage-collected.
const STATE_TTL_SECONDS: i64 = 3600;

/// One in-flight login attempt, stored in the session under its state token.
///
/// Created when a login URL is issued, consumed exactly once on a successful
/// callback, or pruned once older than the TTL. Serializable so session
/// containers can externalize it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingLogin {
    /// Nonce bound to the ID token of this attempt.
    pub nonce: String,

    /// PKCE code verifier; present exactly when a challenge was sent in the
    /// login URL.
    pub pkce_verifier: Option<String>,

    /// Creation timestamp, driving TTL expiry.
    pub created_at: DateTime<Utc>,

    /// Caller-supplied metadata (e.g. the originally-requested URL).
    pub additional_infos: HashMap<String, String>,
}

/// Store of pending logins scoped to one user session.
///
/// Wraps the session exclusively for the duration of an operation; every
/// mutation saves the whole map back through the session's save contract.
pub struct StateStore<'a> {
    session: &'a mut dyn SessionStore,
}

impl<'a> StateStore<'a> {
    /// Wrap a session.
    pub fn new(session: &'a mut dyn SessionStore) -> Self {
        Self { session }
    }

    /// Insert a pending login stamped with the current time, pruning expired
    /// records on the way.
    pub fn store(
        &mut self,
        state: &str,
        nonce: &str,
        pkce_verifier: Option<String>,
        additional_infos: HashMap<String, String>,
    ) {
        let mut states = self.session.load_states().unwrap_or_default();
        prune_expired(&mut states);
        trace!(%state, "storing pending login");
        states.insert(
            state.to_string(),
            PendingLogin {
                nonce: nonce.to_string(),
                pkce_verifier,
                created_at: Utc::now(),
                additional_infos,
            },
        );
        self.session.save_states(states);
    }

    /// Remove and return the pending login for `state`.
    ///
    /// Prunes expired records first, so an attempt older than the TTL fails
    /// even if it was never consumed. Consumption is final: the record is
    /// never re-added.
    ///
    /// # Errors
    /// `AuthenticationFailed` when no live record matches.
    pub fn retrieve(&mut self, state: &str) -> Result<PendingLogin> {
        let mut states = self.session.load_states().unwrap_or_default();
        prune_expired(&mut states);
        let entry = states.remove(state);
        if entry.is_some() {
            trace!(%state, "removing pending login");
        }
        self.session.save_states(states);
        entry.ok_or_else(|| OidcError::AuthenticationFailed("could not validate state".to_string()))
    }
}

/// Read-only lookup of the additional-info map for `state`.
///
/// Returns an empty map for an unknown, consumed, or even expired-but-not-
/// yet-pruned state. Browser back-navigation replays the previous state
/// after a successful login; that must not look like an attack on this path.
pub fn additional_infos(session: &dyn SessionStore, state: &str) -> HashMap<String, String> {
    session
        .load_states()
        .and_then(|states| states.get(state).map(|entry| entry.additional_infos.clone()))
        .unwrap_or_default()
}

fn prune_expired(states: &mut StateMap) {
    let now = Utc::now();
    states.retain(|state, entry| {
        let age_seconds = now.signed_duration_since(entry.created_at).num_seconds();
        let live = age_seconds <= STATE_TTL_SECONDS;
        if !live {
            trace!(%state, age_seconds, "dropping expired pending login");
        }
        live
    });
}
