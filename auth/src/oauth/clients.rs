//! Static OAuth client registry.

use crate::config::OAuthClient;

/// Registered clients and their exact-match redirect URIs.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Vec<OAuthClient>,
}

impl ClientRegistry {
    /// Build a registry.
    #[must_use]
    pub const fn new(clients: Vec<OAuthClient>) -> Self {
        Self { clients }
    }

    /// Whether `client_id` is registered.
    #[must_use]
    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.iter().any(|c| c.client_id == client_id)
    }

    /// Whether `redirect_uri` is on `client_id`'s allow-list.
    #[must_use]
    pub fn is_allowed(&self, client_id: &str, redirect_uri: &str) -> bool {
        self.clients
            .iter()
            .any(|c| c.client_id == client_id && c.redirect_uris.iter().any(|uri| uri == redirect_uri))
    }
}
