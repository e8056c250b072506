//! The authorization state that travels with a user's session and into every queued upload.

use crate::config::OAuthClientConfig;
use jiff::{SignedDuration, Timestamp};
use oauth2::basic::BasicTokenResponse;
use oauth2::{AccessToken, ClientId, ClientSecret, RefreshToken, Scope, TokenResponse, TokenUrl};
use serde::{Deserialize, Serialize};

/// Access tokens this close to expiry are refreshed before use.
const EXPIRY_MARGIN: SignedDuration = SignedDuration::from_mins(5);

/// Everything needed to call the YouTube API on a user's behalf without sending them through the
/// authorization flow again.
///
/// A snapshot is a plain value: cloning it copies every field, and refreshing produces a new
/// snapshot rather than modifying this one. An upload queued with a snapshot therefore keeps the
/// exact credentials it was queued with, whatever later happens to the session it came from.
///
/// Secrets are redacted in the [`Debug`] output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSnapshot {
    access_token: AccessToken,
    refresh_token: Option<RefreshToken>,
    token_url: TokenUrl,
    client_id: ClientId,
    client_secret: Option<ClientSecret>,
    scopes: Vec<Scope>,
    /// When the access token stops working, if the server told us.
    #[serde(default)]
    expires_at: Option<Timestamp>,
}

impl CredentialSnapshot {
    /// Captures a freshly issued token together with the client registration that obtained it.
    ///
    /// If the server did not echo the granted scopes, the scopes that were requested are
    /// recorded instead.
    pub fn from_token_response(token: &BasicTokenResponse, client: &OAuthClientConfig) -> Self {
        Self {
            access_token: token.access_token().clone(),
            refresh_token: token.refresh_token().cloned(),
            token_url: client.token_url.clone(),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            scopes: token
                .scopes()
                .cloned()
                .unwrap_or_else(|| client.scopes.clone()),
            expires_at: expiry_from_now(token),
        }
    }

    /// Returns a new snapshot carrying the refreshed access token.
    ///
    /// Google usually omits the refresh token from refresh responses, in which case the one we
    /// already have is kept.
    pub fn refreshed(&self, token: &BasicTokenResponse) -> Self {
        let mut next = self.clone();
        next.access_token = token.access_token().clone();
        if let Some(refresh_token) = token.refresh_token() {
            next.refresh_token = Some(refresh_token.clone());
        }
        if let Some(scopes) = token.scopes() {
            next.scopes = scopes.clone();
        }
        next.expires_at = expiry_from_now(token);
        next
    }

    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }

    pub fn token_url(&self) -> &TokenUrl {
        &self.token_url
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn client_secret(&self) -> Option<&ClientSecret> {
        self.client_secret.as_ref()
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }

    /// Whether the access token should be exchanged before it is used at `now`.
    ///
    /// Without a refresh token there is nothing to exchange, so the access token is used as-is
    /// and the platform gets to decide.
    pub fn needs_refresh(&self, now: Timestamp) -> bool {
        if self.refresh_token.is_none() {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => match expires_at.checked_sub(EXPIRY_MARGIN) {
                Ok(deadline) => now >= deadline,
                Err(_) => true,
            },
            // A snapshot restored from storage without an expiry is of unknown age.
            None => true,
        }
    }
}

fn expiry_from_now(token: &BasicTokenResponse) -> Option<Timestamp> {
    let expires_in = SignedDuration::try_from(token.expires_in()?).ok()?;
    Timestamp::now().checked_add(expires_in).ok()
}
