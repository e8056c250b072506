//! Per-user authorization state: the login, callback, and logout steps.

use crate::credentials::CredentialSnapshot;
use crate::error::UploadError;
use crate::executor::ChannelCheck;
use crate::oauth::{OAuthManager, PendingAuthorization};
use oauth2::url::Url;

/// What the service knows about one user between requests.
///
/// A session starts out anonymous, holds a [`PendingAuthorization`] while the user is away at the
/// provider, and holds a [`CredentialSnapshot`] once they are back.
#[derive(Debug, Default)]
pub struct Session {
    pending: Option<PendingAuthorization>,
    credentials: Option<CredentialSnapshot>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session that is already signed in, e.g. with credentials restored from disk.
    pub fn with_credentials(credentials: CredentialSnapshot) -> Self {
        Self {
            pending: None,
            credentials: Some(credentials),
        }
    }

    pub fn credentials(&self) -> Result<&CredentialSnapshot, UploadError> {
        self.credentials
            .as_ref()
            .ok_or(UploadError::AuthenticationRequired)
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    /// Starts a fresh authorization and returns where to send the user.
    ///
    /// Any authorization already in progress is abandoned.
    pub fn login(&mut self, oauth: &OAuthManager) -> Url {
        let (url, pending) = oauth.begin_authorization();
        self.pending = Some(pending);
        url
    }

    /// Completes the authorization started by [`Session::login`] with the query string of the
    /// provider's redirect.
    ///
    /// The pending state is used up whatever the outcome, so a callback can't be replayed.
    pub async fn callback(
        &mut self,
        oauth: &OAuthManager,
        channels: &impl ChannelCheck,
        callback_query: &str,
    ) -> Result<(), UploadError> {
        let Some(pending) = self.pending.take() else {
            tracing::warn!("authorization callback without a login in progress");
            return Err(UploadError::InvalidAuthorizationState);
        };
        let credentials = oauth
            .complete_authorization(pending, callback_query)
            .await?;
        self.sign_in(credentials, channels).await
    }

    /// Stores `credentials` once the account is known to have a channel.
    ///
    /// Only a definite "no channel" keeps the user out. If the check itself fails the user is let
    /// in, and the upload will report the problem if there is one.
    pub async fn sign_in(
        &mut self,
        credentials: CredentialSnapshot,
        channels: &impl ChannelCheck,
    ) -> Result<(), UploadError> {
        match channels.has_channel(&credentials).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("authorized account has no YouTube channel");
                return Err(UploadError::ChannelNotFound);
            }
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "could not check for a YouTube channel");
            }
        }
        self.credentials = Some(credentials);
        Ok(())
    }

    /// Swaps in newer credentials, e.g. after a token refresh.
    ///
    /// Uploads that were queued with the old credentials keep using those.
    pub fn replace_credentials(&mut self, credentials: CredentialSnapshot) {
        self.credentials = Some(credentials);
    }

    /// Forgets everything, including an authorization in progress.
    pub fn logout(&mut self) {
        self.pending = None;
        self.credentials = None;
    }
}
