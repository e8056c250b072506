//! OAuth 2.0 management for YouTube API authentication.
//!
//! This module encapsulates the authorization-code flow used to obtain a [`CredentialSnapshot`]
//! for a user, the refresh of such snapshots when their access token runs out, and an
//! interactive variant of the flow for terminal use that receives the callback on a loopback
//! port.

use crate::config::OAuthClientConfig;
use crate::credentials::CredentialSnapshot;
use crate::error::UploadError;
use eyre::Context;
use http::StatusCode;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, body};
use oauth2::basic::BasicClient;
use oauth2::url::Url;
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Bounds every request from start to finished response. Video uploads set their own, longer,
/// deadline per request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Builds the HTTP client shared by token exchanges and API calls.
pub fn http_client() -> eyre::Result<reqwest::Client> {
    http_client_with_timeouts(CONNECT_TIMEOUT, REQUEST_TIMEOUT)
}

fn http_client_with_timeouts(
    connect: Duration,
    request: Duration,
) -> eyre::Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        // SSRF no thank you.
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(connect)
        .timeout(request)
        .build()
        .context("build HTTP client")
}

/// An authorization that has been started but not yet completed.
///
/// Holds the anti-forgery `state` we sent along with the user and the PKCE verifier that must
/// accompany the code exchange. It is consumed by [`OAuthManager::complete_authorization`], so
/// each one can be completed at most once.
#[derive(Debug)]
pub struct PendingAuthorization {
    csrf: CsrfToken,
    pkce_verifier: PkceCodeVerifier,
    redirect_url: RedirectUrl,
}

impl PendingAuthorization {
    /// The anti-forgery token the callback must echo back.
    pub fn state(&self) -> &str {
        self.csrf.secret()
    }
}

/// Manages OAuth 2.0 authentication flows for YouTube API access.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    config: Arc<OAuthClientConfig>,
    http: reqwest::Client,
    oauth_done_html: &'static str,
}

impl OAuthManager {
    /// Creates a new OAuth manager for the given client registration.
    ///
    /// `oauth_done_html` is what the user's browser shows once the interactive flow has received
    /// its callback.
    pub fn new(
        config: OAuthClientConfig,
        http: reqwest::Client,
        oauth_done_html: &'static str,
    ) -> Self {
        Self {
            config: Arc::new(config),
            http,
            oauth_done_html,
        }
    }

    pub fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    /// Starts an authorization against the configured redirect URL.
    ///
    /// Returns the URL to send the user to, and the state that
    /// [`Self::complete_authorization`] needs once they come back.
    pub fn begin_authorization(&self) -> (Url, PendingAuthorization) {
        self.begin_with_redirect(self.config.redirect_url.clone())
    }

    fn begin_with_redirect(&self, redirect_url: RedirectUrl) -> (Url, PendingAuthorization) {
        let client = BasicClient::new(self.config.client_id.clone())
            .set_auth_uri(self.config.auth_url.clone())
            .set_redirect_uri(redirect_url.clone());

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.config.scopes.iter().cloned())
            // offline access is what gets us a refresh token, and with it the ability to upload
            // long after the user has left.
            .add_extra_param("access_type", "offline")
            .add_extra_param("include_granted_scopes", "true")
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::debug!("started authorization");
        (
            auth_url,
            PendingAuthorization {
                csrf,
                pkce_verifier,
                redirect_url,
            },
        )
    }

    /// Finishes an authorization given the query string the provider redirected the user back
    /// with.
    ///
    /// The `state` parameter is checked before the code is ever sent anywhere.
    pub async fn complete_authorization(
        &self,
        pending: PendingAuthorization,
        callback_query: &str,
    ) -> Result<CredentialSnapshot, UploadError> {
        let callback = CallbackParams::parse(callback_query);

        if callback.state.as_deref() != Some(pending.state()) {
            tracing::warn!("authorization callback carried the wrong state");
            return Err(UploadError::InvalidAuthorizationState);
        }
        if let Some(error) = callback.error {
            return Err(UploadError::AuthorizationExchange(eyre::eyre!(
                "authorization server returned {error}"
            )));
        }
        let Some(code) = callback.code else {
            return Err(UploadError::AuthorizationExchange(eyre::eyre!(
                "no authorization code found"
            )));
        };

        let mut client = BasicClient::new(self.config.client_id.clone())
            .set_token_uri(self.config.token_url.clone())
            .set_redirect_uri(pending.redirect_url);
        if let Some(secret) = &self.config.client_secret {
            client = client.set_client_secret(secret.clone());
        }

        let token = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pending.pkce_verifier)
            .request_async(&self.http)
            .await
            .context("exchange authorization code with access token")
            .map_err(UploadError::AuthorizationExchange)?;

        tracing::info!("authorization completed");
        Ok(CredentialSnapshot::from_token_response(
            &token,
            &self.config,
        ))
    }

    /// Exchanges the snapshot's refresh token for a new snapshot. `Ok(None)` means the user has
    /// to authorize again.
    pub async fn refresh(
        &self,
        snapshot: &CredentialSnapshot,
    ) -> eyre::Result<Option<CredentialSnapshot>> {
        refresh_snapshot(&self.http, snapshot).await
    }

    /// Performs a complete authorization flow from the terminal.
    ///
    /// This opens the user's browser at the provider and listens on a random loopback port for
    /// the redirect, so the configured redirect URL is not used.
    pub async fn authenticate_interactive(&self) -> eyre::Result<CredentialSnapshot> {
        let (redirect_url, eventually_callback) = self
            .setup_redirect()
            .await
            .context("set up redirect endpoint")?;

        let (auth_url, pending) = self.begin_with_redirect(redirect_url);

        tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
        webbrowser::open(auth_url.as_ref()).context("open user's browser")?;
        let callback_query = eventually_callback
            .await
            .context("await authorization callback")?;

        Ok(self
            .complete_authorization(pending, &callback_query)
            .await?)
    }

    /// Sets up a local HTTP server to receive the OAuth authorization callback.
    ///
    /// Returns the redirect URL to use in the flow, and a future that resolves to the callback's
    /// query string once a request carrying a `state` arrives.
    async fn setup_redirect(
        &self,
    ) -> eyre::Result<(RedirectUrl, impl Future<Output = eyre::Result<String>>)> {
        let socket = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind to localhost")?;
        let addr = socket.local_addr().context("get local address")?;
        let url = RedirectUrl::new(format!("http://{}:{}", addr.ip(), addr.port()))
            .context("construct redirect url")?;
        let (tx, rx) = tokio::sync::oneshot::channel();
        let oauth_done = self.oauth_done_html;
        tokio::spawn(async move {
            let r = async move {
                let (conn, _) = socket.accept().await.context("accept")?;
                let conn = hyper_util::rt::TokioIo::new(conn);
                let (got, mut gotten) = tokio::sync::mpsc::channel(1);
                let service = service_fn(move |req: Request<body::Incoming>| {
                    let got = got.clone();
                    async move {
                        if req.uri().path() == "/favicon.ico" {
                            return Ok::<_, std::convert::Infallible>(respond(
                                StatusCode::NO_CONTENT,
                                "",
                            ));
                        }
                        let query = req.uri().query().unwrap_or("").to_string();
                        if CallbackParams::parse(&query).state.is_none() {
                            return Ok(respond(StatusCode::BAD_REQUEST, "missing state"));
                        }
                        // a closed channel means we already have our callback
                        let _ = got.send(query).await;
                        Ok(respond(StatusCode::OK, oauth_done))
                    }
                });
                let mut serve = std::pin::pin!(
                    hyper::server::conn::http1::Builder::new().serve_connection(conn, service)
                );

                tokio::select! {
                    exit = &mut serve => {
                        if let Err(e) = exit {
                            Err(e).context("redirect server got bad request")
                        } else {
                            eyre::bail!("redirect server exit prematurely");
                        }
                    }
                    query = gotten.recv() => {
                        serve.as_mut().graceful_shutdown();
                        query.ok_or_else(|| eyre::eyre!("redirect server dropped the callback"))
                    }
                }
            };
            let _ = tx.send(r.await);
        });
        Ok((url, async move {
            rx.await.context("redirect future dropped prematurely")?
        }))
    }
}

fn respond(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

/// Exchanges the snapshot's refresh token for a new access token.
///
/// Everything needed is carried by the snapshot itself, so this works for queued uploads long
/// after the session that produced them is gone.
///
/// # Returns
///
/// * `Ok(Some(snapshot))` - Refresh succeeded; the new snapshot carries the new access token
/// * `Ok(None)` - No refresh token, or the provider considers it revoked
/// * `Err(_)` - Network or other error occurred during the refresh attempt
pub(crate) async fn refresh_snapshot(
    http: &reqwest::Client,
    snapshot: &CredentialSnapshot,
) -> eyre::Result<Option<CredentialSnapshot>> {
    let Some(refresh_token) = snapshot.refresh_token() else {
        tracing::warn!("no refresh token available, cannot refresh");
        return Ok(None);
    };

    tracing::debug!("attempting to refresh OAuth token");

    let mut client =
        BasicClient::new(snapshot.client_id().clone()).set_token_uri(snapshot.token_url().clone());
    if let Some(secret) = snapshot.client_secret() {
        client = client.set_client_secret(secret.clone());
    }

    match client
        .exchange_refresh_token(refresh_token)
        .request_async(http)
        .await
    {
        Ok(new_token) => {
            tracing::debug!("successfully refreshed OAuth token");
            Ok(Some(snapshot.refreshed(&new_token)))
        }
        Err(ref e @ oauth2::RequestTokenError::ServerResponse(ref sr))
            if matches!(
                sr.error(),
                oauth2::basic::BasicErrorResponseType::InvalidGrant
            ) =>
        {
            tracing::warn!("OAuth refresh token considered invalid grant: {}", e);
            Ok(None)
        }
        Err(e) => Err(e).context("exchange refresh token"),
    }
}

/// The parameters the authorization server appends to the redirect.
#[derive(Debug, Default, PartialEq, Eq)]
struct CallbackParams {
    state: Option<String>,
    code: Option<String>,
    error: Option<String>,
}

impl CallbackParams {
    fn parse(query: &str) -> Self {
        let mut params = Self::default();
        for (k, v) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match &*k {
                "state" => params.state = Some(v.into_owned()),
                "code" => params.code = Some(v.into_owned()),
                "error" => params.error = Some(v.into_owned()),
                _ => {}
            }
        }
        params
    }
}
