//! Runtime configuration: the OAuth client registration plus a handful of environment knobs.

use eyre::{Context, OptionExt};
use jiff::tz::TimeZone;
use oauth2::{AuthUrl, ClientId, ClientSecret, RedirectUrl, Scope, TokenUrl};
use serde::Deserialize;
use std::time::Duration;

/// Uploads need `youtube.upload`; channel listing needs `youtube`.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube",
];

const DEFAULT_CLIENT_SECRETS_FILE: &str = "client_secret.json";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:5000/callback";
const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// How often the dispatcher checks for due uploads unless configured otherwise.
pub const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_secs(60);

/// The OAuth client registration used to authorize users and refresh their tokens.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: ClientId,
    pub client_secret: Option<ClientSecret>,
    pub auth_url: AuthUrl,
    pub token_url: TokenUrl,
    pub redirect_url: RedirectUrl,
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub oauth: OAuthClientConfig,
    /// Whether the dispatcher runs. Without it, scheduled submissions are refused.
    pub scheduling_enabled: bool,
    pub dispatch_interval: Duration,
    /// Zone used for schedule times written without a UTC offset.
    pub time_zone: TimeZone,
}

/// The JSON file Google hands out when a client is registered.
///
/// Web clients nest their fields under `web`, desktop clients under `installed`.
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    web: Option<ClientSecrets>,
    installed: Option<ClientSecrets>,
}

#[derive(Debug, Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: Option<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl UploaderConfig {
    /// Builds the configuration from the process environment.
    pub fn from_env() -> eyre::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(env: impl Fn(&str) -> Option<String>) -> eyre::Result<Self> {
        let secrets_file = env("CLIENT_SECRETS_FILE")
            .unwrap_or_else(|| DEFAULT_CLIENT_SECRETS_FILE.to_string());
        let raw = std::fs::read_to_string(&secrets_file)
            .with_context(|| format!("read OAuth client secrets from {secrets_file}"))?;
        let mut oauth = parse_client_secrets(&raw)
            .with_context(|| format!("parse OAuth client secrets in {secrets_file}"))?;

        if let Some(redirect) = env("REDIRECT_URI") {
            oauth.redirect_url = RedirectUrl::new(redirect).context("parse REDIRECT_URI")?;
        }

        let scheduling_enabled = match env("UPLOAD_SCHEDULING").as_deref() {
            None => true,
            Some(v) => parse_switch(v)
                .ok_or_else(|| eyre::eyre!("UPLOAD_SCHEDULING must be on or off, got {v:?}"))?,
        };

        let dispatch_interval = match env("UPLOAD_DISPATCH_INTERVAL_SECS") {
            None => DEFAULT_DISPATCH_INTERVAL,
            Some(v) => {
                let secs: u64 = v
                    .parse()
                    .with_context(|| format!("parse UPLOAD_DISPATCH_INTERVAL_SECS {v:?}"))?;
                if secs == 0 {
                    eyre::bail!("UPLOAD_DISPATCH_INTERVAL_SECS must be positive");
                }
                Duration::from_secs(secs)
            }
        };

        let time_zone = match env("UPLOAD_TIME_ZONE") {
            None => TimeZone::system(),
            Some(name) => {
                TimeZone::get(&name).with_context(|| format!("look up time zone {name:?}"))?
            }
        };

        Ok(Self {
            oauth,
            scheduling_enabled,
            dispatch_interval,
            time_zone,
        })
    }
}

fn parse_switch(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Some(true),
        "off" | "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_client_secrets(raw: &str) -> eyre::Result<OAuthClientConfig> {
    let file: ClientSecretsFile = serde_json::from_str(raw).context("decode JSON")?;
    let secrets = file
        .web
        .or(file.installed)
        .ok_or_eyre("neither a `web` nor an `installed` client is defined")?;

    let redirect = secrets
        .redirect_uris
        .into_iter()
        .next()
        .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

    Ok(OAuthClientConfig {
        client_id: ClientId::new(secrets.client_id),
        client_secret: secrets.client_secret.map(ClientSecret::new),
        auth_url: AuthUrl::new(
            secrets
                .auth_uri
                .unwrap_or_else(|| DEFAULT_AUTH_URI.to_string()),
        )
        .context("parse auth_uri")?,
        token_url: TokenUrl::new(
            secrets
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
        )
        .context("parse token_uri")?,
        redirect_url: RedirectUrl::new(redirect).context("parse redirect uri")?,
        scopes: SCOPES.iter().map(|s| Scope::new(s.to_string())).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    const WEB_SECRETS: &str = r#"{
        "web": {
            "client_id": "abc.apps.googleusercontent.com",
            "client_secret": "shh",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "redirect_uris": ["https://uploader.example.com/callback"]
        }
    }"#;

    fn lookup(vars: HashMap<&'static str, String>) -> impl Fn(&str) -> Option<String> {
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn parses_web_client() {
        let oauth = parse_client_secrets(WEB_SECRETS).unwrap();
        assert_eq!(oauth.client_id.as_str(), "abc.apps.googleusercontent.com");
        assert_eq!(
            oauth.client_secret.as_ref().map(|s| s.secret().as_str()),
            Some("shh")
        );
        assert_eq!(
            oauth.redirect_url.as_str(),
            "https://uploader.example.com/callback"
        );
        assert_eq!(oauth.scopes.len(), 2);
    }

    #[test]
    fn installed_client_falls_back_to_defaults() {
        let oauth = parse_client_secrets(r#"{"installed": {"client_id": "desk"}}"#).unwrap();
        assert_eq!(oauth.client_id.as_str(), "desk");
        assert!(oauth.client_secret.is_none());
        assert_eq!(oauth.token_url.as_str(), DEFAULT_TOKEN_URI);
        assert_eq!(oauth.redirect_url.as_str(), DEFAULT_REDIRECT_URI);
    }

    #[test]
    fn rejects_unknown_client_kind() {
        assert!(parse_client_secrets(r#"{"other": {}}"#).is_err());
    }

    #[test]
    fn environment_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(WEB_SECRETS.as_bytes()).unwrap();

        let config = UploaderConfig::from_lookup(lookup(HashMap::from([
            (
                "CLIENT_SECRETS_FILE",
                file.path().to_string_lossy().into_owned(),
            ),
            ("REDIRECT_URI", "http://127.0.0.1:8080/cb".to_string()),
            ("UPLOAD_SCHEDULING", "off".to_string()),
            ("UPLOAD_DISPATCH_INTERVAL_SECS", "5".to_string()),
            ("UPLOAD_TIME_ZONE", "UTC".to_string()),
        ])))
        .unwrap();

        assert_eq!(config.oauth.redirect_url.as_str(), "http://127.0.0.1:8080/cb");
        assert!(!config.scheduling_enabled);
        assert_eq!(config.dispatch_interval, Duration::from_secs(5));
        assert_eq!(
            config.time_zone.to_offset(jiff::Timestamp::UNIX_EPOCH),
            jiff::tz::Offset::UTC
        );
    }

    #[test]
    fn defaults_without_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(WEB_SECRETS.as_bytes()).unwrap();

        let config = UploaderConfig::from_lookup(lookup(HashMap::from([(
            "CLIENT_SECRETS_FILE",
            file.path().to_string_lossy().into_owned(),
        )])))
        .unwrap();
        assert!(config.scheduling_enabled);
        assert_eq!(config.dispatch_interval, DEFAULT_DISPATCH_INTERVAL);
    }

    #[test]
    fn bad_switch_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(WEB_SECRETS.as_bytes()).unwrap();

        let result = UploaderConfig::from_lookup(lookup(HashMap::from([
            (
                "CLIENT_SECRETS_FILE",
                file.path().to_string_lossy().into_owned(),
            ),
            ("UPLOAD_SCHEDULING", "sometimes".to_string()),
        ])));
        assert!(result.is_err());
    }
}
