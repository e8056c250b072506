//! Core YouTube API client functionality and authentication management.

use crate::credentials::CredentialSnapshot;
use crate::oauth::refresh_snapshot;
use crate::youtube_api::channels::ChannelListResponse;
use crate::youtube_api::videos::{Video, VideoInsertRequest};
use bytes::{Bytes, BytesMut};
use eyre::{Context, OptionExt};
use http::Method;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use jiff::Timestamp;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tokio_stream::Stream;
use tracing::instrument;

const CHANNELS_URL: &str = "https://www.googleapis.com/youtube/v3/channels";
const VIDEO_UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";

/// Size of each read when streaming a video file to YouTube.
const UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Slowest sustained upload speed, in bytes per second, that is still worth waiting for.
const MIN_UPLOAD_RATE: u64 = 64 * 1024;
/// Added to every upload deadline to cover YouTube's processing before it answers.
const UPLOAD_GRACE: Duration = Duration::from_secs(10 * 60);

/// Client for interacting with the YouTube Data API v3 on behalf of one user.
///
/// The client owns its own copy of the user's [`CredentialSnapshot`] and replaces that copy when
/// the access token has to be refreshed. Whoever handed over the snapshot keeps theirs unchanged.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    /// The current credentials, swapped out wholesale on refresh.
    credentials: Arc<Mutex<CredentialSnapshot>>,
    /// HTTP client for API requests
    client: reqwest::Client,
}

impl YouTubeClient {
    /// Creates a client from a credential snapshot, without re-running any authorization.
    pub fn new(credentials: CredentialSnapshot, client: reqwest::Client) -> Self {
        Self {
            credentials: Arc::new(Mutex::new(credentials)),
            client,
        }
    }

    /// Returns a copy of the credentials this client currently uses.
    pub async fn credentials(&self) -> CredentialSnapshot {
        self.credentials.lock().await.clone()
    }

    /// Gets an access token that is not about to expire, refreshing it if necessary.
    #[instrument(skip(self))]
    pub(crate) async fn fresh_access_token(&self) -> eyre::Result<String> {
        let mut credentials = self.credentials.lock().await;

        if credentials.needs_refresh(Timestamp::now()) {
            tracing::debug!("access token expired, attempting refresh");
            match refresh_snapshot(&self.client, &credentials).await? {
                Some(refreshed) => {
                    *credentials = refreshed;
                    tracing::debug!("access token successfully refreshed");
                }
                None => {
                    tracing::error!("access token refresh failed, client is unusable");
                    eyre::bail!("Unable to refresh expired access token");
                }
            }
        }

        Ok(credentials.access_token().secret().to_string())
    }

    /// Starts an authenticated request to the YouTube API.
    async fn authenticated(&self, method: Method, url: &str) -> eyre::Result<reqwest::RequestBuilder> {
        let access_token = self.fresh_access_token().await?;
        Ok(self.client.request(method, url).bearer_auth(access_token))
    }

    /// Sends a request and turns any non-success status into an error carrying the response
    /// body, which is where YouTube explains what went wrong.
    #[instrument(skip(request), level = tracing::Level::TRACE)]
    async fn send_checked(
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> eyre::Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .with_context(|| format!("send {what} request to YouTube API"))?;

        let status_code = response.status();
        if !status_code.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(eyre::eyre!(
                "YouTube API {} request failed with status {}: {}",
                what,
                status_code,
                error_text
            ));
        }

        Ok(response)
    }

    /// Reports whether the authenticated account owns at least one channel.
    ///
    /// Uploads from an account without a channel are rejected by YouTube, so this is checked
    /// right after authorization.
    ///
    /// # Required Scopes
    ///
    /// * `https://www.googleapis.com/auth/youtube`
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/channels/list>
    #[instrument(skip(self), ret)]
    pub async fn has_channel(&self) -> eyre::Result<bool> {
        let request = self
            .authenticated(Method::GET, CHANNELS_URL)
            .await?
            .query(&[("part", "id"), ("mine", "true"), ("maxResults", "1")]);

        let channels: ChannelListResponse = Self::send_checked(request, "channels.list")
            .await?
            .json()
            .await
            .context("parse YouTube channels API response as JSON")?;

        tracing::debug!(
            total_results = channels.page_info.total_results,
            "fetched channels"
        );

        Ok(!channels.items.is_empty())
    }

    /// Uploads a video file along with its metadata.
    ///
    /// Uses the resumable upload protocol: the metadata is posted first, YouTube answers with a
    /// session URI in the `Location` header, and the file body is then streamed to that URI
    /// without ever being held in memory in full.
    ///
    /// # Required Scopes
    ///
    /// * `https://www.googleapis.com/auth/youtube.upload`
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/guides/using_resumable_upload_protocol>
    #[instrument(skip(self, metadata), fields(title = %metadata.snippet.title))]
    pub async fn insert_video(
        &self,
        metadata: &VideoInsertRequest,
        file: &Path,
    ) -> eyre::Result<Video> {
        let size = tokio::fs::metadata(file)
            .await
            .with_context(|| format!("stat video file {}", file.display()))?
            .len();
        let content_type = content_type_for(file);

        let request = self
            .authenticated(Method::POST, VIDEO_UPLOAD_URL)
            .await?
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header("X-Upload-Content-Length", size)
            .header("X-Upload-Content-Type", content_type)
            .json(metadata);
        let response = Self::send_checked(request, "videos.insert").await?;

        let session_uri = response
            .headers()
            .get(LOCATION)
            .ok_or_eyre("YouTube did not return an upload session URI")?
            .to_str()
            .context("upload session URI is not valid UTF-8")?
            .to_string();
        tracing::debug!(size, content_type, "opened resumable upload session");

        let body = tokio::fs::File::open(file)
            .await
            .with_context(|| format!("open video file {}", file.display()))?;
        let request = self
            .client
            .put(&session_uri)
            .header(CONTENT_LENGTH, size)
            .header(CONTENT_TYPE, content_type)
            // the client-wide timeout is sized for API calls, not for gigabytes of video
            .timeout(upload_deadline(size))
            .body(reqwest::Body::wrap_stream(file_chunks(body)));

        let video: Video = Self::send_checked(request, "video upload")
            .await?
            .json()
            .await
            .context("parse YouTube upload response as JSON")?;

        tracing::info!(video_id = %video.id, "video uploaded");
        Ok(video)
    }
}

/// How long a `size`-byte upload may take before it is considered stalled.
fn upload_deadline(size: u64) -> Duration {
    UPLOAD_GRACE + Duration::from_secs(size / MIN_UPLOAD_RATE)
}

fn file_chunks(mut file: tokio::fs::File) -> impl Stream<Item = std::io::Result<Bytes>> + Send {
    async_stream::try_stream! {
        loop {
            let mut buf = BytesMut::with_capacity(UPLOAD_CHUNK_SIZE);
            let n = file.read_buf(&mut buf).await?;
            if n == 0 {
                break;
            }
            yield buf.freeze();
        }
    }
}

/// Picks the MIME type YouTube is told to expect from the file extension.
fn content_type_for(file: &Path) -> &'static str {
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("mp4" | "m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("mpg" | "mpeg") => "video/mpeg",
        Some("wmv") => "video/x-ms-wmv",
        Some("flv") => "video/x-flv",
        Some("3gp") => "video/3gpp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[test]
    fn content_types() {
        assert_eq!(content_type_for(Path::new("clip.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("/tmp/x/CLIP.MOV")), "video/quicktime");
        assert_eq!(content_type_for(Path::new("clip")), "application/octet-stream");
    }

    #[test]
    fn upload_deadline_grows_with_size() {
        assert_eq!(upload_deadline(0), UPLOAD_GRACE);
        assert_eq!(
            upload_deadline(64 * 1024 * 1024),
            UPLOAD_GRACE + Duration::from_secs(1024)
        );
        // the largest accepted video still gets a finite deadline
        let largest = upload_deadline(crate::staging::MAX_UPLOAD_BYTES);
        assert_eq!(largest, UPLOAD_GRACE + Duration::from_secs(2 * 1024 * 1024));
    }

    #[tokio::test]
    async fn file_is_streamed_whole() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(100_000).collect();
        std::io::Write::write_all(&mut file, &data).unwrap();

        let body = tokio::fs::File::open(file.path()).await.unwrap();
        let mut chunks = std::pin::pin!(file_chunks(body));
        let mut streamed = Vec::new();
        while let Some(chunk) = chunks.next().await {
            streamed.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(streamed, data);
    }
}
