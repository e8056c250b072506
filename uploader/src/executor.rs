//! The seams between the upload core and the video platform.

use crate::credentials::CredentialSnapshot;
use crate::record::VideoMetadata;
use crate::youtube_api::{self, YouTubeClient};
use serde::Serialize;
use std::future::Future;
use std::path::Path;

/// A video the platform has accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedVideo {
    pub video_id: String,
    pub video_url: String,
}

impl UploadedVideo {
    pub fn new(video_id: impl Into<String>) -> Self {
        let video_id = video_id.into();
        Self {
            video_url: youtube_api::watch_url(&video_id),
            video_id,
        }
    }
}

/// Performs one upload against the video platform.
///
/// Implementations make a single attempt and report what happened; retrying is not their
/// business, and neither is the file at `file`, which belongs to the caller.
pub trait UploadExecutor: Send + Sync + 'static {
    fn execute(
        &self,
        credentials: &CredentialSnapshot,
        metadata: &VideoMetadata,
        file: &Path,
    ) -> impl Future<Output = eyre::Result<UploadedVideo>> + Send;
}

/// Tells whether an account has somewhere to publish to.
pub trait ChannelCheck: Send + Sync {
    fn has_channel(
        &self,
        credentials: &CredentialSnapshot,
    ) -> impl Future<Output = eyre::Result<bool>> + Send;
}

/// A [`ChannelCheck`] that lets every account through.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipChannelCheck;

impl ChannelCheck for SkipChannelCheck {
    async fn has_channel(&self, _credentials: &CredentialSnapshot) -> eyre::Result<bool> {
        Ok(true)
    }
}

/// YouTube, reached through the Data API.
///
/// Every call builds a client from the snapshot it is given, so token refreshes made while
/// uploading one video never leak into any other snapshot.
#[derive(Debug, Clone)]
pub struct YouTubePlatform {
    http: reqwest::Client,
}

impl YouTubePlatform {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn client(&self, credentials: &CredentialSnapshot) -> YouTubeClient {
        YouTubeClient::new(credentials.clone(), self.http.clone())
    }
}

impl UploadExecutor for YouTubePlatform {
    async fn execute(
        &self,
        credentials: &CredentialSnapshot,
        metadata: &VideoMetadata,
        file: &Path,
    ) -> eyre::Result<UploadedVideo> {
        let video = self
            .client(credentials)
            .insert_video(&metadata.to_insert_request(), file)
            .await?;
        Ok(UploadedVideo::new(video.id))
    }
}

impl ChannelCheck for YouTubePlatform {
    async fn has_channel(&self, credentials: &CredentialSnapshot) -> eyre::Result<bool> {
        self.client(credentials).has_channel().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn playback_url() {
        assert_eq!(
            UploadedVideo::new("abc123").video_url,
            "https://youtube.com/watch?v=abc123"
        );
    }

    /// One recorded call to [`RecordingExecutor`].
    #[derive(Debug, Clone)]
    pub(crate) struct ExecutedUpload {
        pub(crate) title: String,
        pub(crate) access_token: String,
        pub(crate) file: std::path::PathBuf,
        pub(crate) file_existed: bool,
    }

    /// An executor that remembers what it was asked to do instead of uploading anything.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingExecutor {
        pub(crate) calls: Mutex<Vec<ExecutedUpload>>,
        /// Titles whose upload should fail.
        pub(crate) fail_titles: Vec<String>,
        /// Titles whose upload should panic.
        pub(crate) panic_titles: Vec<String>,
        /// How long each upload takes.
        pub(crate) delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RecordingExecutor {
        pub(crate) fn failing_for(titles: &[&str]) -> Self {
            Self {
                fail_titles: titles.iter().map(|t| t.to_string()).collect(),
                ..Self::default()
            }
        }

        pub(crate) fn panicking_for(titles: &[&str]) -> Self {
            Self {
                panic_titles: titles.iter().map(|t| t.to_string()).collect(),
                ..Self::default()
            }
        }

        pub(crate) fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        pub(crate) fn calls(&self) -> Vec<ExecutedUpload> {
            self.calls.lock().unwrap().clone()
        }

        /// The most uploads that were ever running at the same time.
        pub(crate) fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        /// Waits until at least `n` uploads have been attempted.
        pub(crate) async fn wait_for_calls(&self, n: usize) {
            tokio::time::timeout(Duration::from_secs(5), async {
                while self.calls.lock().unwrap().len() < n {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("executor was not called in time");
        }
    }

    impl UploadExecutor for RecordingExecutor {
        async fn execute(
            &self,
            credentials: &CredentialSnapshot,
            metadata: &VideoMetadata,
            file: &Path,
        ) -> eyre::Result<UploadedVideo> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);

            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(ExecutedUpload {
                    title: metadata.title.clone(),
                    access_token: credentials.access_token().secret().clone(),
                    file: file.to_path_buf(),
                    file_existed: file.exists(),
                });
                calls.len()
            };
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panic_titles.contains(&metadata.title) {
                panic!("upload of {:?} blew up", metadata.title);
            }
            if self.fail_titles.contains(&metadata.title) {
                eyre::bail!("quota exceeded");
            }
            Ok(UploadedVideo::new(format!("vid{n}")))
        }
    }
}
