//! YouTube Data API v3 client library.
//!
//! Only the slice of the API that publishing needs is covered: checking that an account owns a
//! channel, and inserting videos through the resumable upload protocol.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use youtube_scheduled_upload::credentials::CredentialSnapshot;
//! use youtube_scheduled_upload::youtube_api::{YouTubeClient, VideoInsertRequest};
//!
//! # async fn example(snapshot: CredentialSnapshot, body: VideoInsertRequest) -> eyre::Result<()> {
//! let http = youtube_scheduled_upload::oauth::http_client()?;
//! let client = YouTubeClient::new(snapshot, http);
//!
//! if client.has_channel().await? {
//!     let video = client.insert_video(&body, std::path::Path::new("clip.mp4")).await?;
//!     println!("uploaded {}", video.id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod channels;
pub mod client;
pub mod videos;

pub use client::YouTubeClient;

pub use channels::{Channel, ChannelListResponse, PageInfo};

pub use videos::{
    PrivacyStatus, UnknownPrivacyStatus, Video, VideoInsertRequest, VideoSnippet, VideoStatus,
};

/// The public watch page of a video.
pub fn watch_url(video_id: &str) -> String {
    format!("https://youtube.com/watch?v={video_id}")
}
