//! YouTube Videos API types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Body of a `videos.insert` call.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos/insert>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInsertRequest {
    pub snippet: VideoSnippet,
    pub status: VideoStatus,
}

/// A `video` resource represents a YouTube video.
///
/// Only the parts this crate asks for are modeled.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#resource>
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    /// The ID that YouTube uses to uniquely identify the video.
    pub id: String,
    pub snippet: Option<VideoSnippet>,
    pub status: Option<VideoStatus>,
}

/// Basic details about a video.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#snippet>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSnippet {
    /// The video's title. At most 100 characters and may not contain `<` or `>`.
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Keyword tags associated with the video.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// The YouTube video category associated with the video.
    #[serde(rename = "categoryId")]
    pub category_id: String,
}

/// Upload and visibility status of a video.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#status>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStatus {
    #[serde(rename = "privacyStatus")]
    pub privacy_status: PrivacyStatus,
}

/// Who can see a video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    /// Only the uploader.
    #[default]
    Private,
    /// Anyone with the link.
    Unlisted,
    /// Everyone.
    Public,
}

impl PrivacyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Unlisted => "unlisted",
            Self::Public => "public",
        }
    }
}

impl fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The privacy level named is not one YouTube knows about.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown privacy status {0:?}; expected private, unlisted, or public")]
pub struct UnknownPrivacyStatus(pub String);

impl FromStr for PrivacyStatus {
    type Err = UnknownPrivacyStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(Self::Private),
            "unlisted" => Ok(Self::Unlisted),
            "public" => Ok(Self::Public),
            _ => Err(UnknownPrivacyStatus(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn insert_request_wire_shape() {
        let request = VideoInsertRequest {
            snippet: VideoSnippet {
                title: "Demo".to_string(),
                description: None,
                tags: vec!["rust".to_string()],
                category_id: "22".to_string(),
            },
            status: VideoStatus {
                privacy_status: PrivacyStatus::Unlisted,
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "snippet": {"title": "Demo", "tags": ["rust"], "categoryId": "22"},
                "status": {"privacyStatus": "unlisted"}
            })
        );
    }

    #[test]
    fn insert_response_parses() {
        let video: Video = serde_json::from_str(
            r#"{
                "kind": "youtube#video",
                "etag": "xyz",
                "id": "dQw4w9WgXcQ",
                "snippet": {"title": "Demo", "categoryId": "22", "channelId": "UC"},
                "status": {"privacyStatus": "private", "uploadStatus": "uploaded"}
            }"#,
        )
        .unwrap();
        assert_eq!(video.id, "dQw4w9WgXcQ");
        assert_eq!(
            video.status.map(|s| s.privacy_status),
            Some(PrivacyStatus::Private)
        );
    }

    #[test]
    fn privacy_parsing() {
        assert_eq!("Public".parse(), Ok(PrivacyStatus::Public));
        assert_eq!(" unlisted ".parse(), Ok(PrivacyStatus::Unlisted));
        assert_eq!(PrivacyStatus::default(), PrivacyStatus::Private);
        assert!("friends".parse::<PrivacyStatus>().is_err());
    }
}
