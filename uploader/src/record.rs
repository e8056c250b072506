//! What a scheduled upload is made of.

use crate::credentials::CredentialSnapshot;
use crate::staging::StagedFile;
use crate::youtube_api::{PrivacyStatus, VideoInsertRequest, VideoSnippet, VideoStatus};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// YouTube's "People & Blogs" category.
pub const DEFAULT_CATEGORY_ID: &str = "22";

/// Identifies one queued upload for as long as the process lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(pub(crate) u64);

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The user-facing description of a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy: PrivacyStatus,
}

impl VideoMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            tags: Vec::new(),
            category_id: DEFAULT_CATEGORY_ID.to_string(),
            privacy: PrivacyStatus::default(),
        }
    }

    pub fn to_insert_request(&self) -> VideoInsertRequest {
        VideoInsertRequest {
            snippet: VideoSnippet {
                title: self.title.clone(),
                description: self.description.clone(),
                tags: self.tags.clone(),
                category_id: self.category_id.clone(),
            },
            status: VideoStatus {
                privacy_status: self.privacy,
            },
        }
    }
}

/// Splits a comma-separated tag list, dropping blanks.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Everything needed to perform an upload later, before it has been given a place in the queue.
#[derive(Debug)]
pub struct UploadJob {
    pub metadata: VideoMetadata,
    pub source: StagedFile,
    pub scheduled_at: Timestamp,
    pub credentials: CredentialSnapshot,
}

/// One queued upload.
///
/// Records are never modified once queued; in particular the scheduled time is fixed at creation.
#[derive(Debug)]
pub struct PendingUpload {
    id: UploadId,
    metadata: VideoMetadata,
    source: StagedFile,
    scheduled_at: Timestamp,
    credentials: CredentialSnapshot,
}

impl PendingUpload {
    pub(crate) fn new(id: UploadId, job: UploadJob) -> Self {
        let UploadJob {
            metadata,
            source,
            scheduled_at,
            credentials,
        } = job;
        Self {
            id,
            metadata,
            source,
            scheduled_at,
            credentials,
        }
    }

    pub fn id(&self) -> UploadId {
        self.id
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    pub fn source(&self) -> &StagedFile {
        &self.source
    }

    pub fn scheduled_at(&self) -> Timestamp {
        self.scheduled_at
    }

    pub fn credentials(&self) -> &CredentialSnapshot {
        &self.credentials
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        self.scheduled_at <= now
    }

    /// Gives up the staged file so it can be released once the upload has been attempted.
    pub(crate) fn into_source(self) -> StagedFile {
        self.source
    }

    pub(crate) fn summary(&self) -> QueuedUpload {
        QueuedUpload {
            id: self.id,
            title: self.metadata.title.clone(),
            scheduled_at: self.scheduled_at,
            status: UploadStatus::Scheduled,
        }
    }
}

/// State label shown for queued uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Scheduled,
}

/// How a queued upload is shown to callers: no file paths, no credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedUpload {
    pub id: UploadId,
    pub title: String,
    pub scheduled_at: Timestamp,
    pub status: UploadStatus,
}
