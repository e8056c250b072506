//! Accepting uploads from callers: validate, stage, then upload now or queue for later.

use crate::config::UploaderConfig;
use crate::dispatcher::{Dispatcher, DispatcherHandle};
use crate::error::UploadError;
use crate::executor::UploadExecutor;
use crate::queue::UploadQueue;
use crate::record::{QueuedUpload, UploadId, UploadJob, VideoMetadata, parse_tags};
use crate::session::Session;
use crate::staging::{IncomingFile, MAX_UPLOAD_BYTES, StagedFile, sanitize_filename, too_large};
use crate::youtube_api::PrivacyStatus;
use jiff::Timestamp;
use jiff::civil::DateTime;
use jiff::tz::TimeZone;
use serde::Serialize;
use std::sync::Arc;

/// The fields of one upload request, as the caller sent them.
///
/// Everything is optional here so that missing fields are reported as validation errors rather
/// than failing to build the form in the first place.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Comma-separated.
    pub tags: Option<String>,
    pub privacy_status: Option<String>,
    pub file: Option<IncomingFile>,
    /// ISO 8601, with or without a UTC offset. Blank means "now".
    pub schedule_time: Option<String>,
}

/// What a successful submission tells the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SubmissionOutcome {
    /// The video is on YouTube.
    Uploaded {
        message: String,
        video_id: String,
        video_url: String,
    },
    /// The video will be uploaded by the dispatcher once its time comes.
    Scheduled {
        message: String,
        upload_id: UploadId,
        scheduled_at: Timestamp,
    },
}

/// Entry point for submissions and for listing what is scheduled.
pub struct UploadService<E> {
    executor: Arc<E>,
    /// Present only while a dispatcher is serving it.
    queue: Option<Arc<UploadQueue>>,
    time_zone: TimeZone,
    max_upload_bytes: u64,
}

impl<E> std::fmt::Debug for UploadService<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadService")
            .field("scheduling", &self.queue.is_some())
            .field("time_zone", &self.time_zone)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish_non_exhaustive()
    }
}

impl<E: UploadExecutor> UploadService<E> {
    /// A service that uploads immediately and refuses scheduled submissions.
    pub fn new(executor: Arc<E>) -> Self {
        Self {
            executor,
            queue: None,
            time_zone: TimeZone::system(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }

    /// Accepts scheduled submissions into the queue of a running dispatcher.
    pub fn with_scheduling(mut self, dispatcher: &DispatcherHandle) -> Self {
        self.queue = Some(dispatcher.queue().clone());
        self
    }

    /// Zone for schedule times that come without a UTC offset.
    pub fn with_time_zone(mut self, time_zone: TimeZone) -> Self {
        self.time_zone = time_zone;
        self
    }

    /// Builds the service as configured, starting a dispatcher if scheduling is enabled.
    ///
    /// The caller owns the returned handle and should [`DispatcherHandle::stop`] it on shutdown.
    pub fn launch(config: &UploaderConfig, executor: Arc<E>) -> (Self, Option<DispatcherHandle>) {
        let service = Self::new(executor.clone()).with_time_zone(config.time_zone.clone());
        if !config.scheduling_enabled {
            tracing::info!("scheduled uploads are disabled");
            return (service, None);
        }

        let dispatcher = Dispatcher::new(Arc::new(UploadQueue::new()), executor)
            .with_interval(config.dispatch_interval)
            .start();
        (service.with_scheduling(&dispatcher), Some(dispatcher))
    }

    pub fn scheduling_available(&self) -> bool {
        self.queue.is_some()
    }

    /// Handles one upload request.
    ///
    /// Every check that can fail without touching the disk or the network runs first. Once the
    /// file is staged, it is either uploaded right away and then deleted, or handed to the queue
    /// together with a copy of the session's credentials.
    pub async fn submit(
        &self,
        session: &Session,
        form: UploadForm,
    ) -> Result<SubmissionOutcome, UploadError> {
        let credentials = session.credentials()?;

        let title = form
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| UploadError::validation("Title is required"))?;

        let file = form
            .file
            .ok_or_else(|| UploadError::validation("No video file provided"))?;
        sanitize_filename(file.filename())?;
        if file.declared_size() > self.max_upload_bytes {
            return Err(too_large());
        }

        let privacy = match form.privacy_status.as_deref().map(str::trim) {
            None | Some("") => PrivacyStatus::default(),
            Some(raw) => raw
                .parse()
                .map_err(|e| UploadError::validation(format!("{e}")))?,
        };

        let schedule_time = form
            .schedule_time
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let scheduled = match schedule_time {
            None => None,
            Some(raw) => {
                let Some(queue) = &self.queue else {
                    return Err(UploadError::SchedulingUnavailable);
                };
                Some((queue, parse_schedule_time(raw, &self.time_zone)?))
            }
        };

        let metadata = VideoMetadata {
            title: title.to_string(),
            description: form
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            tags: form.tags.as_deref().map(parse_tags).unwrap_or_default(),
            privacy,
            ..VideoMetadata::new(title)
        };

        let staged = StagedFile::stage(file, self.max_upload_bytes).await?;

        match scheduled {
            Some((queue, scheduled_at)) => {
                let upload_id = queue
                    .enqueue(UploadJob {
                        metadata,
                        source: staged,
                        scheduled_at,
                        credentials: credentials.clone(),
                    })
                    .await;
                Ok(SubmissionOutcome::Scheduled {
                    message: format!("Video scheduled for upload at {scheduled_at}"),
                    upload_id,
                    scheduled_at,
                })
            }
            None => {
                let result = self
                    .executor
                    .execute(credentials, &metadata, staged.path())
                    .await;
                staged.release().await;

                let video = result.map_err(|e| {
                    tracing::warn!(title = %metadata.title, error = %format!("{e:#}"), "upload failed");
                    UploadError::Executor(e)
                })?;
                tracing::info!(title = %metadata.title, video_id = %video.video_id, "video uploaded");
                Ok(SubmissionOutcome::Uploaded {
                    message: "Video uploaded successfully!".to_string(),
                    video_id: video.video_id,
                    video_url: video.video_url,
                })
            }
        }
    }

    /// Lists the uploads waiting in the queue, for an authenticated caller.
    pub async fn scheduled_uploads(
        &self,
        session: &Session,
    ) -> Result<Vec<QueuedUpload>, UploadError> {
        session.credentials()?;
        match &self.queue {
            Some(queue) => Ok(queue.snapshot().await),
            None => Ok(Vec::new()),
        }
    }
}

/// Reads a schedule time.
///
/// Times with an offset or a `Z` are taken as written. Times without one, as an HTML
/// `datetime-local` input produces, are read in `time_zone`. A space may stand in for the `T`.
pub fn parse_schedule_time(raw: &str, time_zone: &TimeZone) -> Result<Timestamp, UploadError> {
    let invalid = || UploadError::validation(format!("Invalid schedule time: {raw:?}"));

    if let Ok(ts) = raw.parse::<Timestamp>() {
        return Ok(ts);
    }
    let civil: DateTime = raw.replacen(' ', "T", 1).parse().map_err(|_| invalid())?;
    let zoned = civil.to_zoned(time_zone.clone()).map_err(|_| invalid())?;
    Ok(zoned.timestamp())
}
