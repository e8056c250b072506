//! Upload videos to YouTube right away, or queue them to be uploaded at a later time.
//!
//! An [`UploadService`] takes submissions from a signed-in [`Session`]. Submissions without a
//! schedule time go straight to the [`UploadExecutor`]; the rest wait in an [`UploadQueue`] until
//! the [`Dispatcher`] finds them due.

pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod oauth;
pub mod queue;
pub mod record;
pub mod session;
pub mod staging;
pub mod submission;
pub mod youtube_api;

pub use config::UploaderConfig;
pub use credentials::CredentialSnapshot;
pub use dispatcher::{DispatchReport, Dispatcher, DispatcherHandle};
pub use error::{ErrorBody, UploadError};
pub use executor::{ChannelCheck, SkipChannelCheck, UploadExecutor, UploadedVideo, YouTubePlatform};
pub use oauth::OAuthManager;
pub use queue::UploadQueue;
pub use record::{QueuedUpload, UploadId, VideoMetadata};
pub use session::Session;
pub use staging::{IncomingFile, MAX_UPLOAD_BYTES};
pub use submission::{SubmissionOutcome, UploadForm, UploadService};
