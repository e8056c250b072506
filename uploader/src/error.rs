//! Caller-facing failures of the upload service.

use serde::Serialize;

/// Every way a submission, a listing, or an authorization step can fail.
///
/// Network and platform problems are carried as [`eyre::Report`]s so that the full context chain
/// survives into the human-readable message.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// There is no credential snapshot in the caller's session.
    #[error("not authenticated")]
    AuthenticationRequired,

    /// The `state` presented on the authorization callback did not match the one we issued.
    #[error("invalid state parameter")]
    InvalidAuthorizationState,

    /// The authorization code could not be exchanged for tokens.
    #[error("authorization exchange failed: {0:#}")]
    AuthorizationExchange(eyre::Report),

    /// The authorized account has no channel to publish to.
    #[error("no YouTube channel found for this account")]
    ChannelNotFound,

    /// The submission itself is malformed (missing title or file, bad schedule time, too large).
    #[error("{0}")]
    Validation(String),

    /// A schedule time was given but no dispatcher is running to honor it.
    #[error("scheduled uploads are not available")]
    SchedulingUnavailable,

    /// The platform rejected the upload, or we never reached it.
    #[error("upload failed: {0:#}")]
    Executor(eyre::Report),

    /// Staging the uploaded file on local disk failed.
    #[error("{context}: {source}")]
    Filesystem {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// JSON shape of a failure as shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl UploadError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn filesystem(context: &'static str, source: std::io::Error) -> Self {
        Self::Filesystem { context, source }
    }

    /// Authentication failures send the caller back to the entry point rather than showing an
    /// error payload.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::AuthenticationRequired)
    }

    /// True for problems with the request itself, as opposed to the platform or the host.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationRequired
                | Self::InvalidAuthorizationState
                | Self::Validation(_)
                | Self::SchedulingUnavailable
        )
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
        }
    }
}
