//! Upload outcomes and failure normalization

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::s3::IssueError;

/// Shown whenever the transfer produced no response at all. Nothing more
/// specific is known at that point, so the text is fixed.
pub const NETWORK_FAILURE_MESSAGE: &str = "A network error occurred. This is often due to a CORS \
configuration issue on your S3 bucket. Please ensure your bucket's CORS policy allows PUT \
requests from this origin. And, please check your credentials";

const UNKNOWN_CODE: &str = "Unknown";
const UNKNOWN_MESSAGE: &str = "An unknown error occurred.";

// `.` stops at newlines, so a fragment split across lines is not matched.
static CODE_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Code>(.*?)</Code>").expect("valid Code pattern"));

static MESSAGE_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Message>(.*?)</Message>").expect("valid Message pattern"));

/// Category of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Required input missing; nothing was sent
    Precondition,
    /// The signer rejected the request
    Signing,
    /// The provider answered with a non-2xx status
    ProviderRejection,
    /// No response was received
    Transport,
}

/// Every way an upload attempt can fail
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error(transparent)]
    Issue(#[from] IssueError),

    #[error("Upload failed with status {status}. Code: {code}. Message: {message}")]
    ProviderRejection {
        status: u16,
        code: String,
        message: String,
    },

    /// `detail` is kept for logs only
    #[error("{}", NETWORK_FAILURE_MESSAGE)]
    Transport { detail: String },
}

impl UploadError {
    /// Build a rejection from a non-2xx status and its (XML) body
    pub fn from_provider_response(status: u16, body: &str) -> Self {
        let (code, message) = extract_provider_error(body);
        UploadError::ProviderRejection {
            status,
            code,
            message,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            UploadError::Issue(err) if err.is_precondition() => FailureKind::Precondition,
            UploadError::Issue(_) => FailureKind::Signing,
            UploadError::ProviderRejection { .. } => FailureKind::ProviderRejection,
            UploadError::Transport { .. } => FailureKind::Transport,
        }
    }
}

/// Pull the first `<Code>` and `<Message>` fragments out of an S3 error body.
///
/// Not an XML parse: the first single-line match of each wins, and missing
/// fragments fall back to `Unknown` / `An unknown error occurred.`.
pub fn extract_provider_error(body: &str) -> (String, String) {
    let first = |re: &Regex| {
        re.captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    };

    let code = first(&CODE_FRAGMENT).unwrap_or_else(|| UNKNOWN_CODE.to_string());
    let message = first(&MESSAGE_FRAGMENT).unwrap_or_else(|| UNKNOWN_MESSAGE.to_string());
    (code, message)
}

/// Terminal outcome of one upload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    Success { sanitized_key: String },
    Failure { kind: FailureKind, message: String },
    /// Cancelled by the caller. Not an error; callers stay silent.
    Aborted,
}

impl UploadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadResult::Success { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, UploadResult::Aborted)
    }

    pub fn sanitized_key(&self) -> Option<&str> {
        match self {
            UploadResult::Success { sanitized_key } => Some(sanitized_key),
            _ => None,
        }
    }

    /// User-facing failure text, if the attempt failed
    pub fn message(&self) -> Option<&str> {
        match self {
            UploadResult::Failure { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            UploadResult::Failure { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<UploadError> for UploadResult {
    fn from(err: UploadError) -> Self {
        UploadResult::Failure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
