//! Signed-URL issuer
//!
//! Thin wrapper over a [`SigningCapability`] that checks preconditions before
//! signing and turns signer failures into a descriptive [`IssueError`].

use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::s3::signer::{SignError, SigningCapability};
use crate::s3::types::{Credentials, PresignMethod, PresignedUrl, SignRequest};

/// Validity window of every URL handed out by the issuer
pub const PRESIGN_EXPIRY: Duration = Duration::from_secs(3600);

/// Why a URL could not be issued
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IssueError {
    #[error("Credentials are not set.")]
    CredentialsNotSet,

    #[error("Bucket name is not set.")]
    BucketNotSet,

    #[error("Object key is empty.")]
    EmptyKey,

    #[error("Failed to sign {method} URL: {source}")]
    Signing {
        method: PresignMethod,
        #[source]
        source: SignError,
    },
}

impl IssueError {
    /// True for failures detected before the signer is consulted
    pub fn is_precondition(&self) -> bool {
        !matches!(self, IssueError::Signing { .. })
    }
}

/// Issues pre-signed PUT and GET URLs
#[derive(Debug, Clone)]
pub struct SignedUrlIssuer<S> {
    signer: S,
    expires_in: Duration,
}

impl<S: SigningCapability> SignedUrlIssuer<S> {
    pub fn new(signer: S) -> Self {
        Self {
            signer,
            expires_in: PRESIGN_EXPIRY,
        }
    }

    /// The wrapped signing capability
    pub fn signer(&self) -> &S {
        &self.signer
    }

    /// URL for uploading `key` into `bucket`
    pub fn issue_put_url(
        &self,
        credentials: &Credentials,
        bucket: &str,
        key: &str,
    ) -> Result<PresignedUrl, IssueError> {
        self.issue(PresignMethod::Put, credentials, bucket, key)
    }

    /// URL for downloading `key` from `bucket`
    pub fn issue_get_url(
        &self,
        credentials: &Credentials,
        bucket: &str,
        key: &str,
    ) -> Result<PresignedUrl, IssueError> {
        self.issue(PresignMethod::Get, credentials, bucket, key)
    }

    fn issue(
        &self,
        method: PresignMethod,
        credentials: &Credentials,
        bucket: &str,
        key: &str,
    ) -> Result<PresignedUrl, IssueError> {
        // Same checks for PUT and GET
        if !credentials.is_complete() {
            return Err(IssueError::CredentialsNotSet);
        }
        if bucket.is_empty() {
            return Err(IssueError::BucketNotSet);
        }
        if key.is_empty() {
            return Err(IssueError::EmptyKey);
        }

        let request = SignRequest {
            method,
            bucket,
            key,
            credentials,
        };

        let url = self
            .signer
            .sign(&request, self.expires_in)
            .map_err(|source| IssueError::Signing { method, source })?;

        debug!(
            method = %method,
            bucket = %bucket,
            key = %key,
            expires_in = self.expires_in.as_secs(),
            "presigned_url_issued"
        );

        Ok(PresignedUrl {
            url,
            method,
            expires_in: self.expires_in,
        })
    }
}
