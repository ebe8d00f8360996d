//! S3 types shared by the signer, the issuer and the upload pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// AWS credentials used to sign requests
///
/// The core never inspects these beyond presence checks; they are handed
/// to the signing capability as-is.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// AWS access key ID
    pub access_key_id: String,
    /// AWS secret access key
    pub secret_access_key: String,
    /// AWS region (e.g. us-east-1)
    pub region: String,
}

impl Credentials {
    /// Create a new set of credentials
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
        }
    }

    /// True when all three fields are non-empty
    pub fn is_complete(&self) -> bool {
        !self.access_key_id.is_empty()
            && !self.secret_access_key.is_empty()
            && !self.region.is_empty()
    }
}

// Keep the secret out of logs and panic messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// HTTP method a presigned URL authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresignMethod {
    Put,
    Get,
}

impl PresignMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresignMethod::Put => "PUT",
            PresignMethod::Get => "GET",
        }
    }
}

impl fmt::Display for PresignMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request descriptor handed to the signing capability
#[derive(Debug, Clone, Copy)]
pub struct SignRequest<'a> {
    pub method: PresignMethod,
    pub bucket: &'a str,
    pub key: &'a str,
    pub credentials: &'a Credentials,
}

/// A time-limited URL authorizing a single PUT or GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrl {
    /// Full URL including the signature query string
    pub url: String,
    /// Method the URL was signed for
    pub method: PresignMethod,
    /// Validity window from the moment of signing
    pub expires_in: Duration,
}

/// Everything known about one upload attempt before the transfer starts
///
/// `sanitized_key` is computed once from `raw_file_name` and never changes
/// for the life of the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub bucket_name: String,
    pub raw_file_name: String,
    pub sanitized_key: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// One progress notification, recomputed per transport event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// 0.0 - 100.0
    pub percent_complete: f64,
    /// Bytes per second since the previous sample
    pub speed_bytes_per_sec: f64,
}

impl ProgressSample {
    /// The terminal sample reported once a transfer has succeeded
    pub const COMPLETE: ProgressSample = ProgressSample {
        percent_complete: 100.0,
        speed_bytes_per_sec: 0.0,
    };
}

/// Upload history entry, appended by the caller after a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Sanitized object key
    pub file_name: String,
    /// Bucket the object was uploaded to
    pub bucket_name: String,
}

impl HistoryEntry {
    pub fn new(file_name: impl Into<String>, bucket_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            bucket_name: bucket_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = Credentials::new("AKIAEXAMPLE", "super-secret", "us-east-1");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("AKIAEXAMPLE"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn test_credentials_is_complete() {
        assert!(Credentials::new("a", "b", "c").is_complete());
        assert!(!Credentials::new("", "b", "c").is_complete());
        assert!(!Credentials::new("a", "", "c").is_complete());
        assert!(!Credentials::new("a", "b", "").is_complete());
    }

    #[test]
    fn test_history_entry_json_shape() {
        let entry = HistoryEntry::new("report.pdf", "my-bucket");
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"fileName":"report.pdf","bucketName":"my-bucket"}"#);
    }
}
