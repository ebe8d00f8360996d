//! S3 request signing
//!
//! This module provides:
//! - AWS Signature Version 4 query-string presigning
//! - The signed-URL issuer used by uploads and download links
//! - Shared S3 data types

pub mod presign;
pub mod signer;
pub mod types;

// Re-export main types for convenience
pub use presign::{IssueError, SignedUrlIssuer, PRESIGN_EXPIRY};
pub use signer::{AddressingStyle, S3SignerV4, SignError, SigningCapability};
pub use types::{
    Credentials, HistoryEntry, PresignMethod, PresignedUrl, ProgressSample, SignRequest,
    UploadTarget,
};
