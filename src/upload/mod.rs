//! File uploads through pre-signed PUT URLs
//!
//! This module provides:
//! - Object key sanitizing
//! - A streaming transport with byte-level progress
//! - The upload orchestrator (signing, transfer, cancellation, speed)
//! - Result and error normalization

pub mod orchestrator;
pub mod result;
pub mod sanitize;
pub mod transport;

pub use orchestrator::{
    CancelHandle, SpeedMeter, UploadFile, UploadHandle, UploadState, UploadStatus, Uploader,
    DEFAULT_CONTENT_TYPE,
};
pub use result::{extract_provider_error, FailureKind, UploadError, UploadResult, NETWORK_FAILURE_MESSAGE};
pub use sanitize::sanitize;
pub use transport::{
    HyperTransport, ProgressReporter, TransferProgress, TransferRequest, TransferResponse,
    Transport, TransportConfig, TransportError, DEFAULT_CHUNK_SIZE,
};
