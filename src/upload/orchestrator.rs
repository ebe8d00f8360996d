//! Upload orchestration
//!
//! One attempt runs `Idle -> Signing -> Transferring` and ends in exactly
//! one of `Succeeded`, `Failed` or `Aborted`. There are no retries; a failed
//! attempt is terminal and the caller decides whether to start another.

use bytes::Bytes;
use futures::future::{FutureExt, LocalBoxFuture};
use std::future::IntoFuture;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::s3::{Credentials, ProgressSample, SignedUrlIssuer, SigningCapability, UploadTarget};
use crate::upload::result::{UploadError, UploadResult};
use crate::upload::sanitize::sanitize;
use crate::upload::transport::{ProgressReporter, TransferRequest, TransferResponse, Transport};

/// Content type used when the caller does not know better
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A file to upload: its original name, declared type and contents
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk. The object name is the file's base name.
    pub async fn from_path(path: &Path, content_type: Option<String>) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            name,
            content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            data: Bytes::from(data),
        })
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Lifecycle of a single upload attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UploadState {
    Idle = 0,
    Signing = 1,
    Transferring = 2,
    Succeeded = 3,
    Failed = 4,
    Aborted = 5,
}

impl UploadState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => UploadState::Signing,
            2 => UploadState::Transferring,
            3 => UploadState::Succeeded,
            4 => UploadState::Failed,
            5 => UploadState::Aborted,
            _ => UploadState::Idle,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadState::Succeeded | UploadState::Failed | UploadState::Aborted
        )
    }
}

/// Read-only view of an attempt's state, shareable with observers
#[derive(Debug, Clone)]
pub struct UploadStatus {
    state: Arc<AtomicU8>,
}

impl UploadStatus {
    fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(UploadState::Idle as u8)),
        }
    }

    pub fn get(&self) -> UploadState {
        UploadState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set(&self, state: UploadState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Cancels an attempt's transfer.
///
/// Cancellation is latched: if it arrives before the transfer opens, the
/// transfer is aborted as soon as it does. Once the attempt has finished,
/// cancelling does nothing.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A started upload: await it for the result, keep the cancel handle to stop it
pub struct UploadHandle<'a> {
    completion: LocalBoxFuture<'a, UploadResult>,
    cancel: CancelHandle,
    status: UploadStatus,
}

impl<'a> UploadHandle<'a> {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn status(&self) -> UploadStatus {
        self.status.clone()
    }
}

impl<'a> IntoFuture for UploadHandle<'a> {
    type Output = UploadResult;
    type IntoFuture = LocalBoxFuture<'a, UploadResult>;

    fn into_future(self) -> Self::IntoFuture {
        self.completion
    }
}

/// Turns transport progress events into [`ProgressSample`]s.
///
/// Speed is measured against the previous sample; the first sample is
/// measured against the start of the transfer.
#[derive(Debug, Clone)]
pub struct SpeedMeter {
    last_time: Instant,
    last_loaded: u64,
}

impl SpeedMeter {
    pub fn new(start: Instant) -> Self {
        Self {
            last_time: start,
            last_loaded: 0,
        }
    }

    /// `None` when the total is unknown (zero)
    pub fn sample(&mut self, loaded: u64, total: u64, now: Instant) -> Option<ProgressSample> {
        if total == 0 {
            return None;
        }

        let percent_complete = loaded as f64 / total as f64 * 100.0;
        let elapsed = now.saturating_duration_since(self.last_time).as_secs_f64();
        let delta = loaded.saturating_sub(self.last_loaded) as f64;
        let speed_bytes_per_sec = if elapsed > 0.0 { delta / elapsed } else { 0.0 };

        self.last_time = now;
        self.last_loaded = loaded;

        Some(ProgressSample {
            percent_complete,
            speed_bytes_per_sec,
        })
    }
}

/// Runs upload attempts: sign, transfer, normalize the outcome
pub struct Uploader<S, T> {
    issuer: SignedUrlIssuer<S>,
    transport: T,
}

impl<S: SigningCapability, T: Transport> Uploader<S, T> {
    pub fn new(issuer: SignedUrlIssuer<S>, transport: T) -> Self {
        Self { issuer, transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Start an attempt with progress reporting and a cancel handle.
    ///
    /// `on_progress` runs on the task awaiting the handle, between transport
    /// events; it should return quickly. Nothing happens until the handle is
    /// awaited.
    pub fn start_upload<'a, F>(
        &'a self,
        credentials: &'a Credentials,
        bucket: &'a str,
        file: UploadFile,
        on_progress: F,
    ) -> UploadHandle<'a>
    where
        F: FnMut(ProgressSample) + 'a,
    {
        let token = CancellationToken::new();
        let status = UploadStatus::new();

        let completion = self
            .run(credentials, bucket, file, on_progress, token.clone(), status.clone())
            .boxed_local();

        UploadHandle {
            completion,
            cancel: CancelHandle { token },
            status,
        }
    }

    /// Upload without progress reporting or cancellation
    pub async fn upload(&self, credentials: &Credentials, bucket: &str, file: UploadFile) -> UploadResult {
        self.start_upload(credentials, bucket, file, |_| {}).await
    }

    async fn run<F>(
        &self,
        credentials: &Credentials,
        bucket: &str,
        file: UploadFile,
        mut on_progress: F,
        token: CancellationToken,
        status: UploadStatus,
    ) -> UploadResult
    where
        F: FnMut(ProgressSample),
    {
        let target = UploadTarget {
            bucket_name: bucket.to_string(),
            sanitized_key: sanitize(&file.name),
            raw_file_name: file.name,
            content_type: file.content_type,
            size_bytes: file.data.len() as u64,
        };

        info!(
            bucket = %target.bucket_name,
            file = %target.raw_file_name,
            key = %target.sanitized_key,
            size = target.size_bytes,
            "upload_started"
        );

        status.set(UploadState::Signing);
        let presigned = match self
            .issuer
            .issue_put_url(credentials, &target.bucket_name, &target.sanitized_key)
        {
            Ok(presigned) => presigned,
            Err(err) => {
                warn!(key = %target.sanitized_key, error = %err, "presign_failed");
                status.set(UploadState::Failed);
                return UploadError::from(err).into();
            }
        };

        status.set(UploadState::Transferring);
        let (reporter, mut progress_rx) = ProgressReporter::channel();
        let request = TransferRequest {
            url: presigned.url,
            content_type: target.content_type.clone(),
            body: file.data,
        };

        let transfer = self.transport.put(request, reporter);
        tokio::pin!(transfer);

        let mut meter = SpeedMeter::new(Instant::now());

        let response = loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => break None,

                Some(progress) = progress_rx.recv() => {
                    if let Some(sample) = meter.sample(progress.loaded, progress.total, Instant::now()) {
                        on_progress(sample);
                    }
                }

                response = &mut transfer => break Some(response),
            }
        };

        // Dropping the pinned transfer here aborts the request
        let Some(response) = response else {
            info!(key = %target.sanitized_key, "upload_aborted");
            status.set(UploadState::Aborted);
            return UploadResult::Aborted;
        };

        // Events sent in the same poll that completed the transfer
        while let Ok(progress) = progress_rx.try_recv() {
            if let Some(sample) = meter.sample(progress.loaded, progress.total, Instant::now()) {
                on_progress(sample);
            }
        }

        let result = match response {
            Ok(response) if response.is_success() => {
                on_progress(ProgressSample::COMPLETE);
                info!(
                    bucket = %target.bucket_name,
                    key = %target.sanitized_key,
                    status = response.status,
                    "upload_succeeded"
                );
                UploadResult::Success {
                    sanitized_key: target.sanitized_key,
                }
            }
            Ok(TransferResponse { status: code, body }) => {
                let body = String::from_utf8_lossy(&body);
                warn!(
                    key = %target.sanitized_key,
                    status = code,
                    body = %body,
                    "upload_rejected"
                );
                UploadError::from_provider_response(code, &body).into()
            }
            Err(err) => {
                warn!(key = %target.sanitized_key, error = %err, "upload_transport_error");
                UploadError::Transport {
                    detail: err.to_string(),
                }
                .into()
            }
        };

        status.set(if result.is_success() {
            UploadState::Succeeded
        } else {
            UploadState::Failed
        });
        debug!(state = ?status.get(), "upload_finished");

        result
    }
}
