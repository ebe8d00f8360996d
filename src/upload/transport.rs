//! Transfer transport for pre-signed PUT requests
//!
//! The hyper implementation mirrors the connection settings of a regular S3
//! client:
//! - HTTP/1.1 only
//! - TCP_NODELAY and keepalive on the connector
//! - native-tls (OpenSSL) for TLS, optionally without certificate checks
//! - Body streamed in fixed-size chunks, each chunk reported as progress

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Method, Request};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default size of each body frame handed to hyper
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Transport errors. None of these carry a response: if the provider
/// answered, the status and body come back in [`TransferResponse`].
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Body error: {0}")]
    Body(String),
}

/// One binary PUT to a pre-signed URL
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub url: String,
    pub content_type: String,
    pub body: Bytes,
}

/// Status and raw body of whatever the provider answered
#[derive(Debug, Clone)]
pub struct TransferResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransferResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Bytes handed to the wire so far, out of `total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub loaded: u64,
    pub total: u64,
}

/// Sending side of the progress channel given to a transport.
///
/// Counts are bytes handed to hyper as body frames, not bytes acknowledged
/// by the peer, so they can run ahead of the wire by a socket buffer.
/// Reporting never blocks; if the receiver is gone the event is dropped.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<TransferProgress>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransferProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, loaded: u64, total: u64) {
        let _ = self.tx.send(TransferProgress { loaded, total });
    }
}

/// Performs the PUT. Dropping the returned future aborts the transfer.
pub trait Transport {
    fn put(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
    ) -> impl Future<Output = Result<TransferResponse, TransportError>>;
}

/// Connection settings for [`HyperTransport`]
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub chunk_size: usize,
    pub connect_timeout: Duration,
    pub insecure_tls: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout: Duration::from_secs(10),
            insecure_tls: false,
        }
    }
}

type ProgressBody = UnsyncBoxBody<Bytes, Infallible>;

/// hyper-based transport
///
/// Clone is cheap - the underlying HTTP client uses Arc internally.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient<HttpsConnector<HttpConnector>, ProgressBody>,
    chunk_size: usize,
}

impl HyperTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(config.connect_timeout));
        http.set_keepalive(Some(Duration::from_secs(90)));

        let tls = if config.insecure_tls {
            tracing::warn!("INSECURE TLS MODE ENABLED: Certificate verification is disabled!");
            TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
        } else {
            TlsConnector::new()
        }
        .map_err(|e| TransportError::Tls(e.to_string()))?;

        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .set_host(true)
            .build(https);

        Ok(Self {
            client,
            chunk_size: config.chunk_size.max(1),
        })
    }

    /// Split `data` into frames, reporting the running total as hyper pulls each one
    fn progress_body(data: Bytes, chunk_size: usize, progress: ProgressReporter) -> ProgressBody {
        let total = data.len() as u64;
        let chunks: Vec<Bytes> = (0..data.len())
            .step_by(chunk_size)
            .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
            .collect();

        let mut sent = 0u64;
        let frames = chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            progress.report(sent, total);
            Ok::<_, Infallible>(Frame::data(chunk))
        });

        StreamBody::new(futures::stream::iter(frames)).boxed_unsync()
    }
}

impl Transport for HyperTransport {
    fn put(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
    ) -> impl Future<Output = Result<TransferResponse, TransportError>> {
        async move {
            let length = request.body.len();
            let body = Self::progress_body(request.body, self.chunk_size, progress);

            // Explicit length: S3 rejects chunked PUTs to pre-signed URLs
            let req = Request::builder()
                .method(Method::PUT)
                .uri(&request.url)
                .header(CONTENT_TYPE, &request.content_type)
                .header(CONTENT_LENGTH, length)
                .body(body)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

            let response = self
                .client
                .request(req)
                .await
                .map_err(|e| TransportError::Request(error_chain(&e)))?;

            let status = response.status().as_u16();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| TransportError::Body(error_chain(&e)))?
                .to_bytes();

            Ok(TransferResponse { status, body })
        }
    }
}

/// Render an error with all of its sources, for logs
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_body_reports_each_chunk() {
        let (reporter, mut rx) = ProgressReporter::channel();
        let data = Bytes::from(vec![7u8; 10]);
        let body = HyperTransport::progress_body(data.clone(), 4, reporter);

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected, data);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push((event.loaded, event.total));
        }
        assert_eq!(events, vec![(4, 10), (8, 10), (10, 10)]);
    }

    #[tokio::test]
    async fn test_progress_counts_frames_as_pulled() {
        let (reporter, mut rx) = ProgressReporter::channel();
        let mut body = HyperTransport::progress_body(Bytes::from(vec![1u8; 10]), 4, reporter);

        assert!(rx.try_recv().is_err());

        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap().len(), 4);
        let event = rx.try_recv().unwrap();
        assert_eq!((event.loaded, event.total), (4, 10));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_progress_body_empty() {
        let (reporter, mut rx) = ProgressReporter::channel();
        let body = HyperTransport::progress_body(Bytes::new(), 4, reporter);
        assert!(body.collect().await.unwrap().to_bytes().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_report_after_receiver_dropped() {
        let (reporter, rx) = ProgressReporter::channel();
        drop(rx);
        reporter.report(1, 2);
    }

    #[test]
    fn test_response_success_range() {
        let ok = TransferResponse { status: 204, body: Bytes::new() };
        let redirect = TransferResponse { status: 301, body: Bytes::new() };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
    }

    #[tokio::test]
    async fn test_transport_builds() {
        assert!(HyperTransport::new(&TransportConfig::default()).is_ok());
    }
}
