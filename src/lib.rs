//! s3drop - browserless S3 uploads through pre-signed URLs

pub mod cli;
pub mod config;
pub mod s3;
pub mod store;
pub mod upload;

pub use config::Config;
pub use s3::{Credentials, S3SignerV4, SignedUrlIssuer};
pub use upload::{sanitize, UploadFile, UploadResult, Uploader};
