use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// s3drop - Upload files to S3 through pre-signed URLs
#[derive(Parser, Debug)]
#[command(name = "s3drop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path (YAML)
    #[arg(long, global = true, env = "S3DROP_CONFIG")]
    pub config: Option<String>,

    /// Configuration profile to use
    #[arg(long, global = true, env = "S3DROP_PROFILE")]
    pub profile: Option<String>,

    /// AWS Access Key ID
    #[arg(long, global = true, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key: Option<String>,

    /// AWS Secret Access Key
    #[arg(long, global = true, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// AWS Region
    #[arg(long, global = true, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Custom S3 endpoint (e.g. http://localhost:9000)
    #[arg(long, global = true, env = "S3_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Path of the credentials/history store
    #[arg(long, global = true, env = "S3DROP_STORE")]
    pub store: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Disable SSL certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a file through a pre-signed PUT URL
    Upload {
        /// Local file to upload
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Target bucket
        #[arg(short, long, env = "S3_BUCKET")]
        bucket: Option<String>,

        /// Content type (default: application/octet-stream)
        #[arg(long)]
        content_type: Option<String>,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,

        /// Remember the credentials and bucket after a successful upload
        #[arg(long)]
        save_credentials: bool,
    },

    /// Print a pre-signed download URL (valid for one hour)
    Url {
        /// Object key, or s3://bucket/key
        #[arg(value_name = "KEY")]
        target: String,

        /// Bucket (when KEY is a bare key)
        #[arg(short, long, env = "S3_BUCKET")]
        bucket: Option<String>,
    },

    /// Show or clear the upload history
    History {
        /// Remove all history entries
        #[arg(long)]
        clear: bool,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Manage stored credentials
    Credentials {
        #[command(subcommand)]
        action: CredentialsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CredentialsAction {
    /// Store the resolved credentials and bucket
    Save {
        /// Bucket to store with the credentials
        #[arg(short, long, env = "S3_BUCKET")]
        bucket: Option<String>,
    },

    /// Show stored credentials (the secret is never printed)
    Show,

    /// Remove stored credentials
    Clear,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Validate arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                anyhow::bail!("Endpoint must start with http:// or https://");
            }
        }

        if let Commands::Upload { file, .. } = &self.command {
            if file.as_os_str().is_empty() {
                anyhow::bail!("File path cannot be empty");
            }
        }

        Ok(())
    }
}

/// Parse a download target into an optional bucket and a key
///
/// Accepts a bare key or `s3://bucket/key`. Keys copied from a browser may be
/// percent-encoded and are decoded.
pub fn parse_object_ref(target: &str) -> anyhow::Result<(Option<String>, String)> {
    let target = target.trim();

    let (bucket, key) = match target.strip_prefix("s3://") {
        Some(rest) => {
            let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
            if bucket.is_empty() {
                anyhow::bail!("Bucket name cannot be empty");
            }
            (Some(bucket.to_string()), key)
        }
        None => (None, target),
    };

    if key.is_empty() {
        anyhow::bail!("Object key cannot be empty");
    }

    let key = urlencoding::decode(key).unwrap_or_else(|_| key.into());
    Ok((bucket, key.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_ref() {
        assert_eq!(
            parse_object_ref("report.pdf").unwrap(),
            (None, "report.pdf".to_string())
        );
        assert_eq!(
            parse_object_ref("dir/report.pdf").unwrap(),
            (None, "dir/report.pdf".to_string())
        );
        assert_eq!(
            parse_object_ref("s3://mybucket/path/to/object.txt").unwrap(),
            (Some("mybucket".to_string()), "path/to/object.txt".to_string())
        );
        assert_eq!(
            parse_object_ref("s3://mybucket/my%20file.txt").unwrap(),
            (Some("mybucket".to_string()), "my file.txt".to_string())
        );

        // Invalid targets
        assert!(parse_object_ref("").is_err());
        assert!(parse_object_ref("s3://mybucket").is_err());
        assert!(parse_object_ref("s3://mybucket/").is_err());
        assert!(parse_object_ref("s3:///key").is_err());
    }

    #[test]
    fn test_cli_parses_upload() {
        let cli = Cli::try_parse_from([
            "s3drop",
            "--region",
            "eu-west-1",
            "upload",
            "notes.txt",
            "--bucket",
            "b",
            "--no-progress",
        ])
        .unwrap();

        assert_eq!(cli.region.as_deref(), Some("eu-west-1"));
        match cli.command {
            Commands::Upload {
                file,
                bucket,
                no_progress,
                save_credentials,
                ..
            } => {
                assert_eq!(file, PathBuf::from("notes.txt"));
                assert_eq!(bucket.as_deref(), Some("b"));
                assert!(no_progress);
                assert!(!save_credentials);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let cli = Cli::try_parse_from([
            "s3drop",
            "--endpoint",
            "localhost:9000",
            "history",
        ])
        .unwrap();
        assert!(cli.validate().is_err());
    }
}
