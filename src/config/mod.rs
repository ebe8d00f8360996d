use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::s3::AddressingStyle;
use crate::upload::{TransportConfig, DEFAULT_CHUNK_SIZE};

/// AWS regions the CLI knows about. Others are accepted with a warning,
/// since custom endpoints use arbitrary region names.
pub const KNOWN_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "af-south-1",
    "ap-east-1",
    "ap-south-1",
    "ap-south-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ca-central-1",
    "ca-west-1",
    "eu-central-1",
    "eu-central-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-south-1",
    "eu-south-2",
    "eu-north-1",
    "il-central-1",
    "me-south-1",
    "me-central-1",
    "sa-east-1",
];

/// Region used when neither flags, profile nor stored credentials name one
pub const DEFAULT_REGION: &str = "us-east-1";

pub fn is_known_region(region: &str) -> bool {
    KNOWN_REGIONS.contains(&region)
}

/// S3 profile: credentials, bucket and endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    /// AWS access key ID
    #[serde(default)]
    pub access_key: String,

    /// AWS secret access key
    #[serde(default)]
    pub secret_key: String,

    /// AWS region. Left unset when not configured so that stored
    /// credentials keep their own region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Bucket uploads go to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// Custom endpoint (MinIO, Ceph, ...). AWS is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Path-style or virtual-hosted URLs
    #[serde(default)]
    pub addressing_style: AddressingStyle,
}

/// Transfer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Size of each body chunk in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure_tls: bool,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            connect_timeout: default_connect_timeout(),
            insecure_tls: false,
        }
    }
}

impl TransferSettings {
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            chunk_size: self.chunk_size,
            connect_timeout: Duration::from_secs(self.connect_timeout),
            insecure_tls: self.insecure_tls,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Named profiles
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,

    /// Profile used when none is requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    /// Transfer settings
    #[serde(default)]
    pub transfer: TransferSettings,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a profile by name, or the default profile if not specified
    pub fn get_profile(&self, name: Option<&str>) -> Option<&Profile> {
        if let Some(name) = name {
            self.profiles.get(name)
        } else if let Some(default) = &self.default_profile {
            self.profiles.get(default)
        } else {
            self.profiles.values().next()
        }
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    if config.transfer.chunk_size == 0 {
        anyhow::bail!("transfer.chunk_size must be greater than 0");
    }

    Ok(config)
}

/// Load configuration from environment variables
///
/// All variables are optional; missing credentials are reported when an
/// upload is attempted, not here.
/// - AWS_ACCESS_KEY_ID
/// - AWS_SECRET_ACCESS_KEY
/// - AWS_REGION
/// - S3_BUCKET
/// - S3_ENDPOINT
/// - S3DROP_CHUNK_SIZE
pub fn load_from_env() -> Result<Config> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let mut config = Config::new();

    let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

    let profile = Profile {
        access_key: non_empty("AWS_ACCESS_KEY_ID").unwrap_or_default(),
        secret_key: non_empty("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
        region: non_empty("AWS_REGION"),
        bucket: non_empty("S3_BUCKET"),
        endpoint: non_empty("S3_ENDPOINT"),
        addressing_style: AddressingStyle::default(),
    };

    if let Some(chunk_size) = non_empty("S3DROP_CHUNK_SIZE") {
        let chunk_size: usize = chunk_size
            .trim()
            .parse()
            .context("S3DROP_CHUNK_SIZE must be a positive integer")?;
        if chunk_size == 0 {
            anyhow::bail!("S3DROP_CHUNK_SIZE must be greater than 0");
        }
        config.transfer.chunk_size = chunk_size;
    }

    config.profiles.insert("default".to_string(), profile);
    config.default_profile = Some("default".to_string());

    Ok(config)
}

/// Load configuration from file or environment
///
/// Tries the YAML file first when one is given, otherwise falls back to
/// environment variables.
///
/// # Arguments
/// * `config_path` - Optional path to YAML config file
/// * `profile_name` - Optional profile name to use (only relevant for YAML configs)
pub fn load_config(config_path: Option<&str>, profile_name: Option<&str>) -> Result<Config> {
    if let Some(path) = config_path {
        let mut config = load_from_yaml(path)?;

        if let Some(name) = profile_name {
            if !config.profiles.contains_key(name) {
                anyhow::bail!("Profile '{}' not found in config file", name);
            }
            config.default_profile = Some(name.to_string());
        }

        Ok(config)
    } else {
        load_from_env()
    }
}
