use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::cli::args::{parse_object_ref, OutputFormat};
use crate::config::{is_known_region, Config, Profile, TransferSettings, DEFAULT_REGION};
use crate::s3::{AddressingStyle, Credentials, HistoryEntry, S3SignerV4, SignedUrlIssuer};
use crate::store::{SavedCredentials, Store};
use crate::upload::{HyperTransport, UploadFile, UploadResult, Uploader};

/// Values given on the command line (or through their env variables)
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub insecure: bool,
}

/// Settings after merging flags, the config profile and stored credentials
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub bucket: Option<String>,
    pub endpoint: Option<String>,
    pub addressing_style: AddressingStyle,
    pub transfer: TransferSettings,
}

/// One place a credential set can come from
struct CredentialSource<'a> {
    access_key: Option<&'a str>,
    secret_key: Option<&'a str>,
    region: Option<&'a str>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Merge flags, the config profile and stored credentials.
///
/// Access key and secret come together from the first source that names an
/// access key (flag, then profile, then stored). The region is the `--region`
/// flag if given, else the region of that same source, else the profile
/// region, else [`DEFAULT_REGION`]. A stored region only travels with the
/// stored keys.
pub fn resolve_settings(
    overrides: &Overrides,
    profile: Option<&Profile>,
    transfer: &TransferSettings,
    saved: Option<&SavedCredentials>,
) -> Settings {
    let sources = [
        Some(CredentialSource {
            access_key: overrides.access_key.as_deref(),
            secret_key: overrides.secret_key.as_deref(),
            region: None,
        }),
        profile.map(|p| CredentialSource {
            access_key: Some(p.access_key.as_str()),
            secret_key: Some(p.secret_key.as_str()),
            region: p.region.as_deref(),
        }),
        saved.map(|s| CredentialSource {
            access_key: Some(s.credentials.access_key_id.as_str()),
            secret_key: Some(s.credentials.secret_access_key.as_str()),
            region: Some(s.credentials.region.as_str()),
        }),
    ];
    let keys = sources
        .iter()
        .flatten()
        .find(|s| non_empty(s.access_key).is_some());

    let region = non_empty(overrides.region.as_deref())
        .or_else(|| keys.and_then(|s| non_empty(s.region)))
        .or_else(|| non_empty(profile.and_then(|p| p.region.as_deref())))
        .unwrap_or(DEFAULT_REGION);

    let credentials = Credentials {
        access_key_id: keys
            .and_then(|s| s.access_key)
            .unwrap_or_default()
            .to_string(),
        secret_access_key: keys
            .and_then(|s| non_empty(s.secret_key))
            .unwrap_or_default()
            .to_string(),
        region: region.to_string(),
    };

    let bucket = profile
        .and_then(|p| p.bucket.clone())
        .or_else(|| saved.map(|s| s.bucket_name.clone()))
        .filter(|b| !b.is_empty());

    let endpoint = overrides
        .endpoint
        .clone()
        .or_else(|| profile.and_then(|p| p.endpoint.clone()))
        .filter(|e| !e.is_empty());

    let mut transfer = transfer.clone();
    if overrides.insecure {
        transfer.insecure_tls = true;
    }

    Settings {
        credentials,
        bucket,
        endpoint,
        addressing_style: profile.map(|p| p.addressing_style).unwrap_or_default(),
        transfer,
    }
}

/// CLI Handler - executes CLI commands against the upload core and the store
pub struct CLIHandler<St> {
    config: Config,
    profile: Option<String>,
    overrides: Overrides,
    store: St,
}

impl<St: Store> CLIHandler<St> {
    /// Create a new CLI handler
    pub fn new(config: Config, profile: Option<String>, overrides: Overrides, store: St) -> Self {
        Self {
            config,
            profile,
            overrides,
            store,
        }
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// Resolve settings, consulting stored credentials as the last resort
    pub fn settings(&self) -> Result<Settings> {
        let saved = self
            .store
            .load_credentials()
            .context("Failed to load stored credentials")?;
        let settings = resolve_settings(
            &self.overrides,
            self.config.get_profile(self.profile.as_deref()),
            &self.config.transfer,
            saved.as_ref(),
        );

        let region = &settings.credentials.region;
        if !region.is_empty() && !is_known_region(region) {
            warn!(region = %region, "Region is not a known AWS region");
        }

        Ok(settings)
    }

    fn issuer(settings: &Settings) -> SignedUrlIssuer<S3SignerV4> {
        let signer = S3SignerV4::new()
            .with_endpoint(settings.endpoint.clone().unwrap_or_default())
            .with_addressing_style(settings.addressing_style);
        SignedUrlIssuer::new(signer)
    }

    /// Execute upload command
    pub async fn execute_upload(
        &self,
        path: &Path,
        bucket: Option<String>,
        content_type: Option<String>,
        show_progress: bool,
        save_credentials: bool,
    ) -> Result<()> {
        if !path.is_file() {
            anyhow::bail!("Source is not a file: {}", path.display());
        }

        let settings = self.settings()?;
        let bucket = bucket.or_else(|| settings.bucket.clone()).unwrap_or_default();

        let file = UploadFile::from_path(path, content_type)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let transport = HyperTransport::new(&settings.transfer.transport_config())
            .context("Failed to create HTTP client")?;
        let uploader = Uploader::new(Self::issuer(&settings), transport);

        info!(
            "Uploading {} ({}) to bucket {}",
            path.display(),
            format_file_size(file.size() as f64),
            bucket
        );

        let pb = if show_progress {
            let pb = ProgressBar::new(100);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}")?
                    .progress_chars("=>-"),
            );
            pb.set_message(format!("Uploading {}", file.name));
            Some(pb)
        } else {
            None
        };

        let progress_bar = pb.clone();
        let handle = uploader.start_upload(&settings.credentials, &bucket, file, move |sample| {
            if let Some(pb) = &progress_bar {
                pb.set_position(sample.percent_complete.round() as u64);
                pb.set_message(format!("{}/s", format_file_size(sample.speed_bytes_per_sec)));
            }
        });

        let cancel = handle.cancel_handle();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupt received, cancelling upload");
                cancel.cancel();
            }
        });

        let result = handle.await;
        ctrl_c.abort();

        match result {
            UploadResult::Success { sanitized_key } => {
                if let Some(pb) = pb {
                    pb.finish_with_message("Upload complete");
                }

                self.store
                    .append_history(HistoryEntry::new(&sanitized_key, &bucket))
                    .context("Failed to record upload history")?;

                if save_credentials {
                    self.store
                        .save_credentials(&SavedCredentials {
                            credentials: settings.credentials.clone(),
                            bucket_name: bucket.clone(),
                        })
                        .context("Failed to save credentials")?;
                }

                println!("Uploaded: s3://{}/{}", bucket, sanitized_key);
                Ok(())
            }
            UploadResult::Failure { kind, message } => {
                if let Some(pb) = pb {
                    pb.abandon_with_message("Upload failed");
                }
                debug!(kind = ?kind, "Upload failed");
                anyhow::bail!(message)
            }
            UploadResult::Aborted => {
                if let Some(pb) = pb {
                    pb.finish_and_clear();
                }
                Ok(())
            }
        }
    }

    /// Execute url command - print a pre-signed GET URL
    pub fn execute_url(&self, target: &str, bucket: Option<String>) -> Result<()> {
        let (target_bucket, key) = parse_object_ref(target)?;
        let settings = self.settings()?;
        let bucket = target_bucket
            .or(bucket)
            .or_else(|| settings.bucket.clone())
            .unwrap_or_default();

        let presigned = Self::issuer(&settings).issue_get_url(&settings.credentials, &bucket, &key)?;
        println!("{}", presigned.url);
        Ok(())
    }

    /// Execute history command
    pub fn execute_history(&self, clear: bool, format: OutputFormat) -> Result<()> {
        if clear {
            self.store.clear_history().context("Failed to clear history")?;
            println!("Upload history cleared");
            return Ok(());
        }

        let history = self.store.load_history().context("Failed to load history")?;

        match format {
            OutputFormat::Text => {
                if history.is_empty() {
                    println!("No uploads yet");
                }
                for entry in &history {
                    println!("s3://{}/{}", entry.bucket_name, entry.file_name);
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&history)?);
            }
        }

        Ok(())
    }

    /// Store the credentials resolved from flags and profile
    pub fn execute_credentials_save(&self, bucket: Option<String>) -> Result<()> {
        let settings = resolve_settings(
            &self.overrides,
            self.config.get_profile(self.profile.as_deref()),
            &self.config.transfer,
            None,
        );

        if !settings.credentials.is_complete() {
            anyhow::bail!("Credentials are not set.");
        }
        let bucket_name = bucket
            .or(settings.bucket)
            .ok_or_else(|| anyhow::anyhow!("Bucket name is not set."))?;

        self.store
            .save_credentials(&SavedCredentials {
                credentials: settings.credentials,
                bucket_name,
            })
            .context("Failed to save credentials")?;

        println!("Credentials saved");
        Ok(())
    }

    pub fn execute_credentials_show(&self) -> Result<()> {
        match self.store.load_credentials()? {
            Some(saved) => {
                println!("Access key: {}", saved.credentials.access_key_id);
                println!("Secret key: ********");
                println!("Region:     {}", saved.credentials.region);
                println!("Bucket:     {}", saved.bucket_name);
            }
            None => println!("No stored credentials"),
        }
        Ok(())
    }

    pub fn execute_credentials_clear(&self) -> Result<()> {
        self.store
            .clear_credentials()
            .context("Failed to clear credentials")?;
        println!("Stored credentials cleared");
        Ok(())
    }
}

/// Human-readable size, 1024-based
pub fn format_file_size(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

    if bytes.is_nan() || bytes <= 0.0 {
        return "0 Bytes".to_string();
    }

    let exponent = (bytes.ln() / 1024f64.ln()).floor().clamp(0.0, (UNITS.len() - 1) as f64);
    let value = bytes / 1024f64.powi(exponent as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exponent as usize])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn profile() -> Profile {
        Profile {
            access_key: "profile-ak".to_string(),
            secret_key: "profile-sk".to_string(),
            region: Some("eu-west-1".to_string()),
            bucket: Some("profile-bucket".to_string()),
            endpoint: Some("http://localhost:9000".to_string()),
            addressing_style: AddressingStyle::VirtualHosted,
        }
    }

    fn saved() -> SavedCredentials {
        SavedCredentials {
            credentials: Credentials::new("saved-ak", "saved-sk", "us-west-2"),
            bucket_name: "saved-bucket".to_string(),
        }
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0.0), "0 Bytes");
        assert_eq!(format_file_size(1023.0), "1023 Bytes");
        assert_eq!(format_file_size(1024.0), "1 KB");
        assert_eq!(format_file_size(1536.0), "1.5 KB");
        assert_eq!(format_file_size(1048576.0), "1 MB");
        assert_eq!(format_file_size(5.0 * 1024.0 * 1024.0 * 1024.0), "5 GB");
        assert_eq!(format_file_size(1024f64.powi(5)), "1024 TB");
    }

    #[test]
    fn test_flags_win_over_profile() {
        let overrides = Overrides {
            access_key: Some("flag-ak".to_string()),
            secret_key: Some("flag-sk".to_string()),
            region: Some("ap-south-1".to_string()),
            ..Overrides::default()
        };
        let settings = resolve_settings(
            &overrides,
            Some(&profile()),
            &TransferSettings::default(),
            Some(&saved()),
        );

        assert_eq!(settings.credentials, Credentials::new("flag-ak", "flag-sk", "ap-south-1"));
        assert_eq!(settings.bucket.as_deref(), Some("profile-bucket"));
        assert_eq!(settings.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(settings.addressing_style, AddressingStyle::VirtualHosted);
    }

    #[test]
    fn test_keys_come_from_one_source() {
        // An access key flag alone does not borrow the profile's secret
        let overrides = Overrides {
            access_key: Some("flag-ak".to_string()),
            ..Overrides::default()
        };
        let settings = resolve_settings(
            &overrides,
            Some(&profile()),
            &TransferSettings::default(),
            Some(&saved()),
        );
        assert_eq!(settings.credentials.access_key_id, "flag-ak");
        assert_eq!(settings.credentials.secret_access_key, "");
        assert!(!settings.credentials.is_complete());

        // Profile keys keep the profile region, not the stored one
        let settings = resolve_settings(
            &Overrides::default(),
            Some(&profile()),
            &TransferSettings::default(),
            Some(&saved()),
        );
        assert_eq!(settings.credentials, Credentials::new("profile-ak", "profile-sk", "eu-west-1"));
    }

    #[test]
    fn test_stored_credentials_fill_gaps() {
        let settings = resolve_settings(
            &Overrides::default(),
            Some(&Profile::default()),
            &TransferSettings::default(),
            Some(&saved()),
        );

        assert_eq!(settings.credentials, saved().credentials);
        assert_eq!(settings.bucket.as_deref(), Some("saved-bucket"));
        assert_eq!(settings.endpoint, None);
    }

    #[test]
    fn test_profile_without_region() {
        let config: Config = serde_yaml::from_str(
            r#"
profiles:
  bucket-only:
    bucket: team-bucket
  keys:
    access_key: yaml-ak
    secret_key: yaml-sk
"#,
        )
        .unwrap();

        // No keys in the profile: the stored set is used whole
        let settings = resolve_settings(
            &Overrides::default(),
            config.get_profile(Some("bucket-only")),
            &config.transfer,
            Some(&saved()),
        );
        assert_eq!(settings.credentials, saved().credentials);
        assert_eq!(settings.bucket.as_deref(), Some("team-bucket"));

        // Keys but no region: the fallback region, not the stored region
        let settings = resolve_settings(
            &Overrides::default(),
            config.get_profile(Some("keys")),
            &config.transfer,
            Some(&saved()),
        );
        assert_eq!(settings.credentials, Credentials::new("yaml-ak", "yaml-sk", DEFAULT_REGION));
    }

    #[test]
    fn test_region_fallback() {
        let settings = resolve_settings(&Overrides::default(), None, &TransferSettings::default(), None);
        assert_eq!(settings.credentials.region, DEFAULT_REGION);
    }

    #[test]
    fn test_insecure_flag() {
        let overrides = Overrides {
            insecure: true,
            ..Overrides::default()
        };
        let settings = resolve_settings(&overrides, None, &TransferSettings::default(), None);
        assert!(settings.transfer.insecure_tls);
        assert!(!settings.credentials.is_complete());
    }

    #[test]
    fn test_credentials_commands() {
        let mut config = Config::new();
        config.profiles.insert("default".to_string(), profile());
        let handler = CLIHandler::new(config, None, Overrides::default(), MemoryStore::new());

        handler.execute_credentials_save(None).unwrap();
        let stored = handler.store().load_credentials().unwrap().unwrap();
        assert_eq!(stored.credentials, Credentials::new("profile-ak", "profile-sk", "eu-west-1"));
        assert_eq!(stored.bucket_name, "profile-bucket");

        handler.execute_credentials_show().unwrap();
        handler.execute_credentials_clear().unwrap();
        assert!(handler.store().load_credentials().unwrap().is_none());
    }

    #[test]
    fn test_credentials_save_requires_keys() {
        let handler = CLIHandler::new(Config::new(), None, Overrides::default(), MemoryStore::new());
        assert!(handler.execute_credentials_save(Some("b".to_string())).is_err());
    }

    #[test]
    fn test_history_clear() {
        let handler = CLIHandler::new(Config::new(), None, Overrides::default(), MemoryStore::new());
        handler
            .store()
            .append_history(HistoryEntry::new("a.txt", "bucket"))
            .unwrap();
        handler.execute_history(false, OutputFormat::Json).unwrap();
        handler.execute_history(true, OutputFormat::Text).unwrap();
        assert!(handler.store().load_history().unwrap().is_empty());
    }

    #[test]
    fn test_url_requires_bucket() {
        let overrides = Overrides {
            access_key: Some("AKIA".to_string()),
            secret_key: Some("secret".to_string()),
            region: Some("us-east-1".to_string()),
            ..Overrides::default()
        };
        let handler = CLIHandler::new(Config::new(), None, overrides, MemoryStore::new());

        let err = handler.execute_url("report.pdf", None).unwrap_err();
        assert_eq!(err.to_string(), "Bucket name is not set.");
        assert!(handler.execute_url("s3://bucket/report.pdf", None).is_ok());
    }
}
