//! CLI module for s3drop
//!
//! Command-line front end for the upload core: uploads with a progress bar,
//! pre-signed download links, upload history and stored credentials.
//!
//! # Usage
//!
//! ```bash
//! # Upload a file
//! s3drop upload ./report.pdf --bucket my-bucket
//!
//! # Upload and remember the credentials and bucket
//! s3drop upload ./report.pdf --bucket my-bucket --save-credentials
//!
//! # One-hour download link
//! s3drop url s3://my-bucket/report.pdf
//!
//! # Upload history
//! s3drop history
//! s3drop history --clear
//!
//! # Stored credentials
//! s3drop credentials show
//! ```

pub mod args;
pub mod handler;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config;
use crate::store::JsonFileStore;
use args::{Cli, Commands, CredentialsAction};
use handler::{CLIHandler, Overrides};

/// Run the CLI application
pub async fn run(cli: Cli) -> Result<()> {
    cli.validate().context("Invalid arguments")?;

    info!("Starting s3drop CLI");
    debug!("CLI arguments: {:?}", cli.command);

    let config = config::load_config(cli.config.as_deref(), cli.profile.as_deref())
        .context("Failed to get configuration")?;

    let store_path = match cli.store.clone() {
        Some(path) => path,
        None => JsonFileStore::default_path()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine the store location; pass --store"))?,
    };
    debug!(path = %store_path.display(), "Using store");

    let overrides = Overrides {
        access_key: cli.access_key,
        secret_key: cli.secret_key,
        region: cli.region,
        endpoint: cli.endpoint,
        insecure: cli.insecure,
    };

    let handler = CLIHandler::new(config, cli.profile, overrides, JsonFileStore::new(store_path));

    match cli.command {
        Commands::Upload {
            file,
            bucket,
            content_type,
            no_progress,
            save_credentials,
        } => {
            handler
                .execute_upload(&file, bucket, content_type, !no_progress, save_credentials)
                .await?;
        }

        Commands::Url { target, bucket } => {
            handler.execute_url(&target, bucket)?;
        }

        Commands::History { clear, format } => {
            handler.execute_history(clear, format)?;
        }

        Commands::Credentials { action } => match action {
            CredentialsAction::Save { bucket } => handler.execute_credentials_save(bucket)?,
            CredentialsAction::Show => handler.execute_credentials_show()?,
            CredentialsAction::Clear => handler.execute_credentials_clear()?,
        },
    }

    info!("Command completed successfully");
    Ok(())
}

/// Initialize logging; `RUST_LOG` wins over the `--log-level` flag
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
