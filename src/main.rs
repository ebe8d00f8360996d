use anyhow::Result;
use s3drop::cli::{self, args::Cli};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    cli::init_logging(&cli.log_level);

    // One upload at a time: current_thread is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(cli::run(cli))
}
