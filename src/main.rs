use anyhow::Result;
use clap::Parser;
use std::env;
use workerlink::cli::{self, Cli};
use workerlink::config::HostConfig;

fn main() -> Result<()> {
    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => HostConfig::load_from_file(path)?,
        None => HostConfig::load()?,
    };
    config.apply_env_overrides();
    config.validate()?;

    // Initialize logging based on config
    let level = config.logging.level.to_lowercase();
    let default_directive = format!("workerlink={level},workerlink_host={level}");
    let env_override = env::var("RUST_LOG").unwrap_or_default();
    let combined_filter = if env_override.trim().is_empty() {
        default_directive
    } else if env_override.contains("workerlink") {
        env_override
    } else {
        format!("{},{}", env_override, default_directive)
    };

    tracing_subscriber::fmt()
        .with_env_filter(combined_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let output = cli::execute(&args.command, &config)?;
    println!("{}", output);
    Ok(())
}
