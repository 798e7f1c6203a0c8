use anyhow::{Context, Result};
use clap::Parser;

use registry_sync::{init_tracing, Cli, OutputFormat, SyncPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.config();

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config.public_profile())?);
        return Ok(());
    }

    let pipeline = SyncPipeline::from_config(&config).context("failed to build sync pipeline")?;
    let report = pipeline
        .run(cli.options())
        .await
        .with_context(|| format!("registry sync failed for {}", config.registry_path().display()))?;

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!(
                "{} rows fetched, {} carried forward, {} geocoded, {} dropped, {} persisted{}",
                report.remote_rows,
                report.carried_forward,
                report.enrichment.geocoded,
                report.dropped,
                report.persisted_rows,
                if report.dry_run { " (dry run)" } else { "" }
            );
        }
    }
    Ok(())
}
