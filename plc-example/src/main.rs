use anyhow::{Context, Result, bail};
use clap::Parser;
use plc_common::DirectoryClient;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(about = "Resolve a did:plc DID against a directory or mirror")]
struct Cli {
    /// Base URL of the directory (e.g. http://localhost:8111)
    #[arg(long, default_value = "https://plc.directory")]
    directory_url: String,

    /// The DID to resolve (did:plc:...)
    did: String,

    /// Also print the raw operation log for the DID
    #[arg(long)]
    audit: bool,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if !cli.did.starts_with("did:plc:") {
        bail!("expected a did:plc DID, got {}", cli.did);
    }

    let client = DirectoryClient::new(&cli.directory_url);

    let document = client
        .resolve(&cli.did)
        .await
        .with_context(|| format!("failed to resolve {}", cli.did))?;

    println!("{}", serde_json::to_string_pretty(&document)?);

    if cli.audit {
        let entries = client
            .audit_log(&cli.did)
            .await
            .context("failed to fetch audit log")?;
        eprintln!("\n--- operation log ({} entries) ---", entries.len());
        for entry in entries {
            println!("{}", serde_json::to_string(&entry)?);
        }
    }

    Ok(())
}
