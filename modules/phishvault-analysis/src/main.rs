use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use tracing_subscriber::EnvFilter;

use phishvault_analysis::decision::{load_policy, policy_schema};
use phishvault_analysis::Orchestrator;
use phishvault_common::{Config, ScanArtifact};

#[derive(Parser)]
#[command(name = "phishvault")]
#[command(about = "Phishing verdict pipeline: score captured artifacts and check policies")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score artifacts and print the enriched records as JSON
    Analyze {
        /// File holding one artifact object or an array of them (stdin when omitted)
        input: Option<PathBuf>,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a policy document
    CheckPolicy {
        path: PathBuf,
    },

    /// Print the JSON Schema of the policy document format
    PolicySchema,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("phishvault=info,phishvault_analysis=info,phishvault_graph=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Analyze { input, pretty } => analyze(input, pretty).await,
        Commands::CheckPolicy { path } => {
            let policy = load_policy(&path)?;
            println!(
                "{}: ok (version {}, {} rules, default {})",
                path.display(),
                policy.version,
                policy.rules.len(),
                policy.default_verdict
            );
            Ok(())
        }
        Commands::PolicySchema => {
            println!("{}", serde_json::to_string_pretty(&policy_schema())?);
            Ok(())
        }
    }
}

fn read_artifacts(input: Option<PathBuf>) -> Result<Vec<ScanArtifact>> {
    let raw = match &input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };

    let value: serde_json::Value = serde_json::from_str(&raw).context("input is not JSON")?;
    let mut artifacts: Vec<ScanArtifact> = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        other => vec![serde_json::from_value(other)?],
    };
    for artifact in &mut artifacts {
        if artifact.scan_id.trim().is_empty() {
            artifact.scan_id = uuid::Uuid::new_v4().to_string();
        }
        if artifact.final_url.trim().is_empty() {
            artifact.final_url = artifact.url.clone();
        }
    }
    Ok(artifacts)
}

async fn analyze(input: Option<PathBuf>, pretty: bool) -> Result<()> {
    let artifacts = read_artifacts(input)?;

    let config = Config::from_env()?;
    config.log_redacted();
    let orchestrator = Orchestrator::from_config(&config).await?;

    let results = join_all(
        artifacts
            .into_iter()
            .map(|artifact| orchestrator.process_artifact(artifact)),
    )
    .await;

    let mut enriched = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(artifact) => enriched.push(artifact),
            Err(e) => tracing::warn!(error = %e, "Artifact failed"),
        }
    }

    orchestrator.shutdown().await;

    let out = if pretty {
        serde_json::to_string_pretty(&enriched)?
    } else {
        serde_json::to_string(&enriched)?
    };
    println!("{out}");
    Ok(())
}
