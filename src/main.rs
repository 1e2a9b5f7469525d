mod aggregate;
mod artifact;
mod config;
mod error;
mod extract;
mod harvest;
mod heuristics;
mod normalize;
mod pipeline;

use clap::{Parser, Subcommand};
use config::Config;
use extract::DocumentContent;
use harvest::{DocumentHarvester, HarvestedFile};
use normalize::CurrencyNormalizer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tour_pricing", about = "Build per-category tour pricing from past invoices")]
struct Cli {
    /// TOML config file; defaults apply when omitted.
    #[arg(long, global = true, env = "TOUR_PRICING_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process every invoice under the root and publish the pricing artifact.
    Refresh {
        #[arg(long)]
        root: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run the heuristics on one file and print what they found.
    Inspect {
        file: PathBuf,
        /// Sheet rows to dump for tabular files.
        #[arg(long, default_value_t = 30)]
        rows: usize,
    },
    /// Print the published pricing as advisor context.
    Show {
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Refresh { root, output } => {
            if let Some(root) = root {
                cfg.harvest.root = root;
            }
            if let Some(output) = output {
                cfg.output_path = output;
            }
            let report = pipeline::run(Arc::new(cfg)).await?;
            info!(
                harvested = report.harvested,
                accepted = report.accepted,
                fallback = report.fallback_accepted,
                skipped = ?report.skipped,
                "Refresh statistics"
            );
            if let Some(meta) = &report.artifact {
                info!(
                    path = %meta.path.display(),
                    categories = meta.categories,
                    bytes = meta.size_bytes,
                    sha256 = %meta.sha256,
                    "Artifact written"
                );
            }
            println!("{}", artifact::render_context(&report.summaries));
        }
        Command::Inspect { file, rows } => inspect(&cfg, &file, rows)?,
        Command::Show { output } => {
            let path = output.unwrap_or(cfg.output_path);
            let summaries = artifact::load_summaries(&path)?;
            if summaries.is_empty() {
                println!("No pricing data published at {}", path.display());
            } else {
                println!("{}", artifact::render_context(&summaries));
            }
        }
    }

    Ok(())
}

/// Test extraction and resolution on a single document.
///
/// Usage: `cargo run -- inspect <file> [--rows N]`
fn inspect(cfg: &Config, path: &Path, rows: usize) -> Result<(), Box<dyn std::error::Error>> {
    let format = DocumentHarvester::new(&cfg.harvest)
        .classify(path)
        .ok_or_else(|| format!("Unsupported file type: {}", path.display()))?;
    info!(path = %path.display(), format = ?format, "Inspecting document");

    let doc = extract::load_document(&HarvestedFile {
        path: path.to_path_buf(),
        format,
    })?;

    match &doc.content {
        DocumentContent::Text(text) => {
            println!("\n--- Extracted Text (first 2000 chars) ---");
            println!("{}", text.chars().take(2000).collect::<String>());
            println!("--- End ---\n");
        }
        DocumentContent::Cells(cells) => {
            println!("\n--- First {rows} rows of sheet 1 ---");
            println!("{}", serde_json::to_string_pretty(&cells[..cells.len().min(rows)])?);
            println!("--- End ---\n");
        }
    }

    let (fields, rate) = match heuristics::analyze(&doc, cfg) {
        Ok(found) => found,
        Err(e) => {
            println!("✗ Skipped: {e}\n");
            return Ok(());
        }
    };
    println!("--- Fields ---");
    println!("{}", serde_json::to_string_pretty(&fields)?);
    println!("--- Resolved Rate ---");
    println!("{}", serde_json::to_string_pretty(&rate)?);

    let normalizer = CurrencyNormalizer::new(&cfg.normalize, cfg.resolver.fallback_policy);
    match normalizer.normalize(&rate, fields.category, doc.file_name()) {
        Ok(price) => {
            println!("--- Normalized ---");
            println!("{}", serde_json::to_string_pretty(&price)?);
        }
        Err(e) => println!("✗ Rejected: {e}"),
    }
    println!();

    Ok(())
}
