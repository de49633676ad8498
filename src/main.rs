use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod actions;
mod canonical;
mod deck;
mod error;
mod integrity;
mod matcher;
mod models;
mod normalize;
mod pipeline;
mod report;
mod resources;
mod source;
mod workbook;

#[derive(Parser)]
#[command(name = "competency-pipeline")]
#[command(about = "Builds the competency framework dataset from the workbook and the action deck", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the competency model from the workbook
    ExtractModel {
        #[arg(long, env = "COMPETENCY_WORKBOOK")]
        workbook: PathBuf,
        #[arg(long, default_value = "model.json")]
        out: PathBuf,
    },
    /// Extract raw development actions from the slide deck
    ExtractActions {
        #[arg(long, env = "COMPETENCY_DECK")]
        deck: PathBuf,
        #[arg(long, default_value = "actions.raw.json")]
        out: PathBuf,
    },
    /// Extract raw resource lists from the slide deck
    ExtractResources {
        #[arg(long, env = "COMPETENCY_DECK")]
        deck: PathBuf,
        #[arg(long, default_value = "resources.raw.json")]
        out: PathBuf,
    },
    /// Run the whole pipeline and write every document
    Build {
        #[arg(long, env = "COMPETENCY_WORKBOOK")]
        workbook: PathBuf,
        #[arg(long, env = "COMPETENCY_DECK")]
        deck: PathBuf,
        #[arg(long, env = "COMPETENCY_OUT_DIR", default_value = "data")]
        out_dir: PathBuf,
        /// Also write a markdown run report
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Check a merged dataset for gaps and broken references
    Check {
        #[arg(long)]
        data: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("competency_pipeline=info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::ExtractModel { workbook, out } => {
            let sheets = pipeline::read_sheets(&workbook)?;
            let extraction = workbook::extract_model(&sheets)
                .with_context(|| format!("failed to extract model from {}", workbook.display()))?;
            pipeline::write_json(&out, &extraction.model)?;
            println!(
                "Extracted {} competencies in {} clusters to {}.",
                extraction.model.competencies.len(),
                extraction.model.clusters.len(),
                out.display()
            );
            print_warnings(&extraction.warnings);
        }
        Commands::ExtractActions { deck, out } => {
            let slides = pipeline::read_slides(&deck)?;
            let extraction = actions::extract_actions(&slides);
            pipeline::write_json(&out, &extraction.actions)?;
            println!("Extracted {} raw actions to {}.", extraction.actions.len(), out.display());
            print_warnings(&extraction.warnings);
        }
        Commands::ExtractResources { deck, out } => {
            let slides = pipeline::read_slides(&deck)?;
            let extraction = resources::extract_resources(&slides);
            pipeline::write_json(&out, &extraction.resources)?;
            println!("Extracted {} raw resources to {}.", extraction.resources.len(), out.display());
            print_warnings(&extraction.warnings);
        }
        Commands::Build {
            workbook,
            deck,
            out_dir,
            report,
        } => {
            let output = pipeline::build(&workbook, &deck, &out_dir)?;
            let stats = &output.stats;
            println!("Documents written to {}.", out_dir.display());
            println!(
                "Matched {} of {} actions and {} of {} resources.",
                stats.matched_actions,
                output.raw_actions.len(),
                stats.matched_resources,
                output.raw_resources.len()
            );

            if !output.unmatched.is_empty() {
                println!(
                    "{} entries need manual review (see {}):",
                    output.unmatched.len(),
                    out_dir.join(pipeline::UNMATCHED_FILE).display()
                );
                for entry in &output.unmatched {
                    println!("- [{}] slide {} '{}': {}", entry.kind, entry.slide, entry.line, entry.reason);
                }
            }
            print_warnings(&output.warnings);

            if let Some(path) = report {
                write_report(&path, &output)?;
                println!("Report written to {}.", path.display());
            }
        }
        Commands::Check { data } => {
            let dataset = pipeline::load_dataset(&data)?;
            let integrity = integrity::check(&dataset);
            print!("{}", report::render_integrity(&integrity));
            println!("{} gaps found in {}.", integrity.gap_count(), data.display());
            if !integrity.is_consistent() {
                anyhow::bail!(
                    "{} referential integrity violations in {}",
                    integrity.violations.len(),
                    data.display()
                );
            }
        }
    }

    Ok(())
}

fn write_report(path: &Path, output: &pipeline::PipelineOutput) -> anyhow::Result<()> {
    let integrity = integrity::check(&output.dataset);
    let generated_on = chrono::Local::now().date_naive();
    let body = report::build_report(generated_on, output, &integrity);
    std::fs::write(path, body).with_context(|| format!("failed to write report {}", path.display()))
}

fn print_warnings(warnings: &[models::Warning]) {
    if warnings.is_empty() {
        return;
    }
    println!("{} warnings:", warnings.len());
    for warning in warnings {
        println!("- {}: {}", warning.stage, warning.message);
    }
}
