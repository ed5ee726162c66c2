mod aggregate;
mod chart;
mod clean;
mod error;
mod extract;
mod report;
mod settings;
mod table;
mod totals;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use settings::Settings;

#[derive(Parser)]
#[command(
    name = "eprints_analyse",
    about = "EPrints software-term metadata extraction and analysis"
)]
struct Cli {
    /// Settings file (any format the config crate understands); defaults
    /// to an optional `analysis.*` next to the working directory.
    #[arg(short, long)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the XML export and build the deduplicated metadata table
    Extract {
        /// Root directory of per-site XML subdirectories
        #[arg(long)]
        xml_dir: Option<PathBuf>,
        /// Where to write the metadata CSV
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Aggregate the metadata table into summary CSVs and charts
    Analyse,
    /// Extract + analyse in one pipeline
    Run,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Extract { xml_dir, out } => {
            if let Some(dir) = xml_dir {
                settings.xml_data_dir = dir;
            }
            if let Some(out) = out {
                settings.metadata_file = out;
            }
            run_extract(&settings)
        }
        Commands::Analyse => run_analyse(&settings),
        Commands::Run => run_extract(&settings).and_then(|_| run_analyse(&settings)),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }

    result
}

fn run_extract(settings: &Settings) -> anyhow::Result<()> {
    println!(
        "Scanning {} for eprint records...",
        settings.xml_data_dir.display()
    );
    let (table, stats) = extract::extract(&settings.xml_data_dir, settings)?;
    table.write_csv(&settings.metadata_file)?;
    stats.print(&table);
    println!("Wrote {}", settings.metadata_file.display());
    Ok(())
}

fn run_analyse(settings: &Settings) -> anyhow::Result<()> {
    let summary = report::run_analyse(settings)?;
    summary.print();
    Ok(())
}
