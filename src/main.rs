use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use unbundle::commands::check::CheckResult;
use unbundle_core::provision::{ASSET_DIR, ENTRY_SUBDIR};
use unbundle_core::{Layout, ProvisionError};

#[derive(Parser)]
#[command(name = "unbundle")]
#[command(about = "Extract bundled archive assets into the application data directory")]
#[command(version)]
struct Cli {
    /// Data root (defaults to the platform's local data directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Directory under the data root that holds extracted assets
    #[arg(long, global = true, default_value = ASSET_DIR)]
    asset_dir: String,

    /// Subdirectory shared by the archive and the asset directory
    #[arg(long, global = true, default_value = ENTRY_SUBDIR)]
    subdir: String,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the archive unless every manifest entry is already present
    Run {
        /// Zip archive to extract from
        #[arg(long)]
        archive: PathBuf,
        /// Manifest listing the expected files
        #[arg(long)]
        manifest: PathBuf,
        /// Worker threads (defaults to one per manifest entry)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Report whether extraction is needed
    Check {
        /// Manifest listing the expected files
        #[arg(long)]
        manifest: PathBuf,
    },
    /// Delete the extracted asset directory
    Reset,
    /// List the archive entries under the subdirectory
    List {
        /// Zip archive to inspect
        #[arg(long)]
        archive: PathBuf,
        /// Print a manifest document instead of plain names
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn layout(cli: &Cli) -> Result<Layout, ProvisionError> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => Layout::default_root()?,
    };
    Ok(Layout::new(root)
        .with_asset_dir(cli.asset_dir.as_str())
        .with_subdir(cli.subdir.as_str()))
}

fn fail(e: &ProvisionError) -> ! {
    eprintln!("Error: {}", e);
    eprintln!("{}", e.user_message());
    process::exit(2);
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Run {
            archive,
            manifest,
            workers,
        } => {
            let layout = layout(&cli).unwrap_or_else(|e| fail(&e));
            let entries_dir = layout.entries_dir();
            match unbundle::commands::run::run(archive, manifest, layout, *workers) {
                Ok(outcome) => {
                    println!("{}", outcome.status_message());
                    println!("Assets in {}", entries_dir.display());
                }
                Err(e) => fail(&e),
            }
        }
        Commands::Check { manifest } => {
            let layout = layout(&cli).unwrap_or_else(|e| fail(&e));
            match unbundle::commands::check::run(manifest, &layout) {
                Ok(CheckResult::Complete) => {
                    println!("All assets present in {}", layout.entries_dir().display());
                }
                Ok(CheckResult::Missing { entries }) => {
                    println!("Extraction needed");
                    if entries.is_empty() {
                        println!("Directory not found: {}", layout.entries_dir().display());
                    }
                    for entry in entries {
                        println!("  missing: {}", entry);
                    }
                    process::exit(1);
                }
                Err(e) => fail(&e),
            }
        }
        Commands::Reset => {
            let layout = layout(&cli).unwrap_or_else(|e| fail(&e));
            match unbundle::commands::reset::run(&layout) {
                Ok(cleared) => println!("Deleted {}", cleared.display()),
                Err(e) => fail(&e),
            }
        }
        Commands::List { archive, json } => {
            match unbundle::commands::list::run(archive, &cli.subdir) {
                Ok(manifest) if *json => match serde_json::to_string_pretty(&manifest) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        process::exit(2);
                    }
                },
                Ok(manifest) => {
                    for entry in manifest.iter() {
                        println!("{}", entry);
                    }
                }
                Err(e) => fail(&e),
            }
        }
    }
}
