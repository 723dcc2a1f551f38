//! tracedoc CLI tool
//!
//! ## Commands
//!
//! - `generate <project.toml>`: generate every templated document of a project
//! - `check <path>`: validate the directive grammar of a template file or directory
//! - `matrix <project.toml> --truth <Entity>`: generate, then print a traceability matrix
//!
//! Set `RUST_LOG` to change log verbosity (defaults to `info`).

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracedoc_core::{
    config::get_content,
    pipeline::{DocumentCompiler, GenerateResult},
    tag::{extract_tags, Tag},
    TraceDocError,
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "tracedoc")]
#[command(author, version, about = "Generate traceable documentation from directive templates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate all documents of a project
    Generate {
        /// Project configuration file
        project: PathBuf,

        /// Write documents here instead of the configured output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print diagnostics for every document
        #[arg(short, long)]
        verbose: bool,
    },

    /// Check the directive grammar of templates without resolving them
    Check {
        /// Template file, or a directory walked recursively
        path: PathBuf,
    },

    /// Generate all documents, then print the traceability matrix of one truth entity
    Matrix {
        /// Project configuration file
        project: PathBuf,

        /// Truth entity id, name or abbreviation
        #[arg(short, long)]
        truth: String,

        /// Emit JSON instead of a text table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            project,
            output,
            verbose,
        } => {
            let mut compiler = DocumentCompiler::from_config_file(&project)?;
            let results = compiler.generate_all();
            report(&results, verbose);

            let written = match output {
                Some(dir) => compiler.write_results_to(&results, &dir)?,
                None => compiler.write_results(&results)?,
            };
            for path in &written {
                println!("✓ {}", path.display());
            }

            let stats = compiler.stats();
            println!(
                "\n{} generated, {} failed, {} unresolved directives, {} passes",
                stats.generated, stats.failed, stats.unresolved, stats.total_passes
            );
            if stats.failed > 0 {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Check { path } => {
            let mut failures = 0;
            let mut checked = 0;
            for entry in WalkDir::new(&path).sort_by_file_name() {
                let entry = entry.map_err(TraceDocError::from)?;
                if !entry.file_type().is_file() || is_hidden(entry.path()) {
                    continue;
                }
                checked += 1;
                if let Err(e) = check_file(entry.path()) {
                    eprintln!("✗ {}: {e}", entry.path().display());
                    failures += 1;
                }
            }
            println!("\n{checked} files checked, {failures} with errors");
            if failures > 0 {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Matrix {
            project,
            truth,
            json,
        } => {
            let mut compiler = DocumentCompiler::from_config_file(&project)?;
            let results = compiler.generate_all();
            report(&results, false);

            let matrix = compiler.matrix(&truth)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&matrix)?);
            } else {
                println!("{matrix}");
            }
            Ok(())
        }
    }
}

fn report(results: &[GenerateResult], verbose: bool) {
    for result in results {
        match &result.error {
            Some(e) => eprintln!("✗ {}: {e}", result.title),
            None if verbose => {
                println!(
                    "{} ({} passes{})",
                    result.title,
                    result.passes,
                    if result.converged { "" } else { ", pass limit reached" }
                );
                for diagnostic in &result.diagnostics {
                    println!("  {diagnostic}");
                }
            }
            None => {
                for diagnostic in result
                    .diagnostics
                    .iter()
                    .filter(|d| !d.is_unresolved_directive())
                {
                    println!("{}: {diagnostic}", result.title);
                }
            }
        }
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn check_file(path: &Path) -> Result<(), TraceDocError> {
    let text = get_content(path)?.replace("\r\n", "\n");
    let tags = extract_tags(&text)?;
    println!("{}: {} directives", path.display(), tags.len());
    for tag in &tags {
        print_tag(tag, 1)?;
    }
    Ok(())
}

/// Block contents are checked too, since they are resolved in a later pass.
fn print_tag(tag: &Tag, depth: usize) -> Result<(), TraceDocError> {
    println!("{}{}", "  ".repeat(depth), tag.raw());
    for nested in tag.nested_tags()? {
        print_tag(&nested, depth + 1)?;
    }
    Ok(())
}
