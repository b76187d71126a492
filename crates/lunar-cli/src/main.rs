//! Lunar command-line type checker
//!
//! Runs the inference engine over project files from a terminal:
//! type lints, symbol/expression type queries, and module listing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "lunar")]
#[command(about = "Structural type checker for Lua modules", long_about = None)]
#[command(version)]
struct Cli {
    /// Project root directory (modules resolve against it and its
    /// lua/ and lualib/ subdirectories)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Type-check files and report lints
    Check {
        /// Files to check
        files: Vec<PathBuf>,
        /// Output format
        #[arg(long, default_value = "pretty")]
        format: String,
    },

    /// Print the inferred type of a symbol or expression in a file
    Type {
        /// File providing the scope
        file: PathBuf,
        /// Symbol name or expression to evaluate
        expr: String,
        /// Print rendered documentation instead of the type name
        #[arg(long)]
        doc: bool,
    },

    /// List resolvable module names under a directory
    Modules {
        /// Directory to scan (defaults to the project root)
        dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { files, format } => commands::check::execute(&cli.root, files, &format),
        Commands::Type { file, expr, doc } => commands::type_of::execute(&cli.root, &file, &expr, doc),
        Commands::Modules { dir } => commands::modules::execute(&cli.root, dir),
    }
}
