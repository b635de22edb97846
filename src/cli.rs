use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "wiz",
    about = "Environment definition manager: resolve package requests into a reproducible environment",
    version,
    long_about = None
)]
pub struct Cli {
    /// Registry paths searched for definition files.
    #[arg(
        long = "path",
        global = true,
        env = "WIZ_REGISTRY_PATHS",
        value_delimiter = ':'
    )]
    pub paths: Vec<PathBuf>,

    /// Maximum discovery depth (0 searches only directly under each path).
    #[arg(long, global = true)]
    pub max_depth: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered packages and command aliases.
    List(ListArgs),
    /// Search definitions matching the given requests.
    Search(SearchArgs),
    /// Display the definition best matching a request.
    View(ViewArgs),
    /// Resolve requests into an ordered package environment.
    Use(UseArgs),
    /// Write a definition file into a directory.
    Export(ExportArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// List command aliases instead of packages.
    #[arg(long)]
    pub commands: bool,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Requests matched against identifiers and descriptions.
    #[arg(required = true)]
    pub requests: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ViewArgs {
    /// Package request, e.g. "nuke[studio]>=11".
    pub request: String,
}

#[derive(Args, Debug)]
pub struct UseArgs {
    /// Package requests, resolved together.
    #[arg(required = true)]
    pub requests: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Target directory.
    pub directory: PathBuf,
    /// Package request selecting the definition to export.
    pub request: String,
    /// Replace the target file when it already exists.
    #[arg(long)]
    pub overwrite: bool,
}
