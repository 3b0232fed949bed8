use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "arbor",
    about = "Arbor: lineage-aware catalog reads and partitioned tree rebuilds",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Part store directory (overrides storage.root).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Inspect and rebuild partitioned trees
    #[command(subcommand)]
    Tree(TreeCommand),
    /// Walk through branching, shadowing and part reuse on an in-memory catalog
    Demo(DemoArgs),
}

#[derive(Subcommand)]
pub enum TreeCommand {
    /// List the parts of a tree and check their boundaries
    Show(ShowArgs),
    /// Stream the entries of a tree
    Ls(LsArgs),
    /// Apply mutations from a JSON-lines file and save the new tree
    Apply(ApplyArgs),
}

#[derive(Args)]
pub struct ShowArgs {
    pub tree: String,
}

#[derive(Args)]
pub struct LsArgs {
    pub tree: String,
    /// Start strictly after this path
    #[arg(long)]
    pub after: Option<String>,
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Tree to rebuild; an empty tree when omitted
    #[arg(long)]
    pub base: Option<String>,
    /// One mutation per line: {"op":"put",...}, {"op":"delete",...} or {"op":"remove",...}
    pub mutations: PathBuf,
    /// Entries per written part (overrides rebuild.target_part_entries)
    #[arg(long)]
    pub target_part_entries: Option<usize>,
}

#[derive(Args)]
pub struct DemoArgs {
    /// Entries written on the main branch
    #[arg(long, default_value = "12")]
    pub entries: usize,
}
