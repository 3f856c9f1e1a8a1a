use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dcr_sdk::ResourceType;

#[derive(Parser)]
#[command(
    name = "dcr",
    about = "DCR: inspect and modify repository objects",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the repository base URI
    #[arg(long, global = true)]
    pub base_uri: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the PID, path and URI an identifier resolves to
    Resolve(ResolveArgs),
    /// Fetch an object and describe it
    Show(ObjectArgs),
    /// List the members of a container
    Members(ObjectArgs),
    /// Find the object containing another
    Parent(ObjectArgs),
    /// Create an object inside a transaction
    Create(CreateArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ResolveArgs {
    /// Identifier, `uuid:` id or repository URI
    pub id: String,
}

#[derive(Args)]
pub struct ObjectArgs {
    /// Identifier, `uuid:` id or repository URI
    pub pid: String,
}

#[derive(Args)]
pub struct CreateArgs {
    /// Object type (admin_unit, collection, folder, work, file, deposit_record, content_root)
    pub kind: ResourceType,
    /// Container to add the new object to
    #[arg(long)]
    pub parent: Option<String>,
    #[arg(long)]
    pub title: Option<String>,
    /// Use this identifier instead of minting one
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Include the password instead of masking it
    #[arg(long)]
    pub show_secrets: bool,
}
