use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "kestrel",
    about = "Kestrel object engine operator tool",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Engine configuration file (TOML); built-in defaults when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a file as an object
    Put(PutArgs),
    /// Write an object's payload to stdout
    Get(GetArgs),
    /// Show an object's metadata
    Head(ObjectArgs),
    /// Replace an object's metadata
    Post(PostArgs),
    /// Write a tombstone for an object
    Delete(DeleteArgs),
    /// List every record in the object's partition
    List(ObjectArgs),
    /// Purge tombstones older than the reclaim age
    Reclaim,
    /// Print the ring partition of a hash
    Partition(PartitionArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ObjectArgs {
    pub device: String,
    pub account: String,
    pub container: String,
    pub object: String,
}

#[derive(Args)]
pub struct PutArgs {
    #[command(flatten)]
    pub target: ObjectArgs,
    pub file: PathBuf,
    /// X-Timestamp to commit with; defaults to now
    #[arg(long)]
    pub timestamp: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    #[command(flatten)]
    pub target: ObjectArgs,
    /// Byte range as START-END (end exclusive)
    #[arg(long)]
    pub range: Option<String>,
}

#[derive(Args)]
pub struct PostArgs {
    #[command(flatten)]
    pub target: ObjectArgs,
    /// Metadata entries as KEY=VALUE
    #[arg(required = true)]
    pub pairs: Vec<String>,
    /// X-Timestamp of the update; defaults to now
    #[arg(long)]
    pub timestamp: Option<String>,
}

#[derive(Args)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub target: ObjectArgs,
    #[arg(long)]
    pub timestamp: Option<String>,
}

#[derive(Args)]
pub struct PartitionArgs {
    pub hash: String,
}
