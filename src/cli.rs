use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` wins when set.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Replace the sidebar navigation items with the rows of a spreadsheet.
    Sync(SyncArgs),
    /// Download the current navigation config.
    Pull(PullArgs),
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// YAML settings file (site_url, client_id, ...). Environment variables override it.
    #[arg(long)]
    pub settings: Option<String>,

    /// Use a local directory as the document store instead of SharePoint.
    #[arg(long)]
    pub store_dir: Option<String>,

    /// Document location relative to the site (or to --store-dir).
    #[arg(long)]
    pub file_path: Option<String>,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Spreadsheet with Title/Url/ParentId[/Order/Id] columns (.xlsx, .xls, .ods, .csv).
    #[arg(env = "EXCEL_FILE")]
    pub spreadsheet: String,

    /// Only print the converted items; do not touch the document store.
    #[arg(long)]
    pub dry_run: bool,

    /// Host substring that marks a link as internal (default: the site's host).
    #[arg(long)]
    pub tenant_host: Option<String>,

    /// Write the merged document here if uploading it fails.
    #[arg(long)]
    pub backup: Option<String>,

    /// Also refresh `lastModified` and `modifiedBy`.
    #[arg(long)]
    pub stamp: bool,

    /// Author recorded in new or stamped documents.
    #[arg(long)]
    pub author: Option<String>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Args)]
pub struct PullArgs {
    /// Output file (default: stdout).
    #[arg(long)]
    pub out: Option<String>,

    /// Overwrite an existing output file.
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}
