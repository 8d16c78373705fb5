//! CLI argument parsing

use clap::{Parser, Subcommand};
use pcipaths_core::{Column, Predicate};
use std::path::PathBuf;

/// Parse a `column=value` match
fn parse_predicate(s: &str) -> Result<Predicate, String> {
    s.parse().map_err(|e| format!("{}", e))
}

/// Parse a column name
fn parse_column(s: &str) -> Result<Column, String> {
    s.parse().map_err(|e| format!("{}", e))
}

#[derive(Parser)]
#[command(name = "pcipaths")]
#[command(
    author,
    version,
    about = "List PCI device info with ACPI and UEFI device paths",
    long_about = None
)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the device dump comes from
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Saved ioreg or InstanceId dump to read instead of querying the OS ("-" for stdin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

/// Device selection and column options
#[derive(clap::Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only show objects with this name from the device tree (e.g. GFX0)
    #[arg(short, long)]
    pub find_name: Option<String>,

    /// Only show devices where COLUMN equals VALUE (case-insensitive, repeatable)
    #[arg(short = 'm', long = "match", value_name = "COLUMN=VALUE", value_parser = parse_predicate)]
    pub matches: Vec<Predicate>,

    /// Columns to show (comma-separated, see list-columns)
    #[arg(long, value_delimiter = ',', value_parser = parse_column)]
    pub columns: Vec<Column>,

    /// Display configuration file (TOML format)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl FilterArgs {
    /// Check if any device selection was requested
    pub fn has_filter(&self) -> bool {
        self.find_name.is_some() || !self.matches.is_empty()
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List PCI devices with their ACPI and device paths
    List {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Export device properties to a plist file
    Export {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        filter: FilterArgs,

        /// Output plist file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List the column names accepted by --columns and --match
    ListColumns,
}
