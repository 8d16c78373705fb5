//! pcipaths - PCI device path inventory
//!
//! Lists every PCI function found in the OS device tree together with the
//! firmware-style paths needed to address it:
//!
//! - **ACPI path** - location in the ACPI namespace (`/PCI0.PEG0.GFX0`)
//! - **Device path** - UEFI PCI device path (`PciRoot(0x0)/Pci(0x1,0x0)`)
//!
//! The device tree is read from `ioreg` on macOS, or from a saved dump
//! (`--input`) in either the ioreg format or the Windows
//! `InstanceId KeyName Data` format.

mod cli;
mod commands;
mod source;

use clap::Parser;
use cli::{Cli, Commands, FilterArgs};
use pcipaths_core::{resolve, DisplayConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Set log level based on verbosity
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::List { source, filter } => {
            let config = load_display_config(&filter)?;
            let snapshot = source::load_snapshot(&source)?;
            let inventory = resolve(&snapshot);
            if commands::run_list(&inventory, &config) == 0 {
                report_no_match(&config);
            }
            Ok(())
        }
        Commands::Export {
            source,
            filter,
            output,
        } => {
            let config = load_display_config(&filter)?;
            let snapshot = source::load_snapshot(&source)?;
            let inventory = resolve(&snapshot);
            let count = commands::export::run_export(&inventory, &config, &output)?;
            if count == 0 {
                report_no_match(&config);
            }
            println!("Exported {} device paths to {}", count, output.display());
            Ok(())
        }
        Commands::ListColumns => {
            commands::list_columns();
            Ok(())
        }
    }
}

/// Build the display configuration from --config plus command-line flags
fn load_display_config(args: &FilterArgs) -> Result<DisplayConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            let config = DisplayConfig::from_toml_file(path)?;
            log::info!("Loaded display configuration from {:?}", path);
            config
        }
        None => DisplayConfig::default(),
    };

    // Command-line flags take precedence over the file
    if let Some(name) = &args.find_name {
        config.name = Some(name.clone());
    }
    if !args.columns.is_empty() {
        config.columns = args.columns.clone();
    }
    config.predicates.extend(args.matches.iter().cloned());

    if args.has_filter() {
        log::debug!(
            "Filtering on name {:?} and {} predicates",
            config.name,
            config.predicates.len()
        );
    }
    Ok(config)
}

/// Message for a run where no device survived the filters
fn no_match_message(config: &DisplayConfig) -> String {
    match &config.name {
        Some(name) => format!("No device matching '{}' was found!", name),
        None if !config.predicates.is_empty() => "No device matches the given filters!".to_string(),
        None => "No PCI devices located!".to_string(),
    }
}

/// Nothing matched: not an error, but the exit status says so
fn report_no_match(config: &DisplayConfig) -> ! {
    println!("{}", no_match_message(config));
    std::process::exit(1);
}
