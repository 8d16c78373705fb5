//! Device sources
//!
//! A source produces one complete dump of the device tree. It either
//! succeeds with the full text or fails outright; nothing is parsed here.

use std::io::Read;
use std::path::PathBuf;
use std::process::Command;

use pcipaths_core::{PciPathError, Snapshot};
use thiserror::Error;

use crate::cli::SourceArgs;

/// Device source errors
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to read a dump file
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to start the dump command
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The dump command exited with an error
    #[error("{command} failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// No live source exists for this platform
    #[error("Querying the device tree is only supported on macOS; use --input with a saved dump")]
    Unsupported,
}

/// Something that can produce a device tree dump
pub trait DeviceSource {
    /// Short description for log messages
    fn describe(&self) -> String;

    /// Read the complete dump
    fn read_dump(&mut self) -> Result<String, SourceError>;
}

/// A saved dump on disk, or stdin for `-`
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl DeviceSource for FileSource {
    fn describe(&self) -> String {
        if self.path.as_os_str() == "-" {
            "stdin".to_string()
        } else {
            self.path.display().to_string()
        }
    }

    fn read_dump(&mut self) -> Result<String, SourceError> {
        let read_err = |source| SourceError::Read {
            path: self.describe(),
            source,
        };
        if self.path.as_os_str() == "-" {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text).map_err(read_err)?;
            Ok(text)
        } else {
            std::fs::read_to_string(&self.path).map_err(read_err)
        }
    }
}

/// Live IODeviceTree dump from `ioreg`
pub struct IoregSource;

impl IoregSource {
    const ARGS: [&'static str; 3] = ["-lw0", "-p", "IODeviceTree"];
}

impl DeviceSource for IoregSource {
    fn describe(&self) -> String {
        format!("ioreg {}", Self::ARGS.join(" "))
    }

    fn read_dump(&mut self) -> Result<String, SourceError> {
        if !cfg!(target_os = "macos") {
            return Err(SourceError::Unsupported);
        }
        let output = Command::new("ioreg")
            .args(Self::ARGS)
            .output()
            .map_err(|source| SourceError::Spawn {
                command: self.describe(),
                source,
            })?;
        if !output.status.success() {
            return Err(SourceError::CommandFailed {
                command: self.describe(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Pick the source selected on the command line
pub fn open_source(args: &SourceArgs) -> Box<dyn DeviceSource> {
    match &args.input {
        Some(path) => Box::new(FileSource::new(path.clone())),
        None => Box::new(IoregSource),
    }
}

/// Read and parse one snapshot from the selected source
pub fn load_snapshot(args: &SourceArgs) -> Result<Snapshot, PciPathError> {
    let mut source = open_source(args);
    log::info!("Reading device tree from {}", source.describe());
    let text = source
        .read_dump()
        .map_err(|e| PciPathError::SourceFailed(e.to_string()))?;
    log::debug!("Read {} bytes", text.len());
    Snapshot::parse(&text)
}
