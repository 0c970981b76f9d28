//! Fatal-startup error taxonomy (spec.md §7).
//!
//! Everything else — bad user input, transport request errors, transient I/O — is
//! surfaced through `err` files rather than propagated as a `Result`, per the loop's
//! propagation policy: only structural OS errors reach here.

use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum DaemonError {
    /// A slot or friend directory could not be created or opened.
    Directory { path: PathBuf, source: io::Error },
    /// The save file could not be opened or read.
    SaveFile { path: PathBuf, source: io::Error },
    /// The transport runtime failed to initialize.
    TransportInit(String),
    /// A FIFO that must exist for startup to proceed could not be created.
    Fifo { path: PathBuf, source: io::Error },
    /// Any other I/O failure encountered while the loop is running, not tied to a
    /// specific named path above.
    Io(io::Error),
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonError::Directory { path, source } => {
                write!(f, "cannot create directory {}: {source}", path.display())
            }
            DaemonError::SaveFile { path, source } => {
                write!(f, "cannot open save file {}: {source}", path.display())
            }
            DaemonError::TransportInit(msg) => write!(f, "transport initialization failed: {msg}"),
            DaemonError::Fifo { path, source } => {
                write!(f, "cannot create fifo {}: {source}", path.display())
            }
            DaemonError::Io(source) => write!(f, "{source}"),
        }
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DaemonError::Directory { source, .. } => Some(source),
            DaemonError::SaveFile { source, .. } => Some(source),
            DaemonError::TransportInit(_) => None,
            DaemonError::Fifo { source, .. } => Some(source),
            DaemonError::Io(source) => Some(source),
        }
    }
}

impl From<io::Error> for DaemonError {
    fn from(source: io::Error) -> DaemonError {
        DaemonError::Io(source)
    }
}

pub type DaemonResult<T> = Result<T, DaemonError>;
