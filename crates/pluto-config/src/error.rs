//! Errors from loading and saving settings.

use std::path::PathBuf;

/// Everything that can go wrong with `pluto.ron`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file or its directory could not be written.
    #[error("cannot write {}: {source}", path.display())]
    Write {
        /// File that was being written.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid RON for [`crate::Config`].
    #[error("invalid settings in {}: {source}", path.display())]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    /// Settings could not be rendered as RON.
    #[error("cannot serialize settings: {0}")]
    Serialize(#[source] ron::Error),

    /// No directory was given and the platform has no config location.
    #[error("no configuration directory available")]
    NoConfigDir,
}
