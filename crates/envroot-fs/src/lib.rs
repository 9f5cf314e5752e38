//! Filesystem primitives for envroot environments.
//!
//! This crate provides the leaf layer everything else builds on: pure
//! relative-path arithmetic (`pathmath`), the per-platform directory scheme of
//! an environment (`EnvironmentLayout`), idempotent link/copy/write operations
//! with an explicit overwrite policy (`FileMaterializer`), and the leveled
//! console reporter threaded through every mutating operation (`ProgressLogger`).

pub mod layout;
pub mod log;
pub mod materialize;
pub mod pathmath;

pub use layout::{ActivationFile, EnvironmentLayout, PlatformFamily};
pub use log::{IndentGuard, Level, ProgressLogger, SharedBuffer};
pub use materialize::{
    same_contents, FileMaterializer, LinkOutcome, MaterializeStats, OverwritePolicy, WriteOutcome,
};
pub use pathmath::{is_normalized_absolute, normalize, relative, CURRENT_DIR};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("filesystem I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("I/O error on {}: {source}", path.display())]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("no recognizable environment layout under {}", .0.display())]
    UnknownLayout(PathBuf),
    #[error("progress reporting misuse: {0}")]
    Progress(String),
}

impl FsError {
    pub(crate) fn at(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::PathIo { path, source }
    }
}
