//! Moving finished artifacts to their final location.
//!
//! Placement is the last step of a successful download: the engine hands over
//! a temporary file, the scheduler resolves a filename, and a
//! [`StoragePlacer`] moves the file into the destination directory. An
//! existing file is never clobbered unless overwrite was requested; instead
//! the first free `name (n).ext` is claimed atomically.

mod collision;
mod placer;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use collision::{candidate_names, split_extension};
pub use placer::FsPlacer;

/// Upper bound on `name (n).ext` candidates tried before giving up.
pub const MAX_COLLISION_CANDIDATES: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("create directory {}: {message}", path.display())]
    CreateDir { path: PathBuf, message: String },

    #[error("move {} to {}: {message}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        message: String,
    },

    #[error("no free filename for `{name}` in {}", dir.display())]
    Exhausted { dir: PathBuf, name: String },

    #[error("invalid filename `{0}`")]
    InvalidName(String),
}

/// Moves a completed artifact into place.
///
/// On success the artifact path no longer exists and the returned path is
/// the file's final location. On failure the artifact is left where it was.
pub trait StoragePlacer: Send + Sync + 'static {
    fn place(
        &self,
        artifact: &Path,
        directory: &Path,
        filename: &str,
        overwrite: bool,
    ) -> Result<PathBuf, PlacementError>;
}
