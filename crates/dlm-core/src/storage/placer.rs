//! Filesystem placer.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{candidate_names, PlacementError, StoragePlacer};

/// Places artifacts with `rename`/`hard_link`, copying when the artifact lives
/// on another filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsPlacer;

impl FsPlacer {
    pub fn new() -> Self {
        FsPlacer
    }

    fn place_overwrite(&self, artifact: &Path, dest: &Path) -> Result<(), PlacementError> {
        match fs::rename(artifact, dest) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::debug!("rename {} failed ({}), copying", artifact.display(), e);
                let dir = dest.parent().unwrap_or_else(|| Path::new("."));
                let staged = copy_beside(artifact, dir).map_err(|e| move_error(artifact, dest, &e))?;
                staged
                    .persist(dest)
                    .map_err(|e| move_error(artifact, dest, &e.error))?;
                remove_artifact(artifact);
                Ok(())
            }
        }
    }

    fn place_unique(&self, artifact: &Path, dir: &Path, filename: &str) -> Result<PathBuf, PlacementError> {
        // Set once hard links turn out not to work here; further candidates
        // are claimed with persist_noclobber instead.
        let mut staged: Option<NamedTempFile> = None;
        for candidate in candidate_names(filename) {
            let dest = dir.join(&candidate);
            if staged.is_none() {
                match fs::hard_link(artifact, &dest) {
                    Ok(()) => {
                        remove_artifact(artifact);
                        return Ok(dest);
                    }
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                    Err(e) => {
                        tracing::debug!("hard_link into {} failed ({}), copying", dir.display(), e);
                        staged = Some(copy_beside(artifact, dir).map_err(|e| move_error(artifact, &dest, &e))?);
                    }
                }
            }
            if let Some(tmp) = staged.take() {
                match tmp.persist_noclobber(&dest) {
                    Ok(_) => {
                        remove_artifact(artifact);
                        return Ok(dest);
                    }
                    Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => staged = Some(e.file),
                    Err(e) => return Err(move_error(artifact, &dest, &e.error)),
                }
            }
        }
        Err(PlacementError::Exhausted {
            dir: dir.to_path_buf(),
            name: filename.to_string(),
        })
    }
}

impl StoragePlacer for FsPlacer {
    fn place(
        &self,
        artifact: &Path,
        directory: &Path,
        filename: &str,
        overwrite: bool,
    ) -> Result<PathBuf, PlacementError> {
        if filename.is_empty()
            || filename == "."
            || filename == ".."
            || filename.contains(['/', '\\', '\0'])
        {
            return Err(PlacementError::InvalidName(filename.to_string()));
        }
        fs::create_dir_all(directory).map_err(|e| PlacementError::CreateDir {
            path: directory.to_path_buf(),
            message: e.to_string(),
        })?;

        let placed = if overwrite {
            let dest = directory.join(filename);
            self.place_overwrite(artifact, &dest)?;
            dest
        } else {
            self.place_unique(artifact, directory, filename)?
        };
        tracing::debug!("placed {} at {}", artifact.display(), placed.display());
        Ok(placed)
    }
}

fn copy_beside(artifact: &Path, dir: &Path) -> io::Result<NamedTempFile> {
    let mut tmp = tempfile::Builder::new().prefix(".dlm-").suffix(".place").tempfile_in(dir)?;
    let mut src = fs::File::open(artifact)?;
    io::copy(&mut src, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

fn remove_artifact(artifact: &Path) {
    if let Err(e) = fs::remove_file(artifact) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!("remove artifact {}: {}", artifact.display(), e);
        }
    }
}

fn move_error(from: &Path, to: &Path, e: &io::Error) -> PlacementError {
    PlacementError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact_in(dir: &Path, body: &[u8]) -> PathBuf {
        let path = dir.join(".dlm-artifact.part");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn creates_destination_and_moves_artifact() {
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let dest_dir = out.path().join("nested").join("dir");
        let artifact = artifact_in(staging.path(), b"payload");

        let placed = FsPlacer::new().place(&artifact, &dest_dir, "file.bin", false).unwrap();
        assert_eq!(placed, dest_dir.join("file.bin"));
        assert_eq!(fs::read(&placed).unwrap(), b"payload");
        assert!(!artifact.exists());
    }

    #[test]
    fn collisions_get_numbered_names() {
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(out.path().join("a.tar.gz"), b"old").unwrap();
        fs::write(out.path().join("a (1).tar.gz"), b"old").unwrap();

        let artifact = artifact_in(staging.path(), b"new");
        let placed = FsPlacer::new().place(&artifact, out.path(), "a.tar.gz", false).unwrap();
        assert_eq!(placed, out.path().join("a (2).tar.gz"));
        assert_eq!(fs::read(out.path().join("a.tar.gz")).unwrap(), b"old");
        assert_eq!(fs::read(&placed).unwrap(), b"new");
    }

    #[test]
    fn overwrite_replaces_existing() {
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(out.path().join("f.txt"), b"old").unwrap();
        let artifact = artifact_in(staging.path(), b"new");
        let placed = FsPlacer::new().place(&artifact, out.path(), "f.txt", true).unwrap();
        assert_eq!(placed, out.path().join("f.txt"));
        assert_eq!(fs::read(&placed).unwrap(), b"new");
        assert!(!artifact.exists());
    }

    #[test]
    fn rejects_path_like_names() {
        let staging = tempfile::tempdir().unwrap();
        let artifact = artifact_in(staging.path(), b"x");
        let err = FsPlacer::new()
            .place(&artifact, staging.path(), "../escape", false)
            .unwrap_err();
        assert_eq!(err, PlacementError::InvalidName("../escape".into()));
        assert!(artifact.exists());
    }

    #[test]
    fn destination_that_is_a_file_fails() {
        let staging = tempfile::tempdir().unwrap();
        let blocker = staging.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let artifact = artifact_in(staging.path(), b"x");
        let err = FsPlacer::new()
            .place(&artifact, &blocker.join("sub"), "f", false)
            .unwrap_err();
        assert!(matches!(err, PlacementError::CreateDir { .. }));
    }
}
