use crate::log::ProgressLogger;
use crate::pathmath::normalize;
use crate::FsError;
use std::cell::Cell;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// What [`FileMaterializer::write_text`] does when the destination exists with
/// different content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Replace it; the artifact must always reflect the current template.
    Always,
    /// Keep it; the artifact is user-editable after the build.
    Preserve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Symlinked,
    Copied,
    AlreadyExists,
    SourceMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Unchanged,
    Overwritten,
    Preserved,
}

/// Counts of the operations that actually changed the filesystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MaterializeStats {
    pub dirs_created: u32,
    pub symlinks: u32,
    pub copies: u32,
    pub writes: u32,
    pub removals: u32,
}

impl MaterializeStats {
    pub fn mutations(&self) -> u32 {
        self.dirs_created + self.symlinks + self.copies + self.writes + self.removals
    }
}

/// Idempotent creation of directories, links, copies and text files.
///
/// Every operation is a no-op when its result is already in place, so a
/// partially materialized tree is completed by simply running again.
pub struct FileMaterializer<'a> {
    log: &'a ProgressLogger,
    stats: Cell<MaterializeStats>,
}

impl<'a> FileMaterializer<'a> {
    pub fn new(log: &'a ProgressLogger) -> Self {
        Self {
            log,
            stats: Cell::new(MaterializeStats::default()),
        }
    }

    #[inline]
    pub fn log(&self) -> &'a ProgressLogger {
        self.log
    }

    pub fn stats(&self) -> MaterializeStats {
        self.stats.get()
    }

    fn record(&self, f: impl FnOnce(&mut MaterializeStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    pub fn ensure_dir(&self, path: &Path) -> Result<(), FsError> {
        if path.exists() {
            self.log
                .info(format!("Directory {} already exists", path.display()));
            return Ok(());
        }
        self.log.info(format!("Creating {}", path.display()));
        fs::create_dir_all(path).map_err(FsError::at(path))?;
        self.record(|s| s.dirs_created += 1);
        Ok(())
    }

    /// Link `src` at `dst`, or copy it when symlinks are unwanted or unsupported.
    ///
    /// A missing source is a tolerated skip, and an existing destination
    /// (even a dangling link) is never touched.
    pub fn ensure_linked(
        &self,
        src: &Path,
        dst: &Path,
        prefer_symlink: bool,
    ) -> Result<LinkOutcome, FsError> {
        if !src.exists() {
            self.log
                .warn(format!("Cannot find file {} (bad symlink)", src.display()));
            return Ok(LinkOutcome::SourceMissing);
        }
        if dst.symlink_metadata().is_ok() {
            self.log
                .debug(format!("File {} already exists", dst.display()));
            return Ok(LinkOutcome::AlreadyExists);
        }
        self.ensure_parent(dst)?;

        if prefer_symlink && cfg!(unix) {
            self.log.info(format!("Symlinking {}", dst.display()));
            symlink(&normalize(src), dst)?;
            self.record(|s| s.symlinks += 1);
            return Ok(LinkOutcome::Symlinked);
        }

        self.log.info(format!("Copying to {}", dst.display()));
        if src.is_dir() {
            copy_tree(src, dst)?;
        } else {
            copy_with_metadata(src, dst)?;
        }
        self.record(|s| s.copies += 1);
        Ok(LinkOutcome::Copied)
    }

    /// Create a symlink at `link` whose target is stored exactly as given, so a
    /// relative `target` keeps resolving after the tree moves.
    pub fn ensure_alias(&self, target: &Path, link: &Path) -> Result<LinkOutcome, FsError> {
        if link.symlink_metadata().is_ok() {
            self.log
                .debug(format!("Link {} already exists", link.display()));
            return Ok(LinkOutcome::AlreadyExists);
        }
        if !cfg!(unix) {
            self.log.debug(format!(
                "Symlinks unsupported; not creating {}",
                link.display()
            ));
            return Ok(LinkOutcome::SourceMissing);
        }
        self.ensure_parent(link)?;
        self.log.info(format!(
            "Symlinking {} -> {}",
            link.display(),
            target.display()
        ));
        symlink(target, link)?;
        self.record(|s| s.symlinks += 1);
        Ok(LinkOutcome::Symlinked)
    }

    /// Copy a regular file (never symlink), replacing `dst` only when its bytes differ.
    pub fn ensure_copied(&self, src: &Path, dst: &Path) -> Result<LinkOutcome, FsError> {
        if !src.exists() {
            self.log
                .warn(format!("Cannot find file {}", src.display()));
            return Ok(LinkOutcome::SourceMissing);
        }
        if dst.is_file() && same_contents(src, dst)? {
            self.log
                .debug(format!("File {} already in place", dst.display()));
            return Ok(LinkOutcome::AlreadyExists);
        }
        self.ensure_parent(dst)?;
        if dst.symlink_metadata().is_ok() {
            fs::remove_file(dst).map_err(FsError::at(dst))?;
        }
        fs::copy(src, dst).map_err(FsError::at(dst))?;
        self.record(|s| s.copies += 1);
        Ok(LinkOutcome::Copied)
    }

    pub fn write_text(
        &self,
        dst: &Path,
        content: impl AsRef<[u8]>,
        policy: OverwritePolicy,
    ) -> Result<WriteOutcome, FsError> {
        let content = content.as_ref();
        if !dst.exists() {
            self.log.info(format!("Writing {}", dst.display()));
            fs::write(dst, content).map_err(FsError::at(dst))?;
            self.record(|s| s.writes += 1);
            return Ok(WriteOutcome::Created);
        }

        let existing = fs::read(dst).map_err(FsError::at(dst))?;
        if existing == content {
            self.log
                .info(format!("Content {} already in place", dst.display()));
            return Ok(WriteOutcome::Unchanged);
        }

        match policy {
            OverwritePolicy::Preserve => {
                self.log.notify(format!(
                    "File {} exists with different content; not overwriting",
                    dst.display()
                ));
                Ok(WriteOutcome::Preserved)
            }
            OverwritePolicy::Always => {
                self.log.notify(format!(
                    "Overwriting {} with new content",
                    dst.display()
                ));
                fs::write(dst, content).map_err(FsError::at(dst))?;
                self.record(|s| s.writes += 1);
                Ok(WriteOutcome::Overwritten)
            }
        }
    }

    /// Add read and execute bits for owner, group and other.
    #[cfg(unix)]
    pub fn make_executable(&self, path: &Path) -> Result<(), FsError> {
        use std::os::unix::fs::PermissionsExt;

        let old = fs::metadata(path).map_err(FsError::at(path))?.permissions().mode() & 0o7777;
        let new = (old | 0o555) & 0o7777;
        if new != old {
            fs::set_permissions(path, fs::Permissions::from_mode(new))
                .map_err(FsError::at(path))?;
        }
        self.log
            .info(format!("Changed mode of {} to {new:o}", path.display()));
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn make_executable(&self, path: &Path) -> Result<(), FsError> {
        self.log.debug(format!(
            "No execute bit to set on {} on this platform",
            path.display()
        ));
        Ok(())
    }

    /// Recursively delete `path`; returns whether anything was removed.
    pub fn remove_tree(&self, path: &Path) -> Result<bool, FsError> {
        if path.symlink_metadata().is_err() {
            self.log.info(format!(
                "Do not need to delete {}; already gone",
                path.display()
            ));
            return Ok(false);
        }
        self.log.notify(format!("Deleting tree {}", path.display()));
        if path.is_dir() && !path.symlink_metadata()?.file_type().is_symlink() {
            fs::remove_dir_all(path).map_err(FsError::at(path))?;
        } else {
            fs::remove_file(path).map_err(FsError::at(path))?;
        }
        self.record(|s| s.removals += 1);
        Ok(true)
    }

    /// Delete a single file if present.
    pub fn remove_file(&self, path: &Path) -> Result<bool, FsError> {
        if path.symlink_metadata().is_err() {
            return Ok(false);
        }
        self.log.info(format!("Deleting {}", path.display()));
        fs::remove_file(path).map_err(FsError::at(path))?;
        self.record(|s| s.removals += 1);
        Ok(true)
    }

    fn ensure_parent(&self, dst: &Path) -> Result<(), FsError> {
        if let Some(parent) = dst.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                self.log.info(format!(
                    "Creating parent directories for {}",
                    parent.display()
                ));
                fs::create_dir_all(parent).map_err(FsError::at(parent))?;
                self.record(|s| s.dirs_created += 1);
            }
        }
        Ok(())
    }
}

/// Whether two files hold the same bytes.
pub fn same_contents(a: &Path, b: &Path) -> Result<bool, FsError> {
    let meta_a = fs::metadata(a).map_err(FsError::at(a))?;
    let meta_b = fs::metadata(b).map_err(FsError::at(b))?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    Ok(fs::read(a).map_err(FsError::at(a))? == fs::read(b).map_err(FsError::at(b))?)
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> Result<(), FsError> {
    std::os::unix::fs::symlink(target, link).map_err(FsError::at(link))
}

#[cfg(not(unix))]
fn symlink(target: &Path, link: &Path) -> Result<(), FsError> {
    // Callers only reach this on unix; fall back to a copy elsewhere.
    copy_with_metadata(target, link)
}

/// Copy a file keeping its permissions and timestamps.
fn copy_with_metadata(src: &Path, dst: &Path) -> Result<(), FsError> {
    fs::copy(src, dst).map_err(FsError::at(dst))?;
    let meta = fs::metadata(src).map_err(FsError::at(src))?;
    let atime = filetime::FileTime::from_last_access_time(&meta);
    let mtime = filetime::FileTime::from_last_modification_time(&meta);
    filetime::set_file_times(dst, atime, mtime).map_err(FsError::at(dst))?;
    Ok(())
}

/// Recursive copy that recreates symlinks instead of following them.
fn copy_tree(src: &Path, dst: &Path) -> Result<(), FsError> {
    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| FsError::Io(std::io::Error::other(e)))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(FsError::at(&target))?;
            let perms = entry.metadata()?.permissions();
            fs::set_permissions(&target, perms).map_err(FsError::at(&target))?;
        } else if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path()).map_err(FsError::at(entry.path()))?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link_target, &target).map_err(FsError::at(&target))?;
            #[cfg(not(unix))]
            {
                let resolved = entry.path().parent().map_or(link_target.clone(), |p| p.join(&link_target));
                copy_with_metadata(&resolved, &target)?;
            }
        } else {
            copy_with_metadata(entry.path(), &target)?;
        }
    }
    Ok(())
}
