//! Crash-safe artifact writes and owner-only permissions.
//!
//! Every session artifact is written through [`StagedWrite`]: the bytes land
//! in a hidden temporary file in the target's directory, are flushed to disk,
//! and only then renamed over the target. A reader therefore sees either the
//! previous complete file or the new complete file, never a partial one.
//! Dropping a [`StagedWrite`] without committing removes the temporary file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Suffix shared by every staged temporary file.
pub const STAGING_SUFFIX: &str = ".tmp";

/// Bytes written to a temporary sibling of `target`, not yet visible there.
#[derive(Debug)]
pub struct StagedWrite {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    /// Writes `contents` to a temporary file next to `target` and syncs it.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the temporary file cannot be
    /// created, written, or synced.
    pub fn stage(target: &Path, contents: &[u8]) -> io::Result<Self> {
        let dir = target
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("durable write target has no file name: {}", target.display()),
                )
            })?;

        let mut file = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(STAGING_SUFFIX)
            .tempfile_in(dir)?;
        file.write_all(contents)?;
        file.as_file().sync_all()?;
        set_owner_only_permissions(file.path())?;

        Ok(Self {
            file,
            target: target.to_path_buf(),
        })
    }

    /// Path of the temporary file holding the staged bytes.
    #[must_use]
    pub fn staged_path(&self) -> &Path {
        self.file.path()
    }

    /// Final location the staged bytes will be renamed to.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Atomically renames the staged file over the target.
    ///
    /// # Errors
    ///
    /// Returns the rename error; the temporary file is removed in that case.
    pub fn commit(self) -> io::Result<()> {
        let Self { file, target } = self;
        file.persist(&target).map_err(|error| error.error)?;
        sync_parent_dir(&target);
        debug!(path = %target.display(), "committed durable write");
        Ok(())
    }
}

/// Stages and commits `contents` to `target` in one step.
///
/// # Errors
///
/// Returns any I/O error from staging or renaming.
pub fn write_durably(target: &Path, contents: &[u8]) -> io::Result<()> {
    StagedWrite::stage(target, contents)?.commit()
}

/// Removes `target` and syncs its directory so the removal survives a crash.
/// Returns `false` when there was nothing to remove.
///
/// # Errors
///
/// Returns any I/O error other than the file being absent.
pub fn remove_durably(target: &Path) -> io::Result<bool> {
    match fs::remove_file(target) {
        Ok(()) => {
            sync_parent_dir(target);
            Ok(true)
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error),
    }
}

/// Returns true for leftover temporary files produced by [`StagedWrite`].
#[must_use]
pub fn is_staging_leftover(file_name: &str) -> bool {
    file_name.starts_with('.') && file_name.ends_with(STAGING_SUFFIX)
}

/// Creates `dir` (and parents) and restricts it to the owner.
///
/// An existing directory with broader permissions is tightened when
/// possible; a directory the caller cannot chmod (shared mount, foreign
/// owner) is used as is with a warning.
///
/// # Errors
///
/// Returns the I/O error when the directory cannot be created.
pub fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    ensure_private_dir_with(dir, |path, perms| fs::set_permissions(path, perms))
}

fn ensure_private_dir_with(
    dir: &Path,
    set_permissions: impl FnOnce(&Path, fs::Permissions) -> io::Result<()>,
) -> io::Result<()> {
    create_dir_private(dir)?;
    tighten_dir_permissions(dir, set_permissions);
    Ok(())
}

#[cfg(unix)]
fn create_dir_private(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_dir_private(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn tighten_dir_permissions(dir: &Path, set_permissions: impl FnOnce(&Path, fs::Permissions) -> io::Result<()>) {
    use std::os::unix::fs::PermissionsExt;

    let mode = match fs::metadata(dir) {
        Ok(metadata) => metadata.permissions().mode() & 0o777,
        Err(error) => {
            warn!(path = %dir.display(), %error, "cannot read session directory permissions");
            return;
        }
    };
    if mode == 0o700 {
        return;
    }
    warn!(path = %dir.display(), mode = %format!("{mode:o}"), "restricting session directory to owner");
    if let Err(error) = set_permissions(dir, fs::Permissions::from_mode(0o700)) {
        warn!(path = %dir.display(), %error, "could not restrict session directory; continuing");
    }
}

#[cfg(not(unix))]
fn tighten_dir_permissions(_dir: &Path, _set_permissions: impl FnOnce(&Path, fs::Permissions) -> io::Result<()>) {}

/// Best-effort correction of group/other access on an existing file or
/// directory. Failures are logged, never returned.
#[cfg(unix)]
pub fn correct_permissions(path: &Path, wanted: u32) {
    use std::os::unix::fs::PermissionsExt;

    let Ok(metadata) = fs::metadata(path) else {
        return;
    };
    let mode = metadata.permissions().mode() & 0o777;
    if mode & 0o077 == 0 {
        return;
    }

    warn!(path = %path.display(), mode = %format!("{mode:o}"), "session artifact is readable by others; correcting");
    if let Err(error) = fs::set_permissions(path, fs::Permissions::from_mode(wanted)) {
        warn!(path = %path.display(), %error, "could not correct session permissions");
    }
}

#[cfg(not(unix))]
pub fn correct_permissions(_path: &Path, _wanted: u32) {}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn sync_parent_dir(target: &Path) {
    if let Some(parent) = target.parent()
        && let Ok(dir) = fs::File::open(parent)
    {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_target: &Path) {}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| is_staging_leftover(name))
            .collect()
    }

    #[cfg(unix)]
    #[test]
    fn test_private_dir_survives_refused_chmod() {
        use std::os::unix::fs::PermissionsExt;

        let tempdir = TempDir::new().unwrap();
        let dir = tempdir.path().join("shared");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        let refuse = |_: &Path, _: fs::Permissions| Err(io::Error::from(io::ErrorKind::PermissionDenied));
        ensure_private_dir_with(&dir, refuse).unwrap();

        let mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
        write_durably(&dir.join("cookies.json"), b"[]").unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_private_dir_tightens_broad_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tempdir = TempDir::new().unwrap();
        let dir = tempdir.path().join("open");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        ensure_private_dir(&dir).unwrap();

        let mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }

    #[test]
    fn test_remove_durably_reports_absence() {
        let tempdir = TempDir::new().unwrap();
        let target = tempdir.path().join("metadata.json");
        write_durably(&target, b"{}").unwrap();

        assert!(remove_durably(&target).unwrap());
        assert!(!target.exists());
        assert!(!remove_durably(&target).unwrap());
    }

    #[test]
    fn test_write_durably_creates_target() {
        let tempdir = TempDir::new().unwrap();
        let target = tempdir.path().join("cookies.json");

        write_durably(&target, b"[]").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"[]");
        assert!(leftovers(tempdir.path()).is_empty());
    }

    #[test]
    fn test_write_durably_replaces_existing_content() {
        let tempdir = TempDir::new().unwrap();
        let target = tempdir.path().join("state.json");
        write_durably(&target, b"{\"v\":1}").unwrap();

        write_durably(&target, b"{\"v\":2}").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"{\"v\":2}");
    }

    #[test]
    fn test_staged_write_is_invisible_until_commit() {
        let tempdir = TempDir::new().unwrap();
        let target = tempdir.path().join("metadata.json");
        write_durably(&target, b"old").unwrap();

        let staged = StagedWrite::stage(&target, b"new").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"old");
        assert!(staged.staged_path().exists());
        assert_eq!(staged.target(), target.as_path());

        staged.commit().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new");
    }

    #[test]
    fn test_dropped_staged_write_leaves_target_and_cleans_up() {
        let tempdir = TempDir::new().unwrap();
        let target = tempdir.path().join("cookies.json");
        write_durably(&target, b"old").unwrap();

        let staged = StagedWrite::stage(&target, b"new").unwrap();
        let staged_path = staged.staged_path().to_path_buf();
        drop(staged);

        assert!(!staged_path.exists());
        assert_eq!(fs::read(&target).unwrap(), b"old");
    }

    #[test]
    fn test_staging_leftover_naming() {
        assert!(is_staging_leftover(".cookies.json.a1B2c3.tmp"));
        assert!(!is_staging_leftover("cookies.json"));
        assert!(!is_staging_leftover(".hidden"));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_durably_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tempdir = TempDir::new().unwrap();
        let target = tempdir.path().join("cookies.json");
        write_durably(&target, b"[]").unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_private_dir_tightens_existing_directory() {
        use std::os::unix::fs::PermissionsExt;

        let tempdir = TempDir::new().unwrap();
        let dir = tempdir.path().join("profile");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        ensure_private_dir(&dir).unwrap();

        let mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }

    #[cfg(unix)]
    #[test]
    fn test_correct_permissions_strips_group_and_other() {
        use std::os::unix::fs::PermissionsExt;

        let tempdir = TempDir::new().unwrap();
        let path = tempdir.path().join("metadata.json");
        fs::write(&path, b"{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        correct_permissions(&path, 0o600);

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
