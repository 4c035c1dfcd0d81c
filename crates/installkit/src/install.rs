//! Atomic placement of executables.
//!
//! A component can ship several binaries (containerd, its shim, `ctr`).
//! [`install_executables`] places them as a set: all are staged first, and
//! if any rename fails the ones already renamed are put back.

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Mode for installed binaries: owner rwx, group and other r-x.
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Copy `src` to `dest` as an executable, atomically.
///
/// The contents are staged in a temporary file next to `dest` (same
/// filesystem), synced, made executable, then renamed over `dest`. A crash
/// at any point leaves either the old binary or the new one, never a
/// truncated file. Renaming also works while the old binary is running.
pub fn install_executable(src: &Path, dest: &Path) -> io::Result<()> {
    stage(src, dest)?.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Install every `(source, destination)` pair of `component`, or none.
///
/// # Errors
///
/// Returns `Error::InstallIoFailed` naming the destination that could not be
/// written. Destinations renamed before the failure get their previous
/// contents back (or are removed if they did not exist).
pub fn install_executables(component: &str, files: &[(PathBuf, PathBuf)]) -> Result<()> {
    let failed = |path: &Path, source: io::Error| Error::InstallIoFailed {
        component: component.to_string(),
        path: path.to_path_buf(),
        source,
    };

    let mut staged = Vec::with_capacity(files.len());
    for (src, dest) in files {
        staged.push(stage(src, dest).map_err(|e| failed(dest, e))?);
    }

    let mut placed: Vec<Placed> = Vec::with_capacity(files.len());
    for (file, (_, dest)) in staged.into_iter().zip(files) {
        let result = keep_previous(dest).and_then(|previous| match file.persist(dest) {
            Ok(_) => Ok(previous),
            Err(e) => {
                if let Some(backup) = &previous {
                    let _ = fs::remove_file(backup);
                }
                Err(e.error)
            }
        });

        match result {
            Ok(previous) => placed.push(Placed {
                dest: dest.clone(),
                previous,
            }),
            Err(e) => {
                for entry in placed.into_iter().rev() {
                    entry.restore();
                }
                return Err(failed(dest, e));
            }
        }
    }

    for entry in placed {
        entry.discard();
    }
    Ok(())
}

/// A destination already renamed into place, with the hard link that keeps
/// its previous contents.
struct Placed {
    dest: PathBuf,
    previous: Option<PathBuf>,
}

impl Placed {
    fn restore(self) {
        let result = match &self.previous {
            Some(backup) => fs::rename(backup, &self.dest),
            None => fs::remove_file(&self.dest),
        };
        if let Err(e) = result {
            log::warn!("cannot roll back {}: {e}", self.dest.display());
        }
    }

    fn discard(self) {
        if let Some(backup) = self.previous
            && let Err(e) = fs::remove_file(&backup)
        {
            log::warn!("cannot remove {}: {e}", backup.display());
        }
    }
}

/// Hard-link an existing regular file at `dest` to a sibling path so it can
/// be restored. Nothing is kept when `dest` is absent or not a regular file.
fn keep_previous(dest: &Path) -> io::Result<Option<PathBuf>> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    }

    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".nodestrap-prev");
    let backup = dest.with_file_name(name);
    if let Err(e) = fs::remove_file(&backup)
        && e.kind() != io::ErrorKind::NotFound
    {
        return Err(e);
    }
    fs::hard_link(dest, &backup)?;
    Ok(Some(backup))
}

/// Copy `src` into a synced, executable temporary file in `dest`'s directory.
fn stage(src: &Path, dest: &Path) -> io::Result<NamedTempFile> {
    let dir = dest.parent().filter(|p| !p.as_os_str().is_empty()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", dest.display()),
        )
    })?;
    fs::create_dir_all(dir)?;

    let mut staged = tempfile::Builder::new()
        .prefix(".nodestrap-")
        .tempfile_in(dir)?;

    let mut source = File::open(src)?;
    io::copy(&mut source, staged.as_file_mut())?;
    staged.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(staged.path(), fs::Permissions::from_mode(EXECUTABLE_MODE))?;
    }

    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_install_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::write(&src, b"binary").unwrap();
        let dest = dir.path().join("usr/local/bin/tool");

        install_executable(&src, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"binary");
    }

    #[test]
    #[cfg(unix)]
    fn test_install_sets_executable_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::write(&src, b"binary").unwrap();
        let dest = dir.path().join("tool");

        install_executable(&src, &dest).unwrap();
        let mode = fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, EXECUTABLE_MODE);
    }

    #[test]
    fn test_install_replaces_existing_and_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::write(&src, b"new").unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        let dest = bin.join("tool");
        fs::write(&dest, b"old").unwrap();

        install_executable(&src, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"new");
        assert_eq!(names(&bin), vec!["tool"]);
    }

    #[test]
    fn test_install_missing_source_keeps_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool");
        fs::write(&dest, b"old").unwrap();

        let result = install_executable(&dir.path().join("missing"), &dest);
        assert!(result.is_err());
        assert_eq!(fs::read(&dest).unwrap(), b"old");
    }

    #[test]
    fn test_install_set_replaces_all() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        fs::write(bin.join("a"), b"old a").unwrap();
        let mut files = Vec::new();
        for name in ["a", "b"] {
            let src = dir.path().join(format!("{name}.new"));
            fs::write(&src, format!("new {name}")).unwrap();
            files.push((src, bin.join(name)));
        }

        install_executables("demo", &files).unwrap();
        assert_eq!(fs::read(bin.join("a")).unwrap(), b"new a");
        assert_eq!(fs::read(bin.join("b")).unwrap(), b"new b");
        assert_eq!(names(&bin), vec!["a", "b"]);
    }

    #[test]
    fn test_install_set_rolls_back_when_a_later_rename_fails() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        fs::write(bin.join("a"), b"old a").unwrap();
        // Renaming a file over a directory fails.
        fs::create_dir(bin.join("c")).unwrap();

        let mut files = Vec::new();
        for name in ["a", "b", "c"] {
            let src = dir.path().join(format!("{name}.new"));
            fs::write(&src, format!("new {name}")).unwrap();
            files.push((src, bin.join(name)));
        }

        let err = install_executables("demo", &files).unwrap_err();
        match err {
            Error::InstallIoFailed { path, .. } => assert_eq!(path, bin.join("c")),
            other => panic!("expected install failure, got {other:?}"),
        }
        assert_eq!(fs::read(bin.join("a")).unwrap(), b"old a");
        assert!(!bin.join("b").exists());
        assert!(bin.join("c").is_dir());
        assert_eq!(names(&bin), vec!["a", "c"]);
    }

    #[test]
    fn test_install_set_missing_source_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        fs::write(bin.join("a"), b"old a").unwrap();
        let src = dir.path().join("a.new");
        fs::write(&src, b"new a").unwrap();

        let files = vec![
            (src, bin.join("a")),
            (dir.path().join("missing"), bin.join("b")),
        ];
        assert!(install_executables("demo", &files).is_err());
        assert_eq!(fs::read(bin.join("a")).unwrap(), b"old a");
        assert_eq!(names(&bin), vec!["a"]);
    }
}
