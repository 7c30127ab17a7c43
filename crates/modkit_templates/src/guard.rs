//! Exclusive, rollback-on-failure access to a generation destination.
//!
//! A [`DestinationGuard`] holds a lock file next to the destination for the
//! duration of a run and records everything it creates. Unless
//! [`DestinationGuard::commit`] is called, dropping the guard restores the
//! destination to its previous state.

use std::fs::{self, File, OpenOptions, Permissions};
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{TemplateError, TemplateResult};

const LOCK_SUFFIX: &str = ".modkit.lock";

#[derive(Debug)]
enum Created {
    Dir(PathBuf),
    File(PathBuf),
    /// A pre-existing file that was overwritten, with its former contents
    /// and permissions.
    Replaced(PathBuf, Vec<u8>, Permissions),
}

impl Created {
    fn path(&self) -> &Path {
        match self {
            Created::Dir(path) | Created::File(path) | Created::Replaced(path, ..) => path,
        }
    }
}

/// Guard over a destination directory for a single generation run.
#[derive(Debug)]
pub struct DestinationGuard {
    root: PathBuf,
    lock_path: PathBuf,
    lock: Option<File>,
    /// Ancestors of `root` created by `acquire`, outermost first.
    ancestors: Vec<PathBuf>,
    root_created: bool,
    created: Vec<Created>,
    committed: bool,
}

/// Lock file used for `destination`.
pub fn lock_path_for(destination: &Path) -> Option<PathBuf> {
    let name = destination.file_name()?;
    let parent = destination.parent()?;
    Some(parent.join(format!(".{}{}", name.to_string_lossy(), LOCK_SUFFIX)))
}

fn absolute(path: &Path) -> TemplateResult<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| TemplateError::io(path, e))?
            .join(path)
    };

    // Lexical normalization so `out/.` and `out` share a lock.
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

impl DestinationGuard {
    /// Lock `destination` and check that it may be written.
    ///
    /// Fails with `DestinationBusy` if another run holds the lock, and with
    /// `DestinationNotEmpty` if the destination is a file, or a non-empty
    /// directory while `overwrite` is false. No filesystem change survives
    /// a failed acquisition.
    pub fn acquire(destination: &Path, overwrite: bool) -> TemplateResult<Self> {
        let root = absolute(destination)?;
        let lock_path = lock_path_for(&root).ok_or_else(|| {
            TemplateError::io(
                &root,
                io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent directory"),
            )
        })?;

        let ancestors = create_ancestors(&root)?;

        let lock = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(e) => {
                remove_ancestors(&ancestors);
                return Err(if e.kind() == io::ErrorKind::AlreadyExists {
                    TemplateError::DestinationBusy {
                        path: root,
                        lock: lock_path,
                    }
                } else {
                    TemplateError::io(&lock_path, e)
                });
            }
        };
        debug!("Acquired lock {:?}", lock_path);

        let mut guard = Self {
            root,
            lock_path,
            lock: Some(lock),
            ancestors,
            root_created: false,
            created: Vec::new(),
            committed: false,
        };

        match fs::symlink_metadata(&guard.root) {
            Ok(meta) if meta.is_dir() => {
                let occupied = fs::read_dir(&guard.root)
                    .map_err(|e| TemplateError::io(&guard.root, e))?
                    .next()
                    .is_some();
                if occupied && !overwrite {
                    return Err(TemplateError::DestinationNotEmpty(guard.root.clone()));
                }
            }
            Ok(_) => return Err(TemplateError::DestinationNotEmpty(guard.root.clone())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir(&guard.root).map_err(|e| TemplateError::io(&guard.root, e))?;
                guard.root_created = true;
            }
            Err(e) => return Err(TemplateError::io(&guard.root, e)),
        }

        Ok(guard)
    }

    /// Ensure a directory (relative to the root) exists, creating and
    /// recording each missing level.
    pub fn create_dir(&mut self, relative: &Path) -> TemplateResult<()> {
        let mut current = self.root.clone();
        for component in relative.components() {
            current.push(component);
            match fs::symlink_metadata(&current) {
                Ok(meta) if meta.is_dir() => continue,
                Ok(_) => {
                    return Err(TemplateError::io(
                        &current,
                        io::Error::new(io::ErrorKind::AlreadyExists, "a file is in the way"),
                    ))
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    fs::create_dir(&current).map_err(|e| TemplateError::io(&current, e))?;
                    self.created.push(Created::Dir(current.clone()));
                }
                Err(e) => return Err(TemplateError::io(&current, e)),
            }
        }
        Ok(())
    }

    /// Write a file (relative to the root), creating missing parents, and
    /// apply `permissions` if given.
    pub fn write_file(
        &mut self,
        relative: &Path,
        contents: &[u8],
        permissions: Option<&Permissions>,
    ) -> TemplateResult<PathBuf> {
        if let Some(parent) = relative.parent() {
            self.create_dir(parent)?;
        }
        let target = self.root.join(relative);

        match fs::symlink_metadata(&target) {
            Ok(meta) if meta.is_file() => {
                let previous = fs::read(&target).map_err(|e| TemplateError::io(&target, e))?;
                self.created
                    .push(Created::Replaced(target.clone(), previous, meta.permissions()));
                fs::write(&target, contents).map_err(|e| TemplateError::io(&target, e))?;
            }
            Ok(_) => {
                return Err(TemplateError::io(
                    &target,
                    io::Error::new(io::ErrorKind::AlreadyExists, "not a regular file"),
                ))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Recorded first: a failed write may still leave a partial file.
                self.created.push(Created::File(target.clone()));
                fs::write(&target, contents).map_err(|e| TemplateError::io(&target, e))?;
            }
            Err(e) => return Err(TemplateError::io(&target, e)),
        }

        if let Some(permissions) = permissions {
            fs::set_permissions(&target, permissions.clone())
                .map_err(|e| TemplateError::io(&target, e))?;
        }
        Ok(target)
    }

    /// Keep everything written so far and release the lock.
    pub fn commit(mut self) -> PathBuf {
        self.committed = true;
        self.root.clone()
    }

    /// Undo every recorded change. Ancestors are removed after the lock.
    fn rollback(&mut self) {
        warn!("Rolling back {} change(s) under {:?}", self.created.len(), self.root);

        for created in self.created.drain(..).rev() {
            let result = match &created {
                Created::File(path) => fs::remove_file(path),
                Created::Dir(path) => fs::remove_dir(path),
                Created::Replaced(path, previous, permissions) => {
                    fs::set_permissions(path, permissions.clone())
                        .and_then(|()| fs::write(path, previous))
                }
            };
            if let Err(e) = result {
                warn!("Rollback of {:?} failed: {}", created.path(), e);
            }
        }

        if self.root_created {
            if let Err(e) = fs::remove_dir(&self.root) {
                warn!("Failed to remove {:?}: {}", self.root, e);
            }
        }
    }
}

impl Drop for DestinationGuard {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
        drop(self.lock.take());
        if let Err(e) = fs::remove_file(&self.lock_path) {
            warn!("Failed to remove lock file {:?}: {}", self.lock_path, e);
        }
        if !self.committed {
            remove_ancestors(&self.ancestors);
        }
    }
}

/// Create the missing ancestors of `root`, returning them outermost first.
fn create_ancestors(root: &Path) -> TemplateResult<Vec<PathBuf>> {
    let mut missing: Vec<PathBuf> = root
        .ancestors()
        .skip(1)
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .map(Path::to_path_buf)
        .collect();
    missing.reverse();

    for (index, dir) in missing.iter().enumerate() {
        if let Err(e) = fs::create_dir(dir) {
            if e.kind() != io::ErrorKind::AlreadyExists {
                remove_ancestors(&missing[..index]);
                return Err(TemplateError::io(dir, e));
            }
        }
    }
    Ok(missing)
}

fn remove_ancestors(ancestors: &[PathBuf]) {
    for dir in ancestors.iter().rev() {
        // Another run may share the directory; leave it if it is not empty.
        if fs::remove_dir(dir).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_commit_keeps_output_and_releases_lock() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("out");

        let mut guard = DestinationGuard::acquire(&dest, false).unwrap();
        let lock = lock_path_for(&dest).unwrap();
        assert!(lock.exists());
        guard.write_file(Path::new("a/b/c.txt"), b"hello", None).unwrap();
        guard.commit();

        assert_eq!(fs::read(dest.join("a/b/c.txt")).unwrap(), b"hello");
        assert!(!lock.exists());
    }

    #[test]
    fn test_drop_without_commit_rolls_back() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("nested/deeper/out");

        {
            let mut guard = DestinationGuard::acquire(&dest, false).unwrap();
            guard.create_dir(Path::new("empty")).unwrap();
            guard.write_file(Path::new("x/y.txt"), b"y", None).unwrap();
            guard.write_file(Path::new("z.txt"), b"z", None).unwrap();
        }

        assert!(!dest.exists());
        assert!(!temp.path().join("nested").exists());
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_busy_destination() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("out");

        let _held = DestinationGuard::acquire(&dest, false).unwrap();
        let err = DestinationGuard::acquire(&dest, false).unwrap_err();
        assert!(matches!(err, TemplateError::DestinationBusy { .. }));

        // Same directory spelled differently.
        let err = DestinationGuard::acquire(&temp.path().join("out/."), false).unwrap_err();
        assert!(matches!(err, TemplateError::DestinationBusy { .. }));
    }

    #[test]
    fn test_non_empty_destination() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("keep.txt"), "mine").unwrap();

        let err = DestinationGuard::acquire(&dest, false).unwrap_err();
        assert!(matches!(err, TemplateError::DestinationNotEmpty(_)));
        assert!(!lock_path_for(&dest).unwrap().exists());
        assert_eq!(fs::read_to_string(dest.join("keep.txt")).unwrap(), "mine");
    }

    #[test]
    fn test_file_destination_is_rejected() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("out");
        fs::write(&dest, "file").unwrap();

        let err = DestinationGuard::acquire(&dest, true).unwrap_err();
        assert!(matches!(err, TemplateError::DestinationNotEmpty(_)));
    }

    #[test]
    fn test_overwrite_restores_previous_contents_on_rollback() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("out");
        fs::create_dir_all(dest.join("src")).unwrap();
        fs::write(dest.join("src/Main.java"), "original").unwrap();

        {
            let mut guard = DestinationGuard::acquire(&dest, true).unwrap();
            guard.write_file(Path::new("src/Main.java"), b"generated", None).unwrap();
            guard.write_file(Path::new("src/New.java"), b"new", None).unwrap();
            assert_eq!(fs::read_to_string(dest.join("src/Main.java")).unwrap(), "generated");
        }

        assert_eq!(fs::read_to_string(dest.join("src/Main.java")).unwrap(), "original");
        assert!(!dest.join("src/New.java").exists());
        assert!(dest.join("src").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_overwrite_restores_previous_permissions_on_rollback() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().unwrap();
        let dest = temp.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("gradlew"), "original").unwrap();
        fs::set_permissions(dest.join("gradlew"), Permissions::from_mode(0o644)).unwrap();

        {
            let mut guard = DestinationGuard::acquire(&dest, true).unwrap();
            let executable = Permissions::from_mode(0o755);
            guard
                .write_file(Path::new("gradlew"), b"generated", Some(&executable))
                .unwrap();
            let mode = fs::metadata(dest.join("gradlew")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }

        let meta = fs::metadata(dest.join("gradlew")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o644);
        assert_eq!(fs::read_to_string(dest.join("gradlew")).unwrap(), "original");
    }
}
