//! `System` implementation over `std::fs`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::AppError;
use crate::ports::{FileInfo, FileKind, System};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Real-filesystem system adapter.
#[derive(Debug, Clone, Default)]
pub struct OsSystem;

impl OsSystem {
    pub fn new() -> Self {
        OsSystem
    }
}

fn file_info(metadata: &fs::Metadata) -> FileInfo {
    let kind = if metadata.is_file() {
        FileKind::File
    } else if metadata.is_dir() {
        FileKind::Dir
    } else {
        FileKind::Other
    };

    #[cfg(unix)]
    let perm = {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o777
    };
    #[cfg(not(unix))]
    let perm = 0o644;

    let modified_unix = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs() as i64);

    FileInfo { kind, perm, len: metadata.len(), modified_unix }
}

fn set_perm(path: &Path, perm: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(perm))
    }
    #[cfg(not(unix))]
    {
        let _ = (path, perm);
        Ok(())
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

impl System for OsSystem {
    fn stat(&self, path: &Path) -> Result<Option<FileInfo>, AppError> {
        match fs::symlink_metadata(path) {
            Ok(metadata) => Ok(Some(file_info(&metadata))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppError::io("stat", display(path), err)),
        }
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>, AppError> {
        fs::read(path).map_err(|err| AppError::io("read", display(path), err))
    }

    fn write_file_atomic(&self, path: &Path, bytes: &[u8], perm: u32) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| AppError::io("create parent directories for", display(path), err))?;
        }

        let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        let temp: PathBuf = path
            .with_file_name(format!(".{file_name}.tmp-{}-{counter}", process::id()));

        fs::write(&temp, bytes).map_err(|err| AppError::io("write", display(&temp), err))?;
        if let Err(err) = set_perm(&temp, perm) {
            let _ = fs::remove_file(&temp);
            return Err(AppError::io("set permissions on", display(&temp), err));
        }
        if let Err(err) = fs::rename(&temp, path) {
            let _ = fs::remove_file(&temp);
            return Err(AppError::io("rename into place", display(path), err));
        }
        Ok(())
    }

    fn mkdir_all(&self, path: &Path, perm: u32) -> Result<(), AppError> {
        fs::create_dir_all(path)
            .map_err(|err| AppError::io("create directory", display(path), err))?;
        set_perm(path, perm).map_err(|err| AppError::io("set permissions on", display(path), err))
    }

    fn remove_all(&self, path: &Path) -> Result<(), AppError> {
        match fs::symlink_metadata(path) {
            Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path)
                .map_err(|err| AppError::io("remove directory", display(path), err)),
            Ok(_) => {
                fs::remove_file(path).map_err(|err| AppError::io("remove", display(path), err))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::io("stat", display(path), err)),
        }
    }

    fn walk_dir(
        &self,
        root: &Path,
        visit: &mut dyn FnMut(&Path, &FileInfo) -> Result<(), AppError>,
    ) -> Result<(), AppError> {
        match fs::symlink_metadata(root) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(AppError::io("stat", display(root), err)),
        }

        let mut entries: Vec<PathBuf> = fs::read_dir(root)
            .map_err(|err| AppError::io("read directory", display(root), err))?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<_, _>>()
            .map_err(|err| AppError::io("read directory", display(root), err))?;
        entries.sort();

        for entry in entries {
            let metadata = fs::symlink_metadata(&entry)
                .map_err(|err| AppError::io("stat", display(&entry), err))?;
            let info = file_info(&metadata);
            visit(&entry, &info)?;
            if info.kind == FileKind::Dir {
                self.walk_dir(&entry, visit)?;
            }
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), AppError> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| AppError::io("create parent directories for", display(to), err))?;
        }
        fs::rename(from, to).map_err(|err| AppError::io("rename", display(from), err))
    }

    fn lookup_env(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents_and_content() {
        let dir = TempDir::new().unwrap();
        let sys = OsSystem::new();
        let path = dir.path().join("nested/deep/file.txt");

        sys.write_file_atomic(&path, b"content", 0o644).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"content");

        let info = sys.stat(&path).unwrap().unwrap();
        assert!(info.is_file());
    }

    #[test]
    fn stat_missing_is_none_not_error() {
        let dir = TempDir::new().unwrap();
        let sys = OsSystem::new();
        assert_eq!(sys.stat(&dir.path().join("missing")).unwrap(), None);
    }

    #[test]
    fn remove_all_is_noop_when_absent() {
        let dir = TempDir::new().unwrap();
        let sys = OsSystem::new();
        sys.remove_all(&dir.path().join("missing")).unwrap();
    }

    #[test]
    fn walk_dir_is_lexicographic_and_recursive() {
        let dir = TempDir::new().unwrap();
        let sys = OsSystem::new();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/z.txt"), "z").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        let mut seen = Vec::new();
        sys.walk_dir(dir.path(), &mut |path, _| {
            seen.push(path.strip_prefix(dir.path()).unwrap().display().to_string());
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec!["a.txt".to_string(), "b".to_string(), "b/z.txt".to_string()]);
    }

    #[test]
    fn atomic_write_leaves_no_temp_files_behind() {
        let dir = TempDir::new().unwrap();
        let sys = OsSystem::new();
        sys.write_file_atomic(&dir.path().join("out.txt"), b"x", 0o644).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["out.txt".to_string()]);
    }
}
