//! In-memory `System` with fault injection for tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::Path;

use crate::domain::AppError;
use crate::ports::{FileInfo, FileKind, System};

#[derive(Debug, Clone)]
enum Node {
    File { bytes: Vec<u8>, perm: u32, modified: i64 },
    Dir { perm: u32 },
}

/// In-memory filesystem keyed by forward-slash path strings.
///
/// Walk order is byte-lexicographic over full paths. A monotonic clock stamps
/// every write so mtime-based staleness checks are testable.
#[derive(Debug, Default)]
pub struct MemSystem {
    nodes: RefCell<BTreeMap<String, Node>>,
    env: RefCell<BTreeMap<String, String>>,
    clock: Cell<i64>,
    fail_writes: RefCell<BTreeSet<String>>,
    fail_renames: RefCell<BTreeSet<String>>,
    fail_removes: RefCell<BTreeSet<String>>,
}

fn key(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() }
}

fn parent_key(key: &str) -> Option<String> {
    key.rsplit_once('/').map(|(parent, _)| {
        if parent.is_empty() { "/".to_string() } else { parent.to_string() }
    })
}

impl MemSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> i64 {
        let next = self.clock.get() + 1;
        self.clock.set(next);
        next
    }

    fn ensure_parents(&self, file_key: &str) {
        let mut ancestors = Vec::new();
        let mut current = parent_key(file_key);
        while let Some(dir) = current {
            if dir == "/" {
                break;
            }
            current = parent_key(&dir);
            ancestors.push(dir);
        }
        let mut nodes = self.nodes.borrow_mut();
        for dir in ancestors.into_iter().rev() {
            nodes.entry(dir).or_insert(Node::Dir { perm: 0o755 });
        }
    }

    /// Seed a file, creating parent directories.
    pub fn add_file(&self, path: &str, bytes: &[u8]) {
        let file_key = key(Path::new(path));
        self.ensure_parents(&file_key);
        let modified = self.tick();
        self.nodes
            .borrow_mut()
            .insert(file_key, Node::File { bytes: bytes.to_vec(), perm: 0o644, modified });
    }

    pub fn add_dir(&self, path: &str) {
        let dir_key = key(Path::new(path));
        self.ensure_parents(&dir_key);
        self.nodes.borrow_mut().insert(dir_key, Node::Dir { perm: 0o755 });
    }

    pub fn set_env(&self, name: &str, value: &str) {
        self.env.borrow_mut().insert(name.to_string(), value.to_string());
    }

    pub fn set_mtime(&self, path: &str, modified: i64) {
        if let Some(Node::File { modified: stamp, .. }) =
            self.nodes.borrow_mut().get_mut(&key(Path::new(path)))
        {
            *stamp = modified;
        }
    }

    pub fn set_perm(&self, path: &str, perm: u32) {
        match self.nodes.borrow_mut().get_mut(&key(Path::new(path))) {
            Some(Node::File { perm: slot, .. }) | Some(Node::Dir { perm: slot }) => *slot = perm,
            None => {}
        }
    }

    /// Make the next and all subsequent writes to `path` fail.
    pub fn fail_write_on(&self, path: &str) {
        self.fail_writes.borrow_mut().insert(key(Path::new(path)));
    }

    pub fn fail_rename_on(&self, path: &str) {
        self.fail_renames.borrow_mut().insert(key(Path::new(path)));
    }

    pub fn fail_remove_on(&self, path: &str) {
        self.fail_removes.borrow_mut().insert(key(Path::new(path)));
    }

    pub fn file_content(&self, path: &str) -> Option<Vec<u8>> {
        match self.nodes.borrow().get(&key(Path::new(path))) {
            Some(Node::File { bytes, .. }) => Some(bytes.clone()),
            _ => None,
        }
    }

    pub fn file_perm(&self, path: &str) -> Option<u32> {
        match self.nodes.borrow().get(&key(Path::new(path))) {
            Some(Node::File { perm, .. }) | Some(Node::Dir { perm }) => Some(*perm),
            None => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.nodes.borrow().contains_key(&key(Path::new(path)))
    }

    /// All node paths, sorted. Handy for whole-tree assertions.
    pub fn paths(&self) -> Vec<String> {
        self.nodes.borrow().keys().cloned().collect()
    }
}

fn not_found(action: &'static str, path: String) -> AppError {
    AppError::io(action, path, io::Error::new(io::ErrorKind::NotFound, "not found"))
}

fn injected(action: &'static str, path: String) -> AppError {
    AppError::io(action, path, io::Error::new(io::ErrorKind::PermissionDenied, "injected fault"))
}

impl System for MemSystem {
    fn stat(&self, path: &Path) -> Result<Option<FileInfo>, AppError> {
        Ok(self.nodes.borrow().get(&key(path)).map(|node| match node {
            Node::File { bytes, perm, modified } => FileInfo {
                kind: FileKind::File,
                perm: *perm,
                len: bytes.len() as u64,
                modified_unix: Some(*modified),
            },
            Node::Dir { perm } => {
                FileInfo { kind: FileKind::Dir, perm: *perm, len: 0, modified_unix: None }
            }
        }))
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>, AppError> {
        let node_key = key(path);
        match self.nodes.borrow().get(&node_key) {
            Some(Node::File { bytes, .. }) => Ok(bytes.clone()),
            Some(Node::Dir { .. }) => Err(AppError::io(
                "read",
                node_key,
                io::Error::new(io::ErrorKind::InvalidInput, "is a directory"),
            )),
            None => Err(not_found("read", node_key)),
        }
    }

    fn write_file_atomic(&self, path: &Path, bytes: &[u8], perm: u32) -> Result<(), AppError> {
        let file_key = key(path);
        if self.fail_writes.borrow().contains(&file_key) {
            return Err(injected("write", file_key));
        }
        self.ensure_parents(&file_key);
        let modified = self.tick();
        self.nodes
            .borrow_mut()
            .insert(file_key, Node::File { bytes: bytes.to_vec(), perm, modified });
        Ok(())
    }

    fn mkdir_all(&self, path: &Path, perm: u32) -> Result<(), AppError> {
        let dir_key = key(path);
        self.ensure_parents(&dir_key);
        self.nodes.borrow_mut().entry(dir_key).or_insert(Node::Dir { perm });
        Ok(())
    }

    fn remove_all(&self, path: &Path) -> Result<(), AppError> {
        let node_key = key(path);
        if self.fail_removes.borrow().contains(&node_key) {
            return Err(injected("remove", node_key));
        }
        let prefix = format!("{node_key}/");
        let mut nodes = self.nodes.borrow_mut();
        let doomed: Vec<String> = nodes
            .keys()
            .filter(|candidate| **candidate == node_key || candidate.starts_with(&prefix))
            .cloned()
            .collect();
        for victim in doomed {
            nodes.remove(&victim);
        }
        Ok(())
    }

    fn walk_dir(
        &self,
        root: &Path,
        visit: &mut dyn FnMut(&Path, &FileInfo) -> Result<(), AppError>,
    ) -> Result<(), AppError> {
        let root_key = key(root);
        match self.nodes.borrow().get(&root_key) {
            Some(Node::Dir { .. }) => {}
            _ => return Ok(()),
        }

        let prefix = format!("{root_key}/");
        let children: Vec<String> = self
            .nodes
            .borrow()
            .keys()
            .filter(|candidate| candidate.starts_with(&prefix))
            .cloned()
            .collect();

        for child in children {
            let info = self.stat(Path::new(&child))?;
            if let Some(info) = info {
                visit(Path::new(&child), &info)?;
            }
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), AppError> {
        let from_key = key(from);
        let to_key = key(to);
        if self.fail_renames.borrow().contains(&from_key)
            || self.fail_renames.borrow().contains(&to_key)
        {
            return Err(injected("rename", from_key));
        }
        let node = self
            .nodes
            .borrow_mut()
            .remove(&from_key)
            .ok_or_else(|| not_found("rename", from_key))?;
        self.ensure_parents(&to_key);
        self.nodes.borrow_mut().insert(to_key, node);
        Ok(())
    }

    fn lookup_env(&self, name: &str) -> Option<String> {
        self.env.borrow().get(name).cloned()
    }
}
