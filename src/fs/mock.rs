// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct MockEntry {
    pub content: Vec<u8>,
    pub executable: bool,
    /// Simulates a file that exists but cannot be opened.
    pub unreadable: bool,
}

/// In-memory filesystem for tests. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.insert(path, content.into(), false, false);
    }

    pub fn add_executable(&self, path: impl AsRef<Path>) {
        self.insert(path, Vec::new(), true, false);
    }

    pub fn add_unreadable(&self, path: impl AsRef<Path>) {
        self.insert(path, Vec::new(), false, true);
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let files = self.files.lock().unwrap();
        files.get(path.as_ref()).map(|e| e.content.clone())
    }

    fn insert(&self, path: impl AsRef<Path>, content: Vec<u8>, executable: bool, unreadable: bool) {
        let mut files = self.files.lock().unwrap();
        files.insert(
            path.as_ref().to_path_buf(),
            MockEntry {
                content,
                executable,
                unreadable,
            },
        );
    }

    fn readable(&self, path: &Path) -> Result<MockEntry> {
        let files = self.files.lock().unwrap();
        match files.get(path) {
            Some(entry) if entry.unreadable => Err(anyhow!("Permission denied: {:?}", path)),
            Some(entry) => Ok(entry.clone()),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }
}

impl FileSystem for MockFileSystem {
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let entry = self.readable(path)?;
        Ok(Box::new(Cursor::new(entry.content)))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        files.contains_key(path)
    }

    fn file_len(&self, path: &Path) -> Result<u64> {
        Ok(self.readable(path)?.content.len() as u64)
    }

    fn is_executable(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        files.get(path).is_some_and(|e| e.executable)
    }
}
