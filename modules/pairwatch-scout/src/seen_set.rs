//! Bounded, insertion-ordered set of identity keys and its on-disk form.
//!
//! Keys are normalized on every access, so callers may pass raw addresses.
//! When the set grows past its capacity the oldest keys are evicted first;
//! re-inserting a present key moves it to the newest position.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pairwatch_common::normalize_address;
use tracing::{info, warn};

pub const DEFAULT_MAX_TRACKED: usize = 2000;

#[derive(Debug, Clone)]
pub struct SeenSet {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl SeenSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Build from keys ordered oldest first. Unusable keys are skipped and
    /// only the newest `capacity` survive.
    pub fn from_keys(keys: impl IntoIterator<Item = String>, capacity: usize) -> Self {
        let mut set = Self::new(capacity);
        for key in keys {
            set.insert(&key);
        }
        set
    }

    pub fn contains(&self, raw: &str) -> bool {
        normalize_address(raw).is_some_and(|key| self.members.contains(&key))
    }

    /// Insert a key as the newest entry. Returns false for an unusable key.
    pub fn insert(&mut self, raw: &str) -> bool {
        let Some(key) = normalize_address(raw) else {
            return false;
        };

        if self.members.contains(&key) {
            if let Some(pos) = self.order.iter().position(|k| *k == key) {
                self.order.remove(pos);
            }
        } else {
            self.members.insert(key.clone());
        }
        self.order.push_back(key);

        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

/// JSON-array file holding a [`SeenSet`] between runs.
#[derive(Debug, Clone)]
pub struct SeenStore {
    path: PathBuf,
}

impl SeenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted set. A missing or unreadable file yields an empty set.
    pub fn load(&self, capacity: usize) -> SeenSet {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No seen-set file yet, starting empty");
                return SeenSet::new(capacity);
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read seen-set file, starting empty");
                return SeenSet::new(capacity);
            }
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(keys) => {
                let set = SeenSet::from_keys(keys, capacity);
                info!(path = %self.path.display(), tracked = set.len(), "Loaded seen-set");
                set
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt seen-set file, starting empty");
                SeenSet::new(capacity)
            }
        }
    }

    /// Replace the file atomically: write a sibling temp file, then rename.
    pub fn save(&self, set: &SeenSet) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            let keys: Vec<&str> = set.iter().collect();
            serde_json::to_writer(&mut writer, &keys)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
