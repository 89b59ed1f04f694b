use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Paths already accepted during one watch session.
///
/// Entries are never removed; a new session gets a new registry.
#[derive(Debug, Default)]
pub struct DedupeRegistry {
    accepted: Mutex<HashSet<PathBuf>>,
}

impl DedupeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `path` if unseen. Returns true only for the first caller.
    pub fn try_accept(&self, path: &Path) -> bool {
        let mut accepted = self
            .accepted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        accepted.insert(path.to_path_buf())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.accepted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(path)
    }

    pub fn len(&self) -> usize {
        self.accepted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
