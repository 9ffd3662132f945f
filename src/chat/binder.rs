//! Session identity binding.
//!
//! The active session identifier lives in two places: the working copy
//! inside the conversation state, and an external reference the user can
//! observe and change out of band (in the browser build of this product the
//! URL query parameter; here a per-user session-reference file plus the
//! `/open` command). The binder keeps the two synchronized in both
//! directions: adoptions write through, and an externally changed reference
//! is picked up and triggers an immediate history fetch for the new id.

use std::path::PathBuf;
use std::sync::Mutex;

/// Where the externally visible session identifier lives.
pub trait SessionRef: Send + Sync {
    fn load(&self) -> Option<String>;
    fn store(&self, chat_id: &str);
    fn clear(&self);
}

/// File-backed session reference (`~/.agentline/last-session`).
pub struct FileSessionRef {
    path: PathBuf,
}

impl FileSessionRef {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn at_default_path() -> Self {
        Self::new(crate::bootstrap::agentline_dir().join("last-session"))
    }
}

impl SessionRef for FileSessionRef {
    fn load(&self) -> Option<String> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn store(&self, chat_id: &str) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&self.path, chat_id) {
            tracing::warn!("failed to persist session reference: {e}");
        }
    }

    fn clear(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// In-memory session reference, used by tests and embedding callers.
#[derive(Default)]
pub struct MemorySessionRef {
    slot: Mutex<Option<String>>,
}

impl MemorySessionRef {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRef for MemorySessionRef {
    fn load(&self) -> Option<String> {
        self.slot.lock().expect("session ref lock poisoned").clone()
    }

    fn store(&self, chat_id: &str) {
        *self.slot.lock().expect("session ref lock poisoned") = Some(chat_id.to_string());
    }

    fn clear(&self) {
        *self.slot.lock().expect("session ref lock poisoned") = None;
    }
}

/// Bidirectional sync between the working identifier and a [`SessionRef`].
pub struct SessionBinder {
    external: Box<dyn SessionRef>,
}

impl SessionBinder {
    pub fn new(external: Box<dyn SessionRef>) -> Self {
        Self { external }
    }

    /// The externally referenced session, for startup.
    pub fn initial(&self) -> Option<String> {
        self.external.load()
    }

    /// Working identifier changed (newly adopted from a send, or the user
    /// opened a different session): update the external reference to match.
    pub fn adopt(&self, chat_id: &str) {
        self.external.store(chat_id);
    }

    /// Check whether the external reference moved away from the current
    /// working identifier. Returns the new identifier to adopt, if any.
    pub fn external_change(&self, current: Option<&str>) -> Option<String> {
        let external = self.external.load()?;
        if Some(external.as_str()) != current {
            Some(external)
        } else {
            None
        }
    }

    pub fn clear(&self) {
        self.external.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn adoption_writes_through_to_the_external_ref() {
        let binder = SessionBinder::new(Box::new(MemorySessionRef::new()));
        assert_eq!(binder.initial(), None);

        binder.adopt("chat_42");
        assert_eq!(binder.initial().as_deref(), Some("chat_42"));
        // in sync: nothing to adopt
        assert_eq!(binder.external_change(Some("chat_42")), None);
    }

    #[test]
    fn external_change_is_detected_and_adoptable() {
        let external = MemorySessionRef::new();
        external.store("chat_pasted");
        let binder = SessionBinder::new(Box::new(external));

        assert_eq!(
            binder.external_change(Some("chat_old")).as_deref(),
            Some("chat_pasted")
        );
        assert_eq!(
            binder.external_change(None).as_deref(),
            Some("chat_pasted")
        );
    }

    #[test]
    fn file_ref_round_trips() {
        let dir = tempdir().expect("tempdir");
        let file_ref = FileSessionRef::new(dir.path().join("last-session"));

        assert_eq!(file_ref.load(), None);
        file_ref.store("chat_9");
        assert_eq!(file_ref.load().as_deref(), Some("chat_9"));
        file_ref.clear();
        assert_eq!(file_ref.load(), None);
    }
}
