//! Persistent Conversation Store
//!
//! Durable, per-learner persistence for the conversation history and the two
//! preferences (active language, sound enabled). The store is the only place
//! that talks to the [`KeyValueBackend`], and it enforces a single policy:
//! read failures fall back to defaults field by field, and write failures are
//! logged and swallowed so they never reach the learner.

use crate::{
    error::StoreError,
    message::{Conversation, Language},
};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tracing::{debug, warn};

/// A synchronous string-keyed get/set/remove surface.
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// A process-local backend. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("memory backend lock poisoned".to_string()))
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// A backend that keeps one file per key inside a directory.
///
/// Writes go to a temporary file that is then renamed over the target, so a
/// reader never observes a half-written value.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Opens (and creates if needed) the backend directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            && !key.starts_with('.');
        if !valid {
            return Err(StoreError::Backend(format!("invalid storage key '{key}'")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        let written = fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(value.as_bytes())?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                debug!(path = %tmp.display(), error = %cleanup, "No temporary file to clean up");
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Everything restored from storage when a conversation is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub conversation: Conversation,
    pub language: Language,
    pub sound_enabled: bool,
}

impl Default for StoredSession {
    fn default() -> Self {
        Self {
            conversation: Vec::new(),
            language: Language::Primary,
            sound_enabled: true,
        }
    }
}

/// Reads and writes one learner's conversation and preferences.
#[derive(Clone)]
pub struct ConversationStore {
    backend: Arc<dyn KeyValueBackend>,
    history_key: String,
    language_key: String,
    sound_key: String,
}

impl ConversationStore {
    /// Creates a store using the default key prefix `tutor`.
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self::with_prefix(backend, "tutor")
    }

    pub fn with_prefix(backend: Arc<dyn KeyValueBackend>, prefix: &str) -> Self {
        Self {
            backend,
            history_key: format!("{prefix}.history"),
            language_key: format!("{prefix}.language"),
            sound_key: format!("{prefix}.sound"),
        }
    }

    pub fn history_key(&self) -> &str {
        &self.history_key
    }

    /// Loads the stored session. Each field falls back to its default on its
    /// own, so a corrupt history does not discard valid preferences.
    pub fn load(&self) -> StoredSession {
        let defaults = StoredSession::default();
        StoredSession {
            conversation: self.read(&self.history_key).unwrap_or(defaults.conversation),
            language: self.read(&self.language_key).unwrap_or(defaults.language),
            sound_enabled: self.read(&self.sound_key).unwrap_or(defaults.sound_enabled),
        }
    }

    /// Persists the whole conversation in a single write.
    pub fn save(&self, conversation: &Conversation) {
        self.write(&self.history_key, conversation);
    }

    pub fn save_language(&self, language: Language) {
        self.write(&self.language_key, &language);
    }

    pub fn save_sound_enabled(&self, enabled: bool) {
        self.write(&self.sound_key, &enabled);
    }

    /// Removes the stored conversation. Preferences are kept.
    pub fn clear(&self) {
        if let Err(e) = self.backend.remove(&self.history_key) {
            warn!(key = %self.history_key, error = %e, "Failed to clear stored conversation");
        }
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read from storage, using default");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Stored value is malformed, using default");
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(StoreError::from)
            .and_then(|json| self.backend.set(key, &json));
        match result {
            Ok(()) => debug!(key, "Persisted"),
            Err(e) => warn!(key, error = %e, "Failed to persist, keeping in-memory state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fallback::welcome_message, message::Message, skill::SkillTag};

    fn sample_conversation() -> Conversation {
        vec![
            welcome_message("Optics"),
            Message::user("Explain refraction", SkillTag::ConceptExplainer),
            Message::assistant("Light bends...", None, SkillTag::ConceptExplainer),
        ]
    }

    #[test]
    fn test_empty_store_loads_defaults() {
        let store = ConversationStore::new(Arc::new(MemoryBackend::new()));
        assert_eq!(store.load(), StoredSession::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let backend = Arc::new(MemoryBackend::new());
        let store = ConversationStore::new(backend.clone());
        let conversation = sample_conversation();
        store.save(&conversation);
        store.save_language(Language::Secondary);
        store.save_sound_enabled(false);

        // A fresh store over the same backend simulates a reload.
        let reloaded = ConversationStore::new(backend).load();
        assert_eq!(reloaded.conversation, conversation);
        assert_eq!(reloaded.language, Language::Secondary);
        assert!(!reloaded.sound_enabled);
    }

    #[test]
    fn test_corrupt_history_keeps_valid_preferences() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set("tutor.history", "{not json").unwrap();
        backend.set("tutor.language", "\"secondary\"").unwrap();
        backend.set("tutor.sound", "false").unwrap();

        let loaded = ConversationStore::new(backend).load();
        assert!(loaded.conversation.is_empty());
        assert_eq!(loaded.language, Language::Secondary);
        assert!(!loaded.sound_enabled);
    }

    #[test]
    fn test_malformed_preference_defaults_independently() {
        let backend = Arc::new(MemoryBackend::new());
        let store = ConversationStore::new(backend.clone());
        store.save(&sample_conversation());
        backend.set("tutor.language", "\"klingon\"").unwrap();

        let loaded = store.load();
        assert_eq!(loaded.conversation.len(), 3);
        assert_eq!(loaded.language, Language::Primary);
        assert!(loaded.sound_enabled);
    }

    #[test]
    fn test_clear_removes_only_conversation() {
        let backend = Arc::new(MemoryBackend::new());
        let store = ConversationStore::new(backend.clone());
        store.save(&sample_conversation());
        store.save_language(Language::Secondary);
        store.clear();

        assert_eq!(backend.get("tutor.history").unwrap(), None);
        assert_eq!(store.load().language, Language::Secondary);
    }

    #[test]
    fn test_write_failures_are_swallowed() {
        let mut backend = MockKeyValueBackend::new();
        backend
            .expect_set()
            .returning(|_, _| Err(StoreError::Backend("quota exceeded".to_string())));
        backend
            .expect_remove()
            .returning(|_| Err(StoreError::Backend("disabled".to_string())));
        backend
            .expect_get()
            .returning(|_| Err(StoreError::Backend("disabled".to_string())));

        let store = ConversationStore::new(Arc::new(backend));
        store.save(&sample_conversation());
        store.save_language(Language::Secondary);
        store.save_sound_enabled(false);
        store.clear();
        assert_eq!(store.load(), StoredSession::default());
    }

    #[test]
    fn test_custom_prefix() {
        let backend = Arc::new(MemoryBackend::new());
        let store = ConversationStore::with_prefix(backend.clone(), "chapter-7");
        store.save_sound_enabled(false);
        assert_eq!(store.history_key(), "chapter-7.history");
        assert_eq!(backend.get("chapter-7.sound").unwrap().as_deref(), Some("false"));
    }

    #[test]
    fn test_file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path().join("learner")).unwrap();

        assert_eq!(backend.get("tutor.history").unwrap(), None);
        backend.set("tutor.history", "[]").unwrap();
        assert_eq!(backend.get("tutor.history").unwrap().as_deref(), Some("[]"));
        backend.set("tutor.history", "[1]").unwrap();
        assert_eq!(backend.get("tutor.history").unwrap().as_deref(), Some("[1]"));

        backend.remove("tutor.history").unwrap();
        backend.remove("tutor.history").unwrap();
        assert_eq!(backend.get("tutor.history").unwrap(), None);
    }

    #[test]
    fn test_failed_file_write_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        // A directory where the value file belongs makes the final rename fail.
        fs::create_dir(dir.path().join("tutor.history.json")).unwrap();

        assert!(backend.set("tutor.history", "[]").is_err());
        assert!(!dir.path().join("tutor.history.json.tmp").exists());
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_file_backend_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert!(backend.set("../escape", "x").is_err());
        assert!(backend.get("a/b").is_err());
        assert!(backend.remove("").is_err());
    }

    #[test]
    fn test_store_over_file_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let conversation = sample_conversation();
        {
            let backend = FileBackend::open(dir.path()).unwrap();
            ConversationStore::new(Arc::new(backend)).save(&conversation);
        }
        let backend = FileBackend::open(dir.path()).unwrap();
        assert_eq!(ConversationStore::new(Arc::new(backend)).load().conversation, conversation);
    }
}
