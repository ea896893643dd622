use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ChatError;
use crate::events::{Conversation, Message, Role, title_from_text};

/// Conversations persisted as a single JSON array, newest first.
///
/// Every mutation is written to disk before returning.
#[derive(Debug)]
pub struct ConversationStore {
    path: PathBuf,
    chats: Vec<Conversation>,
}

impl ConversationStore {
    /// Load the store from `path`; a missing file is an empty store
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let chats = if path.exists() {
            let content = fs::read_to_string(&path)
                .context("Failed to read conversation history")?;
            serde_json::from_str(&content)
                .context("Failed to parse conversation history")?
        } else {
            Vec::new()
        };

        Ok(Self { path, chats })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create data directory")?;
        }
        let content = serde_json::to_string_pretty(&self.chats)
            .context("Failed to serialize conversation history")?;
        fs::write(&self.path, content)
            .context("Failed to write conversation history")?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start an empty conversation at the top of the list
    pub fn new_conversation(&mut self) -> Result<String> {
        let chat = Conversation::new();
        let id = chat.id.clone();
        self.chats.insert(0, chat);
        self.save()?;
        debug!(%id, "created conversation");
        Ok(id)
    }

    pub fn list(&self) -> &[Conversation] {
        &self.chats
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.chats.iter().find(|chat| chat.id == id)
    }

    pub fn most_recent(&self) -> Option<&Conversation> {
        self.chats.first()
    }

    /// Resolve a conversation by 1-based position in the listing or by id
    /// (an unambiguous id prefix also matches)
    pub fn resolve(&self, key: &str) -> Option<&Conversation> {
        if let Ok(index) = key.parse::<usize>() {
            if let Some(chat) = index.checked_sub(1).and_then(|i| self.chats.get(i)) {
                return Some(chat);
            }
        }
        if let Some(chat) = self.get(key) {
            return Some(chat);
        }
        let mut matches = self.chats.iter().filter(|chat| chat.id.starts_with(key));
        match (matches.next(), matches.next()) {
            (Some(chat), None) if !key.is_empty() => Some(chat),
            _ => None,
        }
    }

    /// Append a message; the first user message also names the conversation
    pub fn append(&mut self, id: &str, message: Message) -> std::result::Result<(), ChatError> {
        let chat = self
            .chats
            .iter_mut()
            .find(|chat| chat.id == id)
            .ok_or_else(|| ChatError::UnknownConversation(id.to_string()))?;

        let previous_title = chat.title.clone();
        if chat.messages.is_empty() && message.role == Role::User {
            chat.title = title_from_text(&message.text);
        }
        chat.messages.push(message);

        // nothing is kept in memory that did not reach the file
        if let Err(err) = self.save() {
            if let Some(chat) = self.chats.iter_mut().find(|chat| chat.id == id) {
                chat.messages.pop();
                chat.title = previous_title;
            }
            return Err(err.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DEFAULT_TITLE;

    fn temp_store() -> (tempfile::TempDir, ConversationStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::load(dir.path().join("data").join("chats.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn new_conversations_go_first() {
        let (_dir, mut store) = temp_store();
        let first = store.new_conversation().unwrap();
        let second = store.new_conversation().unwrap();

        assert_eq!(store.list().len(), 2);
        assert_eq!(store.most_recent().unwrap().id, second);
        assert_eq!(store.list()[1].id, first);
        assert_eq!(store.get(&first).unwrap().title, DEFAULT_TITLE);
    }

    #[test]
    fn first_user_message_sets_title() {
        let (_dir, mut store) = temp_store();
        let id = store.new_conversation().unwrap();

        store
            .append(&id, Message::user("Explain the borrow checker in simple terms please"))
            .unwrap();
        store.append(&id, Message::model("Sure")).unwrap();
        store.append(&id, Message::user("Another question")).unwrap();

        let chat = store.get(&id).unwrap();
        assert_eq!(chat.title, "Explain the borrow checker in ...");
        assert_eq!(chat.messages.len(), 3);
    }

    #[test]
    fn append_to_unknown_conversation_fails() {
        let (_dir, mut store) = temp_store();
        let err = store.append("missing", Message::user("hi")).unwrap_err();
        assert_eq!(err, ChatError::UnknownConversation("missing".to_string()));
    }

    #[test]
    fn persists_across_loads() {
        let (_dir, mut store) = temp_store();
        let id = store.new_conversation().unwrap();
        store
            .append(&id, Message::user("picture").with_image("data:image/png;base64,AAAA"))
            .unwrap();

        let reloaded = ConversationStore::load(store.path().to_path_buf()).unwrap();
        assert_eq!(reloaded.list(), store.list());
    }

    #[test]
    fn failed_write_leaves_conversation_unchanged() {
        let (dir, mut store) = temp_store();
        let id = store.new_conversation().unwrap();

        fs::remove_dir_all(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data"), "").unwrap();

        let err = store.append(&id, Message::user("lost")).unwrap_err();
        assert!(matches!(err, ChatError::Storage(_)));
        let chat = store.get(&id).unwrap();
        assert!(chat.messages.is_empty());
        assert_eq!(chat.title, DEFAULT_TITLE);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chats.json");
        fs::write(&path, "not json").unwrap();
        assert!(ConversationStore::load(path).is_err());
    }

    #[test]
    fn resolves_by_index_and_prefix() {
        let (_dir, mut store) = temp_store();
        let older = store.new_conversation().unwrap();
        let newer = store.new_conversation().unwrap();

        assert_eq!(store.resolve("1").unwrap().id, newer);
        assert_eq!(store.resolve("2").unwrap().id, older);
        assert_eq!(store.resolve(&older).unwrap().id, older);
        assert!(store.resolve("").is_none());
        assert!(store.resolve("3").is_none());
    }
}
