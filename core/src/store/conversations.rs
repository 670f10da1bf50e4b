/// Conversation repository: one record per unordered participant pair
/// plus an append-only message log per conversation
use crate::error::{ChatError, Result};
use crate::types::{ChatMessage, Conversation, MessageKind};
use std::path::Path;

pub struct ConversationStore {
    db: sled::Db,
    messages: sled::Tree,
}

/// Canonical pair key: "dm:{min_id}:{max_id}". Both argument orders
/// map to the same key, which is what makes the uniqueness guard work.
pub fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("dm:{}:{}", a, b)
    } else {
        format!("dm:{}:{}", b, a)
    }
}

fn message_key(conversation_id: &str, seq: u64) -> String {
    // Zero-padded so lexicographic key order equals append order
    format!("{}:{:020}", conversation_id, seq)
}

impl ConversationStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db = sled::open(data_dir.join("conversations.db"))
            .map_err(|e| ChatError::Storage(format!("conversations DB: {}", e)))?;
        let messages = db
            .open_tree("messages")
            .map_err(|e| ChatError::Storage(format!("messages tree: {}", e)))?;
        Ok(Self { db, messages })
    }

    /// Find the conversation for `{a, b}`, creating it if absent.
    ///
    /// Concurrent callers for the same pair (in either argument order)
    /// race on a compare-and-swap insert; the loser re-reads and
    /// returns the winner's record, so exactly one conversation ever
    /// exists per pair.
    pub fn find_or_create(&self, a: &str, b: &str) -> Result<Conversation> {
        if a == b {
            return Err(ChatError::InvalidTarget(format!(
                "cannot start a conversation between {} and itself",
                a
            )));
        }

        let key = pair_key(a, b);
        if let Some(existing) = self.get(&key)? {
            return Ok(existing);
        }

        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let conversation = Conversation {
            conversation_id: key.clone(),
            participants: [lo.to_string(), hi.to_string()],
            created_at: chrono::Utc::now(),
        };
        let val = serde_json::to_vec(&conversation)?;

        match self
            .db
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(val))
            .map_err(|e| ChatError::Storage(format!("create conversation: {}", e)))?
        {
            Ok(()) => Ok(conversation),
            // Another caller created it first; the constraint violation
            // is the signal to retry as a lookup.
            Err(_) => self.get(&key)?.ok_or_else(|| {
                ChatError::Conflict(format!("conversation {} vanished during create", key))
            }),
        }
    }

    pub fn get(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        match self
            .db
            .get(conversation_id.as_bytes())
            .map_err(|e| ChatError::Storage(format!("get conversation: {}", e)))?
        {
            Some(val) => Ok(Some(serde_json::from_slice(&val)?)),
            None => Ok(None),
        }
    }

    pub fn require(&self, conversation_id: &str) -> Result<Conversation> {
        self.get(conversation_id)?
            .ok_or_else(|| ChatError::NotFound(format!("conversation {}", conversation_id)))
    }

    /// All conversations `user_id` participates in.
    pub fn for_user(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let mut out = Vec::new();
        for entry in self.db.iter().flatten() {
            let (_, val) = entry;
            if let Ok(c) = serde_json::from_slice::<Conversation>(&val) {
                if c.participants.iter().any(|p| p == user_id) {
                    out.push(c);
                }
            }
        }
        Ok(out)
    }

    /// Append a message to the end of the log. Fails with `NotFound`
    /// if the conversation does not exist. The timestamp and sequence
    /// number are assigned here, not by the caller.
    pub fn append_message(
        &self,
        conversation_id: &str,
        from: &str,
        to: &str,
        kind: MessageKind,
        text: Option<String>,
        file: Option<String>,
    ) -> Result<ChatMessage> {
        self.require(conversation_id)?;

        let seq = self
            .db
            .generate_id()
            .map_err(|e| ChatError::Storage(format!("message seq: {}", e)))?;
        let message = ChatMessage {
            from: from.to_string(),
            to: to.to_string(),
            kind,
            text,
            file,
            timestamp: chrono::Utc::now(),
            seq,
        };
        let val = serde_json::to_vec(&message)?;
        self.messages
            .insert(message_key(conversation_id, seq).as_bytes(), val)
            .map_err(|e| ChatError::Storage(format!("append message: {}", e)))?;
        Ok(message)
    }

    /// Full message log in append order (single snapshot read).
    pub fn messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        self.require(conversation_id)?;

        let prefix = format!("{}:", conversation_id);
        let mut out = Vec::new();
        for entry in self.messages.scan_prefix(prefix.as_bytes()).flatten() {
            let (_, val) = entry;
            if let Ok(msg) = serde_json::from_slice::<ChatMessage>(&val) {
                out.push(msg);
            }
        }
        Ok(out)
    }

    /// Most recent message, if any (for list-view previews).
    pub fn last_message(&self, conversation_id: &str) -> Result<Option<ChatMessage>> {
        let prefix = format!("{}:", conversation_id);
        for entry in self.messages.scan_prefix(prefix.as_bytes()).rev().flatten() {
            let (_, val) = entry;
            if let Ok(msg) = serde_json::from_slice::<ChatMessage>(&val) {
                return Ok(Some(msg));
            }
        }
        Ok(None)
    }
}

impl Clone for ConversationStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            messages: self.messages.clone(),
        }
    }
}
