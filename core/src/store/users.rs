/// User repository — persists user records in sled DB
use crate::error::{ChatError, Result};
use crate::types::{PresenceStatus, UserRecord, UserSummary};
use std::path::Path;

pub struct UserStore {
    db: sled::Db,
}

impl UserStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db = sled::open(data_dir.join("users.db"))
            .map_err(|e| ChatError::Storage(format!("users DB: {}", e)))?;
        Ok(Self { db })
    }

    pub fn upsert(&self, user: &UserRecord) -> Result<()> {
        let val = serde_json::to_vec(user)?;
        self.db
            .insert(user.user_id.as_bytes(), val)
            .map_err(|e| ChatError::Storage(format!("upsert user: {}", e)))?;
        Ok(())
    }

    pub fn get(&self, user_id: &str) -> Result<Option<UserRecord>> {
        match self
            .db
            .get(user_id.as_bytes())
            .map_err(|e| ChatError::Storage(format!("get user: {}", e)))?
        {
            Some(val) => Ok(Some(serde_json::from_slice(&val)?)),
            None => Ok(None),
        }
    }

    /// Get a user that must exist.
    pub fn require(&self, user_id: &str) -> Result<UserRecord> {
        self.get(user_id)?
            .ok_or_else(|| ChatError::NotFound(format!("user {}", user_id)))
    }

    pub fn summary(&self, user_id: &str) -> Result<UserSummary> {
        Ok(self.require(user_id)?.summary())
    }

    /// Persist the Online/Offline status field.
    pub fn set_status(&self, user_id: &str, status: PresenceStatus) -> Result<()> {
        let mut user = self.require(user_id)?;
        user.status = status;
        self.upsert(&user)
    }

    /// Add `friend_id` to the user's friend set. Idempotent; retries on
    /// a concurrent write to the same record so no update is lost.
    pub fn add_friend(&self, user_id: &str, friend_id: &str) -> Result<()> {
        loop {
            let old = self
                .db
                .get(user_id.as_bytes())
                .map_err(|e| ChatError::Storage(format!("add_friend read: {}", e)))?
                .ok_or_else(|| ChatError::NotFound(format!("user {}", user_id)))?;

            let mut user: UserRecord = serde_json::from_slice(&old)?;
            if user.friends.iter().any(|f| f == friend_id) {
                return Ok(());
            }
            user.friends.push(friend_id.to_string());
            let new = serde_json::to_vec(&user)?;

            match self
                .db
                .compare_and_swap(user_id.as_bytes(), Some(old), Some(new))
                .map_err(|e| ChatError::Storage(format!("add_friend: {}", e)))?
            {
                Ok(()) => return Ok(()),
                Err(_) => continue, // lost a race, re-read and retry
            }
        }
    }
}

impl Clone for UserStore {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}
