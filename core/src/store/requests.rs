/// Friend request repository — pending requests keyed by request id
use crate::error::{ChatError, Result};
use crate::types::FriendRequest;
use std::path::Path;
use uuid::Uuid;

pub struct RequestStore {
    db: sled::Db,
}

impl RequestStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db = sled::open(data_dir.join("requests.db"))
            .map_err(|e| ChatError::Storage(format!("requests DB: {}", e)))?;
        Ok(Self { db })
    }

    /// Persist a new pending request. No uniqueness guard on the
    /// (sender, receipt) pair; two concurrent sends for the same pair
    /// both succeed (known open issue, see DESIGN.md).
    pub fn create(&self, sender: &str, receipt: &str) -> Result<FriendRequest> {
        let request = FriendRequest {
            request_id: Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            receipt: receipt.to_string(),
            created_at: chrono::Utc::now(),
        };
        let val = serde_json::to_vec(&request)?;
        self.db
            .insert(request.request_id.as_bytes(), val)
            .map_err(|e| ChatError::Storage(format!("create request: {}", e)))?;
        Ok(request)
    }

    pub fn get(&self, request_id: &str) -> Result<Option<FriendRequest>> {
        match self
            .db
            .get(request_id.as_bytes())
            .map_err(|e| ChatError::Storage(format!("get request: {}", e)))?
        {
            Some(val) => Ok(Some(serde_json::from_slice(&val)?)),
            None => Ok(None),
        }
    }

    /// Delete a request; idempotent, returns whether it existed.
    pub fn delete(&self, request_id: &str) -> Result<bool> {
        let removed = self
            .db
            .remove(request_id.as_bytes())
            .map_err(|e| ChatError::Storage(format!("delete request: {}", e)))?;
        Ok(removed.is_some())
    }

    /// All pending requests addressed to `receipt`.
    pub fn pending_for(&self, receipt: &str) -> Result<Vec<FriendRequest>> {
        let mut out = Vec::new();
        for entry in self.db.iter().flatten() {
            let (_, val) = entry;
            if let Ok(req) = serde_json::from_slice::<FriendRequest>(&val) {
                if req.receipt == receipt {
                    out.push(req);
                }
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }
}

impl Clone for RequestStore {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}
