/// Identity provider: resolves a connection credential to a verified user
use crate::error::{ChatError, Result};
use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use std::path::Path;
use uuid::Uuid;

/// Hash a raw token for storage/lookup (base64 of SHA-256).
fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    general_purpose::STANDARD.encode(hasher.finalize())
}

/// Resolves an inbound connection credential to a verified identity
/// before any session logic runs. The production implementation is
/// [`TokenRegistry`]; tests may substitute a fake.
pub trait IdentityProvider: Send + Sync {
    fn verify(&self, token: &str) -> Result<String>;
}

/// Sled-backed token registry. The (out-of-scope) HTTP auth layer
/// mints a token per login via `issue` and hands it to the client;
/// connections present that token as their first frame. Only the
/// token's digest is stored.
pub struct TokenRegistry {
    db: sled::Db,
}

impl TokenRegistry {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db = sled::open(data_dir.join("tokens.db"))
            .map_err(|e| ChatError::Storage(format!("tokens DB: {}", e)))?;
        Ok(Self { db })
    }

    /// Mint a connection token for an already-authenticated user.
    pub fn issue(&self, user_id: &str) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        self.db
            .insert(token_digest(&token).as_bytes(), user_id.as_bytes())
            .map_err(|e| ChatError::Storage(format!("issue token: {}", e)))?;
        Ok(token)
    }

    /// Invalidate a token; idempotent.
    pub fn revoke(&self, token: &str) -> Result<bool> {
        let removed = self
            .db
            .remove(token_digest(token).as_bytes())
            .map_err(|e| ChatError::Storage(format!("revoke token: {}", e)))?;
        Ok(removed.is_some())
    }
}

impl IdentityProvider for TokenRegistry {
    fn verify(&self, token: &str) -> Result<String> {
        match self
            .db
            .get(token_digest(token).as_bytes())
            .map_err(|e| ChatError::Storage(format!("verify token: {}", e)))?
        {
            Some(val) => String::from_utf8(val.to_vec())
                .map_err(|_| ChatError::Auth("Corrupt token record".to_string())),
            None => Err(ChatError::Auth("Unknown or revoked token".to_string())),
        }
    }
}

impl Clone for TokenRegistry {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}
