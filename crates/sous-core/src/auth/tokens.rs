//! Session tokens persisted in the kv store.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::StorageError;
use crate::storage::KvStore;

pub const ACCESS_TOKEN_KEY: &str = "auth.access_token";
pub const REFRESH_TOKEN_KEY: &str = "auth.refresh_token";

/// Bearer credentials. Field names match the refresh endpoint and the
/// native refresh reply (`accessToken`, `refreshToken`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Clone)]
pub struct TokenStore {
    kv: Arc<dyn KvStore>,
}

impl TokenStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn load(&self) -> Result<Option<SessionTokens>, StorageError> {
        let Some(access_token) = self.access_token()? else {
            return Ok(None);
        };
        Ok(Some(SessionTokens {
            access_token,
            refresh_token: self.refresh_token()?,
        }))
    }

    pub fn access_token(&self) -> Result<Option<String>, StorageError> {
        self.kv.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        self.kv.get(REFRESH_TOKEN_KEY)
    }

    /// Store `tokens`. A missing refresh token keeps the one already stored.
    pub fn save(&self, tokens: &SessionTokens) -> Result<(), StorageError> {
        self.kv.set(ACCESS_TOKEN_KEY, &tokens.access_token)?;
        if let Some(refresh) = &tokens.refresh_token {
            self.kv.set(REFRESH_TOKEN_KEY, refresh)?;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.kv.remove(ACCESS_TOKEN_KEY)?;
        self.kv.remove(REFRESH_TOKEN_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;

    #[test]
    fn save_keeps_refresh_token_when_absent() {
        let store = TokenStore::new(Arc::new(MemoryKv::new()));
        assert!(store.load().unwrap().is_none());

        store
            .save(&SessionTokens {
                access_token: "a1".into(),
                refresh_token: Some("r1".into()),
            })
            .unwrap();
        store
            .save(&SessionTokens {
                access_token: "a2".into(),
                refresh_token: None,
            })
            .unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token, "a2");
        assert_eq!(loaded.refresh_token.as_deref(), Some("r1"));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(store.refresh_token().unwrap().is_none());
    }

    #[test]
    fn deserializes_camel_case_reply() {
        let t: SessionTokens = serde_json::from_str(r#"{"accessToken":"x"}"#).unwrap();
        assert_eq!(t.access_token, "x");
        assert!(t.refresh_token.is_none());
    }
}
