//! Entity storage collaborator.
//!
//! Handlers reach storage through [`Storage`]; typed access goes through
//! [`StorageExt`], which stores values as JSON.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("stored value could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage backend failed: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyId {
    Int(i64),
    Name(String),
}

/// Entity key: a kind plus an integer or string id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    kind: String,
    id: KeyId,
}

impl Key {
    pub fn int(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id: KeyId::Int(id),
        }
    }

    pub fn named(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: KeyId::Name(name.into()),
        }
    }

    /// Integer key from a textual id, as found in URLs. `None` if the id is
    /// not an integer.
    pub fn parse_int(kind: impl Into<String>, id: &str) -> Option<Self> {
        id.parse().ok().map(|n| Self::int(kind, n))
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> &KeyId {
        &self.id
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            KeyId::Int(n) => write!(f, "{}({})", self.kind, n),
            KeyId::Name(name) => write!(f, "{}({:?})", self.kind, name),
        }
    }
}

pub trait Storage: Send + Sync {
    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&self, key: &Key, value: Vec<u8>) -> Result<(), StorageError>;
    /// Returns whether an entity was removed.
    fn delete(&self, key: &Key) -> Result<bool, StorageError>;
}

/// Typed JSON access over any [`Storage`].
pub trait StorageExt: Storage {
    fn get_json<T: DeserializeOwned>(&self, key: &Key) -> Result<Option<T>, StorageError> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, key: &Key, value: &T) -> Result<(), StorageError> {
        self.put(key, serde_json::to_vec(value)?)
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entities: Arc<DashMap<Key, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entities.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: &Key, value: Vec<u8>) -> Result<(), StorageError> {
        self.entities.insert(key.clone(), value);
        Ok(())
    }

    fn delete(&self, key: &Key) -> Result<bool, StorageError> {
        Ok(self.entities.remove(key).is_some())
    }
}
