use crate::config::StoreConfig;
use crate::error::AppError;
use fjall::KeyspaceCreateOptions;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

/// A key-value pair of raw bytes from a scan.
pub type RawKvPair = (Vec<u8>, Vec<u8>);

#[derive(Clone)]
pub struct Store {
    db: fjall::Database,
}

#[derive(Clone)]
pub struct KeyspaceHandle {
    keyspace: fjall::Keyspace,
}

impl Store {
    pub fn open(config: &StoreConfig) -> Result<Self, AppError> {
        std::fs::create_dir_all(&config.data_dir).map_err(AppError::Io)?;

        info!(path = %config.data_dir.display(), "opening store");

        let db = fjall::Database::builder(&config.data_dir).open()?;

        Ok(Self { db })
    }

    pub fn keyspace(&self, name: &str) -> Result<KeyspaceHandle, AppError> {
        let keyspace = self.db.keyspace(name, KeyspaceCreateOptions::default)?;
        Ok(KeyspaceHandle { keyspace })
    }
}

impl KeyspaceHandle {
    pub async fn insert<V: Serialize>(
        &self,
        key: impl Into<Vec<u8>>,
        value: &V,
    ) -> Result<(), AppError> {
        let key = key.into();
        let bytes = serde_json::to_vec(value)?;
        let ks = self.keyspace.clone();
        tokio::task::spawn_blocking(move || ks.insert(key, bytes))
            .await
            .map_err(|e| AppError::Internal(format!("blocking task panicked: {e}")))??;
        Ok(())
    }

    pub async fn get<V: DeserializeOwned + Send + 'static>(
        &self,
        key: impl Into<Vec<u8>>,
    ) -> Result<Option<V>, AppError> {
        let key = key.into();
        let ks = self.keyspace.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<V>, AppError> {
            match ks.get(key)? {
                Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| AppError::Internal(format!("blocking task panicked: {e}")))?
    }

    pub async fn insert_raw(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Result<(), AppError> {
        let key = key.into();
        let value = value.into();
        let ks = self.keyspace.clone();
        tokio::task::spawn_blocking(move || ks.insert(key, value))
            .await
            .map_err(|e| AppError::Internal(format!("blocking task panicked: {e}")))??;
        Ok(())
    }

    /// Iterate all key-value pairs whose key starts with `prefix`, in key
    /// order.
    pub async fn prefix_iter_raw(
        &self,
        prefix: impl Into<Vec<u8>>,
    ) -> Result<Vec<RawKvPair>, AppError> {
        let prefix = prefix.into();
        let ks = self.keyspace.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<RawKvPair>, AppError> {
            let mut results = Vec::new();
            for guard in ks.prefix(&prefix) {
                let (key, value) = guard.into_inner()?;
                results.push((key.to_vec(), value.to_vec()));
            }
            Ok(results)
        })
        .await
        .map_err(|e| AppError::Internal(format!("blocking task panicked: {e}")))?
    }

    /// Iterate key-value pairs starting at `start` (inclusive), in key order,
    /// up to `limit` pairs when given.
    pub async fn range_iter_raw(
        &self,
        start: impl Into<Vec<u8>>,
        limit: Option<usize>,
    ) -> Result<Vec<RawKvPair>, AppError> {
        let start = start.into();
        let ks = self.keyspace.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<RawKvPair>, AppError> {
            let mut results = Vec::new();
            for guard in ks.range(start..) {
                if limit.is_some_and(|limit| results.len() >= limit) {
                    break;
                }
                let (key, value) = guard.into_inner()?;
                results.push((key.to_vec(), value.to_vec()));
            }
            Ok(results)
        })
        .await
        .map_err(|e| AppError::Internal(format!("blocking task panicked: {e}")))?
    }
}
