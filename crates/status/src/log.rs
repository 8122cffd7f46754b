use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::record::{NodeStatusRecord, reverse_chronological_key};
use crate::store::Store;

/// Options for configuring a `NodeStatusLog`.
pub struct NodeStatusLogOptions<S> {
    /// Where records are kept.
    pub store: S,

    /// Keep at most this many records, dropping the oldest on append.
    pub retain: Option<usize>,
}

/// Append-only log of node start records, read newest first.
#[derive(Clone, Debug)]
pub struct NodeStatusLog<S>
where
    S: Store,
{
    retain: Option<usize>,
    store: S,
}

impl<S> NodeStatusLog<S>
where
    S: Store,
{
    /// Creates a new instance of `NodeStatusLog`.
    pub fn new(NodeStatusLogOptions { store, retain }: NodeStatusLogOptions<S>) -> Self {
        Self { retain, store }
    }

    /// Appends a record and returns its key.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written. Pruning failures
    /// are only logged.
    pub async fn append(&self, record: &NodeStatusRecord) -> Result<String> {
        let key = reverse_chronological_key(record.start_time);
        let bytes = serde_json::to_vec(record).map_err(Error::Serialize)?;

        self.store
            .put(key.clone(), Bytes::from(bytes))
            .await
            .map_err(|e| Error::Store(Box::new(e)))?;

        debug!(%key, instance = %record.instance_name, "appended status record");

        if let Some(retain) = self.retain {
            if let Err(e) = self.prune(retain).await {
                warn!("failed to prune status log: {}", e);
            }
        }

        Ok(key)
    }

    /// The most recent record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the record is corrupt.
    pub async fn latest(&self) -> Result<Option<NodeStatusRecord>> {
        Ok(self.list(1).await?.into_iter().next())
    }

    /// Up to `limit` records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or a record is corrupt.
    pub async fn list(&self, limit: usize) -> Result<Vec<NodeStatusRecord>> {
        let keys = self.sorted_keys().await?;
        let mut records = Vec::with_capacity(limit.min(keys.len()));

        for key in keys.into_iter().take(limit) {
            let Some(bytes) = self
                .store
                .get(key)
                .await
                .map_err(|e| Error::Store(Box::new(e)))?
            else {
                // deleted by a concurrent prune
                continue;
            };

            records.push(serde_json::from_slice(&bytes).map_err(Error::Deserialize)?);
        }

        Ok(records)
    }

    /// Deletes all but the newest `retain` records. Returns how many were
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or a delete fails.
    pub async fn prune(&self, retain: usize) -> Result<usize> {
        let stale: Vec<String> = self.sorted_keys().await?.into_iter().skip(retain).collect();

        for key in &stale {
            self.store
                .del(key.clone())
                .await
                .map_err(|e| Error::Store(Box::new(e)))?;
        }

        Ok(stale.len())
    }

    async fn sorted_keys(&self) -> Result<Vec<String>> {
        let mut keys = self
            .store
            .keys()
            .await
            .map_err(|e| Error::Store(Box::new(e)))?;
        keys.sort_unstable();
        Ok(keys)
    }
}
