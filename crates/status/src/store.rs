use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for `Store` errors.
pub trait StoreError: Debug + Error + Send + Sync + 'static {}

/// A key-value store with asynchronous operations.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    /// The error type for store operations.
    type Error: StoreError;

    /// Deletes a key. Deleting a missing key is not an error.
    async fn del<K: Into<String> + Send>(&self, key: K) -> Result<(), Self::Error>;

    /// Retrieves the value stored under a key.
    async fn get<K: Into<String> + Send>(&self, key: K) -> Result<Option<Bytes>, Self::Error>;

    /// All keys in the store, in no particular order.
    async fn keys(&self) -> Result<Vec<String>, Self::Error>;

    /// Stores a value under a key.
    async fn put<K: Into<String> + Send>(&self, key: K, bytes: Bytes) -> Result<(), Self::Error>;
}
