//! Abstract interface for services with a start/stop lifecycle.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::error::Error;

use async_trait::async_trait;

/// Trait for bootable services.
///
/// `wait` and `shutdown` are expected to be callable concurrently: one task
/// parks in `wait` for the lifetime of the service while another, driven by
/// an external signal, calls `shutdown`.
#[async_trait]
pub trait Bootable
where
    Self: Send + Sync + 'static,
{
    /// Error returned when the service fails to start.
    type Error: Error + Send + Sync + 'static;

    /// Get the name of the bootable service.
    fn name(&self) -> &str;

    /// Start the bootable service.
    async fn start(&self) -> Result<(), Self::Error>;

    /// Shutdown the bootable service.
    ///
    /// Shutdown is best-effort and never fails outwardly.
    async fn shutdown(&self);

    /// Wait for the bootable service to exit.
    async fn wait(&self);
}
