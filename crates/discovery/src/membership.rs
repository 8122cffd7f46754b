use std::error::Error as StdError;
use std::fmt::Debug;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;

use crate::error::Error;
use crate::types::CandidateEndpoint;

/// Marker trait for `FleetMembership` errors.
pub trait MembershipError: Debug + StdError + Send + Sync + 'static {}

/// Source of the current, ordered set of fleet members.
#[async_trait]
pub trait FleetMembership: Send + Sync + 'static {
    /// The error type for membership lookups.
    type Error: MembershipError;

    /// Current members, most preferred first.
    async fn members(&self) -> Result<Vec<CandidateEndpoint>, Self::Error>;
}

/// A fixed member list.
#[derive(Clone, Debug, Default)]
pub struct StaticMembership {
    members: Vec<CandidateEndpoint>,
}

impl StaticMembership {
    /// Creates a membership that always returns `members`.
    #[must_use]
    pub const fn new(members: Vec<CandidateEndpoint>) -> Self {
        Self { members }
    }
}

#[async_trait]
impl FleetMembership for StaticMembership {
    type Error = Error;

    async fn members(&self) -> Result<Vec<CandidateEndpoint>, Self::Error> {
        Ok(self.members.clone())
    }
}

#[derive(Debug, Deserialize)]
struct FleetFile {
    members: Vec<CandidateEndpoint>,
}

/// Membership read from a JSON fleet file on every lookup.
///
/// ```json
/// { "members": [ { "instance_id": "MongoWorkerRole_IN_0", "address": "10.0.0.4", "port": 27017 } ] }
/// ```
#[derive(Clone, Debug)]
pub struct FileMembership {
    path: PathBuf,
}

impl FileMembership {
    /// Creates a membership backed by the fleet file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FleetMembership for FileMembership {
    type Error = Error;

    async fn members(&self) -> Result<Vec<CandidateEndpoint>, Self::Error> {
        let bytes = fs::read(&self.path)
            .await
            .map_err(|e| Error::Io("failed to read fleet file", e))?;
        let fleet: FleetFile = serde_json::from_slice(&bytes)?;

        Ok(fleet.members)
    }
}
