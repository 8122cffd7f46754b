use std::fmt;

use serde::{Deserialize, Serialize};

/// One fleet member that may be serving.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct CandidateEndpoint {
    /// Instance identifier, e.g. `MongoWorkerRole_IN_1`.
    pub instance_id: String,

    /// Host name or IP address.
    pub address: String,

    /// Engine port.
    pub port: u16,
}

/// A candidate that answered its liveness probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LiveEndpoint {
    /// Host name or IP address, as given by the candidate.
    pub address: String,

    /// Engine port.
    pub port: u16,
}

impl fmt::Display for LiveEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

impl From<&CandidateEndpoint> for LiveEndpoint {
    fn from(candidate: &CandidateEndpoint) -> Self {
        Self {
            address: candidate.address.clone(),
            port: candidate.port,
        }
    }
}
