use std::time::Duration;

use tokio::net::lookup_host;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::membership::FleetMembership;
use crate::prober::Prober;
use crate::types::{CandidateEndpoint, LiveEndpoint};

/// Default bound on a single candidate's probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Options for configuring `EndpointDiscovery`.
pub struct EndpointDiscoveryOptions<P> {
    /// Liveness check to run against each candidate.
    pub prober: P,

    /// Bound on each candidate, resolution included.
    pub probe_timeout: Duration,
}

/// Finds which fleet member is currently serving.
pub struct EndpointDiscovery<P>
where
    P: Prober,
{
    prober: P,
    probe_timeout: Duration,
}

impl<P> EndpointDiscovery<P>
where
    P: Prober,
{
    /// Creates a new instance of `EndpointDiscovery`.
    pub fn new(
        EndpointDiscoveryOptions {
            prober,
            probe_timeout,
        }: EndpointDiscoveryOptions<P>,
    ) -> Self {
        Self {
            prober,
            probe_timeout,
        }
    }

    /// Returns the first candidate, in the given order, that passes its
    /// probe. Candidates after the first live one are not probed.
    ///
    /// # Errors
    ///
    /// Returns `NoLiveEndpoint` when every candidate fails or times out.
    pub async fn find_live_endpoint(
        &self,
        candidates: &[CandidateEndpoint],
    ) -> Result<LiveEndpoint> {
        for candidate in candidates {
            match timeout(self.probe_timeout, self.probe_candidate(candidate)).await {
                Ok(Ok(())) => {
                    let live = LiveEndpoint::from(candidate);
                    info!(
                        instance_id = %candidate.instance_id,
                        endpoint = %live,
                        "found live endpoint"
                    );

                    return Ok(live);
                }
                Ok(Err(e)) => {
                    debug!(instance_id = %candidate.instance_id, "probe failed: {}", e);
                }
                Err(_) => {
                    debug!(
                        instance_id = %candidate.instance_id,
                        "probe timed out after {:?}", self.probe_timeout
                    );
                }
            }
        }

        warn!(candidates = candidates.len(), "no live endpoint found");

        Err(Error::NoLiveEndpoint {
            candidates: candidates.len(),
        })
    }

    /// Reads the current membership and runs `find_live_endpoint` over it.
    ///
    /// # Errors
    ///
    /// Returns `Membership` if the member list cannot be read, otherwise as
    /// `find_live_endpoint`.
    pub async fn discover<M>(&self, membership: &M) -> Result<LiveEndpoint>
    where
        M: FleetMembership,
    {
        let candidates = membership
            .members()
            .await
            .map_err(|e| Error::Membership(Box::new(e)))?;

        self.find_live_endpoint(&candidates).await
    }

    async fn probe_candidate(&self, candidate: &CandidateEndpoint) -> Result<()> {
        let addrs = lookup_host((candidate.address.as_str(), candidate.port))
            .await
            .map_err(|source| Error::Resolve {
                address: candidate.address.clone(),
                source,
            })?;

        let mut last_error = None;
        for addr in addrs {
            match self.prober.probe(addr).await {
                Ok(()) => return Ok(()),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Resolve {
            address: candidate.address.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
        }))
    }
}
