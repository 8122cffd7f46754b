//! Finds the fleet member currently serving the engine by probing candidates
//! in preference order.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod discovery;
mod error;
mod membership;
mod prober;
mod types;

pub use discovery::{DEFAULT_PROBE_TIMEOUT, EndpointDiscovery, EndpointDiscoveryOptions};
pub use error::{Error, Result};
pub use membership::{FileMembership, FleetMembership, MembershipError, StaticMembership};
pub use prober::{HandshakeProber, Prober, TcpConnectProber};
pub use types::{CandidateEndpoint, LiveEndpoint};
