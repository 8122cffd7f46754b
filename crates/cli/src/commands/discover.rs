use std::time::Duration;

use fleetnode_discovery::{
    EndpointDiscovery, EndpointDiscoveryOptions, FileMembership, HandshakeProber, Prober,
    TcpConnectProber,
};
use tracing::info;

use crate::DiscoverArgs;
use crate::error::Result;

pub async fn discover(args: DiscoverArgs) -> Result<()> {
    let probe_timeout = Duration::from_millis(args.probe_timeout_ms);
    let membership = FileMembership::new(&args.fleet_file);

    info!(fleet_file = %args.fleet_file.display(), "discovering live endpoint");

    let live = if args.handshake {
        find(HandshakeProber::new(probe_timeout), probe_timeout, &membership).await?
    } else {
        find(TcpConnectProber, probe_timeout, &membership).await?
    };

    println!("{live}");

    Ok(())
}

async fn find<P: Prober>(
    prober: P,
    probe_timeout: Duration,
    membership: &FileMembership,
) -> Result<fleetnode_discovery::LiveEndpoint> {
    let discovery = EndpointDiscovery::new(EndpointDiscoveryOptions {
        prober,
        probe_timeout,
    });

    Ok(discovery.discover(membership).await?)
}
