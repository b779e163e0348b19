//! Initial snapshots for a newly accepted connection.

use opsboard_sources::SourceSet;
use tracing::{debug, warn};

use crate::broadcast::ConnectionHandle;

/// Fetch one snapshot per registered domain and queue it on `connection`.
///
/// Events go out in handshake order (`infrastructure-services`, `metrics`,
/// `deployments`, `pipeline`, `web3-networks`). A domain whose source fails
/// is skipped; the steady-state poller will deliver it later. Returns the
/// number of events queued.
pub async fn send_initial_snapshots(sources: &SourceSet, connection: &ConnectionHandle) -> usize {
    let mut sent = 0;

    for (domain, result) in sources.fetch_all().await {
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    connection_id = connection.id(),
                    domain = %domain,
                    error = %e,
                    "Initial snapshot unavailable"
                );
                continue;
            }
        };

        for msg in snapshot.into_messages() {
            if connection.send(&msg).await.is_err() {
                debug!(connection_id = connection.id(), "Connection closed during handshake");
                return sent;
            }
            sent += 1;
        }
    }

    debug!(connection_id = connection.id(), events = sent, "Handshake complete");
    sent
}
