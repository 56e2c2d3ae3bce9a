//! Bidirectional byte relay for tunnels.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tracing::trace;

/// Bytes moved by a finished relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Client to upstream. `None` if the copy was stopped early.
    pub outbound: Option<u64>,
    /// Upstream to client. `None` if the copy failed.
    pub inbound: Option<u64>,
}

/// Copies bytes between the upstream and the client until both directions
/// have finished.
///
/// Copy errors end their direction like EOF does and are not returned.
/// When the client side ends, the upstream write half is shut down and the
/// upstream may keep answering. When the upstream side ends, the client write
/// half is shut down and reading from the client stops.
pub async fn relay<U, R, W>(upstream: U, mut client_rx: R, mut client_tx: W) -> RelayStats
where
    U: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (mut upstream_rx, mut upstream_tx) = tokio::io::split(upstream);
    let upstream_done = Notify::new();

    let outbound = async {
        let res = tokio::select! {
            res = tokio::io::copy(&mut client_rx, &mut upstream_tx) => Some(res),
            _ = upstream_done.notified() => None,
        };
        upstream_tx.shutdown().await.ok();
        trace!(?res, "relay client-to-upstream finished");
        res.and_then(Result::ok)
    };

    let inbound = async {
        let res = tokio::io::copy(&mut upstream_rx, &mut client_tx).await;
        client_tx.shutdown().await.ok();
        upstream_done.notify_one();
        trace!(?res, "relay upstream-to-client finished");
        res.ok()
    };

    let (outbound, inbound) = tokio::join!(outbound, inbound);
    RelayStats { outbound, inbound }
}
