//! CONNECT tunnels.
//!
//! `Dial → SendToken → HijackClient → Acknowledge → Relay → Teardown`. Both
//! connections are owned by [`Bridge::tunnel`] and dropped on every exit.

use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::bridge::relay::relay;
use crate::bridge::upstream::{destination_for, UpstreamStream};
use crate::bridge::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::http::{ClientRequest, ResponseWriter};

/// Sent to the client once the upstream side of the tunnel is ready.
pub const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.0 200 Connection established\r\n\r\n";

impl Bridge {
    pub(crate) async fn tunnel<S>(
        &self,
        req: ClientRequest,
        mut resp: ResponseWriter<S>,
    ) -> BridgeResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let upstream = match self.open_tunnel(&req).await {
            Ok(upstream) => upstream,
            Err(err) => {
                resp.fail(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
                    .await;
                return Err(err);
            }
        };

        let mut client = resp.hijack();
        let conn = client.conn_mut();
        conn.write_all(CONNECT_ESTABLISHED)
            .await
            .map_err(BridgeError::Client)?;
        conn.flush().await.map_err(BridgeError::Client)?;

        let (client_rx, client_tx) = client.into_split();
        let stats = relay(upstream, client_rx, client_tx).await;
        trace!(
            peer = ?req.peer_addr,
            sent = ?stats.outbound,
            received = ?stats.inbound,
            "Tunnel closed"
        );
        Ok(())
    }

    /// Dials and writes the destination token.
    async fn open_tunnel(&self, req: &ClientRequest) -> BridgeResult<UpstreamStream> {
        let host = req.host().ok_or(BridgeError::MissingHost)?;
        let target = destination_for(&host);

        let mut upstream = self.connector.connect().await?;
        self.log_session(req, &target);
        let token = self.encoder.encode(&target)?;
        upstream
            .write_all(&token)
            .await
            .map_err(BridgeError::SendDestination)?;
        // Tunnelled protocols may wait for the server to speak first.
        upstream
            .flush()
            .await
            .map_err(BridgeError::SendDestination)?;
        Ok(upstream)
    }
}
