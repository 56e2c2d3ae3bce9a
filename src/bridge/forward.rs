//! Plain HTTP forwarding over a fresh upstream connection.

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{Request, StatusCode, Version};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::bridge::headers::copy_headers;
use crate::bridge::upstream::destination_for;
use crate::bridge::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::http::{ClientRequest, ResponseWriter};

impl Bridge {
    /// Sends one request upstream and relays the response back.
    ///
    /// Failures before the status line has gone out answer `500`.
    pub(crate) async fn forward<S>(
        &self,
        req: ClientRequest,
        mut resp: ResponseWriter<S>,
    ) -> BridgeResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self.exchange(req, &mut resp).await {
            Ok(()) => resp.finish().await.map_err(BridgeError::Client),
            Err(err) => {
                resp.fail(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
                    .await;
                Err(err)
            }
        }
    }

    async fn exchange<S>(&self, req: ClientRequest, resp: &mut ResponseWriter<S>) -> BridgeResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let host = req.host().ok_or(BridgeError::MissingHost)?;
        let target = destination_for(&host);

        let mut upstream = self.connector.connect().await?;
        self.log_session(&req, &target);
        let token = self.encoder.encode(&target)?;
        upstream
            .write_all(&token)
            .await
            .map_err(BridgeError::SendDestination)?;

        let outgoing = self.build_request(req)?;

        let (mut sender, conn) = http1::Builder::new()
            .title_case_headers(true)
            .handshake(TokioIo::new(upstream))
            .await
            .map_err(BridgeError::Upstream)?;
        tokio::spawn(async move {
            if let Err(err) = conn.await {
                debug!(error = %err, "Upstream connection ended");
            }
        });

        let response = sender
            .send_request(outgoing)
            .await
            .map_err(BridgeError::Upstream)?;
        drop(sender);

        let (parts, mut body) = response.into_parts();
        copy_headers(resp.headers_mut(), &parts.headers);
        resp.write_head(parts.status)
            .await
            .map_err(BridgeError::Client)?;

        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(BridgeError::Upstream)?;
            if let Ok(data) = frame.into_data() {
                resp.write_body(&data).await.map_err(BridgeError::Client)?;
            }
        }
        Ok(())
    }

    /// Rewrites a client request into its upstream form.
    pub(crate) fn build_request(&self, req: ClientRequest) -> BridgeResult<Request<Full<Bytes>>> {
        let path = req
            .uri
            .path_and_query()
            .map(|p| p.as_str())
            .filter(|p| !p.is_empty())
            .unwrap_or("/");

        let mut outgoing = Request::builder()
            .method(req.method.clone())
            .uri(path)
            .version(Version::HTTP_11)
            .body(Full::new(req.body.clone()))
            .map_err(BridgeError::BuildRequest)?;

        let headers = outgoing.headers_mut();
        copy_headers(headers, &req.headers);
        if let Some(authority) = req.target_authority() {
            let host = HeaderValue::from_str(authority)
                .map_err(|err| BridgeError::BuildRequest(err.into()))?;
            headers.insert(header::HOST, host);
        }
        if let Some(agent) = &self.user_agent {
            headers.insert(header::USER_AGENT, agent.clone());
        }
        Ok(outgoing)
    }
}
