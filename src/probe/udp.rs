//! UDP probe transport.
//!
//! Each exchange uses a fresh ephemeral socket so concurrent probes never
//! have to demultiplex each other's answers. Frames are bincode-encoded
//! [`ProbeFrame`]s that fit in a single datagram.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use super::{ProbeName, ProbeRequest, ProbeResponder, ProbeResponse, ProbeTransport};
use crate::error::{ProbeError, Result};
use crate::types::Name;

/// Maximum encoded frame size.
pub const MAX_FRAME: usize = 1500;

/// Probe datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeFrame {
    Request(ProbeRequest),
    Response(ProbeResponse),
    Nack { name: Name },
}

impl ProbeFrame {
    /// Serialize to bytes.
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, ProbeError> {
        let bytes =
            bincode::serialize(self).map_err(|e| ProbeError::Serialization(e.to_string()))?;
        if bytes.len() > MAX_FRAME {
            return Err(ProbeError::Serialization(format!(
                "frame of {} bytes exceeds {MAX_FRAME}",
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    /// Deserialize from bytes.
    pub fn from_bytes(data: &[u8]) -> std::result::Result<Self, ProbeError> {
        bincode::deserialize(data).map_err(|e| ProbeError::Deserialization(e.to_string()))
    }
}

/// Probe transport addressing neighbors by configured UDP endpoints.
#[derive(Debug, Default)]
pub struct UdpProbeTransport {
    routes: DashMap<Name, SocketAddr>,
}

impl UdpProbeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the endpoint where `neighbor` answers probes.
    pub fn add_route(&self, neighbor: Name, addr: SocketAddr) {
        self.routes.insert(neighbor, addr);
    }

    pub fn remove_route(&self, neighbor: &Name) -> Option<SocketAddr> {
        self.routes.remove(neighbor).map(|(_, addr)| addr)
    }

    fn route(&self, request: &ProbeRequest) -> Result<SocketAddr> {
        let probe = ProbeName::parse(&request.name)?;
        self.routes
            .get(&probe.neighbor)
            .map(|entry| *entry.value())
            .ok_or_else(|| ProbeError::NoRoute(probe.neighbor).into())
    }
}

#[async_trait]
impl ProbeTransport for UdpProbeTransport {
    async fn exchange(&self, request: &ProbeRequest) -> Result<Option<ProbeResponse>> {
        let remote = self.route(request)?;
        let bind: SocketAddr = if remote.is_ipv6() {
            SocketAddr::from(([0u16; 8], 0))
        } else {
            SocketAddr::from(([0u8; 4], 0))
        };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| ProbeError::BindFailed {
                addr: bind,
                reason: e.to_string(),
            })?;
        socket
            .connect(remote)
            .await
            .map_err(|e| ProbeError::SendFailed(e.to_string()))?;

        let frame = ProbeFrame::Request(request.clone()).to_bytes()?;
        socket
            .send(&frame)
            .await
            .map_err(|e| ProbeError::SendFailed(e.to_string()))?;

        let mut buf = vec![0u8; MAX_FRAME];
        loop {
            let len = socket
                .recv(&mut buf)
                .await
                .map_err(|e| ProbeError::ReceiveFailed(e.to_string()))?;
            match ProbeFrame::from_bytes(&buf[..len]) {
                Ok(ProbeFrame::Response(response)) if response.name == request.name => {
                    return Ok(Some(response));
                }
                Ok(ProbeFrame::Nack { name }) if name == request.name => return Ok(None),
                Ok(_) => {
                    tracing::trace!(name = %request.name, "Ignoring unrelated probe frame");
                }
                Err(e) => {
                    tracing::debug!(name = %request.name, error = %e, "Malformed probe frame");
                }
            }
        }
    }
}

/// Answer probe requests arriving on `socket` until `shutdown` fires.
///
/// Requests outside the responder's namespace get a nack.
pub async fn serve_probes(
    socket: Arc<UdpSocket>,
    responder: ProbeResponder,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut buf = vec![0u8; MAX_FRAME];
    loop {
        let (len, peer) = tokio::select! {
            received = socket.recv_from(&mut buf) => {
                received.map_err(|e| ProbeError::ReceiveFailed(e.to_string()))?
            }
            _ = shutdown.recv() => {
                tracing::debug!(prefix = %responder.prefix(), "Probe responder stopping");
                return Ok(());
            }
        };

        let request = match ProbeFrame::from_bytes(&buf[..len]) {
            Ok(ProbeFrame::Request(request)) => request,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "Dropping malformed probe");
                continue;
            }
        };

        let reply = match responder.respond(&request) {
            Ok(Some(response)) => ProbeFrame::Response(response),
            Ok(None) => ProbeFrame::Nack { name: request.name },
            Err(e) => {
                tracing::warn!(name = %request.name, error = %e, "Failed to answer probe");
                continue;
            }
        };

        let bytes = match reply.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "Failed to encode probe reply");
                continue;
            }
        };
        if let Err(e) = socket.send_to(&bytes, peer).await {
            tracing::debug!(peer = %peer, error = %e, "Probe reply send failed");
        }
    }
}
