//! Tokio-backed probe face.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Face, ProbeName, ProbeOutcome, ProbeOutcomeKind, ProbeRequest, ProbeResponse};
use crate::error::{ProbeError, Result};

/// Async request/response exchange for a single probe.
#[async_trait]
pub trait ProbeTransport: Send + Sync + 'static {
    /// Send `request` and wait for the neighbor's answer.
    ///
    /// `Ok(None)` means the network explicitly refused the request (nack).
    async fn exchange(&self, request: &ProbeRequest) -> Result<Option<ProbeResponse>>;
}

/// Face that runs each probe as a tokio task bounded by the probe lifetime.
pub struct TokioFace<T> {
    transport: Arc<T>,
    outcomes: mpsc::UnboundedSender<ProbeOutcome>,
}

impl<T: ProbeTransport> TokioFace<T> {
    /// Create a face and the receiver its outcomes are delivered to.
    pub fn new(transport: Arc<T>) -> (Self, mpsc::UnboundedReceiver<ProbeOutcome>) {
        let (outcomes, rx) = mpsc::unbounded_channel();
        (Self { transport, outcomes }, rx)
    }
}

impl<T: ProbeTransport> Face for TokioFace<T> {
    fn express(&self, request: ProbeRequest) -> Result<()> {
        let probe = ProbeName::parse(&request.name)?;
        let handle = tokio::runtime::Handle::try_current().map_err(|_| ProbeError::NoRuntime)?;
        let transport = Arc::clone(&self.transport);
        let outcomes = self.outcomes.clone();

        handle.spawn(async move {
            let kind =
                match tokio::time::timeout(request.lifetime, transport.exchange(&request)).await {
                    Ok(Ok(Some(response))) if response.name == request.name => {
                        ProbeOutcomeKind::Data
                    }
                    Ok(Ok(Some(response))) => {
                        tracing::debug!(
                            expected = %request.name,
                            got = %response.name,
                            "Probe response name mismatch"
                        );
                        ProbeOutcomeKind::Nack
                    }
                    Ok(Ok(None)) => ProbeOutcomeKind::Nack,
                    Ok(Err(e)) => {
                        tracing::debug!(name = %request.name, error = %e, "Probe exchange failed");
                        ProbeOutcomeKind::Nack
                    }
                    Err(_) => ProbeOutcomeKind::Timeout,
                };
            // Receiver gone means the daemon is shutting down.
            let _ = outcomes.send(ProbeOutcome::new(&probe, kind));
        });

        Ok(())
    }
}
