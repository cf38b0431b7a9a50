//! Link probes.
//!
//! A probe is a short-lived, freshness-required request named
//! `<neighbor>/link-cost/rtt-probe/<seq>`. The neighbor answers with a signed
//! marker response under the same name; the round trip is the RTT sample.
//!
//! ```text
//!   LinkCostManager ──express──▶ Face ──▶ neighbor's ProbeResponder
//!         ▲                       │
//!         └──── ProbeOutcome ◀────┘   (Data | Nack | Timeout)
//! ```

mod face;
mod udp;

pub use face::{ProbeTransport, TokioFace};
pub use udp::{serve_probes, ProbeFrame, UdpProbeTransport};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ProbeError, Result};
use crate::types::Name;

/// Components appended to a router prefix to form the probe namespace.
pub const PROBE_COMPONENTS: [&str; 2] = ["link-cost", "rtt-probe"];

/// Marker payload carried by every probe response.
pub const PROBE_RESPONSE_CONTENT: &str = "rtt-response";

/// Freshness period of probe responses.
pub const PROBE_RESPONSE_FRESHNESS: Duration = Duration::from_millis(1000);

/// Namespace under which `router` answers probes.
pub fn probe_prefix(router: &Name) -> Name {
    PROBE_COMPONENTS
        .iter()
        .fold(router.clone(), |name, component| name.append(component))
}

/// Structured form of a probe name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeName {
    pub neighbor: Name,
    pub seq: u32,
}

impl ProbeName {
    pub fn new(neighbor: Name, seq: u32) -> Self {
        Self { neighbor, seq }
    }

    pub fn to_name(&self) -> Name {
        probe_prefix(&self.neighbor).append(self.seq)
    }

    /// Parse a full probe name back into neighbor and sequence number.
    pub fn parse(name: &Name) -> Result<Self> {
        let components: Vec<&str> = name.components().collect();
        let n = components.len();
        if n < 4 || components[n - 3] != PROBE_COMPONENTS[0] || components[n - 2] != PROBE_COMPONENTS[1]
        {
            return Err(ProbeError::InvalidName(name.to_string()).into());
        }
        let seq = components[n - 1]
            .parse::<u32>()
            .map_err(|_| ProbeError::InvalidName(name.to_string()))?;
        Ok(Self {
            neighbor: name.prefix(3),
            seq,
        })
    }
}

/// Outgoing probe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub name: Name,
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,
    pub must_be_fresh: bool,
}

impl ProbeRequest {
    pub fn new(probe: &ProbeName, lifetime: Duration) -> Self {
        Self {
            name: probe.to_name(),
            lifetime,
            must_be_fresh: true,
        }
    }
}

/// Signed probe response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub name: Name,
    pub content: String,
    #[serde(with = "humantime_serde")]
    pub freshness: Duration,
    pub signature: Vec<u8>,
}

/// How a probe ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcomeKind {
    /// Response received.
    Data,
    /// Negative acknowledgement from the network.
    Nack,
    /// Lifetime expired without an answer.
    Timeout,
}

/// Completion report for one expressed probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub neighbor: Name,
    pub seq: u32,
    pub kind: ProbeOutcomeKind,
}

impl ProbeOutcome {
    pub fn new(probe: &ProbeName, kind: ProbeOutcomeKind) -> Self {
        Self {
            neighbor: probe.neighbor.clone(),
            seq: probe.seq,
            kind,
        }
    }
}

/// Non-blocking outlet for probe requests.
///
/// `express` must return immediately; the outcome of every successfully
/// expressed request is reported later as a [`ProbeOutcome`].
pub trait Face: Send + Sync {
    fn express(&self, request: ProbeRequest) -> Result<()>;
}

/// Signs probe responses with the router's identity.
pub trait Signer: Send + Sync {
    fn sign(&self, name: &Name, content: &[u8]) -> Result<Vec<u8>>;
}

/// Answers probes addressed to this router.
#[derive(Clone)]
pub struct ProbeResponder {
    prefix: Name,
    signer: Arc<dyn Signer>,
}

impl ProbeResponder {
    pub fn new(router: &Name, signer: Arc<dyn Signer>) -> Self {
        let prefix = probe_prefix(router);
        tracing::debug!(prefix = %prefix, "Probe responder ready");
        Self { prefix, signer }
    }

    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    /// Build the response for `request`, or `None` when it is not ours.
    pub fn respond(&self, request: &ProbeRequest) -> Result<Option<ProbeResponse>> {
        if !self.prefix.is_prefix_of(&request.name) || request.name == self.prefix {
            return Ok(None);
        }
        let signature = self
            .signer
            .sign(&request.name, PROBE_RESPONSE_CONTENT.as_bytes())
            .map_err(|e| match e {
                Error::Signing(_) => e,
                other => Error::Signing(other.to_string()),
            })?;
        tracing::trace!(name = %request.name, "RTT response sent");
        Ok(Some(ProbeResponse {
            name: request.name.clone(),
            content: PROBE_RESPONSE_CONTENT.to_string(),
            freshness: PROBE_RESPONSE_FRESHNESS,
            signature,
        }))
    }
}

impl std::fmt::Debug for ProbeResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeResponder")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticSigner;

    impl Signer for StaticSigner {
        fn sign(&self, _name: &Name, content: &[u8]) -> Result<Vec<u8>> {
            Ok(content.iter().rev().copied().collect())
        }
    }

    struct FailingSigner;

    impl Signer for FailingSigner {
        fn sign(&self, _name: &Name, _content: &[u8]) -> Result<Vec<u8>> {
            Err(anyhow::anyhow!("key unavailable").into())
        }
    }

    #[test]
    fn test_probe_name_layout() {
        let probe = ProbeName::new(Name::from("/ndn/site/b"), 42);
        assert_eq!(probe.to_name().as_str(), "/ndn/site/b/link-cost/rtt-probe/42");
        assert_eq!(ProbeName::parse(&probe.to_name()).unwrap(), probe);
    }

    #[test]
    fn test_probe_name_rejects_foreign_names() {
        assert!(ProbeName::parse(&Name::from("/ndn/site/b/link-cost/rtt-probe/x")).is_err());
        assert!(ProbeName::parse(&Name::from("/ndn/site/b/hello/info/1")).is_err());
        assert!(ProbeName::parse(&Name::from("/link-cost/rtt-probe/1")).is_err());
    }

    #[test]
    fn test_request_is_fresh_and_short_lived() {
        let probe = ProbeName::new(Name::from("/b"), 1);
        let request = ProbeRequest::new(&probe, Duration::from_secs(4));
        assert!(request.must_be_fresh);
        assert_eq!(request.lifetime, Duration::from_secs(4));
    }

    #[test]
    fn test_responder_answers_own_prefix_only() {
        let responder = ProbeResponder::new(&Name::from("/ndn/site/a"), Arc::new(StaticSigner));
        let ours = ProbeRequest::new(&ProbeName::new(Name::from("/ndn/site/a"), 9), Duration::from_secs(1));
        let response = responder.respond(&ours).unwrap().unwrap();
        assert_eq!(response.name, ours.name);
        assert_eq!(response.content, PROBE_RESPONSE_CONTENT);
        assert_eq!(response.freshness, Duration::from_millis(1000));
        assert!(!response.signature.is_empty());

        let theirs = ProbeRequest::new(&ProbeName::new(Name::from("/ndn/site/c"), 9), Duration::from_secs(1));
        assert!(responder.respond(&theirs).unwrap().is_none());
    }

    #[test]
    fn test_responder_surfaces_signing_failure() {
        let responder = ProbeResponder::new(&Name::from("/a"), Arc::new(FailingSigner));
        let request = ProbeRequest::new(&ProbeName::new(Name::from("/a"), 1), Duration::from_secs(1));
        assert!(matches!(responder.respond(&request), Err(Error::Signing(_))));
    }
}
